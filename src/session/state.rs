// 该文件是 Kanzi （看字） 项目的一部分。
// src/session/state.rs - 会话状态
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::sync::Arc;

use crate::{frame::Frame, model::DetectionBox};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
  /// 渲染循环持续刷新画面
  #[default]
  Viewing,
  /// 画面冻结在最近一次检测的帧上
  Paused,
  Ended,
}

#[derive(Debug, Default)]
pub struct SessionState {
  pub mode: Mode,
  pub last_frame: Option<Arc<Frame>>,
  pub last_detections: Option<Vec<DetectionBox>>,
  pub last_recognition_text: Option<String>,
  /// 暂停时显示的帧，仅在 `Paused` 时存在
  pub frozen: Option<Arc<Frame>>,
}

impl SessionState {
  /// 冻结到指定帧；已结束的会话不受影响
  pub fn pause(&mut self, frame: Arc<Frame>) {
    if self.mode == Mode::Ended {
      return;
    }
    self.mode = Mode::Paused;
    self.frozen = Some(frame);
  }

  /// `Paused -> Viewing`，其他状态返回 false
  pub fn resume(&mut self) -> bool {
    if self.mode != Mode::Paused {
      return false;
    }
    self.mode = Mode::Viewing;
    self.frozen = None;
    true
  }

  pub fn end(&mut self) {
    self.mode = Mode::Ended;
    self.frozen = None;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::RgbImage;

  fn frame() -> Arc<Frame> {
    Arc::new(Frame::from(RgbImage::new(2, 2)))
  }

  #[test]
  fn pause_then_resume() {
    let mut state = SessionState::default();
    assert_eq!(state.mode, Mode::Viewing);
    state.pause(frame());
    assert_eq!(state.mode, Mode::Paused);
    assert!(state.frozen.is_some());
    assert!(state.resume());
    assert_eq!(state.mode, Mode::Viewing);
    assert!(state.frozen.is_none());
  }

  #[test]
  fn resume_while_viewing_is_noop() {
    let mut state = SessionState::default();
    assert!(!state.resume());
    assert_eq!(state.mode, Mode::Viewing);
  }

  #[test]
  fn ended_is_terminal() {
    let mut state = SessionState::default();
    state.end();
    state.pause(frame());
    assert_eq!(state.mode, Mode::Ended);
    assert!(!state.resume());
    assert_eq!(state.mode, Mode::Ended);
  }
}
