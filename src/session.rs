// 该文件是 Kanzi （看字） 项目的一部分。
// src/session.rs - 实时取景会话
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

//! # 实时取景会话
//!
//! 渲染循环与命令处理器共享同一个 [`Session`]：
//! 会话状态和显示画布放在同一把锁里，
//! 渲染循环只在 `Viewing` 时绘制，命令处理器只在冻结画面时绘制。

use std::{
  sync::{Mutex, MutexGuard, PoisonError},
  time::Duration,
};

use thiserror::Error;

use crate::{model::AdapterError, output::OutputError};

pub mod state;
pub use self::state::{Mode, SessionState};

mod compose;
pub use self::compose::{BOX_COLOR, TEXT_COLOR, draw_view};

mod command;
pub use self::command::{Command, CommandError, PROMPT, Request};

mod render_loop;
pub use self::render_loop::{RenderLoop, Tick};

mod processor;
pub use self::processor::{CommandProcessor, PausePolicy};

#[derive(Error, Debug)]
pub enum SessionError {
  #[error("无法获取图像: {0}")]
  Acquisition(String),
  #[error("OCR 失败: {0}")]
  Model(#[from] AdapterError),
  #[error("无效命令: {0}")]
  InvalidCommand(#[from] CommandError),
  #[error("输出失败: {0}")]
  Output(#[from] OutputError),
  #[error("释放资源失败: {0}")]
  Teardown(String),
  #[error("没有可用的显示画布")]
  NoSurface,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
  pub surface_width: u32,
  pub surface_height: u32,
  pub interval: Duration,
  pub pause_policy: PausePolicy,
}

impl Default for SessionConfig {
  fn default() -> Self {
    Self {
      surface_width: 800,
      surface_height: 600,
      interval: Duration::from_millis(100),
      pause_policy: PausePolicy::default(),
    }
  }
}

/// 锁内数据：会话状态与可选的显示画布
pub struct Shared<S> {
  pub state: SessionState,
  pub surface: Option<S>,
}

pub struct Session<S> {
  inner: Mutex<Shared<S>>,
}

impl<S> Session<S> {
  pub fn new(surface: Option<S>) -> Self {
    Self {
      inner: Mutex::new(Shared {
        state: SessionState::default(),
        surface,
      }),
    }
  }

  pub fn lock(&self) -> MutexGuard<'_, Shared<S>> {
    lock_or_recover(&self.inner)
  }

  pub fn mode(&self) -> Mode {
    self.lock().state.mode
  }

  pub fn has_surface(&self) -> bool {
    self.lock().surface.is_some()
  }

  /// 进入终止状态，渲染循环在下一次检查时退出
  pub fn end(&self) {
    self.lock().state.end();
  }
}

#[cfg(test)]
pub(crate) mod testing {
  pub(crate) use super::compose::tests::{Op, RecordingSurface};
  pub(crate) use super::render_loop::tests::{FakeProvider, NoFrameError};
}

/// 持锁线程 panic 后仍继续使用数据
pub(crate) fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
