// 该文件是 Kanzi （看字） 项目的一部分。
// src/session/compose.rs - 画面合成
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use tracing::warn;

use crate::{
  frame::Frame,
  model::DetectionBox,
  output::Surface,
  session::Shared,
  transform::DisplayTransform,
};

pub const BOX_COLOR: [u8; 3] = [255, 0, 0];
pub const TEXT_COLOR: [u8; 3] = [255, 255, 0];

/// 实时与冻结画面共用的绘制流程
pub fn draw_view<S: Surface>(
  surface: &mut S,
  frame: &Frame,
  boxes: &[DetectionBox],
  text: Option<&str>,
) -> Result<(), S::Error> {
  let (surface_w, surface_h) = surface.size();
  surface.clear();

  match DisplayTransform::compute(frame.width(), frame.height(), surface_w, surface_h) {
    Ok(transform) => {
      surface.draw_image(frame.image(), &transform);
      for bbox in boxes {
        surface.draw_rect(&transform.project_rect(&bbox.bounding_rect()), BOX_COLOR);
      }
    }
    Err(e) => warn!("无法计算显示变换: {}", e),
  }

  if let Some(text) = text {
    surface.draw_text(text, TEXT_COLOR);
  }
  surface.present()
}

/// 重绘冻结画面：冻结帧、检测框与识别文字
pub fn redraw_frozen<S: Surface>(shared: &mut Shared<S>) {
  let (Some(surface), Some(frame)) = (shared.surface.as_mut(), shared.state.frozen.as_ref()) else {
    return;
  };
  let boxes = shared.state.last_detections.as_deref().unwrap_or(&[]);
  let text = shared.state.last_recognition_text.as_deref();
  if let Err(e) = draw_view(surface, frame, boxes, text) {
    warn!("冻结画面显示失败: {}", e);
  }
}
