// 该文件是 Kanzi （看字） 项目的一部分。
// src/transform.rs - 显示坐标变换（等比缩放居中）
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

//! # 显示坐标变换
//!
//! 将源图像等比缩放到显示画布内并居中（letterbox），
//! 实时画面与冻结画面共用同一个变换，保证两者像素级一致。

use thiserror::Error;

use crate::model::{Point, SourceRect};

#[derive(Error, Debug, PartialEq)]
pub enum TransformError {
  #[error("尺寸必须为正数: 源图像 {source_w}x{source_h}, 画布 {surface_w}x{surface_h}")]
  NonPositive {
    source_w: f64,
    source_h: f64,
    surface_w: f64,
    surface_h: f64,
  },
}

/// 源图像坐标到画布坐标的变换
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayTransform {
  pub scale: f64,
  pub offset_x: f64,
  pub offset_y: f64,
  source_w: f64,
  source_h: f64,
}

/// 画布坐标下的矩形
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayRect {
  pub x1: f64,
  pub y1: f64,
  pub x2: f64,
  pub y2: f64,
}

impl DisplayTransform {
  pub fn compute(
    source_w: impl Into<f64>,
    source_h: impl Into<f64>,
    surface_w: impl Into<f64>,
    surface_h: impl Into<f64>,
  ) -> Result<Self, TransformError> {
    let (source_w, source_h) = (source_w.into(), source_h.into());
    let (surface_w, surface_h) = (surface_w.into(), surface_h.into());

    let positive = |v: f64| v.is_finite() && v > 0.0;
    if !(positive(source_w) && positive(source_h) && positive(surface_w) && positive(surface_h)) {
      return Err(TransformError::NonPositive {
        source_w,
        source_h,
        surface_w,
        surface_h,
      });
    }

    let scale = (surface_w / source_w).min(surface_h / source_h);
    Ok(Self {
      scale,
      offset_x: (surface_w - source_w * scale) / 2.0,
      offset_y: (surface_h - source_h * scale) / 2.0,
      source_w,
      source_h,
    })
  }

  pub fn project(&self, point: Point) -> (f64, f64) {
    (
      point.x as f64 * self.scale + self.offset_x,
      point.y as f64 * self.scale + self.offset_y,
    )
  }

  pub fn project_rect(&self, rect: &SourceRect) -> DisplayRect {
    let (x1, y1) = self.project(Point::new(rect.x1() as f32, rect.y1() as f32));
    let (x2, y2) = self.project(Point::new(rect.x2() as f32, rect.y2() as f32));
    DisplayRect { x1, y1, x2, y2 }
  }

  /// 缩放后的图像尺寸（向下取整，至少 1 像素）
  pub fn scaled_size(&self) -> (u32, u32) {
    // 吸收浮点误差，避免 799.9999 被截成 799
    const ROUNDING_SLACK: f64 = 1e-6;
    (
      ((self.source_w * self.scale + ROUNDING_SLACK).floor() as u32).max(1),
      ((self.source_h * self.scale + ROUNDING_SLACK).floor() as u32).max(1),
    )
  }

  /// 缩放后图像在画布上的左上角
  pub fn origin(&self) -> (i64, i64) {
    (self.offset_x.round() as i64, self.offset_y.round() as i64)
  }
}
