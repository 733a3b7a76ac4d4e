// 该文件是 Kanzi （看字） 项目的一部分。
// src/model.rs - 模型
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use crate::frame::Frame;

/// OCR 推理任务：是否需要检测框、是否需要识别文字
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OcrTask {
  pub detection: bool,
  pub recognition: bool,
}

impl OcrTask {
  pub const DETECT: OcrTask = OcrTask {
    detection: true,
    recognition: false,
  };
  pub const RECOGNIZE: OcrTask = OcrTask {
    detection: true,
    recognition: true,
  };
}

pub trait OcrModel {
  type Error;

  fn infer(&self, frame: &Frame, task: OcrTask) -> Result<OcrOutput, Self::Error>;
}

impl<M: OcrModel + ?Sized> OcrModel for Box<M> {
  type Error = M::Error;

  fn infer(&self, frame: &Frame, task: OcrTask) -> Result<OcrOutput, Self::Error> {
    (**self).infer(frame, task)
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
  pub x: f32,
  pub y: f32,
}

impl Point {
  pub fn new(x: f32, y: f32) -> Self {
    Self { x, y }
  }
}

/// 文本区域多边形（源图像坐标，至少 4 个点）
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionBox {
  points: Box<[Point]>,
}

impl DetectionBox {
  pub const MIN_POINTS: usize = 4;

  pub fn new(points: Vec<Point>) -> Option<Self> {
    if points.len() < Self::MIN_POINTS {
      return None;
    }
    Some(Self {
      points: points.into_boxed_slice(),
    })
  }

  pub fn from_corners(corners: [(f32, f32); 4]) -> Self {
    Self {
      points: corners.iter().map(|&(x, y)| Point::new(x, y)).collect(),
    }
  }

  pub fn points(&self) -> &[Point] {
    &self.points
  }

  /// 外接矩形，坐标先截断为整数
  pub fn bounding_rect(&self) -> SourceRect {
    let mut xs = self.points.iter().map(|p| p.x as i32);
    let mut ys = self.points.iter().map(|p| p.y as i32);
    // 构造时保证至少 4 个点
    let (first_x, first_y) = (xs.next().unwrap_or(0), ys.next().unwrap_or(0));
    let (x1, x2) = xs.fold((first_x, first_x), |(lo, hi), v| (lo.min(v), hi.max(v)));
    let (y1, y2) = ys.fold((first_y, first_y), |(lo, hi), v| (lo.min(v), hi.max(v)));
    SourceRect { x1, y1, x2, y2 }
  }
}

/// 源图像坐标下的整数外接矩形
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceRect {
  x1: i32,
  y1: i32,
  x2: i32,
  y2: i32,
}

impl SourceRect {
  pub fn x1(&self) -> i32 {
    self.x1
  }

  pub fn y1(&self) -> i32 {
    self.y1
  }

  pub fn x2(&self) -> i32 {
    self.x2
  }

  pub fn y2(&self) -> i32 {
    self.y2
  }

  pub fn width(&self) -> i32 {
    self.x2 - self.x1
  }

  pub fn height(&self) -> i32 {
    self.y2 - self.y1
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
  pub bbox: DetectionBox,
  pub text: String,
  pub score: f32,
}

/// 引擎原始输出，顺序即引擎报告顺序
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OcrOutput {
  pub boxes: Vec<DetectionBox>,
  pub lines: Vec<TextLine>,
}

pub mod adapter;
pub use self::adapter::{Adapter, AdapterError, Detection, NO_TEXT_SENTINEL, Recognition};

#[cfg(feature = "model_ppocr")]
mod ppocr;
#[cfg(feature = "model_ppocr")]
pub use self::ppocr::{PpOcr, PpOcrBuilder, PpOcrError};

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn box_needs_four_points() {
    let three = vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0), Point::new(1.0, 1.0)];
    assert!(DetectionBox::new(three).is_none());
  }

  #[test]
  fn bounding_rect_of_polygon() {
    let bbox = DetectionBox::new(vec![
      Point::new(12.9, 40.2),
      Point::new(60.0, 35.7),
      Point::new(64.5, 80.0),
      Point::new(10.0, 82.9),
      Point::new(30.0, 90.1),
    ])
    .unwrap();
    let rect = bbox.bounding_rect();
    assert_eq!((rect.x1(), rect.y1(), rect.x2(), rect.y2()), (10, 35, 64, 90));
    assert_eq!((rect.width(), rect.height()), (54, 55));
  }

  #[test]
  fn scenario_box_is_40_by_20() {
    let bbox = DetectionBox::from_corners([(10.0, 10.0), (50.0, 10.0), (50.0, 30.0), (10.0, 30.0)]);
    let rect = bbox.bounding_rect();
    assert_eq!((rect.x1(), rect.y1(), rect.width(), rect.height()), (10, 10, 40, 20));
  }
}
