// 该文件是 Kanzi （看字） 项目的一部分。
// src/output/detection_record.rs - 检测框 XML 记录
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{
  fmt::Write as _,
  path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::info;

use crate::{
  model::DetectionBox,
  output::{ensure_parent, output_path},
};

pub const DETECTION_PREFIX: &str = "detection_result";
pub const DETECTION_EXTENSION: &str = "xml";

#[derive(Error, Debug)]
pub enum DetectionRecordError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("没有检测框可写入")]
  Empty,
}

/// 检测框记录，按引擎给出的顺序编号 r1, r2, ...
pub struct DetectionRecord {
  path: PathBuf,
}

impl DetectionRecord {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  /// 未指定路径时使用 `detection_result_<时间戳>.xml`
  pub fn new_or_default(path: Option<&Path>) -> Self {
    Self::new(output_path(path, DETECTION_PREFIX, DETECTION_EXTENSION))
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn to_xml(boxes: &[DetectionBox]) -> String {
    let mut xml = String::from("<Rectangles>\n");
    for (index, bbox) in boxes.iter().enumerate() {
      let rect = bbox.bounding_rect();
      // 写入 String 不会失败
      let _ = writeln!(
        xml,
        "\t<Rectangle id=\"r{}\" x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" />",
        index + 1,
        rect.x1(),
        rect.y1(),
        rect.width(),
        rect.height()
      );
    }
    xml.push_str("</Rectangles>");
    xml
  }

  /// 写入 XML，空列表不产生文件
  pub fn write(&self, boxes: &[DetectionBox]) -> Result<&Path, DetectionRecordError> {
    if boxes.is_empty() {
      return Err(DetectionRecordError::Empty);
    }
    ensure_parent(&self.path)?;
    std::fs::write(&self.path, Self::to_xml(boxes))?;
    info!("写入 {} 个检测框到: {}", boxes.len(), self.path.display());
    Ok(&self.path)
  }
}
