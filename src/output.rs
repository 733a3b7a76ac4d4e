// 该文件是 Kanzi （看字） 项目的一部分。
// src/output.rs - 输出定义
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::{Path, PathBuf};

use image::RgbImage;
use thiserror::Error;

use crate::transform::{DisplayRect, DisplayTransform};

/// 可绘制的显示画布
///
/// 同一时刻只允许一方绘制：实时视图时是渲染循环，冻结视图时是命令处理器。
pub trait Surface: Send {
  type Error: std::error::Error + Send + Sync + 'static;

  fn size(&self) -> (u32, u32);
  fn clear(&mut self);
  /// 按变换把源图像等比缩放后居中绘制
  fn draw_image(&mut self, image: &RgbImage, transform: &DisplayTransform);
  fn draw_rect(&mut self, rect: &DisplayRect, color: [u8; 3]);
  /// 右下角叠加多行文字，右对齐
  fn draw_text(&mut self, text: &str, color: [u8; 3]);
  fn present(&mut self) -> Result<(), Self::Error>;
}

/// 接收画布成品的显示后端
pub trait FrameSink: Send {
  type Error: std::error::Error + Send + Sync + 'static;
  fn push_image(&self, image: &RgbImage) -> Result<(), Self::Error>;
}

pub mod canvas;
pub use self::canvas::Canvas;

mod detection_record;
pub use self::detection_record::{DetectionRecord, DetectionRecordError};

mod save_image_file;
pub use self::save_image_file::{SaveImageFileError, SaveImageFileOutput};

#[cfg(feature = "gstreamer_output")]
mod gstreamer_display_output;
#[cfg(feature = "gstreamer_output")]
pub use self::gstreamer_display_output::{
  DEFAULT_DISPLAY_SINK, GStreamerDisplayOutput, GStreamerDisplayOutputError,
};

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("保存图像失败: {0}")]
  SaveImageFile(#[from] SaveImageFileError),
  #[error("写入检测结果失败: {0}")]
  DetectionRecord(#[from] DetectionRecordError),
  #[cfg(feature = "gstreamer_output")]
  #[error("显示输出错误: {0}")]
  Display(#[from] GStreamerDisplayOutputError),
}

/// `<prefix>_<YYYYMMDD-HHMMSS>.<extension>`，使用本地时间
pub fn timestamped_path(prefix: &str, extension: &str) -> PathBuf {
  let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
  PathBuf::from(format!("{}_{}.{}", prefix, timestamp, extension))
}

/// 指定路径优先，否则生成带时间戳的默认路径
pub fn output_path(given: Option<&Path>, prefix: &str, extension: &str) -> PathBuf {
  given
    .map(Path::to_path_buf)
    .unwrap_or_else(|| timestamped_path(prefix, extension))
}

/// 写文件前创建父目录
pub(crate) fn ensure_parent(path: &Path) -> std::io::Result<()> {
  if let Some(parent) = path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)?;
  }
  Ok(())
}
