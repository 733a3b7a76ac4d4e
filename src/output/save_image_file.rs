// 该文件是 Kanzi （看字） 项目的一部分。
// src/output/save_image_file.rs - 保存抓拍图像
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

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::{
  frame::Frame,
  output::{ensure_parent, output_path},
};

pub const CAPTURE_PREFIX: &str = "capture_image";
pub const CAPTURE_EXTENSION: &str = "jpg";

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
}

/// 原始帧抓拍，格式由扩展名决定
pub struct SaveImageFileOutput {
  path: PathBuf,
}

impl SaveImageFileOutput {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  /// 未指定路径时使用 `capture_image_<时间戳>.jpg`
  pub fn new_or_default(path: Option<&Path>) -> Self {
    Self::new(output_path(path, CAPTURE_PREFIX, CAPTURE_EXTENSION))
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn save(&self, frame: &Frame) -> Result<&Path, SaveImageFileError> {
    ensure_parent(&self.path)?;
    frame.image().save(&self.path)?;
    info!("保存图像到文件: {}", self.path.display());
    Ok(&self.path)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{Rgb, RgbImage};

  #[test]
  fn saves_into_new_directory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shots/one.png");
    let frame = Frame::from(RgbImage::from_pixel(6, 4, Rgb([9, 8, 7])));

    let output = SaveImageFileOutput::new(&path);
    assert_eq!(output.save(&frame).unwrap(), path.as_path());

    let saved = image::open(&path).unwrap().into_rgb8();
    assert_eq!(saved.dimensions(), (6, 4));
    assert_eq!(saved.get_pixel(0, 0), &Rgb([9, 8, 7]));
  }

  #[test]
  fn default_name_is_jpg() {
    let output = SaveImageFileOutput::new_or_default(None);
    let name = output.path().to_str().unwrap();
    assert!(name.starts_with("capture_image_"));
    assert!(name.ends_with(".jpg"));
  }
}
