// 该文件是 Kanzi （看字） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::Path;

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, decoded_path, frame::Frame, input::FrameProvider};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(image::ImageError),
  #[error("Image input already closed")]
  Closed,
}

impl From<std::io::Error> for ImageFileInputError {
  fn from(err: std::io::Error) -> Self {
    ImageFileInputError::IoError(err)
  }
}

impl From<image::ImageError> for ImageFileInputError {
  fn from(err: image::ImageError) -> Self {
    ImageFileInputError::ImageLoadError(err)
  }
}

/// 静态图片输入，每次读取都返回同一张图
pub struct ImageFileInput {
  image: Option<RgbImage>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    Self::open(decoded_path(url))
  }
}

impl ImageFileInput {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, ImageFileInputError> {
    let path = path.as_ref();
    let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    info!("读取图像文件: {} ({}x{})", path.display(), image.width(), image.height());

    Ok(ImageFileInput {
      image: Some(image.into_rgb8()),
    })
  }

  /// 一次性读取图片为帧
  pub fn load(path: impl AsRef<Path>) -> Result<Frame, ImageFileInputError> {
    Self::open(path)?.read()
  }
}

impl FrameProvider for ImageFileInput {
  type Error = ImageFileInputError;

  fn read(&mut self) -> Result<Frame, Self::Error> {
    self
      .image
      .clone()
      .map(Frame::from)
      .ok_or(ImageFileInputError::Closed)
  }

  fn close(&mut self) -> Result<(), Self::Error> {
    self.image = None;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  #[test]
  fn reads_same_image_until_closed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("still.png");
    RgbImage::from_pixel(8, 6, Rgb([1, 2, 3])).save(&path).unwrap();

    let url = Url::from_file_path(&path).unwrap();
    let url = Url::parse(&url.as_str().replacen("file", "image", 1)).unwrap();
    let mut input = ImageFileInput::from_url(&url).unwrap();

    for _ in 0..3 {
      let frame = input.read().unwrap();
      assert_eq!((frame.width(), frame.height()), (8, 6));
    }
    input.close().unwrap();
    assert!(matches!(input.read(), Err(ImageFileInputError::Closed)));
  }

  #[test]
  fn missing_file_is_io_error() {
    assert!(matches!(
      ImageFileInput::load("/nonexistent/kanzi.png"),
      Err(ImageFileInputError::IoError(_))
    ));
  }

  #[test]
  fn wrong_scheme_is_rejected() {
    let url = Url::parse("gst://camera/dev/video0").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(ImageFileInputError::SchemaMismatch)
    ));
  }
}
