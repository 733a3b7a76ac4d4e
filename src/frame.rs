// 该文件是 Kanzi （看字） 项目的一部分。
// src/frame.rs - 帧定义
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

use image::{RgbImage, imageops::FilterType};

const RGB_CHANNELS: usize = 3;

/// 摄像头或图片文件解码得到的一帧图像，生成后不可变
#[derive(Debug, Clone)]
pub struct Frame {
  image: RgbImage,
}

impl From<RgbImage> for Frame {
  fn from(image: RgbImage) -> Self {
    Self { image }
  }
}

impl Frame {
  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  pub fn image(&self) -> &RgbImage {
    &self.image
  }
}

pub trait AsNhwcFrame {
  fn as_nhwc(&self) -> &[u8];
}

#[cfg(feature = "model_ppocr")]
pub trait FrameFormat {
  fn tensor_format(&self) -> rknpu::TensorFormat;
  fn tensor_type(&self) -> rknpu::TensorType;
}

/// 模型输入张量，固定尺寸 W x H，NHWC 排列
#[derive(Debug, Clone)]
pub struct RgbNhwcFrame<const W: u32, const H: u32> {
  data: Box<[u8]>,
}

#[cfg(feature = "model_ppocr")]
impl<const W: u32, const H: u32> FrameFormat for RgbNhwcFrame<W, H> {
  fn tensor_format(&self) -> rknpu::TensorFormat {
    rknpu::TensorFormat::NHWC
  }

  fn tensor_type(&self) -> rknpu::TensorType {
    rknpu::TensorType::UInt8
  }
}

impl<const W: u32, const H: u32> Default for RgbNhwcFrame<W, H> {
  fn default() -> Self {
    let size = RGB_CHANNELS * (W as usize) * (H as usize);
    let data = vec![0u8; size].into_boxed_slice();
    Self { data }
  }
}

impl<const W: u32, const H: u32> RgbNhwcFrame<W, H> {
  /// 拉伸缩放到 W x H
  pub fn stretched(image: &RgbImage) -> Self {
    let resized = image::imageops::resize(image, W, H, FilterType::Triangle);
    Self {
      data: resized.into_raw().into_boxed_slice(),
    }
  }

  /// 保持宽高比缩放到高度 H，宽度不超过 W，右侧补零
  pub fn padded(image: &RgbImage) -> Self {
    let mut frame = Self::default();
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
      return frame;
    }

    let ratio = width as f32 / height as f32;
    let target_w = ((H as f32 * ratio).ceil() as u32).clamp(1, W);
    let resized = image::imageops::resize(image, target_w, H, FilterType::Triangle);

    let row = W as usize * RGB_CHANNELS;
    let resized_row = target_w as usize * RGB_CHANNELS;
    for (y, line) in resized.as_raw().chunks_exact(resized_row).enumerate() {
      frame.data[y * row..y * row + resized_row].copy_from_slice(line);
    }
    frame
  }
}

impl<const W: u32, const H: u32> AsNhwcFrame for RgbNhwcFrame<W, H> {
  fn as_nhwc(&self) -> &[u8] {
    &self.data
  }
}
