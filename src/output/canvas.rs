// 该文件是 Kanzi （看字） 项目的一部分。
// src/output/canvas.rs - 画布绘制
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage, imageops::FilterType};
use imageproc::{
  drawing::{draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use tracing::{info, warn};

use crate::{
  output::{FrameSink, Surface},
  transform::{DisplayRect, DisplayTransform},
};

// 文本渲染常量
const OVERLAY_FONT_SIZE: f32 = 22.0;
const OVERLAY_PADDING: i32 = 20;
const OVERLAY_LINE_SPACING: i32 = 4;
const BACKGROUND: [u8; 3] = [0, 0, 0];

/// 内存中的 RGB 画布，`present` 时交给显示后端
pub struct Canvas<K> {
  image: RgbImage,
  font: Option<FontArc>,
  font_size: f32,
  padding: i32,
  sink: K,
  warned_no_font: bool,
}

impl<K: FrameSink> Canvas<K> {
  pub fn new(width: u32, height: u32, sink: K) -> Self {
    Self {
      image: RgbImage::from_pixel(width, height, Rgb(BACKGROUND)),
      font: None,
      font_size: OVERLAY_FONT_SIZE,
      padding: OVERLAY_PADDING,
      sink,
      warned_no_font: false,
    }
  }

  pub fn with_font(mut self, font: FontArc) -> Self {
    self.font = Some(font);
    self
  }

  /// 加载字体文件；失败时只记录警告，叠加文字不显示
  pub fn with_font_file(self, path: &Path) -> Self {
    let font = std::fs::read(path)
      .map_err(|e| e.to_string())
      .and_then(|data| FontArc::try_from_vec(data).map_err(|e| e.to_string()));
    match font {
      Ok(font) => {
        info!("加载字体: {}", path.display());
        self.with_font(font)
      }
      Err(e) => {
        warn!("无法加载字体 {}: {}, 叠加文字将不显示", path.display(), e);
        self
      }
    }
  }

  pub fn image(&self) -> &RgbImage {
    &self.image
  }
}

impl<K: FrameSink> Surface for Canvas<K> {
  type Error = K::Error;

  fn size(&self) -> (u32, u32) {
    self.image.dimensions()
  }

  fn clear(&mut self) {
    for pixel in self.image.pixels_mut() {
      *pixel = Rgb(BACKGROUND);
    }
  }

  fn draw_image(&mut self, image: &RgbImage, transform: &DisplayTransform) {
    let (width, height) = transform.scaled_size();
    let resized = image::imageops::resize(image, width, height, FilterType::Triangle);
    let (x, y) = transform.origin();
    image::imageops::overlay(&mut self.image, &resized, x, y);
  }

  fn draw_rect(&mut self, rect: &DisplayRect, color: [u8; 3]) {
    let x = rect.x1.round() as i32;
    let y = rect.y1.round() as i32;
    let width = ((rect.x2 - rect.x1).round() as i64).max(1) as u32;
    let height = ((rect.y2 - rect.y1).round() as i64).max(1) as u32;

    // 两像素宽的边框
    draw_hollow_rect_mut(&mut self.image, Rect::at(x, y).of_size(width, height), Rgb(color));
    if width > 2 && height > 2 {
      let inner = Rect::at(x + 1, y + 1).of_size(width - 2, height - 2);
      draw_hollow_rect_mut(&mut self.image, inner, Rgb(color));
    }
  }

  fn draw_text(&mut self, text: &str, color: [u8; 3]) {
    let Some(font) = self.font.as_ref() else {
      if !self.warned_no_font {
        warn!("未加载字体，跳过叠加文字");
        self.warned_no_font = true;
      }
      return;
    };

    let scale = PxScale::from(self.font_size);
    let line_height = self.font_size.ceil() as i32 + OVERLAY_LINE_SPACING;
    let (canvas_w, canvas_h) = (self.image.width() as i32, self.image.height() as i32);

    let lines: Vec<&str> = text.lines().collect();
    let count = lines.len() as i32;
    for (index, line) in lines.iter().enumerate() {
      let (text_w, _) = text_size(scale, font, line);
      let x = canvas_w - self.padding - text_w as i32;
      let y = canvas_h - self.padding - line_height * (count - index as i32);
      draw_text_mut(&mut self.image, Rgb(color), x, y, scale, font, line);
    }
  }

  fn present(&mut self) -> Result<(), Self::Error> {
    self.sink.push_image(&self.image)
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;
  use std::sync::{Arc, Mutex};

  #[derive(Clone, Default)]
  pub struct MemorySink {
    pub frames: Arc<Mutex<Vec<RgbImage>>>,
  }

  impl FrameSink for MemorySink {
    type Error = std::io::Error;

    fn push_image(&self, image: &RgbImage) -> Result<(), Self::Error> {
      self.frames.lock().unwrap().push(image.clone());
      Ok(())
    }
  }

  #[test]
  fn letterboxed_image_leaves_bars_black() {
    let mut canvas = Canvas::new(80, 60, MemorySink::default());
    let source = RgbImage::from_pixel(192, 108, Rgb([255, 255, 255]));
    let transform = DisplayTransform::compute(192, 108, 80, 60).unwrap();
    canvas.draw_image(&source, &transform);

    // 80x45 居中，上下各留约 7 像素黑边
    assert_eq!(canvas.image().get_pixel(40, 2), &Rgb(BACKGROUND));
    assert_eq!(canvas.image().get_pixel(40, 57), &Rgb(BACKGROUND));
    assert_eq!(canvas.image().get_pixel(40, 30), &Rgb([255, 255, 255]));
    assert_eq!(canvas.image().get_pixel(0, 30), &Rgb([255, 255, 255]));
  }

  #[test]
  fn rect_outline_is_two_pixels_wide() {
    let mut canvas = Canvas::new(50, 50, MemorySink::default());
    let rect = DisplayRect {
      x1: 10.0,
      y1: 10.0,
      x2: 30.0,
      y2: 20.0,
    };
    canvas.draw_rect(&rect, [255, 0, 0]);
    assert_eq!(canvas.image().get_pixel(10, 10), &Rgb([255, 0, 0]));
    assert_eq!(canvas.image().get_pixel(11, 11), &Rgb([255, 0, 0]));
    assert_eq!(canvas.image().get_pixel(15, 15), &Rgb(BACKGROUND));
    assert_eq!(canvas.image().get_pixel(29, 19), &Rgb([255, 0, 0]));
  }

  #[test]
  fn clear_and_present() {
    let sink = MemorySink::default();
    let mut canvas = Canvas::new(4, 4, sink.clone());
    let rect = DisplayRect {
      x1: 0.0,
      y1: 0.0,
      x2: 3.0,
      y2: 3.0,
    };
    canvas.draw_rect(&rect, [1, 2, 3]);
    canvas.clear();
    canvas.present().unwrap();
    let frames = sink.frames.lock().unwrap();
    assert_eq!(frames.len(), 1);
    assert!(frames[0].pixels().all(|p| *p == Rgb(BACKGROUND)));
  }

  #[test]
  fn text_without_font_is_skipped() {
    let mut canvas = Canvas::new(40, 40, MemorySink::default());
    canvas.draw_text("hello\nworld", [255, 255, 0]);
    assert!(canvas.image().pixels().all(|p| *p == Rgb(BACKGROUND)));
    let canvas = canvas.with_font_file(Path::new("/nonexistent/font.ttf"));
    assert!(canvas.font.is_none());
  }
}
