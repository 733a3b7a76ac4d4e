// 该文件是 Kanzi （看字） 项目的一部分。
// src/output/gstreamer_display_output.rs - GStreamer 窗口显示输出
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

//! # GStreamer 显示输出
//!
//! 把画布推到 `appsrc ! videoconvert ! <sink>` 管道上显示。
//! `sink` 默认为 `autovideosink`，也可以写完整的后半段管道，
//! 例如 `nv3dsink` 或 `xvimagesink sync=false`。
//!
//! 画面只在实时取景时推送，暂停期间没有新帧。appsrc 用 `do-timestamp`
//! 按推送时刻的运行时间打时间戳，恢复后的帧不会被 sink 当作迟到帧丢弃。

use std::sync::atomic::{AtomicU64, Ordering};

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::output::FrameSink;

pub const DEFAULT_DISPLAY_SINK: &str = "autovideosink";

#[derive(Error, Debug)]
pub enum GStreamerDisplayOutputError {
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  #[error("Failed to get appsrc element")]
  AppSrcNotFound,
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
  #[error("Frame size {0}x{1} does not match display {2}x{3}")]
  SizeMismatch(u32, u32, u32, u32),
}

pub struct GStreamerDisplayOutput {
  pipeline: gst::Pipeline,
  appsrc: gst_app::AppSrc,
  width: u32,
  height: u32,
  frame_count: AtomicU64,
}

pub(crate) fn pipeline_description(sink: &str) -> String {
  format!(
    "appsrc name=src is-live=true do-timestamp=true ! videoconvert ! {}",
    sink.trim()
  )
}

impl GStreamerDisplayOutput {
  pub fn new(
    sink: &str,
    width: u32,
    height: u32,
    fps: u32,
  ) -> Result<Self, GStreamerDisplayOutputError> {
    gst::init()?;

    let fps = fps.max(1);
    let pipeline_desc = pipeline_description(sink);
    info!("创建显示管道: {}", pipeline_desc);

    let pipeline = gst::parse::launch(&pipeline_desc)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| {
        GStreamerDisplayOutputError::PipelineError("Failed to create pipeline".to_string())
      })?;

    let appsrc = pipeline
      .by_name("src")
      .ok_or(GStreamerDisplayOutputError::AppSrcNotFound)?
      .downcast::<gst_app::AppSrc>()
      .map_err(|_| GStreamerDisplayOutputError::AppSrcNotFound)?;

    let caps = gst::Caps::builder("video/x-raw")
      .field("format", "RGB")
      .field("width", width as i32)
      .field("height", height as i32)
      .field("framerate", gst::Fraction::new(fps as i32, 1))
      .build();
    appsrc.set_caps(Some(&caps));
    appsrc.set_format(gst::Format::Time);

    pipeline.set_state(gst::State::Playing)?;
    info!("显示输出已启动: {}x{} @ {} fps", width, height, fps);

    Ok(GStreamerDisplayOutput {
      pipeline,
      appsrc,
      width,
      height,
      frame_count: AtomicU64::new(0),
    })
  }
}

impl FrameSink for GStreamerDisplayOutput {
  type Error = GStreamerDisplayOutputError;

  fn push_image(&self, image: &RgbImage) -> Result<(), Self::Error> {
    if image.dimensions() != (self.width, self.height) {
      return Err(GStreamerDisplayOutputError::SizeMismatch(
        image.width(),
        image.height(),
        self.width,
        self.height,
      ));
    }

    let buffer = gst::Buffer::from_mut_slice(image.as_raw().clone());
    self.appsrc.push_buffer(buffer).map_err(|e| {
      GStreamerDisplayOutputError::PipelineError(format!("Failed to push buffer: {:?}", e))
    })?;
    self.frame_count.fetch_add(1, Ordering::Relaxed);
    Ok(())
  }
}

impl Drop for GStreamerDisplayOutput {
  fn drop(&mut self) {
    if let Err(e) = self.appsrc.end_of_stream() {
      debug!("显示管道 EOS 失败: {:?}", e);
    }
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("停止显示管道失败: {}", e);
    }
    info!(
      "显示输出已关闭，共推送 {} 帧",
      self.frame_count.load(Ordering::Relaxed)
    );
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn sink_is_appended_to_pipeline() {
    assert_eq!(
      pipeline_description(DEFAULT_DISPLAY_SINK),
      "appsrc name=src is-live=true do-timestamp=true ! videoconvert ! autovideosink"
    );
    assert_eq!(
      pipeline_description(" xvimagesink sync=false "),
      "appsrc name=src is-live=true do-timestamp=true ! videoconvert ! xvimagesink sync=false"
    );
  }

  #[test]
  fn appsrc_stamps_buffers_on_push() {
    // 暂停后恢复的帧按推送时刻计时
    let desc = pipeline_description(DEFAULT_DISPLAY_SINK);
    let appsrc = desc.split('!').next().unwrap_or_default();
    assert!(appsrc.contains("is-live=true"));
    assert!(appsrc.contains("do-timestamp=true"));
  }
}
