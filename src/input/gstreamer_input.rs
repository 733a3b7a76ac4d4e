// 该文件是 Kanzi （看字） 项目的一部分。
// src/input/gstreamer_input.rs - GStreamer 输入
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

//! # GStreamer 视频输入模块
//!
//! 基于 appsink 的取帧输入，支持：
//! - Jetson CSI 摄像头（`nvarguscamerasrc`）
//! - V4L2 摄像头
//! - 视频文件
//!
//! ## URL 格式
//!
//! ```text
//! gst://csi/0?width=1920&height=1080&display_width=960&display_height=540&fps=30&orientation=0
//! gst://camera/dev/video0?width=640&height=480&fps=15&format=YUY2&rotate=90
//! gst://file/path/to/video.mp4?rotate=180
//! ```
//!
//! `orientation` 取 0/1/2/3，分别对应不旋转、90°、180°、270°；
//! CSI 摄像头上映射为 `nvvidconv flip-method`，其它来源映射为 `videoflip`。
//!
//! ## 系统依赖
//!
//! **Ubuntu/Debian:**
//! ```bash
//! sudo apt-get install libgstreamer1.0-dev libgstreamer-plugins-base1.0-dev
//! ```
//!
//! ## 基本用法
//!
//! ```no_run
//! use kanzi::{FromUrl, input::{FrameProvider, GStreamerInputPipelineBuilder}};
//! use url::Url;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let url = Url::parse("gst://camera/dev/video0?width=640&height=480")?;
//! let mut input = GStreamerInputPipelineBuilder::from_url(&url)?.build()?;
//! let frame = input.read()?;
//! println!("帧: {}x{}", frame.width(), frame.height());
//! input.close()?;
//! # Ok(())
//! # }
//! ```

use std::{collections::HashMap, time::Duration};

use crate::{FromUrl, FromUrlWithScheme, decoded_path, frame::Frame, input::FrameProvider};

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

/// 单次取帧的最长等待时间
const DEFAULT_PULL_TIMEOUT: Duration = Duration::from_millis(500);

/// GStreamer 输入错误类型
#[derive(Error, Debug)]
pub enum GStreamerInputError {
  /// URI scheme 不匹配（期望 "gst://"）
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  /// GStreamer 库错误
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  /// GStreamer 布尔操作错误
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  /// 无法获取 appsink 元素
  #[error("Failed to get appsink element")]
  AppSinkNotFound,
  /// 无法转换元素为 appsink
  #[error("Failed to convert element to appsink")]
  AppSinkConversionFailed,
  /// 无法从 caps 获取视频信息
  #[error("Failed to get video info from caps")]
  VideoInfoError,
  /// 不支持的视频格式
  #[error("Unsupported video format")]
  UnsupportedFormat,
  /// 管道错误
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  /// 缓冲区大小不匹配
  #[error("Buffer size mismatch: expected {expected} bytes, got {actual} bytes")]
  BufferSizeMismatch { expected: usize, actual: usize },
  /// 状态改变错误
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
  /// 等待超时或流已结束
  #[error("No sample available (timeout or end of stream)")]
  NoSample,
  /// 管道已关闭
  #[error("Pipeline already closed")]
  Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GStreamerInputBuilderItem {
  CsiSource {
    sensor_id: u32,
    width: u32,
    height: u32,
    display_width: u32,
    display_height: u32,
    fps: u32,
    flip_method: u32,
  },
  FileSource(String),
  CameraSource {
    camera: String,
    io_mode: Option<u32>,
    format: String,
    width: u32,
    height: u32,
    fps: u32,
  },
  TargetFormat {
    format: String,
  },
  VideoFlip {
    method: u32,
  },
}

impl GStreamerInputBuilderItem {
  fn to_pipeline(&self) -> String {
    match self {
      GStreamerInputBuilderItem::CsiSource {
        sensor_id,
        width,
        height,
        display_width,
        display_height,
        fps,
        flip_method,
      } => format!(
        "nvarguscamerasrc sensor-id={} ! \
         video/x-raw(memory:NVMM),width=(int){},height=(int){},framerate=(fraction){}/1 ! \
         nvvidconv flip-method={} ! \
         video/x-raw,width=(int){},height=(int){},format=(string)BGRx",
        sensor_id, width, height, fps, flip_method, display_width, display_height
      ),
      GStreamerInputBuilderItem::FileSource(path) => {
        // 路径可能含空格，加引号作为单个属性值
        format!(
          "filesrc location=\"{}\" ! decodebin",
          path.replace('"', "\\\"")
        )
      }
      GStreamerInputBuilderItem::CameraSource {
        camera,
        io_mode,
        format,
        width,
        height,
        fps,
      } => {
        let io_mode_str = if let Some(mode) = io_mode {
          format!(" io-mode={}", mode)
        } else {
          "".to_string()
        };
        format!(
          "v4l2src device={}{} ! video/x-raw,format={},width={},height={},framerate={}/1",
          camera, io_mode_str, format, width, height, fps
        )
      }
      GStreamerInputBuilderItem::TargetFormat { format } => {
        format!("videoconvert ! video/x-raw,format={}", format)
      }
      GStreamerInputBuilderItem::VideoFlip { method } => {
        format!("videoflip method={}", method)
      }
    }
  }
}

/// GStreamer 输入管道构建器
pub struct GStreamerInputPipelineBuilder {
  items: Vec<GStreamerInputBuilderItem>,
  timeout: Duration,
}

fn query_u32(query: &HashMap<String, String>, key: &str, default: u32) -> u32 {
  query
    .get(key)
    .and_then(|v| v.parse::<u32>().ok())
    .unwrap_or(default)
}

/// 旋转参数：`orientation` 为 0..=3，`rotate` 为角度，前者优先
fn orientation(query: &HashMap<String, String>) -> Option<u32> {
  if let Some(orientation) = query.get("orientation").and_then(|v| v.parse::<u32>().ok()) {
    return Some(orientation % 4);
  }
  query.get("rotate").map(|rotate| match rotate.as_str() {
    "90" => 1,
    "180" => 2,
    "270" => 3,
    _ => 0,
  })
}

impl GStreamerInputPipelineBuilder {
  fn build_csi_pipeline(path: &str, query: &HashMap<String, String>) -> Self {
    let sensor_id = path.trim_matches('/').parse::<u32>().unwrap_or(0);
    let items = vec![GStreamerInputBuilderItem::CsiSource {
      sensor_id,
      width: query_u32(query, "width", 1920),
      height: query_u32(query, "height", 1080),
      display_width: query_u32(query, "display_width", 960),
      display_height: query_u32(query, "display_height", 540),
      fps: query_u32(query, "fps", 30),
      flip_method: orientation(query).unwrap_or(0),
    }];

    GStreamerInputPipelineBuilder {
      items,
      timeout: DEFAULT_PULL_TIMEOUT,
    }
  }

  fn build_video_pipline(path: &str, query: &HashMap<String, String>) -> Self {
    let mut items = vec![GStreamerInputBuilderItem::CameraSource {
      camera: path.to_string(),
      io_mode: query.get("io-mode").and_then(|v| v.parse::<u32>().ok()),
      format: query
        .get("format")
        .map(String::from)
        .unwrap_or(String::from("YUY2")),
      width: query_u32(query, "width", 640),
      height: query_u32(query, "height", 480),
      fps: query_u32(query, "fps", 15),
    }];

    if let Some(method) = orientation(query).filter(|m| *m != 0) {
      items.push(GStreamerInputBuilderItem::VideoFlip { method });
    }

    GStreamerInputPipelineBuilder {
      items,
      timeout: DEFAULT_PULL_TIMEOUT,
    }
  }

  fn build_file_pipeline(path: &str, query: &HashMap<String, String>) -> Self {
    let mut items = vec![GStreamerInputBuilderItem::FileSource(path.to_string())];

    if let Some(method) = orientation(query).filter(|m| *m != 0) {
      items.push(GStreamerInputBuilderItem::VideoFlip { method });
    }

    GStreamerInputPipelineBuilder {
      items,
      timeout: DEFAULT_PULL_TIMEOUT,
    }
  }

  pub fn timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  pub fn pipeline_description(&self) -> String {
    let basic_pipeline = self
      .items
      .iter()
      .map(GStreamerInputBuilderItem::to_pipeline)
      .collect::<Vec<String>>()
      .join(" ! ");
    format!(
      "{} ! appsink max-buffers=2 drop=true sync=false name=sink",
      basic_pipeline
    )
  }

  pub fn build(self) -> Result<GStreamerInput, GStreamerInputError> {
    gst::init()?;

    let full_pipeline = self.pipeline_description();
    info!("GStreamer pipeline description: {}", full_pipeline);

    let pipeline = gst::parse::launch(&full_pipeline)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerInputError::PipelineError("Failed to create pipeline".to_string()))?;

    let appsink = pipeline
      .by_name("sink")
      .ok_or(GStreamerInputError::AppSinkNotFound)?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| GStreamerInputError::AppSinkConversionFailed)?;

    pipeline.set_state(gst::State::Playing)?;
    info!("摄像头管道已启动");

    Ok(GStreamerInput {
      pipeline: Some(pipeline),
      appsink,
      timeout: self.timeout,
    })
  }
}

impl FromUrlWithScheme for GStreamerInputPipelineBuilder {
  const SCHEME: &'static str = "gst";
}

impl FromUrl for GStreamerInputPipelineBuilder {
  type Error = GStreamerInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(GStreamerInputError::SchemeMismatch);
    }

    let query: HashMap<String, String> = url
      .query_pairs()
      .map(|(k, v)| (String::from(k), String::from(v)))
      .collect();
    let path = decoded_path(url);

    let mut builder = match url.host_str() {
      Some("csi") => Self::build_csi_pipeline(&path, &query),
      Some("camera") => Self::build_video_pipline(&path, &query),
      Some("file") => Self::build_file_pipeline(&path, &query),
      _ => {
        return Err(GStreamerInputError::SchemeMismatch);
      }
    };

    builder.items.push(GStreamerInputBuilderItem::TargetFormat {
      format: "RGB".to_string(),
    });

    if let Some(timeout) = query.get("timeout_ms").and_then(|v| v.parse::<u64>().ok()) {
      builder.timeout = Duration::from_millis(timeout);
    }

    Ok(builder)
  }
}

/// GStreamer 视频输入
///
/// 持有管道与 appsink；`close` 或 drop 时把管道置为 Null。
pub struct GStreamerInput {
  pipeline: Option<gst::Pipeline>,
  appsink: gst_app::AppSink,
  timeout: Duration,
}

impl Drop for GStreamerInput {
  fn drop(&mut self) {
    if let Err(e) = self.close() {
      warn!("Failed to stop GStreamer pipeline: {}", e);
    }
  }
}

impl FrameProvider for GStreamerInput {
  type Error = GStreamerInputError;

  fn read(&mut self) -> Result<Frame, Self::Error> {
    if self.pipeline.is_none() {
      return Err(GStreamerInputError::Closed);
    }

    let timeout = gst::ClockTime::from_mseconds(self.timeout.as_millis() as u64);
    let sample = self
      .appsink
      .try_pull_sample(timeout)
      .ok_or(GStreamerInputError::NoSample)?;
    convert_sample_to_image(&sample).map(Frame::from)
  }

  fn close(&mut self) -> Result<(), Self::Error> {
    if let Some(pipeline) = self.pipeline.take() {
      info!("释放摄像头管道");
      pipeline.set_state(gst::State::Null)?;
    }
    Ok(())
  }
}

fn convert_sample_to_image(sample: &gst::Sample) -> Result<RgbImage, GStreamerInputError> {
  let buffer = sample
    .buffer()
    .ok_or_else(|| GStreamerInputError::PipelineError("No buffer in sample".to_string()))?;
  let caps = sample
    .caps()
    .ok_or_else(|| GStreamerInputError::PipelineError("No caps in sample".to_string()))?;

  let video_info =
    gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;

  let width = video_info.width() as usize;
  let height = video_info.height() as usize;
  let stride = video_info.stride()[0] as usize;

  let map = buffer.map_readable().map_err(|e| {
    GStreamerInputError::PipelineError(format!("Failed to map buffer for reading: {}", e))
  })?;
  let data = map.as_slice();

  let expected_size = stride * (height.saturating_sub(1)) + width * 3;
  if data.len() < expected_size {
    return Err(GStreamerInputError::BufferSizeMismatch {
      expected: expected_size,
      actual: data.len(),
    });
  }

  // 行之间可能有对齐填充，逐行拷贝
  let mut pixels = Vec::with_capacity(width * height * 3);
  match video_info.format() {
    gst_video::VideoFormat::Rgb => {
      for h in 0..height {
        pixels.extend_from_slice(&data[h * stride..h * stride + width * 3]);
      }
    }
    gst_video::VideoFormat::Bgr => {
      for h in 0..height {
        for bgr in data[h * stride..h * stride + width * 3].chunks_exact(3) {
          pixels.extend_from_slice(&[bgr[2], bgr[1], bgr[0]]);
        }
      }
    }
    _ => return Err(GStreamerInputError::UnsupportedFormat),
  }

  debug!("取得一帧: {}x{}", width, height);
  RgbImage::from_raw(width as u32, height as u32, pixels).ok_or(
    GStreamerInputError::BufferSizeMismatch {
      expected: width * height * 3,
      actual: 0,
    },
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  fn description(url: &str) -> String {
    let url = Url::parse(url).unwrap();
    GStreamerInputPipelineBuilder::from_url(&url)
      .unwrap()
      .pipeline_description()
  }

  #[test]
  fn csi_pipeline_uses_flip_method() {
    let pipeline = description("gst://csi/0?orientation=2");
    assert!(pipeline.starts_with("nvarguscamerasrc sensor-id=0 ! "));
    assert!(pipeline.contains("width=(int)1920,height=(int)1080,framerate=(fraction)30/1"));
    assert!(pipeline.contains("nvvidconv flip-method=2"));
    assert!(pipeline.contains("width=(int)960,height=(int)540,format=(string)BGRx"));
    assert!(pipeline.ends_with(
      "videoconvert ! video/x-raw,format=RGB ! appsink max-buffers=2 drop=true sync=false name=sink"
    ));
  }

  #[test]
  fn camera_pipeline_with_rotation() {
    let pipeline = description("gst://camera/dev/video0?width=320&height=240&fps=10&rotate=90");
    assert!(pipeline.starts_with(
      "v4l2src device=/dev/video0 ! video/x-raw,format=YUY2,width=320,height=240,framerate=10/1 ! videoflip method=1"
    ));
  }

  #[test]
  fn file_pipeline_without_rotation() {
    let pipeline = description("gst://file/tmp/my%20clip.mp4");
    assert!(
      pipeline.starts_with("filesrc location=\"/tmp/my clip.mp4\" ! decodebin ! videoconvert")
    );
    assert!(!pipeline.contains("videoflip"));
  }

  #[test]
  fn unknown_host_or_scheme_is_rejected() {
    let url = Url::parse("gst://screen/0").unwrap();
    assert!(GStreamerInputPipelineBuilder::from_url(&url).is_err());
    let url = Url::parse("image:///tmp/a.png").unwrap();
    assert!(GStreamerInputPipelineBuilder::from_url(&url).is_err());
  }
}
