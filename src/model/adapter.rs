// 该文件是 Kanzi （看字） 项目的一部分。
// src/model/adapter.rs - OCR 引擎适配层
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use thiserror::Error;
use tracing::{debug, info};

use crate::{
  frame::Frame,
  model::{DetectionBox, OcrModel, OcrTask},
};

/// 识别结果为空时写入会话的占位文本
pub const NO_TEXT_SENTINEL: &str = "No text was recognized";

#[derive(Error, Debug)]
pub enum AdapterError {
  #[error("OCR 引擎错误: {0}")]
  Engine(String),
}

/// 检测结果；空结果不是错误
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
  Empty,
  Boxes(Vec<DetectionBox>),
}

/// 识别结果；空结果不是错误
#[derive(Debug, Clone, PartialEq)]
pub enum Recognition {
  Empty,
  Lines(Vec<String>),
}

impl Recognition {
  /// 多行文本按引擎顺序以换行拼接，空结果返回占位文本
  pub fn text(&self) -> String {
    match self {
      Recognition::Empty => NO_TEXT_SENTINEL.to_string(),
      Recognition::Lines(lines) => lines.join("\n"),
    }
  }
}

pub struct Adapter<M> {
  model: M,
}

impl<M> Adapter<M>
where
  M: OcrModel,
  M::Error: std::fmt::Display,
{
  pub fn new(model: M) -> Self {
    Self { model }
  }

  pub fn detect(&self, frame: &Frame) -> Result<Detection, AdapterError> {
    info!("执行文本检测: {}x{}", frame.width(), frame.height());
    let now = std::time::Instant::now();
    let output = self
      .model
      .infer(frame, OcrTask::DETECT)
      .map_err(|e| AdapterError::Engine(e.to_string()))?;
    debug!("检测完成，耗时: {:.2?}, 共 {} 个框", now.elapsed(), output.boxes.len());

    if output.boxes.is_empty() {
      Ok(Detection::Empty)
    } else {
      Ok(Detection::Boxes(output.boxes))
    }
  }

  pub fn recognize(&self, frame: &Frame) -> Result<Recognition, AdapterError> {
    info!("执行文字识别: {}x{}", frame.width(), frame.height());
    let now = std::time::Instant::now();
    let output = self
      .model
      .infer(frame, OcrTask::RECOGNIZE)
      .map_err(|e| AdapterError::Engine(e.to_string()))?;
    debug!("识别完成，耗时: {:.2?}, 共 {} 行", now.elapsed(), output.lines.len());

    // 空行也保留，行数与引擎输出一致
    let lines: Vec<String> = output.lines.into_iter().map(|line| line.text).collect();
    if lines.is_empty() {
      Ok(Recognition::Empty)
    } else {
      Ok(Recognition::Lines(lines))
    }
  }
}
