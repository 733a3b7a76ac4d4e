// 该文件是 Kanzi （看字） 项目的一部分。
// src/model/ppocr.rs - PP-OCR 检测/识别模型
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::collections::{BTreeMap, HashMap};

use image::{GrayImage, Luma, RgbImage};
use imageproc::region_labelling::{Connectivity, connected_components};
use rknpu::{Context, InitFlags};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, decoded_path,
  frame::{AsNhwcFrame, Frame, FrameFormat, RgbNhwcFrame},
  model::{DetectionBox, OcrModel, OcrOutput, OcrTask, TextLine},
};

const PPOCR_NUM_INPUTS: u32 = 1;
const PPOCR_NUM_OUTPUTS: u32 = 1;
const PPOCR_DET_W: u32 = 480;
const PPOCR_DET_H: u32 = 480;
const PPOCR_REC_W: u32 = 320;
const PPOCR_REC_H: u32 = 48;

const DET_BINARY_THRESH: f32 = 0.3;
const DET_BOX_THRESH: f32 = 0.6;
const DET_MIN_SIZE: f32 = 3.0;
const DET_UNCLIP_RATIO: f32 = 1.5;
// 同一行判定的纵向容差（源图像像素）
const DET_ROW_TOLERANCE: f32 = 10.0;

pub struct PpOcr {
  det: Context,
  rec: Context,
  characters: Vec<String>,
}

#[derive(Error, Debug)]
pub enum PpOcrError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(std::io::Error),
  #[error("模型无效: {0}, 错误: {1}")]
  ModelInvalid(String, rknpu::Error),
  #[error("RKNN 错误: {0}")]
  RknnError(rknpu::Error),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("模型输出错误: {0}")]
  OutputError(String),
}

impl From<std::io::Error> for PpOcrError {
  fn from(err: std::io::Error) -> Self {
    PpOcrError::ModelLoadError(err)
  }
}

impl From<rknpu::Error> for PpOcrError {
  fn from(err: rknpu::Error) -> Self {
    PpOcrError::RknnError(err)
  }
}

impl PpOcrError {
  pub fn invalid(msg: &str, e: rknpu::Error) -> Self {
    PpOcrError::ModelInvalid(msg.to_string(), e)
  }
}

/// 从 `ppocr:///det.rknn?rec=/rec.rknn&keys=/ppocr_keys_v1.txt` 构建
pub struct PpOcrBuilder {
  det_path: String,
  rec_path: String,
  keys_path: String,
  flags: InitFlags,
}

impl FromUrlWithScheme for PpOcrBuilder {
  const SCHEME: &'static str = "ppocr";
}

impl FromUrl for PpOcrBuilder {
  type Error = PpOcrError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(PpOcrError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let query: HashMap<String, String> = url
      .query_pairs()
      .map(|(k, v)| (String::from(k), String::from(v)))
      .collect();
    let required = |key: &str| {
      query
        .get(key)
        .cloned()
        .ok_or_else(|| PpOcrError::ModelPathError(format!("缺少参数 {}", key)))
    };

    Ok(PpOcrBuilder {
      det_path: decoded_path(url),
      rec_path: required("rec")?,
      keys_path: required("keys")?,
      flags: InitFlags::default(),
    })
  }
}

impl PpOcrBuilder {
  pub fn flags(mut self, flags: InitFlags) -> Self {
    self.flags = flags;
    self
  }

  fn load_context(path: &str, flags: InitFlags) -> Result<Context, PpOcrError> {
    info!("加载模型文件: {}", path);
    let model_data = std::fs::read(path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    let context = Context::new(&model_data, flags)?;

    let num_inputs = context
      .num_inputs()
      .map_err(|e| PpOcrError::invalid("无法获取输入数量", e))?;
    let num_outputs = context
      .num_outputs()
      .map_err(|e| PpOcrError::invalid("无法获取输出数量", e))?;
    if num_inputs != PPOCR_NUM_INPUTS || num_outputs != PPOCR_NUM_OUTPUTS {
      error!(
        "预期模型输入/输出数量为 {}/{}, 实际为 {}/{}",
        PPOCR_NUM_INPUTS, PPOCR_NUM_OUTPUTS, num_inputs, num_outputs
      );
      return Err(PpOcrError::invalid(
        &format!("模型 {} 的输入/输出数量不符合 PP-OCR", path),
        rknpu::Error::InvalidModel,
      ));
    }

    Ok(context)
  }

  pub fn build(self) -> Result<PpOcr, PpOcrError> {
    let det = Self::load_context(&self.det_path, self.flags.clone())?;
    let rec = Self::load_context(&self.rec_path, self.flags)?;

    info!("加载字典文件: {}", self.keys_path);
    let mut characters: Vec<String> = std::fs::read_to_string(&self.keys_path)?
      .lines()
      .map(String::from)
      .collect();
    characters.push(" ".to_string());
    info!("模型加载完成，字典大小: {}", characters.len());

    Ok(PpOcr {
      det,
      rec,
      characters,
    })
  }
}

impl PpOcr {
  fn detect(&self, image: &RgbImage) -> Result<Vec<DetectionBox>, PpOcrError> {
    let tensor = RgbNhwcFrame::<PPOCR_DET_W, PPOCR_DET_H>::stretched(image);
    self
      .det
      .set_input(0, tensor.as_nhwc(), tensor.tensor_format(), tensor.tensor_type())?;
    self.det.run()?;

    let output = self.det.get_outputs()?;
    let prob: &[f32] = output
      .get_f32(0)
      .map_err(|e| PpOcrError::OutputError(format!("{}", e)))?;

    let expected = (PPOCR_DET_W * PPOCR_DET_H) as usize;
    if prob.len() != expected {
      return Err(PpOcrError::OutputError(format!(
        "检测输出大小 {} 与期望 {} 不符",
        prob.len(),
        expected
      )));
    }

    Ok(boxes_from_probability(
      prob,
      PPOCR_DET_W,
      PPOCR_DET_H,
      image.width(),
      image.height(),
    ))
  }

  fn recognize(
    &self,
    image: &RgbImage,
    bbox: &DetectionBox,
  ) -> Result<Option<TextLine>, PpOcrError> {
    let rect = bbox.bounding_rect();
    let x = rect.x1().max(0) as u32;
    let y = rect.y1().max(0) as u32;
    let width = (rect.width().max(0) as u32).min(image.width().saturating_sub(x));
    let height = (rect.height().max(0) as u32).min(image.height().saturating_sub(y));
    if width == 0 || height == 0 {
      return Ok(None);
    }

    let crop = image::imageops::crop_imm(image, x, y, width, height).to_image();
    let tensor = RgbNhwcFrame::<PPOCR_REC_W, PPOCR_REC_H>::padded(&crop);
    self
      .rec
      .set_input(0, tensor.as_nhwc(), tensor.tensor_format(), tensor.tensor_type())?;
    self.rec.run()?;

    let output = self.rec.get_outputs()?;
    let logits: &[f32] = output
      .get_f32(0)
      .map_err(|e| PpOcrError::OutputError(format!("{}", e)))?;
    let (text, score) = ctc_decode(logits, &self.characters)?;

    Ok(Some(TextLine {
      bbox: bbox.clone(),
      text,
      score,
    }))
  }
}

impl OcrModel for PpOcr {
  type Error = PpOcrError;

  fn infer(&self, frame: &Frame, task: OcrTask) -> Result<OcrOutput, Self::Error> {
    let image = frame.image();
    debug!("执行文本检测模型");
    let boxes = self.detect(image)?;
    debug!("检测到 {} 个文本框", boxes.len());

    let mut lines = Vec::new();
    if task.recognition {
      debug!("执行文字识别模型");
      for bbox in boxes.iter() {
        if let Some(line) = self.recognize(image, bbox)? {
          debug!("识别结果: {} ({:.2})", line.text, line.score);
          lines.push(line);
        }
      }
    }

    Ok(OcrOutput {
      boxes: if task.detection { boxes } else { Vec::new() },
      lines,
    })
  }
}

#[derive(Debug)]
struct Region {
  x_min: u32,
  y_min: u32,
  x_max: u32,
  y_max: u32,
  score_sum: f32,
  pixels: u32,
}

impl Region {
  fn new(x: u32, y: u32) -> Self {
    Self {
      x_min: x,
      y_min: y,
      x_max: x,
      y_max: y,
      score_sum: 0.0,
      pixels: 0,
    }
  }

  fn add(&mut self, x: u32, y: u32, score: f32) {
    self.x_min = self.x_min.min(x);
    self.y_min = self.y_min.min(y);
    self.x_max = self.x_max.max(x);
    self.y_max = self.y_max.max(y);
    self.score_sum += score;
    self.pixels += 1;
  }

  fn to_box(&self, map_w: u32, map_h: u32, scale_x: f32, scale_y: f32) -> Option<DetectionBox> {
    let width = (self.x_max - self.x_min + 1) as f32;
    let height = (self.y_max - self.y_min + 1) as f32;
    if width.min(height) < DET_MIN_SIZE {
      return None;
    }

    let score = self.score_sum / self.pixels.max(1) as f32;
    if score < DET_BOX_THRESH {
      return None;
    }

    // 按面积/周长外扩，补偿概率图收缩
    let distance = width * height * DET_UNCLIP_RATIO / (2.0 * (width + height));
    let x1 = (self.x_min as f32 - distance).max(0.0) * scale_x;
    let y1 = (self.y_min as f32 - distance).max(0.0) * scale_y;
    let x2 = ((self.x_max + 1) as f32 + distance).min(map_w as f32) * scale_x;
    let y2 = ((self.y_max + 1) as f32 + distance).min(map_h as f32) * scale_y;

    Some(DetectionBox::from_corners([
      (x1, y1),
      (x2, y1),
      (x2, y2),
      (x1, y2),
    ]))
  }
}

/// 概率图二值化、连通域提取，得到源图像坐标下的文本框
fn boxes_from_probability(
  prob: &[f32],
  map_w: u32,
  map_h: u32,
  source_w: u32,
  source_h: u32,
) -> Vec<DetectionBox> {
  let score_at = |x: u32, y: u32| prob[(y * map_w + x) as usize];

  let bitmap = GrayImage::from_fn(map_w, map_h, |x, y| {
    if score_at(x, y) > DET_BINARY_THRESH {
      Luma([255u8])
    } else {
      Luma([0u8])
    }
  });
  let labels = connected_components(&bitmap, Connectivity::Eight, Luma([0u8]));

  let mut regions: BTreeMap<u32, Region> = BTreeMap::new();
  for (x, y, label) in labels.enumerate_pixels() {
    if label[0] == 0 {
      continue;
    }
    regions
      .entry(label[0])
      .or_insert_with(|| Region::new(x, y))
      .add(x, y, score_at(x, y));
  }

  let scale_x = source_w as f32 / map_w as f32;
  let scale_y = source_h as f32 / map_h as f32;
  let mut boxes: Vec<DetectionBox> = regions
    .values()
    .filter_map(|region| region.to_box(map_w, map_h, scale_x, scale_y))
    .collect();

  sort_reading_order(&mut boxes);
  boxes
}

/// 从上到下排序，同一行内从左到右
fn sort_reading_order(boxes: &mut [DetectionBox]) {
  fn top_left(bbox: &DetectionBox) -> (f32, f32) {
    let p = bbox.points()[0];
    (p.y, p.x)
  }

  boxes.sort_by(|a, b| {
    let (ay, ax) = top_left(a);
    let (by, bx) = top_left(b);
    ay.total_cmp(&by).then(ax.total_cmp(&bx))
  });

  for i in 0..boxes.len().saturating_sub(1) {
    for j in (0..=i).rev() {
      let (ay, ax) = top_left(&boxes[j]);
      let (by, bx) = top_left(&boxes[j + 1]);
      if (by - ay).abs() < DET_ROW_TOLERANCE && bx < ax {
        boxes.swap(j, j + 1);
      } else {
        break;
      }
    }
  }
}

/// CTC 贪心解码，0 为空白符，相邻重复合并
fn ctc_decode(logits: &[f32], characters: &[String]) -> Result<(String, f32), PpOcrError> {
  let classes = characters.len() + 1;
  if logits.is_empty() || logits.len() % classes != 0 {
    return Err(PpOcrError::OutputError(format!(
      "识别输出大小 {} 不是类别数 {} 的整数倍",
      logits.len(),
      classes
    )));
  }

  let mut text = String::new();
  let mut scores = Vec::new();
  let mut previous = None;
  for step in logits.chunks_exact(classes) {
    let (index, value) = step
      .iter()
      .copied()
      .enumerate()
      .fold((0usize, f32::MIN), |best, (i, v)| if v > best.1 { (i, v) } else { best });

    if index != 0 && previous != Some(index) {
      text.push_str(&characters[index - 1]);
      scores.push(value);
    }
    previous = Some(index);
  }

  let score = if scores.is_empty() {
    0.0
  } else {
    scores.iter().sum::<f32>() / scores.len() as f32
  };
  Ok((text, score))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn chars(list: &[&str]) -> Vec<String> {
    list.iter().map(|c| c.to_string()).collect()
  }

  fn one_hot(classes: usize, steps: &[usize]) -> Vec<f32> {
    let mut logits = vec![0.0; classes * steps.len()];
    for (t, index) in steps.iter().enumerate() {
      logits[t * classes + index] = 1.0;
    }
    logits
  }

  #[test]
  fn ctc_collapses_repeats_and_blanks() {
    let characters = chars(&["a", "b", "c", " "]);
    // a a _ a b b _ c
    let logits = one_hot(5, &[1, 1, 0, 1, 2, 2, 0, 3]);
    let (text, score) = ctc_decode(&logits, &characters).unwrap();
    assert_eq!(text, "aabc");
    assert!((score - 1.0).abs() < 1e-6);
  }

  #[test]
  fn ctc_rejects_misaligned_output() {
    let characters = chars(&["a", "b"]);
    assert!(ctc_decode(&[0.0; 7], &characters).is_err());
    assert!(ctc_decode(&[], &characters).is_err());
  }

  fn paint(
    prob: &mut [f32],
    map_w: u32,
    xs: std::ops::RangeInclusive<u32>,
    ys: std::ops::RangeInclusive<u32>,
    value: f32,
  ) {
    for y in ys {
      for x in xs.clone() {
        prob[(y * map_w + x) as usize] = value;
      }
    }
  }

  #[test]
  fn probability_map_to_boxes_in_reading_order() {
    let (map_w, map_h) = (20u32, 10u32);
    let mut prob = vec![0.0f32; (map_w * map_h) as usize];
    // 右侧文本块，位置略高
    paint(&mut prob, map_w, 10..=14, 2..=4, 0.9);
    // 左侧文本块，同一行
    paint(&mut prob, map_w, 1..=4, 3..=5, 0.9);
    // 平均分数过低
    paint(&mut prob, map_w, 10..=14, 7..=9, 0.4);
    // 尺寸过小
    paint(&mut prob, map_w, 0..=0, 9..=9, 0.9);

    let boxes = boxes_from_probability(&prob, map_w, map_h, 40, 20);
    assert_eq!(boxes.len(), 2);
    assert_eq!(boxes[0].bounding_rect().x1(), 0);
    assert_eq!(boxes[1].bounding_rect().x1(), 17);
    assert!(boxes.iter().all(|b| b.points().len() == 4));
  }

  #[test]
  fn builder_requires_rec_and_keys() {
    let url = Url::parse("ppocr:///models/det.rknn?rec=/models/rec.rknn").unwrap();
    assert!(matches!(
      PpOcrBuilder::from_url(&url),
      Err(PpOcrError::ModelPathError(_))
    ));

    let url = Url::parse("onnx:///models/det.onnx").unwrap();
    assert!(PpOcrBuilder::from_url(&url).is_err());

    let url =
      Url::parse("ppocr:///models/my%20det.rknn?rec=/models/rec.rknn&keys=/models/keys.txt")
        .unwrap();
    let builder = PpOcrBuilder::from_url(&url).unwrap();
    assert_eq!(builder.det_path, "/models/my det.rknn");
    assert_eq!(builder.keys_path, "/models/keys.txt");
  }
}
