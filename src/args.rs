// 该文件是 Kanzi （看字） 项目的一部分。
// src/args.rs - 项目参数配置
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{path::PathBuf, time::Duration};

use clap::{Parser, Subcommand};
use url::Url;

use kanzi::session::{PausePolicy, SessionConfig};

const DEFAULT_MODEL: &str =
  "ppocr:///opt/ppocr/det.rknn?rec=/opt/ppocr/rec.rknn&keys=/opt/ppocr/ppocr_keys_v1.txt";
const DEFAULT_SOURCE: &str = "gst://csi/0";
const DEFAULT_SINK: &str = "autovideosink";
const DEFAULT_FONT: &str = "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf";

/// Kanzi 看字：实时取景文字检测与识别
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// OCR 模型地址
  #[arg(long, global = true, value_name = "MODEL", default_value = DEFAULT_MODEL)]
  pub model: Url,

  #[command(subcommand)]
  pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
  /// 实时取景，从标准输入读取交互命令
  View(ViewArgs),
  /// 对单张图片做文本检测，结果写入 XML
  #[command(name = "image_detect")]
  ImageDetect {
    /// 输入图片
    #[arg(short, long, value_name = "INPUT")]
    input: PathBuf,
    /// XML 输出路径，默认 detection_result_<时间>.xml
    #[arg(short = 'x', long, value_name = "OUTPUT")]
    output: Option<PathBuf>,
  },
  /// 对单张图片做文字识别，结果打印到标准输出
  #[command(name = "image_recognize")]
  ImageRecognize {
    /// 输入图片
    #[arg(short, long, value_name = "INPUT")]
    input: PathBuf,
  },
}

#[derive(clap::Args, Debug)]
pub struct ViewArgs {
  /// 画面旋转：0 不旋转，1 为 90 度，2 为 180 度，3 为 270 度
  #[arg(short, long, value_parser = clap::value_parser!(u32).range(0..=3))]
  pub orientation: Option<u32>,

  /// 输入来源
  #[arg(long, value_name = "SOURCE", default_value = DEFAULT_SOURCE)]
  pub source: Url,

  /// GStreamer 显示 sink
  #[arg(long, value_name = "SINK", default_value = DEFAULT_SINK)]
  pub display: String,

  /// 不打开显示窗口
  #[arg(long, conflicts_with = "display")]
  pub no_display: bool,

  #[arg(long, default_value_t = 800)]
  pub surface_width: u32,

  #[arg(long, default_value_t = 600)]
  pub surface_height: u32,

  /// 实时画面刷新帧率
  #[arg(long, default_value_t = 10)]
  pub fps: u32,

  /// 叠加文字使用的字体
  #[arg(long, value_name = "FONT", default_value = DEFAULT_FONT)]
  pub font: PathBuf,

  #[arg(long)]
  pub pause_on_detect_failure: bool,

  #[arg(long)]
  pub pause_on_recognize_empty: bool,

  #[arg(long)]
  pub pause_on_recognize_failure: bool,
}

impl ViewArgs {
  /// 把 `-o` 写入来源地址的 `orientation` 参数
  pub fn source_url(&self) -> Url {
    let mut url = self.source.clone();
    if let Some(orientation) = self.orientation {
      let pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "orientation" && key != "rotate")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
      url
        .query_pairs_mut()
        .clear()
        .extend_pairs(pairs)
        .append_pair("orientation", &orientation.to_string());
    }
    url
  }

  pub fn session_config(&self) -> SessionConfig {
    SessionConfig {
      surface_width: self.surface_width,
      surface_height: self.surface_height,
      interval: Duration::from_millis(1000 / self.fps.max(1) as u64),
      pause_policy: PausePolicy {
        detect_failure: self.pause_on_detect_failure,
        recognize_empty: self.pause_on_recognize_empty,
        recognize_failure: self.pause_on_recognize_failure,
      },
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use clap::CommandFactory;

  fn view(argv: &[&str]) -> ViewArgs {
    let args = Args::try_parse_from(argv).unwrap();
    match args.command {
      Some(Commands::View(view)) => view,
      other => panic!("expected view, got {:?}", other),
    }
  }

  #[test]
  fn command_definition_is_valid() {
    Args::command().debug_assert();
  }

  #[test]
  fn no_subcommand_is_allowed() {
    let args = Args::try_parse_from(["kanzi"]).unwrap();
    assert!(args.command.is_none());
    assert_eq!(args.model.scheme(), "ppocr");
  }

  #[test]
  fn view_defaults() {
    let view = view(&["kanzi", "view"]);
    assert_eq!(view.source_url().as_str(), "gst://csi/0");
    assert!(!view.no_display);
    let config = view.session_config();
    assert_eq!((config.surface_width, config.surface_height), (800, 600));
    assert_eq!(config.interval, Duration::from_millis(100));
    assert_eq!(config.pause_policy, PausePolicy::default());
  }

  #[test]
  fn orientation_is_appended_to_source() {
    let view = view(&[
      "kanzi",
      "view",
      "-o",
      "2",
      "--source",
      "gst://camera/dev/video0?fps=15&rotate=90",
    ]);
    assert_eq!(
      view.source_url().as_str(),
      "gst://camera/dev/video0?fps=15&orientation=2"
    );
  }

  #[test]
  fn orientation_out_of_range_is_rejected() {
    assert!(Args::try_parse_from(["kanzi", "view", "-o", "4"]).is_err());
  }

  #[test]
  fn pause_flags_and_model_after_subcommand() {
    let args = Args::try_parse_from([
      "kanzi",
      "view",
      "--no-display",
      "--pause-on-recognize-empty",
      "--model",
      "ppocr:///m/det.rknn?rec=/m/rec.rknn&keys=/m/keys.txt",
    ])
    .unwrap();
    assert_eq!(args.model.path(), "/m/det.rknn");
    let Some(Commands::View(view)) = args.command else {
      panic!("expected view");
    };
    assert!(view.no_display);
    assert!(view.session_config().pause_policy.recognize_empty);
  }

  #[test]
  fn batch_subcommands() {
    let args = Args::try_parse_from(["kanzi", "image_detect", "-i", "a.png", "-x", "b.xml"]).unwrap();
    assert!(matches!(
      args.command,
      Some(Commands::ImageDetect { ref input, output: Some(ref output) })
        if input == &PathBuf::from("a.png") && output == &PathBuf::from("b.xml")
    ));
    assert!(Args::try_parse_from(["kanzi", "image_recognize"]).is_err());
  }
}
