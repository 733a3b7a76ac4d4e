// 该文件是 Kanzi （看字） 项目的一部分。
// src/main.rs - 项目主程序
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

mod args;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use tracing::info;

use kanzi::{
  FromUrl,
  input::{ImageFileInput, InputWrapper},
  model::{Adapter, PpOcr, PpOcrBuilder},
  output::{Canvas, GStreamerDisplayOutput},
  task::{Console, ImageDetectTask, ImageRecognizeTask, LiveViewTask, Task},
};

use crate::args::{Args, Commands, ViewArgs};

fn run_view(view: ViewArgs, model: PpOcr) -> Result<()> {
  let source = view.source_url();
  info!("输入来源: {}", source);
  let input = InputWrapper::from_url(&source)?;

  let config = view.session_config();
  let surface = if view.no_display {
    info!("未启用显示，检测与识别命令不可用");
    None
  } else {
    let sink = GStreamerDisplayOutput::new(
      &view.display,
      config.surface_width,
      config.surface_height,
      view.fps,
    )?;
    Some(Canvas::new(config.surface_width, config.surface_height, sink).with_font_file(&view.font))
  };

  LiveViewTask::new(surface, config).run_task(input, Adapter::new(model), Console::stdio())
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  let Some(command) = args.command else {
    Args::command().print_help()?;
    println!();
    return Ok(());
  };

  info!("模型地址: {}", args.model);
  let model = PpOcrBuilder::from_url(&args.model)?.build()?;

  match command {
    Commands::View(view) => run_view(view, model),
    Commands::ImageDetect { input, output } => {
      info!("检测图片: {}", input.display());
      ImageDetectTask::default().with_output(output).run_task(
        ImageFileInput::open(&input)?,
        Adapter::new(model),
        std::io::stdout(),
      )
    }
    Commands::ImageRecognize { input } => {
      info!("识别图片: {}", input.display());
      ImageRecognizeTask.run_task(
        ImageFileInput::open(&input)?,
        Adapter::new(model),
        std::io::stdout(),
      )
    }
  }
}
