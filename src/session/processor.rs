// 该文件是 Kanzi （看字） 项目的一部分。
// src/session/processor.rs - 命令处理器
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{
  fmt::Display,
  io::Write,
  path::Path,
  sync::{Arc, Mutex, mpsc::Receiver},
};

use tracing::{debug, info, warn};

use crate::{
  frame::Frame,
  input::FrameProvider,
  model::{Adapter, Detection, OcrModel, Recognition},
  output::{DetectionRecord, OutputError, SaveImageFileOutput, Surface},
  session::{
    Command, Mode, PROMPT, Request, Session, SessionError, compose, lock_or_recover,
  },
};

/// 识别/检测失败或为空时是否冻结画面
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PausePolicy {
  pub detect_failure: bool,
  pub recognize_empty: bool,
  pub recognize_failure: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
  Continue,
  Quit,
}

pub struct CommandProcessor<P, M, S, W> {
  provider: Arc<Mutex<P>>,
  adapter: Adapter<M>,
  session: Arc<Session<S>>,
  policy: PausePolicy,
  out: W,
}

impl<P, M, S, W> CommandProcessor<P, M, S, W>
where
  P: FrameProvider,
  M: OcrModel,
  M::Error: Display,
  S: Surface,
  W: Write,
{
  pub fn new(
    provider: Arc<Mutex<P>>,
    adapter: Adapter<M>,
    session: Arc<Session<S>>,
    policy: PausePolicy,
    out: W,
  ) -> Self {
    Self {
      provider,
      adapter,
      session,
      policy,
      out,
    }
  }

  /// 逐条处理命令，收到退出命令、中断或通道关闭时返回
  pub fn run(&mut self, requests: &Receiver<Request>) {
    info!("命令处理器启动");
    loop {
      self.prompt();
      let line = match requests.recv() {
        Ok(Request::Line(line)) => line,
        Ok(Request::Interrupt) | Err(_) => {
          info!("命令输入结束，退出会话");
          break;
        }
      };

      let command = match Command::parse(&line) {
        Ok(Some(command)) => command,
        Ok(None) => continue,
        Err(e) => {
          warn!("无效命令: {}", e);
          self.reply(format_args!("Error: {}", SessionError::from(e)));
          continue;
        }
      };

      match self.execute(command) {
        Ok(Flow::Quit) => break,
        Ok(Flow::Continue) => {}
        Err(e) => {
          warn!("命令执行失败: {}", e);
          self.reply(format_args!("Error: {}", e));
        }
      }
    }
    info!("命令处理器结束");
  }

  fn execute(&mut self, command: Command) -> Result<Flow, SessionError> {
    debug!("执行命令: {:?}", command);
    match command {
      Command::Capture { output } => self.capture(output.as_deref())?,
      Command::Detect { input, output } => self.detect(input.as_deref(), output.as_deref())?,
      Command::Recognize { input } => self.recognize(input.as_deref())?,
      Command::Resume => self.resume(),
      Command::Quit => return Ok(Flow::Quit),
    }
    Ok(Flow::Continue)
  }

  fn capture(&mut self, output: Option<&Path>) -> Result<(), SessionError> {
    let frame = self.read_provider()?;
    let writer = SaveImageFileOutput::new_or_default(output);
    let path = writer.save(&frame).map_err(OutputError::from)?;
    self.reply(format_args!("Image captured: {}", path.display()));
    Ok(())
  }

  fn detect(&mut self, input: Option<&Path>, output: Option<&Path>) -> Result<(), SessionError> {
    self.require_surface()?;
    let frame = self.acquire(input)?;

    let boxes = match self.adapter.detect(&frame) {
      Ok(Detection::Boxes(boxes)) => boxes,
      Ok(Detection::Empty) => Vec::new(),
      Err(e) => {
        if self.policy.detect_failure {
          self.freeze_if_viewing(frame);
        }
        return Err(e.into());
      }
    };

    {
      let mut guard = self.session.lock();
      let shared = &mut *guard;
      // 先冻结再绘制，渲染循环不会覆盖检测画面
      shared.state.pause(frame);
      shared.state.last_detections = Some(boxes.clone());
      compose::redraw_frozen(shared);
    }

    if boxes.is_empty() {
      self.reply("No text regions detected.");
      return Ok(());
    }

    let record = DetectionRecord::new_or_default(output);
    let path = record.write(&boxes).map_err(OutputError::from)?;
    self.reply(format_args!(
      "Detected {} text region(s), saved to {}",
      boxes.len(),
      path.display()
    ));
    Ok(())
  }

  fn recognize(&mut self, input: Option<&Path>) -> Result<(), SessionError> {
    self.require_surface()?;
    let frame = self.acquire(input)?;

    let recognition = match self.adapter.recognize(&frame) {
      Ok(recognition) => recognition,
      Err(e) => {
        if self.policy.recognize_failure {
          self.freeze_if_viewing(frame);
        }
        return Err(e.into());
      }
    };

    let text = recognition.text();
    let pause = recognition == Recognition::Empty && self.policy.recognize_empty;
    {
      let mut guard = self.session.lock();
      let shared = &mut *guard;
      shared.state.last_recognition_text = Some(text.clone());
      if pause && shared.state.mode == Mode::Viewing {
        shared.state.pause(frame);
      }
      if shared.state.mode == Mode::Paused {
        compose::redraw_frozen(shared);
      }
    }

    self.reply(format_args!("Recognized text:\n{}", text));
    Ok(())
  }

  fn resume(&mut self) {
    let resumed = self.session.lock().state.resume();
    if resumed {
      info!("恢复实时画面");
      self.reply("Live view resumed.");
    } else {
      warn!("当前不是暂停状态，忽略恢复命令");
      self.reply("Live view is already running.");
    }
  }

  fn require_surface(&self) -> Result<(), SessionError> {
    if self.session.has_surface() {
      Ok(())
    } else {
      Err(SessionError::NoSurface)
    }
  }

  fn read_provider(&self) -> Result<Arc<Frame>, SessionError> {
    lock_or_recover(&self.provider)
      .read()
      .map(Arc::new)
      .map_err(|e| SessionError::Acquisition(e.to_string()))
  }

  /// 指定文件时读取文件；暂停时沿用冻结画面；否则从输入读取一帧并记为最近帧
  fn acquire(&self, input: Option<&Path>) -> Result<Arc<Frame>, SessionError> {
    if let Some(path) = input {
      return load_image(path);
    }
    if let Some(frozen) = self.session.lock().state.frozen.clone() {
      debug!("暂停中，使用冻结画面");
      return Ok(frozen);
    }
    let frame = self.read_provider()?;
    self.session.lock().state.last_frame = Some(frame.clone());
    Ok(frame)
  }

  fn freeze_if_viewing(&self, frame: Arc<Frame>) {
    let mut guard = self.session.lock();
    let shared = &mut *guard;
    if shared.state.mode == Mode::Viewing {
      shared.state.pause(frame);
      compose::redraw_frozen(shared);
    }
  }

  fn prompt(&mut self) {
    if let Err(e) = write!(self.out, "{}", PROMPT).and_then(|_| self.out.flush()) {
      debug!("写入提示失败: {}", e);
    }
  }

  fn reply(&mut self, message: impl Display) {
    if let Err(e) = writeln!(self.out, "{}", message) {
      debug!("写入命令回复失败: {}", e);
    }
  }
}

#[cfg(feature = "read_image_file")]
fn load_image(path: &Path) -> Result<Arc<Frame>, SessionError> {
  crate::input::ImageFileInput::load(path)
    .map(Arc::new)
    .map_err(|e| SessionError::Acquisition(format!("{}: {}", path.display(), e)))
}

#[cfg(not(feature = "read_image_file"))]
fn load_image(path: &Path) -> Result<Arc<Frame>, SessionError> {
  Err(SessionError::Acquisition(format!(
    "{}: image file input is disabled",
    path.display()
  )))
}
