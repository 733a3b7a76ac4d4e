// 该文件是 Kanzi （看字） 项目的一部分。
// src/task.rs - 任务定义
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

use std::{
  fmt::Display,
  io::{BufRead, BufReader, Stdin, Stdout, Write},
  path::PathBuf,
  sync::{
    Arc, Mutex,
    mpsc::{self, Sender},
  },
  thread,
};

use tracing::{info, warn};

use crate::{
  input::FrameProvider,
  model::{Adapter, Detection, OcrModel},
  output::{DetectionRecord, Surface},
  session::{
    CommandProcessor, RenderLoop, Request, Session, SessionConfig, SessionError, lock_or_recover,
  },
};

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error>;
}

/// 关闭输入，失败只记录
fn release<P: FrameProvider>(input: &mut P) {
  match input.close() {
    Ok(()) => info!("输入已关闭"),
    Err(e) => warn!("{}", SessionError::Teardown(e.to_string())),
  }
}

/// 单张图片文本检测，有检测框时写入 XML
#[derive(Default, Debug)]
pub struct ImageDetectTask {
  output: Option<PathBuf>,
}

impl ImageDetectTask {
  pub fn with_output(mut self, output: Option<PathBuf>) -> Self {
    self.output = output;
    self
  }
}

impl<P, M, W> Task<P, Adapter<M>, W> for ImageDetectTask
where
  P: FrameProvider,
  M: OcrModel,
  M::Error: Display,
  W: Write,
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: P, model: Adapter<M>, mut output: W) -> Result<(), Self::Error> {
    info!("开始检测任务...");
    let frame = input.read();
    release(&mut input);
    let frame = frame?;

    match model.detect(&frame)? {
      Detection::Empty => writeln!(output, "No text regions detected.")?,
      Detection::Boxes(boxes) => {
        let record = DetectionRecord::new_or_default(self.output.as_deref());
        let path = record.write(&boxes)?;
        writeln!(
          output,
          "Detected {} text region(s), saved to {}",
          boxes.len(),
          path.display()
        )?;
      }
    }
    Ok(())
  }
}

/// 单张图片文字识别，结果打印到输出
#[derive(Default, Debug)]
pub struct ImageRecognizeTask;

impl<P, M, W> Task<P, Adapter<M>, W> for ImageRecognizeTask
where
  P: FrameProvider,
  M: OcrModel,
  M::Error: Display,
  W: Write,
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: P, model: Adapter<M>, mut output: W) -> Result<(), Self::Error> {
    info!("开始识别任务...");
    let frame = input.read();
    release(&mut input);
    let frame = frame?;

    let now = std::time::Instant::now();
    let recognition = model.recognize(&frame)?;
    info!("识别完成，耗时: {:.2?}", now.elapsed());
    writeln!(output, "{}", recognition.text())?;
    Ok(())
  }
}

/// 操作员的命令输入与回复输出
pub struct Console<R, W> {
  pub input: R,
  pub output: W,
}

impl Console<BufReader<Stdin>, Stdout> {
  pub fn stdio() -> Self {
    Console {
      input: BufReader::new(std::io::stdin()),
      output: std::io::stdout(),
    }
  }
}

/// 实时取景会话：渲染线程刷新画面，当前线程处理命令
pub struct LiveViewTask<S> {
  surface: Option<S>,
  config: SessionConfig,
  handle_interrupt: bool,
}

impl<S> LiveViewTask<S> {
  pub fn new(surface: Option<S>, config: SessionConfig) -> Self {
    Self {
      surface,
      config,
      handle_interrupt: true,
    }
  }

  /// 是否把 Ctrl-C 当作退出命令，进程内只能注册一次
  pub fn with_interrupt_handler(mut self, handle_interrupt: bool) -> Self {
    self.handle_interrupt = handle_interrupt;
    self
  }
}

/// 按行读取命令，输入结束时发送中断
fn spawn_reader<R>(input: R, tx: Sender<Request>) -> std::io::Result<thread::JoinHandle<()>>
where
  R: BufRead + Send + 'static,
{
  thread::Builder::new()
    .name("command-reader".to_string())
    .spawn(move || {
      for line in input.lines() {
        match line {
          Ok(line) => {
            if tx.send(Request::Line(line)).is_err() {
              return;
            }
          }
          Err(e) => {
            warn!("读取命令失败: {}", e);
            break;
          }
        }
      }
      let _ = tx.send(Request::Interrupt);
    })
}

impl<S> LiveViewTask<S>
where
  S: Surface + 'static,
{
  fn run_session<P, M, R, W>(
    self,
    provider: &Arc<Mutex<P>>,
    adapter: Adapter<M>,
    console: Console<R, W>,
  ) -> anyhow::Result<()>
  where
    P: FrameProvider + 'static,
    M: OcrModel,
    M::Error: Display,
    R: BufRead + Send + 'static,
    W: Write,
  {
    let session = Arc::new(Session::new(self.surface));
    let (tx, rx) = mpsc::channel();

    if self.handle_interrupt {
      let tx = tx.clone();
      ctrlc::set_handler(move || {
        info!("收到中断信号，准备退出...");
        let _ = tx.send(Request::Interrupt);
      })?;
    }

    // 阻塞在读取上的线程随进程退出
    spawn_reader(console.input, tx)?;

    let render = RenderLoop::new(provider.clone(), session.clone(), self.config.interval).spawn()?;

    let mut processor = CommandProcessor::new(
      provider.clone(),
      adapter,
      session.clone(),
      self.config.pause_policy,
      console.output,
    );
    processor.run(&rx);

    session.end();
    if render.join().is_err() {
      warn!("渲染线程异常退出");
    }
    Ok(())
  }
}

impl<S, P, M, R, W> Task<P, Adapter<M>, Console<R, W>> for LiveViewTask<S>
where
  S: Surface + 'static,
  P: FrameProvider + 'static,
  M: OcrModel,
  M::Error: Display,
  R: BufRead + Send + 'static,
  W: Write,
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    input: P,
    model: Adapter<M>,
    output: Console<R, W>,
  ) -> Result<(), Self::Error> {
    info!("开始实时取景会话...");
    let provider = Arc::new(Mutex::new(input));
    let outcome = self.run_session(&provider, model, output);
    release(&mut *lock_or_recover(&provider));
    info!("会话结束");
    outcome
  }
}
