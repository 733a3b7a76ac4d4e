// 该文件是 Kanzi （看字） 项目的一部分。
// src/session/render_loop.rs - 实时画面渲染循环
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{
  sync::{Arc, Mutex},
  thread,
  time::{Duration, Instant},
};

use tracing::{debug, info, warn};

use crate::{
  input::FrameProvider,
  output::Surface,
  session::{Mode, Session, compose, lock_or_recover},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
  /// 画面冻结，未读取帧
  Suspended,
  Drawn,
  /// 读取帧失败，下一次继续
  NoFrame,
  Ended,
}

pub struct RenderLoop<P, S> {
  provider: Arc<Mutex<P>>,
  session: Arc<Session<S>>,
  interval: Duration,
}

impl<P, S> RenderLoop<P, S>
where
  P: FrameProvider + 'static,
  S: Surface + 'static,
{
  pub fn new(provider: Arc<Mutex<P>>, session: Arc<Session<S>>, interval: Duration) -> Self {
    Self {
      provider,
      session,
      interval,
    }
  }

  pub fn tick(&self) -> Tick {
    match self.session.mode() {
      Mode::Ended => return Tick::Ended,
      Mode::Paused => return Tick::Suspended,
      Mode::Viewing => {}
    }

    let frame = lock_or_recover(&self.provider).read();
    let frame = match frame {
      Ok(frame) => Arc::new(frame),
      Err(e) => {
        debug!("读取帧失败: {}", e);
        return Tick::NoFrame;
      }
    };

    let mut guard = self.session.lock();
    let shared = &mut *guard;
    // 读帧期间可能已被检测命令冻结
    match shared.state.mode {
      Mode::Ended => return Tick::Ended,
      Mode::Paused => return Tick::Suspended,
      Mode::Viewing => {}
    }

    shared.state.last_frame = Some(frame.clone());
    if let Some(surface) = shared.surface.as_mut() {
      let text = shared.state.last_recognition_text.as_deref();
      if let Err(e) = compose::draw_view(surface, &frame, &[], text) {
        warn!("实时画面显示失败: {}", e);
      }
    }
    Tick::Drawn
  }

  /// 按固定间隔刷新，直到会话结束
  pub fn run(&self) {
    info!("渲染循环启动，间隔: {:?}", self.interval);
    let mut drawn: u64 = 0;
    loop {
      let started = Instant::now();
      match self.tick() {
        Tick::Ended => break,
        Tick::Drawn => drawn += 1,
        Tick::Suspended | Tick::NoFrame => {}
      }
      let elapsed = started.elapsed();
      if elapsed < self.interval {
        thread::sleep(self.interval - elapsed);
      }
    }
    info!("渲染循环结束，共绘制 {} 帧", drawn);
  }

  pub fn spawn(self) -> std::io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
      .name("render-loop".to_string())
      .spawn(move || self.run())
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;
  use crate::{
    frame::Frame,
    session::compose::tests::{Op, RecordingSurface},
  };
  use image::RgbImage;
  use std::{
    collections::VecDeque,
    sync::atomic::{AtomicUsize, Ordering},
  };
  use thiserror::Error;

  #[derive(Error, Debug)]
  #[error("no frame available")]
  pub struct NoFrameError;

  /// 按顺序返回预设帧的输入，记录读取与关闭次数
  pub struct FakeProvider {
    pub frames: VecDeque<Result<Frame, NoFrameError>>,
    pub fallback: Option<(u32, u32)>,
    pub reads: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
  }

  impl FakeProvider {
    /// 每次读取都返回指定尺寸的黑帧
    pub fn endless(width: u32, height: u32) -> Self {
      Self {
        frames: VecDeque::new(),
        fallback: Some((width, height)),
        reads: Arc::new(AtomicUsize::new(0)),
        closes: Arc::new(AtomicUsize::new(0)),
      }
    }

    pub fn scripted(frames: Vec<Result<Frame, NoFrameError>>) -> Self {
      Self {
        frames: frames.into(),
        fallback: None,
        reads: Arc::new(AtomicUsize::new(0)),
        closes: Arc::new(AtomicUsize::new(0)),
      }
    }
  }

  impl FrameProvider for FakeProvider {
    type Error = NoFrameError;

    fn read(&mut self) -> Result<Frame, Self::Error> {
      self.reads.fetch_add(1, Ordering::SeqCst);
      if let Some(frame) = self.frames.pop_front() {
        return frame;
      }
      match self.fallback {
        Some((w, h)) => Ok(Frame::from(RgbImage::new(w, h))),
        None => Err(NoFrameError),
      }
    }

    fn close(&mut self) -> Result<(), Self::Error> {
      self.closes.fetch_add(1, Ordering::SeqCst);
      Ok(())
    }
  }

  fn setup(
    provider: FakeProvider,
  ) -> (
    RenderLoop<FakeProvider, RecordingSurface>,
    Arc<Session<RecordingSurface>>,
    RecordingSurface,
  ) {
    let surface = RecordingSurface::new(800, 600);
    let session = Arc::new(Session::new(Some(surface.clone())));
    let render = RenderLoop::new(
      Arc::new(Mutex::new(provider)),
      session.clone(),
      Duration::from_millis(1),
    );
    (render, session, surface)
  }

  #[test]
  fn draws_live_frames_while_viewing() {
    let (render, session, surface) = setup(FakeProvider::endless(1920, 1080));
    assert_eq!(render.tick(), Tick::Drawn);
    assert_eq!(
      surface.take(),
      vec![Op::Clear, Op::Image(1920, 1080), Op::Present]
    );
    assert!(session.lock().state.last_frame.is_some());
  }

  #[test]
  fn overlay_persists_across_frames() {
    let (render, session, surface) = setup(FakeProvider::endless(64, 48));
    session.lock().state.last_recognition_text = Some("HELLO".to_string());
    for _ in 0..3 {
      assert_eq!(render.tick(), Tick::Drawn);
      assert!(surface.take().contains(&Op::Text("HELLO".to_string())));
    }
  }

  #[test]
  fn paused_session_is_not_touched() {
    let provider = FakeProvider::endless(64, 48);
    let reads = provider.reads.clone();
    let (render, session, surface) = setup(provider);
    session
      .lock()
      .state
      .pause(Arc::new(Frame::from(RgbImage::new(2, 2))));

    assert_eq!(render.tick(), Tick::Suspended);
    assert_eq!(reads.load(Ordering::SeqCst), 0);
    assert!(surface.take().is_empty());
  }

  #[test]
  fn provider_failure_is_not_fatal() {
    let provider = FakeProvider::scripted(vec![
      Err(NoFrameError),
      Ok(Frame::from(RgbImage::new(8, 8))),
    ]);
    let (render, session, surface) = setup(provider);
    assert_eq!(render.tick(), Tick::NoFrame);
    assert!(surface.take().is_empty());
    assert!(session.lock().state.last_frame.is_none());
    assert_eq!(render.tick(), Tick::Drawn);
    assert_eq!(render.tick(), Tick::NoFrame);
  }

  #[test]
  fn run_stops_when_session_ends() {
    let (render, session, _surface) = setup(FakeProvider::endless(8, 8));
    let handle = render.spawn().unwrap();
    thread::sleep(Duration::from_millis(20));
    session.end();
    handle.join().unwrap();
    assert_eq!(session.mode(), Mode::Ended);
  }

  #[test]
  fn headless_session_still_records_frames() {
    let session = Arc::new(Session::<RecordingSurface>::new(None));
    let render = RenderLoop::new(
      Arc::new(Mutex::new(FakeProvider::endless(8, 8))),
      session.clone(),
      Duration::from_millis(1),
    );
    assert_eq!(render.tick(), Tick::Drawn);
    assert!(session.lock().state.last_frame.is_some());
  }
}
