// 该文件是 Guanlan （观澜） 项目的一部分。
// tests/lifecycle.rs - 组件挂载与卸载
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

use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use image::RgbImage;

use guanlan::{
  camera::{ReadyState, VideoElement},
  component::{Mounted, ObjectDetection, Phase, StatusHandle},
  detection::{BBox, Detection, ScaledDetection},
  frame::VideoFrame,
  geometry::Size,
  layout::CenteredLayout,
  loader::ModelBackend,
  model::Detector,
  output::NoOutput,
  render::Render,
  surface::OverlaySurface,
  task::LoopConfig,
};

struct StaticVideo {
  ready: ReadyState,
  frame: VideoFrame,
}

impl StaticVideo {
  fn new(ready: ReadyState) -> Arc<Self> {
    Arc::new(Self {
      ready,
      frame: VideoFrame::new(RgbImage::new(64, 48), 0, 0),
    })
  }
}

impl VideoElement for StaticVideo {
  fn ready_state(&self) -> ReadyState {
    self.ready
  }
  fn video_width(&self) -> u32 {
    self.frame.width()
  }
  fn video_height(&self) -> u32 {
    self.frame.height()
  }
  fn current_frame(&self) -> Option<VideoFrame> {
    Some(self.frame.clone())
  }
}

#[derive(Clone, Default)]
struct CountingDetector {
  calls: Arc<AtomicUsize>,
  fail: bool,
  delay: Duration,
  in_flight: Arc<AtomicBool>,
  overlapped: Arc<AtomicBool>,
}

impl Detector for CountingDetector {
  type Error = std::io::Error;

  fn detect(
    &self,
    _frame: &VideoFrame,
    _max_results: Option<usize>,
    _min_confidence: f32,
  ) -> Result<Vec<Detection>, Self::Error> {
    if self.in_flight.swap(true, Ordering::SeqCst) {
      self.overlapped.store(true, Ordering::SeqCst);
    }
    self.calls.fetch_add(1, Ordering::SeqCst);
    thread::sleep(self.delay);
    self.in_flight.store(false, Ordering::SeqCst);
    if self.fail {
      return Err(std::io::Error::other("推理设备忙"));
    }
    Ok(vec![Detection::new(
      "person",
      0.9,
      BBox::new(32.0, 24.0, 16.0, 12.0),
    )])
  }
}

struct SpyBackend {
  detector: CountingDetector,
  fail_load: bool,
  gate: Option<Receiver<()>>,
}

impl SpyBackend {
  fn new(detector: CountingDetector) -> Self {
    Self {
      detector,
      fail_load: false,
      gate: None,
    }
  }
}

impl ModelBackend for SpyBackend {
  type Model = CountingDetector;
  type Error = std::io::Error;

  fn name(&self) -> &str {
    "spy"
  }

  fn activate(&mut self) -> Result<(), Self::Error> {
    if let Some(gate) = self.gate.take() {
      let _ = gate.recv();
    }
    Ok(())
  }

  fn load(self) -> Result<Self::Model, Self::Error> {
    if self.fail_load {
      return Err(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        "模型文件不存在",
      ));
    }
    Ok(self.detector)
  }
}

#[derive(Clone, Default)]
struct CountingRender {
  calls: Arc<AtomicUsize>,
  last: Arc<Mutex<Vec<ScaledDetection>>>,
}

impl Render for CountingRender {
  type Error = Infallible;

  fn render(
    &self,
    detections: &[ScaledDetection],
    surface: &mut OverlaySurface,
  ) -> Result<(), Self::Error> {
    surface.clear();
    self.calls.fetch_add(1, Ordering::SeqCst);
    *self.last.lock().unwrap() = detections.to_vec();
    Ok(())
  }
}

fn layout() -> Arc<CenteredLayout> {
  Arc::new(CenteredLayout::new(
    Size::new(148.0, 106.0),
    Size::new(128.0, 96.0),
  ))
}

fn fast_config() -> LoopConfig {
  LoopConfig {
    interval: Duration::from_millis(1),
    ..LoopConfig::default()
  }
}

fn mount(
  backend: SpyBackend,
  video: Arc<StaticVideo>,
  render: CountingRender,
  config: LoopConfig,
) -> Mounted {
  ObjectDetection::new(backend, video, layout(), render, NoOutput)
    .with_config(config)
    .mount()
    .unwrap()
}

fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
  let deadline = Instant::now() + Duration::from_secs(5);
  while Instant::now() < deadline {
    if cond() {
      return true;
    }
    thread::sleep(Duration::from_millis(2));
  }
  cond()
}

fn wait_for_ticks(status: &StatusHandle, ticks: u64) -> bool {
  wait_until(|| status.snapshot().ticks >= ticks)
}

#[test]
fn detections_are_scaled_and_drawn() {
  let detector = CountingDetector::default();
  let render = CountingRender::default();
  let mounted = mount(
    SpyBackend::new(detector.clone()),
    StaticVideo::new(ReadyState::HaveEnoughData),
    render.clone(),
    fast_config(),
  );
  let status = mounted.status_handle();
  assert!(wait_until(|| status.snapshot().rendered >= 1));

  let snapshot = mounted.unmount();
  assert_eq!(snapshot.phase, Phase::Unmounted);
  // 64x48 显示为 128x96，缩放系数为 2
  let last = render.last.lock().unwrap().clone();
  assert_eq!(last.len(), 1);
  assert_eq!(last[0].bbox, BBox::new(64.0, 48.0, 32.0, 24.0));
  assert_eq!(snapshot.last_detections, last);
}

#[test]
fn no_ticks_after_unmount() {
  let detector = CountingDetector::default();
  let render = CountingRender::default();
  let mounted = mount(
    SpyBackend::new(detector.clone()),
    StaticVideo::new(ReadyState::HaveEnoughData),
    render.clone(),
    fast_config(),
  );
  assert!(wait_for_ticks(&mounted.status_handle(), 3));

  mounted.unmount();
  let detect_calls = detector.calls.load(Ordering::SeqCst);
  let render_calls = render.calls.load(Ordering::SeqCst);
  thread::sleep(Duration::from_millis(50));
  assert_eq!(detector.calls.load(Ordering::SeqCst), detect_calls);
  assert_eq!(render.calls.load(Ordering::SeqCst), render_calls);
}

#[test]
fn dropping_the_handle_cancels_the_loop() {
  let detector = CountingDetector::default();
  let mounted = mount(
    SpyBackend::new(detector.clone()),
    StaticVideo::new(ReadyState::HaveEnoughData),
    CountingRender::default(),
    fast_config(),
  );
  let status = mounted.status_handle();
  assert!(wait_for_ticks(&status, 2));

  drop(mounted);
  assert_eq!(status.phase(), Phase::Unmounted);
  let calls = detector.calls.load(Ordering::SeqCst);
  thread::sleep(Duration::from_millis(50));
  assert_eq!(detector.calls.load(Ordering::SeqCst), calls);
}

#[test]
fn video_not_ready_never_reaches_the_model() {
  let detector = CountingDetector::default();
  let render = CountingRender::default();
  let mounted = mount(
    SpyBackend::new(detector.clone()),
    StaticVideo::new(ReadyState::HaveFutureData),
    render.clone(),
    fast_config(),
  );
  let status = mounted.status_handle();
  assert!(wait_until(|| status.snapshot().skipped >= 5));

  let snapshot = mounted.unmount();
  assert_eq!(snapshot.rendered, 0);
  assert_eq!(detector.calls.load(Ordering::SeqCst), 0);
  assert_eq!(render.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn load_failure_is_an_explicit_state() {
  let detector = CountingDetector::default();
  let mut backend = SpyBackend::new(detector.clone());
  backend.fail_load = true;
  let mounted = mount(
    backend,
    StaticVideo::new(ReadyState::HaveEnoughData),
    CountingRender::default(),
    fast_config(),
  );
  let status = mounted.status_handle();
  assert!(wait_until(|| matches!(status.phase(), Phase::Failed(_))));

  let snapshot = mounted.unmount();
  let Phase::Failed(message) = snapshot.phase else {
    panic!("加载失败后应处于 Failed 状态");
  };
  assert!(message.contains("spy"));
  assert_eq!(snapshot.ticks, 0);
  assert_eq!(detector.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn loading_blocks_detection_until_backend_is_ready() {
  let detector = CountingDetector::default();
  let (release, gate) = mpsc::channel();
  let mut backend = SpyBackend::new(detector.clone());
  backend.gate = Some(gate);
  let mounted = mount(
    backend,
    StaticVideo::new(ReadyState::HaveEnoughData),
    CountingRender::default(),
    fast_config(),
  );
  let status = mounted.status_handle();

  thread::sleep(Duration::from_millis(30));
  assert_eq!(status.phase(), Phase::Loading);
  assert_eq!(detector.calls.load(Ordering::SeqCst), 0);

  release.send(()).unwrap();
  assert!(wait_until(|| status.phase() == Phase::Running));
  assert!(wait_for_ticks(&status, 1));
  mounted.unmount();
}

#[test]
fn repeated_failures_stop_the_loop() {
  let detector = CountingDetector {
    fail: true,
    ..CountingDetector::default()
  };
  let render = CountingRender::default();
  let mounted = mount(
    SpyBackend::new(detector.clone()),
    StaticVideo::new(ReadyState::HaveEnoughData),
    render.clone(),
    LoopConfig {
      max_consecutive_failures: 3,
      ..fast_config()
    },
  );
  let status = mounted.status_handle();
  assert!(wait_until(|| matches!(status.phase(), Phase::Failed(_))));

  let snapshot = mounted.unmount();
  assert_eq!(snapshot.failures, 3);
  assert_eq!(snapshot.consecutive_failures, 3);
  assert!(snapshot.last_error.unwrap().contains("推理设备忙"));
  assert_eq!(detector.calls.load(Ordering::SeqCst), 3);
  assert_eq!(render.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn mounts_are_independent() {
  let first_detector = CountingDetector::default();
  let second_detector = CountingDetector::default();
  let first = mount(
    SpyBackend::new(first_detector.clone()),
    StaticVideo::new(ReadyState::HaveEnoughData),
    CountingRender::default(),
    fast_config(),
  );
  let second = mount(
    SpyBackend::new(second_detector.clone()),
    StaticVideo::new(ReadyState::HaveEnoughData),
    CountingRender::default(),
    fast_config(),
  );
  assert!(wait_for_ticks(&first.status_handle(), 2));

  first.unmount();
  let second_status = second.status_handle();
  let before = second_status.snapshot().ticks;
  assert!(wait_for_ticks(&second_status, before + 3));
  assert_eq!(second_status.phase(), Phase::Running);
  second.unmount();
}

#[test]
fn loop_waits_for_the_interval_between_ticks() {
  let detector = CountingDetector::default();
  let mounted = mount(
    SpyBackend::new(detector.clone()),
    StaticVideo::new(ReadyState::HaveEnoughData),
    CountingRender::default(),
    LoopConfig {
      interval: Duration::from_millis(50),
      ..LoopConfig::default()
    },
  );
  let status = mounted.status_handle();
  assert!(wait_until(|| status.phase() == Phase::Running));

  thread::sleep(Duration::from_millis(500));
  let snapshot = mounted.unmount();
  assert!(snapshot.ticks >= 1);
  // 500ms / 50ms，外加第一次立即执行
  assert!(snapshot.ticks <= 11, "ticks = {}", snapshot.ticks);
}

#[test]
fn slow_detection_never_overlaps() {
  let detector = CountingDetector {
    delay: Duration::from_millis(20),
    ..CountingDetector::default()
  };
  let mounted = mount(
    SpyBackend::new(detector.clone()),
    StaticVideo::new(ReadyState::HaveEnoughData),
    CountingRender::default(),
    fast_config(),
  );
  assert!(wait_for_ticks(&mounted.status_handle(), 4));

  let snapshot = mounted.unmount();
  assert!(!detector.overlapped.load(Ordering::SeqCst));
  assert!(detector.calls.load(Ordering::SeqCst) >= 4);
  assert_eq!(snapshot.failures, 0);
}
