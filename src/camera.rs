// 该文件是 Guanlan （观澜） 项目的一部分。
// src/camera.rs - 摄像头与实时视频
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

use std::sync::{
  Arc, Mutex,
  atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering},
  mpsc,
};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

#[cfg(any(
  feature = "read_image_file",
  feature = "v4l2_input",
  feature = "gstreamer_input"
))]
use crate::FromUrlWithScheme;
use crate::{FromUrl, frame::VideoFrame};

#[cfg(feature = "read_image_file")]
mod still_image;
#[cfg(feature = "read_image_file")]
pub use self::still_image::StillImageSource;

#[cfg(feature = "v4l2_input")]
mod v4l2;
#[cfg(feature = "v4l2_input")]
pub use self::v4l2::V4l2Source;

#[cfg(feature = "gstreamer_input")]
mod gstreamer;
#[cfg(feature = "gstreamer_input")]
pub use self::gstreamer::{GStreamerSource, GStreamerSourceError};

/// 连续采集失败达到该次数后结束视频流
const MAX_CONSECUTIVE_CAPTURE_ERRORS: usize = 30;

#[derive(Error, Debug)]
pub enum CameraError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[cfg(feature = "read_image_file")]
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[cfg(feature = "gstreamer_input")]
  #[error("GStreamer 输入错误: {0}")]
  GStreamerError(#[from] GStreamerSourceError),
  #[error("采集错误: {0}")]
  Capture(String),
  #[error("采集线程已退出")]
  WorkerExited,
}

/// 视频就绪状态，取值与媒体元素的 readyState 一致
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ReadyState {
  HaveNothing = 0,
  HaveMetadata = 1,
  HaveCurrentData = 2,
  HaveFutureData = 3,
  HaveEnoughData = 4,
}

impl From<u8> for ReadyState {
  fn from(value: u8) -> Self {
    match value {
      0 => ReadyState::HaveNothing,
      1 => ReadyState::HaveMetadata,
      2 => ReadyState::HaveCurrentData,
      3 => ReadyState::HaveFutureData,
      _ => ReadyState::HaveEnoughData,
    }
  }
}

/// 视频元素
///
/// 暴露就绪状态、固有分辨率以及当前帧。
pub trait VideoElement: Send + Sync {
  fn ready_state(&self) -> ReadyState;
  fn video_width(&self) -> u32;
  fn video_height(&self) -> u32;
  fn current_frame(&self) -> Option<VideoFrame>;
}

/// 帧来源，逐帧产出 RGB 图像
pub trait FrameSource: Iterator<Item = Result<RgbImage, CameraError>> {}

impl<T: Iterator<Item = Result<RgbImage, CameraError>>> FrameSource for T {}

pub enum SourceWrapper {
  #[cfg(feature = "read_image_file")]
  StillImage(StillImageSource),
  #[cfg(feature = "v4l2_input")]
  V4l2(V4l2Source),
  #[cfg(feature = "gstreamer_input")]
  GStreamer(GStreamerSource),
}

impl FromUrl for SourceWrapper {
  type Error = CameraError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      #[cfg(feature = "read_image_file")]
      StillImageSource::SCHEME => {
        Ok(SourceWrapper::StillImage(StillImageSource::from_url(url)?))
      }
      #[cfg(feature = "v4l2_input")]
      V4l2Source::SCHEME => {
        Ok(SourceWrapper::V4l2(V4l2Source::from_url(url)?))
      }
      #[cfg(feature = "gstreamer_input")]
      GStreamerSource::SCHEME => {
        Ok(SourceWrapper::GStreamer(GStreamerSource::from_url(url)?))
      }
      scheme => Err(CameraError::SchemeMismatch(scheme.to_string())),
    }
  }
}

impl Iterator for SourceWrapper {
  type Item = Result<RgbImage, CameraError>;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      #[cfg(feature = "read_image_file")]
      SourceWrapper::StillImage(source) => source.next(),
      #[cfg(feature = "v4l2_input")]
      SourceWrapper::V4l2(source) => source.next(),
      #[cfg(feature = "gstreamer_input")]
      SourceWrapper::GStreamer(source) => source.next(),
      #[allow(unreachable_patterns)]
      _ => None,
    }
  }
}

struct Shared {
  ready: AtomicU8,
  width: AtomicU32,
  height: AtomicU32,
  frame: Mutex<Option<VideoFrame>>,
}

/// 实时视频
///
/// 采集线程不断读取帧来源并发布最新一帧，检测循环随时取用。
/// 帧来源在采集线程内创建，因此不要求其可跨线程移动。
pub struct LiveVideo {
  shared: Arc<Shared>,
  stop: Arc<AtomicBool>,
  worker: Option<JoinHandle<()>>,
}

impl LiveVideo {
  /// 在采集线程中打开帧来源，打开失败时直接返回错误
  pub fn spawn<S, F>(open: F) -> Result<Self, CameraError>
  where
    S: FrameSource,
    F: FnOnce() -> Result<S, CameraError> + Send + 'static,
  {
    let shared = Arc::new(Shared {
      ready: AtomicU8::new(ReadyState::HaveNothing as u8),
      width: AtomicU32::new(0),
      height: AtomicU32::new(0),
      frame: Mutex::new(None),
    });
    let stop = Arc::new(AtomicBool::new(false));
    let (opened_tx, opened_rx) = mpsc::channel();

    let worker = {
      let shared = shared.clone();
      let stop = stop.clone();
      thread::Builder::new()
        .name("guanlan-capture".to_string())
        .spawn(move || match open() {
          Ok(source) => {
            let _ = opened_tx.send(Ok(()));
            capture_loop(source, &shared, &stop);
          }
          Err(e) => {
            let _ = opened_tx.send(Err(e));
          }
        })?
    };

    match opened_rx.recv() {
      Ok(Ok(())) => {
        info!("视频来源已打开");
        Ok(Self {
          shared,
          stop,
          worker: Some(worker),
        })
      }
      Ok(Err(e)) => {
        let _ = worker.join();
        error!("打开视频来源失败: {}", e);
        Err(e)
      }
      Err(_) => {
        let _ = worker.join();
        Err(CameraError::WorkerExited)
      }
    }
  }

  pub fn from_source<S: FrameSource + Send + 'static>(source: S) -> Result<Self, CameraError> {
    Self::spawn(move || Ok(source))
  }
}

impl FromUrl for LiveVideo {
  type Error = CameraError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    info!("打开视频来源: {}", url);
    let url = url.clone();
    Self::spawn(move || SourceWrapper::from_url(&url))
  }
}

fn capture_loop<S: FrameSource>(mut source: S, shared: &Shared, stop: &AtomicBool) {
  let start_time = Instant::now();
  let mut index = 0u64;
  let mut consecutive_errors = 0usize;

  while !stop.load(Ordering::Acquire) {
    match source.next() {
      Some(Ok(image)) => {
        consecutive_errors = 0;
        let (width, height) = image.dimensions();
        let frame = VideoFrame::new(image, index, start_time.elapsed().as_millis() as u64);
        *shared.frame.lock().unwrap_or_else(|e| e.into_inner()) = Some(frame);
        shared.width.store(width, Ordering::Release);
        shared.height.store(height, Ordering::Release);
        shared
          .ready
          .store(ReadyState::HaveEnoughData as u8, Ordering::Release);
        index += 1;
      }
      Some(Err(e)) => {
        consecutive_errors += 1;
        warn!("采集第 {} 帧失败: {}", index, e);
        if consecutive_errors >= MAX_CONSECUTIVE_CAPTURE_ERRORS {
          error!("连续 {} 次采集失败，停止采集", consecutive_errors);
          break;
        }
      }
      None => {
        info!("视频来源结束，共 {} 帧", index);
        break;
      }
    }
  }

  // 保留最后一帧，但不再有新数据
  let ready = if index > 0 {
    ReadyState::HaveCurrentData
  } else {
    ReadyState::HaveNothing
  };
  shared.ready.store(ready as u8, Ordering::Release);
  debug!("采集线程退出");
}

impl VideoElement for LiveVideo {
  fn ready_state(&self) -> ReadyState {
    ReadyState::from(self.shared.ready.load(Ordering::Acquire))
  }

  fn video_width(&self) -> u32 {
    self.shared.width.load(Ordering::Acquire)
  }

  fn video_height(&self) -> u32 {
    self.shared.height.load(Ordering::Acquire)
  }

  fn current_frame(&self) -> Option<VideoFrame> {
    self
      .shared
      .frame
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .clone()
  }
}

impl Drop for LiveVideo {
  fn drop(&mut self) {
    self.stop.store(true, Ordering::Release);
    if let Some(worker) = self.worker.take()
      && worker.join().is_err()
    {
      warn!("采集线程异常退出");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;

  fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
      if cond() {
        return true;
      }
      thread::sleep(Duration::from_millis(5));
    }
    false
  }

  #[test]
  fn ready_state_follows_stream() {
    let frames = (0..3).map(|_| Ok::<_, CameraError>(RgbImage::new(32, 24)));
    let video = LiveVideo::from_source(frames).unwrap();

    // 来源结束后只保留最后一帧
    assert!(wait_until(|| video.ready_state() == ReadyState::HaveCurrentData));
    assert_eq!((video.video_width(), video.video_height()), (32, 24));
    let frame = video.current_frame().unwrap();
    assert_eq!(frame.index, 2);
  }

  #[test]
  fn empty_source_never_becomes_ready() {
    let video = LiveVideo::from_source(std::iter::empty::<Result<RgbImage, CameraError>>()).unwrap();
    thread::sleep(Duration::from_millis(20));
    assert_eq!(video.ready_state(), ReadyState::HaveNothing);
    assert!(video.current_frame().is_none());
  }

  #[test]
  fn open_failure_is_reported() {
    let result = LiveVideo::spawn(|| -> Result<std::iter::Empty<Result<RgbImage, CameraError>>, CameraError> {
      Err(CameraError::Capture("no device".to_string()))
    });
    assert!(matches!(result, Err(CameraError::Capture(_))));
  }

  #[test]
  fn unknown_scheme_is_rejected() {
    let url = Url::parse("ftp://camera/0").unwrap();
    assert!(matches!(
      SourceWrapper::from_url(&url),
      Err(CameraError::SchemeMismatch(_))
    ));
  }

  #[test]
  fn ready_state_from_raw() {
    assert_eq!(ReadyState::from(4), ReadyState::HaveEnoughData);
    assert_eq!(ReadyState::from(2), ReadyState::HaveCurrentData);
    assert!(ReadyState::HaveFutureData < ReadyState::HaveEnoughData);
  }
}
