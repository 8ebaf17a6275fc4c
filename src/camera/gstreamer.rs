// 该文件是 Guanlan （观澜） 项目的一部分。
// src/camera/gstreamer.rs - GStreamer 视频源
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

//! # GStreamer 视频源
//!
//! 支持两种地址：
//! - `gst://camera/dev/video0?width=1280&height=720&fps=30&format=YUY2`
//! - `gst://file/path/to/video.mp4`
//!
//! 管道末端统一转换为 RGB 并交给 appsink，appsink 只保留最新的两帧。
//!
//! 使用前需要安装 GStreamer 开发库，并启用 `gstreamer_input` 特性。

use std::collections::HashMap;

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use image::RgbImage;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, camera::CameraError, url_path, url_query};

#[derive(Error, Debug)]
pub enum GStreamerSourceError {
  #[error("GStreamer 错误: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  #[error("GStreamer 布尔错误: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  #[error("状态切换错误: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
  #[error("找不到 appsink 元素")]
  AppSinkNotFound,
  #[error("管道错误: {0}")]
  PipelineError(String),
  #[error("无法从 caps 获取视频信息")]
  VideoInfoError,
  #[error("不支持的视频格式")]
  UnsupportedFormat,
  #[error("缓冲区大小不匹配: 期望 {expected} 字节, 实际 {actual} 字节")]
  BufferSizeMismatch { expected: usize, actual: usize },
}

/// GStreamer 视频源
pub struct GStreamerSource {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
}

impl FromUrlWithScheme for GStreamerSource {
  const SCHEME: &'static str = "gst";
}

impl FromUrl for GStreamerSource {
  type Error = CameraError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(CameraError::SchemeMismatch(url.scheme().to_string()));
    }

    let query = url_query(url);
    let path = url_path(url);
    let source = match url.host_str() {
      Some("camera") => camera_pipeline(&path, &query),
      Some("file") => format!("filesrc location={} ! decodebin", path),
      other => {
        return Err(CameraError::SchemeMismatch(format!(
          "gst://{}",
          other.unwrap_or_default()
        )));
      }
    };

    Ok(Self::launch(&source)?)
  }
}

fn camera_pipeline(device: &str, query: &HashMap<String, String>) -> String {
  let format = query.get("format").map(String::as_str).unwrap_or("YUY2");
  let mut caps = format!("video/x-raw,format={}", format);
  if let Some(width) = query.get("width").and_then(|v| v.parse::<u32>().ok()) {
    caps.push_str(&format!(",width={}", width));
  }
  if let Some(height) = query.get("height").and_then(|v| v.parse::<u32>().ok()) {
    caps.push_str(&format!(",height={}", height));
  }
  if let Some(fps) = query.get("fps").and_then(|v| v.parse::<u32>().ok()) {
    caps.push_str(&format!(",framerate={}/1", fps));
  }
  format!("v4l2src device={} ! {}", device, caps)
}

impl GStreamerSource {
  pub fn launch(source: &str) -> Result<Self, GStreamerSourceError> {
    gst::init()?;

    let description = format!(
      "{} ! videoconvert ! video/x-raw,format=RGB ! appsink max-buffers=2 drop=true name=sink",
      source
    );
    info!("GStreamer 管道: {}", description);

    let pipeline = gst::parse::launch(&description)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerSourceError::PipelineError("无法创建管道".to_string()))?;

    let appsink = pipeline
      .by_name("sink")
      .ok_or(GStreamerSourceError::AppSinkNotFound)?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| GStreamerSourceError::AppSinkNotFound)?;

    pipeline.set_state(gst::State::Playing)?;

    Ok(Self { pipeline, appsink })
  }
}

impl Drop for GStreamerSource {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("停止 GStreamer 管道失败: {}", e);
    }
  }
}

impl Iterator for GStreamerSource {
  type Item = Result<RgbImage, CameraError>;

  fn next(&mut self) -> Option<Self::Item> {
    // 流结束或管道出错时 pull_sample 返回错误，视为来源结束
    let sample = self
      .appsink
      .pull_sample()
      .map_err(|e| error!("拉取帧失败: {}", e))
      .ok()?;
    Some(sample_to_rgb(&sample).map_err(CameraError::from))
  }
}

fn sample_to_rgb(sample: &gst::Sample) -> Result<RgbImage, GStreamerSourceError> {
  let buffer = sample
    .buffer()
    .ok_or_else(|| GStreamerSourceError::PipelineError("样本中没有缓冲区".to_string()))?;
  let caps = sample
    .caps()
    .ok_or_else(|| GStreamerSourceError::PipelineError("样本中没有 caps".to_string()))?;
  let info =
    gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerSourceError::VideoInfoError)?;

  if info.format() != gst_video::VideoFormat::Rgb {
    return Err(GStreamerSourceError::UnsupportedFormat);
  }

  let (width, height) = (info.width(), info.height());
  if width == 0 || height == 0 {
    return Err(GStreamerSourceError::VideoInfoError);
  }
  let stride = info.stride()[0] as usize;
  let row_bytes = width as usize * 3;

  let map = buffer
    .map_readable()
    .map_err(|e| GStreamerSourceError::PipelineError(format!("无法映射缓冲区: {}", e)))?;
  let data = map.as_slice();

  let expected = stride * (height as usize - 1) + row_bytes;
  if data.len() < expected {
    return Err(GStreamerSourceError::BufferSizeMismatch {
      expected,
      actual: data.len(),
    });
  }

  // 行跨距可能带有对齐填充
  let mut pixels = Vec::with_capacity(row_bytes * height as usize);
  for row in data.chunks(stride).take(height as usize) {
    pixels.extend_from_slice(&row[..row_bytes]);
  }

  RgbImage::from_raw(width, height, pixels)
    .ok_or_else(|| GStreamerSourceError::PipelineError("无法创建 RGB 图像".to_string()))
}
