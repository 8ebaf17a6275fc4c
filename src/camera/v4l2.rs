// 该文件是 Guanlan （观澜） 项目的一部分。
// src/camera/v4l2.rs - V4L2 摄像头视频源
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::pin::Pin;

use image::RgbImage;
use tracing::info;
use url::Url;
use v4l::FourCC;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;

use crate::{FromUrl, FromUrlWithScheme, camera::CameraError, url_path, url_query};

const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const STREAM_BUFFERS: u32 = 4;

/// V4L2 摄像头视频源
///
/// `v4l2:///dev/video0?width=640&height=480`，以 YUYV 采集并转换为 RGB。
/// v4l 的 Stream 需要引用 Device，Device 固定在堆上以保证地址稳定。
pub struct V4l2Source {
  /// 捕获流（生命周期与 device 关联）
  stream: Option<Stream<'static>>,
  /// V4L2 设备（使用 Pin<Box> 固定内存位置）
  _device: Pin<Box<Device>>,
  width: u32,
  height: u32,
}

impl FromUrlWithScheme for V4l2Source {
  const SCHEME: &'static str = "v4l2";
}

impl FromUrl for V4l2Source {
  type Error = CameraError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(CameraError::SchemeMismatch(url.scheme().to_string()));
    }

    let query = url_query(url);
    let width = query
      .get("width")
      .and_then(|v| v.parse::<u32>().ok())
      .unwrap_or(DEFAULT_WIDTH);
    let height = query
      .get("height")
      .and_then(|v| v.parse::<u32>().ok())
      .unwrap_or(DEFAULT_HEIGHT);

    Self::open(&url_path(url), width, height)
  }
}

impl V4l2Source {
  pub fn open(device_path: &str, width: u32, height: u32) -> Result<Self, CameraError> {
    let device = Box::pin(Device::with_path(device_path)?);

    let mut format = device.format()?;
    format.width = width;
    format.height = height;
    format.fourcc = FourCC::new(b"YUYV");
    let format = device.set_format(&format)?;
    info!(
      "V4L2 设备 {} 已打开: {}x{}",
      device_path, format.width, format.height
    );

    // SAFETY: device 被 Pin<Box> 固定在堆上，不会移动；
    // stream 在 Drop 中先于 device 释放。
    let device_ref: &Device = &device;
    let device_static: &'static Device = unsafe { std::mem::transmute(device_ref) };
    let stream = Stream::with_buffers(device_static, Type::VideoCapture, STREAM_BUFFERS)?;

    Ok(Self {
      stream: Some(stream),
      _device: device,
      width: format.width,
      height: format.height,
    })
  }
}

impl Drop for V4l2Source {
  fn drop(&mut self) {
    // 确保 stream 在 device 之前被 drop
    self.stream.take();
  }
}

impl Iterator for V4l2Source {
  type Item = Result<RgbImage, CameraError>;

  fn next(&mut self) -> Option<Self::Item> {
    let stream = self.stream.as_mut()?;

    let result = match stream.next() {
      Ok((buffer, _meta)) => {
        let rgb = yuyv_to_rgb(buffer, self.width, self.height);
        RgbImage::from_raw(self.width, self.height, rgb)
          .ok_or_else(|| CameraError::Capture("YUYV 缓冲区尺寸不匹配".to_string()))
      }
      Err(e) => Err(CameraError::Capture(format!("无法捕获帧: {}", e))),
    };
    Some(result)
  }
}

/// 将 YUYV 格式转换为 RGB
fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Vec<u8> {
  let mut rgb = Vec::with_capacity((width * height * 3) as usize);

  for chunk in yuyv.chunks_exact(4) {
    let y0 = chunk[0] as f32;
    let u = chunk[1] as f32 - 128.0;
    let y1 = chunk[2] as f32;
    let v = chunk[3] as f32 - 128.0;

    for y in [y0, y1] {
      let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
      let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
      let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;
      rgb.extend_from_slice(&[r, g, b]);
    }
  }

  rgb
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn grey_yuyv_maps_to_grey_rgb() {
    let rgb = yuyv_to_rgb(&[128, 128, 128, 128], 2, 1);
    assert_eq!(rgb, vec![128, 128, 128, 128, 128, 128]);
  }
}
