// 该文件是 Guanlan （观澜） 项目的一部分。
// src/camera/still_image.rs - 静态图片视频源
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::time::{Duration, Instant};

use image::{ImageReader, RgbImage};
use tracing::{error, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, camera::CameraError, url_path, url_query};

const DEFAULT_FPS: f32 = 15.0;

/// 静态图片视频源
///
/// 按固定帧率反复产出同一张图片，模拟一路实时画面。
/// 查询参数 `fps` 设置帧率，`frames` 限制总帧数。
pub struct StillImageSource {
  image: RgbImage,
  period: Duration,
  remaining: Option<u64>,
  last_emit: Option<Instant>,
}

impl FromUrlWithScheme for StillImageSource {
  const SCHEME: &'static str = "image";
}

impl FromUrl for StillImageSource {
  type Error = CameraError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(CameraError::SchemeMismatch(url.scheme().to_string()));
    }

    let query = url_query(url);
    let fps = query
      .get("fps")
      .and_then(|v| v.parse::<f32>().ok())
      .filter(|fps| *fps > 0.0)
      .unwrap_or(DEFAULT_FPS);
    let remaining = query.get("frames").and_then(|v| v.parse::<u64>().ok());

    let path = url_path(url);
    let image = ImageReader::open(&path)?.decode()?.to_rgb8();
    info!(
      "读取图片 {}: {}x{} @ {:.1} fps",
      path,
      image.width(),
      image.height(),
      fps
    );

    Ok(Self::new(image, fps).with_frame_limit(remaining))
  }
}

impl StillImageSource {
  pub fn new(image: RgbImage, fps: f32) -> Self {
    Self {
      image,
      period: Duration::from_secs_f32(1.0 / fps.max(f32::EPSILON)),
      remaining: None,
      last_emit: None,
    }
  }

  pub fn with_frame_limit(mut self, frames: Option<u64>) -> Self {
    self.remaining = frames;
    self
  }
}

impl Iterator for StillImageSource {
  type Item = Result<RgbImage, CameraError>;

  fn next(&mut self) -> Option<Self::Item> {
    if let Some(remaining) = self.remaining.as_mut() {
      if *remaining == 0 {
        return None;
      }
      *remaining -= 1;
    }

    if let Some(last) = self.last_emit {
      let wait = self.period.saturating_sub(last.elapsed());
      if !wait.is_zero() {
        std::thread::sleep(wait);
      }
    }
    self.last_emit = Some(Instant::now());

    Some(Ok(self.image.clone()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn honours_frame_limit() {
    let source = StillImageSource::new(RgbImage::new(8, 8), 1000.0).with_frame_limit(Some(3));
    assert_eq!(source.count(), 3);
  }

  #[test]
  fn reads_image_from_url() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("still.png");
    RgbImage::new(20, 10).save(&path).unwrap();

    let url = Url::parse(&format!("image://{}?fps=100&frames=2", path.display())).unwrap();
    let frames: Vec<_> = StillImageSource::from_url(&url).unwrap().collect();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].as_ref().unwrap().dimensions(), (20, 10));
  }
}
