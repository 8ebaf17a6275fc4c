// 该文件是 Guanlan （观澜） 项目的一部分。
// src/output.rs - 输出定义
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::convert::Infallible;

use image::{DynamicImage, RgbaImage, imageops};
use thiserror::Error;
use url::Url;

use crate::FromUrl;
#[cfg(any(feature = "save_image_file", feature = "directory_record"))]
use crate::FromUrlWithScheme;
use crate::{
  detection::ScaledDetection,
  frame::VideoFrame,
  geometry::{DisplayGeometry, Rect},
  surface::OverlaySurface,
};

/// 一次成功检测后的画面
///
/// 包含当帧视频、容器与视频元素的包围盒、显示几何、
/// 缩放后的检测结果以及已绘制的叠加层。
pub struct Scene<'a> {
  pub frame: &'a VideoFrame,
  pub container: Rect,
  pub video: Rect,
  pub geometry: DisplayGeometry,
  pub detections: &'a [ScaledDetection],
  pub surface: &'a OverlaySurface,
}

/// 画面输出
pub trait Present: Send {
  type Error: std::error::Error + Send + Sync + 'static;
  fn present(&self, scene: &Scene<'_>) -> Result<(), Self::Error>;
}

/// 合成容器画面
///
/// 视频帧缩放到显示尺寸并放在视频元素相对容器的位置，
/// 叠加层按其偏移混合到同一画布上。
pub fn compose(scene: &Scene<'_>) -> RgbaImage {
  let width = scene.container.width.max(0.0) as u32;
  let height = scene.container.height.max(0.0) as u32;
  let mut canvas = RgbaImage::new(width, height);

  let (display_w, display_h) = scene.geometry.surface_size();
  if display_w > 0 && display_h > 0 {
    let video = DynamicImage::ImageRgb8(scene.frame.resized(display_w, display_h)).to_rgba8();
    imageops::overlay(
      &mut canvas,
      &video,
      (scene.video.left - scene.container.left) as i64,
      (scene.video.top - scene.container.top) as i64,
    );
  }

  imageops::overlay(
    &mut canvas,
    scene.surface.canvas(),
    scene.surface.left() as i64,
    scene.surface.top() as i64,
  );
  canvas
}

/// 不输出任何内容
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOutput;

impl Present for NoOutput {
  type Error = Infallible;

  fn present(&self, _scene: &Scene<'_>) -> Result<(), Self::Error> {
    Ok(())
  }
}

#[cfg(feature = "save_image_file")]
mod save_image_file;
#[cfg(feature = "save_image_file")]
pub use self::save_image_file::{SaveImageFileError, SaveImageFileOutput};

#[cfg(feature = "directory_record")]
mod directory_record;
#[cfg(feature = "directory_record")]
pub use self::directory_record::{DirectoryRecordOutput, DirectoryRecordOutputError};

#[derive(Error, Debug)]
pub enum OutputError {
  #[cfg(feature = "save_image_file")]
  #[error("保存图像文件错误: {0}")]
  SaveImageFileError(#[from] SaveImageFileError),
  #[cfg(feature = "directory_record")]
  #[error("目录记录输出错误: {0}")]
  DirectoryRecordOutputError(#[from] DirectoryRecordOutputError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub enum OutputWrapper {
  None(NoOutput),
  #[cfg(feature = "save_image_file")]
  SaveImageFileOutput(SaveImageFileOutput),
  #[cfg(feature = "directory_record")]
  DirectoryRecordOutput(DirectoryRecordOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      "none" => Ok(OutputWrapper::None(NoOutput)),
      #[cfg(feature = "save_image_file")]
      SaveImageFileOutput::SCHEME => {
        let output = SaveImageFileOutput::from_url(url)?;
        Ok(OutputWrapper::SaveImageFileOutput(output))
      }
      #[cfg(feature = "directory_record")]
      DirectoryRecordOutput::SCHEME => {
        let output = DirectoryRecordOutput::from_url(url)?;
        Ok(OutputWrapper::DirectoryRecordOutput(output))
      }
      scheme => Err(OutputError::SchemeMismatch(scheme.to_string())),
    }
  }
}

impl Present for OutputWrapper {
  type Error = OutputError;

  fn present(&self, scene: &Scene<'_>) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::None(output) => output.present(scene).map_err(|e| match e {}),
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFileOutput(output) => {
        output.present(scene).map_err(OutputError::from)
      }
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecordOutput(output) => {
        output.present(scene).map_err(OutputError::from)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::detection::BBox;
  use image::{Rgb, RgbImage, Rgba};

  #[test]
  fn composes_video_and_overlay_inside_container() {
    let frame = VideoFrame::new(RgbImage::from_pixel(40, 20, Rgb([200, 0, 0])), 0, 0);
    let container = Rect::new(100.0, 50.0, 24.0, 20.0);
    let video = Rect::new(102.0, 55.0, 20.0, 10.0);
    let geometry = DisplayGeometry::compute(&container, &video);
    let mut surface = OverlaySurface::new();
    surface.apply_geometry(&geometry);
    surface.canvas_mut().put_pixel(0, 0, Rgba([0, 255, 0, 255]));

    let detections = vec![ScaledDetection::new("cat", 0.9, BBox::new(0.0, 0.0, 1.0, 1.0))];
    let scene = Scene {
      frame: &frame,
      container,
      video,
      geometry,
      detections: &detections,
      surface: &surface,
    };
    let image = compose(&scene);

    assert_eq!(image.dimensions(), (24, 20));
    // 容器留白保持透明
    assert_eq!(image.get_pixel(0, 0)[3], 0);
    // 叠加层左上角像素落在偏移 (2, 5)
    assert_eq!(*image.get_pixel(2, 5), Rgba([0, 255, 0, 255]));
    assert_eq!(*image.get_pixel(10, 8), Rgba([200, 0, 0, 255]));
  }

  #[test]
  fn none_scheme_selects_no_output() {
    let url = Url::parse("none:").unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&url),
      Ok(OutputWrapper::None(_))
    ));
    let url = Url::parse("rtsp://localhost/live").unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&url),
      Err(OutputError::SchemeMismatch(_))
    ));
  }
}
