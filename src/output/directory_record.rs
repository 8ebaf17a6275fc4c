// 该文件是 Guanlan （观澜） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU16, Ordering};

use chrono::{Datelike, Local};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  detection::ScaledDetection,
  geometry::DisplayGeometry,
  output::{Present, Scene, compose},
  url_path,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("记录序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// 与画面同名的检测记录
#[derive(Serialize)]
struct Record<'a> {
  frame: u64,
  timestamp_ms: u64,
  geometry: RecordGeometry,
  detections: &'a [ScaledDetection],
}

#[derive(Serialize)]
struct RecordGeometry {
  displayed_width: f32,
  displayed_height: f32,
  offset_x: f32,
  offset_y: f32,
}

impl From<&DisplayGeometry> for RecordGeometry {
  fn from(geometry: &DisplayGeometry) -> Self {
    Self {
      displayed_width: geometry.displayed_width,
      displayed_height: geometry.displayed_height,
      offset_x: geometry.offset_x,
      offset_y: geometry.offset_y,
    }
  }
}

/// 按日期分目录保存合成画面
///
/// `folder:///dir?record&always`：
/// - `record` 同时写出 JSON 检测记录；
/// - `always` 没有检测结果时也保存。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  record: bool,
  always: bool,
  frame_counter: AtomicU16,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch(
        uri.scheme().to_string(),
      ));
    }

    let record = uri.query_pairs().any(|(k, _)| k == "record");
    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(Self::new(url_path(uri), record, always))
  }
}

impl DirectoryRecordOutput {
  pub fn new(directory: impl Into<PathBuf>, record: bool, always: bool) -> Self {
    Self {
      directory: directory.into(),
      record,
      always,
      frame_counter: AtomicU16::new(0),
    }
  }

  fn frame_id(&self) -> u16 {
    self.frame_counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
  }

  fn frame_path(&self) -> Result<PathBuf, DirectoryRecordOutputError> {
    let now = Local::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }

  fn write_record(&self, path: &Path, scene: &Scene<'_>) -> Result<(), DirectoryRecordOutputError> {
    let record = Record {
      frame: scene.frame.index,
      timestamp_ms: scene.frame.timestamp_ms,
      geometry: RecordGeometry::from(&scene.geometry),
      detections: scene.detections,
    };
    let data = serde_json::to_vec_pretty(&record)?;
    std::fs::write(path.with_extension("json"), data)?;
    Ok(())
  }
}

impl Present for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn present(&self, scene: &Scene<'_>) -> Result<(), Self::Error> {
    if !self.always && scene.detections.is_empty() {
      return Ok(());
    }

    let path = self.frame_path()?;
    compose(scene).save(&path)?;
    if self.record {
      self.write_record(&path, scene)?;
    }
    debug!("记录第 {} 帧: {}", scene.frame.index, path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    detection::BBox,
    frame::VideoFrame,
    geometry::Rect,
    surface::OverlaySurface,
  };
  use image::RgbImage;

  fn files_with_extension(dir: &Path, ext: &str) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
      for entry in std::fs::read_dir(&current).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
          pending.push(path);
        } else if path.extension().is_some_and(|e| e == ext) {
          found.push(path);
        }
      }
    }
    found
  }

  fn present(output: &DirectoryRecordOutput, detections: &[ScaledDetection]) {
    let frame = VideoFrame::new(RgbImage::new(8, 8), 7, 70);
    let container = Rect::new(0.0, 0.0, 10.0, 10.0);
    let video = Rect::new(1.0, 1.0, 8.0, 8.0);
    let geometry = DisplayGeometry::compute(&container, &video);
    let mut surface = OverlaySurface::new();
    surface.apply_geometry(&geometry);
    let scene = Scene {
      frame: &frame,
      container,
      video,
      geometry,
      detections,
      surface: &surface,
    };
    output.present(&scene).unwrap();
  }

  #[test]
  fn skips_frames_without_detections_unless_always() {
    let dir = tempfile::tempdir().unwrap();
    let output = DirectoryRecordOutput::new(dir.path(), false, false);
    present(&output, &[]);
    assert!(files_with_extension(dir.path(), "png").is_empty());

    let output = DirectoryRecordOutput::new(dir.path(), false, true);
    present(&output, &[]);
    assert_eq!(files_with_extension(dir.path(), "png").len(), 1);
  }

  #[test]
  fn record_writes_json_next_to_frame() {
    let dir = tempfile::tempdir().unwrap();
    let url = Url::parse(&format!("folder://{}?record", dir.path().display())).unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();
    let detections = vec![ScaledDetection::new(
      "dog",
      0.8,
      BBox::new(1.0, 2.0, 3.0, 4.0),
    )];
    present(&output, &detections);

    let records = files_with_extension(dir.path(), "json");
    assert_eq!(records.len(), 1);
    assert!(records[0].with_extension("png").exists());
    let value: serde_json::Value =
      serde_json::from_slice(&std::fs::read(&records[0]).unwrap()).unwrap();
    assert_eq!(value["frame"], 7);
    assert_eq!(value["detections"][0]["class"], "dog");
    assert_eq!(value["detections"][0]["bbox"][3], 4.0);
  }
}
