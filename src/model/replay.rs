// 该文件是 Guanlan （观澜） 项目的一部分。
// src/model/replay.rs - 回放检测模型
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::convert::Infallible;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  detection::Detection,
  frame::VideoFrame,
  loader::ModelBackend,
  model::{Detector, select_top},
  url_path,
};

#[derive(Error, Debug)]
pub enum ReplayError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("检测脚本格式错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("后端尚未初始化")]
  NotActivated,
}

/// 检测脚本：单个列表作用于每一帧，或按帧循环的列表
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Script {
  PerFrame(Vec<Vec<Detection>>),
  Single(Vec<Detection>),
}

/// 回放检测模型
///
/// 从 JSON 文件读取预先记录的检测结果，第 n 帧取第 `n % len` 组。
#[derive(Debug, Clone)]
pub struct ReplayDetector {
  frames: Vec<Vec<Detection>>,
}

impl ReplayDetector {
  pub fn new(frames: Vec<Vec<Detection>>) -> Self {
    Self { frames }
  }
}

impl Detector for ReplayDetector {
  type Error = Infallible;

  fn detect(
    &self,
    frame: &VideoFrame,
    max_results: Option<usize>,
    min_confidence: f32,
  ) -> Result<Vec<Detection>, Self::Error> {
    if self.frames.is_empty() {
      return Ok(Vec::new());
    }
    let slot = (frame.index % self.frames.len() as u64) as usize;
    let detections = select_top(self.frames[slot].clone(), max_results, min_confidence);
    debug!("第 {} 帧回放 {} 个检测结果", frame.index, detections.len());
    Ok(detections)
  }
}

/// 回放模型后端
pub struct ReplayBuilder {
  path: PathBuf,
  frames: Option<Vec<Vec<Detection>>>,
}

impl ReplayBuilder {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      frames: None,
    }
  }
}

impl FromUrlWithScheme for ReplayBuilder {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayBuilder {
  type Error = ReplayError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ReplayError::SchemeMismatch(url.scheme().to_string()));
    }
    Ok(Self::new(url_path(url)))
  }
}

impl ModelBackend for ReplayBuilder {
  type Model = ReplayDetector;
  type Error = ReplayError;

  fn name(&self) -> &str {
    "replay"
  }

  fn activate(&mut self) -> Result<(), Self::Error> {
    info!("读取检测脚本: {}", self.path.display());
    let data = std::fs::read(&self.path)?;
    let frames = match serde_json::from_slice::<Script>(&data)? {
      Script::PerFrame(frames) => frames,
      Script::Single(detections) => vec![detections],
    };
    info!("检测脚本共 {} 组结果", frames.len());
    self.frames = Some(frames);
    Ok(())
  }

  fn load(self) -> Result<Self::Model, Self::Error> {
    self
      .frames
      .map(ReplayDetector::new)
      .ok_or(ReplayError::NotActivated)
  }
}
