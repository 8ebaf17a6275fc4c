// 该文件是 Guanlan （观澜） 项目的一部分。
// src/model.rs - 检测模型
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use thiserror::Error;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, detection::Detection, frame::VideoFrame, loader::ModelBackend,
};

/// 未指定最大结果数时模型返回的上限
pub const DEFAULT_MAX_RESULTS: usize = 20;

/// 检测模型
///
/// 输入一帧图像，返回置信度高于阈值的检测结果，
/// 边界框位于该帧的固有像素坐标中。
pub trait Detector {
  type Error: std::error::Error + Send + Sync + 'static;

  fn detect(
    &self,
    frame: &VideoFrame,
    max_results: Option<usize>,
    min_confidence: f32,
  ) -> Result<Vec<Detection>, Self::Error>;
}

/// 过滤低于阈值的结果，按置信度降序排列并截断
pub fn select_top(
  mut detections: Vec<Detection>,
  max_results: Option<usize>,
  min_confidence: f32,
) -> Vec<Detection> {
  detections.retain(|d| d.confidence > min_confidence);
  detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
  detections.truncate(max_results.unwrap_or(DEFAULT_MAX_RESULTS));
  detections
}

mod replay;
pub use self::replay::{ReplayBuilder, ReplayDetector, ReplayError};

#[cfg(feature = "model_yolo26")]
mod yolo26;
#[cfg(feature = "model_yolo26")]
pub use self::yolo26::{COCO_LABELS, Yolo26, Yolo26Builder, Yolo26Error};

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("回放模型错误: {0}")]
  ReplayError(#[from] ReplayError),
  #[cfg(feature = "model_yolo26")]
  #[error("YOLO26 模型错误: {0}")]
  Yolo26Error(#[from] Yolo26Error),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 已加载的模型
pub enum ModelWrapper {
  Replay(ReplayDetector),
  #[cfg(feature = "model_yolo26")]
  Yolo26(Yolo26),
}

impl Detector for ModelWrapper {
  type Error = ModelError;

  fn detect(
    &self,
    frame: &VideoFrame,
    max_results: Option<usize>,
    min_confidence: f32,
  ) -> Result<Vec<Detection>, Self::Error> {
    match self {
      ModelWrapper::Replay(model) => model
        .detect(frame, max_results, min_confidence)
        .map_err(|e| match e {}),
      #[cfg(feature = "model_yolo26")]
      ModelWrapper::Yolo26(model) => model
        .detect(frame, max_results, min_confidence)
        .map_err(ModelError::from),
    }
  }
}

/// 由 URL 选定的模型后端
pub enum ModelSource {
  Replay(ReplayBuilder),
  #[cfg(feature = "model_yolo26")]
  Yolo26(Yolo26Builder),
}

impl FromUrl for ModelSource {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      ReplayBuilder::SCHEME => Ok(ModelSource::Replay(ReplayBuilder::from_url(url)?)),
      #[cfg(feature = "model_yolo26")]
      Yolo26Builder::SCHEME => Ok(ModelSource::Yolo26(Yolo26Builder::from_url(url)?)),
      scheme => Err(ModelError::SchemeMismatch(scheme.to_string())),
    }
  }
}

impl ModelBackend for ModelSource {
  type Model = ModelWrapper;
  type Error = ModelError;

  fn name(&self) -> &str {
    match self {
      ModelSource::Replay(builder) => builder.name(),
      #[cfg(feature = "model_yolo26")]
      ModelSource::Yolo26(builder) => builder.name(),
    }
  }

  fn activate(&mut self) -> Result<(), Self::Error> {
    match self {
      ModelSource::Replay(builder) => builder.activate().map_err(ModelError::from),
      #[cfg(feature = "model_yolo26")]
      ModelSource::Yolo26(builder) => builder.activate().map_err(ModelError::from),
    }
  }

  fn load(self) -> Result<Self::Model, Self::Error> {
    match self {
      ModelSource::Replay(builder) => Ok(ModelWrapper::Replay(builder.load()?)),
      #[cfg(feature = "model_yolo26")]
      ModelSource::Yolo26(builder) => Ok(ModelWrapper::Yolo26(builder.load()?)),
    }
  }
}
