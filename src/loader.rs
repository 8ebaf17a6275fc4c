// 该文件是 Guanlan （观澜） 项目的一部分。
// src/loader.rs - 模型加载
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

use std::time::Instant;

use thiserror::Error;
use tracing::{error, info};

use crate::model::Detector;

/// 模型后端
///
/// 加载分两步：先选择并初始化计算后端（阻塞到就绪），再加载模型实例。
pub trait ModelBackend: Send + 'static {
  type Model: Detector;
  type Error: std::error::Error + Send + Sync + 'static;

  fn name(&self) -> &str;
  fn activate(&mut self) -> Result<(), Self::Error>;
  fn load(self) -> Result<Self::Model, Self::Error>;
}

#[derive(Error, Debug)]
pub enum LoaderError {
  #[error("后端 {backend} 初始化失败: {source}")]
  Activate {
    backend: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },
  #[error("后端 {backend} 加载模型失败: {source}")]
  Load {
    backend: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },
}

/// 初始化后端并加载模型
pub fn load_model<B: ModelBackend>(mut backend: B) -> Result<B::Model, LoaderError> {
  let backend_name = backend.name().to_string();
  info!("选择计算后端: {}", backend_name);

  let now = Instant::now();
  backend.activate().map_err(|e| {
    error!("后端 {} 初始化失败: {}", backend_name, e);
    LoaderError::Activate {
      backend: backend_name.clone(),
      source: Box::new(e),
    }
  })?;
  info!("后端已就绪，耗时: {:.2?}", now.elapsed());

  let now = Instant::now();
  let model = backend.load().map_err(|e| {
    error!("后端 {} 加载模型失败: {}", backend_name, e);
    LoaderError::Load {
      backend: backend_name.clone(),
      source: Box::new(e),
    }
  })?;
  info!("模型加载完成，耗时: {:.2?}", now.elapsed());

  Ok(model)
}
