// 该文件是 Guanlan （观澜） 项目的一部分。
// src/detection.rs - 检测结果定义
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

use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

/// 边界框，像素坐标 [x, y, width, height]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BBox {
  pub x: f32,
  pub y: f32,
  pub width: f32,
  pub height: f32,
}

impl BBox {
  pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
    Self {
      x,
      y,
      width,
      height,
    }
  }

  pub fn right(&self) -> f32 {
    self.x + self.width
  }

  pub fn bottom(&self) -> f32 {
    self.y + self.height
  }
}

impl From<[f32; 4]> for BBox {
  fn from([x, y, width, height]: [f32; 4]) -> Self {
    Self::new(x, y, width, height)
  }
}

impl From<BBox> for [f32; 4] {
  fn from(bbox: BBox) -> Self {
    [bbox.x, bbox.y, bbox.width, bbox.height]
  }
}

/// 原始视频帧坐标空间（固有分辨率）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Intrinsic;

/// 叠加层坐标空间（显示尺寸）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Overlay;

/// 单个检测结果
///
/// 序列化字段沿用常见检测模型的输出格式：`class`、`score`、`bbox`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection<Space = Intrinsic> {
  #[serde(rename = "class")]
  pub label: String,
  #[serde(rename = "score")]
  pub confidence: f32,
  pub bbox: BBox,
  #[serde(skip)]
  space: PhantomData<Space>,
}

/// 已缩放到叠加层坐标的检测结果
pub type ScaledDetection = Detection<Overlay>;

impl<Space> Detection<Space> {
  pub fn new(label: impl Into<String>, confidence: f32, bbox: BBox) -> Self {
    Self {
      label: label.into(),
      confidence,
      bbox,
      space: PhantomData,
    }
  }

  /// 替换边界框并切换坐标空间，标签与置信度保持不变
  pub fn with_bbox<To>(&self, bbox: BBox) -> Detection<To> {
    Detection {
      label: self.label.clone(),
      confidence: self.confidence,
      bbox,
      space: PhantomData,
    }
  }
}
