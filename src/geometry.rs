// 该文件是 Guanlan （观澜） 项目的一部分。
// src/geometry.rs - 显示几何与坐标缩放
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

//! 叠加层对齐所需的纯计算。
//!
//! 模型给出的边界框位于视频的固有分辨率中，而叠加层与视频元素的
//! 显示尺寸一致。这里的函数都没有副作用，每一帧都重新计算。

use crate::detection::{BBox, Detection, ScaledDetection};

/// 尺寸
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
  pub width: f32,
  pub height: f32,
}

impl Size {
  pub fn new(width: f32, height: f32) -> Self {
    Self { width, height }
  }
}

/// 元素包围盒（相对于同一参考系）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
  pub left: f32,
  pub top: f32,
  pub width: f32,
  pub height: f32,
}

impl Rect {
  pub fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
    Self {
      left,
      top,
      width,
      height,
    }
  }
}

/// 视频元素在容器内的显示尺寸与位置
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DisplayGeometry {
  pub displayed_width: f32,
  pub displayed_height: f32,
  pub offset_x: f32,
  pub offset_y: f32,
}

impl DisplayGeometry {
  /// 由容器与视频的包围盒计算显示几何，叠加层居中于容器
  pub fn compute(container: &Rect, video: &Rect) -> Self {
    let displayed_width = video.width;
    let displayed_height = video.height;
    Self {
      displayed_width,
      displayed_height,
      offset_x: (container.width - displayed_width) / 2.0,
      offset_y: (container.height - displayed_height) / 2.0,
    }
  }

  /// 叠加层的像素尺寸（小数部分截断，负值取零）
  pub fn surface_size(&self) -> (u32, u32) {
    (
      self.displayed_width.max(0.0) as u32,
      self.displayed_height.max(0.0) as u32,
    )
  }

  pub fn scale_factors(&self, video_width: u32, video_height: u32) -> Option<ScaleFactors> {
    ScaleFactors::between(
      Size::new(self.displayed_width, self.displayed_height),
      video_width,
      video_height,
    )
  }
}

/// 固有分辨率到显示尺寸的缩放系数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleFactors {
  pub x: f32,
  pub y: f32,
}

impl ScaleFactors {
  /// 固有尺寸为零时返回 None
  pub fn between(displayed: Size, video_width: u32, video_height: u32) -> Option<Self> {
    if video_width == 0 || video_height == 0 {
      return None;
    }
    Some(Self {
      x: displayed.width / video_width as f32,
      y: displayed.height / video_height as f32,
    })
  }

  pub fn scale_bbox(&self, bbox: BBox) -> BBox {
    BBox::new(
      bbox.x * self.x,
      bbox.y * self.y,
      bbox.width * self.x,
      bbox.height * self.y,
    )
  }

  pub fn scale(&self, detection: &Detection) -> ScaledDetection {
    detection.with_bbox(self.scale_bbox(detection.bbox))
  }

  pub fn scale_all(&self, detections: &[Detection]) -> Vec<ScaledDetection> {
    detections.iter().map(|d| self.scale(d)).collect()
  }
}
