// 该文件是 Guanlan （观澜） 项目的一部分。
// src/surface.rs - 叠加绘制层
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

use image::{Rgba, RgbaImage};

use crate::geometry::DisplayGeometry;

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// 透明叠加层
///
/// 像素尺寸与视频元素的显示尺寸一致，位置为相对容器的偏移。
#[derive(Debug, Clone)]
pub struct OverlaySurface {
  canvas: RgbaImage,
  left: f32,
  top: f32,
}

impl Default for OverlaySurface {
  fn default() -> Self {
    Self::new()
  }
}

impl OverlaySurface {
  pub fn new() -> Self {
    Self {
      canvas: RgbaImage::new(0, 0),
      left: 0.0,
      top: 0.0,
    }
  }

  /// 按显示几何设置尺寸与位置，同时清空内容
  pub fn apply_geometry(&mut self, geometry: &DisplayGeometry) {
    let (width, height) = geometry.surface_size();
    if self.canvas.dimensions() == (width, height) {
      self.clear();
    } else {
      self.canvas = RgbaImage::new(width, height);
    }
    self.left = geometry.offset_x;
    self.top = geometry.offset_y;
  }

  pub fn clear(&mut self) {
    self
      .canvas
      .pixels_mut()
      .for_each(|pixel| *pixel = TRANSPARENT);
  }

  pub fn width(&self) -> u32 {
    self.canvas.width()
  }

  pub fn height(&self) -> u32 {
    self.canvas.height()
  }

  pub fn left(&self) -> f32 {
    self.left
  }

  pub fn top(&self) -> f32 {
    self.top
  }

  pub fn canvas(&self) -> &RgbaImage {
    &self.canvas
  }

  pub fn canvas_mut(&mut self) -> &mut RgbaImage {
    &mut self.canvas
  }

  pub fn is_blank(&self) -> bool {
    self.canvas.pixels().all(|pixel| pixel[3] == 0)
  }
}
