// 该文件是 Guanlan （观澜） 项目的一部分。
// src/frame.rs - 视频帧定义
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

use std::sync::Arc;

use image::{RgbImage, imageops::FilterType};

/// 帧数据
///
/// 图像以 `Arc` 共享，采集线程与检测循环之间传递时不复制像素。
#[derive(Debug, Clone)]
pub struct VideoFrame {
  /// RGB 图像数据（固有分辨率）
  pub image: Arc<RgbImage>,
  /// 帧索引
  pub index: u64,
  /// 时间戳（毫秒）
  pub timestamp_ms: u64,
}

impl VideoFrame {
  pub fn new(image: RgbImage, index: u64, timestamp_ms: u64) -> Self {
    Self {
      image: Arc::new(image),
      index,
      timestamp_ms,
    }
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  /// 缩放到指定尺寸，尺寸相同时直接复制
  pub fn resized(&self, width: u32, height: u32) -> RgbImage {
    if self.image.dimensions() == (width, height) {
      return self.image.as_ref().clone();
    }
    image::imageops::resize(self.image.as_ref(), width, height, FilterType::Triangle)
  }
}
