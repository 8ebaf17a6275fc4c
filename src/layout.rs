// 该文件是 Guanlan （观澜） 项目的一部分。
// src/layout.rs - 容器与视频元素布局
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

use std::sync::RwLock;

use crate::geometry::{Rect, Size};

/// 布局查询
///
/// 对应页面中的包围盒查询，元素尚未挂载时返回 None。
/// 布局可能在两帧之间变化，调用方不应缓存结果。
pub trait Layout: Send + Sync {
  fn container_rect(&self) -> Option<Rect>;
  fn video_rect(&self) -> Option<Rect>;
}

#[derive(Debug, Clone, Copy)]
struct CenteredState {
  container: Size,
  element: Size,
  padding: f32,
  visible: bool,
}

/// 居中布局
///
/// 容器带内边距，视频元素以首选尺寸居中，容器过小时收缩以适应。
#[derive(Debug)]
pub struct CenteredLayout {
  state: RwLock<CenteredState>,
}

impl CenteredLayout {
  pub fn new(container: Size, element: Size) -> Self {
    Self {
      state: RwLock::new(CenteredState {
        container,
        element,
        padding: 0.0,
        visible: true,
      }),
    }
  }

  pub fn with_padding(self, padding: f32) -> Self {
    {
      let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
      state.padding = padding.max(0.0);
    }
    self
  }

  /// 调整容器尺寸（例如窗口缩放）
  pub fn resize_container(&self, container: Size) {
    let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
    state.container = container;
  }

  /// 隐藏后所有查询返回 None
  pub fn set_visible(&self, visible: bool) {
    let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
    state.visible = visible;
  }

  fn snapshot(&self) -> CenteredState {
    *self.state.read().unwrap_or_else(|e| e.into_inner())
  }
}

impl Layout for CenteredLayout {
  fn container_rect(&self) -> Option<Rect> {
    let state = self.snapshot();
    state.visible.then(|| {
      Rect::new(0.0, 0.0, state.container.width, state.container.height)
    })
  }

  fn video_rect(&self) -> Option<Rect> {
    let state = self.snapshot();
    if !state.visible {
      return None;
    }

    let inner_width = (state.container.width - 2.0 * state.padding).max(0.0);
    let inner_height = (state.container.height - 2.0 * state.padding).max(0.0);
    // 按比例收缩，保持视频宽高比
    let scale = if state.element.width > 0.0 && state.element.height > 0.0 {
      (inner_width / state.element.width)
        .min(inner_height / state.element.height)
        .min(1.0)
    } else {
      0.0
    };
    let width = state.element.width * scale;
    let height = state.element.height * scale;

    Some(Rect::new(
      (state.container.width - width) / 2.0,
      (state.container.height - height) / 2.0,
      width,
      height,
    ))
  }
}
