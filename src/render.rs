// 该文件是 Guanlan （观澜） 项目的一部分。
// src/render.rs - 检测框绘制
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::convert::Infallible;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use image::Rgba;
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect as PixelRect;
use thiserror::Error;
use tracing::info;

use crate::{detection::ScaledDetection, surface::OverlaySurface};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 18.0;
const LABEL_TEXT_HEIGHT: i32 = 22;
const LABEL_CHAR_WIDTH: f32 = 10.0; // 无字体时的每字符宽度估计
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const LINE_THICKNESS: i32 = 2;
const TEXT_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// 叠加层渲染器
///
/// 每次调用先清空上一帧的内容，再绘制全部检测结果。
pub trait Render: Send {
  type Error: std::error::Error + Send + Sync + 'static;
  fn render(
    &self,
    detections: &[ScaledDetection],
    surface: &mut OverlaySurface,
  ) -> Result<(), Self::Error>;
}

#[derive(Error, Debug)]
pub enum RenderError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体无效: {0}")]
  InvalidFont(#[from] ab_glyph::InvalidFont),
}

/// 检测框绘制器
///
/// 绘制带标签的矩形框；未提供字体时只绘制标签底色。
pub struct BoxPainter {
  font: Option<FontVec>,
  font_size: f32,
  label_text_height: i32,
  label_char_width: f32,
  label_text_vertical_padding: i32,
}

impl Default for BoxPainter {
  fn default() -> Self {
    Self {
      font: None,
      font_size: LABEL_FONT_SIZE,
      label_text_height: LABEL_TEXT_HEIGHT,
      label_char_width: LABEL_CHAR_WIDTH,
      label_text_vertical_padding: LABEL_TEXT_VERTICAL_PADDING,
    }
  }
}

impl BoxPainter {
  pub fn with_font_file(path: impl AsRef<Path>) -> Result<Self, RenderError> {
    let path = path.as_ref();
    let data = std::fs::read(path)?;
    let font = FontVec::try_from_vec(data)?;
    info!("加载标签字体: {}", path.display());
    Ok(Self {
      font: Some(font),
      ..Self::default()
    })
  }

  pub fn font_size(mut self, font_size: f32) -> Self {
    self.font_size = font_size;
    self.label_text_height = font_size.ceil() as i32 + 2 * self.label_text_vertical_padding;
    self.label_char_width = font_size * 0.55;
    self
  }

  /// 按标签生成稳定的颜色
  pub fn color_for(label: &str) -> Rgba<u8> {
    let mut hasher = DefaultHasher::new();
    label.hash(&mut hasher);
    let hue = (hasher.finish() % 360) as f32;
    let [r, g, b] = hsv_to_rgb(hue, 0.8, 0.9);
    Rgba([r, g, b, 255])
  }

  fn draw_detection(&self, surface: &mut OverlaySurface, detection: &ScaledDetection) {
    let (w, h) = (surface.width() as i32, surface.height() as i32);
    if w == 0 || h == 0 {
      return;
    }

    let bbox = detection.bbox;
    let x_min = (bbox.x.floor() as i32).clamp(0, w - 1);
    let y_min = (bbox.y.floor() as i32).clamp(0, h - 1);
    let x_max = (bbox.right().ceil() as i32).clamp(0, w - 1);
    let y_max = (bbox.bottom().ceil() as i32).clamp(0, h - 1);

    if x_min >= x_max || y_min >= y_max {
      return;
    }

    let color = Self::color_for(&detection.label);
    let canvas = surface.canvas_mut();

    // 边框加粗
    for thickness in 0..LINE_THICKNESS {
      let width = x_max - x_min + 1 - 2 * thickness;
      let height = y_max - y_min + 1 - 2 * thickness;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = PixelRect::at(x_min + thickness, y_min + thickness)
        .of_size(width as u32, height as u32);
      draw_hollow_rect_mut(canvas, rect, color);
    }

    let label = format!("{} {:.1}%", detection.label, detection.confidence * 100.0);
    let scale = PxScale::from(self.font_size);
    let (text_width, text_height) = match &self.font {
      Some(font) => {
        let (tw, _) = text_size(scale, font, &label);
        (tw as i32 + 4, self.label_text_height)
      }
      None => (
        (label.chars().count() as f32 * self.label_char_width) as i32,
        self.label_text_height,
      ),
    };

    // 标签位于边框上方，贴近顶部时落在框内
    let label_x = x_min;
    let label_y = (y_min - text_height).max(0);
    let label_width = text_width.min(w - label_x);
    let label_height = text_height.min(h - label_y);

    if label_width > 0 && label_height > 0 {
      let rect =
        PixelRect::at(label_x, label_y).of_size(label_width as u32, label_height as u32);
      draw_filled_rect_mut(canvas, rect, color);

      if let Some(font) = &self.font {
        draw_text_mut(
          canvas,
          TEXT_COLOR,
          label_x + 2,
          label_y + self.label_text_vertical_padding,
          scale,
          font,
          &label,
        );
      }
    }
  }
}

impl Render for BoxPainter {
  type Error = Infallible;

  fn render(
    &self,
    detections: &[ScaledDetection],
    surface: &mut OverlaySurface,
  ) -> Result<(), Self::Error> {
    surface.clear();
    for detection in detections {
      self.draw_detection(surface, detection);
    }
    Ok(())
  }
}

/// HSV 转 RGB
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> [u8; 3] {
  let c = v * s;
  let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
  let m = v - c;

  let (r, g, b) = if h < 60.0 {
    (c, x, 0.0)
  } else if h < 120.0 {
    (x, c, 0.0)
  } else if h < 180.0 {
    (0.0, c, x)
  } else if h < 240.0 {
    (0.0, x, c)
  } else if h < 300.0 {
    (x, 0.0, c)
  } else {
    (c, 0.0, x)
  };

  [
    ((r + m) * 255.0) as u8,
    ((g + m) * 255.0) as u8,
    ((b + m) * 255.0) as u8,
  ]
}
