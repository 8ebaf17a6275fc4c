// 该文件是 Guanlan （观澜） 项目的一部分。
// src/args.rs - 命令行参数
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use clap::Parser;
use guanlan::geometry::Size;
use url::Url;

/// 观澜：实时视频目标检测叠加
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型地址
  /// - replay:///path/detections.json
  /// - yolo26:///path/model.rknn
  #[arg(long, value_name = "MODEL")]
  pub model: Url,

  /// 视频来源
  /// - image:///path/frame.png?fps=15
  /// - v4l2:///dev/video0?width=640&height=480
  /// - gst://camera/dev/video0 或 gst://file/path/video.mp4
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 画面输出
  /// - none:
  /// - image:///path/latest.png
  /// - folder:///path/records?record&always
  #[arg(long, value_name = "OUTPUT", default_value = "none:")]
  pub output: Url,

  /// 两次检测之间的最短间隔（毫秒）
  #[arg(long, value_name = "MILLIS", default_value_t = 10)]
  pub interval_ms: u64,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, value_name = "THRESHOLD", default_value_t = 0.6)]
  pub min_confidence: f32,

  /// 每帧最多返回的检测数
  #[arg(long, value_name = "COUNT")]
  pub max_results: Option<usize>,

  /// 容器尺寸，如 820x470
  #[arg(long, value_name = "WxH", default_value = "820x470", value_parser = parse_size)]
  pub container: Size,

  /// 视频元素首选尺寸
  #[arg(long, value_name = "WxH", default_value = "800x450", value_parser = parse_size)]
  pub element: Size,

  /// 容器内边距
  #[arg(long, value_name = "PIXELS", default_value_t = 0.0)]
  pub padding: f32,

  /// 标签字体（TTF/OTF）
  #[arg(long, value_name = "FONT")]
  pub font: Option<PathBuf>,

  /// 标签字号（像素）
  #[arg(long, value_name = "FONT_SIZE")]
  pub font_size: Option<f32>,

  /// 完成指定帧数后退出，0 表示直到中断
  #[arg(long, value_name = "FRAME_NUMBER", default_value_t = 0)]
  pub frame_number: u64,
}

fn parse_size(s: &str) -> Result<Size, String> {
  let (width, height) = s
    .split_once(['x', 'X'])
    .ok_or_else(|| format!("尺寸格式应为 WxH: {}", s))?;
  let width = width
    .trim()
    .parse::<f32>()
    .map_err(|e| format!("宽度无效: {}", e))?;
  let height = height
    .trim()
    .parse::<f32>()
    .map_err(|e| format!("高度无效: {}", e))?;
  if width < 0.0 || height < 0.0 {
    return Err(format!("尺寸不能为负: {}", s));
  }
  Ok(Size::new(width, height))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_sizes() {
    assert_eq!(parse_size("820x470").unwrap(), Size::new(820.0, 470.0));
    assert_eq!(parse_size("640X480").unwrap(), Size::new(640.0, 480.0));
    assert!(parse_size("640").is_err());
    assert!(parse_size("-1x2").is_err());
  }

  #[test]
  fn defaults() {
    let args = Args::parse_from(["guanlan", "--model", "replay:///d.json", "--input", "image:///f.png"]);
    assert_eq!(args.interval_ms, 10);
    assert_eq!(args.min_confidence, 0.6);
    assert_eq!(args.max_results, None);
    assert_eq!(args.output.scheme(), "none");
    assert_eq!(args.container, Size::new(820.0, 470.0));
    assert_eq!(args.font_size, None);
  }

  #[test]
  fn parses_font_size() {
    let args = Args::parse_from([
      "guanlan",
      "--model",
      "replay:///d.json",
      "--input",
      "image:///f.png",
      "--font-size",
      "24",
    ]);
    assert_eq!(args.font_size, Some(24.0));
  }
}
