// 该文件是 Guanlan （观澜） 项目的一部分。
// src/main.rs - 项目主程序
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

mod args;

use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};

use guanlan::{
  FromUrl,
  camera::LiveVideo,
  component::{ObjectDetection, Phase},
  layout::CenteredLayout,
  model::ModelSource,
  output::OutputWrapper,
  render::BoxPainter,
  task::LoopConfig,
};

const STATUS_POLL: Duration = Duration::from_millis(100);

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  info!("模型地址: {}", args.model);
  info!("视频来源: {}", args.input);
  info!("画面输出: {}", args.output);

  let backend = ModelSource::from_url(&args.model)?;
  let output = OutputWrapper::from_url(&args.output)?;
  let mut renderer = match &args.font {
    Some(path) => BoxPainter::with_font_file(path)?,
    None => BoxPainter::default(),
  };
  if let Some(size) = args.font_size {
    renderer = renderer.font_size(size);
  }
  let video = Arc::new(LiveVideo::from_url(&args.input)?);
  let layout = Arc::new(
    CenteredLayout::new(args.container, args.element).with_padding(args.padding),
  );
  let config = LoopConfig {
    interval: Duration::from_millis(args.interval_ms),
    min_confidence: args.min_confidence,
    max_results: args.max_results,
    ..LoopConfig::default()
  };

  let mounted = ObjectDetection::new(backend, video, layout, renderer, output)
    .with_config(config)
    .mount()?;

  let (tx, rx) = mpsc::channel();
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    let _ = tx.send(());
  })?;

  let status = mounted.status_handle();
  loop {
    match rx.recv_timeout(STATUS_POLL) {
      Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
      Err(RecvTimeoutError::Timeout) => {}
    }
    let current = status.snapshot();
    if let Phase::Failed(message) = &current.phase {
      error!("检测组件失败: {}", message);
      break;
    }
    if args.frame_number > 0 && current.rendered >= args.frame_number {
      warn!("已达到指定帧数 {}, 停止检测", args.frame_number);
      break;
    }
  }

  let summary = mounted.unmount();
  info!(
    "共 {} 次检测：完成 {}，跳过 {}，失败 {}",
    summary.ticks, summary.rendered, summary.skipped, summary.failures
  );
  for det in &summary.last_detections {
    info!(
      "  - {}: {:.2}% at ({:.0}, {:.0}, {:.0}x{:.0})",
      det.label,
      det.confidence * 100.0,
      det.bbox.x,
      det.bbox.y,
      det.bbox.width,
      det.bbox.height
    );
  }

  if let Phase::Failed(message) = summary.phase {
    anyhow::bail!("检测失败: {}", message);
  }
  Ok(())
}
