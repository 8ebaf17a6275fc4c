// 该文件是 Guanlan （观澜） 项目的一部分。
// src/task.rs - 检测循环
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

use std::fmt;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  camera::{ReadyState, VideoElement},
  component::{Phase, StatusHandle},
  detection::ScaledDetection,
  geometry::DisplayGeometry,
  layout::Layout,
  model::Detector,
  output::{Present, Scene},
  render::Render,
  surface::OverlaySurface,
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// 检测循环参数
#[derive(Debug, Clone)]
pub struct LoopConfig {
  /// 两次检测之间的最短间隔
  pub interval: Duration,
  pub min_confidence: f32,
  /// None 时由模型决定上限
  pub max_results: Option<usize>,
  /// 连续失败达到该次数后停止循环
  pub max_consecutive_failures: usize,
  pub skip_log_interval: Duration,
  pub failure_log_every: usize,
}

impl Default for LoopConfig {
  fn default() -> Self {
    Self {
      interval: Duration::from_millis(10),
      min_confidence: 0.6,
      max_results: None,
      max_consecutive_failures: 50,
      skip_log_interval: Duration::from_secs(5),
      failure_log_every: 10,
    }
  }
}

/// 跳过本次检测的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
  ContainerMissing,
  VideoMissing,
  VideoNotReady(ReadyState),
  EmptyVideo,
  NoFrame,
}

impl fmt::Display for SkipReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SkipReason::ContainerMissing => write!(f, "容器不可用"),
      SkipReason::VideoMissing => write!(f, "视频元素不存在"),
      SkipReason::VideoNotReady(state) => write!(f, "视频未就绪 ({:?})", state),
      SkipReason::EmptyVideo => write!(f, "视频尺寸为零"),
      SkipReason::NoFrame => write!(f, "没有当前帧"),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
  Skipped(SkipReason),
  Rendered { detections: Vec<ScaledDetection> },
}

#[derive(Error, Debug)]
pub enum TickError {
  #[error("检测失败: {0}")]
  Detect(#[source] BoxError),
  #[error("绘制失败: {0}")]
  Render(#[source] BoxError),
  #[error("输出失败: {0}")]
  Present(#[source] BoxError),
}

/// 第一次失败以及此后每 `every` 次失败输出一次警告
fn failure_is_logged(consecutive_failures: usize, every: usize) -> bool {
  consecutive_failures == 1 || consecutive_failures % every.max(1) == 0
}

/// 检测循环
///
/// 每次 tick 读取布局与视频状态，运行模型，将结果缩放到显示尺寸后绘制到叠加层。
pub struct DetectionLoop<M, R, P> {
  model: M,
  video: Arc<dyn VideoElement>,
  layout: Arc<dyn Layout>,
  renderer: R,
  output: P,
  config: LoopConfig,
  surface: OverlaySurface,
  last_skip_log: Option<Instant>,
}

impl<M, R, P> DetectionLoop<M, R, P>
where
  M: Detector,
  R: Render,
  P: Present,
{
  pub fn new(
    model: M,
    video: Arc<dyn VideoElement>,
    layout: Arc<dyn Layout>,
    renderer: R,
    output: P,
    config: LoopConfig,
  ) -> Self {
    Self {
      model,
      video,
      layout,
      renderer,
      output,
      config,
      surface: OverlaySurface::new(),
      last_skip_log: None,
    }
  }

  /// 执行一次检测
  pub fn tick(&mut self) -> Result<TickOutcome, TickError> {
    let Some(container) = self.layout.container_rect() else {
      return Ok(TickOutcome::Skipped(SkipReason::ContainerMissing));
    };
    let Some(video_rect) = self.layout.video_rect() else {
      return Ok(TickOutcome::Skipped(SkipReason::VideoMissing));
    };
    let ready = self.video.ready_state();
    if ready != ReadyState::HaveEnoughData {
      return Ok(TickOutcome::Skipped(SkipReason::VideoNotReady(ready)));
    }
    if self.video.video_width() == 0 || self.video.video_height() == 0 {
      return Ok(TickOutcome::Skipped(SkipReason::EmptyVideo));
    }
    let Some(frame) = self.video.current_frame() else {
      return Ok(TickOutcome::Skipped(SkipReason::NoFrame));
    };

    // 每帧重新计算，布局可能已经变化
    let geometry = DisplayGeometry::compute(&container, &video_rect);
    // 模型输出位于帧自身的像素坐标中
    let Some(scale) = geometry.scale_factors(frame.width(), frame.height()) else {
      return Ok(TickOutcome::Skipped(SkipReason::EmptyVideo));
    };
    self.surface.apply_geometry(&geometry);

    let now = Instant::now();
    let detections = self
      .model
      .detect(&frame, self.config.max_results, self.config.min_confidence)
      .map_err(|e| TickError::Detect(Box::new(e)))?;
    debug!(
      "第 {} 帧检测到 {} 个物体，耗时: {:.2?}",
      frame.index,
      detections.len(),
      now.elapsed()
    );

    let scaled = scale.scale_all(&detections);
    self
      .renderer
      .render(&scaled, &mut self.surface)
      .map_err(|e| TickError::Render(Box::new(e)))?;

    let scene = Scene {
      frame: &frame,
      container,
      video: video_rect,
      geometry,
      detections: &scaled,
      surface: &self.surface,
    };
    self
      .output
      .present(&scene)
      .map_err(|e| TickError::Present(Box::new(e)))?;

    Ok(TickOutcome::Rendered { detections: scaled })
  }

  /// 跳过日志按 `skip_log_interval` 限流，返回本次是否输出
  fn log_skip(&mut self, reason: SkipReason) -> bool {
    let due = self
      .last_skip_log
      .is_none_or(|last| last.elapsed() >= self.config.skip_log_interval);
    if due {
      debug!("跳过本次检测: {}", reason);
      self.last_skip_log = Some(Instant::now());
    }
    due
  }

  /// 自定步调运行，直到收到停止信号或连续失败过多
  ///
  /// 上一次 tick 结束后才开始等待下一次，两次 tick 不会重叠。
  pub fn run(mut self, stop: Receiver<()>, status: StatusHandle) {
    info!("检测循环开始，间隔: {:.2?}", self.config.interval);
    let mut consecutive_failures = 0usize;

    loop {
      match stop.try_recv() {
        Ok(()) | Err(TryRecvError::Disconnected) => break,
        Err(TryRecvError::Empty) => {}
      }

      let started = Instant::now();
      match self.tick() {
        Ok(TickOutcome::Rendered { detections }) => {
          consecutive_failures = 0;
          status.update(|s| {
            s.ticks += 1;
            s.rendered += 1;
            s.consecutive_failures = 0;
            s.last_detections = detections;
          });
        }
        Ok(TickOutcome::Skipped(reason)) => {
          self.log_skip(reason);
          status.update(|s| {
            s.ticks += 1;
            s.skipped += 1;
          });
        }
        Err(e) => {
          consecutive_failures += 1;
          if failure_is_logged(consecutive_failures, self.config.failure_log_every) {
            warn!("检测失败（连续 {} 次）: {}", consecutive_failures, e);
          }
          let message = e.to_string();
          let give_up = consecutive_failures >= self.config.max_consecutive_failures;
          status.update(|s| {
            s.ticks += 1;
            s.failures += 1;
            s.consecutive_failures = consecutive_failures;
            s.last_error = Some(message.clone());
            if give_up {
              s.phase = Phase::Failed(message);
            }
          });
          if give_up {
            error!("连续 {} 次检测失败，停止检测循环", consecutive_failures);
            break;
          }
        }
      }

      let wait = self.config.interval.saturating_sub(started.elapsed());
      match stop.recv_timeout(wait) {
        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        Err(RecvTimeoutError::Timeout) => {}
      }
    }

    info!("检测循环结束");
  }
}
