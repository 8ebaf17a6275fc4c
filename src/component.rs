// 该文件是 Guanlan （观澜） 项目的一部分。
// src/component.rs - 检测组件
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

//! # 检测组件
//!
//! 挂载时在工作线程中加载模型，加载完成后启动检测循环；
//! 卸载时发送停止信号并等待工作线程退出。
//!
//! ```no_run
//! use std::sync::Arc;
//! use guanlan::{
//!   camera::LiveVideo, component::ObjectDetection, geometry::Size,
//!   layout::CenteredLayout, model::ReplayBuilder, output::NoOutput, render::BoxPainter,
//! };
//! # fn main() -> anyhow::Result<()> {
//! let url = url::Url::parse("image:///tmp/street.png")?;
//! let video = Arc::new(<LiveVideo as guanlan::FromUrl>::from_url(&url)?);
//! let layout = Arc::new(CenteredLayout::new(Size::new(820.0, 470.0), Size::new(800.0, 450.0)));
//! let mounted = ObjectDetection::new(
//!   ReplayBuilder::new("/tmp/detections.json"),
//!   video,
//!   layout,
//!   BoxPainter::default(),
//!   NoOutput,
//! )
//! .mount()?;
//! let status = mounted.unmount();
//! println!("{:?}", status.phase);
//! # Ok(())
//! # }
//! ```

use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tracing::{error, info, warn};

use crate::{
  camera::VideoElement,
  detection::ScaledDetection,
  layout::Layout,
  loader::{ModelBackend, load_model},
  output::Present,
  render::Render,
  task::{DetectionLoop, LoopConfig},
};

/// 组件所处阶段
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Phase {
  #[default]
  Loading,
  Running,
  Failed(String),
  Unmounted,
}

/// 可观察的运行状态
#[derive(Debug, Clone, Default)]
pub struct Status {
  pub phase: Phase,
  pub ticks: u64,
  pub rendered: u64,
  pub skipped: u64,
  pub failures: u64,
  pub consecutive_failures: usize,
  pub last_error: Option<String>,
  pub last_detections: Vec<ScaledDetection>,
}

#[derive(Debug, Clone, Default)]
pub struct StatusHandle {
  inner: Arc<Mutex<Status>>,
}

impl StatusHandle {
  pub fn snapshot(&self) -> Status {
    self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone()
  }

  pub fn phase(&self) -> Phase {
    self
      .inner
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .phase
      .clone()
  }

  pub(crate) fn update(&self, f: impl FnOnce(&mut Status)) {
    f(&mut self.inner.lock().unwrap_or_else(|e| e.into_inner()));
  }
}

/// 目标检测组件
pub struct ObjectDetection<B, R, P> {
  backend: B,
  video: Arc<dyn VideoElement>,
  layout: Arc<dyn Layout>,
  renderer: R,
  output: P,
  config: LoopConfig,
}

impl<B, R, P> ObjectDetection<B, R, P>
where
  B: ModelBackend,
  R: Render + 'static,
  P: Present + 'static,
{
  pub fn new(
    backend: B,
    video: Arc<dyn VideoElement>,
    layout: Arc<dyn Layout>,
    renderer: R,
    output: P,
  ) -> Self {
    Self {
      backend,
      video,
      layout,
      renderer,
      output,
      config: LoopConfig::default(),
    }
  }

  pub fn with_config(mut self, config: LoopConfig) -> Self {
    self.config = config;
    self
  }

  /// 挂载组件
  ///
  /// 立即返回，模型在工作线程中加载；加载失败时阶段变为 `Failed`，循环不会启动。
  pub fn mount(self) -> std::io::Result<Mounted> {
    let status = StatusHandle::default();
    let (stop_tx, stop_rx) = mpsc::channel();

    let worker = {
      let status = status.clone();
      thread::Builder::new()
        .name("guanlan-detect".to_string())
        .spawn(move || {
          let model = match load_model(self.backend) {
            Ok(model) => model,
            Err(e) => {
              error!("模型加载失败: {}", e);
              status.update(|s| s.phase = Phase::Failed(e.to_string()));
              return;
            }
          };
          status.update(|s| s.phase = Phase::Running);

          DetectionLoop::new(
            model,
            self.video,
            self.layout,
            self.renderer,
            self.output,
            self.config,
          )
          .run(stop_rx, status);
        })?
    };

    info!("组件已挂载");
    Ok(Mounted {
      stop: Some(stop_tx),
      worker: Some(worker),
      status,
    })
  }
}

/// 已挂载的组件
///
/// 卸载或丢弃时停止检测循环，返回后不会再有新的 tick。
/// 正在进行的检测不会被中断，卸载会等待其完成。
pub struct Mounted {
  stop: Option<Sender<()>>,
  worker: Option<JoinHandle<()>>,
  status: StatusHandle,
}

impl Mounted {
  pub fn status(&self) -> Status {
    self.status.snapshot()
  }

  pub fn status_handle(&self) -> StatusHandle {
    self.status.clone()
  }

  pub fn unmount(mut self) -> Status {
    self.cancel();
    self.status.snapshot()
  }

  fn cancel(&mut self) {
    if let Some(stop) = self.stop.take() {
      // 工作线程可能已经退出
      let _ = stop.send(());
    }
    if let Some(worker) = self.worker.take() {
      if worker.join().is_err() {
        warn!("检测线程异常退出");
      }
      self.status.update(|s| {
        if !matches!(s.phase, Phase::Failed(_)) {
          s.phase = Phase::Unmounted;
        }
      });
      info!("组件已卸载");
    }
  }
}

impl Drop for Mounted {
  fn drop(&mut self) {
    self.cancel();
  }
}
