// 该文件是 Guanlan （观澜） 项目的一部分。
// src/model/yolo26.rs - YOLO26 RKNPU 检测模型
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use rknpu::{Context, InitFlags, TensorType};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  detection::{BBox, Detection},
  frame::VideoFrame,
  loader::ModelBackend,
  model::{Detector, select_top},
  url_path,
};

const YOLO26_NUM_INPUTS: u32 = 1;
const YOLO26_NUM_OUTPUTS: u32 = 6;
const YOLO26_CLASS_NUM: usize = 80;
const YOLO26_INPUT_SIZE: u32 = 640;
const YOLO26_INPUT_W: f32 = YOLO26_INPUT_SIZE as f32;
const YOLO26_INPUT_H: f32 = YOLO26_INPUT_SIZE as f32;
const YOLO26_HEAD_SIZES: [(usize, usize); 3] = [(80, 80), (40, 40), (20, 20)];
const YOLO26_STRIDES: [f32; 3] = [8.0, 16.0, 32.0];

/// COCO 数据集类别名称
pub const COCO_LABELS: [&str; 80] = [
  "person",
  "bicycle",
  "car",
  "motorcycle",
  "airplane",
  "bus",
  "train",
  "truck",
  "boat",
  "traffic light",
  "fire hydrant",
  "stop sign",
  "parking meter",
  "bench",
  "bird",
  "cat",
  "dog",
  "horse",
  "sheep",
  "cow",
  "elephant",
  "bear",
  "zebra",
  "giraffe",
  "backpack",
  "umbrella",
  "handbag",
  "tie",
  "suitcase",
  "frisbee",
  "skis",
  "snowboard",
  "sports ball",
  "kite",
  "baseball bat",
  "baseball glove",
  "skateboard",
  "surfboard",
  "tennis racket",
  "bottle",
  "wine glass",
  "cup",
  "fork",
  "knife",
  "spoon",
  "bowl",
  "banana",
  "apple",
  "sandwich",
  "orange",
  "broccoli",
  "carrot",
  "hot dog",
  "pizza",
  "donut",
  "cake",
  "chair",
  "couch",
  "potted plant",
  "bed",
  "dining table",
  "toilet",
  "tv",
  "laptop",
  "mouse",
  "remote",
  "keyboard",
  "cell phone",
  "microwave",
  "oven",
  "toaster",
  "sink",
  "refrigerator",
  "book",
  "clock",
  "vase",
  "scissors",
  "teddy bear",
  "hair drier",
  "toothbrush",
];

#[derive(Error, Debug)]
pub enum Yolo26Error {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("模型文件读取错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("模型无效: {0}, 错误: {1}")]
  ModelInvalid(String, rknpu::Error),
  #[error("RKNN 错误: {0}")]
  RknnError(#[from] rknpu::Error),
  #[error("后端尚未初始化")]
  NotActivated,
}

impl Yolo26Error {
  fn invalid(msg: &str, e: rknpu::Error) -> Self {
    Yolo26Error::ModelInvalid(msg.to_string(), e)
  }
}

/// YOLO26 模型后端
///
/// `yolo26:///path/to/model.rknn`，初始化时读取模型文件，加载时创建 RKNN 上下文。
pub struct Yolo26Builder {
  model_path: String,
  flags: InitFlags,
  model_data: Option<Vec<u8>>,
}

impl FromUrlWithScheme for Yolo26Builder {
  const SCHEME: &'static str = "yolo26";
}

impl FromUrl for Yolo26Builder {
  type Error = Yolo26Error;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(Yolo26Error::SchemeMismatch(url.scheme().to_string()));
    }

    Ok(Yolo26Builder {
      model_path: url_path(url),
      flags: InitFlags::default(),
      model_data: None,
    })
  }
}

impl Yolo26Builder {
  pub fn flags(mut self, flags: InitFlags) -> Self {
    self.flags = flags;
    self
  }
}

impl ModelBackend for Yolo26Builder {
  type Model = Yolo26;
  type Error = Yolo26Error;

  fn name(&self) -> &str {
    "rknpu"
  }

  fn activate(&mut self) -> Result<(), Self::Error> {
    info!("加载模型文件: {}", self.model_path);
    let data = std::fs::read(&self.model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      data.len() as f64 / (1024.0 * 1024.0)
    );
    self.model_data = Some(data);
    Ok(())
  }

  fn load(self) -> Result<Self::Model, Self::Error> {
    let data = self.model_data.ok_or(Yolo26Error::NotActivated)?;

    info!("创建 RKNN 推理上下文");
    let context = Context::new(&data, self.flags)?;

    let version = context
      .sdk_version()
      .map_err(|e| Yolo26Error::invalid("无法查询 SDK 版本", e))?;
    if let Ok(api_ver) = version.api_version() {
      debug!("模型 API 版本: {}", api_ver);
    }
    if let Ok(drv_ver) = version.driver_version() {
      debug!("模型驱动版本: {}", drv_ver);
    }

    let num_inputs = context
      .num_inputs()
      .map_err(|e| Yolo26Error::invalid("无法获取输入数量", e))?;
    let num_outputs = context
      .num_outputs()
      .map_err(|e| Yolo26Error::invalid("无法获取输出数量", e))?;

    if num_inputs != YOLO26_NUM_INPUTS || num_outputs != YOLO26_NUM_OUTPUTS {
      let msg = format!(
        "预期模型输入/输出数量为 {}/{}, 实际为 {}/{}",
        YOLO26_NUM_INPUTS, YOLO26_NUM_OUTPUTS, num_inputs, num_outputs
      );
      error!("{}", msg);
      return Err(Yolo26Error::invalid(&msg, rknpu::Error::InvalidModel));
    }

    Ok(Yolo26 { context })
  }
}

/// 运行在 RKNPU 上的 YOLO26 检测模型
pub struct Yolo26 {
  context: Context,
}

/// 根据张量大小区分回归和分类输出
fn match_reg_cls_tensors<'a>(
  tensor1: &'a [f32],
  tensor2: &'a [f32],
  reg_expected: usize,
  cls_expected: usize,
) -> Option<(&'a [f32], &'a [f32])> {
  if tensor1.len() == reg_expected && tensor2.len() == cls_expected {
    Some((tensor1, tensor2))
  } else if tensor1.len() == cls_expected && tensor2.len() == reg_expected {
    Some((tensor2, tensor1))
  } else {
    None
  }
}

fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}

/// 解码一个检测头，返回归一化的 `[xmin, ymin, xmax, ymax]`
fn decode_head(
  reg: &[f32],
  cls: &[f32],
  (map_h, map_w): (usize, usize),
  stride: f32,
  min_confidence: f32,
  out: &mut Vec<(usize, f32, [f32; 4])>,
) {
  let spatial = map_h * map_w;
  for h in 0..map_h {
    for w in 0..map_w {
      let idx = h * map_w + w;

      let (class_id, max_logit) = (0..YOLO26_CLASS_NUM)
        .map(|c| (c, cls[c * spatial + idx]))
        .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });
      let score = sigmoid(max_logit);
      if score <= min_confidence {
        continue;
      }

      let grid_x = w as f32 + 0.5;
      let grid_y = h as f32 + 0.5;
      let xmin = ((grid_x - reg[idx]) * stride).clamp(0.0, YOLO26_INPUT_W);
      let ymin = ((grid_y - reg[spatial + idx]) * stride).clamp(0.0, YOLO26_INPUT_H);
      let xmax = ((grid_x + reg[2 * spatial + idx]) * stride).clamp(0.0, YOLO26_INPUT_W);
      let ymax = ((grid_y + reg[3 * spatial + idx]) * stride).clamp(0.0, YOLO26_INPUT_H);

      out.push((
        class_id,
        score,
        [
          xmin / YOLO26_INPUT_W,
          ymin / YOLO26_INPUT_H,
          xmax / YOLO26_INPUT_W,
          ymax / YOLO26_INPUT_H,
        ],
      ));
    }
  }
}

/// 归一化坐标转换为原始帧像素坐标
fn to_detection(
  (class_id, score, [x0, y0, x1, y1]): (usize, f32, [f32; 4]),
  width: u32,
  height: u32,
) -> Detection {
  let (w, h) = (width as f32, height as f32);
  let label = COCO_LABELS.get(class_id).copied().unwrap_or("unknown");
  Detection::new(
    label,
    score,
    BBox::new(x0 * w, y0 * h, (x1 - x0) * w, (y1 - y0) * h),
  )
}

impl Detector for Yolo26 {
  type Error = Yolo26Error;

  fn detect(
    &self,
    frame: &VideoFrame,
    max_results: Option<usize>,
    min_confidence: f32,
  ) -> Result<Vec<Detection>, Self::Error> {
    let input = frame.resized(YOLO26_INPUT_SIZE, YOLO26_INPUT_SIZE);
    self.context.set_input(
      0,
      input.as_raw(),
      rknpu::TensorFormat::NHWC,
      TensorType::UInt8,
    )?;
    self.context.run()?;
    let output = self.context.get_outputs()?;

    let mut raw = Vec::new();
    for (head_idx, (&size, stride)) in YOLO26_HEAD_SIZES.iter().zip(YOLO26_STRIDES).enumerate() {
      let spatial = size.0 * size.1;
      let tensor1 = output.get_f32(head_idx * 2)?;
      let tensor2 = output.get_f32(head_idx * 2 + 1)?;
      let Some((reg, cls)) =
        match_reg_cls_tensors(tensor1, tensor2, 4 * spatial, YOLO26_CLASS_NUM * spatial)
      else {
        error!(
          "检测头 {}: 输出大小不匹配 - 张量1: {}, 张量2: {}",
          head_idx,
          tensor1.len(),
          tensor2.len()
        );
        continue;
      };
      decode_head(reg, cls, size, stride, min_confidence, &mut raw);
    }
    debug!("第 {} 帧解码出 {} 个候选", frame.index, raw.len());

    let detections = raw
      .into_iter()
      .map(|item| to_detection(item, frame.width(), frame.height()))
      .collect();
    Ok(select_top(detections, max_results, min_confidence))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn tensors_are_matched_by_size() {
    let reg = [0.0f32; 8];
    let cls = [0.0f32; 160];
    assert!(match_reg_cls_tensors(&reg, &cls, 8, 160).is_some());
    let (r, c) = match_reg_cls_tensors(&cls, &reg, 8, 160).unwrap();
    assert_eq!((r.len(), c.len()), (8, 160));
    assert!(match_reg_cls_tensors(&reg, &reg, 8, 160).is_none());
  }

  #[test]
  fn normalized_box_maps_to_frame_pixels() {
    let det = to_detection((0, 0.9, [0.25, 0.5, 0.75, 1.0]), 640, 480);
    assert_eq!(det.label, "person");
    assert_eq!(det.bbox, BBox::new(160.0, 240.0, 320.0, 240.0));
  }

  #[test]
  fn single_cell_head_is_decoded() {
    // 1x1 特征图，步长 32，中心 (16,16)
    let reg = [0.25, 0.25, 0.25, 0.25];
    let mut cls = [-10.0f32; YOLO26_CLASS_NUM];
    cls[2] = 5.0;
    let mut out = Vec::new();
    decode_head(&reg, &cls, (1, 1), 32.0, 0.6, &mut out);
    assert_eq!(out.len(), 1);
    let (class_id, score, bbox) = out[0];
    assert_eq!(class_id, 2);
    assert!(score > 0.99);
    assert_eq!(bbox, [8.0 / 640.0, 8.0 / 640.0, 24.0 / 640.0, 24.0 / 640.0]);

    out.clear();
    decode_head(&reg, &[-10.0f32; YOLO26_CLASS_NUM], (1, 1), 32.0, 0.6, &mut out);
    assert!(out.is_empty());
  }
}
