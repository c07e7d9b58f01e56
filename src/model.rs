// 该文件是 Lukuang （路况） 项目的一部分。
// src/model.rs - 模型
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

use serde::Serialize;
use thiserror::Error;

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 固定顺序的标签：索引与训练权重中的类别索引一一对应
pub trait WithLabel: Sized + Copy + std::fmt::Debug {
  const LABELS: &'static [&'static str];

  fn to_label_str(&self) -> &'static str;
  fn from_label_id(id: usize) -> Option<Self>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectItem {
  pub class_id: u32,
  pub class_name: String,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，相对原图归一化
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }
}

impl From<Vec<DetectItem>> for DetectResult {
  fn from(items: Vec<DetectItem>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("输入张量形状不匹配: 期望 {expected:?}, 实际 {actual:?}")]
  Shape {
    expected: Vec<Option<usize>>,
    actual: Vec<usize>,
  },
  #[error("模型输出宽度不匹配: 期望 {expected}, 实际 {actual}")]
  OutputWidth { expected: usize, actual: usize },
  #[error("ONNX Runtime 推理错误: {0}")]
  Runtime(String),
  #[error("模型输出缺失: {0}")]
  MissingOutput(String),
  #[error("模型输出格式错误: {0}")]
  MalformedOutput(String),
  #[error("推理会话锁已损坏")]
  Poisoned,
}

mod classifier;
mod detector;
mod device;
mod labels;
mod onnx;
mod yolo;

pub use self::classifier::{BinaryClassifier, ClassificationResult, ClassifierBackend};
pub use self::detector::{
  DETECTOR_CONFIDENCE, DetectionResult, Detector, DetectorBackend, count_by_class,
};
pub use self::device::Device;
pub use self::labels::{AccidentLabel, FogLabel, LabelError, LabelManifest, parse_names_metadata};
pub use self::onnx::{ONNX_SCHEME, OnnxClassifier, OnnxError, OnnxModelBuilder};
pub use self::yolo::{OnnxYolo, YOLO_IOU_THRESHOLD, YOLO_MAX_DETECTIONS, letterbox, nms};
