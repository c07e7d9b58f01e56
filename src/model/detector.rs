// 该文件是 Lukuang （路况） 项目的一部分。
// src/model/detector.rs - 车辆检测与计数
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

use std::collections::BTreeMap;

use image::RgbImage;
use tracing::debug;

use crate::model::{DetectItem, DetectResult, Model, ModelError};

pub const DETECTOR_CONFIDENCE: f32 = 0.25;

/// 检测推理后端：自行完成预处理，直接接收原始图像
pub trait DetectorBackend: Send + Sync {
  fn class_names(&self) -> &[String];

  fn detect(&self, image: &RgbImage, confidence: f32) -> Result<DetectResult, ModelError>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionResult {
  /// 类别名 -> 数量，只包含至少出现一次的类别
  pub counts: BTreeMap<String, u32>,
  pub raw: DetectResult,
}

impl DetectionResult {
  pub fn total(&self) -> u32 {
    self.counts.values().sum()
  }
}

pub fn count_by_class<'a, I>(items: I) -> BTreeMap<String, u32>
where
  I: IntoIterator<Item = &'a DetectItem>,
{
  let mut counts = BTreeMap::new();
  for item in items {
    *counts.entry(item.class_name.clone()).or_insert(0) += 1;
  }
  counts
}

pub struct Detector {
  backend: Box<dyn DetectorBackend>,
  confidence: f32,
}

impl Detector {
  pub fn new(backend: Box<dyn DetectorBackend>) -> Self {
    Self {
      backend,
      confidence: DETECTOR_CONFIDENCE,
    }
  }

  /// 置信度阈值，低于该值的检测框不计数
  pub fn with_confidence(mut self, confidence: f32) -> Self {
    self.confidence = confidence;
    self
  }

  pub fn confidence(&self) -> f32 {
    self.confidence
  }

  pub fn class_names(&self) -> &[String] {
    self.backend.class_names()
  }

  pub fn detect(&self, image: &RgbImage) -> Result<DetectionResult, ModelError> {
    let result = self.backend.detect(image, self.confidence)?;
    let retained: Vec<DetectItem> = result
      .items
      .iter()
      .filter(|item| item.score >= self.confidence)
      .cloned()
      .collect();

    let counts = count_by_class(&retained);
    debug!("检测到 {} 个目标: {:?}", retained.len(), counts);

    Ok(DetectionResult {
      counts,
      raw: DetectResult::from(retained),
    })
  }
}

impl Model for Detector {
  type Input = RgbImage;
  type Output = DetectionResult;
  type Error = ModelError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    self.detect(input)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn item(name: &str, score: f32) -> DetectItem {
    DetectItem {
      class_id: 0,
      class_name: name.to_string(),
      score,
      bbox: [0.1, 0.1, 0.2, 0.2],
    }
  }

  struct FixedBoxes(Vec<DetectItem>, Vec<String>);

  impl DetectorBackend for FixedBoxes {
    fn class_names(&self) -> &[String] {
      &self.1
    }

    fn detect(&self, _image: &RgbImage, _confidence: f32) -> Result<DetectResult, ModelError> {
      Ok(DetectResult::from(self.0.clone()))
    }
  }

  #[test]
  fn counts_per_class_name() {
    let detector = Detector::new(Box::new(FixedBoxes(
      vec![item("car", 0.9), item("truck", 0.5), item("car", 0.3)],
      vec![],
    )));
    let result = detector.detect(&RgbImage::new(8, 8)).unwrap();

    assert_eq!(result.counts.get("car"), Some(&2));
    assert_eq!(result.counts.get("truck"), Some(&1));
    assert_eq!(result.total(), 3);
    assert!(result.counts.values().all(|&v| v >= 1));
  }

  #[test]
  fn low_confidence_boxes_are_not_counted() {
    let detector = Detector::new(Box::new(FixedBoxes(
      vec![item("bus", 0.1), item("bus", 0.24)],
      vec![],
    )));
    let result = detector.detect(&RgbImage::new(8, 8)).unwrap();

    assert!(result.counts.is_empty());
    assert!(result.raw.is_empty());
  }

  #[test]
  fn confidence_threshold_is_configurable() {
    let detector = Detector::new(Box::new(FixedBoxes(
      vec![item("car", 0.9), item("car", 0.5)],
      vec![],
    )))
    .with_confidence(0.6);
    let result = detector.detect(&RgbImage::new(8, 8)).unwrap();
    assert_eq!(result.counts.get("car"), Some(&1));
  }

  #[test]
  fn no_detections_is_an_empty_mapping() {
    let detector = Detector::new(Box::new(FixedBoxes(vec![], vec![])));
    let result = detector.detect(&RgbImage::new(8, 8)).unwrap();
    assert!(result.counts.is_empty());
    assert_eq!(result.total(), 0);
  }
}
