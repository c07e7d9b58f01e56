// 该文件是 Lukuang （路况） 项目的一部分。
// tests/pipeline.rs - 流水线端到端测试
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

use std::{
  collections::BTreeMap,
  sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
  },
};

use image::{Rgb, RgbImage};
use lukuang::{
  bundle::ModelBundle,
  frame::Tensor,
  model::{
    AccidentLabel, BinaryClassifier, ClassifierBackend, DetectItem, DetectResult, Detector,
    DetectorBackend, Device, FogLabel, Model, ModelError,
  },
  pipeline::{Pipeline, PipelineError},
};

struct FixedLogits {
  logits: Vec<f32>,
  calls: Arc<AtomicUsize>,
}

impl FixedLogits {
  fn new(logits: &[f32]) -> Self {
    Self {
      logits: logits.to_vec(),
      calls: Arc::new(AtomicUsize::new(0)),
    }
  }
}

impl ClassifierBackend for FixedLogits {
  fn input_shape(&self) -> Vec<Option<usize>> {
    vec![Some(1), Some(3), Some(224), Some(224)]
  }

  fn forward(&self, tensor: &Tensor) -> Result<Vec<f32>, ModelError> {
    assert_eq!(tensor.shape(), [1, 3, 224, 224]);
    self.calls.fetch_add(1, Ordering::SeqCst);
    Ok(self.logits.clone())
  }
}

struct FixedBoxes {
  items: Vec<DetectItem>,
  names: Vec<String>,
}

impl FixedBoxes {
  fn new(names: &[&str]) -> Self {
    let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
    let items = names
      .iter()
      .enumerate()
      .map(|(i, name)| DetectItem {
        class_id: if name == "car" { 0 } else { 1 },
        class_name: name.clone(),
        score: 0.9,
        bbox: [0.1 * i as f32, 0.1, 0.1 * i as f32 + 0.2, 0.5],
      })
      .collect();
    Self { items, names }
  }
}

impl DetectorBackend for FixedBoxes {
  fn class_names(&self) -> &[String] {
    &self.names
  }

  fn detect(&self, _image: &RgbImage, _confidence: f32) -> Result<DetectResult, ModelError> {
    Ok(DetectResult::from(self.items.clone()))
  }
}

fn pipeline(fog: &[f32], accident: &[f32], boxes: &[&str]) -> Pipeline {
  let bundle = ModelBundle::from_parts(
    BinaryClassifier::new("fog", Box::new(FixedLogits::new(fog))),
    BinaryClassifier::new("accident", Box::new(FixedLogits::new(accident))),
    Detector::new(Box::new(FixedBoxes::new(boxes))),
    Device::Cpu,
  );
  Pipeline::new(Arc::new(bundle))
}

fn road_image() -> RgbImage {
  RgbImage::from_fn(320, 240, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 96]))
}

#[test]
fn foggy_accident_with_vehicles() {
  let pipeline = pipeline(&[0.1, 0.9], &[0.8, 0.2], &["car", "car", "truck"]);
  let result = pipeline.analyze(&road_image()).unwrap();

  assert_eq!(result.fog.label, FogLabel::Foggy);
  assert_eq!(result.accident.label, AccidentLabel::Accident);
  assert_eq!(
    result.detection.counts,
    BTreeMap::from([("car".to_string(), 2), ("truck".to_string(), 1)])
  );
  assert_eq!(result.annotated.dimensions(), (320, 240));
  assert_ne!(result.annotated, road_image());

  let report = serde_json::to_value(result.report()).unwrap();
  assert_eq!(report["fog"], "Foggy");
  assert_eq!(report["accident"], "Accident");
  assert_eq!(report["counts"], serde_json::json!({ "car": 2, "truck": 1 }));
}

#[test]
fn zero_detections_yield_empty_counts() {
  let pipeline = pipeline(&[0.9, 0.1], &[0.1, 0.9], &[]);
  let image = road_image();
  let result = pipeline.infer(&image).unwrap();

  assert_eq!(result.fog.label, FogLabel::Clear);
  assert_eq!(result.accident.label, AccidentLabel::NoAccident);
  assert!(result.detection.counts.is_empty());
  assert_eq!(result.annotated, image);

  let report = serde_json::to_value(result.report()).unwrap();
  assert_eq!(report["counts"], serde_json::json!({}));
}

#[test]
fn repeated_analysis_is_deterministic() {
  let pipeline = pipeline(&[0.3, 0.7], &[0.6, 0.4], &["bus"]);
  let image = road_image();

  let first = pipeline.analyze(&image).unwrap();
  let second = pipeline.analyze(&image).unwrap();

  assert_eq!(first.report(), second.report());
  assert_eq!(first.annotated, second.annotated);
}

#[test]
fn any_resolution_is_accepted() {
  let pipeline = pipeline(&[0.1, 0.9], &[0.8, 0.2], &["car"]);
  for (w, h) in [(1, 1), (224, 224), (1920, 1080), (37, 501)] {
    let result = pipeline.analyze(&RgbImage::new(w, h)).unwrap();
    assert_eq!(result.annotated.dimensions(), (w, h));
  }
}

#[test]
fn each_classifier_runs_once_per_analysis() {
  let fog = FixedLogits::new(&[0.1, 0.9]);
  let accident = FixedLogits::new(&[0.8, 0.2]);
  let (fog_calls, accident_calls) = (fog.calls.clone(), accident.calls.clone());

  let bundle = ModelBundle::from_parts(
    BinaryClassifier::new("fog", Box::new(fog)),
    BinaryClassifier::new("accident", Box::new(accident)),
    Detector::new(Box::new(FixedBoxes::new(&["car"]))),
    Device::Cpu,
  );
  let pipeline = Pipeline::new(Arc::new(bundle));

  pipeline.analyze(&road_image()).unwrap();
  assert_eq!(fog_calls.load(Ordering::SeqCst), 1);
  assert_eq!(accident_calls.load(Ordering::SeqCst), 1);

  pipeline.analyze(&road_image()).unwrap();
  assert_eq!(fog_calls.load(Ordering::SeqCst), 2);
  assert_eq!(accident_calls.load(Ordering::SeqCst), 2);
}

#[test]
fn classifier_failure_names_the_stage() {
  let pipeline = pipeline(&[0.1, 0.9], &[0.1, 0.2, 0.7], &[]);
  assert!(matches!(
    pipeline.analyze(&road_image()),
    Err(PipelineError::Accident(ModelError::OutputWidth { .. }))
  ));
}

#[test]
fn bundle_is_shared_across_threads() {
  let pipeline = Arc::new(pipeline(&[0.1, 0.9], &[0.8, 0.2], &["car"]));
  let handles: Vec<_> = (0..4)
    .map(|_| {
      let pipeline = pipeline.clone();
      std::thread::spawn(move || pipeline.analyze(&road_image()).map(|r| r.report()))
    })
    .collect();

  let reports: Vec<_> = handles
    .into_iter()
    .map(|h| h.join().unwrap().unwrap())
    .collect();
  assert!(reports.windows(2).all(|w| w[0] == w[1]));
}
