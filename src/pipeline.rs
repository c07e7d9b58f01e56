// 该文件是 Lukuang （路况） 项目的一部分。
// src/pipeline.rs - 图像分析流水线
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

use std::{collections::BTreeMap, sync::Arc};

use image::RgbImage;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  bundle::ModelBundle,
  model::{
    AccidentLabel, ClassificationResult, DetectItem, DetectionResult, FogLabel, Model, ModelError,
  },
  output::draw::Draw,
  preprocess::Preprocessor,
};

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("雾天分类失败: {0}")]
  Fog(#[source] ModelError),
  #[error("事故分类失败: {0}")]
  Accident(#[source] ModelError),
  #[error("车辆检测失败: {0}")]
  Detect(#[source] ModelError),
}

/// 一张图像的完整分析结果
#[derive(Debug, Clone)]
pub struct AnalysisResult {
  pub fog: ClassificationResult<FogLabel>,
  pub accident: ClassificationResult<AccidentLabel>,
  pub detection: DetectionResult,
  /// 画出检测框的图像，仅用于展示
  pub annotated: RgbImage,
}

impl AnalysisResult {
  /// 纯组合，不做额外计算
  pub fn compose(
    fog: ClassificationResult<FogLabel>,
    accident: ClassificationResult<AccidentLabel>,
    detection: DetectionResult,
    annotated: RgbImage,
  ) -> Self {
    Self {
      fog,
      accident,
      detection,
      annotated,
    }
  }

  pub fn report(&self) -> AnalysisReport {
    AnalysisReport {
      fog: self.fog.label,
      accident: self.accident.label,
      counts: self.detection.counts.clone(),
      fog_logits: self.fog.logits,
      accident_logits: self.accident.logits,
      detections: self.detection.raw.items.to_vec(),
    }
  }
}

/// 可序列化的分析摘要
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
  pub fog: FogLabel,
  pub accident: AccidentLabel,
  pub counts: BTreeMap<String, u32>,
  pub fog_logits: [f32; 2],
  pub accident_logits: [f32; 2],
  pub detections: Vec<DetectItem>,
}

/// 预处理 -> 雾天/事故分类 -> 车辆检测 -> 汇总
pub struct Pipeline {
  bundle: Arc<ModelBundle>,
  preprocessor: Preprocessor,
  draw: Draw,
}

impl Pipeline {
  pub fn new(bundle: Arc<ModelBundle>) -> Self {
    Self {
      bundle,
      preprocessor: Preprocessor::default(),
      draw: Draw::default(),
    }
  }

  pub fn with_draw(mut self, draw: Draw) -> Self {
    self.draw = draw;
    self
  }

  pub fn bundle(&self) -> &ModelBundle {
    &self.bundle
  }

  pub fn analyze(&self, image: &RgbImage) -> Result<AnalysisResult, PipelineError> {
    let now = std::time::Instant::now();
    let tensor = self.preprocessor.apply(image);
    debug!("预处理完成，耗时: {:.2?}", now.elapsed());

    let fog = self.bundle.fog().classify(&tensor).map_err(PipelineError::Fog)?;
    let accident = self
      .bundle
      .accident()
      .classify(&tensor)
      .map_err(PipelineError::Accident)?;
    let detection = self.bundle.detector().detect(image).map_err(PipelineError::Detect)?;
    let annotated = self.draw.draw_on(image, &detection.raw);

    info!(
      "分析完成: 天气 {:?}, 事故 {:?}, 车辆 {:?}, 耗时: {:.2?}",
      fog.label,
      accident.label,
      detection.counts,
      now.elapsed()
    );
    Ok(AnalysisResult::compose(fog, accident, detection, annotated))
  }
}

impl Model for Pipeline {
  type Input = RgbImage;
  type Output = AnalysisResult;
  type Error = PipelineError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    self.analyze(input)
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;
  use crate::model::{DetectResult, count_by_class};

  pub(crate) fn sample_result() -> AnalysisResult {
    let items = vec![
      DetectItem {
        class_id: 2,
        class_name: "car".to_string(),
        score: 0.8,
        bbox: [0.1, 0.1, 0.4, 0.4],
      },
      DetectItem {
        class_id: 2,
        class_name: "car".to_string(),
        score: 0.6,
        bbox: [0.5, 0.5, 0.9, 0.9],
      },
    ];
    let detection = DetectionResult {
      counts: count_by_class(&items),
      raw: DetectResult::from(items),
    };
    AnalysisResult::compose(
      ClassificationResult {
        label: FogLabel::Foggy,
        logits: [0.2, 1.3],
      },
      ClassificationResult {
        label: AccidentLabel::NoAccident,
        logits: [-0.4, 2.1],
      },
      detection,
      RgbImage::new(16, 16),
    )
  }

  #[test]
  fn report_carries_labels_and_counts() {
    let value = serde_json::to_value(sample_result().report()).unwrap();
    assert_eq!(value["fog"], "Foggy");
    assert_eq!(value["accident"], "No Accident");
    assert_eq!(value["counts"], serde_json::json!({ "car": 2 }));
    assert_eq!(value["detections"].as_array().unwrap().len(), 2);
  }
}
