// 该文件是 Lukuang （路况） 项目的一部分。
// src/model/onnx.rs - ONNX Runtime 模型加载与分类器后端
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
  path::{Path, PathBuf},
  sync::Mutex,
};

use ort::{
  session::{Session, builder::GraphOptimizationLevel},
  value::{TensorRef, ValueType},
};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Tensor,
  url_to_path,
  model::{
    ClassifierBackend, Device, LabelError, LabelManifest, ModelError, WithLabel,
    classifier::BINARY_CLASSES,
  },
  preprocess::{CLASSIFIER_INPUT_H, CLASSIFIER_INPUT_W},
};

pub const ONNX_SCHEME: &str = "onnx";

#[derive(Error, Debug)]
pub enum OnnxError {
  #[error("模型文件不存在: {0}")]
  NotFound(String),
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("模型无法解析: {0}, 错误: {1}")]
  Corrupt(String, String),
  #[error("模型无效: {0}")]
  ModelInvalid(String),
  #[error("模型 {path} 输出宽度必须为 {expected}, 实际为 {actual}")]
  OutputWidth {
    path: String,
    expected: usize,
    actual: usize,
  },
  #[error("模型 {0} 缺少类别标签")]
  MissingLabels(String),
  #[error("标签错误: {0}")]
  LabelError(#[from] LabelError),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
}

impl OnnxError {
  pub fn invalid(msg: impl Into<String>) -> Self {
    OnnxError::ModelInvalid(msg.into())
  }
}

/// 从 `onnx:///path/to/model.onnx?labels=/path/to/labels.toml` 构建模型
#[derive(Debug, Clone)]
pub struct OnnxModelBuilder {
  model_path: String,
  labels: Option<PathBuf>,
  device: Device,
}

impl FromUrlWithScheme for OnnxModelBuilder {
  const SCHEME: &'static str = ONNX_SCHEME;
}

impl FromUrl for OnnxModelBuilder {
  type Error = OnnxError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OnnxError::ModelPathError(format!(
        "模型路径必须使用 {} 方案, 实际为 {}",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let mut builder = OnnxModelBuilder::new(url_to_path(url).to_string_lossy());
    for (k, v) in url.query_pairs() {
      match k.as_ref() {
        "labels" => builder.labels = Some(PathBuf::from(v.as_ref())),
        _ => debug!("忽略未知的模型参数: {}={}", k, v),
      }
    }
    Ok(builder)
  }
}

impl OnnxModelBuilder {
  pub fn new(model_path: impl Into<String>) -> Self {
    Self {
      model_path: model_path.into(),
      labels: None,
      device: Device::Auto,
    }
  }

  pub fn labels(mut self, labels: impl Into<PathBuf>) -> Self {
    self.labels = Some(labels.into());
    self
  }

  pub fn device(mut self, device: Device) -> Self {
    self.device = device;
    self
  }

  pub fn model_path(&self) -> &str {
    &self.model_path
  }

  pub fn requested_device(&self) -> Device {
    self.device
  }

  pub(crate) fn label_manifest(&self) -> Result<Option<LabelManifest>, OnnxError> {
    match &self.labels {
      Some(path) => {
        debug!("读取标签文件: {}", path.display());
        Ok(Some(LabelManifest::from_file(path)?))
      }
      None => Ok(None),
    }
  }

  pub(crate) fn open_session(&self) -> Result<Session, OnnxError> {
    let path = Path::new(&self.model_path);
    if !path.exists() {
      error!("模型文件不存在: {}", self.model_path);
      return Err(OnnxError::NotFound(self.model_path.clone()));
    }

    info!("加载模型文件: {}", self.model_path);
    let size = std::fs::metadata(path)?.len();
    debug!("模型文件大小: {:.2} MB", size as f64 / (1024.0 * 1024.0));

    let corrupt =
      |e: &dyn std::fmt::Display| OnnxError::Corrupt(self.model_path.clone(), e.to_string());
    let session = Session::builder()
      .map_err(|e| corrupt(&e))?
      .with_execution_providers(self.device.execution_providers())
      .map_err(|e| corrupt(&e))?
      .with_optimization_level(GraphOptimizationLevel::Level3)
      .map_err(|e| corrupt(&e))?
      .commit_from_file(path)
      .map_err(|e| corrupt(&e))?;

    debug!("模型输入数量: {}", session.inputs.len());
    debug!("模型输出数量: {}", session.outputs.len());
    Ok(session)
  }

  /// 加载二分类器：校验标签表、输入维度与输出宽度
  pub fn build_classifier<L: WithLabel>(&self) -> Result<OnnxClassifier, OnnxError> {
    if let Some(manifest) = self.label_manifest()? {
      manifest.ensure_matches::<L>()?;
    }

    let session = self.open_session()?;
    let input = session
      .inputs
      .first()
      .ok_or_else(|| OnnxError::invalid("模型没有输入"))?;
    let output = session
      .outputs
      .first()
      .ok_or_else(|| OnnxError::invalid("模型没有输出"))?;

    let input_shape = tensor_dims(&input.input_type)
      .ok_or_else(|| OnnxError::invalid(format!("输入 {} 不是张量", input.name)))?;
    if input_shape.len() != 4 {
      return Err(OnnxError::invalid(format!(
        "预期输入为 4 维 NCHW 张量, 实际为 {} 维",
        input_shape.len()
      )));
    }
    let declared_width = tensor_dims(&output.output_type)
      .ok_or_else(|| OnnxError::invalid(format!("输出 {} 不是张量", output.name)))?
      .last()
      .copied()
      .flatten();
    let (input_name, output_name) = (input.name.clone(), output.name.clone());

    let classifier = OnnxClassifier {
      input_name,
      output_name,
      input_shape,
      model_path: self.model_path.clone(),
      session: Mutex::new(session),
    };

    ensure_binary_width(&self.model_path, declared_width, || {
      debug!("输出宽度为动态维度，执行一次探测推理");
      classifier.probe_width()
    })?;

    info!("分类模型加载完成: {}", self.model_path);
    Ok(classifier)
  }
}

/// 分类器输出宽度必须为 2；动态维度由 `probe` 通过一次推理得到
pub(crate) fn ensure_binary_width<F>(
  path: &str,
  declared: Option<usize>,
  probe: F,
) -> Result<usize, OnnxError>
where
  F: FnOnce() -> Result<usize, OnnxError>,
{
  let width = match declared {
    Some(width) => width,
    None => probe()?,
  };
  if width != BINARY_CLASSES {
    error!("预期模型输出宽度为 {}, 实际为 {}", BINARY_CLASSES, width);
    return Err(OnnxError::OutputWidth {
      path: path.to_string(),
      expected: BINARY_CLASSES,
      actual: width,
    });
  }
  Ok(width)
}

/// 张量的声明形状，非正数的维度视为动态
pub(crate) fn tensor_dims(value_type: &ValueType) -> Option<Vec<Option<usize>>> {
  match value_type {
    ValueType::Tensor { shape, .. } => Some(
      shape
        .iter()
        .map(|&d| (d > 0).then_some(d as usize))
        .collect(),
    ),
    _ => None,
  }
}

/// 运行一次推理，返回第一个指定输出的形状与数据
pub(crate) fn run_session(
  session: &Mutex<Session>,
  input_name: &str,
  output_name: &str,
  tensor: &Tensor,
) -> Result<(Vec<usize>, Vec<f32>), ModelError> {
  let contiguous = tensor.as_array().as_standard_layout();
  let input = TensorRef::from_array_view(&contiguous)
    .map_err(|e| ModelError::Runtime(format!("无法创建输入张量: {}", e)))?;

  let mut session = session.lock().map_err(|_| ModelError::Poisoned)?;
  let outputs = session
    .run(ort::inputs![input_name => input])
    .map_err(|e| ModelError::Runtime(e.to_string()))?;

  let output = outputs
    .get(output_name)
    .ok_or_else(|| ModelError::MissingOutput(output_name.to_string()))?;
  let (shape, data) = output
    .try_extract_tensor::<f32>()
    .map_err(|e| ModelError::MalformedOutput(e.to_string()))?;

  let shape = shape.iter().map(|&d| d.max(0) as usize).collect();
  Ok((shape, data.to_vec()))
}

pub struct OnnxClassifier {
  session: Mutex<Session>,
  input_name: String,
  output_name: String,
  input_shape: Vec<Option<usize>>,
  model_path: String,
}

impl OnnxClassifier {
  pub fn model_path(&self) -> &str {
    &self.model_path
  }

  fn probe_width(&self) -> Result<usize, OnnxError> {
    let default = [1, 3, CLASSIFIER_INPUT_H as usize, CLASSIFIER_INPUT_W as usize];
    let mut shape = [0usize; 4];
    for (i, dim) in self.input_shape.iter().enumerate() {
      shape[i] = dim.unwrap_or(default[i]);
    }
    let logits = self
      .forward(&Tensor::zeros(shape))
      .map_err(|e| OnnxError::invalid(format!("探测推理失败: {}", e)))?;
    Ok(logits.len())
  }
}

impl ClassifierBackend for OnnxClassifier {
  fn input_shape(&self) -> Vec<Option<usize>> {
    self.input_shape.clone()
  }

  fn forward(&self, tensor: &Tensor) -> Result<Vec<f32>, ModelError> {
    let (_, logits) = run_session(&self.session, &self.input_name, &self.output_name, tensor)?;
    Ok(logits)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn builder_from_url_reads_labels() {
    let url = Url::parse("onnx:///models/fog.onnx?labels=/models/fog.toml").unwrap();
    let builder = OnnxModelBuilder::from_url(&url).unwrap();
    assert_eq!(builder.model_path(), "/models/fog.onnx");
    assert_eq!(builder.labels, Some(PathBuf::from("/models/fog.toml")));
  }

  #[test]
  fn device_comes_from_the_builder_not_the_url() {
    let url = Url::parse("onnx:///models/fog.onnx?device=cuda").unwrap();
    let builder = OnnxModelBuilder::from_url(&url).unwrap();
    assert_eq!(builder.requested_device(), Device::Auto);
    assert_eq!(builder.device(Device::Cpu).requested_device(), Device::Cpu);
  }

  #[test]
  fn binary_width_accepts_two_outputs() {
    let width = ensure_binary_width("fog.onnx", Some(2), || unreachable!()).unwrap();
    assert_eq!(width, 2);
  }

  #[test]
  fn binary_width_rejects_three_outputs() {
    assert!(matches!(
      ensure_binary_width("fog.onnx", Some(3), || unreachable!()),
      Err(OnnxError::OutputWidth {
        expected: 2,
        actual: 3,
        ..
      })
    ));
  }

  #[test]
  fn dynamic_width_is_resolved_by_inference() {
    assert_eq!(ensure_binary_width("fog.onnx", None, || Ok(2)).unwrap(), 2);
    assert!(matches!(
      ensure_binary_width("fog.onnx", None, || Ok(1000)),
      Err(OnnxError::OutputWidth { actual: 1000, .. })
    ));
    assert!(matches!(
      ensure_binary_width("fog.onnx", None, || Err(OnnxError::invalid("探测失败"))),
      Err(OnnxError::ModelInvalid(_))
    ));
  }

  #[test]
  fn garbage_model_file_is_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fog.onnx");
    std::fs::write(&path, b"not an onnx graph").unwrap();

    let builder = OnnxModelBuilder::new(path.to_string_lossy()).device(Device::Cpu);
    assert!(matches!(
      builder.build_classifier::<crate::model::FogLabel>(),
      Err(OnnxError::Corrupt(..))
    ));
  }

  #[test]
  fn builder_rejects_other_schemes() {
    let url = Url::parse("file:///models/fog.onnx").unwrap();
    assert!(matches!(
      OnnxModelBuilder::from_url(&url),
      Err(OnnxError::ModelPathError(_))
    ));
  }

  #[test]
  fn missing_model_file_is_reported() {
    let builder = OnnxModelBuilder::new("/nonexistent/lukuang/fog.onnx").device(Device::Cpu);
    assert!(matches!(
      builder.build_classifier::<crate::model::FogLabel>(),
      Err(OnnxError::NotFound(_))
    ));
  }

  #[test]
  fn mismatched_manifest_fails_before_session() {
    let dir = tempfile::tempdir().unwrap();
    let labels = dir.path().join("fog.toml");
    std::fs::write(&labels, "version = 1\nlabels = [\"Foggy\", \"Clear\"]\n").unwrap();

    let builder = OnnxModelBuilder::new("/nonexistent/lukuang/fog.onnx").labels(&labels);
    assert!(matches!(
      builder.build_classifier::<crate::model::FogLabel>(),
      Err(OnnxError::LabelError(LabelError::Mismatch { .. }))
    ));
  }
}
