// 该文件是 Lukuang （路况） 项目的一部分。
// src/model/classifier.rs - 二分类器
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

use std::marker::PhantomData;

use serde::Serialize;
use tracing::debug;

use crate::{
  frame::Tensor,
  model::{Model, ModelError, WithLabel},
};

pub const BINARY_CLASSES: usize = 2;

/// 分类器推理后端：输入归一化张量，输出原始 logits
pub trait ClassifierBackend: Send + Sync {
  /// 期望的输入形状，`None` 表示动态维度
  fn input_shape(&self) -> Vec<Option<usize>>;

  fn forward(&self, tensor: &Tensor) -> Result<Vec<f32>, ModelError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassificationResult<L> {
  pub label: L,
  pub logits: [f32; BINARY_CLASSES],
}

/// 二分类推理：前向 -> arg-max -> 固定标签表。
///
/// 不设置置信度阈值，51%/49% 的结果同样给出确定的标签。
pub struct BinaryClassifier<L> {
  name: &'static str,
  backend: Box<dyn ClassifierBackend>,
  _label: PhantomData<L>,
}

impl<L: WithLabel> BinaryClassifier<L> {
  pub fn new(name: &'static str, backend: Box<dyn ClassifierBackend>) -> Self {
    Self {
      name,
      backend,
      _label: PhantomData,
    }
  }

  pub fn name(&self) -> &'static str {
    self.name
  }

  pub fn input_shape(&self) -> Vec<Option<usize>> {
    self.backend.input_shape()
  }

  fn check_shape(&self, tensor: &Tensor) -> Result<(), ModelError> {
    let expected = self.backend.input_shape();
    let actual = tensor.shape();
    let matches = expected.len() == actual.len()
      && expected
        .iter()
        .zip(actual.iter())
        .all(|(e, a)| e.is_none_or(|e| e == *a));
    if matches {
      Ok(())
    } else {
      Err(ModelError::Shape {
        expected,
        actual: actual.to_vec(),
      })
    }
  }

  pub fn classify(&self, tensor: &Tensor) -> Result<ClassificationResult<L>, ModelError> {
    self.check_shape(tensor)?;

    let output = self.backend.forward(tensor)?;
    let logits: [f32; BINARY_CLASSES] = output
      .as_slice()
      .try_into()
      .map_err(|_| ModelError::OutputWidth {
        expected: BINARY_CLASSES,
        actual: output.len(),
      })?;

    let index = argmax(&logits);
    let label = L::from_label_id(index).ok_or(ModelError::OutputWidth {
      expected: L::LABELS.len(),
      actual: BINARY_CLASSES,
    })?;
    debug!("{} 分类结果: {:?} (logits: {:?})", self.name, label, logits);

    Ok(ClassificationResult { label, logits })
  }
}

impl<L: WithLabel> Model for BinaryClassifier<L> {
  type Input = Tensor;
  type Output = ClassificationResult<L>;
  type Error = ModelError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    self.classify(input)
  }
}

/// 最大值索引；并列时取靠前的索引，NaN 不参与比较
fn argmax(values: &[f32]) -> usize {
  let mut best = 0usize;
  let mut best_value = f32::NEG_INFINITY;
  for (i, &v) in values.iter().enumerate() {
    if v > best_value {
      best = i;
      best_value = v;
    }
  }
  best
}
