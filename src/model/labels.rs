// 该文件是 Lukuang （路况） 项目的一部分。
// src/model/labels.rs - 类别标签
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

use std::{fmt, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::WithLabel;

/// 雾天分类器标签，索引 0 = Clear，索引 1 = Foggy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FogLabel {
  #[serde(rename = "Clear")]
  Clear,
  #[serde(rename = "Foggy")]
  Foggy,
}

impl WithLabel for FogLabel {
  const LABELS: &'static [&'static str] = &["Clear", "Foggy"];

  fn to_label_str(&self) -> &'static str {
    match self {
      FogLabel::Clear => "Clear",
      FogLabel::Foggy => "Foggy",
    }
  }

  fn from_label_id(id: usize) -> Option<Self> {
    match id {
      0 => Some(FogLabel::Clear),
      1 => Some(FogLabel::Foggy),
      _ => None,
    }
  }
}

impl fmt::Display for FogLabel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.to_label_str())
  }
}

/// 事故分类器标签，索引 0 = Accident，索引 1 = No Accident
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AccidentLabel {
  #[serde(rename = "Accident")]
  Accident,
  #[serde(rename = "No Accident")]
  NoAccident,
}

impl WithLabel for AccidentLabel {
  const LABELS: &'static [&'static str] = &["Accident", "No Accident"];

  fn to_label_str(&self) -> &'static str {
    match self {
      AccidentLabel::Accident => "Accident",
      AccidentLabel::NoAccident => "No Accident",
    }
  }

  fn from_label_id(id: usize) -> Option<Self> {
    match id {
      0 => Some(AccidentLabel::Accident),
      1 => Some(AccidentLabel::NoAccident),
      _ => None,
    }
  }
}

impl fmt::Display for AccidentLabel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.to_label_str())
  }
}

pub const LABEL_MANIFEST_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum LabelError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("标签文件解析错误: {0}")]
  ParseError(#[from] toml::de::Error),
  #[error("不支持的标签文件版本: {0}")]
  UnsupportedVersion(u32),
  #[error("标签表为空")]
  Empty,
  #[error("标签表与权重约定不一致: 期望 {expected:?}, 实际 {actual:?}")]
  Mismatch {
    expected: Vec<String>,
    actual: Vec<String>,
  },
}

/// 与权重文件一同发布的标签表
///
/// ```toml
/// version = 1
/// labels = ["Clear", "Foggy"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LabelManifest {
  pub version: u32,
  pub labels: Vec<String>,
}

impl LabelManifest {
  pub fn from_toml_str(content: &str) -> Result<Self, LabelError> {
    let manifest: LabelManifest = toml::from_str(content)?;
    if manifest.version != LABEL_MANIFEST_VERSION {
      return Err(LabelError::UnsupportedVersion(manifest.version));
    }
    if manifest.labels.is_empty() {
      return Err(LabelError::Empty);
    }
    Ok(manifest)
  }

  pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, LabelError> {
    let content = std::fs::read_to_string(path)?;
    Self::from_toml_str(&content)
  }

  /// 标签表必须与代码中固定的顺序完全一致
  pub fn ensure_matches<L: WithLabel>(&self) -> Result<(), LabelError> {
    if self.labels.iter().map(String::as_str).eq(L::LABELS.iter().copied()) {
      Ok(())
    } else {
      Err(LabelError::Mismatch {
        expected: L::LABELS.iter().map(|s| s.to_string()).collect(),
        actual: self.labels.clone(),
      })
    }
  }
}

/// 解析 Ultralytics 导出模型元数据中的 `names` 字段，
/// 形如 `{0: 'car', 1: 'truck'}`，返回按索引排列的类别名。
pub fn parse_names_metadata(raw: &str) -> Option<Vec<String>> {
  let body = raw.trim().strip_prefix('{')?.strip_suffix('}')?;
  let mut entries = Vec::new();
  let mut rest = body.trim_start();

  while !rest.is_empty() {
    let (key, after_key) = rest.split_once(':')?;
    let index: usize = key.trim().parse().ok()?;

    let after_key = after_key.trim_start();
    let quote = after_key.chars().next().filter(|c| *c == '\'' || *c == '"')?;
    let value_and_rest = &after_key[1..];
    let end = value_and_rest.find(quote)?;
    entries.push((index, value_and_rest[..end].to_string()));

    rest = value_and_rest[end + 1..].trim_start();
    rest = rest.strip_prefix(',').unwrap_or(rest).trim_start();
  }

  entries.sort_by_key(|(index, _)| *index);
  if entries.is_empty() || entries.iter().enumerate().any(|(i, (index, _))| i != *index) {
    return None;
  }
  Some(entries.into_iter().map(|(_, name)| name).collect())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fog_label_order_is_fixed() {
    assert_eq!(FogLabel::from_label_id(0), Some(FogLabel::Clear));
    assert_eq!(FogLabel::from_label_id(1), Some(FogLabel::Foggy));
    assert_eq!(FogLabel::from_label_id(2), None);
    assert_eq!(FogLabel::Foggy.to_label_str(), "Foggy");
  }

  #[test]
  fn accident_label_order_is_fixed() {
    assert_eq!(AccidentLabel::from_label_id(0), Some(AccidentLabel::Accident));
    assert_eq!(AccidentLabel::from_label_id(1), Some(AccidentLabel::NoAccident));
    assert_eq!(AccidentLabel::NoAccident.to_label_str(), "No Accident");
  }

  #[test]
  fn bundled_manifests_match_fixed_tables() {
    let fog = LabelManifest::from_toml_str(include_str!("../../labels/fog.toml")).unwrap();
    fog.ensure_matches::<FogLabel>().unwrap();

    let accident =
      LabelManifest::from_toml_str(include_str!("../../labels/accident.toml")).unwrap();
    accident.ensure_matches::<AccidentLabel>().unwrap();
  }

  #[test]
  fn swapped_manifest_is_rejected() {
    let manifest =
      LabelManifest::from_toml_str("version = 1\nlabels = [\"Foggy\", \"Clear\"]\n").unwrap();
    assert!(matches!(
      manifest.ensure_matches::<FogLabel>(),
      Err(LabelError::Mismatch { .. })
    ));
  }

  #[test]
  fn unknown_manifest_version_is_rejected() {
    let err = LabelManifest::from_toml_str("version = 2\nlabels = [\"a\"]\n").unwrap_err();
    assert!(matches!(err, LabelError::UnsupportedVersion(2)));
  }

  #[test]
  fn parses_ultralytics_names() {
    let names = parse_names_metadata("{0: 'car', 1: 'truck', 2: \"motor bike\"}").unwrap();
    assert_eq!(names, vec!["car", "truck", "motor bike"]);
  }

  #[test]
  fn rejects_names_with_gaps() {
    assert_eq!(parse_names_metadata("{0: 'car', 2: 'truck'}"), None);
    assert_eq!(parse_names_metadata("{}"), None);
    assert_eq!(parse_names_metadata("car, truck"), None);
  }
}
