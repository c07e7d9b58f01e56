// 该文件是 Lukuang （路况） 项目的一部分。
// src/config.rs - 配置文件
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

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  bundle::ModelPaths,
  model::{DETECTOR_CONFIDENCE, Device, ONNX_SCHEME},
};

pub const DEFAULT_FOG_MODEL: &str = "models/fog_classifier_resnet50.onnx";
pub const DEFAULT_ACCIDENT_MODEL: &str = "models/accident_classifier_resnet18.onnx";
pub const DEFAULT_DETECTOR_MODEL: &str = "models/Traffic-detection-yolov11.onnx";
pub const DEFAULT_ROUTE_ENDPOINT: &str = "http://router.project-osrm.org";
pub const DEFAULT_ROUTE_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_RISK_CSV: &str = "road_events_delhi_ncr.csv";

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("无法读取配置文件 {0}: {1}")]
  IoError(String, #[source] std::io::Error),
  #[error("配置文件格式错误: {0}")]
  ParseError(#[from] toml::de::Error),
  #[error("模型地址无效 {0}: {1}")]
  InvalidModelUrl(String, String),
  #[error("配置值无效: {0}")]
  InvalidValue(String),
}

/// 完整配置；文件中缺省的字段取内置默认值
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
  pub models: ModelsConfig,
  pub route: RouteConfig,
  pub risk_map: RiskMapConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
  /// `onnx:///...` 地址或本地路径
  pub fog: String,
  pub accident: String,
  pub detector: String,
  pub fog_labels: Option<PathBuf>,
  pub accident_labels: Option<PathBuf>,
  pub detector_labels: Option<PathBuf>,
  pub device: Device,
  pub confidence: f32,
  pub font: Option<PathBuf>,
}

impl Default for ModelsConfig {
  fn default() -> Self {
    Self {
      fog: DEFAULT_FOG_MODEL.to_string(),
      accident: DEFAULT_ACCIDENT_MODEL.to_string(),
      detector: DEFAULT_DETECTOR_MODEL.to_string(),
      fog_labels: None,
      accident_labels: None,
      detector_labels: None,
      device: Device::Auto,
      confidence: DETECTOR_CONFIDENCE,
      font: None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteConfig {
  pub endpoint: String,
  pub timeout_secs: u64,
  pub bounds: BoundsConfig,
}

impl Default for RouteConfig {
  fn default() -> Self {
    Self {
      endpoint: DEFAULT_ROUTE_ENDPOINT.to_string(),
      timeout_secs: DEFAULT_ROUTE_TIMEOUT_SECS,
      bounds: BoundsConfig::default(),
    }
  }
}

/// 允许规划路线的经纬度范围（闭区间），默认为德里首都区
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundsConfig {
  pub min_lat: f64,
  pub max_lat: f64,
  pub min_lon: f64,
  pub max_lon: f64,
}

impl Default for BoundsConfig {
  fn default() -> Self {
    Self {
      min_lat: 28.40,
      max_lat: 28.90,
      min_lon: 76.80,
      max_lon: 77.50,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskMapConfig {
  pub csv: PathBuf,
}

impl Default for RiskMapConfig {
  fn default() -> Self {
    Self {
      csv: PathBuf::from(DEFAULT_RISK_CSV),
    }
  }
}

impl AppConfig {
  pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
    let config: AppConfig = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
  }

  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    info!("读取配置文件: {}", path.display());
    let content = std::fs::read_to_string(path)
      .map_err(|e| ConfigError::IoError(path.display().to_string(), e))?;
    Self::from_toml_str(&content)
  }

  /// 有路径则读取文件，否则使用默认配置
  pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
    match path {
      Some(path) => Self::from_file(path),
      None => {
        debug!("未指定配置文件，使用默认配置");
        Ok(Self::default())
      }
    }
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    let c = self.models.confidence;
    if !(0.0..=1.0).contains(&c) {
      return Err(ConfigError::InvalidValue(format!(
        "models.confidence 必须在 [0, 1] 内, 实际为 {}",
        c
      )));
    }
    let b = &self.route.bounds;
    if b.min_lat > b.max_lat || b.min_lon > b.max_lon {
      return Err(ConfigError::InvalidValue(format!(
        "route.bounds 范围无效: {:?}",
        b
      )));
    }
    if self.route.timeout_secs == 0 {
      return Err(ConfigError::InvalidValue(
        "route.timeout_secs 必须大于 0".to_string(),
      ));
    }
    Ok(())
  }

  pub fn model_paths(&self) -> Result<ModelPaths, ConfigError> {
    let m = &self.models;
    Ok(ModelPaths {
      fog: model_url(&m.fog, m.fog_labels.as_deref())?,
      accident: model_url(&m.accident, m.accident_labels.as_deref())?,
      detector: model_url(&m.detector, m.detector_labels.as_deref())?,
    })
  }
}

/// 将 `onnx:///...` 地址或本地路径统一为模型地址，并附加标签文件参数
pub fn model_url(location: &str, labels: Option<&Path>) -> Result<Url, ConfigError> {
  let invalid = |msg: String| ConfigError::InvalidModelUrl(location.to_string(), msg);

  let mut url = match Url::parse(location) {
    Ok(url) if url.scheme() == ONNX_SCHEME => url,
    Ok(url) if url.scheme().len() > 1 => {
      return Err(invalid(format!("不支持的方案 {}", url.scheme())));
    }
    // 无方案或 Windows 盘符，按本地路径处理
    _ => {
      let path = std::path::absolute(location).map_err(|e| invalid(e.to_string()))?;
      let mut url =
        Url::parse(&format!("{}:///", ONNX_SCHEME)).map_err(|e| invalid(e.to_string()))?;
      url.set_path(&path.to_string_lossy());
      url
    }
  };

  if let Some(labels) = labels
    && !url.query_pairs().any(|(k, _)| k == "labels")
  {
    url
      .query_pairs_mut()
      .append_pair("labels", &labels.to_string_lossy());
  }
  Ok(url)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{FromUrl, model::OnnxModelBuilder};

  #[test]
  fn empty_file_yields_defaults() {
    let config = AppConfig::from_toml_str("").unwrap();
    assert_eq!(config, AppConfig::default());
    assert_eq!(config.route.endpoint, DEFAULT_ROUTE_ENDPOINT);
    assert_eq!(config.route.timeout_secs, 10);
    assert_eq!(config.models.confidence, 0.25);
    assert_eq!(config.risk_map.csv, PathBuf::from(DEFAULT_RISK_CSV));
  }

  #[test]
  fn partial_sections_keep_other_defaults() {
    let config = AppConfig::from_toml_str(
      r#"
      [models]
      fog = "onnx:///srv/fog.onnx"
      device = "cpu"

      [route]
      endpoint = "http://localhost:5000"

      [route.bounds]
      max_lat = 29.0
      "#,
    )
    .unwrap();

    assert_eq!(config.models.fog, "onnx:///srv/fog.onnx");
    assert_eq!(config.models.accident, DEFAULT_ACCIDENT_MODEL);
    assert_eq!(config.models.device, Device::Cpu);
    assert_eq!(config.route.endpoint, "http://localhost:5000");
    assert_eq!(config.route.timeout_secs, DEFAULT_ROUTE_TIMEOUT_SECS);
    assert_eq!(config.route.bounds.max_lat, 29.0);
    assert_eq!(config.route.bounds.min_lat, 28.40);
  }

  #[test]
  fn invalid_values_are_rejected() {
    assert!(matches!(
      AppConfig::from_toml_str("[models]\nconfidence = 1.5\n"),
      Err(ConfigError::InvalidValue(_))
    ));
    assert!(matches!(
      AppConfig::from_toml_str("[route.bounds]\nmin_lat = 30.0\n"),
      Err(ConfigError::InvalidValue(_))
    ));
    assert!(matches!(
      AppConfig::from_toml_str("[models]\ndevice = \"tpu\"\n"),
      Err(ConfigError::ParseError(_))
    ));
  }

  #[test]
  fn bare_paths_become_onnx_urls_with_labels() {
    let url = model_url("/srv/models/fog model.onnx", Some(Path::new("/srv/labels/fog.toml")))
      .unwrap();
    assert_eq!(url.scheme(), ONNX_SCHEME);

    let builder = OnnxModelBuilder::from_url(&url).unwrap();
    assert_eq!(builder.model_path(), "/srv/models/fog model.onnx");
  }

  #[test]
  fn explicit_labels_query_wins() {
    let url = model_url(
      "onnx:///srv/fog.onnx?labels=/a.toml",
      Some(Path::new("/b.toml")),
    )
    .unwrap();
    let labels: Vec<_> = url.query_pairs().filter(|(k, _)| k == "labels").collect();
    assert_eq!(labels.len(), 1);
    assert_eq!(labels[0].1, "/a.toml");
  }

  #[test]
  fn other_schemes_are_rejected() {
    assert!(matches!(
      model_url("https://example.com/fog.onnx", None),
      Err(ConfigError::InvalidModelUrl(..))
    ));
  }

  #[test]
  fn missing_file_is_an_io_error() {
    assert!(matches!(
      AppConfig::load(Some(Path::new("/nonexistent/lukuang.toml"))),
      Err(ConfigError::IoError(..))
    ));
  }
}
