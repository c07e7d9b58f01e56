// 该文件是 Lukuang （路况） 项目的一部分。
// src/args.rs - 命令行公共参数
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

use std::path::PathBuf;

use clap::Args;
use tracing::info;

use crate::{
  bundle::{BundleCache, ModelBundle},
  config::{AppConfig, ConfigError},
  model::Device,
  output::draw::Draw,
  pipeline::Pipeline,
};

static BUNDLE: BundleCache = BundleCache::new();

/// 模型相关参数；命令行优先于配置文件，配置文件优先于默认值
#[derive(Args, Debug, Clone, Default)]
pub struct ModelArgs {
  /// TOML 配置文件
  #[arg(long, value_name = "FILE")]
  pub config: Option<PathBuf>,
  /// 雾天分类模型（onnx:///path 或本地路径）
  #[arg(long, value_name = "MODEL")]
  pub fog: Option<String>,
  /// 事故分类模型
  #[arg(long, value_name = "MODEL")]
  pub accident: Option<String>,
  /// 车辆检测模型
  #[arg(long, value_name = "MODEL")]
  pub detector: Option<String>,
  /// 计算设备: auto, cpu, cuda
  #[arg(long, value_name = "DEVICE")]
  pub device: Option<Device>,
  /// 检测置信度阈值 (0.0 - 1.0)
  #[arg(long, value_name = "THRESHOLD")]
  pub confidence: Option<f32>,
  /// 标签字体文件，不指定时只绘制检测框
  #[arg(long, value_name = "FONT")]
  pub font: Option<PathBuf>,
}

impl ModelArgs {
  pub fn apply(&self, config: &mut AppConfig) {
    let m = &mut config.models;
    if let Some(fog) = &self.fog {
      m.fog = fog.clone();
    }
    if let Some(accident) = &self.accident {
      m.accident = accident.clone();
    }
    if let Some(detector) = &self.detector {
      m.detector = detector.clone();
    }
    if let Some(device) = self.device {
      m.device = device;
    }
    if let Some(confidence) = self.confidence {
      m.confidence = confidence;
    }
    if let Some(font) = &self.font {
      m.font = Some(font.clone());
    }
  }

  pub fn load_config(&self) -> Result<AppConfig, ConfigError> {
    let mut config = AppConfig::load(self.config.as_deref())?;
    self.apply(&mut config);
    config.validate()?;
    Ok(config)
  }
}

/// 按配置加载模型（进程内只加载一次）并组装流水线
pub fn load_pipeline(config: &AppConfig) -> anyhow::Result<Pipeline> {
  let paths = config.model_paths()?;
  info!("雾天分类模型: {}", paths.fog);
  info!("事故分类模型: {}", paths.accident);
  info!("车辆检测模型: {}", paths.detector);

  let models = &config.models;
  let bundle = BUNDLE.get_or_try_load(|| {
    ModelBundle::load(&paths, models.device)
      .map(|bundle| bundle.with_detector_confidence(models.confidence))
  })?;

  let draw = match &models.font {
    Some(font) => Draw::with_font_file(font)?,
    None => Draw::default(),
  };
  Ok(Pipeline::new(bundle).with_draw(draw))
}
