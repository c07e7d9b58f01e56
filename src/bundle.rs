// 该文件是 Lukuang （路况） 项目的一部分。
// src/bundle.rs - 模型集合的加载与共享
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

use std::sync::{Arc, Mutex, OnceLock};

use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{
  FromUrl,
  model::{
    AccidentLabel, BinaryClassifier, Detector, Device, FogLabel, OnnxError, OnnxModelBuilder,
  },
};

#[derive(Error, Debug)]
pub enum LoadError {
  #[error("雾天分类模型加载失败: {0}")]
  Fog(#[source] OnnxError),
  #[error("事故分类模型加载失败: {0}")]
  Accident(#[source] OnnxError),
  #[error("车辆检测模型加载失败: {0}")]
  Detector(#[source] OnnxError),
  #[error("模型初始化锁已损坏")]
  Poisoned,
}

/// 三个模型权重的位置
#[derive(Debug, Clone)]
pub struct ModelPaths {
  pub fog: Url,
  pub accident: Url,
  pub detector: Url,
}

/// 加载完成后只读的模型集合，可通过 `Arc` 在请求之间共享
pub struct ModelBundle {
  fog: BinaryClassifier<FogLabel>,
  accident: BinaryClassifier<AccidentLabel>,
  detector: Detector,
  device: Device,
}

impl ModelBundle {
  /// 加载全部模型；任何一个失败都视为致命错误，不提供降级模式
  pub fn load(paths: &ModelPaths, device: Device) -> Result<Self, LoadError> {
    let device = device.resolve();
    info!("开始加载模型 (设备: {})", device);
    let now = std::time::Instant::now();

    let builder = |url: &Url| OnnxModelBuilder::from_url(url).map(|b| b.device(device));

    let fog = builder(&paths.fog)
      .and_then(|b| b.build_classifier::<FogLabel>())
      .map_err(LoadError::Fog)?;
    let accident = builder(&paths.accident)
      .and_then(|b| b.build_classifier::<AccidentLabel>())
      .map_err(LoadError::Accident)?;
    let detector = builder(&paths.detector)
      .and_then(|b| b.build_detector())
      .map_err(LoadError::Detector)?;

    info!("模型加载完成，耗时: {:.2?}", now.elapsed());
    Ok(Self::from_parts(
      BinaryClassifier::new("fog", Box::new(fog)),
      BinaryClassifier::new("accident", Box::new(accident)),
      Detector::new(Box::new(detector)),
      device,
    ))
  }

  pub fn from_parts(
    fog: BinaryClassifier<FogLabel>,
    accident: BinaryClassifier<AccidentLabel>,
    detector: Detector,
    device: Device,
  ) -> Self {
    Self {
      fog,
      accident,
      detector,
      device,
    }
  }

  pub fn with_detector_confidence(mut self, confidence: f32) -> Self {
    self.detector = self.detector.with_confidence(confidence);
    self
  }

  pub fn fog(&self) -> &BinaryClassifier<FogLabel> {
    &self.fog
  }

  pub fn accident(&self) -> &BinaryClassifier<AccidentLabel> {
    &self.accident
  }

  pub fn detector(&self) -> &Detector {
    &self.detector
  }

  pub fn device(&self) -> Device {
    self.device
  }
}

/// 进程内只加载一次的模型缓存
#[derive(Default)]
pub struct BundleCache {
  cell: OnceLock<Arc<ModelBundle>>,
  init: Mutex<()>,
}

impl BundleCache {
  pub const fn new() -> Self {
    Self {
      cell: OnceLock::new(),
      init: Mutex::new(()),
    }
  }

  pub fn get(&self) -> Option<Arc<ModelBundle>> {
    self.cell.get().cloned()
  }

  /// 返回已加载的模型；首次调用时执行 `load`，并发调用者等待同一次加载
  pub fn get_or_try_load<F>(&self, load: F) -> Result<Arc<ModelBundle>, LoadError>
  where
    F: FnOnce() -> Result<ModelBundle, LoadError>,
  {
    if let Some(bundle) = self.cell.get() {
      return Ok(bundle.clone());
    }

    let _guard = self.init.lock().map_err(|_| LoadError::Poisoned)?;
    if let Some(bundle) = self.cell.get() {
      return Ok(bundle.clone());
    }

    let bundle = Arc::new(load()?);
    if self.cell.set(bundle.clone()).is_err() {
      warn!("模型缓存已被初始化");
    }
    Ok(bundle)
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use image::RgbImage;

  use super::*;
  use crate::{
    frame::Tensor,
    model::{ClassifierBackend, DetectResult, DetectorBackend, ModelError},
  };

  struct Zeros;

  impl ClassifierBackend for Zeros {
    fn input_shape(&self) -> Vec<Option<usize>> {
      vec![None, Some(3), Some(224), Some(224)]
    }

    fn forward(&self, _tensor: &Tensor) -> Result<Vec<f32>, ModelError> {
      Ok(vec![0.0, 0.0])
    }
  }

  impl DetectorBackend for Zeros {
    fn class_names(&self) -> &[String] {
      &[]
    }

    fn detect(&self, _image: &RgbImage, _confidence: f32) -> Result<DetectResult, ModelError> {
      Ok(DetectResult::default())
    }
  }

  fn stub_bundle() -> ModelBundle {
    ModelBundle::from_parts(
      BinaryClassifier::new("fog", Box::new(Zeros)),
      BinaryClassifier::new("accident", Box::new(Zeros)),
      Detector::new(Box::new(Zeros)),
      Device::Cpu,
    )
  }

  #[test]
  fn cache_loads_once() {
    let cache = BundleCache::new();
    let calls = AtomicUsize::new(0);

    let first = cache
      .get_or_try_load(|| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(stub_bundle())
      })
      .unwrap();
    let second = cache
      .get_or_try_load(|| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(stub_bundle())
      })
      .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(Arc::ptr_eq(&first, &second));
  }

  #[test]
  fn failed_load_leaves_cache_empty() {
    let cache = BundleCache::new();
    let err = cache.get_or_try_load(|| {
      Err(LoadError::Fog(OnnxError::NotFound("fog.onnx".to_string())))
    });
    assert!(matches!(err, Err(LoadError::Fog(_))));
    assert!(cache.get().is_none());

    assert!(cache.get_or_try_load(|| Ok(stub_bundle())).is_ok());
    assert!(cache.get().is_some());
  }

  #[test]
  fn concurrent_callers_share_one_bundle() {
    let cache = Arc::new(BundleCache::new());
    let calls = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
      .map(|_| {
        let cache = cache.clone();
        let calls = calls.clone();
        std::thread::spawn(move || {
          cache
            .get_or_try_load(|| {
              calls.fetch_add(1, Ordering::SeqCst);
              Ok(stub_bundle())
            })
            .map(|_| ())
            .is_ok()
        })
      })
      .collect();

    for handle in handles {
      assert!(handle.join().unwrap());
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn missing_artifact_is_a_load_error() {
    let paths = ModelPaths {
      fog: Url::parse("onnx:///nonexistent/lukuang/fog.onnx").unwrap(),
      accident: Url::parse("onnx:///nonexistent/lukuang/accident.onnx").unwrap(),
      detector: Url::parse("onnx:///nonexistent/lukuang/traffic.onnx").unwrap(),
    };
    assert!(matches!(
      ModelBundle::load(&paths, Device::Cpu),
      Err(LoadError::Fog(OnnxError::NotFound(_)))
    ));
  }

  #[test]
  fn corrupt_artifact_is_a_load_error() {
    let dir = tempfile::tempdir().unwrap();
    let fog = dir.path().join("fog.onnx");
    std::fs::write(&fog, [0xde, 0xad, 0xbe, 0xef, 0x00, 0x01]).unwrap();

    let onnx =
      |path: &std::path::Path| Url::parse(&format!("onnx://{}", path.display())).unwrap();
    let paths = ModelPaths {
      fog: onnx(&fog),
      accident: onnx(&dir.path().join("accident.onnx")),
      detector: onnx(&dir.path().join("traffic.onnx")),
    };
    assert!(matches!(
      ModelBundle::load(&paths, Device::Cpu),
      Err(LoadError::Fog(OnnxError::Corrupt(..)))
    ));
  }
}
