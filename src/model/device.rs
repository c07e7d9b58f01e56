// 该文件是 Lukuang （路况） 项目的一部分。
// src/model/device.rs - 计算设备选择
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

use std::{fmt, str::FromStr};

use ort::execution_providers::{
  CPUExecutionProvider, CUDAExecutionProvider, ExecutionProvider, ExecutionProviderDispatch,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// 模型绑定的计算设备
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
  /// 加载时再决定：CUDA 可用则使用 CUDA，否则 CPU
  #[default]
  Auto,
  Cpu,
  Cuda,
}

impl FromStr for Device {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "auto" => Ok(Device::Auto),
      "cpu" => Ok(Device::Cpu),
      "cuda" | "gpu" => Ok(Device::Cuda),
      other => Err(format!("未知设备: {}", other)),
    }
  }
}

impl fmt::Display for Device {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Device::Auto => write!(f, "auto"),
      Device::Cpu => write!(f, "cpu"),
      Device::Cuda => write!(f, "cuda"),
    }
  }
}

impl Device {
  /// 将 `Auto` 解析为具体设备；显式请求 CUDA 但不可用时退回 CPU
  pub fn resolve(self) -> Device {
    let cuda_available = || matches!(CUDAExecutionProvider::default().is_available(), Ok(true));
    let resolved = match self {
      Device::Cpu => Device::Cpu,
      Device::Auto if cuda_available() => Device::Cuda,
      Device::Auto => Device::Cpu,
      Device::Cuda if cuda_available() => Device::Cuda,
      Device::Cuda => {
        warn!("CUDA 执行器不可用，退回 CPU");
        Device::Cpu
      }
    };
    info!("计算设备: {} (请求: {})", resolved, self);
    resolved
  }

  pub(crate) fn execution_providers(self) -> Vec<ExecutionProviderDispatch> {
    match self {
      Device::Cuda => vec![
        CUDAExecutionProvider::default().build(),
        CPUExecutionProvider::default().build(),
      ],
      Device::Cpu | Device::Auto => vec![CPUExecutionProvider::default().build()],
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_device_names() {
    assert_eq!("auto".parse::<Device>().unwrap(), Device::Auto);
    assert_eq!("CPU".parse::<Device>().unwrap(), Device::Cpu);
    assert_eq!("gpu".parse::<Device>().unwrap(), Device::Cuda);
    assert!("tpu".parse::<Device>().is_err());
  }

  #[test]
  fn explicit_cpu_stays_cpu() {
    assert_eq!(Device::Cpu.resolve(), Device::Cpu);
  }
}
