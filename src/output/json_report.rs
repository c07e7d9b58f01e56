// 该文件是 Lukuang （路况） 项目的一部分。
// src/output/json_report.rs - JSON 分析报告输出
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
  fs::OpenOptions,
  io::Write,
  path::{Path, PathBuf},
};

use image::RgbImage;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, output::Render, pipeline::AnalysisResult, url_to_path,
};

#[derive(Error, Debug)]
pub enum JsonReportError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("序列化错误: {0}")]
  SerializeError(#[from] serde_json::Error),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

/// `json:///path/report.json` 覆盖写入；`.jsonl` 或 `?lines` 时每张图像追加一行
pub struct JsonReportOutput {
  path: PathBuf,
  lines: bool,
}

impl FromUrlWithScheme for JsonReportOutput {
  const SCHEME: &'static str = "json";
}

impl FromUrl for JsonReportOutput {
  type Error = JsonReportError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(JsonReportError::SchemeMismatch);
    }

    let path = url_to_path(uri);
    let lines = uri.query_pairs().any(|(k, _)| k == "lines")
      || path.extension().is_some_and(|e| e == "jsonl");
    Ok(Self { path, lines })
  }
}

impl JsonReportOutput {
  pub fn new(path: impl Into<PathBuf>, lines: bool) -> Self {
    Self {
      path: path.into(),
      lines,
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn write_report(&self, result: &AnalysisResult) -> Result<(), JsonReportError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    let report = result.report();
    if self.lines {
      let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&self.path)?;
      serde_json::to_writer(&mut file, &report)?;
      file.write_all(b"\n")?;
    } else {
      std::fs::write(&self.path, serde_json::to_vec_pretty(&report)?)?;
    }

    info!("写入分析报告: {}", self.path.display());
    Ok(())
  }
}

impl Render<RgbImage, AnalysisResult> for JsonReportOutput {
  type Error = JsonReportError;

  fn render_result(&self, _frame: &RgbImage, result: &AnalysisResult) -> Result<(), Self::Error> {
    self.write_report(result)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::pipeline::tests::sample_result;

  #[test]
  fn report_is_written_as_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out").join("report.json");
    let output = JsonReportOutput::new(&path, false);
    let result = sample_result();

    output.render_result(&result.annotated, &result).unwrap();
    output.render_result(&result.annotated, &result).unwrap();

    let value: serde_json::Value =
      serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(value["fog"], "Foggy");
    assert_eq!(value["accident"], "No Accident");
    assert_eq!(value["counts"]["car"], 2);
  }

  #[test]
  fn jsonl_urls_append_one_line_per_image() {
    let dir = tempfile::tempdir().unwrap();
    let url = Url::parse(&format!("json://{}/batch.jsonl", dir.path().display())).unwrap();
    let output = JsonReportOutput::from_url(&url).unwrap();
    let result = sample_result();

    output.render_result(&result.annotated, &result).unwrap();
    output.render_result(&result.annotated, &result).unwrap();

    let text = std::fs::read_to_string(output.path()).unwrap();
    assert_eq!(text.lines().count(), 2);
  }
}
