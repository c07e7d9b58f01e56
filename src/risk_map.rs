// 该文件是 Lukuang （路况） 项目的一部分。
// src/risk_map.rs - 道路风险地图
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

use std::{io::Read, path::Path};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  geojson::{Feature, LatLon, MapLayer, Style},
  model::{AccidentLabel, FogLabel, WithLabel},
};

pub const RISK_MAP_ZOOM: u8 = 11;

#[derive(Error, Debug)]
pub enum RiskMapError {
  #[error("无法读取风险数据 {0}: {1}")]
  IoError(String, #[source] std::io::Error),
  #[error("风险数据格式错误: {0}")]
  CsvError(#[from] csv::Error),
  #[error("风险数据为空，无法计算地图中心")]
  Empty,
}

/// 一条道路事件记录
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RiskRecord {
  pub latitude: f64,
  pub longitude: f64,
  pub fog: String,
  pub accident: String,
  pub vehicle_count: u32,
}

impl RiskRecord {
  pub fn position(&self) -> LatLon {
    LatLon::new(self.latitude, self.longitude)
  }

  pub fn is_foggy(&self) -> bool {
    self.fog == FogLabel::Foggy.to_label_str()
  }

  pub fn is_accident(&self) -> bool {
    self.accident == AccidentLabel::Accident.to_label_str()
  }

  /// 雾 +1，事故 +2，车辆超过 20 辆 +1
  pub fn risk_score(&self) -> u8 {
    let mut score = 0;
    if self.is_foggy() {
      score += 1;
    }
    if self.is_accident() {
      score += 2;
    }
    if self.vehicle_count > 20 {
      score += 1;
    }
    score
  }
}

pub fn traffic_color(vehicle_count: u32) -> &'static str {
  match vehicle_count {
    0..10 => "green",
    10..25 => "orange",
    _ => "red",
  }
}

pub fn risk_color(score: u8) -> &'static str {
  match score {
    0 => "green",
    1 => "orange",
    2 => "red",
    _ => "darkred",
  }
}

pub fn read_records<R: Read>(reader: R) -> Result<Vec<RiskRecord>, RiskMapError> {
  let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
  let records = reader
    .deserialize()
    .collect::<Result<Vec<RiskRecord>, _>>()?;
  debug!("读取 {} 条风险记录", records.len());
  Ok(records)
}

pub fn load_records(path: impl AsRef<Path>) -> Result<Vec<RiskRecord>, RiskMapError> {
  let path = path.as_ref();
  info!("读取风险数据: {}", path.display());
  let file = std::fs::File::open(path)
    .map_err(|e| RiskMapError::IoError(path.display().to_string(), e))?;
  read_records(file)
}

/// 全部记录的平均位置
pub fn center(records: &[RiskRecord]) -> Result<LatLon, RiskMapError> {
  if records.is_empty() {
    return Err(RiskMapError::Empty);
  }
  let n = records.len() as f64;
  let lat = records.iter().map(|r| r.latitude).sum::<f64>() / n;
  let lon = records.iter().map(|r| r.longitude).sum::<f64>() / n;
  Ok(LatLon::new(lat, lon))
}

/// 由事件记录生成的四个图层
pub struct RiskMap {
  records: Vec<RiskRecord>,
  center: LatLon,
}

impl RiskMap {
  pub fn new(records: Vec<RiskRecord>) -> Result<Self, RiskMapError> {
    let center = center(&records)?;
    Ok(Self { records, center })
  }

  pub fn from_csv(path: impl AsRef<Path>) -> Result<Self, RiskMapError> {
    Self::new(load_records(path)?)
  }

  pub fn center(&self) -> LatLon {
    self.center
  }

  pub fn records(&self) -> &[RiskRecord] {
    &self.records
  }

  pub fn fog_layer(&self) -> MapLayer {
    let mut layer = MapLayer::new("fog", self.center, RISK_MAP_ZOOM);
    for record in self.records.iter().filter(|r| r.is_foggy()) {
      layer.push(Feature::point(
        record.position(),
        Style::circle("blue", 10, 0.3),
      ));
    }
    layer
  }

  pub fn accident_layer(&self) -> MapLayer {
    let mut layer = MapLayer::new("accident", self.center, RISK_MAP_ZOOM);
    for record in self.records.iter().filter(|r| r.is_accident()) {
      layer.push(Feature::point(
        record.position(),
        Style::pin("red", "warning-sign").with_popup("Accident Reported"),
      ));
    }
    layer
  }

  pub fn traffic_layer(&self) -> MapLayer {
    let mut layer = MapLayer::new("traffic", self.center, RISK_MAP_ZOOM);
    for record in &self.records {
      layer.push(Feature::point(
        record.position(),
        Style::circle(traffic_color(record.vehicle_count), 8, 0.6)
          .with_popup(format!("Vehicles: {}", record.vehicle_count)),
      ));
    }
    layer
  }

  pub fn combined_layer(&self) -> MapLayer {
    let mut layer = MapLayer::new("combined", self.center, RISK_MAP_ZOOM);
    for record in &self.records {
      let score = record.risk_score();
      layer.push(Feature::point(
        record.position(),
        Style::circle(risk_color(score), 9, 0.7).with_popup(format!("Risk Score: {}", score)),
      ));
    }
    layer
  }

  pub fn layers(&self) -> [MapLayer; 4] {
    [
      self.fog_layer(),
      self.accident_layer(),
      self.traffic_layer(),
      self.combined_layer(),
    ]
  }
}
