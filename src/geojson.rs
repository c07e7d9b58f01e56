// 该文件是 Lukuang （路况） 项目的一部分。
// src/geojson.rs - 地图图层的 GeoJSON 表示
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

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

/// 纬度/经度；GeoJSON 中按 `[lon, lat]` 输出
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
  pub lat: f64,
  pub lon: f64,
}

impl LatLon {
  pub const fn new(lat: f64, lon: f64) -> Self {
    Self { lat, lon }
  }

  pub fn to_position(self) -> [f64; 2] {
    [self.lon, self.lat]
  }

  pub fn midpoint(self, other: LatLon) -> LatLon {
    LatLon::new((self.lat + other.lat) / 2.0, (self.lon + other.lon) / 2.0)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Geometry {
  Point { coordinates: [f64; 2] },
  LineString { coordinates: Vec<[f64; 2]> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerKind {
  /// 圆形标记，半径以像素计
  Circle,
  /// 图钉标记
  Pin,
  Polyline,
}

/// 渲染样式与弹窗文字，由前端按字段绘制
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Style {
  pub marker: MarkerKind,
  pub color: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub radius: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub fill_opacity: Option<f32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub weight: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub opacity: Option<f32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub icon: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub popup: Option<String>,
}

impl Style {
  pub fn circle(color: &str, radius: u32, fill_opacity: f32) -> Self {
    Self {
      marker: MarkerKind::Circle,
      color: color.to_string(),
      radius: Some(radius),
      fill_opacity: Some(fill_opacity),
      weight: None,
      opacity: None,
      icon: None,
      popup: None,
    }
  }

  pub fn pin(color: &str, icon: &str) -> Self {
    Self {
      marker: MarkerKind::Pin,
      color: color.to_string(),
      radius: None,
      fill_opacity: None,
      weight: None,
      opacity: None,
      icon: Some(icon.to_string()),
      popup: None,
    }
  }

  pub fn polyline(color: &str, weight: u32, opacity: f32) -> Self {
    Self {
      marker: MarkerKind::Polyline,
      color: color.to_string(),
      radius: None,
      fill_opacity: None,
      weight: Some(weight),
      opacity: Some(opacity),
      icon: None,
      popup: None,
    }
  }

  pub fn with_popup(mut self, popup: impl Into<String>) -> Self {
    self.popup = Some(popup.into());
    self
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
enum FeatureTag {
  Feature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
enum FeatureCollectionTag {
  FeatureCollection,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Feature {
  #[serde(rename = "type")]
  tag: FeatureTag,
  pub geometry: Geometry,
  pub properties: Style,
}

impl Feature {
  pub fn point(at: LatLon, style: Style) -> Self {
    Self {
      tag: FeatureTag::Feature,
      geometry: Geometry::Point {
        coordinates: at.to_position(),
      },
      properties: style,
    }
  }

  pub fn line<I: IntoIterator<Item = LatLon>>(points: I, style: Style) -> Self {
    Self {
      tag: FeatureTag::Feature,
      geometry: Geometry::LineString {
        coordinates: points.into_iter().map(LatLon::to_position).collect(),
      },
      properties: style,
    }
  }
}

/// 一个地图图层：要素集合加上视图中心与缩放级别
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapLayer {
  #[serde(rename = "type")]
  tag: FeatureCollectionTag,
  pub name: String,
  pub center: [f64; 2],
  pub zoom: u8,
  pub features: Vec<Feature>,
}

impl MapLayer {
  pub fn new(name: impl Into<String>, center: LatLon, zoom: u8) -> Self {
    Self {
      tag: FeatureCollectionTag::FeatureCollection,
      name: name.into(),
      center: center.to_position(),
      zoom,
      features: Vec::new(),
    }
  }

  pub fn push(&mut self, feature: Feature) {
    self.features.push(feature);
  }

  pub fn len(&self) -> usize {
    self.features.len()
  }

  pub fn is_empty(&self) -> bool {
    self.features.is_empty()
  }

  pub fn to_json(&self) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(self)
  }

  pub fn write_to(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, self.to_json()?)?;
    info!(
      "写入图层 {} ({} 个要素): {}",
      self.name,
      self.features.len(),
      path.display()
    );
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn point_feature_uses_lon_lat_order() {
    let feature = Feature::point(
      LatLon::new(28.61, 77.20),
      Style::circle("blue", 10, 0.3).with_popup("fog"),
    );
    let value = serde_json::to_value(&feature).unwrap();
    assert_eq!(
      value,
      json!({
        "type": "Feature",
        "geometry": { "type": "Point", "coordinates": [77.20, 28.61] },
        "properties": {
          "marker": "circle",
          "color": "blue",
          "radius": 10,
          "fill_opacity": 0.3f32,
          "popup": "fog"
        }
      })
    );
  }

  #[test]
  fn layer_is_a_feature_collection() {
    let mut layer = MapLayer::new("route", LatLon::new(28.5, 77.0), 12);
    layer.push(Feature::line(
      [LatLon::new(28.4, 76.9), LatLon::new(28.6, 77.1)],
      Style::polyline("blue", 5, 0.8),
    ));

    let value: serde_json::Value = serde_json::from_str(&layer.to_json().unwrap()).unwrap();
    assert_eq!(value["type"], "FeatureCollection");
    assert_eq!(value["center"], json!([77.0, 28.5]));
    assert_eq!(value["zoom"], 12);
    assert_eq!(value["features"][0]["geometry"]["type"], "LineString");
    assert_eq!(
      value["features"][0]["geometry"]["coordinates"][1],
      json!([77.1, 28.6])
    );
  }

  #[test]
  fn midpoint_is_the_average() {
    let mid = LatLon::new(28.6, 77.2).midpoint(LatLon::new(28.8, 77.0));
    assert!((mid.lat - 28.7).abs() < 1e-9);
    assert!((mid.lon - 77.1).abs() < 1e-9);
  }
}
