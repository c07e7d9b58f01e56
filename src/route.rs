// 该文件是 Lukuang （路况） 项目的一部分。
// src/route.rs - 路线规划
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

use std::{fmt, time::Duration};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
  config::{BoundsConfig, DEFAULT_ROUTE_ENDPOINT, DEFAULT_ROUTE_TIMEOUT_SECS},
  geojson::{Feature, LatLon, MapLayer, Style},
};

pub const ROUTE_MAP_ZOOM: u8 = 12;
pub const ROUTE_UNAVAILABLE: &str = "Unable to fetch route. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutePoint {
  Source,
  Destination,
}

impl fmt::Display for RoutePoint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RoutePoint::Source => write!(f, "Source"),
      RoutePoint::Destination => write!(f, "Destination"),
    }
  }
}

#[derive(Error, Debug)]
pub enum RouteError {
  #[error("{which} 超出允许范围: ({}, {})", .point.lat, .point.lon)]
  OutOfBounds { which: RoutePoint, point: LatLon },
  #[error("路线服务地址无效: {0}")]
  InvalidEndpoint(String),
  #[error("路线服务请求失败: {0}")]
  Transport(String),
  #[error("路线服务返回状态码 {0}")]
  Status(u16),
  #[error("路线服务响应格式错误: {0}")]
  Malformed(String),
  #[error("路线服务返回错误代码: {0}")]
  Service(String),
  #[error("路线服务没有返回路线")]
  NoRoute,
}

impl RouteError {
  /// 面向用户的提示；服务相关的失败统一提示重试
  pub fn user_message(&self) -> String {
    match self {
      RouteError::OutOfBounds { which, .. } => {
        format!("{} location is outside Delhi-NCR bounds.", which)
      }
      _ => ROUTE_UNAVAILABLE.to_string(),
    }
  }
}

/// 闭区间经纬度范围
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
  pub min_lat: f64,
  pub max_lat: f64,
  pub min_lon: f64,
  pub max_lon: f64,
}

impl BoundingBox {
  pub const DELHI_NCR: BoundingBox = BoundingBox {
    min_lat: 28.40,
    max_lat: 28.90,
    min_lon: 76.80,
    max_lon: 77.50,
  };

  pub fn contains(&self, point: LatLon) -> bool {
    (self.min_lat..=self.max_lat).contains(&point.lat)
      && (self.min_lon..=self.max_lon).contains(&point.lon)
  }
}

impl From<BoundsConfig> for BoundingBox {
  fn from(b: BoundsConfig) -> Self {
    Self {
      min_lat: b.min_lat,
      max_lat: b.max_lat,
      min_lon: b.min_lon,
      max_lon: b.max_lon,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Route {
  /// 按行驶顺序排列的 (lat, lon)
  pub polyline: Vec<LatLon>,
  pub distance_km: f64,
  pub duration_min: f64,
}

pub trait RouteFetcher {
  fn fetch(&self, source: LatLon, destination: LatLon) -> Result<Route, RouteError>;
}

#[derive(Deserialize)]
struct OsrmResponse {
  code: String,
  #[serde(default)]
  message: Option<String>,
  #[serde(default)]
  routes: Vec<OsrmRoute>,
}

#[derive(Deserialize)]
struct OsrmRoute {
  distance: f64,
  duration: f64,
  geometry: OsrmGeometry,
}

#[derive(Deserialize)]
struct OsrmGeometry {
  coordinates: Vec<[f64; 2]>,
}

/// 解析 OSRM `route` 服务的响应，只取第一条路线
pub fn parse_osrm_response(status: u16, body: &str) -> Result<Route, RouteError> {
  if status != 200 {
    return Err(RouteError::Status(status));
  }

  let response: OsrmResponse =
    serde_json::from_str(body).map_err(|e| RouteError::Malformed(e.to_string()))?;
  if response.code != "Ok" {
    if let Some(message) = &response.message {
      debug!("OSRM 错误信息: {}", message);
    }
    return Err(RouteError::Service(response.code));
  }

  let route = response.routes.into_iter().next().ok_or(RouteError::NoRoute)?;
  Ok(Route {
    polyline: route
      .geometry
      .coordinates
      .into_iter()
      .map(|[lon, lat]| LatLon::new(lat, lon))
      .collect(),
    distance_km: route.distance / 1000.0,
    duration_min: route.duration / 60.0,
  })
}

/// OSRM HTTP 客户端，单次请求，不重试
pub struct OsrmClient {
  endpoint: Url,
  client: reqwest::blocking::Client,
}

impl OsrmClient {
  pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, RouteError> {
    let endpoint = Url::parse(endpoint)
      .map_err(|e| RouteError::InvalidEndpoint(format!("{}: {}", endpoint, e)))?;
    let client = reqwest::blocking::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| RouteError::Transport(e.to_string()))?;
    Ok(Self { endpoint, client })
  }

  pub fn public() -> Result<Self, RouteError> {
    Self::new(
      DEFAULT_ROUTE_ENDPOINT,
      Duration::from_secs(DEFAULT_ROUTE_TIMEOUT_SECS),
    )
  }

  /// `{endpoint}/route/v1/driving/{lon},{lat};{lon},{lat}?overview=full&geometries=geojson`
  pub fn route_url(&self, source: LatLon, destination: LatLon) -> Result<Url, RouteError> {
    let base = self.endpoint.as_str().trim_end_matches('/');
    let mut url = Url::parse(&format!(
      "{}/route/v1/driving/{},{};{},{}",
      base, source.lon, source.lat, destination.lon, destination.lat
    ))
    .map_err(|e| RouteError::InvalidEndpoint(e.to_string()))?;
    url
      .query_pairs_mut()
      .append_pair("overview", "full")
      .append_pair("geometries", "geojson");
    Ok(url)
  }
}

impl RouteFetcher for OsrmClient {
  fn fetch(&self, source: LatLon, destination: LatLon) -> Result<Route, RouteError> {
    let url = self.route_url(source, destination)?;
    info!("请求路线: {}", url);

    let response = self
      .client
      .get(url)
      .send()
      .map_err(|e| RouteError::Transport(e.to_string()))?;
    let status = response.status().as_u16();
    debug!("路线服务响应状态: {}", status);
    let body = response
      .text()
      .map_err(|e| RouteError::Transport(e.to_string()))?;

    parse_osrm_response(status, &body)
  }
}

pub struct RoutePlanner<F> {
  fetcher: F,
  bounds: BoundingBox,
}

impl<F: RouteFetcher> RoutePlanner<F> {
  pub fn new(fetcher: F) -> Self {
    Self {
      fetcher,
      bounds: BoundingBox::DELHI_NCR,
    }
  }

  pub fn with_bounds(mut self, bounds: BoundingBox) -> Self {
    self.bounds = bounds;
    self
  }

  pub fn bounds(&self) -> BoundingBox {
    self.bounds
  }

  /// 先校验起点再校验终点，两者都在范围内才会请求路线服务
  pub fn plan(&self, source: LatLon, destination: LatLon) -> Result<Route, RouteError> {
    for (which, point) in [
      (RoutePoint::Source, source),
      (RoutePoint::Destination, destination),
    ] {
      if !self.bounds.contains(point) {
        warn!("{:?} 超出范围: ({}, {})", which, point.lat, point.lon);
        return Err(RouteError::OutOfBounds { which, point });
      }
    }

    let route = self.fetcher.fetch(source, destination)?;
    info!(
      "路线规划完成: {:.2} km, {:.1} min, {} 个点",
      route.distance_km,
      route.duration_min,
      route.polyline.len()
    );
    Ok(route)
  }
}

/// 路线图层：中点为中心，绿色起点、红色终点、蓝色路线
pub fn route_layer(source: LatLon, destination: LatLon, route: &Route) -> MapLayer {
  let mut layer = MapLayer::new("route", source.midpoint(destination), ROUTE_MAP_ZOOM);
  layer.push(Feature::point(
    source,
    Style::pin("green", "play").with_popup("Source"),
  ));
  layer.push(Feature::point(
    destination,
    Style::pin("red", "stop").with_popup("Destination"),
  ));
  layer.push(Feature::line(
    route.polyline.iter().copied(),
    Style::polyline("blue", 5, 0.8),
  ));
  layer
}
