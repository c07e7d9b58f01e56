// 该文件是 Lukuang （路况） 项目的一部分。
// src/bin/route_planner.rs - 德里首都区路线规划
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::{path::PathBuf, process::ExitCode, time::Duration};

use anyhow::Result;
use clap::Parser;

use lukuang::{
  config::AppConfig,
  geojson::LatLon,
  route::{BoundingBox, OsrmClient, RoutePlanner, route_layer},
};
use tracing::error;

/// 查询两点之间的最佳驾驶路线并导出 GeoJSON 图层
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// TOML 配置文件
  #[arg(long, value_name = "FILE")]
  pub config: Option<PathBuf>,
  /// 起点纬度
  #[arg(long, default_value_t = 28.6139, allow_negative_numbers = true)]
  pub src_lat: f64,
  /// 起点经度
  #[arg(long, default_value_t = 77.2090, allow_negative_numbers = true)]
  pub src_lon: f64,
  /// 终点纬度
  #[arg(long, default_value_t = 28.7041, allow_negative_numbers = true)]
  pub dst_lat: f64,
  /// 终点经度
  #[arg(long, default_value_t = 77.1025, allow_negative_numbers = true)]
  pub dst_lon: f64,
  /// 路线服务地址，覆盖配置文件中的 route.endpoint
  #[arg(long, value_name = "URL")]
  pub endpoint: Option<String>,
  /// 路线图层输出文件
  #[arg(long, value_name = "FILE", default_value = "route.geojson")]
  pub output: PathBuf,
}

fn main() -> Result<ExitCode> {
  lukuang::init_tracing();

  let args = Args::parse();
  let config = AppConfig::load(args.config.as_deref())?;
  let endpoint = args.endpoint.unwrap_or(config.route.endpoint);

  let client = OsrmClient::new(&endpoint, Duration::from_secs(config.route.timeout_secs))?;
  let planner = RoutePlanner::new(client).with_bounds(BoundingBox::from(config.route.bounds));

  let source = LatLon::new(args.src_lat, args.src_lon);
  let destination = LatLon::new(args.dst_lat, args.dst_lon);

  let route = match planner.plan(source, destination) {
    Ok(route) => route,
    Err(e) => {
      error!("路线规划失败: {}", e);
      eprintln!("{}", e.user_message());
      return Ok(ExitCode::FAILURE);
    }
  };

  route_layer(source, destination, &route).write_to(&args.output)?;

  println!("Route found successfully");
  println!("Distance (km): {:.2}", route.distance_km);
  println!("Estimated Time (min): {:.1}", route.duration_min);
  println!("Map layer: {}", args.output.display());
  Ok(ExitCode::SUCCESS)
}
