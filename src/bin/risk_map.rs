// 该文件是 Lukuang （路况） 项目的一部分。
// src/bin/risk_map.rs - 道路风险地图图层导出
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use lukuang::{config::AppConfig, risk_map::RiskMap};
use tracing::info;

/// 从道路事件 CSV 生成雾天、事故、交通与综合风险四个 GeoJSON 图层
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// TOML 配置文件
  #[arg(long, value_name = "FILE")]
  pub config: Option<PathBuf>,
  /// 道路事件 CSV，覆盖配置文件中的 risk_map.csv
  #[arg(long, value_name = "CSV")]
  pub csv: Option<PathBuf>,
  /// 图层输出目录
  #[arg(long, value_name = "DIR", default_value = "risk_maps")]
  pub output: PathBuf,
}

fn main() -> Result<()> {
  lukuang::init_tracing();

  let args = Args::parse();
  let config = AppConfig::load(args.config.as_deref())?;
  let csv = args.csv.unwrap_or(config.risk_map.csv);

  let map = RiskMap::from_csv(&csv)?;
  let center = map.center();
  info!("地图中心: ({:.4}, {:.4})", center.lat, center.lon);

  for layer in map.layers() {
    let path = args.output.join(format!("{}.geojson", layer.name));
    layer.write_to(&path)?;
    println!("{}: {} feature(s) -> {}", layer.name, layer.len(), path.display());
  }

  Ok(())
}
