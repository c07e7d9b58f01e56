// 该文件是 Lukuang （路况） 项目的一部分。
// src/bin/road_analyze.rs - 单张道路图像分析
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use anyhow::Result;
use clap::Parser;
use url::Url;

use lukuang::{
  FromUrl,
  args::{ModelArgs, load_pipeline},
  input::InputWrapper,
  output::MultiOutput,
  task::{OneShotTask, Task},
};
use tracing::info;

/// 道路风险分析：雾天、事故与车辆计数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[command(flatten)]
  pub models: ModelArgs,
  /// 输入图像，例如 image:///data/road.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出，可重复指定，例如 image:///out/road.png 与 json:///out/road.json
  #[arg(long, value_name = "OUTPUT")]
  pub output: Vec<Url>,
}

fn main() -> Result<()> {
  lukuang::init_tracing();

  let args = Args::parse();
  let config = args.models.load_config()?;

  info!("输入来源: {}", args.input);
  for output in &args.output {
    info!("输出路径: {}", output);
  }

  let input = InputWrapper::from_url(&args.input)?;
  let pipeline = load_pipeline(&config)?;
  let output = MultiOutput::from_urls(&args.output)?;

  let result = OneShotTask.run_task(input.into_images(), &pipeline, &output)?;

  println!("Weather: {}", result.fog.label);
  println!("Accident Risk: {}", result.accident.label);
  if result.detection.counts.is_empty() {
    println!("No vehicles detected");
  } else {
    for (name, count) in &result.detection.counts {
      println!("{} : {}", name, count);
    }
  }

  Ok(())
}
