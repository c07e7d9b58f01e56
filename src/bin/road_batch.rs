// 该文件是 Lukuang （路况） 项目的一部分。
// src/bin/road_batch.rs - 批量道路图像分析
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
  task::{BatchTask, Task},
};
use tracing::info;

/// 逐张分析目录中的道路图像，Ctrl-C 可中断
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[command(flatten)]
  pub models: ModelArgs,
  /// 输入来源，例如 folder:///data/frames
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出，可重复指定，例如 folder:///out/records 与 json:///out/batch.jsonl
  #[arg(long, value_name = "OUTPUT")]
  pub output: Vec<Url>,
  /// 最多处理的图像数量
  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<usize>,
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

  let summary = BatchTask::default()
    .with_frame_number(args.frame_number)
    .run_task(input.into_images(), &pipeline, &output)?;

  println!(
    "Processed {} image(s){}",
    summary.processed,
    if summary.interrupted { " (interrupted)" } else { "" }
  );
  Ok(())
}
