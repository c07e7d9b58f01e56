// 该文件是 Lukuang （路况） 项目的一部分。
// src/task.rs - 推理任务
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
  sync::mpsc::{self, Receiver},
  thread,
  time::{Duration, Instant},
};

use tracing::{info, warn};

use crate::{model::Model, output::Render};

pub trait Task<I, M, O>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, model: &M, output: &O) -> Result<Self::Output, Self::Error>;
}

/// 只处理输入中的第一张图像
pub struct OneShotTask;

impl<F, D, ME, RE, I, M, O> Task<I, M, O> for OneShotTask
where
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
{
  type Output = D;
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: &M, output: &O) -> Result<Self::Output, Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入图像"))?;
    info!("输入图像获取成功，开始推理...");
    let now = Instant::now();
    let result = model.infer(&frame)?;
    info!("推理完成，耗时: {:.2?}", now.elapsed());
    output.render_result(&frame, &result)?;
    info!("渲染完成，耗时: {:.2?}", now.elapsed());

    Ok(result)
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
  pub processed: usize,
  pub interrupted: bool,
}

/// 依次处理输入中的全部图像，可限定数量，收到 Ctrl-C 后在下一张图像前停止
#[derive(Debug)]
pub struct BatchTask {
  frame_number: Option<usize>,
  handle_interrupt: bool,
}

impl Default for BatchTask {
  fn default() -> Self {
    Self {
      frame_number: None,
      handle_interrupt: true,
    }
  }
}

impl BatchTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  /// 关闭 Ctrl-C 处理，用于进程内已有信号处理器的场景
  pub fn without_interrupt(mut self) -> Self {
    self.handle_interrupt = false;
    self
  }

  fn install_interrupt(&self) -> anyhow::Result<Option<Receiver<()>>> {
    if !self.handle_interrupt {
      return Ok(None);
    }

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      let _ = tx.send(());
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })
    .map_err(|e| anyhow::anyhow!("无法设置 Ctrl-C 处理器: {}", e))?;
    Ok(Some(rx))
  }
}

impl<F, D, ME, RE, I, M, O> Task<I, M, O> for BatchTask
where
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
{
  type Output = BatchSummary;
  type Error = anyhow::Error;

  fn run_task(self, input: I, model: &M, output: &O) -> Result<Self::Output, Self::Error> {
    info!("开始批量任务...");
    let interrupt = self.install_interrupt()?;
    let mut summary = BatchSummary::default();
    let started = Instant::now();

    for frame in input {
      if interrupt.as_ref().is_some_and(|rx| rx.try_recv().is_ok()) {
        warn!("中断信号接收，退出任务循环");
        summary.interrupted = true;
        break;
      }

      summary.processed += 1;
      info!("处理第 {} 张图像", summary.processed);
      let now = Instant::now();
      let result = model.infer(&frame)?;
      let elapsed_a = now.elapsed();
      output.render_result(&frame, &result)?;
      info!("推理完成，耗时: {:.2?} / {:.2?}", elapsed_a, now.elapsed());

      if self.frame_number.is_some_and(|n| summary.processed >= n) {
        info!("达到指定数量 {}, 退出任务循环", summary.processed);
        break;
      }
    }

    info!(
      "任务完成，共处理 {} 张图像，总耗时: {:.2?}",
      summary.processed,
      started.elapsed()
    );
    Ok(summary)
  }
}
