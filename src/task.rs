// 该文件是 Shanan （山南西风） 项目的一部分。
// src/task.rs - 全景检测任务
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
  sync::mpsc,
  thread,
  time::{Duration, Instant},
};

use tracing::{info, warn};

use crate::{
  input::PanoramaFrame,
  model::Detector,
  output::Render,
  pipeline::{PanoramaResult, Pipeline},
};

pub trait Task<I, D, O>: Sized {
  type Error;
  fn run_task(self, input: I, pipeline: &Pipeline<D>, output: O) -> Result<(), Self::Error>;
}

fn process<D, O>(pipeline: &Pipeline<D>, frame: &PanoramaFrame, output: &O) -> anyhow::Result<PanoramaResult>
where
  D: Detector + Sync,
  O: Render<PanoramaFrame, PanoramaResult>,
  O::Error: std::error::Error + Sync + Send + 'static,
{
  let now = Instant::now();
  let result = pipeline.run(&frame.image)?;
  let elapsed_a = now.elapsed();
  output.render_result(frame, &result)?;
  let elapsed_b = now.elapsed();
  info!(
    "全景图 {}: {} 个检测, 检测耗时 {:.2?} / 含输出 {:.2?}",
    frame.name,
    result.detections().len(),
    elapsed_a,
    elapsed_b
  );
  if !result.report.is_complete() {
    warn!(
      "全景图 {} 有 {} 个视图检测失败",
      frame.name,
      result.report.failures.len()
    );
  }
  Ok(result)
}

/// 只处理输入中的第一张全景图
pub struct OneShotTask;

impl<D, RE, I, O> Task<I, D, O> for OneShotTask
where
  D: Detector + Sync,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = PanoramaFrame>,
  O: Render<PanoramaFrame, PanoramaResult, Error = RE>,
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, pipeline: &Pipeline<D>, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入全景图"))?;
    process(pipeline, &frame, &output)?;
    info!("任务完成");
    Ok(())
  }
}

/// 依次处理输入中的全部全景图；收到中断信号后在当前全景图处理完毕时退出
#[derive(Default, Debug)]
pub struct BatchTask {
  limit: Option<usize>,
}

impl BatchTask {
  pub fn with_limit(mut self, limit: Option<usize>) -> Self {
    self.limit = limit;
    self
  }
}

impl<D, RE, I, O> Task<I, D, O> for BatchTask
where
  D: Detector + Sync,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = PanoramaFrame>,
  O: Render<PanoramaFrame, PanoramaResult, Error = RE>,
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, pipeline: &Pipeline<D>, output: O) -> Result<(), Self::Error> {
    info!("开始批量任务...");
    let (tx, rx) = mpsc::channel();

    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      let _ = tx.send(());
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })?;

    run_loop(input, pipeline, &output, self.limit, &rx)?;
    Ok(())
  }
}

/// 批量任务主循环；在每张全景图处理完毕后检查数量上限和中断信号
fn run_loop<D, I, O>(
  input: I,
  pipeline: &Pipeline<D>,
  output: &O,
  limit: Option<usize>,
  stop: &mpsc::Receiver<()>,
) -> anyhow::Result<usize>
where
  D: Detector + Sync,
  I: Iterator<Item = PanoramaFrame>,
  O: Render<PanoramaFrame, PanoramaResult>,
  O::Error: std::error::Error + Sync + Send + 'static,
{
  let mut processed = 0usize;
  let mut detections = 0usize;
  for frame in input {
    processed += 1;
    info!("处理第 {} 张全景图: {}", processed, frame.name);
    detections += process(pipeline, &frame, output)?.detections().len();
    if limit.is_some_and(|n| processed >= n) {
      info!("达到指定数量 {}, 退出任务循环", processed);
      break;
    }
    if stop.try_recv().is_ok() {
      warn!("中断信号接收，退出任务循环");
      break;
    }
  }

  if processed == 0 {
    return Err(anyhow::anyhow!("没有输入全景图"));
  }
  info!("任务完成: {} 张全景图, 共 {} 个检测", processed, detections);
  Ok(processed)
}
