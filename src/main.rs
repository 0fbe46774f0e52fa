// 该文件是 Shanan （山南西风） 项目的一部分。
// src/main.rs - 全景检测主程序
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

mod args;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use shanan_pano::{
  FromUrl,
  input::InputWrapper,
  model::BlobDetector,
  output::OutputWrapper,
  pipeline::Pipeline,
  task::{BatchTask, Task},
};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  info!("输入来源: {}", args.input);
  for output in &args.output {
    info!("输出路径: {}", output);
  }
  info!("检测器: {}", args.detector);

  let mut detector = args
    .classes
    .iter()
    .cloned()
    .fold(BlobDetector::from_url(&args.detector)?, BlobDetector::with_class);
  if let Some(tolerance) = args.tolerance {
    detector = detector.with_tolerance(tolerance);
  }
  if let Some(confidence) = args.blob_confidence {
    detector = detector.with_confidence(confidence);
  }
  if detector.classes().is_empty() {
    warn!("检测器没有配置任何类别, 不会产生检测");
  }

  let outputs = args
    .output
    .iter()
    .map(OutputWrapper::from_url)
    .collect::<Result<Vec<_>, _>>()?;
  if outputs.is_empty() {
    warn!("没有指定输出, 结果只会写入日志");
  }

  let mut config = args.pipeline_config()?;
  if config.adapter.labels.is_empty() {
    config.adapter.labels = detector.labels();
  }
  if outputs.iter().any(OutputWrapper::needs_view_frames) {
    config.keep_view_frames = true;
  }

  let pipeline = Pipeline::new(config, detector)?;
  let input = InputWrapper::from_url(&args.input)?;

  BatchTask::default()
    .with_limit(args.limit)
    .run_task(input, &pipeline, outputs)?;

  Ok(())
}
