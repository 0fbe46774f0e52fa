// 该文件是 Shanan （山南西风） 项目的一部分。
// src/args.rs - 命令行参数
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

use std::path::PathBuf;

use clap::Parser;
use url::Url;

use shanan_pano::{model::BlobClass, pipeline::PipelineConfig};

/// 全景图切平面检测与球面融合
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入来源
  /// - image:///path/pano.jpg
  /// - hdr:///path/pano.hdr?exposure=1.0
  /// - folder:///path/to/panoramas
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 输出（可重复）
  /// - image:///out/ 或 image:///out/pano.png
  /// - json:///out/ 或 json:///out/report.json
  /// - folder:///out/records?record=name&always
  #[arg(long, value_name = "OUTPUT")]
  pub output: Vec<Url>,

  /// JSON 格式的流水线配置；命令行参数会覆盖其中对应的值
  #[arg(long, value_name = "FILE")]
  pub config: Option<PathBuf>,

  /// 视图水平视场角（度）
  #[arg(long, value_name = "DEGREES")]
  pub fov: Option<f64>,

  /// 相邻视图最小重叠比例
  #[arg(long, value_name = "RATIO")]
  pub overlap: Option<f64>,

  /// 视图边长（像素）
  #[arg(long, value_name = "PIXELS")]
  pub view_size: Option<u32>,

  /// 不生成天顶/天底视图
  #[arg(long)]
  pub no_pole_views: bool,

  /// 检测置信度下限
  #[arg(long, value_name = "THRESHOLD")]
  pub min_confidence: Option<f32>,

  /// 融合重叠阈值
  #[arg(long, value_name = "THRESHOLD")]
  pub fusion_threshold: Option<f64>,

  /// 工作线程数
  #[arg(long, value_name = "COUNT")]
  pub workers: Option<usize>,

  /// 检测器，例如 blob:///?class=person:255,0,0&tolerance=40
  #[arg(long, value_name = "DETECTOR", default_value = "blob:///")]
  pub detector: Url,

  /// 颜色检测器的颜色容差，覆盖检测器 URI 中的值
  #[arg(long, value_name = "TOLERANCE")]
  pub tolerance: Option<u8>,

  /// 颜色检测器给出的置信度，覆盖检测器 URI 中的值
  #[arg(long, value_name = "CONFIDENCE")]
  pub blob_confidence: Option<f32>,

  /// 追加检测类别 name=r,g,b（可重复）
  #[arg(long = "class", value_name = "CLASS")]
  pub classes: Vec<BlobClass>,

  /// 最多处理的全景图数量
  #[arg(long, value_name = "COUNT")]
  pub limit: Option<usize>,
}

impl Args {
  /// 配置文件（若有）加上命令行覆盖
  pub fn pipeline_config(&self) -> anyhow::Result<PipelineConfig> {
    let mut config = match &self.config {
      Some(path) => PipelineConfig::from_json_file(path)?,
      None => PipelineConfig::default(),
    };

    if let Some(fov) = self.fov {
      config.sampler.fov_deg = fov;
    }
    if let Some(overlap) = self.overlap {
      config.sampler.overlap = overlap;
    }
    if let Some(size) = self.view_size {
      config.sampler.width = size;
      config.sampler.height = size;
    }
    if self.no_pole_views {
      config.sampler.pole_views = false;
    }
    if let Some(min_confidence) = self.min_confidence {
      config.adapter.min_confidence = min_confidence;
    }
    if let Some(threshold) = self.fusion_threshold {
      config.fusion.threshold = threshold;
    }
    if self.workers.is_some() {
      config.workers = self.workers;
    }
    Ok(config)
  }
}
