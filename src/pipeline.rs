// 该文件是 Shanan （山南西风） 项目的一部分。
// src/pipeline.rs - 全景检测流水线
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
  num::NonZeroUsize,
  path::Path,
  thread,
  time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use image::RgbImage;
use rayon::{ThreadPool, ThreadPoolBuilder, prelude::*};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  adapter::{AdapterConfig, AdapterError, DetectorAdapter, ViewDetection},
  camera::TangentView,
  frame::{EquirectImage, Transfer, to_display_rgb8},
  fusion::{FusionConfig, FusionError, fuse_with_views},
  mapper::{MapperConfig, MapperError, SphericalDetection, map_view_detections},
  model::Detector,
  perspective::{
    CameraParams, HorizonLine, VanishingPoint, horizon_line, recover_params,
    vertical_vanishing_point,
  },
  sampler::{SamplerConfig, SamplerError, TangentSampler},
};

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("流水线配置无效: {0}")]
  InvalidConfiguration(String),
  #[error(transparent)]
  Sampler(#[from] SamplerError),
  #[error(transparent)]
  Adapter(#[from] AdapterError),
  #[error(transparent)]
  Mapper(#[from] MapperError),
  #[error(transparent)]
  Fusion(#[from] FusionError),
  #[error("线程池创建失败: {0}")]
  ThreadPool(#[from] rayon::ThreadPoolBuildError),
  #[error("配置文件读取失败: {0}")]
  Io(#[from] std::io::Error),
  #[error("配置文件解析失败: {0}")]
  Json(#[from] serde_json::Error),
}

impl PipelineError {
  /// 是否属于配置错误（在任何计算开始前即失败）
  pub fn is_invalid_configuration(&self) -> bool {
    matches!(
      self,
      PipelineError::InvalidConfiguration(_)
        | PipelineError::Sampler(SamplerError::InvalidConfiguration(_))
        | PipelineError::Adapter(AdapterError::InvalidConfiguration(_))
        | PipelineError::Mapper(MapperError::InvalidConfiguration(_))
        | PipelineError::Fusion(FusionError::InvalidConfiguration(_))
    )
  }
}

/// 流水线的全部可调参数，可从 JSON 文件加载
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
  pub sampler: SamplerConfig,
  pub adapter: AdapterConfig,
  pub mapper: MapperConfig,
  pub fusion: FusionConfig,
  /// 工作线程数；未指定时使用可用的并行度
  #[serde(skip_serializing_if = "Option::is_none")]
  pub workers: Option<usize>,
  /// 是否在结果中保留每个视图的渲染图像
  pub keep_view_frames: bool,
}

impl PipelineConfig {
  pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
    let path = path.as_ref();
    debug!("读取流水线配置: {}", path.display());
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
  }

  pub fn validate(&self) -> Result<(), PipelineError> {
    self.sampler.validate()?;
    self.adapter.validate()?;
    self.mapper.validate()?;
    self.fusion.validate()?;
    if self.workers == Some(0) {
      return Err(PipelineError::InvalidConfiguration(
        "工作线程数必须为正数".to_string(),
      ));
    }
    Ok(())
  }

  fn worker_count(&self) -> usize {
    self.workers.unwrap_or_else(|| {
      thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
    })
  }
}

/// 单个视图的处理概况
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewReport {
  pub view: TangentView,
  pub detections: usize,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub horizon: Option<HorizonLine>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub vertical_vanishing_point: Option<VanishingPoint>,
  /// 由地平线或竖直消失点恢复的相机参数
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub params: Option<CameraParams>,
  pub elapsed_ms: f64,
}

/// 检测失败的视图；该视图不贡献任何检测
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewFailure {
  pub view_id: u32,
  pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceInfo {
  pub width: u32,
  pub height: u32,
  pub transfer: Transfer,
}

/// 一次全景检测的完整报告，可序列化保存
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanoramaReport {
  pub created_at: DateTime<Utc>,
  pub source: SourceInfo,
  pub config: PipelineConfig,
  pub views: Vec<ViewReport>,
  pub failures: Vec<ViewFailure>,
  pub detections: Vec<SphericalDetection>,
  pub elapsed_ms: f64,
}

impl PanoramaReport {
  pub fn is_complete(&self) -> bool {
    self.failures.is_empty()
  }
}

/// 渲染后的视图及其视图内检测
#[derive(Debug, Clone)]
pub struct ViewFrame {
  pub view: TangentView,
  pub image: RgbImage,
  pub detections: Vec<ViewDetection>,
}

#[derive(Debug, Clone)]
pub struct PanoramaResult {
  pub report: PanoramaReport,
  /// 仅在 `keep_view_frames` 打开时非空
  pub frames: Vec<ViewFrame>,
}

impl PanoramaResult {
  pub fn detections(&self) -> &[SphericalDetection] {
    &self.report.detections
  }
}

struct ViewOutcome {
  view: TangentView,
  /// 仅在需要保留视图帧时存在
  image: Option<RgbImage>,
  elapsed: Duration,
  result: Result<(Vec<ViewDetection>, Vec<SphericalDetection>), AdapterError>,
}

fn millis(elapsed: Duration) -> f64 {
  elapsed.as_secs_f64() * 1000.0
}

/// 全景检测流水线：采样 → 逐视图检测 → 映射 → 融合
pub struct Pipeline<D> {
  config: PipelineConfig,
  sampler: TangentSampler,
  adapter: DetectorAdapter,
  pool: ThreadPool,
  detector: D,
}

impl<D: Detector + Sync> Pipeline<D> {
  /// 校验配置并准备视图布局和线程池；配置错误在这里返回，不会进入任何计算
  pub fn new(config: PipelineConfig, detector: D) -> Result<Self, PipelineError> {
    config.validate()?;
    let sampler = TangentSampler::new(config.sampler.clone())?;
    let adapter = DetectorAdapter::new(config.adapter.clone())?;
    let workers = config.worker_count();
    let pool = ThreadPoolBuilder::new()
      .num_threads(workers)
      .thread_name(|i| format!("pano-view-{}", i))
      .build()?;
    info!("流水线就绪: {} 个视图, {} 个工作线程", sampler.views().len(), workers);

    Ok(Self {
      config,
      sampler,
      adapter,
      pool,
      detector,
    })
  }

  pub fn config(&self) -> &PipelineConfig {
    &self.config
  }

  pub fn views(&self) -> &[TangentView] {
    self.sampler.views()
  }

  /// 重采样、检测、映射作为一个整体在单个任务中完成
  fn process_view(&self, view: &TangentView, pano: &EquirectImage) -> ViewOutcome {
    let now = Instant::now();
    let pixels = self.sampler.render(view, pano);
    let image = to_display_rgb8(&pixels, pano.transfer(), pano.exposure());
    let result = self
      .adapter
      .detect(&self.detector, view, &image)
      .map(|detections| {
        let mapped = map_view_detections(view, &detections, &self.config.mapper);
        (detections, mapped)
      });
    ViewOutcome {
      view: view.clone(),
      image: self.config.keep_view_frames.then_some(image),
      elapsed: now.elapsed(),
      result,
    }
  }

  pub fn run(&self, pano: &EquirectImage) -> Result<PanoramaResult, PipelineError> {
    let now = Instant::now();
    info!(
      "开始处理全景图 {}x{}, {} 个视图",
      pano.width(),
      pano.height(),
      self.views().len()
    );

    let outcomes: Vec<ViewOutcome> = self.pool.install(|| {
      self
        .views()
        .par_iter()
        .map(|view| self.process_view(view, pano))
        .collect()
    });

    let mut views = Vec::with_capacity(outcomes.len());
    let mut failures = Vec::new();
    let mut frames = Vec::new();
    let mut spherical = Vec::new();
    for outcome in outcomes {
      let detections = match outcome.result {
        Ok((detections, mapped)) => {
          debug!(
            "视图 {}: {} 个检测, 耗时 {:.2?}",
            outcome.view.id(),
            detections.len(),
            outcome.elapsed
          );
          spherical.extend(mapped);
          detections
        }
        Err(err) => {
          warn!("视图 {} 检测失败, 跳过: {}", outcome.view.id(), err);
          failures.push(ViewFailure {
            view_id: outcome.view.id(),
            message: err.to_string(),
          });
          Vec::new()
        }
      };

      views.push(ViewReport {
        horizon: horizon_line(&outcome.view),
        vertical_vanishing_point: vertical_vanishing_point(&outcome.view),
        params: recover_params(&outcome.view),
        detections: detections.len(),
        elapsed_ms: millis(outcome.elapsed),
        view: outcome.view.clone(),
      });
      if let Some(image) = outcome.image {
        frames.push(ViewFrame {
          view: outcome.view,
          image,
          detections,
        });
      }
    }

    let mapped = spherical.len();
    let detections = fuse_with_views(spherical, self.views(), &self.config.fusion)?;
    let elapsed = now.elapsed();
    info!(
      "全景检测完成: {} 个视图检测融合为 {} 个, 失败视图 {} 个, 耗时 {:.2?}",
      mapped,
      detections.len(),
      failures.len(),
      elapsed
    );

    Ok(PanoramaResult {
      report: PanoramaReport {
        created_at: Utc::now(),
        source: SourceInfo {
          width: pano.width(),
          height: pano.height(),
          transfer: pano.transfer(),
        },
        config: self.config.clone(),
        views,
        failures,
        detections,
        elapsed_ms: millis(elapsed),
      },
      frames,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::BlobDetector;

  #[test]
  fn config_round_trips_through_json() {
    let mut config = PipelineConfig::default();
    config.sampler.fov_deg = 100.0;
    config.adapter.labels = vec!["ball".into()];
    config.workers = Some(3);
    let text = serde_json::to_string_pretty(&config).unwrap();
    let back: PipelineConfig = serde_json::from_str(&text).unwrap();
    assert_eq!(back, config);
  }

  #[test]
  fn partial_json_uses_defaults() {
    let config: PipelineConfig =
      serde_json::from_str(r#"{ "sampler": { "fov_deg": 75.0 }, "fusion": { "metric": "ios" } }"#)
        .unwrap();
    assert_eq!(config.sampler.fov_deg, 75.0);
    assert_eq!(config.sampler.overlap, SamplerConfig::default().overlap);
    assert_eq!(config.fusion.metric, crate::fusion::MatchMetric::Ios);
    assert_eq!(config.workers, None);
  }

  #[test]
  fn invalid_configuration_fails_up_front() {
    let mut config = PipelineConfig::default();
    config.workers = Some(0);
    let err = Pipeline::new(config, BlobDetector::default()).err().unwrap();
    assert!(err.is_invalid_configuration());

    let mut config = PipelineConfig::default();
    config.fusion.threshold = 2.0;
    let err = Pipeline::new(config, BlobDetector::default()).err().unwrap();
    assert!(err.is_invalid_configuration());
  }

  #[test]
  fn view_images_are_dropped_unless_requested() {
    let pano = EquirectImage::from_rgb8(&RgbImage::new(64, 32)).unwrap();
    let mut config = PipelineConfig::default();
    config.sampler = config.sampler.with_resolution(16, 16);

    let pipeline = Pipeline::new(config.clone(), BlobDetector::default()).unwrap();
    let outcome = pipeline.process_view(&pipeline.views()[0], &pano);
    assert!(outcome.image.is_none());
    assert!(outcome.result.is_ok());

    config.keep_view_frames = true;
    let pipeline = Pipeline::new(config, BlobDetector::default()).unwrap();
    let outcome = pipeline.process_view(&pipeline.views()[0], &pano);
    assert_eq!(outcome.image.map(|i| i.dimensions()), Some((16, 16)));
  }
}
