// 该文件是 Shanan （山南西风） 项目的一部分。
// src/sampler.rs - 切平面视图采样器
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

use image::Rgb32FImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::{camera::TangentView, frame::EquirectImage};

mod layout;
mod resample;
pub use self::layout::{Ring, ViewLayout, plan_views};
pub use self::resample::{render_view, sample_bilinear};

#[derive(Error, Debug)]
pub enum SamplerError {
  #[error("采样器配置无效: {0}")]
  InvalidConfiguration(String),
}

impl SamplerError {
  fn invalid(msg: impl Into<String>) -> Self {
    SamplerError::InvalidConfiguration(msg.into())
  }
}

/// 切平面视图采样配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
  /// 每个视图的水平视场角（度）
  pub fov_deg: f64,
  /// 相邻视图之间的最小重叠比例 [0, 1)
  pub overlap: f64,
  /// 输出视图宽度（像素）
  pub width: u32,
  /// 输出视图高度（像素）
  pub height: u32,
  /// 是否在天顶和天底各加一个视图
  pub pole_views: bool,
}

impl Default for SamplerConfig {
  fn default() -> Self {
    Self {
      fov_deg: 90.0,
      overlap: 0.2,
      width: 512,
      height: 512,
      pole_views: true,
    }
  }
}

impl SamplerConfig {
  pub fn with_fov(mut self, fov_deg: f64) -> Self {
    self.fov_deg = fov_deg;
    self
  }

  pub fn with_overlap(mut self, overlap: f64) -> Self {
    self.overlap = overlap;
    self
  }

  pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
    self.width = width;
    self.height = height;
    self
  }

  pub fn with_pole_views(mut self, pole_views: bool) -> Self {
    self.pole_views = pole_views;
    self
  }

  /// 水平视场角（弧度）
  pub fn hfov(&self) -> f64 {
    self.fov_deg.to_radians()
  }

  /// 由分辨率推出的垂直视场角（弧度）
  pub fn vfov(&self) -> f64 {
    let half = (self.hfov() * 0.5).tan() * self.height as f64 / self.width as f64;
    2.0 * half.atan()
  }

  pub fn validate(&self) -> Result<(), SamplerError> {
    if !self.fov_deg.is_finite() || self.fov_deg <= 0.0 {
      return Err(SamplerError::invalid(format!(
        "视场角必须为正数, 实际为 {}",
        self.fov_deg
      )));
    }
    if self.fov_deg >= 180.0 {
      return Err(SamplerError::invalid(format!(
        "视场角必须小于 180°（针孔投影无定义）, 实际为 {}",
        self.fov_deg
      )));
    }
    if !self.overlap.is_finite() || !(0.0..1.0).contains(&self.overlap) {
      return Err(SamplerError::invalid(format!(
        "重叠比例必须在 [0, 1) 内, 实际为 {}",
        self.overlap
      )));
    }
    if self.width == 0 || self.height == 0 {
      return Err(SamplerError::invalid(format!(
        "视图分辨率必须为正数, 实际为 {}x{}",
        self.width, self.height
      )));
    }
    Ok(())
  }
}

/// 切平面视图采样器：持有已规划好的视图布局
#[derive(Debug, Clone)]
pub struct TangentSampler {
  config: SamplerConfig,
  layout: ViewLayout,
}

impl TangentSampler {
  pub fn new(config: SamplerConfig) -> Result<Self, SamplerError> {
    config.validate()?;
    let layout = plan_views(&config);
    info!(
      "采样器就绪: 视场角 {}°, 重叠 {:.0}%, {} 个视图, 实测最小相邻重叠 {:.1}%",
      config.fov_deg,
      config.overlap * 100.0,
      layout.views.len(),
      layout.min_adjacent_overlap() * 100.0
    );
    Ok(Self { config, layout })
  }

  pub fn config(&self) -> &SamplerConfig {
    &self.config
  }

  pub fn layout(&self) -> &ViewLayout {
    &self.layout
  }

  pub fn views(&self) -> &[TangentView] {
    &self.layout.views
  }

  pub fn render(&self, view: &TangentView, pano: &EquirectImage) -> Rgb32FImage {
    debug!("重采样视图 {}", view.id());
    render_view(view, pano)
  }

  /// 并行渲染所有视图；在调用方安装的线程池中执行
  pub fn render_all(&self, pano: &EquirectImage) -> Vec<(TangentView, Rgb32FImage)> {
    self
      .layout
      .views
      .par_iter()
      .map(|view| (view.clone(), self.render(view, pano)))
      .collect()
  }
}
