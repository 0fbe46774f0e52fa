// 该文件是 Shanan （山南西风） 项目的一部分。
// src/sampler/layout.rs - 切平面视图布局规划
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

//! 视图布局：赤道环 + （必要时的）中纬度环 + 两极视图。
//!
//! 中纬度环的纬度只由视场角决定，重叠率只影响每个环上的视图数量，
//! 因此增大重叠率不会减小相邻视图间实测的最小重叠。

use std::f64::consts::{FRAC_PI_2, PI, TAU};

use tracing::debug;

use super::SamplerConfig;
use crate::{
  camera::TangentView,
  geometry::{angular_distance, wrap_yaw},
};

/// 规划时把视锥内切圆锥半径缩小到该比例，留出数值余量
const CONE_PLANNING_FACTOR: f64 = 0.97;
/// 环与环、环与极点视图之间的额外重叠上限
const MAX_BAND_MARGIN: f64 = 1.0 * PI / 180.0;
const MIN_RING_VIEWS: usize = 3;

/// 同一纬度上等间隔分布的一圈视图
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ring {
  pub pitch: f64,
  pub count: usize,
  pub first_id: u32,
}

#[derive(Debug, Clone)]
pub struct ViewLayout {
  pub views: Vec<TangentView>,
  pub rings: Vec<Ring>,
}

impl ViewLayout {
  /// 同一环上相邻视图之间的最小重叠比例（1 − 光轴夹角 / 水平视场角）
  pub fn min_adjacent_overlap(&self) -> f64 {
    self
      .rings
      .iter()
      .filter(|ring| ring.count > 1)
      .flat_map(|ring| {
        let first = ring.first_id as usize;
        (0..ring.count).map(move |k| (first + k, first + (k + 1) % ring.count))
      })
      .map(|(a, b)| {
        let (va, vb) = (&self.views[a], &self.views[b]);
        1.0 - angular_distance(&va.axis(), &vb.axis()) / va.hfov()
      })
      .fold(f64::INFINITY, f64::min)
  }
}

/// 严格大于 `x` 的最小整数；`x` 恰为整数时的浮点误差按整数处理
fn above(x: f64) -> usize {
  (x + 1e-9).floor().max(0.0) as usize + 1
}

/// 满足相邻光轴夹角 ≤ `step` 的最少视图数
fn count_for_spacing(pitch: f64, step: f64) -> usize {
  let ratio = (step * 0.5).sin() / pitch.cos().max(f64::EPSILON);
  if ratio >= 1.0 {
    MIN_RING_VIEWS
  } else {
    above(PI / ratio.asin())
  }
}

/// 用半径为 `radius` 的圆锥覆盖纬度带 [lo, hi] 所需的最少视图数
fn count_for_band(pitch: f64, lo: f64, hi: f64, radius: f64) -> usize {
  let mut needed = 1usize;
  for edge in [lo, hi] {
    let cos_edge = edge.cos();
    if cos_edge < 1e-9 {
      // 带边缘就是极点，只要极点在圆锥内即可，与视图数量无关
      continue;
    }
    let c = (radius.cos() - pitch.sin() * edge.sin()) / (pitch.cos() * cos_edge);
    if c <= -1.0 {
      continue;
    }
    let half_spacing = c.min(1.0 - 1e-12).acos();
    needed = needed.max((PI / half_spacing).ceil() as usize);
  }
  needed
}

fn push_ring(
  views: &mut Vec<TangentView>,
  rings: &mut Vec<Ring>,
  config: &SamplerConfig,
  pitch: f64,
  count: usize,
) {
  let first_id = views.len() as u32;
  let spacing = TAU / count as f64;
  for k in 0..count {
    let yaw = wrap_yaw((k as f64 + 0.5) * spacing);
    views.push(TangentView::new(
      views.len() as u32,
      yaw,
      pitch,
      0.0,
      config.hfov(),
      config.width,
      config.height,
    ));
  }
  rings.push(Ring {
    pitch,
    count,
    first_id,
  });
}

/// 为合法的配置生成覆盖整个球面的视图布局
pub fn plan_views(config: &SamplerConfig) -> ViewLayout {
  let hfov = config.hfov();
  let vfov = config.vfov();
  let step = hfov * (1.0 - config.overlap);
  let cone = 0.5 * hfov.min(vfov);
  let plan_cone = cone * CONE_PLANNING_FACTOR;
  let margin = MAX_BAND_MARGIN.min(0.05 * cone);

  // 赤道环：接缝处的 yaw 偏移不超过半个间隔
  let equator_count = above(TAU / step).max(MIN_RING_VIEWS);
  // 按零重叠时的数量估计赤道带宽度，使中纬度环的位置与重叠率无关
  let base_count = above(TAU / hfov).max(MIN_RING_VIEWS);
  let equator_band = ((vfov * 0.5).tan() * (PI / base_count as f64).cos()).atan() - margin;

  let target = if config.pole_views {
    (FRAC_PI_2 - cone + margin).min(FRAC_PI_2)
  } else {
    FRAC_PI_2
  };

  let mut band_pitches = Vec::new();
  if equator_band < target {
    let gap = target - equator_band;
    let bands = (gap / plan_cone).ceil().max(1.0) as usize;
    let width = gap / bands as f64;
    for i in 0..bands {
      let lo = equator_band + i as f64 * width;
      band_pitches.push((lo + 0.5 * width, lo, lo + width));
    }
  }

  let mut views = Vec::new();
  let mut rings = Vec::new();
  push_ring(&mut views, &mut rings, config, 0.0, equator_count);

  // 自北向南：北半球从高纬到低纬，南半球从低纬到高纬
  let ring_counts: Vec<(f64, usize)> = band_pitches
    .iter()
    .map(|&(pitch, lo, hi)| {
      let count = count_for_band(pitch, lo, hi, plan_cone)
        .max(count_for_spacing(pitch, step))
        .max(MIN_RING_VIEWS);
      (pitch, count)
    })
    .collect();
  for &(pitch, count) in ring_counts.iter().rev() {
    push_ring(&mut views, &mut rings, config, pitch, count);
  }
  for &(pitch, count) in ring_counts.iter() {
    push_ring(&mut views, &mut rings, config, -pitch, count);
  }

  if config.pole_views {
    for pitch in [FRAC_PI_2, -FRAC_PI_2] {
      views.push(TangentView::new(
        views.len() as u32,
        0.0,
        pitch,
        0.0,
        hfov,
        config.width,
        config.height,
      ));
    }
  }

  debug!(
    "视图布局: 赤道 {} 个, 中纬度环 {} 个, 极点视图 {}, 共 {} 个视图",
    equator_count,
    ring_counts.len() * 2,
    config.pole_views,
    views.len()
  );

  ViewLayout { views, rings }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn config(fov_deg: f64, overlap: f64, pole_views: bool) -> SamplerConfig {
    SamplerConfig {
      fov_deg,
      overlap,
      width: 64,
      height: 64,
      pole_views,
    }
  }

  #[test]
  fn wide_views_need_only_equator_and_poles() {
    let layout = plan_views(&config(120.0, 0.2, true));
    assert_eq!(layout.rings.len(), 1);
    assert_eq!(layout.rings[0].count, 4);
    assert_eq!(layout.views.len(), 6);
    let yaws: Vec<f64> = layout.views[..4].iter().map(|v| v.yaw().to_degrees()).collect();
    assert!((yaws[0] - 45.0).abs() < 1e-9);
    assert!((yaws[3] + 45.0).abs() < 1e-9);
  }

  #[test]
  fn default_layout_adds_symmetric_rings() {
    let layout = plan_views(&config(90.0, 0.2, true));
    assert_eq!(layout.rings.len(), 3);
    assert!(layout.rings[0].count >= 5);
    assert!(layout.rings[1].pitch > 0.0);
    assert!((layout.rings[1].pitch + layout.rings[2].pitch).abs() < 1e-12);
    assert_eq!(layout.rings[1].count, layout.rings[2].count);
    // 最后两个是极点视图
    let n = layout.views.len();
    assert!((layout.views[n - 2].pitch() - FRAC_PI_2).abs() < 1e-12);
    assert!((layout.views[n - 1].pitch() + FRAC_PI_2).abs() < 1e-12);
  }

  #[test]
  fn ids_are_dense_and_ordered() {
    let layout = plan_views(&config(60.0, 0.3, false));
    for (i, view) in layout.views.iter().enumerate() {
      assert_eq!(view.id() as usize, i);
    }
  }

  #[test]
  fn overlap_meets_request() {
    for overlap in [0.0, 0.1, 0.25, 0.5] {
      let layout = plan_views(&config(90.0, overlap, true));
      assert!(layout.min_adjacent_overlap() >= overlap - 1e-9);
    }
  }

  #[test]
  fn yaw_zero_is_a_seam_of_the_equator_ring() {
    let layout = plan_views(&config(90.0, 0.2, true));
    let ring = layout.rings[0];
    let first = &layout.views[0];
    let last = &layout.views[ring.count - 1];
    assert!((first.yaw() + last.yaw()).abs() < 1e-9);
  }
}
