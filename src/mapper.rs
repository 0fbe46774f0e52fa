// 该文件是 Shanan （山南西风） 项目的一部分。
// src/mapper.rs - 视图检测映射到球面
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

use std::f64::consts::FRAC_PI_2;

use nalgebra::Vector3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

use crate::{
  adapter::ViewDetection,
  camera::TangentView,
  geometry::{SphericalRegion, YawArc},
};

#[derive(Error, Debug)]
pub enum MapperError {
  #[error("映射配置无效: {0}")]
  InvalidConfiguration(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
  /// 每条边的采样段数（取偶数，保证包含中点）
  pub edge_subdivisions: u32,
  /// 是否在结果中保留采样得到的轮廓点
  pub keep_outline: bool,
}

impl Default for MapperConfig {
  fn default() -> Self {
    Self {
      edge_subdivisions: 4,
      keep_outline: true,
    }
  }
}

impl MapperConfig {
  pub fn validate(&self) -> Result<(), MapperError> {
    if self.edge_subdivisions < 2 {
      return Err(MapperError::InvalidConfiguration(format!(
        "每条边至少采样 2 段, 实际为 {}",
        self.edge_subdivisions
      )));
    }
    Ok(())
  }
}

/// 球面坐标下的检测
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SphericalDetection {
  pub region: SphericalRegion,
  /// 轮廓点 (yaw, pitch)，弧度；序列化为角度
  #[serde(
    default,
    with = "outline_deg",
    skip_serializing_if = "Vec::is_empty"
  )]
  pub outline: Vec<(f64, f64)>,
  pub confidence: f32,
  pub class_id: u32,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub label: Option<String>,
  /// 贡献了该检测的视图编号，升序且不重复
  pub provenance: Vec<u32>,
}

impl SphericalDetection {
  pub fn area(&self) -> f64 {
    self.region.area()
  }

  /// 编号最小的来源视图
  pub fn first_view(&self) -> u32 {
    self.provenance.first().copied().unwrap_or(u32::MAX)
  }
}

mod outline_deg {
  use serde::{Deserialize, Deserializer, Serializer};

  pub fn serialize<S: Serializer>(points: &[(f64, f64)], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(
      points
        .iter()
        .map(|(yaw, pitch)| [yaw.to_degrees(), pitch.to_degrees()]),
    )
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<(f64, f64)>, D::Error> {
    let raw = Vec::<[f64; 2]>::deserialize(deserializer)?;
    Ok(
      raw
        .into_iter()
        .map(|[yaw, pitch]| (yaw.to_radians(), pitch.to_radians()))
        .collect(),
    )
  }
}

/// 沿检测框边界顺时针采样：四个角点与各边等分点
fn boundary_points(bbox: [f64; 4], subdivisions: u32) -> Vec<(f64, f64)> {
  let n = (subdivisions.max(2) + subdivisions % 2) as usize;
  let [x0, y0, x1, y1] = bbox;
  let corners = [(x0, y0), (x1, y0), (x1, y1), (x0, y1)];
  let mut points = Vec::with_capacity(4 * n);
  for edge in 0..4 {
    let (ax, ay) = corners[edge];
    let (bx, by) = corners[(edge + 1) % 4];
    for k in 0..n {
      let t = k as f64 / n as f64;
      points.push((ax + (bx - ax) * t, ay + (by - ay) * t));
    }
  }
  points
}

fn inside_box(bbox: &[f64; 4], (u, v): (f64, f64)) -> bool {
  (bbox[0]..=bbox[2]).contains(&u) && (bbox[1]..=bbox[3]).contains(&v)
}

/// 把单个视图检测映射为球面检测
///
/// 区域的 yaw 弧段是所有采样点的最短包围弧；若某个极点的方向投影落在检测框内，
/// 区域覆盖整个 yaw 圆周并延伸到该极点。
pub fn map_detection(
  view: &TangentView,
  detection: &ViewDetection,
  config: &MapperConfig,
) -> SphericalDetection {
  let outline: Vec<(f64, f64)> = boundary_points(detection.bbox, config.edge_subdivisions)
    .into_iter()
    .map(|(u, v)| view.pixel_to_spherical(u, v))
    .collect();

  let mut region = SphericalRegion::enclosing(&outline);
  let north = Vector3::y();
  if view
    .project(&north)
    .is_some_and(|p| inside_box(&detection.bbox, p))
  {
    trace!("视图 {}: 检测框包含北极", view.id());
    region = SphericalRegion::new(YawArc::full(), region.pitch_min(), FRAC_PI_2);
  }
  if view
    .project(&-north)
    .is_some_and(|p| inside_box(&detection.bbox, p))
  {
    trace!("视图 {}: 检测框包含南极", view.id());
    region = SphericalRegion::new(YawArc::full(), -FRAC_PI_2, region.pitch_max());
  }

  SphericalDetection {
    region,
    outline: if config.keep_outline { outline } else { Vec::new() },
    confidence: detection.confidence,
    class_id: detection.class_id,
    label: detection.label.clone(),
    provenance: vec![view.id()],
  }
}

/// 映射一个视图的全部检测
pub fn map_view_detections(
  view: &TangentView,
  detections: &[ViewDetection],
  config: &MapperConfig,
) -> Vec<SphericalDetection> {
  detections
    .par_iter()
    .map(|detection| map_detection(view, detection, config))
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use approx::assert_abs_diff_eq;
  use std::f64::consts::PI;

  fn detection(view_id: u32, bbox: [f64; 4]) -> ViewDetection {
    ViewDetection {
      view_id,
      bbox,
      confidence: 0.75,
      class_id: 2,
      label: Some("car".into()),
    }
  }

  #[test]
  fn samples_include_corners_and_midpoints() {
    let points = boundary_points([0.0, 0.0, 4.0, 2.0], 3);
    assert_eq!(points.len(), 16);
    assert!(points.contains(&(2.0, 0.0)));
    assert!(points.contains(&(4.0, 1.0)));
    assert!(points.contains(&(4.0, 2.0)));
  }

  #[test]
  fn centered_box_maps_symmetrically() {
    let view = TangentView::new(0, 0.0, 0.0, 0.0, FRAC_PI_2, 100, 100);
    let mapped = map_detection(&view, &detection(0, [40.0, 40.0, 60.0, 60.0]), &MapperConfig::default());
    let half = 0.2f64.atan();
    assert_abs_diff_eq!(mapped.region.yaw().extent(), 2.0 * half, epsilon = 1e-9);
    assert_abs_diff_eq!(mapped.region.yaw().center(), 0.0, epsilon = 1e-9);
    assert_abs_diff_eq!(mapped.region.pitch_max(), half, epsilon = 1e-9);
    assert_abs_diff_eq!(mapped.region.pitch_min(), -half, epsilon = 1e-9);
    assert_eq!(mapped.provenance, vec![0]);
    assert_eq!(mapped.confidence, 0.75);
    assert_eq!(mapped.label.as_deref(), Some("car"));
    assert_eq!(mapped.outline.len(), 16);
  }

  #[test]
  fn box_straddling_the_seam_yields_a_narrow_wrapping_arc() {
    let view = TangentView::new(7, PI, 0.0, 0.0, FRAC_PI_2, 100, 100);
    let mapped = map_detection(&view, &detection(7, [45.0, 45.0, 55.0, 55.0]), &MapperConfig::default());
    let arc = mapped.region.yaw();
    assert!(arc.extent() < 0.5, "extent {}", arc.extent());
    assert!(arc.wraps());
    assert!(arc.contains(PI - 0.05));
    assert!(arc.contains(-PI + 0.05));
    assert!(!arc.contains(0.0));
  }

  #[test]
  fn box_containing_a_pole_covers_all_yaws() {
    let view = TangentView::new(4, 0.0, FRAC_PI_2, 0.0, FRAC_PI_2, 100, 100);
    let mapped = map_detection(&view, &detection(4, [30.0, 30.0, 70.0, 70.0]), &MapperConfig::default());
    assert!(mapped.region.yaw().is_full());
    assert_abs_diff_eq!(mapped.region.pitch_max(), FRAC_PI_2);
    assert!(mapped.region.pitch_min() > 0.5);
    assert!(mapped.region.touches_north_pole());

    let south = TangentView::new(5, 0.0, -FRAC_PI_2, 0.0, FRAC_PI_2, 100, 100);
    let mapped = map_detection(&south, &detection(5, [30.0, 30.0, 70.0, 70.0]), &MapperConfig::default());
    assert!(mapped.region.yaw().is_full());
    assert_abs_diff_eq!(mapped.region.pitch_min(), -FRAC_PI_2);
  }

  #[test]
  fn outline_can_be_dropped() {
    let view = TangentView::new(0, 0.0, 0.0, 0.0, FRAC_PI_2, 100, 100);
    let config = MapperConfig {
      keep_outline: false,
      ..MapperConfig::default()
    };
    let mapped = map_view_detections(&view, &[detection(0, [10.0, 10.0, 20.0, 20.0])], &config);
    assert_eq!(mapped.len(), 1);
    assert!(mapped[0].outline.is_empty());
  }

  #[test]
  fn rejects_too_few_subdivisions() {
    let config = MapperConfig {
      edge_subdivisions: 1,
      keep_outline: true,
    };
    assert!(config.validate().is_err());
  }
}
