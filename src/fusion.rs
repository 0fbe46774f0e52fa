// 该文件是 Shanan （山南西风） 项目的一部分。
// src/fusion.rs - 跨视图检测融合与去重
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
  cmp::Ordering,
  collections::{BTreeMap, BTreeSet},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::{
  camera::TangentView,
  geometry::{SphericalRegion, YawArc},
  mapper::SphericalDetection,
};

#[derive(Error, Debug)]
pub enum FusionError {
  #[error("融合输入不一致: {0}")]
  Inconsistency(String),
  #[error("融合配置无效: {0}")]
  InvalidConfiguration(String),
}

/// 判断两个检测是否重复的度量
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMetric {
  /// 球面交并比
  #[default]
  Iou,
  /// 交集与较小区域之比
  Ios,
}

/// 重复检测合并后区域的取法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionPolicy {
  /// 保留排序最靠前的检测的区域
  #[default]
  KeepBest,
  /// 按置信度加权平均区域（yaw 取圆周平均）
  WeightedAverage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
  /// 度量严格大于该值即视为重复
  pub threshold: f64,
  pub metric: MatchMetric,
  pub policy: FusionPolicy,
}

impl Default for FusionConfig {
  fn default() -> Self {
    Self {
      threshold: 0.5,
      metric: MatchMetric::default(),
      policy: FusionPolicy::default(),
    }
  }
}

impl FusionConfig {
  pub fn validate(&self) -> Result<(), FusionError> {
    if !self.threshold.is_finite() || !(0.0..=1.0).contains(&self.threshold) {
      return Err(FusionError::InvalidConfiguration(format!(
        "融合阈值必须在 [0, 1] 内, 实际为 {}",
        self.threshold
      )));
    }
    Ok(())
  }

  fn score(&self, a: &SphericalRegion, b: &SphericalRegion) -> f64 {
    match self.metric {
      MatchMetric::Iou => a.iou(b),
      MatchMetric::Ios => a.ios(b),
    }
  }
}

/// 置信度高者优先，其次面积大者，最后来源视图编号小者
fn rank(a: &SphericalDetection, b: &SphericalDetection) -> Ordering {
  b.confidence
    .total_cmp(&a.confidence)
    .then_with(|| b.area().total_cmp(&a.area()))
    .then_with(|| a.first_view().cmp(&b.first_view()))
}

struct DisjointSet {
  parent: Vec<usize>,
}

impl DisjointSet {
  fn new(n: usize) -> Self {
    Self {
      parent: (0..n).collect(),
    }
  }

  fn find(&mut self, mut i: usize) -> usize {
    while self.parent[i] != i {
      self.parent[i] = self.parent[self.parent[i]];
      i = self.parent[i];
    }
    i
  }

  /// 以较小的下标为根，保证根是排序最靠前的成员
  fn union(&mut self, a: usize, b: usize) {
    let (ra, rb) = (self.find(a), self.find(b));
    if ra != rb {
      self.parent[ra.max(rb)] = ra.min(rb);
    }
  }
}

fn weighted_region(members: &[SphericalDetection]) -> SphericalRegion {
  let total: f64 = members.iter().map(|m| m.confidence as f64).sum();
  let weight = |m: &SphericalDetection| {
    if total > 0.0 {
      m.confidence as f64 / total
    } else {
      1.0 / members.len() as f64
    }
  };

  if members.iter().any(|m| m.region.yaw().is_full()) {
    let pitch_min = members.iter().map(|m| weight(m) * m.region.pitch_min()).sum();
    let pitch_max = members.iter().map(|m| weight(m) * m.region.pitch_max()).sum();
    return SphericalRegion::new(YawArc::full(), pitch_min, pitch_max);
  }

  let (mut sin, mut cos, mut extent, mut pitch_min, mut pitch_max) = (0.0, 0.0, 0.0, 0.0, 0.0);
  for m in members {
    let w = weight(m);
    let center = m.region.yaw().center();
    sin += w * center.sin();
    cos += w * center.cos();
    extent += w * m.region.yaw().extent();
    pitch_min += w * m.region.pitch_min();
    pitch_max += w * m.region.pitch_max();
  }
  let center = sin.atan2(cos);
  SphericalRegion::new(
    YawArc::new(center - extent * 0.5, extent),
    pitch_min,
    pitch_max,
  )
}

/// `members` 至少两个且已按 `rank` 排序
fn merge(mut members: Vec<SphericalDetection>, policy: FusionPolicy) -> SphericalDetection {
  let provenance: BTreeSet<u32> = members
    .iter()
    .flat_map(|m| m.provenance.iter().copied())
    .collect();
  let label = members.iter().find_map(|m| m.label.clone());
  let region = match policy {
    FusionPolicy::KeepBest => members[0].region,
    FusionPolicy::WeightedAverage => weighted_region(&members),
  };

  let mut best = members.swap_remove(0);
  best.region = region;
  if policy == FusionPolicy::WeightedAverage {
    best.outline.clear();
  }
  best.label = label;
  best.provenance = provenance.into_iter().collect();
  best
}

/// 单次融合：返回融合结果以及本次是否发生了合并
fn fuse_once(
  detections: Vec<SphericalDetection>,
  config: &FusionConfig,
) -> (Vec<SphericalDetection>, bool) {
  let mut by_class: BTreeMap<u32, Vec<SphericalDetection>> = BTreeMap::new();
  for detection in detections {
    by_class.entry(detection.class_id).or_default().push(detection);
  }

  let mut merged_any = false;
  let mut fused = Vec::new();
  for (class_id, mut group) in by_class {
    group.sort_by(rank);
    let n = group.len();
    let mut sets = DisjointSet::new(n);
    for i in 0..n {
      for j in (i + 1)..n {
        if config.score(&group[i].region, &group[j].region) > config.threshold {
          sets.union(i, j);
        }
      }
    }

    let mut components: BTreeMap<usize, Vec<SphericalDetection>> = BTreeMap::new();
    for (i, detection) in group.into_iter().enumerate() {
      let root = sets.find(i);
      components.entry(root).or_default().push(detection);
    }
    for members in components.into_values() {
      if members.len() > 1 {
        debug!("类别 {}: 合并 {} 个重复检测", class_id, members.len());
        merged_any = true;
        fused.push(merge(members, config.policy));
      } else {
        // 没有重复的检测原样保留，包括轮廓
        fused.extend(members);
      }
    }
  }
  (fused, merged_any)
}

/// 合并重复检测，直到不再有同类检测的重叠度超过阈值
///
/// 输出按类别编号、置信度、面积、来源视图排序，对输出再次融合结果不变。
pub fn fuse(detections: Vec<SphericalDetection>, config: &FusionConfig) -> Vec<SphericalDetection> {
  let input = detections.len();
  let mut current: Vec<SphericalDetection> = detections
    .into_iter()
    .map(|mut d| {
      d.provenance.sort_unstable();
      d.provenance.dedup();
      d
    })
    .collect();

  let mut rounds = 0;
  loop {
    rounds += 1;
    let (next, merged) = fuse_once(current, config);
    current = next;
    if !merged {
      break;
    }
  }

  current.sort_by(|a, b| a.class_id.cmp(&b.class_id).then_with(|| rank(a, b)));
  debug!(
    "融合完成: {} 个检测 -> {} 个, {} 轮",
    input,
    current.len(),
    rounds
  );
  current
}

/// 检查来源视图编号后再融合；编号缺失或未知属于调用方的逻辑错误
pub fn fuse_with_views(
  detections: Vec<SphericalDetection>,
  views: &[TangentView],
  config: &FusionConfig,
) -> Result<Vec<SphericalDetection>, FusionError> {
  let known: BTreeSet<u32> = views.iter().map(|v| v.id()).collect();
  for detection in &detections {
    if detection.provenance.is_empty() {
      return Err(FusionError::Inconsistency("检测缺少来源视图".to_string()));
    }
    if let Some(unknown) = detection.provenance.iter().find(|id| !known.contains(id)) {
      return Err(FusionError::Inconsistency(format!(
        "检测引用了未知的视图 {}",
        unknown
      )));
    }
  }
  Ok(fuse(detections, config))
}

#[cfg(test)]
mod tests {
  use super::*;
  use approx::assert_abs_diff_eq;
  use std::f64::consts::PI;

  fn det(class_id: u32, yaw_deg: f64, half_deg: f64, confidence: f32, view: u32) -> SphericalDetection {
    let (yaw, half) = (yaw_deg.to_radians(), half_deg.to_radians());
    SphericalDetection {
      region: SphericalRegion::new(YawArc::new(yaw - half, 2.0 * half), -half, half),
      outline: Vec::new(),
      confidence,
      class_id,
      label: None,
      provenance: vec![view],
    }
  }

  #[test]
  fn merges_overlapping_detections_of_the_same_class() {
    let fused = fuse(
      vec![det(0, 0.0, 10.0, 0.6, 3), det(0, 2.0, 10.0, 0.9, 0)],
      &FusionConfig::default(),
    );
    assert_eq!(fused.len(), 1);
    assert_eq!(fused[0].provenance, vec![0, 3]);
    assert_eq!(fused[0].confidence, 0.9);
    assert_abs_diff_eq!(fused[0].region.yaw().center(), 2f64.to_radians(), epsilon = 1e-9);
  }

  #[test]
  fn keeps_other_classes_and_distant_detections() {
    let fused = fuse(
      vec![
        det(0, 0.0, 10.0, 0.6, 0),
        det(1, 0.0, 10.0, 0.6, 1),
        det(0, 15.0, 10.0, 0.6, 2),
      ],
      &FusionConfig::default(),
    );
    assert_eq!(fused.len(), 3);
    assert_eq!(fused[2].class_id, 1);
  }

  #[test]
  fn transitive_overlaps_form_one_group() {
    let fused = fuse(
      vec![
        det(0, 0.0, 10.0, 0.5, 0),
        det(0, 6.0, 10.0, 0.7, 1),
        det(0, 12.0, 10.0, 0.6, 2),
      ],
      &FusionConfig::default(),
    );
    assert_eq!(fused.len(), 1);
    assert_eq!(fused[0].provenance, vec![0, 1, 2]);
    assert_abs_diff_eq!(fused[0].region.yaw().center(), 6f64.to_radians(), epsilon = 1e-9);
  }

  #[test]
  fn ties_prefer_the_lowest_view() {
    let fused = fuse(
      vec![det(0, 1.0, 10.0, 0.8, 5), det(0, 0.0, 10.0, 0.8, 2)],
      &FusionConfig::default(),
    );
    assert_eq!(fused.len(), 1);
    assert_abs_diff_eq!(fused[0].region.yaw().center(), 0.0, epsilon = 1e-9);
  }

  #[test]
  fn fusion_is_idempotent() {
    let input = vec![
      det(0, 0.0, 10.0, 0.5, 0),
      det(0, 6.0, 10.0, 0.7, 1),
      det(0, 30.0, 10.0, 0.6, 2),
      det(2, 30.0, 5.0, 0.6, 2),
      det(2, 31.0, 5.0, 0.9, 3),
      det(0, 179.0, 4.0, 0.4, 4),
      det(0, -179.0, 4.0, 0.3, 5),
    ];
    for config in [
      FusionConfig::default(),
      FusionConfig {
        policy: FusionPolicy::WeightedAverage,
        metric: MatchMetric::Ios,
        threshold: 0.3,
      },
    ] {
      let once = fuse(input.clone(), &config);
      let twice = fuse(once.clone(), &config);
      assert_eq!(once, twice);
    }
  }

  #[test]
  fn weighted_average_handles_the_seam() {
    let config = FusionConfig {
      policy: FusionPolicy::WeightedAverage,
      ..FusionConfig::default()
    };
    let fused = fuse(vec![det(0, 179.0, 5.0, 0.5, 0), det(0, -179.0, 5.0, 0.5, 1)], &config);
    assert_eq!(fused.len(), 1);
    let center = fused[0].region.yaw().center();
    assert_abs_diff_eq!(center.abs(), PI, epsilon = 1e-9);
    assert!(fused[0].region.yaw().extent() < 0.2);
  }

  #[test]
  fn unknown_views_are_inconsistent() {
    let views = vec![TangentView::new(0, 0.0, 0.0, 0.0, 1.0, 8, 8)];
    let result = fuse_with_views(vec![det(0, 0.0, 5.0, 0.5, 9)], &views, &FusionConfig::default());
    assert!(matches!(result, Err(FusionError::Inconsistency(_))));

    let mut orphan = det(0, 0.0, 5.0, 0.5, 0);
    orphan.provenance.clear();
    let result = fuse_with_views(vec![orphan], &views, &FusionConfig::default());
    assert!(matches!(result, Err(FusionError::Inconsistency(_))));

    let ok = fuse_with_views(vec![det(0, 0.0, 5.0, 0.5, 0)], &views, &FusionConfig::default());
    assert_eq!(ok.unwrap().len(), 1);
  }

  #[test]
  fn lone_detections_keep_their_outline() {
    let config = FusionConfig {
      policy: FusionPolicy::WeightedAverage,
      ..FusionConfig::default()
    };
    let mut lone = det(0, 40.0, 5.0, 0.5, 1);
    lone.outline = vec![(0.6, -0.08), (0.8, -0.08), (0.8, 0.08), (0.6, 0.08)];
    let fused = fuse(vec![lone.clone(), det(0, -60.0, 5.0, 0.7, 2)], &config);
    assert_eq!(fused.len(), 2);
    let kept = fused.iter().find(|d| d.provenance == vec![1]).unwrap();
    assert_eq!(kept, &lone);
  }
}
