// 该文件是 Shanan （山南西风） 项目的一部分。
// src/geometry/region.rs - 球面区域（yaw 弧段 × pitch 区间）
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

use std::f64::consts::{FRAC_PI_2, PI, TAU};

use serde::{Deserialize, Serialize};

use super::{clamp_pitch, wrap_yaw};

const ARC_EPSILON: f64 = 1e-9;

/// 圆周上的 yaw 弧段，从 `start` 起顺时针（yaw 增大方向）延伸 `extent`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YawArc {
  start: f64,
  extent: f64,
}

impl YawArc {
  pub fn new(start: f64, extent: f64) -> Self {
    let extent = if extent.is_finite() { extent.clamp(0.0, TAU) } else { TAU };
    Self {
      start: if extent >= TAU { -PI } else { wrap_yaw(start) },
      extent,
    }
  }

  /// 整个圆周
  pub fn full() -> Self {
    Self { start: -PI, extent: TAU }
  }

  /// 由起止 yaw 构造；`max < min` 表示跨越 ±π 的弧段
  pub fn from_bounds(min: f64, max: f64) -> Self {
    if max - min >= TAU - ARC_EPSILON {
      return Self::full();
    }
    let (min, max) = (wrap_yaw(min), wrap_yaw(max));
    let extent = if max >= min { max - min } else { max + TAU - min };
    Self::new(min, extent)
  }

  /// 覆盖所有给定 yaw 的最短弧段
  ///
  /// 在排序后的角度中找出最大的空隙，弧段即为其补集，因此跨越 ±π 的点集
  /// 得到的是一段窄弧，而不是接近 360° 的区间。
  pub fn enclosing(yaws: &[f64]) -> Self {
    let mut sorted: Vec<f64> = yaws
      .iter()
      .copied()
      .filter(|y| y.is_finite())
      .map(wrap_yaw)
      .collect();
    if sorted.is_empty() {
      return Self::new(0.0, 0.0);
    }
    sorted.sort_by(f64::total_cmp);

    let n = sorted.len();
    // 首尾之间跨越 ±π 的空隙
    let mut best_gap = sorted[0] + TAU - sorted[n - 1];
    let mut best_after = 0usize;
    for i in 1..n {
      let gap = sorted[i] - sorted[i - 1];
      if gap > best_gap {
        best_gap = gap;
        best_after = i;
      }
    }
    Self::new(sorted[best_after], TAU - best_gap)
  }

  pub fn start(&self) -> f64 {
    self.start
  }

  pub fn extent(&self) -> f64 {
    self.extent
  }

  /// 终点（已折返到 [-π, π)）
  pub fn end(&self) -> f64 {
    wrap_yaw(self.start + self.extent)
  }

  pub fn is_full(&self) -> bool {
    self.extent >= TAU - ARC_EPSILON
  }

  /// 弧段是否跨越 ±π
  pub fn wraps(&self) -> bool {
    !self.is_full() && self.start + self.extent > PI
  }

  pub fn center(&self) -> f64 {
    wrap_yaw(self.start + self.extent * 0.5)
  }

  pub fn contains(&self, yaw: f64) -> bool {
    self.is_full() || (yaw - self.start).rem_euclid(TAU) <= self.extent + ARC_EPSILON
  }

  /// 两段弧的重叠长度（弧度），跨越 ±π 时可能由两段组成
  pub fn overlap(&self, other: &YawArc) -> f64 {
    if self.is_full() || other.is_full() {
      return self.extent.min(other.extent);
    }
    let (a0, a1) = (self.start, self.start + self.extent);
    [-TAU, 0.0, TAU]
      .iter()
      .map(|shift| {
        let b0 = other.start + shift;
        let b1 = b0 + other.extent;
        (a1.min(b1) - a0.max(b0)).max(0.0)
      })
      .sum::<f64>()
      .min(self.extent.min(other.extent))
  }
}

/// 球面上的区域：yaw 弧段与 pitch 区间的乘积
///
/// 面积按球面计算：`extent · (sin(pitch_max) − sin(pitch_min))`（单位球上的立体角）。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(into = "RegionRecord", from = "RegionRecord")]
pub struct SphericalRegion {
  yaw: YawArc,
  pitch_min: f64,
  pitch_max: f64,
}

impl SphericalRegion {
  pub fn new(yaw: YawArc, pitch_min: f64, pitch_max: f64) -> Self {
    let (a, b) = (clamp_pitch(pitch_min), clamp_pitch(pitch_max));
    Self {
      yaw,
      pitch_min: a.min(b),
      pitch_max: a.max(b),
    }
  }

  /// 覆盖所有 (yaw, pitch) 点的最小区域
  pub fn enclosing(points: &[(f64, f64)]) -> Self {
    let yaws: Vec<f64> = points.iter().map(|p| p.0).collect();
    let (pitch_min, pitch_max) = points
      .iter()
      .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
        (lo.min(p.1), hi.max(p.1))
      });
    if !pitch_min.is_finite() {
      return Self::new(YawArc::new(0.0, 0.0), 0.0, 0.0);
    }
    Self::new(YawArc::enclosing(&yaws), pitch_min, pitch_max)
  }

  pub fn yaw(&self) -> &YawArc {
    &self.yaw
  }

  pub fn pitch_min(&self) -> f64 {
    self.pitch_min
  }

  pub fn pitch_max(&self) -> f64 {
    self.pitch_max
  }

  /// 区域中心 (yaw, pitch)
  pub fn center(&self) -> (f64, f64) {
    (self.yaw.center(), 0.5 * (self.pitch_min + self.pitch_max))
  }

  pub fn contains(&self, yaw: f64, pitch: f64) -> bool {
    (self.pitch_min..=self.pitch_max).contains(&pitch) && self.yaw.contains(yaw)
  }

  /// 立体角（单位球面积）
  pub fn area(&self) -> f64 {
    self.yaw.extent() * (self.pitch_max.sin() - self.pitch_min.sin()).max(0.0)
  }

  pub fn intersection_area(&self, other: &SphericalRegion) -> f64 {
    let lo = self.pitch_min.max(other.pitch_min);
    let hi = self.pitch_max.min(other.pitch_max);
    if hi <= lo {
      return 0.0;
    }
    self.yaw.overlap(&other.yaw) * (hi.sin() - lo.sin())
  }

  /// 球面交并比
  pub fn iou(&self, other: &SphericalRegion) -> f64 {
    let inter = self.intersection_area(other);
    let union = self.area() + other.area() - inter;
    if union > 0.0 { (inter / union).clamp(0.0, 1.0) } else { 0.0 }
  }

  /// 交集与较小区域面积之比
  pub fn ios(&self, other: &SphericalRegion) -> f64 {
    let smaller = self.area().min(other.area());
    if smaller > 0.0 {
      (self.intersection_area(other) / smaller).clamp(0.0, 1.0)
    } else {
      0.0
    }
  }

  pub fn touches_north_pole(&self) -> bool {
    self.pitch_max >= FRAC_PI_2 - ARC_EPSILON
  }

  pub fn touches_south_pole(&self) -> bool {
    self.pitch_min <= -FRAC_PI_2 + ARC_EPSILON
  }
}

/// 持久化格式：角度制的四个边界；`yaw_max_deg < yaw_min_deg` 表示跨越 ±180°
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RegionRecord {
  yaw_min_deg: f64,
  yaw_max_deg: f64,
  pitch_min_deg: f64,
  pitch_max_deg: f64,
}

impl From<SphericalRegion> for RegionRecord {
  fn from(region: SphericalRegion) -> Self {
    let (yaw_min, yaw_max) = if region.yaw.is_full() {
      (-PI, PI)
    } else {
      (region.yaw.start(), region.yaw.end())
    };
    RegionRecord {
      yaw_min_deg: yaw_min.to_degrees(),
      yaw_max_deg: yaw_max.to_degrees(),
      pitch_min_deg: region.pitch_min.to_degrees(),
      pitch_max_deg: region.pitch_max.to_degrees(),
    }
  }
}

impl From<RegionRecord> for SphericalRegion {
  fn from(record: RegionRecord) -> Self {
    SphericalRegion::new(
      YawArc::from_bounds(record.yaw_min_deg.to_radians(), record.yaw_max_deg.to_radians()),
      record.pitch_min_deg.to_radians(),
      record.pitch_max_deg.to_radians(),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use approx::assert_abs_diff_eq;

  fn deg(v: f64) -> f64 {
    v.to_radians()
  }

  #[test]
  fn enclosing_arc_across_seam_is_narrow() {
    let arc = YawArc::enclosing(&[deg(175.0), deg(-178.0), deg(179.0), deg(-172.0)]);
    assert_abs_diff_eq!(arc.extent(), deg(13.0), epsilon = 1e-9);
    assert_abs_diff_eq!(arc.start(), deg(175.0), epsilon = 1e-9);
    assert!(arc.wraps());
    assert!(arc.contains(deg(-179.5)));
    assert!(!arc.contains(0.0));
  }

  #[test]
  fn enclosing_arc_without_seam() {
    let arc = YawArc::enclosing(&[deg(10.0), deg(-20.0), deg(5.0)]);
    assert_abs_diff_eq!(arc.start(), deg(-20.0), epsilon = 1e-9);
    assert_abs_diff_eq!(arc.extent(), deg(30.0), epsilon = 1e-9);
    assert!(!arc.wraps());
  }

  #[test]
  fn overlap_handles_wrapping_arcs() {
    let a = YawArc::from_bounds(deg(170.0), deg(-170.0));
    let b = YawArc::from_bounds(deg(175.0), deg(-160.0));
    assert_abs_diff_eq!(a.overlap(&b), deg(15.0), epsilon = 1e-9);
    assert_abs_diff_eq!(b.overlap(&a), deg(15.0), epsilon = 1e-9);

    let c = YawArc::from_bounds(deg(-10.0), deg(10.0));
    assert_abs_diff_eq!(a.overlap(&c), 0.0);
    assert_abs_diff_eq!(YawArc::full().overlap(&c), deg(20.0), epsilon = 1e-9);
  }

  #[test]
  fn overlap_of_two_large_arcs_counts_both_pieces() {
    // [-150, 150] 与 [100, -100]（跨越 ±180）在两端各重叠 50°
    let a = YawArc::from_bounds(deg(-150.0), deg(150.0));
    let b = YawArc::from_bounds(deg(100.0), deg(-100.0));
    assert_abs_diff_eq!(a.overlap(&b), deg(100.0), epsilon = 1e-9);
  }

  #[test]
  fn spherical_area_of_full_sphere() {
    let r = SphericalRegion::new(YawArc::full(), -FRAC_PI_2, FRAC_PI_2);
    assert_abs_diff_eq!(r.area(), 4.0 * PI, epsilon = 1e-12);
    assert!(r.touches_north_pole() && r.touches_south_pole());
  }

  #[test]
  fn iou_identical_and_disjoint() {
    let a = SphericalRegion::new(YawArc::from_bounds(deg(-10.0), deg(10.0)), deg(-5.0), deg(5.0));
    let b = SphericalRegion::new(YawArc::from_bounds(deg(20.0), deg(30.0)), deg(-5.0), deg(5.0));
    assert_abs_diff_eq!(a.iou(&a), 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(a.iou(&b), 0.0);
    assert_abs_diff_eq!(a.ios(&a), 1.0, epsilon = 1e-12);
  }

  #[test]
  fn iou_across_seam() {
    let a = SphericalRegion::new(YawArc::from_bounds(deg(170.0), deg(-170.0)), deg(0.0), deg(10.0));
    let b = SphericalRegion::new(YawArc::from_bounds(deg(-180.0), deg(-170.0)), deg(0.0), deg(10.0));
    assert_abs_diff_eq!(a.iou(&b), 0.5, epsilon = 1e-9);
    assert_abs_diff_eq!(a.ios(&b), 1.0, epsilon = 1e-9);
  }

  #[test]
  fn record_round_trip_keeps_wrap() {
    let r = SphericalRegion::new(YawArc::from_bounds(deg(170.0), deg(-170.0)), deg(-3.0), deg(4.0));
    let json = serde_json::to_string(&r).unwrap();
    let back: SphericalRegion = serde_json::from_str(&json).unwrap();
    assert!(back.yaw().wraps());
    assert_abs_diff_eq!(back.yaw().extent(), deg(20.0), epsilon = 1e-9);
    assert_abs_diff_eq!(back.pitch_min(), deg(-3.0), epsilon = 1e-9);

    let full = SphericalRegion::new(YawArc::full(), deg(60.0), deg(90.0));
    let back: SphericalRegion = serde_json::from_str(&serde_json::to_string(&full).unwrap()).unwrap();
    assert!(back.yaw().is_full());
  }
}
