// 该文件是 Shanan （山南西风） 项目的一部分。
// src/geometry.rs - 球面几何工具
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

//! 等距柱状投影像素、球面角 (yaw/pitch) 与单位向量之间的换算。
//!
//! 约定：
//! - yaw ∈ [-π, π)，向右为正；pitch ∈ [-π/2, π/2]，向上为正；
//! - 世界坐标系 Y 轴向上，yaw = 0 时朝向 +Z，yaw = π/2 时朝向 +X；
//! - 像素 (i, j) 的中心位于连续坐标 (i + 0.5, j + 0.5)，第 0 行对应 pitch = π/2。
//!
//! 极点处 yaw 没有定义：单位向量转回球面角时统一返回 yaw = 0。

use std::f64::consts::{FRAC_PI_2, PI, TAU};

use nalgebra::Vector3;

mod region;
pub use self::region::{SphericalRegion, YawArc};

/// 极点判定阈值（cos(pitch) 小于该值时视为极点）
pub const POLE_EPSILON: f64 = 1e-12;

/// 将 yaw 折返到 [-π, π)
pub fn wrap_yaw(yaw: f64) -> f64 {
  let wrapped = (yaw + PI).rem_euclid(TAU) - PI;
  // rem_euclid 在浮点误差下可能返回 TAU
  if wrapped >= PI { wrapped - TAU } else { wrapped }
}

/// 将 pitch 截断到 [-π/2, π/2]
pub fn clamp_pitch(pitch: f64) -> f64 {
  pitch.clamp(-FRAC_PI_2, FRAC_PI_2)
}

/// 等距柱状图的连续像素坐标转换为 (yaw, pitch)
pub fn pixel_to_spherical(x: f64, y: f64, width: u32, height: u32) -> (f64, f64) {
  let yaw = wrap_yaw(x / width as f64 * TAU - PI);
  let pitch = clamp_pitch(FRAC_PI_2 - y / height as f64 * PI);
  (yaw, pitch)
}

/// (yaw, pitch) 转换为等距柱状图的连续像素坐标
///
/// 水平方向按宽度折返到 [0, width)，垂直方向截断到 [0, height]。
pub fn spherical_to_pixel(yaw: f64, pitch: f64, width: u32, height: u32) -> (f64, f64) {
  let w = width as f64;
  let h = height as f64;
  let x = ((wrap_yaw(yaw) + PI) / TAU * w).rem_euclid(w);
  let y = ((FRAC_PI_2 - clamp_pitch(pitch)) / PI * h).clamp(0.0, h);
  // rem_euclid 的浮点误差
  let x = if x >= w { 0.0 } else { x };
  (x, y)
}

/// (yaw, pitch) 转换为单位球面上的向量
pub fn spherical_to_unit_vector(yaw: f64, pitch: f64) -> Vector3<f64> {
  let (sin_p, cos_p) = pitch.sin_cos();
  let (sin_y, cos_y) = yaw.sin_cos();
  Vector3::new(cos_p * sin_y, sin_p, cos_p * cos_y)
}

/// 向量转换为 (yaw, pitch)；向量会先被归一化
///
/// 零向量和极点返回 yaw = 0。
pub fn unit_vector_to_spherical(v: &Vector3<f64>) -> (f64, f64) {
  let norm = v.norm();
  if norm <= f64::EPSILON {
    return (0.0, 0.0);
  }
  let v = v / norm;
  let pitch = v.y.clamp(-1.0, 1.0).asin();
  let horizontal = (v.x * v.x + v.z * v.z).sqrt();
  if horizontal < POLE_EPSILON {
    return (0.0, pitch);
  }
  (wrap_yaw(v.x.atan2(v.z)), pitch)
}

/// 两个方向之间的大圆距离（弧度）
///
/// 点积在 acos 之前被截断到 [-1, 1]，浮点漂移不会产生 NaN。
pub fn angular_distance(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
  let (na, nb) = (a.norm(), b.norm());
  if na <= f64::EPSILON || nb <= f64::EPSILON {
    return 0.0;
  }
  (a.dot(b) / (na * nb)).clamp(-1.0, 1.0).acos()
}

/// 两个球面角之间的大圆距离（弧度）
pub fn angular_distance_spherical(a: (f64, f64), b: (f64, f64)) -> f64 {
  angular_distance(
    &spherical_to_unit_vector(a.0, a.1),
    &spherical_to_unit_vector(b.0, b.1),
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use approx::assert_abs_diff_eq;

  #[test]
  fn wrap_yaw_stays_in_half_open_range() {
    assert_abs_diff_eq!(wrap_yaw(PI), -PI, epsilon = 1e-12);
    assert_abs_diff_eq!(wrap_yaw(-PI), -PI, epsilon = 1e-12);
    assert_abs_diff_eq!(wrap_yaw(3.0 * PI + 0.25), -PI + 0.25, epsilon = 1e-9);
    assert_abs_diff_eq!(wrap_yaw(-0.5), -0.5, epsilon = 1e-12);
    for k in -20..20 {
      let y = wrap_yaw(k as f64 * 0.7);
      assert!((-PI..PI).contains(&y), "yaw {y} out of range");
    }
  }

  #[test]
  fn pixel_round_trip_within_one_pixel() {
    let (w, h) = (400u32, 200u32);
    for j in 0..h {
      for i in (0..w).step_by(7) {
        let (x, y) = (i as f64 + 0.5, j as f64 + 0.5);
        let (yaw, pitch) = pixel_to_spherical(x, y, w, h);
        let (x2, y2) = spherical_to_pixel(yaw, pitch, w, h);
        assert!((x - x2).abs() < 1.0, "x {x} -> {x2}");
        assert!((y - y2).abs() < 1.0, "y {y} -> {y2}");
      }
    }
  }

  #[test]
  fn pixel_round_trip_through_unit_vector_away_from_poles() {
    let (w, h) = (256u32, 128u32);
    // 第 0 行和最后一行紧挨极点，跳过
    for j in 1..h - 1 {
      for i in (0..w).step_by(5) {
        let (x, y) = (i as f64 + 0.5, j as f64 + 0.5);
        let (yaw, pitch) = pixel_to_spherical(x, y, w, h);
        let v = spherical_to_unit_vector(yaw, pitch);
        let (yaw2, pitch2) = unit_vector_to_spherical(&v);
        let (x2, y2) = spherical_to_pixel(yaw2, pitch2, w, h);
        let dx = (x - x2).abs().min(w as f64 - (x - x2).abs());
        assert!(dx < 1.0, "x {x} -> {x2}");
        assert!((y - y2).abs() < 1.0, "y {y} -> {y2}");
      }
    }
  }

  #[test]
  fn poles_collapse_to_zero_yaw() {
    for yaw in [-3.0, -1.0, 0.0, 1.0, 3.0] {
      let north = spherical_to_unit_vector(yaw, FRAC_PI_2);
      let (y, p) = unit_vector_to_spherical(&north);
      assert_abs_diff_eq!(y, 0.0);
      assert_abs_diff_eq!(p, FRAC_PI_2, epsilon = 1e-9);

      let south = spherical_to_unit_vector(yaw, -FRAC_PI_2);
      let (y, p) = unit_vector_to_spherical(&south);
      assert_abs_diff_eq!(y, 0.0);
      assert_abs_diff_eq!(p, -FRAC_PI_2, epsilon = 1e-9);
    }
  }

  #[test]
  fn pixel_coordinates_clamp_and_wrap() {
    let (yaw, pitch) = pixel_to_spherical(-10.0, -5.0, 100, 50);
    assert!((-PI..PI).contains(&yaw));
    assert_abs_diff_eq!(pitch, FRAC_PI_2);
    let (x, y) = spherical_to_pixel(PI + 0.01, -2.0, 100, 50);
    assert!((0.0..100.0).contains(&x));
    assert_abs_diff_eq!(y, 50.0);
  }

  #[test]
  fn angular_distance_is_clamped_against_drift() {
    let a = Vector3::new(0.0, 0.0, 1.0 + 1e-15);
    let b = Vector3::new(0.0, 0.0, 1.0);
    assert!(angular_distance(&a, &b).is_finite());
    assert_abs_diff_eq!(angular_distance(&a, &b), 0.0, epsilon = 1e-7);
    assert_abs_diff_eq!(angular_distance(&a, &-b), PI, epsilon = 1e-7);
    assert_abs_diff_eq!(
      angular_distance_spherical((0.0, 0.0), (FRAC_PI_2, 0.0)),
      FRAC_PI_2,
      epsilon = 1e-12
    );
  }
}
