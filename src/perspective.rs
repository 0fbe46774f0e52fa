// 该文件是 Shanan （山南西风） 项目的一部分。
// src/perspective.rs - 透视场：地平线、竖直消失点、逐像素上方向与纬度
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

use image::{GrayImage, Luma};
use nalgebra::Vector3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::camera::TangentView;

const DEGENERATE: f64 = 1e-9;
/// `within_threshold` 统计使用的角度阈值（度）
pub const ANGLE_THRESHOLD_DEG: f64 = 5.0;

#[derive(Error, Debug)]
pub enum PerspectiveError {
  #[error("透视场尺寸不一致: {0}x{1} 与 {2}x{3}")]
  ShapeMismatch(u32, u32, u32, u32),
  #[error("透视场为空")]
  Empty,
  #[error("相机参数数量不一致: {0} 与 {1}")]
  CountMismatch(usize, usize),
}

/// 图像中的地平线，以左右两端（u = 0 与 u = width）处的 v 坐标表示
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HorizonLine {
  pub left: f64,
  pub right: f64,
}

impl HorizonLine {
  pub fn at(&self, u: f64, width: u32) -> f64 {
    self.left + (self.right - self.left) * u / width as f64
  }
}

/// 竖直方向的消失点（天顶或天底的投影），像素坐标
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VanishingPoint {
  pub x: f64,
  pub y: f64,
  /// true 表示天顶，false 表示天底
  pub zenith: bool,
}

/// 世界上方向在相机坐标中的表示（y 向下）
fn camera_up(view: &TangentView) -> Vector3<f64> {
  view.world_to_camera(&Vector3::y())
}

/// 纬度为 0 的像素构成的直线；相机正对天顶或天底时不存在
pub fn horizon_line(view: &TangentView) -> Option<HorizonLine> {
  let g = camera_up(view);
  if g.y.abs() < DEGENERATE {
    return None;
  }
  let (cx, cy) = view.principal_point();
  let f = view.focal();
  let v = |u: f64| cy - (g.x * (u - cx) + g.z * f) / g.y;
  Some(HorizonLine {
    left: v(0.0),
    right: v(view.width() as f64),
  })
}

/// 天顶（相机朝上时）或天底（相机朝下时）的投影；光轴水平时在无穷远处
pub fn vertical_vanishing_point(view: &TangentView) -> Option<VanishingPoint> {
  let g = camera_up(view);
  if g.z.abs() < DEGENERATE {
    return None;
  }
  let (cx, cy) = view.principal_point();
  let f = view.focal();
  Some(VanishingPoint {
    x: cx + f * g.x / g.z,
    y: cy + f * g.y / g.z,
    zenith: g.z > 0.0,
  })
}

/// 相机相对重力方向的姿态与视场（度）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraParams {
  pub roll_deg: f64,
  pub pitch_deg: f64,
  pub vfov_deg: f64,
}

impl CameraParams {
  /// 视图自身的参数，作为参考值
  pub fn of_view(view: &TangentView) -> Self {
    Self {
      roll_deg: view.roll().to_degrees(),
      pitch_deg: view.pitch().to_degrees(),
      vfov_deg: view.vfov().to_degrees(),
    }
  }
}

/// 由地平线恢复滚转与俯仰；地平线方程只确定斜率，滚转限于 (-90°, 90°)
pub fn params_from_horizon(view: &TangentView, horizon: &HorizonLine) -> CameraParams {
  let (cx, cy) = view.principal_point();
  let roll = ((horizon.right - horizon.left) / view.width() as f64).atan();
  let offset = horizon.at(cx, view.width()) - cy;
  let pitch = (offset * roll.cos() / view.focal()).atan();
  CameraParams {
    roll_deg: roll.to_degrees(),
    pitch_deg: pitch.to_degrees(),
    vfov_deg: view.vfov().to_degrees(),
  }
}

/// 由竖直消失点恢复滚转与俯仰；消失点落在主点上时滚转无法确定，取 0
pub fn params_from_vanishing_point(view: &TangentView, point: &VanishingPoint) -> CameraParams {
  let (cx, cy) = view.principal_point();
  let (dx, dy) = (point.x - cx, point.y - cy);
  let (dx, dy) = if point.zenith { (dx, dy) } else { (-dx, -dy) };
  let radius = dx.hypot(dy);
  let roll = if radius < DEGENERATE { 0.0 } else { dx.atan2(-dy) };
  let pitch = view.focal().atan2(radius);
  CameraParams {
    roll_deg: roll.to_degrees(),
    pitch_deg: (if point.zenith { pitch } else { -pitch }).to_degrees(),
    vfov_deg: view.vfov().to_degrees(),
  }
}

/// 从视图的地平线或竖直消失点中离主点较近的一个恢复相机参数
pub fn recover_params(view: &TangentView) -> Option<CameraParams> {
  let (cx, cy) = view.principal_point();
  match (horizon_line(view), vertical_vanishing_point(view)) {
    (Some(horizon), Some(point)) => {
      let horizon_offset = (horizon.at(cx, view.width()) - cy).abs();
      let point_offset = (point.x - cx).hypot(point.y - cy);
      if horizon_offset <= point_offset {
        Some(params_from_horizon(view, &horizon))
      } else {
        Some(params_from_vanishing_point(view, &point))
      }
    }
    (Some(horizon), None) => Some(params_from_horizon(view, &horizon)),
    (None, Some(point)) => Some(params_from_vanishing_point(view, &point)),
    (None, None) => None,
  }
}

/// 逐像素透视场
#[derive(Debug, Clone, PartialEq)]
pub struct PerspectiveField {
  width: u32,
  height: u32,
  /// 图像平面中指向"上方"的单位向量；在消失点上为零向量
  up: Vec<[f32; 2]>,
  /// 像素光线的纬度（度）
  latitude: Vec<f32>,
}

impl PerspectiveField {
  pub fn compute(view: &TangentView) -> Self {
    let (width, height) = (view.width(), view.height());
    let g = camera_up(view);
    let (cx, cy) = view.principal_point();
    let f = view.focal();

    let (up, latitude): (Vec<[f32; 2]>, Vec<f32>) = (0..width as usize * height as usize)
      .into_par_iter()
      .map(|idx| {
        let u = (idx % width as usize) as f64 + 0.5;
        let v = (idx / width as usize) as f64 + 0.5;
        let c = Vector3::new(u - cx, v - cy, f);
        // 沿上方向移动时投影点的变化率
        let du = g.x * c.z - c.x * g.z;
        let dv = g.y * c.z - c.y * g.z;
        let norm = du.hypot(dv);
        let up = if norm < DEGENERATE {
          [0.0, 0.0]
        } else {
          [(du / norm) as f32, (dv / norm) as f32]
        };
        let sin_lat = (g.dot(&c) / c.norm()).clamp(-1.0, 1.0);
        (up, sin_lat.asin().to_degrees() as f32)
      })
      .unzip();

    Self {
      width,
      height,
      up,
      latitude,
    }
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn up(&self, x: u32, y: u32) -> [f32; 2] {
    self.up[(y * self.width + x) as usize]
  }

  pub fn latitude(&self, x: u32, y: u32) -> f32 {
    self.latitude[(y * self.width + x) as usize]
  }

  /// 纬度可视化：-90° 为黑，+90° 为白
  pub fn latitude_image(&self) -> GrayImage {
    GrayImage::from_fn(self.width, self.height, |x, y| {
      let t = (self.latitude(x, y) + 90.0) / 180.0;
      Luma([(t.clamp(0.0, 1.0) * 255.0).round() as u8])
    })
  }
}

/// 两个透视场的逐像素误差统计（度）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldComparison {
  pub up_mean_deg: f64,
  pub up_median_deg: f64,
  pub latitude_mean_deg: f64,
  pub latitude_median_deg: f64,
  /// 上方向误差不超过阈值的像素比例
  pub up_within_threshold: f64,
  /// 纬度误差不超过阈值的像素比例
  pub latitude_within_threshold: f64,
}

fn median(values: &mut [f64]) -> f64 {
  if values.is_empty() {
    return 0.0;
  }
  values.sort_by(f64::total_cmp);
  let mid = values.len() / 2;
  if values.len() % 2 == 0 {
    0.5 * (values[mid - 1] + values[mid])
  } else {
    values[mid]
  }
}

fn mean(values: &[f64]) -> f64 {
  if values.is_empty() {
    0.0
  } else {
    values.iter().sum::<f64>() / values.len() as f64
  }
}

fn fraction_within(values: &[f64], threshold: f64) -> f64 {
  if values.is_empty() {
    0.0
  } else {
    values.iter().filter(|&&v| v <= threshold).count() as f64 / values.len() as f64
  }
}

/// 比较预测场与参考场；任一方上方向为零向量的像素不计入上方向误差
pub fn compare_fields(
  predicted: &PerspectiveField,
  reference: &PerspectiveField,
) -> Result<FieldComparison, PerspectiveError> {
  if predicted.width != reference.width || predicted.height != reference.height {
    return Err(PerspectiveError::ShapeMismatch(
      predicted.width,
      predicted.height,
      reference.width,
      reference.height,
    ));
  }
  if predicted.latitude.is_empty() {
    return Err(PerspectiveError::Empty);
  }

  let mut up_errors: Vec<f64> = predicted
    .up
    .iter()
    .zip(&reference.up)
    .filter(|(a, b)| **a != [0.0, 0.0] && **b != [0.0, 0.0])
    .map(|(a, b)| {
      let dot = a[0] as f64 * b[0] as f64 + a[1] as f64 * b[1] as f64;
      dot.clamp(-1.0, 1.0).acos().to_degrees()
    })
    .collect();
  let mut latitude_errors: Vec<f64> = predicted
    .latitude
    .iter()
    .zip(&reference.latitude)
    .map(|(a, b)| (a - b).abs() as f64)
    .collect();

  Ok(FieldComparison {
    up_mean_deg: mean(&up_errors),
    latitude_mean_deg: mean(&latitude_errors),
    up_within_threshold: fraction_within(&up_errors, ANGLE_THRESHOLD_DEG),
    latitude_within_threshold: fraction_within(&latitude_errors, ANGLE_THRESHOLD_DEG),
    up_median_deg: median(&mut up_errors),
    latitude_median_deg: median(&mut latitude_errors),
  })
}

/// 多组相机参数的误差统计（度）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamComparison {
  pub roll_mean_deg: f64,
  pub roll_median_deg: f64,
  pub pitch_mean_deg: f64,
  pub pitch_median_deg: f64,
  pub vfov_mean_deg: f64,
  pub vfov_median_deg: f64,
  pub roll_within_threshold: f64,
  pub pitch_within_threshold: f64,
  pub vfov_within_threshold: f64,
}

// 滚转误差按圆周取最短差值
fn angle_error_deg(a: f64, b: f64) -> f64 {
  let d = (a - b).rem_euclid(360.0);
  d.min(360.0 - d)
}

/// 逐组比较预测参数与参考参数
pub fn compare_params(
  predicted: &[CameraParams],
  reference: &[CameraParams],
) -> Result<ParamComparison, PerspectiveError> {
  if predicted.len() != reference.len() {
    return Err(PerspectiveError::CountMismatch(predicted.len(), reference.len()));
  }
  if predicted.is_empty() {
    return Err(PerspectiveError::Empty);
  }

  let pairs = || predicted.iter().zip(reference);
  let mut roll: Vec<f64> = pairs().map(|(a, b)| angle_error_deg(a.roll_deg, b.roll_deg)).collect();
  let mut pitch: Vec<f64> = pairs().map(|(a, b)| (a.pitch_deg - b.pitch_deg).abs()).collect();
  let mut vfov: Vec<f64> = pairs().map(|(a, b)| (a.vfov_deg - b.vfov_deg).abs()).collect();

  Ok(ParamComparison {
    roll_mean_deg: mean(&roll),
    pitch_mean_deg: mean(&pitch),
    vfov_mean_deg: mean(&vfov),
    roll_within_threshold: fraction_within(&roll, ANGLE_THRESHOLD_DEG),
    pitch_within_threshold: fraction_within(&pitch, ANGLE_THRESHOLD_DEG),
    vfov_within_threshold: fraction_within(&vfov, ANGLE_THRESHOLD_DEG),
    roll_median_deg: median(&mut roll),
    pitch_median_deg: median(&mut pitch),
    vfov_median_deg: median(&mut vfov),
  })
}
