// 该文件是 Shanan （山南西风） 项目的一部分。
// src/camera.rs - 切平面视图的针孔相机模型
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

use nalgebra::{Rotation3, Vector3};
use serde::{Deserialize, Serialize};

use crate::geometry::{spherical_to_unit_vector, unit_vector_to_spherical};

/// 相机坐标中深度小于该值的方向视为在相机背后
const MIN_DEPTH: f64 = 1e-9;

/// 虚拟针孔相机（切平面视图）
///
/// 相机坐标系：x 向右，y 向下，z 向前；像素 (i, j) 的中心为 (i + 0.5, j + 0.5)，
/// 主点位于图像中心。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "ViewParams", into = "ViewParams")]
pub struct TangentView {
  params: ViewParams,
  focal: f64,
  rotation: Rotation3<f64>,
}

/// 视图的可持久化参数，角度均为弧度
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewParams {
  pub id: u32,
  pub yaw: f64,
  pub pitch: f64,
  pub roll: f64,
  pub hfov: f64,
  pub width: u32,
  pub height: u32,
}

impl From<ViewParams> for TangentView {
  fn from(params: ViewParams) -> Self {
    let focal = params.width as f64 * 0.5 / (params.hfov * 0.5).tan();
    // 相机 → 世界：先绕前向轴滚转，再抬头（绕 x 轴取负角使 +pitch 朝上），最后绕 Y 轴偏航
    let rotation = Rotation3::from_axis_angle(&Vector3::y_axis(), params.yaw)
      * Rotation3::from_axis_angle(&Vector3::x_axis(), -params.pitch)
      * Rotation3::from_axis_angle(&Vector3::z_axis(), params.roll);
    Self {
      params,
      focal,
      rotation,
    }
  }
}

impl From<TangentView> for ViewParams {
  fn from(view: TangentView) -> Self {
    view.params
  }
}

impl PartialEq for TangentView {
  fn eq(&self, other: &Self) -> bool {
    self.params == other.params
  }
}

impl TangentView {
  pub fn new(id: u32, yaw: f64, pitch: f64, roll: f64, hfov: f64, width: u32, height: u32) -> Self {
    ViewParams {
      id,
      yaw,
      pitch,
      roll,
      hfov,
      width,
      height,
    }
    .into()
  }

  pub fn params(&self) -> &ViewParams {
    &self.params
  }

  pub fn id(&self) -> u32 {
    self.params.id
  }

  pub fn yaw(&self) -> f64 {
    self.params.yaw
  }

  pub fn pitch(&self) -> f64 {
    self.params.pitch
  }

  pub fn roll(&self) -> f64 {
    self.params.roll
  }

  pub fn hfov(&self) -> f64 {
    self.params.hfov
  }

  pub fn vfov(&self) -> f64 {
    2.0 * (self.params.height as f64 * 0.5 / self.focal).atan()
  }

  pub fn width(&self) -> u32 {
    self.params.width
  }

  pub fn height(&self) -> u32 {
    self.params.height
  }

  /// 焦距（像素）
  pub fn focal(&self) -> f64 {
    self.focal
  }

  pub fn principal_point(&self) -> (f64, f64) {
    (self.params.width as f64 * 0.5, self.params.height as f64 * 0.5)
  }

  pub fn rotation(&self) -> &Rotation3<f64> {
    &self.rotation
  }

  /// 视图光轴在世界坐标中的方向
  pub fn axis(&self) -> Vector3<f64> {
    spherical_to_unit_vector(self.params.yaw, self.params.pitch)
  }

  /// 相机坐标（y 向下）转换为世界坐标
  pub fn camera_to_world(&self, cam: &Vector3<f64>) -> Vector3<f64> {
    self.rotation * Vector3::new(cam.x, -cam.y, cam.z)
  }

  /// 世界坐标转换为相机坐标（y 向下）
  pub fn world_to_camera(&self, world: &Vector3<f64>) -> Vector3<f64> {
    let aligned = self.rotation.inverse_transform_vector(world);
    Vector3::new(aligned.x, -aligned.y, aligned.z)
  }

  /// 连续像素坐标对应的世界方向（单位向量）
  pub fn pixel_to_ray(&self, u: f64, v: f64) -> Vector3<f64> {
    let (cx, cy) = self.principal_point();
    let cam = Vector3::new((u - cx) / self.focal, (v - cy) / self.focal, 1.0);
    self.camera_to_world(&cam).normalize()
  }

  /// 连续像素坐标对应的 (yaw, pitch)
  pub fn pixel_to_spherical(&self, u: f64, v: f64) -> (f64, f64) {
    unit_vector_to_spherical(&self.pixel_to_ray(u, v))
  }

  /// 世界方向投影到像素平面；方向在相机背后时返回 None，结果可能落在图像之外
  pub fn project(&self, world: &Vector3<f64>) -> Option<(f64, f64)> {
    let cam = self.world_to_camera(world);
    if cam.z <= MIN_DEPTH {
      return None;
    }
    let (cx, cy) = self.principal_point();
    Some((
      self.focal * cam.x / cam.z + cx,
      self.focal * cam.y / cam.z + cy,
    ))
  }

  /// 连续像素坐标是否在图像范围内（含边界）
  pub fn in_bounds(&self, u: f64, v: f64) -> bool {
    (0.0..=self.params.width as f64).contains(&u) && (0.0..=self.params.height as f64).contains(&v)
  }

  /// 世界方向是否落在视锥内
  pub fn sees(&self, world: &Vector3<f64>) -> bool {
    self
      .project(world)
      .map(|(u, v)| self.in_bounds(u, v))
      .unwrap_or(false)
  }
}
