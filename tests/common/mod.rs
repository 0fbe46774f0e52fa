// 该文件是 Shanan （山南西风） 项目的一部分。
// tests/common/mod.rs - 测试用的合成全景图
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

#![allow(dead_code)]

use image::{Rgb, RgbImage};
use shanan_pano::{
  frame::EquirectImage,
  geometry::{angular_distance_spherical, pixel_to_spherical},
  model::{BlobClass, BlobDetector},
};

pub const WIDTH: u32 = 1024;
pub const HEIGHT: u32 = 512;
pub const BACKGROUND: [u8; 3] = [120, 120, 120];
pub const RED: [u8; 3] = [220, 30, 30];

/// 球面上的圆形目标：中心 (yaw, pitch) 与角半径，均为度
#[derive(Debug, Clone, Copy)]
pub struct Disc {
  pub yaw_deg: f64,
  pub pitch_deg: f64,
  pub radius_deg: f64,
}

/// 灰色背景上画若干红色圆盘的等距柱状全景图
pub fn panorama(discs: &[Disc]) -> EquirectImage {
  let image = RgbImage::from_fn(WIDTH, HEIGHT, |x, y| {
    let p = pixel_to_spherical(x as f64 + 0.5, y as f64 + 0.5, WIDTH, HEIGHT);
    let inside = discs.iter().any(|d| {
      let center = (d.yaw_deg.to_radians(), d.pitch_deg.to_radians());
      angular_distance_spherical(p, center) <= d.radius_deg.to_radians()
    });
    Rgb(if inside { RED } else { BACKGROUND })
  });
  EquirectImage::from_rgb8(&image).expect("non-empty panorama")
}

pub fn red_detector() -> BlobDetector {
  BlobDetector::default().with_class(BlobClass {
    name: "red".to_string(),
    color: RED,
  })
}
