// 该文件是 Shanan （山南西风） 项目的一部分。
// src/frame.rs - 等距柱状全景帧定义
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

use image::{ImageBuffer, Rgb, Rgb32FImage, RgbImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// HDR 图像转 8 位时使用的显示伽马
const DISPLAY_GAMMA: f32 = 2.2;

#[derive(Error, Debug)]
pub enum FrameError {
  #[error("全景图尺寸无效: {0}x{1}")]
  EmptyImage(u32, u32),
}

/// 像素值的传递函数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transfer {
  /// 普通照片，数值已经是显示编码（0.0 - 1.0）
  Srgb,
  /// HDR 环境贴图，线性辐照度
  Linear,
}

/// 等距柱状投影的全景图
///
/// 宽度按约定为高度的两倍；水平位置线性对应 yaw ∈ [-π, π)，
/// 垂直位置线性对应 pitch ∈ [π/2, -π/2]（自上而下）。
#[derive(Debug, Clone)]
pub struct EquirectImage {
  pixels: Rgb32FImage,
  transfer: Transfer,
  exposure: f32,
}

impl EquirectImage {
  pub fn new(pixels: Rgb32FImage, transfer: Transfer) -> Result<Self, FrameError> {
    let (width, height) = pixels.dimensions();
    if width == 0 || height == 0 {
      return Err(FrameError::EmptyImage(width, height));
    }
    if width != 2 * height {
      warn!(
        "全景图宽高比不是 2:1 ({}x{})，仍按等距柱状投影处理",
        width, height
      );
    }
    Ok(Self {
      pixels,
      transfer,
      exposure: 1.0,
    })
  }

  /// 由 8 位 RGB 图像构造（显示编码）
  pub fn from_rgb8(image: &RgbImage) -> Result<Self, FrameError> {
    let pixels = ImageBuffer::from_fn(image.width(), image.height(), |x, y| {
      let p = image.get_pixel(x, y);
      Rgb([
        p[0] as f32 / 255.0,
        p[1] as f32 / 255.0,
        p[2] as f32 / 255.0,
      ])
    });
    Self::new(pixels, Transfer::Srgb)
  }

  /// 设置曝光倍率（仅在转换为 8 位图像时生效）
  pub fn with_exposure(mut self, exposure: f32) -> Self {
    if exposure.is_finite() && exposure > 0.0 {
      self.exposure = exposure;
    } else {
      warn!("忽略无效的曝光倍率: {}", exposure);
    }
    self
  }

  pub fn width(&self) -> u32 {
    self.pixels.width()
  }

  pub fn height(&self) -> u32 {
    self.pixels.height()
  }

  pub fn pixels(&self) -> &Rgb32FImage {
    &self.pixels
  }

  pub fn transfer(&self) -> Transfer {
    self.transfer
  }

  pub fn exposure(&self) -> f32 {
    self.exposure
  }

  /// 转换为 8 位显示图像
  pub fn to_rgb8(&self) -> RgbImage {
    to_display_rgb8(&self.pixels, self.transfer, self.exposure)
  }
}

/// 浮点图像转换为 8 位显示图像；线性数据先乘曝光再做伽马编码
pub fn to_display_rgb8(pixels: &Rgb32FImage, transfer: Transfer, exposure: f32) -> RgbImage {
  let encode = |v: f32| -> u8 {
    let v = match transfer {
      Transfer::Srgb => v,
      Transfer::Linear => (v * exposure).max(0.0).powf(1.0 / DISPLAY_GAMMA),
    };
    if v.is_finite() {
      (v.clamp(0.0, 1.0) * 255.0).round() as u8
    } else {
      0
    }
  };

  ImageBuffer::from_fn(pixels.width(), pixels.height(), |x, y| {
    let p = pixels.get_pixel(x, y);
    Rgb([encode(p[0]), encode(p[1]), encode(p[2])])
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rejects_empty_image() {
    let pixels = Rgb32FImage::new(0, 0);
    assert!(matches!(
      EquirectImage::new(pixels, Transfer::Srgb),
      Err(FrameError::EmptyImage(0, 0))
    ));
  }

  #[test]
  fn rgb8_round_trip_is_lossless() {
    let image = RgbImage::from_fn(8, 4, |x, y| Rgb([(x * 30) as u8, (y * 60) as u8, 200]));
    let pano = EquirectImage::from_rgb8(&image).unwrap();
    assert_eq!(pano.to_rgb8(), image);
  }

  #[test]
  fn linear_values_are_exposed_and_clamped() {
    let pixels = Rgb32FImage::from_pixel(4, 2, Rgb([0.25, 4.0, f32::NAN]));
    let pano = EquirectImage::new(pixels, Transfer::Linear)
      .unwrap()
      .with_exposure(4.0);
    let p = *pano.to_rgb8().get_pixel(0, 0);
    assert_eq!(p, Rgb([255, 255, 0]));
  }
}
