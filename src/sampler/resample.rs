// 该文件是 Shanan （山南西风） 项目的一部分。
// src/sampler/resample.rs - 从全景图重采样切平面视图
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

use image::{ImageBuffer, Rgb, Rgb32FImage};

use crate::{camera::TangentView, frame::EquirectImage, geometry::spherical_to_pixel};

/// 在连续像素坐标 (x, y) 处双线性插值
///
/// 水平方向按宽度折返，垂直方向截断到首末行。
pub fn sample_bilinear(pixels: &Rgb32FImage, x: f64, y: f64) -> Rgb<f32> {
  let (width, height) = pixels.dimensions();
  let fx = x - 0.5;
  let fy = (y - 0.5).clamp(0.0, (height - 1) as f64);

  let x0 = fx.floor();
  let tx = (fx - x0) as f32;
  let x0 = (x0 as i64).rem_euclid(width as i64) as u32;
  let x1 = (x0 + 1) % width;

  let y0 = fy.floor();
  let ty = (fy - y0) as f32;
  let y0 = y0 as u32;
  let y1 = (y0 + 1).min(height - 1);

  let p00 = pixels.get_pixel(x0, y0);
  let p10 = pixels.get_pixel(x1, y0);
  let p01 = pixels.get_pixel(x0, y1);
  let p11 = pixels.get_pixel(x1, y1);

  let mut out = [0f32; 3];
  for (c, value) in out.iter_mut().enumerate() {
    let top = p00[c] * (1.0 - tx) + p10[c] * tx;
    let bottom = p01[c] * (1.0 - tx) + p11[c] * tx;
    *value = top * (1.0 - ty) + bottom * ty;
  }
  Rgb(out)
}

/// 渲染一个切平面视图：像素中心 → 针孔光线 → 世界方向 → (yaw, pitch) → 全景像素
pub fn render_view(view: &TangentView, pano: &EquirectImage) -> Rgb32FImage {
  let (pw, ph) = (pano.width(), pano.height());
  ImageBuffer::from_fn(view.width(), view.height(), |i, j| {
    let (yaw, pitch) = view.pixel_to_spherical(i as f64 + 0.5, j as f64 + 0.5);
    let (x, y) = spherical_to_pixel(yaw, pitch, pw, ph);
    sample_bilinear(pano.pixels(), x, y)
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::frame::Transfer;
  use approx::assert_abs_diff_eq;

  #[test]
  fn bilinear_wraps_horizontally() {
    let pixels = Rgb32FImage::from_fn(4, 2, |x, _| Rgb([x as f32, 0.0, 0.0]));
    // 最右侧像素中心与最左侧像素中心之间
    let p = sample_bilinear(&pixels, 4.0, 1.0);
    assert_abs_diff_eq!(p[0], 1.5);
    let p = sample_bilinear(&pixels, 0.0, 1.0);
    assert_abs_diff_eq!(p[0], 1.5);
  }

  #[test]
  fn bilinear_clamps_vertically() {
    let pixels = Rgb32FImage::from_fn(2, 3, |_, y| Rgb([y as f32, 0.0, 0.0]));
    assert_abs_diff_eq!(sample_bilinear(&pixels, 1.0, -4.0)[0], 0.0);
    assert_abs_diff_eq!(sample_bilinear(&pixels, 1.0, 10.0)[0], 2.0);
    assert_abs_diff_eq!(sample_bilinear(&pixels, 1.0, 2.0)[0], 1.5);
  }

  #[test]
  fn rendered_view_follows_yaw() {
    // 左半球为 0，右半球为 1
    let pixels = Rgb32FImage::from_fn(64, 32, |x, _| {
      let v = if x >= 32 { 1.0 } else { 0.0 };
      Rgb([v, v, v])
    });
    let pano = EquirectImage::new(pixels, Transfer::Srgb).unwrap();
    let right = TangentView::new(0, 1.2, 0.0, 0.0, 60f64.to_radians(), 16, 16);
    let left = TangentView::new(1, -1.2, 0.0, 0.0, 60f64.to_radians(), 16, 16);
    assert!(render_view(&right, &pano).pixels().all(|p| p[0] > 0.99));
    assert!(render_view(&left, &pano).pixels().all(|p| p[0] < 0.01));
  }
}
