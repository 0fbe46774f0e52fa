// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/draw.rs - 检测结果可视化与文本记录
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

use std::f64::consts::TAU;

use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_hollow_rect_mut, draw_line_segment_mut},
  rect::Rect,
};

use crate::{
  adapter::ViewDetection,
  geometry::{SphericalRegion, spherical_to_pixel},
  mapper::SphericalDetection,
};

const PALETTE: [[u8; 3]; 8] = [
  [0, 0, 255],
  [255, 64, 0],
  [0, 200, 0],
  [255, 0, 200],
  [0, 200, 255],
  [255, 200, 0],
  [128, 0, 255],
  [255, 255, 255],
];

/// 按类别编号循环取色
pub fn class_color(class_id: u32) -> Rgb<u8> {
  Rgb(PALETTE[class_id as usize % PALETTE.len()])
}

pub struct Draw {
  thickness: u32,
  outline: bool,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      thickness: 2,
      outline: true,
    }
  }
}

impl Draw {
  pub fn with_thickness(mut self, thickness: u32) -> Self {
    self.thickness = thickness.max(1);
    self
  }

  /// 是否额外绘制映射时采样的轮廓线
  pub fn with_outline(mut self, outline: bool) -> Self {
    self.outline = outline;
    self
  }

  // 由外向内画若干层矩形，x/y 为像素坐标
  fn draw_rect(&self, image: &mut RgbImage, x0: f64, y0: f64, x1: f64, y1: f64, color: Rgb<u8>) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    let x_min = (x0.floor() as i32).clamp(0, w - 1);
    let y_min = (y0.floor() as i32).clamp(0, h - 1);
    let x_max = (x1.ceil() as i32 - 1).clamp(0, w - 1);
    let y_max = (y1.ceil() as i32 - 1).clamp(0, h - 1);

    for t in 0..self.thickness as i32 {
      let (left, top) = (x_min + t, y_min + t);
      let (right, bottom) = (x_max - t, y_max - t);
      if left >= right || top >= bottom {
        break;
      }
      let rect = Rect::at(left, top).of_size((right - left + 1) as u32, (bottom - top + 1) as u32);
      draw_hollow_rect_mut(image, rect, color);
    }
  }

  /// 在视图图像上绘制像素检测框
  pub fn draw_view_detections(&self, image: &mut RgbImage, detections: &[ViewDetection]) {
    for d in detections {
      let [x0, y0, x1, y1] = d.bbox;
      self.draw_rect(image, x0, y0, x1, y1, class_color(d.class_id));
    }
  }

  // 区域在等距柱状图上是矩形；跨越 ±π 时拆成左右两段
  fn draw_region(&self, image: &mut RgbImage, region: &SphericalRegion, color: Rgb<u8>) {
    let (w, h) = (image.width(), image.height());
    let (x_start, y_top) = spherical_to_pixel(region.yaw().start(), region.pitch_max(), w, h);
    let (_, y_bottom) = spherical_to_pixel(0.0, region.pitch_min(), w, h);
    let span = region.yaw().extent() / TAU * w as f64;
    let x_end = x_start + span;

    if x_end <= w as f64 {
      self.draw_rect(image, x_start, y_top, x_end, y_bottom, color);
    } else {
      self.draw_rect(image, x_start, y_top, w as f64, y_bottom, color);
      self.draw_rect(image, 0.0, y_top, x_end - w as f64, y_bottom, color);
    }
  }

  // 轮廓折线；相邻两点在图像上跨越接缝时不连线
  fn draw_outline(&self, image: &mut RgbImage, outline: &[(f64, f64)], color: Rgb<u8>) {
    let (w, h) = (image.width(), image.height());
    let points: Vec<(f32, f32)> = outline
      .iter()
      .map(|&(yaw, pitch)| {
        let (x, y) = spherical_to_pixel(yaw, pitch, w, h);
        (x as f32, y as f32)
      })
      .collect();
    for (i, &a) in points.iter().enumerate() {
      let b = points[(i + 1) % points.len()];
      if (a.0 - b.0).abs() < w as f32 * 0.5 {
        draw_line_segment_mut(image, a, b, color);
      }
    }
  }

  /// 在等距柱状全景图上绘制球面检测区域
  pub fn draw_spherical_detections(&self, image: &mut RgbImage, detections: &[SphericalDetection]) {
    for d in detections {
      let color = class_color(d.class_id);
      self.draw_region(image, &d.region, color);
      if self.outline && !d.outline.is_empty() {
        self.draw_outline(image, &d.outline, color);
      }
    }
  }
}

/// 把检测结果写成与图像同名的 txt 文件，每行一个检测
pub struct Record {
  pub label_with_name: bool,
}

impl Record {
  fn name(&self, label: Option<&str>, class_id: u32) -> String {
    match label {
      Some(label) if self.label_with_name => label.to_string(),
      _ => class_id.to_string(),
    }
  }

  /// `类别, 置信度, x_min, y_min, x_max, y_max`（视图像素）
  pub fn record_view(&self, detections: &[ViewDetection], path: &std::path::Path) -> Result<(), std::io::Error> {
    let records: Vec<String> = detections
      .iter()
      .map(|d| {
        format!(
          "{}, {:.4}, {:.2}, {:.2}, {:.2}, {:.2}",
          self.name(d.label.as_deref(), d.class_id),
          d.confidence,
          d.bbox[0],
          d.bbox[1],
          d.bbox[2],
          d.bbox[3]
        )
      })
      .collect();
    std::fs::write(path.with_extension("txt"), records.join("\n"))
  }

  /// `类别, 置信度, yaw_min, yaw_max, pitch_min, pitch_max, 来源视图`（角度）
  pub fn record_panorama(
    &self,
    detections: &[SphericalDetection],
    path: &std::path::Path,
  ) -> Result<(), std::io::Error> {
    let records: Vec<String> = detections
      .iter()
      .map(|d| {
        let views: Vec<String> = d.provenance.iter().map(u32::to_string).collect();
        format!(
          "{}, {:.4}, {:.2}, {:.2}, {:.2}, {:.2}, {}",
          self.name(d.label.as_deref(), d.class_id),
          d.confidence,
          d.region.yaw().start().to_degrees(),
          d.region.yaw().end().to_degrees(),
          d.region.pitch_min().to_degrees(),
          d.region.pitch_max().to_degrees(),
          views.join(" ")
        )
      })
      .collect();
    std::fs::write(path.with_extension("txt"), records.join("\n"))
  }
}
