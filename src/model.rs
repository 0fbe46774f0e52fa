// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model.rs - 检测器能力接口
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

use image::RgbImage;
use serde::{Deserialize, Serialize};

/// 不透明的检测器：输入一张透视图，输出任意形状的原始检测结果
pub trait Detector {
  type Output: RawDetections;
  type Error: std::error::Error + Send + Sync + 'static;

  fn detect(&self, image: &RgbImage) -> Result<Self::Output, Self::Error>;
}

impl<D: Detector + ?Sized> Detector for &D {
  type Output = D::Output;
  type Error = D::Error;

  fn detect(&self, image: &RgbImage) -> Result<Self::Output, Self::Error> {
    (**self).detect(image)
  }
}

impl<D: Detector + ?Sized> Detector for Box<D> {
  type Output = D::Output;
  type Error = D::Error;

  fn detect(&self, image: &RgbImage) -> Result<Self::Output, Self::Error> {
    (**self).detect(image)
  }
}

/// 原始边界框的编码方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoxFormat {
  /// [x_min, y_min, x_max, y_max]，像素
  XyxyPixels,
  /// [x_min, y_min, x_max, y_max]，相对宽高归一化到 [0, 1]
  XyxyNormalized,
  /// [x_min, y_min, width, height]，像素
  XywhPixels,
  /// [x_min, y_min, width, height]，归一化
  XywhNormalized,
  /// [center_x, center_y, width, height]，像素
  CxcywhPixels,
  /// [center_x, center_y, width, height]，归一化
  CxcywhNormalized,
}

impl BoxFormat {
  /// 转换为像素坐标下的 [x_min, y_min, x_max, y_max]
  pub fn to_xyxy_pixels(self, bbox: [f32; 4], width: u32, height: u32) -> [f64; 4] {
    let [a, b, c, d] = bbox.map(f64::from);
    let (sx, sy) = match self {
      BoxFormat::XyxyNormalized | BoxFormat::XywhNormalized | BoxFormat::CxcywhNormalized => {
        (width as f64, height as f64)
      }
      _ => (1.0, 1.0),
    };
    let (a, b, c, d) = (a * sx, b * sy, c * sx, d * sy);
    match self {
      BoxFormat::XyxyPixels | BoxFormat::XyxyNormalized => [a, b, c, d],
      BoxFormat::XywhPixels | BoxFormat::XywhNormalized => [a, b, a + c, b + d],
      BoxFormat::CxcywhPixels | BoxFormat::CxcywhNormalized => {
        [a - c * 0.5, b - d * 0.5, a + c * 0.5, b + d * 0.5]
      }
    }
  }
}

/// 归一化前的单条检测
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
  pub bbox: [f32; 4],
  pub score: f32,
  pub class_id: u32,
}

/// 任何能描述自身边界框格式并给出 (框, 分数, 类别) 列表的输出
pub trait RawDetections {
  fn box_format(&self) -> BoxFormat;
  fn into_raw(self) -> Vec<RawDetection>;
}

#[derive(Debug, Clone)]
pub struct DetectItem {
  pub class_id: u32,
  pub score: f32,
  pub bbox: [f32; 4],
}

#[derive(Debug, Clone)]
pub struct DetectResult {
  pub format: BoxFormat,
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  /// 归一化 [x_min, y_min, x_max, y_max] 的结果
  pub fn normalized(items: Vec<DetectItem>) -> Self {
    Self {
      format: BoxFormat::XyxyNormalized,
      items: items.into_boxed_slice(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }
}

impl RawDetections for DetectResult {
  fn box_format(&self) -> BoxFormat {
    self.format
  }

  fn into_raw(self) -> Vec<RawDetection> {
    self
      .items
      .into_vec()
      .into_iter()
      .map(|item| RawDetection {
        bbox: item.bbox,
        score: item.score,
        class_id: item.class_id,
      })
      .collect()
  }
}

/// `(像素框 [x_min, y_min, x_max, y_max], 分数, 类别)` 列表
impl RawDetections for Vec<([f32; 4], f32, u32)> {
  fn box_format(&self) -> BoxFormat {
    BoxFormat::XyxyPixels
  }

  fn into_raw(self) -> Vec<RawDetection> {
    self
      .into_iter()
      .map(|(bbox, score, class_id)| RawDetection {
        bbox,
        score,
        class_id,
      })
      .collect()
  }
}

pub mod blob;
pub mod serial;
pub use self::blob::{BlobClass, BlobDetector, BlobDetectorError};
pub use self::serial::{SerialDetector, SerialDetectorError};
