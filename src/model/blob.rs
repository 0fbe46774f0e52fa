// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/blob.rs - 颜色区域检测器
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

use std::{collections::BTreeMap, str::FromStr};

use image::{GrayImage, Luma, RgbImage};
use imageproc::region_labelling::{Connectivity, connected_components};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{DetectItem, DetectResult, Detector},
};

#[derive(Error, Debug)]
pub enum BlobDetectorError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("检测器参数无效: {0}")]
  InvalidParameter(String),
  #[error("输入图像为空: {0}x{1}")]
  EmptyImage(u32, u32),
}

/// 一个目标类别：名称和目标颜色
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobClass {
  pub name: String,
  pub color: [u8; 3],
}

impl FromStr for BlobClass {
  type Err = BlobDetectorError;

  /// 解析 `name=r,g,b` 或 `name:r,g,b`
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let invalid = || BlobDetectorError::InvalidParameter(format!("类别定义 '{}' 应为 name=r,g,b", s));
    let (name, rgb) = s.split_once(['=', ':']).ok_or_else(invalid)?;
    if name.is_empty() {
      return Err(invalid());
    }
    let channels = rgb
      .split(',')
      .map(|c| c.trim().parse::<u8>())
      .collect::<Result<Vec<_>, _>>()
      .map_err(|_| invalid())?;
    let color: [u8; 3] = channels.try_into().map_err(|_| invalid())?;
    Ok(BlobClass {
      name: name.to_string(),
      color,
    })
  }
}

/// 按颜色阈值分割、连通域标记的简单检测器
///
/// 每个类别对应一个目标颜色；与目标颜色各通道差值均不超过 `tolerance`
/// 的像素组成前景，八连通域即为一个检测框。
#[derive(Debug, Clone)]
pub struct BlobDetector {
  classes: Vec<BlobClass>,
  tolerance: u8,
  min_area: u32,
  confidence: f32,
  reject_truncated: bool,
}

impl Default for BlobDetector {
  fn default() -> Self {
    Self {
      classes: Vec::new(),
      tolerance: 40,
      min_area: 16,
      confidence: 0.9,
      reject_truncated: true,
    }
  }
}

const BLOB_SCHEME: &str = "blob";

impl FromUrlWithScheme for BlobDetector {
  const SCHEME: &'static str = BLOB_SCHEME;
}

impl FromUrl for BlobDetector {
  type Error = BlobDetectorError;

  /// `blob:///?class=red:220,30,30&tolerance=40&min_area=16&confidence=0.9&keep_truncated=false`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != BLOB_SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        BLOB_SCHEME,
        url.scheme()
      );
      return Err(BlobDetectorError::SchemeMismatch);
    }

    let invalid = |key: &str, value: &str| {
      BlobDetectorError::InvalidParameter(format!("{} = '{}'", key, value))
    };

    let mut detector = BlobDetector::default();
    for (key, value) in url.query_pairs() {
      match key.as_ref() {
        "class" => detector.classes.push(value.parse()?),
        "tolerance" => {
          detector.tolerance = value.parse().map_err(|_| invalid(&key, &value))?;
        }
        "min_area" => {
          detector.min_area = value.parse().map_err(|_| invalid(&key, &value))?;
        }
        "confidence" => {
          let confidence: f32 = value.parse().map_err(|_| invalid(&key, &value))?;
          if !(0.0..=1.0).contains(&confidence) {
            return Err(invalid(&key, &value));
          }
          detector.confidence = confidence;
        }
        "keep_truncated" => {
          let keep: bool = value.parse().map_err(|_| invalid(&key, &value))?;
          detector.reject_truncated = !keep;
        }
        other => debug!("忽略未知的检测器参数: {}", other),
      }
    }
    Ok(detector)
  }
}

impl BlobDetector {
  pub fn with_class(mut self, class: BlobClass) -> Self {
    self.classes.push(class);
    self
  }

  pub fn with_tolerance(mut self, tolerance: u8) -> Self {
    self.tolerance = tolerance;
    self
  }

  pub fn with_min_area(mut self, min_area: u32) -> Self {
    self.min_area = min_area;
    self
  }

  pub fn with_confidence(mut self, confidence: f32) -> Self {
    self.confidence = confidence.clamp(0.0, 1.0);
    self
  }

  /// 是否丢弃接触图像边界（被视图截断）的区域
  pub fn with_reject_truncated(mut self, reject: bool) -> Self {
    self.reject_truncated = reject;
    self
  }

  pub fn classes(&self) -> &[BlobClass] {
    &self.classes
  }

  /// 按类别编号排列的类别名称
  pub fn labels(&self) -> Vec<String> {
    self.classes.iter().map(|c| c.name.clone()).collect()
  }

  fn mask(&self, image: &RgbImage, color: [u8; 3]) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
      let p = image.get_pixel(x, y);
      let close = p
        .0
        .iter()
        .zip(color)
        .all(|(&v, t)| v.abs_diff(t) <= self.tolerance);
      Luma([if close { 255 } else { 0 }])
    })
  }
}

/// 连通域的像素外接框
struct Extent {
  x_min: u32,
  y_min: u32,
  x_max: u32,
  y_max: u32,
  count: u32,
}

impl Detector for BlobDetector {
  type Output = DetectResult;
  type Error = BlobDetectorError;

  fn detect(&self, image: &RgbImage) -> Result<Self::Output, Self::Error> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
      return Err(BlobDetectorError::EmptyImage(width, height));
    }

    let mut items = Vec::new();
    for (class_id, class) in self.classes.iter().enumerate() {
      let mask = self.mask(image, class.color);
      let labels = connected_components(&mask, Connectivity::Eight, Luma([0u8]));

      let mut extents: BTreeMap<u32, Extent> = BTreeMap::new();
      for (x, y, label) in labels.enumerate_pixels() {
        if label[0] == 0 {
          continue;
        }
        extents
          .entry(label[0])
          .and_modify(|e| {
            e.x_min = e.x_min.min(x);
            e.y_min = e.y_min.min(y);
            e.x_max = e.x_max.max(x);
            e.y_max = e.y_max.max(y);
            e.count += 1;
          })
          .or_insert(Extent {
            x_min: x,
            y_min: y,
            x_max: x,
            y_max: y,
            count: 1,
          });
      }

      for e in extents.values() {
        if e.count < self.min_area {
          continue;
        }
        let truncated = e.x_min == 0 || e.y_min == 0 || e.x_max + 1 == width || e.y_max + 1 == height;
        if truncated && self.reject_truncated {
          debug!(
            "丢弃被截断的区域: 类别 {}, 像素框 ({}, {}) - ({}, {})",
            class.name, e.x_min, e.y_min, e.x_max, e.y_max
          );
          continue;
        }
        items.push(DetectItem {
          class_id: class_id as u32,
          score: self.confidence,
          bbox: [
            e.x_min as f32 / width as f32,
            e.y_min as f32 / height as f32,
            (e.x_max + 1) as f32 / width as f32,
            (e.y_max + 1) as f32 / height as f32,
          ],
        });
      }
    }

    Ok(DetectResult::normalized(items))
  }
}
