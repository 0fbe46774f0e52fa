// 该文件是 Shanan （山南西风） 项目的一部分。
// src/adapter.rs - 检测结果归一化
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

use std::{
  any::Any,
  panic::{self, AssertUnwindSafe},
};

use image::RgbImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

use crate::{
  camera::TangentView,
  model::{Detector, RawDetections},
};

#[derive(Error, Debug)]
pub enum AdapterError {
  #[error("视图 {view} 检测失败: {source}")]
  DetectorFailure {
    view: u32,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },
  #[error("适配器配置无效: {0}")]
  InvalidConfiguration(String),
}

/// 单个视图内、以视图像素表示的检测
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewDetection {
  pub view_id: u32,
  /// [x_min, y_min, x_max, y_max]，视图像素
  pub bbox: [f64; 4],
  pub confidence: f32,
  pub class_id: u32,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub label: Option<String>,
}

impl ViewDetection {
  pub fn width(&self) -> f64 {
    self.bbox[2] - self.bbox[0]
  }

  pub fn height(&self) -> f64 {
    self.bbox[3] - self.bbox[1]
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
  /// 低于该置信度的检测被丢弃
  pub min_confidence: f32,
  /// 按类别编号排列的类别名称
  pub labels: Vec<String>,
}

impl Default for AdapterConfig {
  fn default() -> Self {
    Self {
      min_confidence: 0.25,
      labels: Vec::new(),
    }
  }
}

impl AdapterConfig {
  pub fn validate(&self) -> Result<(), AdapterError> {
    if !(0.0..=1.0).contains(&self.min_confidence) {
      return Err(AdapterError::InvalidConfiguration(format!(
        "最低置信度必须在 [0, 1] 内, 实际为 {}",
        self.min_confidence
      )));
    }
    Ok(())
  }
}

/// 把检测器的原始输出统一为视图像素坐标下的 `ViewDetection`
#[derive(Debug, Clone, Default)]
pub struct DetectorAdapter {
  config: AdapterConfig,
}

impl DetectorAdapter {
  pub fn new(config: AdapterConfig) -> Result<Self, AdapterError> {
    config.validate()?;
    Ok(Self { config })
  }

  pub fn config(&self) -> &AdapterConfig {
    &self.config
  }

  /// 调用检测器并归一化；检测器的错误不重试，直接上报。
  /// 检测器崩溃（panic）同样作为该视图的检测失败上报
  pub fn detect<D: Detector + ?Sized>(
    &self,
    detector: &D,
    view: &TangentView,
    image: &RgbImage,
  ) -> Result<Vec<ViewDetection>, AdapterError> {
    let raw = panic::catch_unwind(AssertUnwindSafe(|| detector.detect(image)))
      .map_err(|payload| AdapterError::DetectorFailure {
        view: view.id(),
        source: panic_message(&*payload).into(),
      })?
      .map_err(|e| AdapterError::DetectorFailure {
        view: view.id(),
        source: Box::new(e),
      })?;
    Ok(self.normalize(view, raw))
  }

  pub fn normalize<R: RawDetections>(&self, view: &TangentView, raw: R) -> Vec<ViewDetection> {
    let format = raw.box_format();
    let (width, height) = (view.width(), view.height());
    let (w, h) = (width as f64, height as f64);

    let detections: Vec<ViewDetection> = raw
      .into_raw()
      .into_iter()
      .filter_map(|item| {
        if item.score.is_nan() {
          trace!("视图 {}: 丢弃置信度为 NaN 的检测", view.id());
          return None;
        }
        let confidence = item.score.clamp(0.0, 1.0);
        if confidence < self.config.min_confidence {
          return None;
        }

        let [x0, y0, x1, y1] = format.to_xyxy_pixels(item.bbox, width, height);
        if ![x0, y0, x1, y1].iter().all(|v| v.is_finite()) {
          trace!("视图 {}: 丢弃坐标非有限的检测", view.id());
          return None;
        }
        let detection = ViewDetection {
          view_id: view.id(),
          bbox: [
            x0.min(x1).clamp(0.0, w),
            y0.min(y1).clamp(0.0, h),
            x0.max(x1).clamp(0.0, w),
            y0.max(y1).clamp(0.0, h),
          ],
          confidence,
          class_id: item.class_id,
          label: self.config.labels.get(item.class_id as usize).cloned(),
        };
        if detection.width() <= 0.0 || detection.height() <= 0.0 {
          trace!("视图 {}: 丢弃退化的检测框 {:?}", view.id(), detection.bbox);
          return None;
        }
        Some(detection)
      })
      .collect();

    debug!("视图 {}: 归一化后 {} 个检测", view.id(), detections.len());
    detections
  }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(message) = payload.downcast_ref::<&str>() {
    format!("检测器崩溃: {}", message)
  } else if let Some(message) = payload.downcast_ref::<String>() {
    format!("检测器崩溃: {}", message)
  } else {
    "检测器崩溃".to_string()
  }
}
