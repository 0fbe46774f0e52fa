// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

use std::path::{Path, PathBuf};

use chrono::{Datelike, Utc};
use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  FromUrl, FromUrlWithScheme,
  adapter::ViewDetection,
  input::PanoramaFrame,
  mapper::SphericalDetection,
  output::{
    Render,
    draw::{Draw, Record},
  },
  pipeline::{PanoramaResult, ViewFrame},
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 保存方式：画框后保存，或保存原图并写 txt 记录
pub enum DrawWrapper {
  Draw(Draw),
  Record(Record),
}

impl DrawWrapper {
  pub fn with(kind: Option<&str>) -> Self {
    match kind {
      Some("id") => DrawWrapper::Record(Record {
        label_with_name: false,
      }),
      Some(_) => DrawWrapper::Record(Record {
        label_with_name: true,
      }),
      None => DrawWrapper::Draw(Draw::default()),
    }
  }

  fn save_panorama(
    &self,
    path: &Path,
    mut image: RgbImage,
    detections: &[SphericalDetection],
  ) -> Result<(), DirectoryRecordOutputError> {
    match self {
      DrawWrapper::Draw(draw) => {
        draw.draw_spherical_detections(&mut image, detections);
        image.save(path)?;
      }
      DrawWrapper::Record(record) => {
        image.save(path)?;
        record.record_panorama(detections, path)?;
      }
    }
    Ok(())
  }

  fn save_view(
    &self,
    path: &Path,
    image: &RgbImage,
    detections: &[ViewDetection],
  ) -> Result<(), DirectoryRecordOutputError> {
    match self {
      DrawWrapper::Draw(draw) => {
        let mut image = image.clone();
        draw.draw_view_detections(&mut image, detections);
        image.save(path)?;
      }
      DrawWrapper::Record(record) => {
        image.save(path)?;
        record.record_view(detections, path)?;
      }
    }
    Ok(())
  }
}

/// 按日期归档：`<目录>/<年>/<月>/<日>/<时-分-秒>-<名称>/`
///
/// 目录中保存全景图 `panorama.png` 以及每个视图 `view-<编号>.png`。
/// 查询参数 `record=id|name` 改为保存原图和 txt 记录；`always` 时没有检测的视图也会保存。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  draw: DrawWrapper,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let kind = uri
      .query_pairs()
      .find(|(k, _)| k == "record")
      .map(|(_, v)| v.into_owned());
    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(uri.path()),
      draw: DrawWrapper::with(kind.as_deref()),
      always,
    })
  }
}

impl DirectoryRecordOutput {
  fn record_directory(&self, name: &str) -> Result<PathBuf, DirectoryRecordOutputError> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()))
      .join(format!("{}-{}", now.format("%H-%M-%S"), name));
    std::fs::create_dir_all(&directory)?;
    Ok(directory)
  }

  fn save_frame(&self, directory: &Path, frame: &ViewFrame) -> Result<bool, DirectoryRecordOutputError> {
    if !self.always && frame.detections.is_empty() {
      return Ok(false);
    }
    let path = directory.join(format!("view-{:02}.png", frame.view.id()));
    self.draw.save_view(&path, &frame.image, &frame.detections)?;
    debug!("保存视图 {} 到 {}", frame.view.id(), path.display());
    Ok(true)
  }
}

impl Render<PanoramaFrame, PanoramaResult> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &PanoramaFrame, result: &PanoramaResult) -> Result<(), Self::Error> {
    if !self.always && result.detections().is_empty() {
      debug!("全景图 {} 没有检测, 不记录", frame.name);
      return Ok(());
    }

    let directory = self.record_directory(&frame.name)?;
    self
      .draw
      .save_panorama(&directory.join("panorama.png"), frame.image.to_rgb8(), result.detections())?;

    let mut saved = 0;
    for view in &result.frames {
      if self.save_frame(&directory, view)? {
        saved += 1;
      }
    }
    info!("记录全景图 {} 到 {}, 含 {} 个视图", frame.name, directory.display(), saved);
    Ok(())
  }
}
