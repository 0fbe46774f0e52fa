// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/read_image_file.rs - 普通图像文件输入
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

use std::path::Path;

use image::ImageReader;
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{EquirectImage, FrameError},
  input::{PanoramaFrame, frame_name},
};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("Frame error: {0}")]
  FrameError(#[from] FrameError),
}

const READ_IMAGE_FILE_SCHEME: &str = "image";

/// 读取 8 位图像（PNG / JPEG 等）作为全景图
pub fn load_image_file(path: impl AsRef<Path>) -> Result<EquirectImage, ImageFileInputError> {
  let path = path.as_ref();
  let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
  info!(
    "读取全景图 {}: {}x{}",
    path.display(),
    image.width(),
    image.height()
  );
  Ok(EquirectImage::from_rgb8(&image.into_rgb8())?)
}

pub struct ImageFileInput {
  frame: Option<PanoramaFrame>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = READ_IMAGE_FILE_SCHEME;
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != READ_IMAGE_FILE_SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        READ_IMAGE_FILE_SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    let path = Path::new(url.path());
    let image = load_image_file(path)?;

    Ok(ImageFileInput {
      frame: Some(PanoramaFrame::new(frame_name(path), image)),
    })
  }
}

impl Iterator for ImageFileInput {
  type Item = PanoramaFrame;

  fn next(&mut self) -> Option<Self::Item> {
    self.frame.take()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{Rgb, RgbImage};

  #[test]
  fn reads_png_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("room.png");
    RgbImage::from_pixel(16, 8, Rgb([10, 20, 30]))
      .save(&path)
      .unwrap();

    let url = Url::from_file_path(&path).unwrap();
    let url = Url::parse(&format!("image://{}", url.path())).unwrap();
    let mut input = ImageFileInput::from_url(&url).unwrap();
    let frame = input.next().unwrap();
    assert_eq!(frame.name, "room");
    assert_eq!(frame.image.width(), 16);
    assert_eq!(frame.image.to_rgb8().get_pixel(3, 3), &Rgb([10, 20, 30]));
    assert!(input.next().is_none());
  }

  #[test]
  fn rejects_other_schemes() {
    let url = Url::parse("hdr:///tmp/x.hdr").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(ImageFileInputError::SchemaMismatch)
    ));
  }
}
