// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/read_hdr_file.rs - Radiance HDR 环境贴图输入
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

use std::{fs::File, io::BufReader, path::Path};

use image::{DynamicImage, codecs::hdr::HdrDecoder};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{EquirectImage, FrameError, Transfer},
  input::{PanoramaFrame, frame_name},
};

#[derive(Error, Debug)]
pub enum HdrFileInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("HDR 解码错误: {0}")]
  DecodeError(#[from] image::ImageError),
  #[error("全景帧错误: {0}")]
  FrameError(#[from] FrameError),
  #[error("曝光参数无效: {0}")]
  InvalidExposure(String),
}

const READ_HDR_FILE_SCHEME: &str = "hdr";

/// 读取 Radiance HDR 文件
///
/// 文件头中的 EXPOSURE 表示像素已乘过的倍率：像素除以它还原为线性辐照度，
/// 显示曝光则乘回去，再乘上调用方给出的 `exposure`。
pub fn load_hdr_file(path: impl AsRef<Path>, exposure: f32) -> Result<EquirectImage, HdrFileInputError> {
  let path = path.as_ref();
  let decoder = HdrDecoder::new(BufReader::new(File::open(path)?))?;
  let file_exposure = decoder
    .metadata()
    .exposure
    .filter(|e| e.is_finite() && *e > 0.0)
    .unwrap_or(1.0);
  let mut pixels = DynamicImage::from_decoder(decoder)?.into_rgb32f();
  info!(
    "读取 HDR 全景图 {}: {}x{}, 文件曝光 {}",
    path.display(),
    pixels.width(),
    pixels.height(),
    file_exposure
  );

  if file_exposure != 1.0 {
    debug!("按文件曝光 {} 还原线性辐照度", file_exposure);
    for p in pixels.pixels_mut() {
      p.0.iter_mut().for_each(|c| *c /= file_exposure);
    }
  }
  Ok(EquirectImage::new(pixels, Transfer::Linear)?.with_exposure(file_exposure * exposure))
}

pub struct HdrFileInput {
  frame: Option<PanoramaFrame>,
}

impl FromUrlWithScheme for HdrFileInput {
  const SCHEME: &'static str = READ_HDR_FILE_SCHEME;
}

impl FromUrl for HdrFileInput {
  type Error = HdrFileInputError;

  /// `hdr:///path/to/pano.hdr?exposure=2.0`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != READ_HDR_FILE_SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        READ_HDR_FILE_SCHEME,
        url.scheme()
      );
      return Err(HdrFileInputError::SchemeMismatch);
    }

    let mut exposure = 1.0f32;
    for (k, v) in url.query_pairs() {
      if k == "exposure" {
        exposure = v
          .parse()
          .ok()
          .filter(|e: &f32| e.is_finite() && *e > 0.0)
          .ok_or_else(|| HdrFileInputError::InvalidExposure(v.to_string()))?;
      }
    }

    let path = Path::new(url.path());
    let image = load_hdr_file(path, exposure)?;
    Ok(HdrFileInput {
      frame: Some(PanoramaFrame::new(frame_name(path), image)),
    })
  }
}

impl Iterator for HdrFileInput {
  type Item = PanoramaFrame;

  fn next(&mut self) -> Option<Self::Item> {
    self.frame.take()
  }
}
