// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input.rs - 全景图输入
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

use thiserror::Error;

use crate::{FromUrl, FromUrlWithScheme, frame::EquirectImage};

/// 一张待处理的全景图及其名称（通常为文件名主干）
#[derive(Debug, Clone)]
pub struct PanoramaFrame {
  pub name: String,
  pub image: EquirectImage,
}

impl PanoramaFrame {
  pub fn new(name: impl Into<String>, image: EquirectImage) -> Self {
    Self {
      name: name.into(),
      image,
    }
  }
}

fn frame_name(path: &Path) -> String {
  path
    .file_stem()
    .map(|s| s.to_string_lossy().into_owned())
    .unwrap_or_else(|| "panorama".to_string())
}

#[cfg(feature = "read_image_file")]
mod read_image_file;
#[cfg(feature = "read_image_file")]
pub use self::read_image_file::{ImageFileInput, ImageFileInputError, load_image_file};

#[cfg(feature = "read_hdr_file")]
mod read_hdr_file;
#[cfg(feature = "read_hdr_file")]
pub use self::read_hdr_file::{HdrFileInput, HdrFileInputError, load_hdr_file};

#[cfg(feature = "read_folder")]
mod read_folder;
#[cfg(feature = "read_folder")]
pub use self::read_folder::{FolderInput, FolderInputError};

#[derive(Error, Debug)]
pub enum InputError {
  #[cfg(feature = "read_image_file")]
  #[error("图像文件输入错误: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[cfg(feature = "read_hdr_file")]
  #[error("HDR 文件输入错误: {0}")]
  HdrFileInputError(#[from] HdrFileInputError),
  #[cfg(feature = "read_folder")]
  #[error("目录输入错误: {0}")]
  FolderInputError(#[from] FolderInputError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

pub enum InputWrapper {
  #[cfg(feature = "read_image_file")]
  ReadImageFile(ImageFileInput),
  #[cfg(feature = "read_hdr_file")]
  ReadHdrFile(HdrFileInput),
  #[cfg(feature = "read_folder")]
  ReadFolder(FolderInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      #[cfg(feature = "read_image_file")]
      ImageFileInput::SCHEME => Ok(InputWrapper::ReadImageFile(ImageFileInput::from_url(url)?)),
      #[cfg(feature = "read_hdr_file")]
      HdrFileInput::SCHEME => Ok(InputWrapper::ReadHdrFile(HdrFileInput::from_url(url)?)),
      #[cfg(feature = "read_folder")]
      FolderInput::SCHEME => Ok(InputWrapper::ReadFolder(FolderInput::from_url(url)?)),
      _ => Err(InputError::SchemeMismatch),
    }
  }
}

impl Iterator for InputWrapper {
  type Item = PanoramaFrame;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      #[cfg(feature = "read_image_file")]
      InputWrapper::ReadImageFile(input) => input.next(),
      #[cfg(feature = "read_hdr_file")]
      InputWrapper::ReadHdrFile(input) => input.next(),
      #[cfg(feature = "read_folder")]
      InputWrapper::ReadFolder(input) => input.next(),
    }
  }
}
