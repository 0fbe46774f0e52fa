// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/read_folder.rs - 目录批量输入
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
  collections::VecDeque,
  path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::EquirectImage,
  input::{PanoramaFrame, frame_name},
};

#[derive(Error, Debug)]
pub enum FolderInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("目录中没有可读取的全景图: {0}")]
  Empty(String),
}

const READ_FOLDER_SCHEME: &str = "folder";
const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "hdr"];

/// 依次读取目录中的全部全景图（按文件名排序）；读取失败的文件记录后跳过
pub struct FolderInput {
  pending: VecDeque<PathBuf>,
}

impl FromUrlWithScheme for FolderInput {
  const SCHEME: &'static str = READ_FOLDER_SCHEME;
}

impl FromUrl for FolderInput {
  type Error = FolderInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != READ_FOLDER_SCHEME {
      return Err(FolderInputError::SchemeMismatch);
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(url.path())?
      .filter_map(|entry| entry.ok().map(|e| e.path()))
      .filter(|path| {
        path.is_file()
          && path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
      })
      .collect();
    if files.is_empty() {
      return Err(FolderInputError::Empty(url.path().to_string()));
    }
    files.sort();
    info!("目录 {} 中共有 {} 张全景图", url.path(), files.len());

    Ok(FolderInput {
      pending: files.into(),
    })
  }
}

fn load(path: &Path) -> Result<EquirectImage, Box<dyn std::error::Error + Send + Sync>> {
  let is_hdr = path
    .extension()
    .is_some_and(|ext| ext.eq_ignore_ascii_case("hdr"));
  if is_hdr {
    #[cfg(feature = "read_hdr_file")]
    return Ok(crate::input::load_hdr_file(path, 1.0)?);
    #[cfg(not(feature = "read_hdr_file"))]
    return Err("未启用 HDR 输入".into());
  }
  #[cfg(feature = "read_image_file")]
  return Ok(crate::input::load_image_file(path)?);
  #[cfg(not(feature = "read_image_file"))]
  Err("未启用图像文件输入".into())
}

impl Iterator for FolderInput {
  type Item = PanoramaFrame;

  fn next(&mut self) -> Option<Self::Item> {
    while let Some(path) = self.pending.pop_front() {
      match load(&path) {
        Ok(image) => return Some(PanoramaFrame::new(frame_name(&path), image)),
        Err(e) => error!("跳过无法读取的文件 {}: {}", path.display(), e),
      }
    }
    None
  }
}

#[cfg(all(test, feature = "read_image_file"))]
mod tests {
  use super::*;
  use image::{Rgb, RgbImage};

  #[test]
  fn reads_sorted_and_skips_broken_files() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["b.png", "a.png"] {
      RgbImage::from_pixel(8, 4, Rgb([1, 2, 3]))
        .save(dir.path().join(name))
        .unwrap();
    }
    std::fs::write(dir.path().join("c.jpg"), b"not a jpeg").unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

    let url = Url::parse(&format!("folder://{}", dir.path().display())).unwrap();
    let names: Vec<String> = FolderInput::from_url(&url).unwrap().map(|f| f.name).collect();
    assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
  }

  #[test]
  fn empty_folder_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let url = Url::parse(&format!("folder://{}", dir.path().display())).unwrap();
    assert!(matches!(
      FolderInput::from_url(&url),
      Err(FolderInputError::Empty(_))
    ));
  }
}
