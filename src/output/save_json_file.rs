// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/save_json_file.rs - 保存 JSON 检测报告
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
  fs::File,
  io::{BufReader, BufWriter, Write},
  path::Path,
};

use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::PanoramaFrame,
  output::{Render, ensure_parent, resolve_path},
  pipeline::{PanoramaReport, PanoramaResult},
};

#[derive(Error, Debug)]
pub enum SaveJsonFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

/// `json:///out/report.json` 或 `json:///out/`
pub struct SaveJsonFileOutput {
  path: String,
}

impl FromUrlWithScheme for SaveJsonFileOutput {
  const SCHEME: &'static str = "json";
}

impl FromUrl for SaveJsonFileOutput {
  type Error = SaveJsonFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveJsonFileError::SchemeMismatch);
    }
    Ok(SaveJsonFileOutput {
      path: uri.path().to_string(),
    })
  }
}

impl Render<PanoramaFrame, PanoramaResult> for SaveJsonFileOutput {
  type Error = SaveJsonFileError;

  fn render_result(&self, frame: &PanoramaFrame, result: &PanoramaResult) -> Result<(), Self::Error> {
    let path = resolve_path(&self.path, frame, "json");
    ensure_parent(&path)?;
    let mut writer = BufWriter::new(File::create(&path)?);
    serde_json::to_writer_pretty(&mut writer, &result.report)?;
    writer.flush()?;
    info!(
      "保存检测报告到文件: {} ({} 个检测)",
      path.display(),
      result.report.detections.len()
    );
    Ok(())
  }
}

/// 读取之前保存的检测报告
pub fn load_report(path: impl AsRef<Path>) -> Result<PanoramaReport, SaveJsonFileError> {
  let reader = BufReader::new(File::open(path)?);
  Ok(serde_json::from_reader(reader)?)
}
