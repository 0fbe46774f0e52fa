// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/save_image_file.rs - 保存标注后的全景图
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

use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::PanoramaFrame,
  output::{Render, draw::Draw, ensure_parent, resolve_path},
  pipeline::PanoramaResult,
};

/// `image:///out/pano.png` 或 `image:///out/`（按全景图名称命名）；
/// 查询参数 `thickness=N` 设置线宽，`no_outline` 关闭轮廓线
pub struct SaveImageFileOutput {
  path: String,
  draw: Draw,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("无效的输出参数: {0}")]
  InvalidParameter(String),
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    let mut draw = Draw::default();
    for (key, value) in uri.query_pairs() {
      match key.as_ref() {
        "no_outline" => draw = draw.with_outline(false),
        "thickness" => {
          let thickness: u32 = value
            .parse()
            .map_err(|_| SaveImageFileError::InvalidParameter(format!("{} = '{}'", key, value)))?;
          draw = draw.with_thickness(thickness);
        }
        _ => {}
      }
    }
    Ok(SaveImageFileOutput {
      path: uri.path().to_string(),
      draw,
    })
  }
}

impl Render<PanoramaFrame, PanoramaResult> for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(&self, frame: &PanoramaFrame, result: &PanoramaResult) -> Result<(), Self::Error> {
    let mut image = frame.image.to_rgb8();
    self.draw.draw_spherical_detections(&mut image, result.detections());

    let path = resolve_path(&self.path, frame, "png");
    ensure_parent(&path)?;
    image.save(&path)?;
    info!("保存标注全景图到文件: {}", path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn parse(url: &str) -> Result<SaveImageFileOutput, SaveImageFileError> {
    SaveImageFileOutput::from_url(&Url::parse(url).unwrap())
  }

  #[test]
  fn thickness_comes_from_the_query() {
    assert!(parse("image:///out/pano.png?thickness=4&no_outline").is_ok());
    assert!(matches!(
      parse("image:///out/pano.png?thickness=wide"),
      Err(SaveImageFileError::InvalidParameter(_))
    ));
    assert!(matches!(
      parse("json:///out/pano.png"),
      Err(SaveImageFileError::SchemeMismatch(_))
    ));
  }
}
