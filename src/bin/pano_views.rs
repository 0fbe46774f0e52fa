// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/pano_views.rs - 只渲染切平面视图
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

use std::{fs::File, io::BufWriter, path::PathBuf};

use anyhow::Result;
use clap::Parser;
use rayon::prelude::*;
use serde::Serialize;
use tracing::info;
use url::Url;

use shanan_pano::{
  FromUrl,
  camera::TangentView,
  frame::to_display_rgb8,
  input::InputWrapper,
  perspective::{
    CameraParams, HorizonLine, PerspectiveField, VanishingPoint, horizon_line, recover_params,
    vertical_vanishing_point,
  },
  sampler::{SamplerConfig, TangentSampler},
};

/// 把全景图切分成切平面视图并保存，用于检查视图布局
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入来源
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出目录；每张全景图一个子目录
  #[arg(long, value_name = "DIR")]
  pub output: PathBuf,
  #[arg(long, default_value = "90", value_name = "DEGREES")]
  pub fov: f64,
  #[arg(long, default_value = "0.2", value_name = "RATIO")]
  pub overlap: f64,
  #[arg(long, default_value = "512", value_name = "PIXELS")]
  pub view_size: u32,
  #[arg(long)]
  pub no_pole_views: bool,
  /// 同时保存每个视图的纬度图
  #[arg(long)]
  pub latitude: bool,
}

#[derive(Serialize)]
struct ViewEntry<'a> {
  view: &'a TangentView,
  file: String,
  horizon: Option<HorizonLine>,
  vertical_vanishing_point: Option<VanishingPoint>,
  params: Option<CameraParams>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  let sampler = TangentSampler::new(
    SamplerConfig::default()
      .with_fov(args.fov)
      .with_overlap(args.overlap)
      .with_resolution(args.view_size, args.view_size)
      .with_pole_views(!args.no_pole_views),
  )?;

  for frame in InputWrapper::from_url(&args.input)? {
    let directory = args.output.join(&frame.name);
    std::fs::create_dir_all(&directory)?;

    let rendered = sampler.render_all(&frame.image);
    rendered
      .par_iter()
      .try_for_each(|(view, pixels)| -> Result<()> {
        let image = to_display_rgb8(pixels, frame.image.transfer(), frame.image.exposure());
        image.save(directory.join(format!("view-{:02}.png", view.id())))?;
        if args.latitude {
          PerspectiveField::compute(view)
            .latitude_image()
            .save(directory.join(format!("view-{:02}-latitude.png", view.id())))?;
        }
        Ok(())
      })?;

    let entries: Vec<ViewEntry> = sampler
      .views()
      .iter()
      .map(|view| ViewEntry {
        view,
        file: format!("view-{:02}.png", view.id()),
        horizon: horizon_line(view),
        vertical_vanishing_point: vertical_vanishing_point(view),
        params: recover_params(view),
      })
      .collect();
    serde_json::to_writer_pretty(
      BufWriter::new(File::create(directory.join("views.json"))?),
      &entries,
    )?;
    info!(
      "全景图 {}: {} 个视图保存到 {}",
      frame.name,
      entries.len(),
      directory.display()
    );
  }

  Ok(())
}
