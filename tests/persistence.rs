// 该文件是 Shanan （山南西风） 项目的一部分。
// tests/persistence.rs - 报告与图像输出
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

mod common;

use approx::assert_abs_diff_eq;
use url::Url;

use shanan_pano::{
  FromUrl,
  input::PanoramaFrame,
  output::{OutputWrapper, Render, load_report},
  pipeline::{PanoramaResult, Pipeline, PipelineConfig},
  sampler::SamplerConfig,
};

use common::{Disc, panorama, red_detector};

fn run(keep_view_frames: bool) -> (PanoramaFrame, PanoramaResult) {
  let mut config = PipelineConfig {
    sampler: SamplerConfig::default()
      .with_fov(120.0)
      .with_resolution(256, 256),
    keep_view_frames,
    ..PipelineConfig::default()
  };
  config.adapter.labels = red_detector().labels();
  let frame = PanoramaFrame::new(
    "room",
    panorama(&[Disc {
      yaw_deg: 0.0,
      pitch_deg: 0.0,
      radius_deg: 8.0,
    }]),
  );
  let result = Pipeline::new(config, red_detector())
    .unwrap()
    .run(&frame.image)
    .unwrap();
  (frame, result)
}

fn output(url: String) -> OutputWrapper {
  OutputWrapper::from_url(&Url::parse(&url).unwrap()).unwrap()
}

#[test]
fn report_round_trips_through_json() {
  let dir = tempfile::tempdir().unwrap();
  let (frame, result) = run(false);
  output(format!("json://{}/", dir.path().display()))
    .render_result(&frame, &result)
    .unwrap();

  let loaded = load_report(dir.path().join("room.json")).unwrap();
  let original = &result.report;
  assert_eq!(loaded.created_at, original.created_at);
  assert_eq!(loaded.source, original.source);
  assert_eq!(loaded.failures, original.failures);
  assert_eq!(loaded.views.len(), original.views.len());
  for (a, b) in loaded.views.iter().zip(&original.views) {
    assert_eq!(a.view.id(), b.view.id());
    assert_eq!(a.detections, b.detections);
    assert_abs_diff_eq!(a.view.yaw(), b.view.yaw(), epsilon = 1e-12);
    assert_abs_diff_eq!(a.view.pitch(), b.view.pitch(), epsilon = 1e-12);
  }

  assert_eq!(loaded.detections.len(), original.detections.len());
  for (a, b) in loaded.detections.iter().zip(&original.detections) {
    assert_eq!(a.provenance, b.provenance);
    assert_eq!(a.class_id, b.class_id);
    assert_eq!(a.label, b.label);
    assert_abs_diff_eq!(a.confidence, b.confidence);
    assert_abs_diff_eq!(a.region.yaw().start(), b.region.yaw().start(), epsilon = 1e-9);
    assert_abs_diff_eq!(a.region.yaw().extent(), b.region.yaw().extent(), epsilon = 1e-9);
    assert_abs_diff_eq!(a.region.pitch_min(), b.region.pitch_min(), epsilon = 1e-9);
    assert_abs_diff_eq!(a.region.pitch_max(), b.region.pitch_max(), epsilon = 1e-9);
    assert_eq!(a.outline.len(), b.outline.len());
  }
}

#[test]
fn annotated_panorama_is_saved() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("nested").join("annotated.png");
  let (frame, result) = run(false);
  output(format!("image://{}", path.display()))
    .render_result(&frame, &result)
    .unwrap();

  let saved = image::open(&path).unwrap();
  assert_eq!((saved.width(), saved.height()), (common::WIDTH, common::HEIGHT));
}

#[test]
fn directory_record_keeps_views_with_detections() {
  let dir = tempfile::tempdir().unwrap();
  let (frame, result) = run(true);
  let output = output(format!("folder://{}?record=name", dir.path().display()));
  assert!(output.needs_view_frames());
  output.render_result(&frame, &result).unwrap();

  // <年>/<月>/<日>/<时-分-秒>-room/
  let mut record = dir.path().to_path_buf();
  for _ in 0..4 {
    let entries: Vec<_> = std::fs::read_dir(&record)
      .unwrap()
      .map(|e| e.unwrap().path())
      .collect();
    assert_eq!(entries.len(), 1);
    record = entries[0].clone();
  }
  assert!(record.to_string_lossy().ends_with("-room"));

  assert!(record.join("panorama.png").exists());
  let text = std::fs::read_to_string(record.join("panorama.txt")).unwrap();
  assert!(text.starts_with("red, "));
  // 只有两个看到目标的视图被保存
  for id in [0, 3] {
    assert!(record.join(format!("view-{:02}.png", id)).exists());
    assert!(record.join(format!("view-{:02}.txt", id)).exists());
  }
  assert!(!record.join("view-01.png").exists());
}
