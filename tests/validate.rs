// 该文件是 Shanan （山南西风） 项目的一部分。
// tests/validate.rs - 批量验证流程测试
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

use std::{convert::Infallible, path::Path};

use serde_json::Value;
use shanan_grid::{
  input::{Dataset, ImageLoader, ImageMeta, LoadedImage},
  model::{CategoryTable, DetectionLayout, Model},
  output::CocoJsonOutput,
  pipeline::{LoadPolicy, PrefetchPipeline},
  task::{Task, ValidateTask},
};

const SIDE: usize = 7;
const CLASSES: usize = 81;

/// 不读文件，只根据文件名给出固定尺寸
struct FakeLoader {
  width: u32,
  height: u32,
}

impl ImageLoader for FakeLoader {
  type Input = u64;
  type Error = std::io::Error;

  fn load(&self, path: &Path) -> Result<LoadedImage<u64>, Self::Error> {
    let id = shanan_grid::output::coco_image_id(path)
      .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
    Ok(LoadedImage {
      meta: ImageMeta {
        path: path.to_path_buf(),
        width: self.width,
        height: self.height,
      },
      input: id,
    })
  }
}

/// 在第 `(row, col)` 个单元的第 `class` 类放置一个检测
struct OneCellModel {
  layout: DetectionLayout,
  row: usize,
  col: usize,
  class: usize,
  score: f32,
  params: [f32; 4],
}

impl OneCellModel {
  fn tensor(&self) -> Vec<f32> {
    let mut data = vec![0.0; self.layout.expected_len()];
    let per_box = self.layout.per_box_width();
    let start = (self.row * SIDE + self.col) * per_box;
    data[start + self.class] = self.score;
    data[start + CLASSES..start + CLASSES + 4].copy_from_slice(&self.params);
    data
  }
}

impl Model for OneCellModel {
  type Input = u64;
  type Error = Infallible;

  fn infer(&self, _input: &u64) -> Result<Box<[f32]>, Self::Error> {
    Ok(self.tensor().into())
  }
}

fn model(layout: DetectionLayout) -> OneCellModel {
  OneCellModel {
    layout,
    row: 2,
    col: 3,
    class: 5,
    score: 0.3,
    params: [0.5, 0.5, 0.2, 0.2],
  }
}

#[test]
fn single_detection_end_to_end() {
  let layout = DetectionLayout::new(SIDE, CLASSES);
  let dataset = Dataset::from_paths(["val/COCO_val2014_000000000042.jpg"]);
  let pipeline = PrefetchPipeline::new(
    FakeLoader {
      width: 416,
      height: 416,
    },
    dataset,
    4,
  )
  .unwrap();

  let mut output =
    CocoJsonOutput::new(Vec::new(), CategoryTable::coco_dense(CLASSES), CLASSES).unwrap();
  let report = ValidateTask::new(layout)
    .with_threshold(0.2)
    .run_task(pipeline, model(layout), &mut output)
    .unwrap();
  assert_eq!(report.images, 1);
  assert_eq!(report.detections, 1);
  assert!(!report.interrupted);

  let value: Value = serde_json::from_slice(&output.into_inner()).unwrap();
  let records = value.as_array().unwrap();
  assert_eq!(records.len(), 1);

  let record = &records[0];
  assert_eq!(record["image_id"], 42);
  assert_eq!(CategoryTable::coco_dense(CLASSES).id(5), Some(6));
  assert_eq!(record["category_id"], 6);
  assert!((record["score"].as_f64().unwrap() - 0.3).abs() < 1e-6);

  let bbox: Vec<f64> = record["bbox"]
    .as_array()
    .unwrap()
    .iter()
    .map(|v| v.as_f64().unwrap())
    .collect();
  // 中心 (3.5 / 7 * 416, 2.5 / 7 * 416)，边长 0.04 * 416
  let side = 0.04 * 416.0;
  assert!((bbox[0] - (208.0 - side / 2.0)).abs() < 1e-3);
  assert!((bbox[1] - (2.5 / 7.0 * 416.0 - side / 2.0)).abs() < 1e-3);
  assert!((bbox[2] - side).abs() < 1e-3);
  assert!((bbox[3] - side).abs() < 1e-3);
  assert!(bbox[0] >= 0.0 && bbox[0] + bbox[2] <= 416.0);
  assert!(bbox[1] >= 0.0 && bbox[1] + bbox[3] <= 416.0);
}

#[test]
fn index_past_the_coco_ids_is_never_emitted() {
  let layout = DetectionLayout::new(SIDE, CLASSES);
  let dataset = Dataset::from_paths(["COCO_val2014_000000000001.jpg"]);
  let pipeline = PrefetchPipeline::new(
    FakeLoader {
      width: 100,
      height: 100,
    },
    dataset,
    1,
  )
  .unwrap();

  let mut output =
    CocoJsonOutput::new(Vec::new(), CategoryTable::coco_dense(CLASSES), CLASSES).unwrap();
  let report = ValidateTask::new(layout)
    .run_task(
      pipeline,
      OneCellModel {
        class: 80,
        score: 0.9,
        ..model(layout)
      },
      &mut output,
    )
    .unwrap();
  // 检测保留在矩阵中，但最后一个索引没有外部 id
  assert_eq!(report.detections, 1);
  assert_eq!(output.records(), 0);

  let value: Value = serde_json::from_slice(&output.into_inner()).unwrap();
  assert_eq!(value.as_array().map(Vec::len), Some(0));
}

#[test]
fn dense_index_maps_to_same_position_coco_id() {
  let layout = DetectionLayout::new(SIDE, CLASSES);
  let dataset = Dataset::from_paths(["COCO_val2014_000000000003.jpg"]);
  let pipeline = PrefetchPipeline::new(
    FakeLoader {
      width: 100,
      height: 100,
    },
    dataset,
    1,
  )
  .unwrap();

  let mut output =
    CocoJsonOutput::new(Vec::new(), CategoryTable::coco_dense(CLASSES), CLASSES).unwrap();
  ValidateTask::new(layout)
    .run_task(
      pipeline,
      OneCellModel {
        class: 3,
        ..model(layout)
      },
      &mut output,
    )
    .unwrap();

  let value: Value = serde_json::from_slice(&output.into_inner()).unwrap();
  assert_eq!(value[0]["category_id"], 4);
}

#[test]
fn results_follow_dataset_order_across_windows() {
  let layout = DetectionLayout::new(SIDE, CLASSES);
  let ids: Vec<u64> = (1..=10).map(|i| i * 11).collect();
  let dataset = Dataset::from_paths(ids.iter().map(|id| format!("img_{id}.jpg")));
  let pipeline = PrefetchPipeline::new(
    FakeLoader {
      width: 64,
      height: 48,
    },
    dataset,
    3,
  )
  .unwrap();

  let mut output =
    CocoJsonOutput::new(Vec::new(), CategoryTable::coco_dense(CLASSES), CLASSES).unwrap();
  let report = ValidateTask::new(layout)
    .run_task(pipeline, model(layout), &mut output)
    .unwrap();
  assert_eq!(report.images, 10);

  let value: Value = serde_json::from_slice(&output.into_inner()).unwrap();
  let emitted: Vec<u64> = value
    .as_array()
    .unwrap()
    .iter()
    .map(|r| r["image_id"].as_u64().unwrap())
    .collect();
  assert_eq!(emitted, ids);
}

#[test]
fn empty_dataset_still_writes_valid_output() {
  let layout = DetectionLayout::new(SIDE, CLASSES);
  let pipeline = PrefetchPipeline::new(
    FakeLoader {
      width: 64,
      height: 64,
    },
    Dataset::default(),
    8,
  )
  .unwrap();

  let mut output =
    CocoJsonOutput::new(Vec::new(), CategoryTable::coco_dense(CLASSES), CLASSES).unwrap();
  let report = ValidateTask::new(layout)
    .run_task(pipeline, model(layout), &mut output)
    .unwrap();
  assert_eq!(report.images, 0);

  let value: Value = serde_json::from_slice(&output.into_inner()).unwrap();
  assert_eq!(value, Value::Array(Vec::new()));
}

#[test]
fn unreadable_items_fail_or_skip_by_policy() {
  let layout = DetectionLayout::new(SIDE, CLASSES);
  let dataset = Dataset::from_paths(["a_1.jpg", "broken.jpg", "c_3.jpg"]);
  let loader = || FakeLoader {
    width: 32,
    height: 32,
  };

  let mut output =
    CocoJsonOutput::new(Vec::new(), CategoryTable::coco_dense(CLASSES), CLASSES).unwrap();
  let pipeline = PrefetchPipeline::new(loader(), dataset.clone(), 2).unwrap();
  assert!(
    ValidateTask::new(layout)
      .run_task(pipeline, model(layout), &mut output)
      .is_err()
  );

  let mut output =
    CocoJsonOutput::new(Vec::new(), CategoryTable::coco_dense(CLASSES), CLASSES).unwrap();
  let pipeline = PrefetchPipeline::new(loader(), dataset, 2)
    .unwrap()
    .with_policy(LoadPolicy::SkipAndLog);
  let report = ValidateTask::new(layout)
    .run_task(pipeline, model(layout), &mut output)
    .unwrap();
  assert_eq!(report.images, 2);
  assert_eq!(report.skipped, 1);
  assert_eq!(output.records(), 2);
}
