// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/category.rs - 类别表
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

use std::{io::Read, path::Path, sync::Arc};

use serde::Deserialize;
use thiserror::Error;

/// COCO 数据集类别名称
pub const COCO_CLASSES: [&str; 80] = [
  "person",
  "bicycle",
  "car",
  "motorcycle",
  "airplane",
  "bus",
  "train",
  "truck",
  "boat",
  "traffic light",
  "fire hydrant",
  "stop sign",
  "parking meter",
  "bench",
  "bird",
  "cat",
  "dog",
  "horse",
  "sheep",
  "cow",
  "elephant",
  "bear",
  "zebra",
  "giraffe",
  "backpack",
  "umbrella",
  "handbag",
  "tie",
  "suitcase",
  "frisbee",
  "skis",
  "snowboard",
  "sports ball",
  "kite",
  "baseball bat",
  "baseball glove",
  "skateboard",
  "surfboard",
  "tennis racket",
  "bottle",
  "wine glass",
  "cup",
  "fork",
  "knife",
  "spoon",
  "bowl",
  "banana",
  "apple",
  "sandwich",
  "orange",
  "broccoli",
  "carrot",
  "hot dog",
  "pizza",
  "donut",
  "cake",
  "chair",
  "couch",
  "potted plant",
  "bed",
  "dining table",
  "toilet",
  "tv",
  "laptop",
  "mouse",
  "remote",
  "keyboard",
  "cell phone",
  "microwave",
  "oven",
  "toaster",
  "sink",
  "refrigerator",
  "book",
  "clock",
  "vase",
  "scissors",
  "teddy bear",
  "hair drier",
  "toothbrush",
];

/// COCO 官方类别 id，与 [`COCO_CLASSES`] 一一对应；被移除的类别留下了空号
#[rustfmt::skip]
pub const COCO_IDS: [u32; 80] = [
  1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 14, 15, 16, 17, 18, 19, 20, 21,
  22, 23, 24, 25, 27, 28, 31, 32, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44,
  46, 47, 48, 49, 50, 51, 52, 53, 54, 55, 56, 57, 58, 59, 60, 61, 62, 63, 64, 65,
  67, 70, 72, 73, 74, 75, 76, 77, 78, 79, 80, 81, 82, 84, 85, 86, 87, 88, 89, 90,
];

#[derive(Error, Debug)]
pub enum CategoryError {
  #[error("类别 id 必须从 1 开始, 第 {index} 项为 0")]
  ZeroId { index: usize },
  #[error("类别表有 {actual} 项, 模型输出 {expected} 个类别")]
  ClassCountMismatch { expected: usize, actual: usize },
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("类别表解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// 外部类别
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Category {
  pub id: u32,
  pub name: String,
}

/// 稠密类别索引到稀疏外部 id 的只读映射
///
/// 为 `None` 的项（例如向量内的背景类）永远不会输出。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryTable {
  entries: Arc<[Option<Category>]>,
}

impl CategoryTable {
  pub fn new(entries: Vec<Option<Category>>) -> Result<Self, CategoryError> {
    if let Some(index) = entries
      .iter()
      .position(|entry| matches!(entry, Some(Category { id: 0, .. })))
    {
      return Err(CategoryError::ZeroId { index });
    }
    Ok(Self {
      entries: entries.into(),
    })
  }

  fn coco_entries() -> impl Iterator<Item = Option<Category>> {
    COCO_IDS.iter().zip(COCO_CLASSES).map(|(&id, name)| {
      Some(Category {
        id,
        name: name.to_string(),
      })
    })
  }

  /// 80 类 COCO 表
  pub fn coco() -> Self {
    Self::coco_dense(COCO_IDS.len())
  }

  /// 检测结果使用的 COCO 表：索引 `j` 对应 `COCO_IDS[j]`
  ///
  /// 超出 80 的索引没有外部 id，不会输出。
  pub fn coco_dense(classes: usize) -> Self {
    Self {
      entries: Self::coco_entries()
        .chain(std::iter::repeat(None))
        .take(classes)
        .collect(),
    }
  }

  /// 81 类 COCO 名称表：索引 0 是向量内的背景类，用于打印和绘制
  pub fn coco_with_background() -> Self {
    Self {
      entries: std::iter::once(None).chain(Self::coco_entries()).collect(),
    }
  }

  /// 读取 JSON 数组，每项为 `{"id": 1, "name": "person"}` 或 `null`
  pub fn from_json_reader<R: Read>(reader: R) -> Result<Self, CategoryError> {
    let entries: Vec<Option<Category>> = serde_json::from_reader(reader)?;
    Self::new(entries)
  }

  pub fn from_json_file(path: &Path) -> Result<Self, CategoryError> {
    let file = std::fs::File::open(path)?;
    Self::from_json_reader(std::io::BufReader::new(file))
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn get(&self, class: usize) -> Option<&Category> {
    self.entries.get(class).and_then(Option::as_ref)
  }

  pub fn id(&self, class: usize) -> Option<u32> {
    self.get(class).map(|c| c.id)
  }

  pub fn name(&self, class: usize) -> Option<&str> {
    self.get(class).map(|c| c.name.as_str())
  }

  /// 表的长度必须与模型的类别数一致
  pub fn ensure_classes(&self, classes: usize) -> Result<(), CategoryError> {
    if self.len() != classes {
      return Err(CategoryError::ClassCountMismatch {
        expected: classes,
        actual: self.len(),
      });
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn coco_ids_are_sparse_and_one_based() {
    let table = CategoryTable::coco();
    assert_eq!(table.len(), 80);
    assert_eq!(table.id(0), Some(1));
    assert_eq!(table.id(11), Some(13));
    assert_eq!(table.id(79), Some(90));
    assert_eq!(table.name(79), Some("toothbrush"));
    assert_eq!(table.id(80), None);
    assert!(COCO_IDS.windows(2).all(|w| w[0] < w[1]));
  }

  #[test]
  fn dense_table_maps_index_to_same_position() {
    let table = CategoryTable::coco_dense(81);
    assert_eq!(table.len(), 81);
    assert_eq!(table.id(0), Some(1));
    assert_eq!(table.id(3), Some(4));
    assert_eq!(table.id(5), Some(6));
    assert_eq!(table.id(12), Some(14));
    assert_eq!(table.id(79), Some(90));
    assert_eq!(table.id(80), None);
    assert!(table.ensure_classes(81).is_ok());
    assert_eq!(CategoryTable::coco_dense(20).len(), 20);
    assert_eq!(CategoryTable::coco_dense(80), CategoryTable::coco());
  }

  #[test]
  fn background_variant_never_maps_index_zero() {
    let table = CategoryTable::coco_with_background();
    assert_eq!(table.len(), 81);
    assert_eq!(table.id(0), None);
    for j in 1..81 {
      assert_eq!(table.id(j), Some(COCO_IDS[j - 1]));
      assert_eq!(table.name(j), Some(COCO_CLASSES[j - 1]));
    }
  }

  #[test]
  fn json_table_with_gaps() {
    let json = r#"[null, {"id": 4, "name": "motorcycle"}, {"id": 9, "name": "boat"}]"#;
    let table = CategoryTable::from_json_reader(json.as_bytes()).unwrap();
    assert_eq!(table.len(), 3);
    assert_eq!(table.id(0), None);
    assert_eq!(table.id(1), Some(4));
    assert_eq!(table.name(2), Some("boat"));
    assert!(table.ensure_classes(3).is_ok());
    assert!(matches!(
      table.ensure_classes(80),
      Err(CategoryError::ClassCountMismatch {
        expected: 80,
        actual: 3
      })
    ));
  }

  #[test]
  fn zero_id_is_rejected() {
    let json = r#"[{"id": 1, "name": "a"}, {"id": 0, "name": "b"}]"#;
    assert!(matches!(
      CategoryTable::from_json_reader(json.as_bytes()),
      Err(CategoryError::ZeroId { index: 1 })
    ));
  }
}
