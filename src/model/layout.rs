// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/layout.rs - 网格预测张量布局
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

//! 每个网格单元的预测槽位布局为
//! `[门控?] 类别分数[C] 框参数[4]`，
//! 门控标量仅在模型带有 objectness 或显式背景类时存在。

use thiserror::Error;

const BOX_PARAMS: usize = 4;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum LayoutError {
  #[error("网格边长必须大于 0")]
  EmptyGrid,
  #[error("类别数量必须大于 0")]
  NoClasses,
  #[error(
    "预测张量长度不匹配: 期望 {expected} ({side}x{side} 个单元, 每单元 {per_box}), 实际 {actual}"
  )]
  LengthMismatch {
    side: usize,
    per_box: usize,
    expected: usize,
    actual: usize,
  },
}

/// 检测层的配置，对同一个模型保持不变
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionLayout {
  pub side: usize,
  pub classes: usize,
  pub objectness: bool,
  pub background: bool,
}

impl DetectionLayout {
  pub fn new(side: usize, classes: usize) -> Self {
    Self {
      side,
      classes,
      objectness: false,
      background: false,
    }
  }

  pub fn with_objectness(mut self, objectness: bool) -> Self {
    self.objectness = objectness;
    self
  }

  pub fn with_background(mut self, background: bool) -> Self {
    self.background = background;
    self
  }

  pub fn validate(&self) -> Result<(), LayoutError> {
    if self.side == 0 {
      return Err(LayoutError::EmptyGrid);
    }
    if self.classes == 0 {
      return Err(LayoutError::NoClasses);
    }
    Ok(())
  }

  /// 类别分数之前的门控标量个数（0 或 1）
  pub fn gate_width(&self) -> usize {
    usize::from(self.objectness || self.background)
  }

  pub fn per_box_width(&self) -> usize {
    BOX_PARAMS + self.classes + self.gate_width()
  }

  pub fn cells(&self) -> usize {
    self.side * self.side
  }

  pub fn expected_len(&self) -> usize {
    self.cells() * self.per_box_width()
  }
}

/// 扁平预测张量上的只读视图，构造时检查长度
#[derive(Debug, Clone, Copy)]
pub struct PredictionTensor<'a> {
  data: &'a [f32],
  layout: DetectionLayout,
}

impl<'a> PredictionTensor<'a> {
  pub fn new(data: &'a [f32], layout: DetectionLayout) -> Result<Self, LayoutError> {
    layout.validate()?;
    if data.len() != layout.expected_len() {
      return Err(LayoutError::LengthMismatch {
        side: layout.side,
        per_box: layout.per_box_width(),
        expected: layout.expected_len(),
        actual: data.len(),
      });
    }
    Ok(Self { data, layout })
  }

  pub fn layout(&self) -> &DetectionLayout {
    &self.layout
  }

  pub fn len(&self) -> usize {
    self.layout.cells()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn slot(&self, index: usize) -> Option<PredictionSlot<'a>> {
    let width = self.layout.per_box_width();
    let start = index.checked_mul(width)?;
    let chunk = self.data.get(start..start + width)?;
    Some(PredictionSlot::new(index, chunk, &self.layout))
  }

  pub fn slots(&self) -> impl ExactSizeIterator<Item = PredictionSlot<'a>> + 'a {
    let layout = self.layout;
    let data: &'a [f32] = self.data;
    data
      .chunks_exact(layout.per_box_width())
      .enumerate()
      .map(move |(index, chunk)| PredictionSlot::new(index, chunk, &layout))
  }
}

/// 单个网格单元的预测
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictionSlot<'a> {
  pub index: usize,
  pub row: usize,
  pub col: usize,
  /// objectness 值；仅有背景类时该标量不参与缩放
  pub objectness: Option<f32>,
  pub class_scores: &'a [f32],
  pub box_params: [f32; BOX_PARAMS],
}

impl<'a> PredictionSlot<'a> {
  fn new(index: usize, chunk: &'a [f32], layout: &DetectionLayout) -> Self {
    let gate = layout.gate_width();
    let (scores, params) = chunk[gate..].split_at(layout.classes);
    Self {
      index,
      row: index / layout.side,
      col: index % layout.side,
      objectness: layout.objectness.then(|| chunk[0]),
      class_scores: scores,
      box_params: [params[0], params[1], params[2], params[3]],
    }
  }

  /// 类别概率的缩放系数：objectness 按反向门控解释，即 `1 - objectness`
  pub fn scale(&self) -> f32 {
    self.objectness.map_or(1.0, |o| 1.0 - o)
  }
}
