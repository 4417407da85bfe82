// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/grid.rs - 网格检测结果解码
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

use tracing::debug;

use crate::model::layout::{DetectionLayout, LayoutError, PredictionTensor};

/// 中心点形式的框，单位为原图像素
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BBox {
  pub x: f32,
  pub y: f32,
  pub w: f32,
  pub h: f32,
}

/// 一张图像的全部网格检测：每个单元一个框和一组稠密的类别概率
///
/// 低于阈值的概率置零而不删除，抑制阶段看到的始终是完整矩阵。
#[derive(Debug, Clone, PartialEq)]
pub struct GridDetections {
  classes: usize,
  boxes: Vec<BBox>,
  probs: Vec<f32>,
}

impl GridDetections {
  pub fn new(layout: &DetectionLayout) -> Self {
    Self {
      classes: layout.classes,
      boxes: vec![BBox::default(); layout.cells()],
      probs: vec![0.0; layout.cells() * layout.classes],
    }
  }

  pub fn len(&self) -> usize {
    self.boxes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.boxes.is_empty()
  }

  pub fn classes(&self) -> usize {
    self.classes
  }

  pub fn boxes(&self) -> &[BBox] {
    &self.boxes
  }

  pub fn probs(&self, index: usize) -> &[f32] {
    &self.probs[index * self.classes..(index + 1) * self.classes]
  }

  pub fn probs_mut(&mut self, index: usize) -> &mut [f32] {
    &mut self.probs[index * self.classes..(index + 1) * self.classes]
  }

  pub fn prob(&self, index: usize, class: usize) -> f32 {
    self.probs[index * self.classes + class]
  }

  pub fn set_prob(&mut self, index: usize, class: usize, prob: f32) {
    self.probs[index * self.classes + class] = prob;
  }

  pub fn iter(&self) -> impl Iterator<Item = (&BBox, &[f32])> {
    self.boxes.iter().zip(self.probs.chunks_exact(self.classes))
  }

  /// 非零概率的个数
  pub fn retained(&self) -> usize {
    self.probs.iter().filter(|&&p| p != 0.0).count()
  }

  fn reset(&mut self, layout: &DetectionLayout) {
    self.classes = layout.classes;
    self.boxes.clear();
    self.boxes.resize(layout.cells(), BBox::default());
    self.probs.clear();
    self.probs.resize(layout.cells() * layout.classes, 0.0);
  }
}

/// 把网格回归张量解码为原图坐标的框与阈值化后的类别概率
#[derive(Debug, Clone, Copy)]
pub struct GridDecoder {
  layout: DetectionLayout,
  threshold: f32,
}

impl GridDecoder {
  pub fn new(layout: DetectionLayout, threshold: f32) -> Result<Self, LayoutError> {
    layout.validate()?;
    Ok(Self { layout, threshold })
  }

  pub fn layout(&self) -> &DetectionLayout {
    &self.layout
  }

  pub fn threshold(&self) -> f32 {
    self.threshold
  }

  pub fn decode(
    &self,
    tensor: &[f32],
    width: u32,
    height: u32,
  ) -> Result<GridDetections, LayoutError> {
    let mut detections = GridDetections::new(&self.layout);
    self.decode_into(tensor, width, height, &mut detections)?;
    Ok(detections)
  }

  /// 与 [`GridDecoder::decode`] 相同，但复用调用方的缓冲区
  pub fn decode_into(
    &self,
    tensor: &[f32],
    width: u32,
    height: u32,
    out: &mut GridDetections,
  ) -> Result<(), LayoutError> {
    let tensor = PredictionTensor::new(tensor, self.layout)?;
    out.reset(&self.layout);

    let side = self.layout.side as f32;
    let (w, h) = (width as f32, height as f32);

    for slot in tensor.slots() {
      let scale = slot.scale();
      for (dst, &score) in out.probs_mut(slot.index).iter_mut().zip(slot.class_scores) {
        let prob = scale * score;
        *dst = if prob > self.threshold { prob } else { 0.0 };
      }

      let [bx, by, bw, bh] = slot.box_params;
      out.boxes[slot.index] = BBox {
        x: (bx + slot.col as f32) / side * w,
        y: (by + slot.row as f32) / side * h,
        w: bw.powi(2) * w,
        h: bh.powi(2) * h,
      };
    }

    debug!(
      "解码 {} 个网格单元, 保留 {} 个类别概率",
      out.len(),
      out.retained()
    );
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const EPS: f32 = 1e-4;

  fn close(a: f32, b: f32) -> bool {
    (a - b).abs() < EPS
  }

  /// 构造一个 2x2 网格、2 类的张量；每个单元的门控、分数与框参数由 `cell` 给出
  fn tensor(layout: &DetectionLayout, cell: impl Fn(usize) -> (f32, [f32; 2], [f32; 4])) -> Vec<f32> {
    let mut data = Vec::with_capacity(layout.expected_len());
    for i in 0..layout.cells() {
      let (gate, scores, params) = cell(i);
      if layout.gate_width() == 1 {
        data.push(gate);
      }
      data.extend_from_slice(&scores);
      data.extend_from_slice(&params);
    }
    data
  }

  #[test]
  fn decodes_boxes_and_probs_for_every_flag_combination() {
    let cell = |i: usize| (0.2, [0.5, 0.05], [0.5, 0.25, 0.5, 0.4 + 0.1 * i as f32]);
    for (objectness, background) in [(false, false), (true, false), (false, true), (true, true)] {
      let layout = DetectionLayout::new(2, 2)
        .with_objectness(objectness)
        .with_background(background);
      let data = tensor(&layout, cell);
      let decoder = GridDecoder::new(layout, 0.1).unwrap();
      let out = decoder.decode(&data, 200, 100).unwrap();

      let scale = if objectness { 0.8 } else { 1.0 };
      for i in 0..4 {
        let (row, col) = ((i / 2) as f32, (i % 2) as f32);
        let b = out.boxes()[i];
        assert!(close(b.x, (0.5 + col) / 2.0 * 200.0), "{objectness} {background} x");
        assert!(close(b.y, (0.25 + row) / 2.0 * 100.0), "{objectness} {background} y");
        assert!(close(b.w, 0.25 * 200.0));
        let bh = 0.4 + 0.1 * i as f32;
        assert!(close(b.h, bh * bh * 100.0));

        assert!(close(out.prob(i, 0), 0.5 * scale));
        // 0.05 低于阈值，置零而不删除
        assert_eq!(out.prob(i, 1), 0.0);
        assert_eq!(out.probs(i).len(), 2);
      }
    }
  }

  #[test]
  fn objectness_is_an_inverse_gate() {
    let layout = DetectionLayout::new(1, 2).with_objectness(true);
    let data = [0.9, 0.5, 0.5, 0.5, 0.5, 0.1, 0.1];
    let out = GridDecoder::new(layout, 0.0).unwrap().decode(&data, 10, 10).unwrap();
    assert!(close(out.prob(0, 0), 0.05));

    let data = [0.1, 0.5, 0.5, 0.5, 0.5, 0.1, 0.1];
    let out = GridDecoder::new(layout, 0.0).unwrap().decode(&data, 10, 10).unwrap();
    assert!(close(out.prob(0, 0), 0.45));
  }

  #[test]
  fn raising_threshold_never_retains_more() {
    let layout = DetectionLayout::new(3, 4).with_objectness(true);
    let data: Vec<f32> = (0..layout.expected_len())
      .map(|i| ((i * 37) % 101) as f32 / 100.0)
      .collect();

    let mut last = usize::MAX;
    for step in 0..=20 {
      let t = step as f32 * 0.05;
      let retained = GridDecoder::new(layout, t)
        .unwrap()
        .decode(&data, 64, 64)
        .unwrap()
        .retained();
      assert!(retained <= last, "threshold {t}: {retained} > {last}");
      last = retained;
    }
  }

  #[test]
  fn decode_into_reuses_and_clears_buffer() {
    let layout = DetectionLayout::new(1, 2);
    let decoder = GridDecoder::new(layout, 0.2).unwrap();
    let mut out = GridDetections::new(&layout);

    decoder
      .decode_into(&[0.9, 0.9, 0.5, 0.5, 0.1, 0.1], 10, 10, &mut out)
      .unwrap();
    assert_eq!(out.retained(), 2);

    decoder
      .decode_into(&[0.1, 0.1, 0.5, 0.5, 0.1, 0.1], 10, 10, &mut out)
      .unwrap();
    assert_eq!(out.retained(), 0);
  }

  #[test]
  fn wrong_length_is_a_configuration_error() {
    let decoder = GridDecoder::new(DetectionLayout::new(7, 80), 0.2).unwrap();
    assert!(matches!(
      decoder.decode(&[0.0; 10], 10, 10),
      Err(LayoutError::LengthMismatch { actual: 10, .. })
    ));
  }
}
