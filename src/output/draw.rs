// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/draw.rs - 检测结果可视化
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;

use crate::{
  model::{CategoryTable, GridDetections},
  output::Rect,
};

const DRAW_THRESHOLD: f32 = 0.2;

/// 色带：品红、蓝、青、绿、黄、红
const PALETTE: [[f32; 3]; 6] = [
  [1.0, 0.0, 1.0],
  [0.0, 0.0, 1.0],
  [0.0, 1.0, 1.0],
  [0.0, 1.0, 0.0],
  [1.0, 1.0, 0.0],
  [1.0, 0.0, 0.0],
];

/// 按类别在色带上线性插值，`classes` 个类别铺满整条色带
pub fn class_color(class: usize, classes: usize) -> Rgb<u8> {
  if classes == 0 {
    return Rgb([255, 0, 255]);
  }
  let ratio = (class.min(classes) as f32 / classes as f32) * (PALETTE.len() - 1) as f32;
  let lo = ratio.floor() as usize;
  let hi = ratio.ceil() as usize;
  let frac = ratio - lo as f32;
  let channel = |c: usize| {
    let v = (1.0 - frac) * PALETTE[lo][c] + frac * PALETTE[hi][c];
    (v * 255.0).round() as u8
  };
  Rgb([channel(0), channel(1), channel(2)])
}

pub struct Draw {
  threshold: f32,
  categories: Option<CategoryTable>,
}

impl Default for Draw {
  fn default() -> Self {
    Self::new()
  }
}

impl Draw {
  pub fn new() -> Self {
    Self {
      threshold: DRAW_THRESHOLD,
      categories: None,
    }
  }

  pub fn with_threshold(mut self, threshold: f32) -> Self {
    self.threshold = threshold;
    self
  }

  /// 最佳类别在表中没有条目（例如背景类）的单元不绘制
  pub fn with_categories(mut self, categories: CategoryTable) -> Self {
    self.categories = Some(categories);
    self
  }

  /// 在原图上绘制最高类别概率超过阈值的框，颜色随类别变化，边框粗细随概率增加
  ///
  /// 返回绘制的框数。
  pub fn draw_detections_on_image(&self, image: &mut RgbImage, detections: &GridDetections) -> usize {
    let (w, h) = (image.width() as f32, image.height() as f32);
    let mut drawn = 0;

    for (bbox, probs) in detections.iter() {
      let best = probs
        .iter()
        .copied()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(&b.1));
      let Some((class, score)) = best else {
        continue;
      };
      if score <= self.threshold {
        continue;
      }
      if let Some(categories) = &self.categories
        && categories.get(class).is_none()
      {
        continue;
      }

      let color = class_color(class, probs.len());
      let rect = Rect::from_center(bbox).clamp(w, h);
      let thickness = 1 + (score * 5.0) as u32;
      for t in 0..thickness {
        let width = (rect.w as u32).saturating_sub(2 * t);
        let height = (rect.h as u32).saturating_sub(2 * t);
        if width == 0 || height == 0 {
          break;
        }
        let r = imageproc::rect::Rect::at(rect.x as i32 + t as i32, rect.y as i32 + t as i32)
          .of_size(width, height);
        draw_hollow_rect_mut(image, r, color);
      }
      drawn += 1;
    }

    drawn
  }
}
