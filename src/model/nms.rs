// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/nms.rs - 非极大值抑制
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

use crate::model::grid::{BBox, GridDetections};

/// 抑制阶段：原地把被支配的检测概率置零
pub trait Suppress {
  fn suppress(&self, detections: &mut GridDetections, iou_threshold: f32);
}

/// 按类别排序的非极大值抑制
#[derive(Debug, Clone, Copy, Default)]
pub struct SortNms;

impl Suppress for SortNms {
  fn suppress(&self, detections: &mut GridDetections, iou_threshold: f32) {
    let mut order: Vec<usize> = Vec::with_capacity(detections.len());

    for class in 0..detections.classes() {
      // 按置信度降序排序
      order.clear();
      order.extend((0..detections.len()).filter(|&i| detections.prob(i, class) > 0.0));
      order.sort_by(|&a, &b| {
        detections
          .prob(b, class)
          .total_cmp(&detections.prob(a, class))
      });

      for (pos, &best) in order.iter().enumerate() {
        if detections.prob(best, class) == 0.0 {
          continue;
        }
        let best_box = detections.boxes()[best];
        for &other in &order[pos + 1..] {
          if iou(&best_box, &detections.boxes()[other]) > iou_threshold {
            detections.set_prob(other, class, 0.0);
          }
        }
      }
    }
  }
}

/// 计算两个中心点形式框的 IoU
pub fn iou(a: &BBox, b: &BBox) -> f32 {
  let x1 = (a.x - a.w / 2.0).max(b.x - b.w / 2.0);
  let y1 = (a.y - a.h / 2.0).max(b.y - b.h / 2.0);
  let x2 = (a.x + a.w / 2.0).min(b.x + b.w / 2.0);
  let y2 = (a.y + a.h / 2.0).min(b.y + b.h / 2.0);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let area_a = a.w * a.h;
  let area_b = b.w * b.h;
  let union = area_a + area_b - intersection;

  if union > 0.0 {
    intersection / union
  } else {
    0.0
  }
}
