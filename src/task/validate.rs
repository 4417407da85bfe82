// 该文件是 Shanan （山南西风） 项目的一部分。
// src/task/validate.rs - 批量验证任务
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

use std::time::{Duration, Instant};

use anyhow::Context;
use tracing::{debug, info, warn};

use crate::{
  input::{ImageLoader, ImageMeta},
  model::{DetectionLayout, GridDecoder, GridDetections, Model, SortNms, Suppress},
  output::Render,
  pipeline::{PrefetchPipeline, Ready},
  task::{Task, interrupt_channel},
};

const VALIDATE_THRESHOLD: f32 = 0.01;
const VALIDATE_IOU_THRESHOLD: f32 = 0.5;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidateReport {
  /// 完成推理并写出的图像数
  pub images: usize,
  /// 抑制后保留的类别概率数
  pub detections: usize,
  /// 因加载失败跳过的图像数
  pub skipped: usize,
  pub interrupted: bool,
  pub elapsed: Duration,
}

/// 对整个数据集做推理并写出全部检测结果
pub struct ValidateTask<S = SortNms> {
  layout: DetectionLayout,
  threshold: f32,
  iou_threshold: Option<f32>,
  suppress: S,
  interrupt: bool,
}

impl ValidateTask {
  pub fn new(layout: DetectionLayout) -> Self {
    Self {
      layout,
      threshold: VALIDATE_THRESHOLD,
      iou_threshold: Some(VALIDATE_IOU_THRESHOLD),
      suppress: SortNms,
      interrupt: false,
    }
  }
}

impl<S> ValidateTask<S> {
  pub fn with_threshold(mut self, threshold: f32) -> Self {
    self.threshold = threshold;
    self
  }

  /// `None` 时跳过抑制阶段
  pub fn with_iou_threshold(mut self, iou_threshold: Option<f32>) -> Self {
    self.iou_threshold = iou_threshold;
    self
  }

  pub fn with_suppress<T: Suppress>(self, suppress: T) -> ValidateTask<T> {
    ValidateTask {
      layout: self.layout,
      threshold: self.threshold,
      iou_threshold: self.iou_threshold,
      suppress,
      interrupt: self.interrupt,
    }
  }

  /// 收到 Ctrl-C 后在当前窗口结束时停止，并正常结束输出
  pub fn with_interrupt(mut self, interrupt: bool) -> Self {
    self.interrupt = interrupt;
    self
  }
}

impl<L, M, O, S> Task<PrefetchPipeline<L>, M, O> for ValidateTask<S>
where
  L: ImageLoader,
  M: Model<Input = L::Input>,
  M::Error: std::error::Error + Send + Sync + 'static,
  O: Render<ImageMeta, GridDetections>,
  O::Error: std::error::Error + Send + Sync + 'static,
  S: Suppress,
{
  type Output = ValidateReport;
  type Error = anyhow::Error;

  fn run_task(
    self,
    mut input: PrefetchPipeline<L>,
    model: M,
    mut output: O,
  ) -> Result<Self::Output, Self::Error> {
    let decoder = GridDecoder::new(self.layout, self.threshold)?;
    let interrupt = if self.interrupt {
      Some(interrupt_channel()?)
    } else {
      None
    };

    info!(
      "开始验证: {} 张图像, 阈值 {}, IoU 阈值 {:?}",
      input.len(),
      self.threshold,
      self.iou_threshold
    );
    let start = Instant::now();
    let total = input.len();
    let mut report = ValidateReport::default();
    let mut detections = GridDetections::new(&self.layout);

    while let Some(window) = input.next() {
      for Ready { index, image } in window? {
        let tensor = model
          .infer(&image.input)
          .with_context(|| format!("推理失败: {}", image.meta.path.display()))?;
        decoder.decode_into(&tensor, image.meta.width, image.meta.height, &mut detections)?;
        if let Some(iou) = self.iou_threshold {
          self.suppress.suppress(&mut detections, iou);
        }
        output
          .render_result(&image.meta, &detections)
          .with_context(|| format!("写出结果失败: {}", image.meta.path.display()))?;

        debug!(
          "第 {} 项 {} 保留 {} 个检测",
          index,
          image.meta.path.display(),
          detections.retained()
        );
        report.images += 1;
        report.detections += detections.retained();
      }
      info!(
        "已处理 {}/{} 张图像, 耗时 {:.2?}",
        input.consumed(),
        total,
        start.elapsed()
      );

      if interrupt.as_ref().is_some_and(|rx| rx.try_recv().is_ok()) {
        warn!("中断信号接收，停止验证");
        report.interrupted = true;
        break;
      }
    }

    output.finish()?;
    report.skipped = input.skipped();
    report.elapsed = start.elapsed();
    info!("总检测时间: {:.2?}", report.elapsed);
    Ok(report)
  }
}
