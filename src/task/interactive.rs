// 该文件是 Shanan （山南西风） 项目的一部分。
// src/task/interactive.rs - 交互式单图推理
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

use std::{path::PathBuf, time::Instant};

use anyhow::Context;
use tracing::{debug, info};

use crate::{
  input::{ImageLoader, ImageMeta},
  model::{DetectionLayout, GridDecoder, GridDetections, Model, SortNms, Suppress},
  output::Render,
  task::Task,
};

const INTERACTIVE_THRESHOLD: f32 = 0.2;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InteractiveReport {
  pub images: usize,
}

/// 逐个读取路径，对每张图像推理一次并输出结果
///
/// 输入为单个文件名时只运行一次；从标准输入读取时直到 EOF 为止。
pub struct InteractiveTask<L, S = SortNms> {
  loader: L,
  layout: DetectionLayout,
  threshold: f32,
  iou_threshold: Option<f32>,
  suppress: S,
}

impl<L: ImageLoader> InteractiveTask<L> {
  pub fn new(loader: L, layout: DetectionLayout) -> Self {
    Self {
      loader,
      layout,
      threshold: INTERACTIVE_THRESHOLD,
      iou_threshold: None,
      suppress: SortNms,
    }
  }
}

impl<L, S> InteractiveTask<L, S> {
  pub fn with_threshold(mut self, threshold: f32) -> Self {
    self.threshold = threshold;
    self
  }

  pub fn with_iou_threshold(mut self, iou_threshold: Option<f32>) -> Self {
    self.iou_threshold = iou_threshold;
    self
  }

  pub fn with_suppress<T: Suppress>(self, suppress: T) -> InteractiveTask<L, T> {
    InteractiveTask {
      loader: self.loader,
      layout: self.layout,
      threshold: self.threshold,
      iou_threshold: self.iou_threshold,
      suppress,
    }
  }
}

impl<I, L, M, O, S> Task<I, M, O> for InteractiveTask<L, S>
where
  I: Iterator<Item = std::io::Result<PathBuf>>,
  L: ImageLoader,
  M: Model<Input = L::Input>,
  M::Error: std::error::Error + Send + Sync + 'static,
  O: Render<ImageMeta, GridDetections>,
  O::Error: std::error::Error + Send + Sync + 'static,
  S: Suppress,
{
  type Output = InteractiveReport;
  type Error = anyhow::Error;

  fn run_task(self, input: I, model: M, mut output: O) -> Result<Self::Output, Self::Error> {
    let decoder = GridDecoder::new(self.layout, self.threshold)?;
    let mut detections = GridDetections::new(&self.layout);
    let mut report = InteractiveReport::default();

    for path in input {
      let path = path.context("读取图像路径失败")?;
      if path.as_os_str().is_empty() {
        debug!("忽略空路径");
        continue;
      }

      let image = self
        .loader
        .load(&path)
        .with_context(|| format!("无法加载图像: {}", path.display()))?;
      let now = Instant::now();
      let tensor = model.infer(&image.input)?;
      info!(
        "{}: Predicted in {:.6} seconds.",
        path.display(),
        now.elapsed().as_secs_f64()
      );

      decoder.decode_into(&tensor, image.meta.width, image.meta.height, &mut detections)?;
      if let Some(iou) = self.iou_threshold {
        self.suppress.suppress(&mut detections, iou);
      }
      output.render_result(&image.meta, &detections)?;
      report.images += 1;
    }

    output.finish()?;
    info!("交互推理结束, 共 {} 张图像", report.images);
    Ok(report)
  }
}
