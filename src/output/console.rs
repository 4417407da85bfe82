// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/console.rs - 终端文本输出
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

use std::io::{Stdout, Write};

use crate::{
  input::ImageMeta,
  model::{CategoryTable, GridDetections},
  output::{OutputError, Render},
};

const PRINT_THRESHOLD: f32 = 0.2;

/// 每个网格单元打印一行 `score name`，只取概率最高的类别
pub struct ConsoleOutput<W = Stdout> {
  sink: W,
  categories: CategoryTable,
  threshold: f32,
}

impl ConsoleOutput {
  pub fn stdout(categories: CategoryTable) -> Self {
    Self::new(std::io::stdout(), categories)
  }
}

impl<W: Write> ConsoleOutput<W> {
  pub fn new(sink: W, categories: CategoryTable) -> Self {
    Self {
      sink,
      categories,
      threshold: PRINT_THRESHOLD,
    }
  }

  pub fn with_threshold(mut self, threshold: f32) -> Self {
    self.threshold = threshold;
    self
  }

  pub fn into_inner(self) -> W {
    self.sink
  }
}

impl<W: Write> Render<ImageMeta, GridDetections> for ConsoleOutput<W> {
  type Error = OutputError;

  fn render_result(&mut self, _frame: &ImageMeta, result: &GridDetections) -> Result<(), Self::Error> {
    for (_, probs) in result.iter() {
      let best = probs
        .iter()
        .copied()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(&b.1));
      let Some((class, prob)) = best else {
        continue;
      };
      if prob <= self.threshold {
        continue;
      }
      // 背景类没有名称
      if let Some(name) = self.categories.name(class) {
        writeln!(self.sink, "{:.6} {}", prob, name)?;
      }
    }
    self.sink.flush()?;
    Ok(())
  }
}
