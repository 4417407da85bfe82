// 该文件是 Shanan （山南西风） 项目的一部分。
// src/task/train.rs - 分阶段训练循环
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

//! 训练在后台线程上始终保持一个批次的加载，与当前批次的训练重叠。
//!
//! 第 `i` 次迭代（从 1 开始）后已训练 `s = i * batch` 个样本。`s` 第一次
//! 超过数据集大小的 80% 时保存 `first_stage` 检查点并结束运行；每 1000
//! 次迭代保存一次带迭代号的检查点；`s` 达到 120 遍数据集后保存 `final`。

use std::{
  path::{Path, PathBuf},
  time::Instant,
};

use anyhow::Context;
use thiserror::Error;
use tracing::{info, warn};

use crate::{input::BatchLoader, model::Trainer, pipeline::Worker, task::Task};

const DEFAULT_PASSES: u64 = 120;
const DEFAULT_FIRST_STAGE: f64 = 0.8;
const DEFAULT_CHECKPOINT_EVERY: u64 = 1000;
const LOSS_SMOOTHING: f32 = 0.9;

#[derive(Error, Debug)]
pub enum CheckpointError {
  #[error("批次大小必须大于 0")]
  ZeroBatch,
  #[error("无法创建检查点目录 {path:?}: {source}")]
  Directory {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("保存检查点 {path:?} 失败: {source}")]
  Save {
    path: PathBuf,
    source: Box<dyn std::error::Error + Send + Sync>,
  },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
  FirstStage,
  Iteration(u64),
  Final,
}

impl Checkpoint {
  pub fn file_name(&self, base: &str) -> String {
    match self {
      Checkpoint::FirstStage => format!("{base}_first_stage.weights"),
      Checkpoint::Iteration(i) => format!("{base}_{i}.weights"),
      Checkpoint::Final => format!("{base}_final.weights"),
    }
  }
}

/// 根据已训练样本数决定何时保存检查点、何时结束
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CheckpointPolicy {
  dataset_len: u64,
  batch: u64,
  passes: u64,
  every: u64,
  first_stage: Option<f64>,
}

impl CheckpointPolicy {
  pub fn new(dataset_len: u64, batch: u64) -> Result<Self, CheckpointError> {
    if batch == 0 {
      return Err(CheckpointError::ZeroBatch);
    }
    Ok(Self {
      dataset_len,
      batch,
      passes: DEFAULT_PASSES,
      every: DEFAULT_CHECKPOINT_EVERY,
      first_stage: Some(DEFAULT_FIRST_STAGE),
    })
  }

  /// 第一阶段的边界，以数据集遍数计；`80.0` 表示 80 遍
  pub fn with_first_stage(mut self, fraction: f64) -> Self {
    self.first_stage = Some(fraction);
    self
  }

  pub fn without_first_stage(mut self) -> Self {
    self.first_stage = None;
    self
  }

  pub fn with_passes(mut self, passes: u64) -> Self {
    self.passes = passes;
    self
  }

  /// 0 表示不保存周期检查点
  pub fn with_every(mut self, every: u64) -> Self {
    self.every = every;
    self
  }

  pub fn batch(&self) -> u64 {
    self.batch
  }

  /// 断点续训时的起始迭代号
  pub fn start_iteration(&self, seen: u64) -> u64 {
    seen / self.batch
  }

  /// 已完成 `iteration` 次迭代后是否还需继续
  pub fn should_continue(&self, iteration: u64) -> bool {
    iteration.saturating_mul(self.batch) < self.passes.saturating_mul(self.dataset_len)
  }

  /// 第 `iteration` 次迭代（从 1 开始）结束后应保存的检查点
  pub fn after_iteration(&self, iteration: u64) -> Option<Checkpoint> {
    if let Some(fraction) = self.first_stage
      && iteration > 0
    {
      let boundary = fraction * self.dataset_len as f64;
      let previous = ((iteration - 1) * self.batch) as f64;
      let current = (iteration * self.batch) as f64;
      if previous <= boundary && current > boundary {
        return Some(Checkpoint::FirstStage);
      }
    }
    if self.every > 0 && iteration > 0 && iteration % self.every == 0 {
      return Some(Checkpoint::Iteration(iteration));
    }
    None
  }
}

/// 平滑系数 0.9 的损失指数滑动平均，以第一个损失为初值
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LossAverage {
  value: Option<f32>,
}

impl LossAverage {
  pub fn update(&mut self, loss: f32) -> f32 {
    let avg = self.value.unwrap_or(loss) * LOSS_SMOOTHING + loss * (1.0 - LOSS_SMOOTHING);
    self.value = Some(avg);
    avg
  }

  pub fn value(&self) -> Option<f32> {
    self.value
  }
}

/// 检查点保存位置：`{directory}/{base}_*.weights`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointDir {
  directory: PathBuf,
  base: String,
}

impl CheckpointDir {
  pub fn new(directory: impl Into<PathBuf>, base: impl Into<String>) -> Self {
    Self {
      directory: directory.into(),
      base: base.into(),
    }
  }

  /// 以网络配置文件名（不含扩展名）作为前缀
  pub fn for_config(directory: impl Into<PathBuf>, config: &Path) -> Self {
    let base = config
      .file_stem()
      .map(|s| s.to_string_lossy().into_owned())
      .unwrap_or_else(|| "model".to_string());
    Self::new(directory, base)
  }

  pub fn path(&self, checkpoint: &Checkpoint) -> PathBuf {
    self.directory.join(checkpoint.file_name(&self.base))
  }

  fn save<T: Trainer>(&self, trainer: &T, checkpoint: &Checkpoint) -> Result<PathBuf, CheckpointError> {
    std::fs::create_dir_all(&self.directory).map_err(|source| CheckpointError::Directory {
      path: self.directory.clone(),
      source,
    })?;
    let path = self.path(checkpoint);
    trainer
      .save_weights(&path)
      .map_err(|e| CheckpointError::Save {
        path: path.clone(),
        source: Box::new(e),
      })?;
    info!("保存检查点: {}", path.display());
    Ok(path)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainStop {
  FirstStage,
  Final,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainReport {
  pub start_iteration: u64,
  pub iterations: u64,
  pub average_loss: Option<f32>,
  pub checkpoints: Vec<PathBuf>,
  pub stop: TrainStop,
}

pub struct TrainTask {
  policy: CheckpointPolicy,
}

impl TrainTask {
  pub fn new(policy: CheckpointPolicy) -> Self {
    Self { policy }
  }
}

impl<B, T> Task<B, T, CheckpointDir> for TrainTask
where
  B: BatchLoader,
  T: Trainer<Batch = B::Batch>,
{
  type Output = TrainReport;
  type Error = anyhow::Error;

  fn run_task(
    self,
    mut input: B,
    mut model: T,
    output: CheckpointDir,
  ) -> Result<Self::Output, Self::Error> {
    let policy = self.policy;
    let mut iteration = policy.start_iteration(model.seen());
    let mut average = LossAverage::default();
    let mut report = TrainReport {
      start_iteration: iteration,
      iterations: iteration,
      average_loss: None,
      checkpoints: Vec::new(),
      stop: TrainStop::Final,
    };
    info!(
      "开始训练: 从第 {} 次迭代开始, 批次大小 {}",
      iteration,
      policy.batch()
    );

    let mut loader = Worker::spawn("train-loader", move |()| input.load_batch())?;
    if policy.should_continue(iteration) {
      loader.issue(())?;
    }

    while policy.should_continue(iteration) {
      iteration += 1;
      let now = Instant::now();
      let batch = loader.wait()?.context("加载训练批次失败")?;
      if policy.should_continue(iteration) {
        loader.issue(())?;
      }
      let load_time = now.elapsed();

      let now = Instant::now();
      let loss = model.train(&batch)?;
      model.set_seen(model.seen() + policy.batch());
      let avg = average.update(loss);
      report.iterations = iteration;
      report.average_loss = Some(avg);
      info!(
        "{}: {:.6}, {:.6} avg, 加载 {:.2?}, 训练 {:.2?}, {} 张图像",
        iteration,
        loss,
        avg,
        load_time,
        now.elapsed(),
        iteration * policy.batch()
      );

      match policy.after_iteration(iteration) {
        Some(Checkpoint::FirstStage) => {
          warn!("第一阶段训练完成");
          report
            .checkpoints
            .push(output.save(&model, &Checkpoint::FirstStage)?);
          report.stop = TrainStop::FirstStage;
          return Ok(report);
        }
        Some(checkpoint) => report.checkpoints.push(output.save(&model, &checkpoint)?),
        None => {}
      }
    }

    report.checkpoints.push(output.save(&model, &Checkpoint::Final)?);
    info!("训练完成, 共 {} 次迭代", iteration);
    Ok(report)
  }
}
