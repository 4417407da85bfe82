// 该文件是 Shanan （山南西风） 项目的一部分。
// src/pipeline.rs - 后台预取流水线
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

//! 每个工作线程最多只有一个进行中的加载。加载结果经容量为 1 的通道
//! 整体移交给消费者，消费者取走结果后才会向同一线程下发下一个加载，
//! 因此同一个缓冲区不会同时被两方持有。

use std::{
  path::PathBuf,
  sync::{Arc, mpsc},
  thread::{self, JoinHandle},
};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::input::{Dataset, ImageLoader, LoadedImage};

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("无法创建工作线程: {0}")]
  Spawn(#[source] std::io::Error),
  #[error("工作线程 {0} 已退出")]
  WorkerGone(String),
  #[error("工作线程 {0} 仍有进行中的加载")]
  SlotBusy(String),
  #[error("工作线程 {0} 没有进行中的加载")]
  Idle(String),
  #[error("至少需要一个工作线程")]
  NoWorkers,
  #[error("加载第 {index} 项 {path:?} 失败: {source}")]
  Load {
    index: usize,
    path: PathBuf,
    source: Box<dyn std::error::Error + Send + Sync>,
  },
}

/// 常驻后台线程，一次执行一个请求
///
/// `issue` 与 `wait` 必须交替调用：进行中时再次下发返回 [`PipelineError::SlotBusy`]，
/// 空闲时等待返回 [`PipelineError::Idle`]。
pub struct Worker<Req, T> {
  name: String,
  requests: Option<mpsc::Sender<Req>>,
  results: mpsc::Receiver<T>,
  handle: Option<JoinHandle<()>>,
  in_flight: bool,
}

impl<Req: Send + 'static, T: Send + 'static> Worker<Req, T> {
  pub fn spawn<F>(name: impl Into<String>, mut job: F) -> Result<Self, PipelineError>
  where
    F: FnMut(Req) -> T + Send + 'static,
  {
    let name = name.into();
    let (request_tx, request_rx) = mpsc::channel::<Req>();
    let (result_tx, result_rx) = mpsc::sync_channel::<T>(1);

    let handle = thread::Builder::new()
      .name(name.clone())
      .spawn(move || {
        for request in request_rx {
          if result_tx.send(job(request)).is_err() {
            break;
          }
        }
      })
      .map_err(PipelineError::Spawn)?;
    debug!("工作线程 {} 已启动", name);

    Ok(Self {
      name,
      requests: Some(request_tx),
      results: result_rx,
      handle: Some(handle),
      in_flight: false,
    })
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn is_busy(&self) -> bool {
    self.in_flight
  }

  pub fn issue(&mut self, request: Req) -> Result<(), PipelineError> {
    if self.in_flight {
      return Err(PipelineError::SlotBusy(self.name.clone()));
    }
    self
      .requests
      .as_ref()
      .ok_or_else(|| PipelineError::WorkerGone(self.name.clone()))?
      .send(request)
      .map_err(|_| PipelineError::WorkerGone(self.name.clone()))?;
    self.in_flight = true;
    Ok(())
  }

  /// 阻塞直到进行中的请求完成，并取走其结果
  pub fn wait(&mut self) -> Result<T, PipelineError> {
    if !self.in_flight {
      return Err(PipelineError::Idle(self.name.clone()));
    }
    let result = self
      .results
      .recv()
      .map_err(|_| PipelineError::WorkerGone(self.name.clone()))?;
    self.in_flight = false;
    Ok(result)
  }
}

impl<Req, T> Drop for Worker<Req, T> {
  fn drop(&mut self) {
    // 关闭请求通道，进行中的请求会执行完毕
    self.requests.take();
    if let Some(handle) = self.handle.take()
      && handle.join().is_err()
    {
      warn!("工作线程 {} 异常退出", self.name);
    }
  }
}

/// 加载失败时的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadPolicy {
  /// 返回错误，结束本次运行
  #[default]
  FailFast,
  /// 记录日志并跳过该项
  SkipAndLog,
}

/// 已加载完成、归消费者所有的一项
#[derive(Debug)]
pub struct Ready<I> {
  pub index: usize,
  pub image: LoadedImage<I>,
}

type LoadResult<L> = Result<LoadedImage<<L as ImageLoader>::Input>, <L as ImageLoader>::Error>;

/// `W` 个工作线程的预取流水线，按窗口输出数据集顺序的结果
///
/// 第 `i` 项总是由第 `i % W` 个线程加载。每取走一个结果，立即向该线程
/// 下发第 `i + W` 项，所以任一时刻最多有 `W` 个进行中的加载和 `W` 个
/// 待处理的结果。
pub struct PrefetchPipeline<L: ImageLoader> {
  dataset: Dataset,
  workers: Vec<Worker<usize, LoadResult<L>>>,
  policy: LoadPolicy,
  issued: usize,
  consumed: usize,
  skipped: usize,
}

impl<L: ImageLoader> PrefetchPipeline<L> {
  pub fn new(loader: L, dataset: Dataset, workers: usize) -> Result<Self, PipelineError> {
    if workers == 0 {
      return Err(PipelineError::NoWorkers);
    }

    let loader = Arc::new(loader);
    let mut pool = Vec::with_capacity(workers);
    for t in 0..workers {
      let loader = Arc::clone(&loader);
      let paths = dataset.clone();
      pool.push(Worker::spawn(
        format!("prefetch-{t}"),
        move |index: usize| loader.load(&paths.paths()[index]),
      )?);
    }

    let mut pipeline = Self {
      dataset,
      workers: pool,
      policy: LoadPolicy::default(),
      issued: 0,
      consumed: 0,
      skipped: 0,
    };
    pipeline.prime()?;
    info!(
      "预取流水线启动: {} 个工作线程, {} 张图像",
      workers,
      pipeline.len()
    );
    Ok(pipeline)
  }

  pub fn with_policy(mut self, policy: LoadPolicy) -> Self {
    self.policy = policy;
    self
  }

  fn prime(&mut self) -> Result<(), PipelineError> {
    while self.issued < self.len() && self.issued < self.workers.len() {
      self.issue_next()?;
    }
    Ok(())
  }

  fn issue_next(&mut self) -> Result<(), PipelineError> {
    let index = self.issued;
    let t = index % self.workers.len();
    self.workers[t].issue(index)?;
    self.issued += 1;
    Ok(())
  }

  pub fn len(&self) -> usize {
    self.dataset.len()
  }

  pub fn is_empty(&self) -> bool {
    self.dataset.is_empty()
  }

  pub fn window_size(&self) -> usize {
    self.workers.len()
  }

  /// 已被消费者取走（包括被跳过）的项数
  pub fn consumed(&self) -> usize {
    self.consumed
  }

  pub fn skipped(&self) -> usize {
    self.skipped
  }

  pub fn is_finished(&self) -> bool {
    self.consumed >= self.len()
  }

  /// 等待下一个窗口的全部加载，并在取走每个结果后立即补发下一项
  ///
  /// 数据集耗尽后返回空窗口。
  pub fn next_window(&mut self) -> Result<Vec<Ready<L::Input>>, PipelineError> {
    let start = self.consumed;
    let end = (start + self.window_size()).min(self.len());
    let mut window = Vec::with_capacity(end - start);

    for index in start..end {
      let t = index % self.workers.len();
      let loaded = self.workers[t].wait()?;
      self.consumed = index + 1;
      if self.issued < self.len() {
        self.issue_next()?;
      }

      match loaded {
        Ok(image) => window.push(Ready { index, image }),
        Err(e) => {
          let path = self.dataset.paths()[index].clone();
          match self.policy {
            LoadPolicy::FailFast => {
              return Err(PipelineError::Load {
                index,
                path,
                source: Box::new(e),
              });
            }
            LoadPolicy::SkipAndLog => {
              warn!("跳过无法加载的图像 {}: {}", path.display(), e);
              self.skipped += 1;
            }
          }
        }
      }
    }

    Ok(window)
  }
}

impl<L: ImageLoader> Iterator for PrefetchPipeline<L> {
  type Item = Result<Vec<Ready<L::Input>>, PipelineError>;

  fn next(&mut self) -> Option<Self::Item> {
    while !self.is_finished() {
      match self.next_window() {
        Ok(window) if window.is_empty() => continue,
        result => return Some(result),
      }
    }
    None
  }
}
