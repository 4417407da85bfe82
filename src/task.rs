// 该文件是 Shanan （山南西风） 项目的一部分。
// src/task.rs - 任务定义
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

use std::{sync::mpsc, thread, time::Duration};
use tracing::{info, warn};

mod interactive;
mod train;
mod validate;

pub use self::interactive::{InteractiveReport, InteractiveTask};
pub use self::train::{
  Checkpoint, CheckpointDir, CheckpointError, CheckpointPolicy, LossAverage, TrainReport,
  TrainStop, TrainTask,
};
pub use self::validate::{ValidateReport, ValidateTask};

pub trait Task<I, M, O>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<Self::Output, Self::Error>;
}

const FORCE_EXIT_AFTER: Duration = Duration::from_secs(30);

/// 注册 Ctrl-C 处理：首次中断通过通道通知任务循环，30 秒后仍未退出则强制结束进程
///
/// 每个进程只能注册一次。
pub fn interrupt_channel() -> Result<mpsc::Receiver<()>, ctrlc::Error> {
  let (tx, rx) = mpsc::channel();

  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    let _ = tx.send(());
    thread::spawn(|| {
      thread::sleep(FORCE_EXIT_AFTER);
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })?;

  Ok(rx)
}
