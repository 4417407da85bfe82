// 该文件是 Shanan （山南西风） 项目的一部分。
// src/main.rs - 项目主程序
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

mod args;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use shanan_grid::{
  FromUrl,
  input::{Dataset, ImageFileLoader, PromptLines},
  model::ModelWrapper,
  output::{CocoJsonOutputBuilder, ConsoleOutput, DirectoryRecordOutput},
  pipeline::{LoadPolicy, PrefetchPipeline},
  task::{InteractiveTask, Task, ValidateTask},
};

use args::{Args, Command, TestArgs, ValidArgs};

const INPUT_WIDTH: u32 = 448;
const INPUT_HEIGHT: u32 = 448;

type Loader = ImageFileLoader<INPUT_WIDTH, INPUT_HEIGHT>;
type Network = ModelWrapper<INPUT_WIDTH, INPUT_HEIGHT>;

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .init();

  match Args::parse().command {
    Command::Valid(args) => valid(args),
    Command::Test(args) => test(args),
  }
}

fn valid(args: ValidArgs) -> Result<()> {
  info!("模型文件路径: {}", args.model);
  info!("数据集: {}", args.input);
  info!("输出路径: {}", args.output);

  let layout = args.layout.layout();
  let categories = args.layout.result_categories()?;
  let dataset = Dataset::from_url(&args.input)?;
  let model = Network::from_url(&args.model)?;
  let output = CocoJsonOutputBuilder::from_url(&args.output)?.build(categories, layout.classes)?;

  let policy = if args.skip_unreadable {
    LoadPolicy::SkipAndLog
  } else {
    LoadPolicy::FailFast
  };
  let pipeline = PrefetchPipeline::new(Loader::new(), dataset, args.workers)?.with_policy(policy);

  let report = ValidateTask::new(layout)
    .with_threshold(args.threshold)
    .with_iou_threshold((!args.no_nms).then_some(args.iou_threshold))
    .with_interrupt(true)
    .run_task(pipeline, model, output)?;

  info!(
    "验证结束: {} 张图像, {} 个检测, 跳过 {} 张, 耗时 {:.2?}",
    report.images, report.detections, report.skipped, report.elapsed
  );
  Ok(())
}

fn test(args: TestArgs) -> Result<()> {
  info!("模型文件路径: {}", args.model);

  let layout = args.layout.layout();
  let categories = args.layout.label_categories()?;
  let model = Network::from_url(&args.model)?;
  let annotated = args
    .output
    .as_ref()
    .map(DirectoryRecordOutput::from_url)
    .transpose()?
    .map(|output| output.with_categories(categories.clone()));
  let output = (ConsoleOutput::stdout(categories), annotated);

  let input: Box<dyn Iterator<Item = std::io::Result<PathBuf>>> = match args.image {
    Some(image) => Box::new(std::iter::once(Ok(image))),
    None => Box::new(PromptLines::stdin()),
  };

  InteractiveTask::new(Loader::new(), layout)
    .with_threshold(args.threshold)
    .run_task(input, model, output)?;
  Ok(())
}
