// 该文件是 Shanan （山南西风） 项目的一部分。
// src/args.rs - 项目参数配置
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use url::Url;

use shanan_grid::model::{CategoryTable, DetectionLayout};

/// 网格检测器批量推理
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// 对数据集列表做推理，写出 COCO 检测结果
  Valid(ValidArgs),
  /// 对单张或从标准输入逐行读取的图像做推理
  Test(TestArgs),
}

/// 检测层配置
#[derive(clap::Args, Debug)]
pub struct LayoutArgs {
  /// 网格边长
  #[arg(long, default_value = "7", value_name = "SIDE")]
  pub side: usize,
  /// 类别数量（含背景类）
  #[arg(long, default_value = "81", value_name = "CLASSES")]
  pub classes: usize,
  /// 每个单元带有 objectness 门控
  #[arg(long)]
  pub objectness: bool,
  /// 类别向量中带有显式背景类
  #[arg(long)]
  pub background: bool,
  /// 类别表 JSON 文件，未指定时按类别数使用 COCO 表
  #[arg(long, value_name = "FILE")]
  pub categories: Option<PathBuf>,
}

impl LayoutArgs {
  pub fn layout(&self) -> DetectionLayout {
    DetectionLayout::new(self.side, self.classes)
      .with_objectness(self.objectness)
      .with_background(self.background)
  }

  fn load_categories(&self, fallback: impl FnOnce() -> CategoryTable) -> anyhow::Result<CategoryTable> {
    let table = match &self.categories {
      Some(path) => CategoryTable::from_json_file(path)
        .with_context(|| format!("无法读取类别表: {}", path.display()))?,
      None => fallback(),
    };
    table.ensure_classes(self.classes)?;
    Ok(table)
  }

  /// 写出检测结果用的类别表，索引 `j` 对应第 `j` 个 COCO id
  pub fn result_categories(&self) -> anyhow::Result<CategoryTable> {
    self.load_categories(|| CategoryTable::coco_dense(self.classes))
  }

  /// 打印与绘制用的类别表，81 类时索引 0 是背景
  pub fn label_categories(&self) -> anyhow::Result<CategoryTable> {
    self.load_categories(|| match self.classes {
      81 => CategoryTable::coco_with_background(),
      n => CategoryTable::coco_dense(n),
    })
  }
}

#[derive(clap::Args, Debug)]
pub struct ValidArgs {
  /// 模型路径，如 rknn:///models/yolo.rknn
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 数据集列表，如 list:///data/coco/val.list
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 结果文件
  #[arg(long, default_value = "json:coco_results.json", value_name = "OUTPUT")]
  pub output: Url,
  /// 预取线程数
  #[arg(long, default_value = "8", value_name = "WORKERS")]
  pub workers: usize,
  /// 概率阈值
  #[arg(long, default_value = "0.01", value_name = "THRESHOLD")]
  pub threshold: f32,
  /// NMS IoU 阈值
  #[arg(long, default_value = "0.5", value_name = "THRESHOLD")]
  pub iou_threshold: f32,
  /// 跳过 NMS
  #[arg(long)]
  pub no_nms: bool,
  /// 跳过无法读取的图像而不是退出
  #[arg(long)]
  pub skip_unreadable: bool,
  #[command(flatten)]
  pub layout: LayoutArgs,
}

#[derive(clap::Args, Debug)]
pub struct TestArgs {
  /// 模型路径
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 图像路径，未指定时从标准输入逐行读取
  #[arg(long, value_name = "IMAGE")]
  pub image: Option<PathBuf>,
  /// 标注图像保存目录，如 folder:///tmp/predictions?always
  #[arg(long, value_name = "OUTPUT")]
  pub output: Option<Url>,
  /// 概率阈值
  #[arg(long, default_value = "0.2", value_name = "THRESHOLD")]
  pub threshold: f32,
  #[command(flatten)]
  pub layout: LayoutArgs,
}
