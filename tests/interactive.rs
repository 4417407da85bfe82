// 该文件是 Shanan （山南西风） 项目的一部分。
// tests/interactive.rs - 交互式推理测试
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

use std::{convert::Infallible, path::Path};

use shanan_grid::{
  input::{IMAGE_PATH_PROMPT, ImageLoader, ImageMeta, LoadedImage, PromptLines},
  model::{CategoryTable, DetectionLayout, Model},
  output::ConsoleOutput,
  task::{InteractiveTask, Task},
};

/// 输入即文件名中的数字，决定模型输出的类别
struct NameLoader;

impl ImageLoader for NameLoader {
  type Input = usize;
  type Error = std::io::Error;

  fn load(&self, path: &Path) -> Result<LoadedImage<usize>, Self::Error> {
    let class = path
      .file_stem()
      .and_then(|s| s.to_str())
      .and_then(|s| s.parse().ok())
      .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "无法加载"))?;
    Ok(LoadedImage {
      meta: ImageMeta {
        path: path.to_path_buf(),
        width: 100,
        height: 100,
      },
      input: class,
    })
  }
}

/// 1x1 网格，3 类，带背景类
struct ClassModel;

impl Model for ClassModel {
  type Input = usize;
  type Error = Infallible;

  fn infer(&self, class: &usize) -> Result<Box<[f32]>, Self::Error> {
    let mut data = vec![0.1, 0.0, 0.0, 0.0, 0.5, 0.5, 0.5, 0.5];
    data[1 + class] = 0.75;
    Ok(data.into())
  }
}

fn categories() -> CategoryTable {
  CategoryTable::from_json_reader(
    r#"[null, {"id": 1, "name": "person"}, {"id": 3, "name": "car"}]"#.as_bytes(),
  )
  .unwrap()
}

#[test]
fn prints_predictions_for_each_prompted_path() {
  let layout = DetectionLayout::new(1, 3).with_background(true);
  let mut prompt = Vec::new();
  let input = PromptLines::new("1.jpg\n2.jpg\n0.jpg\n".as_bytes(), &mut prompt);
  let mut output = ConsoleOutput::new(Vec::new(), categories());

  let report = InteractiveTask::new(NameLoader, layout)
    .run_task(input, ClassModel, &mut output)
    .unwrap();
  assert_eq!(report.images, 3);

  // 第三张图像的最佳类别是背景，不打印
  let text = String::from_utf8(output.into_inner()).unwrap();
  assert_eq!(text, "0.750000 person\n0.750000 car\n");
  assert_eq!(String::from_utf8(prompt).unwrap(), IMAGE_PATH_PROMPT.repeat(4));
}

#[test]
fn single_image_runs_once() {
  let layout = DetectionLayout::new(1, 3).with_background(true);
  let mut output = ConsoleOutput::new(Vec::new(), categories());
  let report = InteractiveTask::new(NameLoader, layout)
    .run_task(
      std::iter::once(Ok(Path::new("2.png").to_path_buf())),
      ClassModel,
      &mut output,
    )
    .unwrap();
  assert_eq!(report.images, 1);
  assert_eq!(String::from_utf8(output.into_inner()).unwrap(), "0.750000 car\n");
}

#[test]
fn unreadable_image_is_an_error() {
  let layout = DetectionLayout::new(1, 3).with_background(true);
  let mut output = ConsoleOutput::new(Vec::new(), categories());
  let result = InteractiveTask::new(NameLoader, layout).run_task(
    std::iter::once(Ok(Path::new("missing.jpg").to_path_buf())),
    ClassModel,
    &mut output,
  );
  assert!(result.is_err());
}
