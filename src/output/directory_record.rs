// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use chrono::{Datelike, Local};
use std::path::PathBuf;
use tracing::{debug, info};

use crate::{
  FromUrl, FromUrlWithScheme,
  input::ImageMeta,
  model::{CategoryTable, GridDetections},
  output::{OutputError, Render, draw::Draw},
  url_file_path,
};

/// 把标注后的图像按日期保存到 `folder:///path/to/dir` 下
///
/// 默认只保存有检测的图像，`?always` 时每张都保存；`?threshold=0.3` 调整绘制阈值。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  draw: Draw,
  counter: u16,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = OutputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch {
        expected: Self::SCHEME,
        actual: url.scheme().to_string(),
      });
    }

    let mut draw = Draw::default();
    let mut always = false;
    for (k, v) in url.query_pairs() {
      match k.as_ref() {
        "always" => always = true,
        "threshold" => {
          if let Ok(threshold) = v.parse() {
            draw = draw.with_threshold(threshold);
          }
        }
        _ => {}
      }
    }

    Ok(DirectoryRecordOutput {
      directory: url_file_path(url),
      draw,
      counter: 0,
      always,
    })
  }
}

impl DirectoryRecordOutput {
  pub fn with_draw(mut self, draw: Draw) -> Self {
    self.draw = draw;
    self
  }

  /// 不绘制最佳类别没有名称的单元
  pub fn with_categories(mut self, categories: CategoryTable) -> Self {
    self.draw = self.draw.with_categories(categories);
    self
  }

  fn frame_id(&mut self) -> u16 {
    self.counter = self.counter.wrapping_add(1);
    self.counter
  }

  fn frame_path(&mut self) -> Result<PathBuf, OutputError> {
    let now = Local::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }
}

impl Render<ImageMeta, GridDetections> for DirectoryRecordOutput {
  type Error = OutputError;

  fn render_result(&mut self, frame: &ImageMeta, result: &GridDetections) -> Result<(), Self::Error> {
    if !self.always && result.retained() == 0 {
      debug!("{} 没有检测结果, 跳过保存", frame.path.display());
      return Ok(());
    }

    let mut image = image::open(&frame.path)?.to_rgb8();
    let drawn = self.draw.draw_detections_on_image(&mut image, result);
    let path = self.frame_path()?;
    image.save(&path)?;
    info!("保存标注图像 ({} 个框): {}", drawn, path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{DetectionLayout, GridDecoder};
  use std::path::Path;

  fn saved_images(dir: &Path) -> usize {
    let mut count = 0;
    for entry in std::fs::read_dir(dir).unwrap() {
      let path = entry.unwrap().path();
      if path.is_dir() {
        count += saved_images(&path);
      } else if path.extension().is_some_and(|e| e == "png") {
        count += 1;
      }
    }
    count
  }

  fn detections(score: f32) -> GridDetections {
    GridDecoder::new(DetectionLayout::new(1, 1), 0.1)
      .unwrap()
      .decode(&[score, 0.5, 0.5, 0.5, 0.5], 16, 16)
      .unwrap()
  }

  #[test]
  fn saves_annotated_images_into_dated_directories() {
    let source = tempfile::tempdir().unwrap();
    let image_path = source.path().join("input.png");
    image::RgbImage::new(16, 16).save(&image_path).unwrap();
    let meta = ImageMeta {
      path: image_path,
      width: 16,
      height: 16,
    };

    let out_dir = tempfile::tempdir().unwrap();
    let url = url::Url::parse(&format!("folder://{}", out_dir.path().display())).unwrap();
    let mut output = DirectoryRecordOutput::from_url(&url).unwrap();

    output.render_result(&meta, &detections(0.05)).unwrap();
    assert_eq!(saved_images(out_dir.path()), 0);

    output.render_result(&meta, &detections(0.8)).unwrap();
    assert_eq!(saved_images(out_dir.path()), 1);
  }

  #[test]
  fn always_saves_every_image() {
    let source = tempfile::tempdir().unwrap();
    let image_path = source.path().join("input.png");
    image::RgbImage::new(16, 16).save(&image_path).unwrap();
    let meta = ImageMeta {
      path: image_path,
      width: 16,
      height: 16,
    };

    let out_dir = tempfile::tempdir().unwrap();
    let url =
      url::Url::parse(&format!("folder://{}?always", out_dir.path().display())).unwrap();
    let mut output = DirectoryRecordOutput::from_url(&url).unwrap();
    output.render_result(&meta, &detections(0.0)).unwrap();
    output.render_result(&meta, &detections(0.0)).unwrap();
    assert_eq!(saved_images(out_dir.path()), 2);
  }

  #[test]
  fn rejects_other_schemes() {
    let url = url::Url::parse("json:///tmp/out.json").unwrap();
    assert!(matches!(
      DirectoryRecordOutput::from_url(&url),
      Err(OutputError::SchemeMismatch { .. })
    ));
  }
}
