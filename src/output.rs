// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output.rs - 输出定义
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use thiserror::Error;

use crate::model::{BBox, CategoryError};

pub trait Render<Frame, Output> {
  type Error;
  fn render_result(&mut self, frame: &Frame, result: &Output) -> Result<(), Self::Error>;

  /// 结束输出，之后不再写入
  fn finish(&mut self) -> Result<(), Self::Error> {
    Ok(())
  }
}

impl<Frame, Output, R: Render<Frame, Output>> Render<Frame, Output> for Option<R> {
  type Error = R::Error;

  fn render_result(&mut self, frame: &Frame, result: &Output) -> Result<(), Self::Error> {
    match self {
      Some(inner) => inner.render_result(frame, result),
      None => Ok(()),
    }
  }

  fn finish(&mut self) -> Result<(), Self::Error> {
    match self {
      Some(inner) => inner.finish(),
      None => Ok(()),
    }
  }
}

impl<Frame, Output, R: Render<Frame, Output> + ?Sized> Render<Frame, Output> for &mut R {
  type Error = R::Error;

  fn render_result(&mut self, frame: &Frame, result: &Output) -> Result<(), Self::Error> {
    (**self).render_result(frame, result)
  }

  fn finish(&mut self) -> Result<(), Self::Error> {
    (**self).finish()
  }
}

/// 依次写入两个输出
impl<Frame, Output, A, B, E> Render<Frame, Output> for (A, B)
where
  A: Render<Frame, Output, Error = E>,
  B: Render<Frame, Output, Error = E>,
{
  type Error = E;

  fn render_result(&mut self, frame: &Frame, result: &Output) -> Result<(), Self::Error> {
    self.0.render_result(frame, result)?;
    self.1.render_result(frame, result)
  }

  fn finish(&mut self) -> Result<(), Self::Error> {
    self.0.finish()?;
    self.1.finish()
  }
}

mod coco_json;
mod console;
pub use self::coco_json::{CocoJsonOutput, CocoJsonOutputBuilder, coco_image_id};
pub use self::console::ConsoleOutput;

#[cfg(feature = "save_image_file")]
pub mod draw;

#[cfg(feature = "save_image_file")]
mod directory_record;
#[cfg(feature = "save_image_file")]
pub use self::directory_record::DirectoryRecordOutput;

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("类别表错误: {0}")]
  CategoryError(#[from] CategoryError),
  #[cfg(feature = "save_image_file")]
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("无法从文件名解析图像 id: {0}")]
  ImageIdError(String),
  #[error("输出已经结束")]
  Finished,
  #[error("URI 方案不匹配: 期望 '{expected}', 实际 '{actual}'")]
  SchemeMismatch {
    expected: &'static str,
    actual: String,
  },
}

/// 左上角形式的框 `(x, y, w, h)`
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
  pub x: f32,
  pub y: f32,
  pub w: f32,
  pub h: f32,
}

impl Rect {
  pub fn from_center(b: &BBox) -> Self {
    Self {
      x: b.x - b.w / 2.0,
      y: b.y - b.h / 2.0,
      w: b.w,
      h: b.h,
    }
  }

  /// 裁剪到 `[0, width] x [0, height]`，对已裁剪的框不产生变化
  pub fn clamp(&self, width: f32, height: f32) -> Self {
    // max/min 组合在遇到 NaN 时取另一侧的值
    let xmin = self.x.max(0.0).min(width);
    let ymin = self.y.max(0.0).min(height);
    let xmax = (self.x + self.w).max(xmin).min(width);
    let ymax = (self.y + self.h).max(ymin).min(height);
    Self {
      x: xmin,
      y: ymin,
      w: xmax - xmin,
      h: ymax - ymin,
    }
  }
}
