// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model.rs - 模型
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::Path;

use thiserror::Error;
use url::Url;

use crate::{FromUrl, frame::RgbNhwcFrame};

/// 推理网络：输入一帧，输出扁平的网格回归张量
pub trait Model {
  type Input;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Box<[f32]>, Self::Error>;
}

/// 可训练的网络
pub trait Trainer {
  type Batch;
  type Error: std::error::Error + Send + Sync + 'static;

  /// 已训练过的样本数量，用于断点续训
  fn seen(&self) -> u64;
  fn set_seen(&mut self, seen: u64);
  /// 训练一步，返回该批次的损失
  fn train(&mut self, batch: &Self::Batch) -> Result<f32, Self::Error>;
  fn save_weights(&self, path: &Path) -> Result<(), Self::Error>;
}

impl<T: Trainer + ?Sized> Trainer for &mut T {
  type Batch = T::Batch;
  type Error = T::Error;

  fn seen(&self) -> u64 {
    (**self).seen()
  }

  fn set_seen(&mut self, seen: u64) {
    (**self).set_seen(seen)
  }

  fn train(&mut self, batch: &Self::Batch) -> Result<f32, Self::Error> {
    (**self).train(batch)
  }

  fn save_weights(&self, path: &Path) -> Result<(), Self::Error> {
    (**self).save_weights(path)
  }
}

mod category;
mod grid;
mod layout;
mod nms;
#[cfg(feature = "rknn")]
mod rknn;

pub use self::category::{COCO_CLASSES, COCO_IDS, Category, CategoryError, CategoryTable};
pub use self::grid::{BBox, GridDecoder, GridDetections};
pub use self::layout::{DetectionLayout, LayoutError, PredictionSlot, PredictionTensor};
pub use self::nms::{SortNms, Suppress, iou};
#[cfg(feature = "rknn")]
pub use self::rknn::{RknnModel, RknnModelBuilder, RknnModelError};

#[derive(Error, Debug)]
pub enum ModelError {
  #[cfg(feature = "rknn")]
  #[error("RKNN 模型错误: {0}")]
  RknnModelError(#[from] RknnModelError),
  #[error("不支持的模型方案: {0}")]
  SchemeMismatch(String),
}

/// 按 URL 方案选择推理后端
pub enum ModelWrapper<const W: u32, const H: u32> {
  #[cfg(feature = "rknn")]
  Rknn(RknnModel<RgbNhwcFrame<W, H>>),
}

impl<const W: u32, const H: u32> FromUrl for ModelWrapper<W, H> {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "rknn")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == RknnModelBuilder::SCHEME {
        let model = RknnModelBuilder::from_url(url)?.build()?;
        return Ok(ModelWrapper::Rknn(model));
      }
    }
    Err(ModelError::SchemeMismatch(url.scheme().to_string()))
  }
}

impl<const W: u32, const H: u32> Model for ModelWrapper<W, H> {
  type Input = RgbNhwcFrame<W, H>;
  type Error = ModelError;

  #[allow(unused_variables)]
  fn infer(&self, input: &Self::Input) -> Result<Box<[f32]>, Self::Error> {
    match *self {
      #[cfg(feature = "rknn")]
      ModelWrapper::Rknn(ref model) => model.infer(input).map_err(ModelError::from),
    }
  }
}
