// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/read_image_file.rs - 图像文件加载
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::Path;

use image::{ImageReader, imageops::FilterType};
use thiserror::Error;
use tracing::debug;

use crate::{
  frame::{FrameSizeError, RgbNhwcFrame},
  input::{ImageLoader, ImageMeta, LoadedImage},
};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("Frame error: {0}")]
  FrameError(#[from] FrameSizeError),
}

/// 读取图像文件并缩放到网络输入尺寸 `W x H`
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageFileLoader<const W: u32, const H: u32> {
  filter: Option<FilterType>,
}

impl<const W: u32, const H: u32> ImageFileLoader<W, H> {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_filter(mut self, filter: FilterType) -> Self {
    self.filter = Some(filter);
    self
  }
}

impl<const W: u32, const H: u32> ImageLoader for ImageFileLoader<W, H> {
  type Input = RgbNhwcFrame<W, H>;
  type Error = ImageFileInputError;

  fn load(&self, path: &Path) -> Result<LoadedImage<Self::Input>, Self::Error> {
    let image = ImageReader::open(path)?.decode()?.to_rgb8();
    let (width, height) = image.dimensions();
    debug!("读取图像 {}: {}x{}", path.display(), width, height);

    let resized = image::imageops::resize(
      &image,
      W,
      H,
      self.filter.unwrap_or(FilterType::Triangle),
    );
    let input = RgbNhwcFrame::try_from(resized.into_raw())?;

    Ok(LoadedImage {
      meta: ImageMeta {
        path: path.to_path_buf(),
        width,
        height,
      },
      input,
    })
  }
}
