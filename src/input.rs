// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input.rs - 数据集与图像输入
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

use std::{
  io::{BufRead, BufReader, Write},
  path::{Path, PathBuf},
  sync::Arc,
};

use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, url_file_path};

pub trait AsNhwcFrame {
  fn as_nhwc(&self) -> &[u8];
}

#[cfg(feature = "read_image_file")]
mod read_image_file;
#[cfg(feature = "read_image_file")]
pub use self::read_image_file::{ImageFileInputError, ImageFileLoader};

#[derive(Error, Debug)]
pub enum InputError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("URI 方案不匹配: 期望 '{expected}', 实际 '{actual}'")]
  SchemeMismatch {
    expected: &'static str,
    actual: String,
  },
}

/// 原始图像的信息，输出阶段据此把框换算回原图坐标
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageMeta {
  pub path: PathBuf,
  /// 原图宽度
  pub width: u32,
  /// 原图高度
  pub height: u32,
}

/// 一次加载的结果：原图信息与缩放后的网络输入
#[derive(Debug, Clone)]
pub struct LoadedImage<I> {
  pub meta: ImageMeta,
  pub input: I,
}

/// 读取并缩放单张图像，在预取线程上调用
pub trait ImageLoader: Send + Sync + 'static {
  type Input: Send + 'static;
  type Error: std::error::Error + Send + Sync + 'static;

  fn load(&self, path: &Path) -> Result<LoadedImage<Self::Input>, Self::Error>;
}

/// 训练批次加载器，在训练的后台线程上调用
pub trait BatchLoader: Send + 'static {
  type Batch: Send + 'static;
  type Error: std::error::Error + Send + Sync + 'static;

  fn load_batch(&mut self) -> Result<Self::Batch, Self::Error>;
}

/// 有序的数据集文件列表，整个运行期间保持不变
#[derive(Debug, Clone, Default)]
pub struct Dataset {
  paths: Arc<[PathBuf]>,
}

impl Dataset {
  pub fn from_paths<P: Into<PathBuf>>(paths: impl IntoIterator<Item = P>) -> Self {
    Self {
      paths: paths.into_iter().map(Into::into).collect(),
    }
  }

  /// 每行一个路径，忽略空行与行尾空白
  pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, InputError> {
    let mut paths = Vec::new();
    for line in reader.lines() {
      let line = line?;
      let line = line.trim();
      if !line.is_empty() {
        paths.push(PathBuf::from(line));
      }
    }
    Ok(Self::from_paths(paths))
  }

  pub fn from_list_file(path: &Path) -> Result<Self, InputError> {
    info!("读取数据集列表: {}", path.display());
    let file = std::fs::File::open(path)?;
    let dataset = Self::from_reader(BufReader::new(file))?;
    debug!("数据集包含 {} 张图像", dataset.len());
    Ok(dataset)
  }

  pub fn len(&self) -> usize {
    self.paths.len()
  }

  pub fn is_empty(&self) -> bool {
    self.paths.is_empty()
  }

  pub fn get(&self, index: usize) -> Option<&Path> {
    self.paths.get(index).map(PathBuf::as_path)
  }

  pub fn paths(&self) -> &[PathBuf] {
    &self.paths
  }
}

impl FromUrlWithScheme for Dataset {
  const SCHEME: &'static str = "list";
}

impl FromUrl for Dataset {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(InputError::SchemeMismatch {
        expected: Self::SCHEME,
        actual: url.scheme().to_string(),
      });
    }

    Self::from_list_file(&url_file_path(url))
  }
}

/// 交互模式的路径输入：先输出提示，再读取一行
pub struct PromptLines<R, W> {
  reader: R,
  prompt: W,
  buffer: String,
}

pub const IMAGE_PATH_PROMPT: &str = "Enter Image Path: ";

impl<R: BufRead, W: Write> PromptLines<R, W> {
  pub fn new(reader: R, prompt: W) -> Self {
    Self {
      reader,
      prompt,
      buffer: String::new(),
    }
  }
}

impl PromptLines<std::io::StdinLock<'static>, std::io::Stdout> {
  pub fn stdin() -> Self {
    Self::new(std::io::stdin().lock(), std::io::stdout())
  }
}

impl<R: BufRead, W: Write> Iterator for PromptLines<R, W> {
  type Item = std::io::Result<PathBuf>;

  fn next(&mut self) -> Option<Self::Item> {
    let prompted = self
      .prompt
      .write_all(IMAGE_PATH_PROMPT.as_bytes())
      .and_then(|_| self.prompt.flush());
    if let Err(e) = prompted {
      return Some(Err(e));
    }

    self.buffer.clear();
    match self.reader.read_line(&mut self.buffer) {
      Ok(0) => None,
      Ok(_) => {
        let line = self.buffer.strip_suffix('\n').unwrap_or(&self.buffer);
        let line = line.strip_suffix('\r').unwrap_or(line);
        Some(Ok(PathBuf::from(line)))
      }
      Err(e) => Some(Err(e)),
    }
  }
}
