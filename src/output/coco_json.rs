// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/coco_json.rs - COCO 检测结果 JSON 输出
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

//! 结果以 JSON 数组流式写出，每个非零的 (检测, 类别) 一条记录：
//!
//! ```text
//! [
//! {"image_id":42, "category_id":18, "bbox":[1.000000, 2.000000, 3.000000, 4.000000], "score":0.300000},
//! {"image_id":42, "category_id":1, "bbox":[...], "score":0.250000}
//! ]
//! ```
//!
//! 分隔符写在下一条记录之前，因此中途停止时文件里也只缺结尾的 `]`。

use std::{
  fs::File,
  io::{BufWriter, Write},
  path::{Path, PathBuf},
};

use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::ImageMeta,
  model::{CategoryTable, GridDetections},
  output::{OutputError, Rect, Render},
  url_file_path,
};

const ARRAY_OPEN: &[u8] = b"[\n";
const ARRAY_CLOSE: &[u8] = b"\n]\n";
const RECORD_SEPARATOR: &[u8] = b",\n";

/// 从 `COCO_val2014_000000000042.jpg` 这样的文件名中取出 42
///
/// 取最后一个 `_` 之后的前导数字。
pub fn coco_image_id(path: &Path) -> Result<u64, OutputError> {
  let name = path
    .file_name()
    .and_then(|n| n.to_str())
    .ok_or_else(|| OutputError::ImageIdError(path.display().to_string()))?;
  let (_, tail) = name
    .rsplit_once('_')
    .ok_or_else(|| OutputError::ImageIdError(name.to_string()))?;
  let digits = tail
    .find(|c: char| !c.is_ascii_digit())
    .map_or(tail, |end| &tail[..end]);
  digits
    .parse()
    .map_err(|_| OutputError::ImageIdError(name.to_string()))
}

pub struct CocoJsonOutput<W: Write> {
  sink: W,
  categories: CategoryTable,
  records: usize,
  finished: bool,
}

impl<W: Write> CocoJsonOutput<W> {
  /// 写出数组开头；类别表长度必须等于模型类别数
  pub fn new(mut sink: W, categories: CategoryTable, classes: usize) -> Result<Self, OutputError> {
    categories.ensure_classes(classes)?;
    sink.write_all(ARRAY_OPEN)?;
    Ok(Self {
      sink,
      categories,
      records: 0,
      finished: false,
    })
  }

  /// 已写出的记录数
  pub fn records(&self) -> usize {
    self.records
  }

  /// 写出一张图像的所有非零检测，返回本次写出的记录数
  pub fn write_detections(
    &mut self,
    image_id: u64,
    detections: &GridDetections,
    width: u32,
    height: u32,
  ) -> Result<usize, OutputError> {
    if self.finished {
      return Err(OutputError::Finished);
    }

    let before = self.records;
    for (bbox, probs) in detections.iter() {
      let rect = Rect::from_center(bbox).clamp(width as f32, height as f32);
      for (class, &prob) in probs.iter().enumerate() {
        // JSON 无法表示 inf/NaN
        if prob == 0.0 || !prob.is_finite() {
          continue;
        }
        let Some(category_id) = self.categories.id(class) else {
          continue;
        };
        if self.records > 0 {
          self.sink.write_all(RECORD_SEPARATOR)?;
        }
        write!(
          self.sink,
          "{{\"image_id\":{}, \"category_id\":{}, \"bbox\":[{:.6}, {:.6}, {:.6}, {:.6}], \"score\":{:.6}}}",
          image_id, category_id, rect.x, rect.y, rect.w, rect.h, prob
        )?;
        self.records += 1;
      }
    }
    self.sink.flush()?;

    let written = self.records - before;
    debug!("图像 {} 写出 {} 条记录", image_id, written);
    Ok(written)
  }

  /// 取回底层的写入目标；未结束时数组尚未闭合
  pub fn into_inner(self) -> W {
    self.sink
  }
}

impl<W: Write> Render<ImageMeta, GridDetections> for CocoJsonOutput<W> {
  type Error = OutputError;

  fn render_result(&mut self, frame: &ImageMeta, result: &GridDetections) -> Result<(), Self::Error> {
    let image_id = coco_image_id(&frame.path)?;
    self.write_detections(image_id, result, frame.width, frame.height)?;
    Ok(())
  }

  fn finish(&mut self) -> Result<(), Self::Error> {
    if self.finished {
      return Ok(());
    }
    self.sink.write_all(ARRAY_CLOSE)?;
    self.sink.flush()?;
    self.finished = true;
    info!("结果输出完成, 共 {} 条记录", self.records);
    Ok(())
  }
}

/// 从 `json:///path/results.json` 创建文件输出
pub struct CocoJsonOutputBuilder {
  path: PathBuf,
}

impl FromUrlWithScheme for CocoJsonOutputBuilder {
  const SCHEME: &'static str = "json";
}

impl FromUrl for CocoJsonOutputBuilder {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch {
        expected: Self::SCHEME,
        actual: url.scheme().to_string(),
      });
    }
    Ok(Self {
      path: url_file_path(url),
    })
  }
}

impl CocoJsonOutputBuilder {
  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn build(
    self,
    categories: CategoryTable,
    classes: usize,
  ) -> Result<CocoJsonOutput<BufWriter<File>>, OutputError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }
    info!("写出检测结果到: {}", self.path.display());
    let file = File::create(&self.path)?;
    CocoJsonOutput::new(BufWriter::new(file), categories, classes)
  }
}
