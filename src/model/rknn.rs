// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/rknn.rs - RKNPU 推理后端
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use rknpu::{Context, InitFlags, TensorType};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, input::AsNhwcFrame, model::Model, url_file_path};

const GRID_NUM_INPUTS: u32 = 1;
const GRID_NUM_OUTPUTS: u32 = 1;

pub struct RknnModel<Frame> {
  context: Context,
  _phantom: std::marker::PhantomData<Frame>,
}

#[derive(Error, Debug)]
pub enum RknnModelError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("模型无效: {0}, 错误: {1}")]
  ModelInvalid(String, rknpu::Error),
  #[error("RKNN 错误: {0}")]
  RknnError(#[from] rknpu::Error),
  #[error("模型输出读取错误: {0}")]
  OutputError(String),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
}

impl RknnModelError {
  pub fn invalid(msg: &str, e: rknpu::Error) -> Self {
    RknnModelError::ModelInvalid(msg.to_string(), e)
  }
}

pub struct RknnModelBuilder {
  model_path: std::path::PathBuf,
  flags: InitFlags,
}

impl FromUrlWithScheme for RknnModelBuilder {
  const SCHEME: &'static str = "rknn";
}

impl FromUrl for RknnModelBuilder {
  type Error = RknnModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(RknnModelError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    Ok(RknnModelBuilder {
      model_path: url_file_path(url),
      flags: InitFlags::default(),
    })
  }
}

impl RknnModelBuilder {
  pub fn flags(mut self, flags: InitFlags) -> Self {
    self.flags = flags;
    self
  }

  pub fn build<Frame>(self) -> Result<RknnModel<Frame>, RknnModelError> {
    info!("加载模型文件: {}", self.model_path.display());
    let model_data = std::fs::read(&self.model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    info!("创建 RKNN 推理上下文");
    let context = Context::new(&model_data, self.flags)?;

    let num_inputs = context
      .num_inputs()
      .map_err(|e| RknnModelError::invalid("无法获取输入数量", e))?;
    let num_outputs = context
      .num_outputs()
      .map_err(|e| RknnModelError::invalid("无法获取输出数量", e))?;

    if num_inputs != GRID_NUM_INPUTS || num_outputs != GRID_NUM_OUTPUTS {
      let msg = format!(
        "预期模型输入/输出数量为 {}/{}, 实际为 {}/{}",
        GRID_NUM_INPUTS, GRID_NUM_OUTPUTS, num_inputs, num_outputs
      );
      error!("{}", msg);
      return Err(RknnModelError::invalid(&msg, rknpu::Error::InvalidModel));
    }
    info!("模型加载完成");

    Ok(RknnModel {
      context,
      _phantom: std::marker::PhantomData,
    })
  }
}

impl<Frame: AsNhwcFrame> Model for RknnModel<Frame> {
  type Input = Frame;
  type Error = RknnModelError;

  fn infer(&self, input: &Self::Input) -> Result<Box<[f32]>, Self::Error> {
    debug!("设置模型输入");
    self.context.set_input(
      0,
      input.as_nhwc(),
      rknpu::TensorFormat::NHWC,
      TensorType::UInt8,
    )?;

    debug!("执行模型推理");
    self.context.run()?;

    let output = self.context.get_outputs()?;
    let tensor = output
      .get_f32(0)
      .map_err(|e| RknnModelError::OutputError(e.to_string()))?;
    debug!("模型输出长度: {}", tensor.len());

    Ok(tensor.into())
  }
}
