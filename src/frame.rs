// 该文件是 Lukuang （路况） 项目的一部分。
// src/frame.rs - NCHW 张量定义
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

use image::RgbImage;
use ndarray::{Array4, ArrayView4};

pub const RGB_CHANNELS: usize = 3;

/// 浮点 NCHW 张量，形状为 [batch, channel, height, width]
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
  data: Array4<f32>,
}

impl From<Array4<f32>> for Tensor {
  fn from(data: Array4<f32>) -> Self {
    Self { data }
  }
}

impl Tensor {
  pub fn zeros(shape: [usize; 4]) -> Self {
    Self {
      data: Array4::zeros(shape),
    }
  }

  /// 将 RGB 图像逐像素映射为 [1, 3, H, W] 张量
  pub fn from_rgb_image<F>(image: &RgbImage, mut map: F) -> Self
  where
    F: FnMut(usize, u8) -> f32,
  {
    let (width, height) = image.dimensions();
    let mut data = Array4::<f32>::zeros((1, RGB_CHANNELS, height as usize, width as usize));
    for (x, y, pixel) in image.enumerate_pixels() {
      for c in 0..RGB_CHANNELS {
        data[[0, c, y as usize, x as usize]] = map(c, pixel[c]);
      }
    }
    Self { data }
  }

  pub fn shape(&self) -> [usize; 4] {
    let dim = self.data.dim();
    [dim.0, dim.1, dim.2, dim.3]
  }

  pub fn view(&self) -> ArrayView4<'_, f32> {
    self.data.view()
  }

  pub fn as_array(&self) -> &Array4<f32> {
    &self.data
  }
}
