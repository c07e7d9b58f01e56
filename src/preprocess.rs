// 该文件是 Lukuang （路况） 项目的一部分。
// src/preprocess.rs - 分类器输入预处理
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

use image::{RgbImage, imageops::FilterType};

use crate::frame::Tensor;

pub const CLASSIFIER_INPUT_W: u32 = 224;
pub const CLASSIFIER_INPUT_H: u32 = 224;
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// 分类器共用的图像预处理：双线性缩放到固定尺寸后按通道归一化
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Preprocessor {
  width: u32,
  height: u32,
  mean: [f32; 3],
  std: [f32; 3],
  filter: FilterType,
}

impl Default for Preprocessor {
  fn default() -> Self {
    Self {
      width: CLASSIFIER_INPUT_W,
      height: CLASSIFIER_INPUT_H,
      mean: IMAGENET_MEAN,
      std: IMAGENET_STD,
      filter: FilterType::Triangle,
    }
  }
}

impl Preprocessor {
  pub fn output_shape(&self) -> [usize; 4] {
    [1, 3, self.height as usize, self.width as usize]
  }

  /// 任意尺寸的 RGB 图像 -> [1, 3, 224, 224] 归一化张量
  pub fn apply(&self, image: &RgbImage) -> Tensor {
    let resized = if image.dimensions() == (self.width, self.height) {
      image.clone()
    } else {
      image::imageops::resize(image, self.width, self.height, self.filter)
    };

    let (mean, std) = (self.mean, self.std);
    Tensor::from_rgb_image(&resized, |c, v| (v as f32 / 255.0 - mean[c]) / std[c])
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  #[test]
  fn output_shape_is_fixed_for_any_aspect_ratio() {
    let preprocessor = Preprocessor::default();
    for (w, h) in [(1, 1), (640, 480), (37, 1000), (224, 224), (3000, 7)] {
      let image = RgbImage::from_pixel(w, h, Rgb([10, 200, 30]));
      assert_eq!(preprocessor.apply(&image).shape(), [1, 3, 224, 224]);
    }
  }

  #[test]
  fn normalizes_with_imagenet_constants() {
    let image = RgbImage::from_pixel(224, 224, Rgb([255, 0, 128]));
    let tensor = Preprocessor::default().apply(&image);
    let view = tensor.view();

    let expect_r = (1.0 - 0.485) / 0.229;
    let expect_g = (0.0 - 0.456) / 0.224;
    let expect_b = (128.0 / 255.0 - 0.406) / 0.225;
    assert!((view[[0, 0, 10, 10]] - expect_r).abs() < 1e-5);
    assert!((view[[0, 1, 100, 3]] - expect_g).abs() < 1e-5);
    assert!((view[[0, 2, 223, 223]] - expect_b).abs() < 1e-5);
  }

  #[test]
  fn is_deterministic() {
    let image = RgbImage::from_fn(97, 53, |x, y| {
      Rgb([(x * 3) as u8, (y * 5) as u8, (x ^ y) as u8])
    });
    let preprocessor = Preprocessor::default();
    assert_eq!(preprocessor.apply(&image), preprocessor.apply(&image));
  }
}
