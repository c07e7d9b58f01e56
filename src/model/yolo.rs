// 该文件是 Lukuang （路况） 项目的一部分。
// src/model/yolo.rs - YOLO 车辆检测模型
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

use std::sync::Mutex;

use image::{Rgb, RgbImage};
use ort::session::Session;
use tracing::{debug, error, info, warn};

use crate::{
  frame::Tensor,
  model::{
    DetectItem, DetectResult, DetectorBackend, ModelError, OnnxError, OnnxModelBuilder,
    labels::parse_names_metadata,
    onnx::{run_session, tensor_dims},
  },
};

const YOLO_INPUT_W: usize = 640;
const YOLO_INPUT_H: usize = 640;
const YOLO_BOX_CHANNELS: usize = 4;
const YOLO_PAD_VALUE: u8 = 114;
pub const YOLO_IOU_THRESHOLD: f32 = 0.7;
pub const YOLO_MAX_DETECTIONS: usize = 300;

/// Letterbox 变换参数，用于把网络坐标映射回原图
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
  pub scale: f32,
  pub pad_x: f32,
  pub pad_y: f32,
  pub source_w: u32,
  pub source_h: u32,
}

impl Letterbox {
  /// 网络输入坐标 [x1, y1, x2, y2] -> 原图归一化坐标
  fn restore(&self, bbox: [f32; 4]) -> [f32; 4] {
    let (w, h) = (self.source_w as f32, self.source_h as f32);
    let x = |v: f32| ((v - self.pad_x) / self.scale).clamp(0.0, w) / w;
    let y = |v: f32| ((v - self.pad_y) / self.scale).clamp(0.0, h) / h;
    [x(bbox[0]), y(bbox[1]), x(bbox[2]), y(bbox[3])]
  }
}

/// 半像素对齐的双线性缩放，缩小时不做抗锯齿，与 OpenCV `INTER_LINEAR` 一致
pub fn resize_bilinear(image: &RgbImage, width: u32, height: u32) -> RgbImage {
  let (source_w, source_h) = image.dimensions();
  if source_w == 0 || source_h == 0 {
    return RgbImage::new(width, height);
  }

  let axis = |dst: u32, src: u32, len: u32| {
    let f = ((dst as f32 + 0.5) * src as f32 / len as f32 - 0.5).max(0.0);
    let i0 = (f.floor() as u32).min(src - 1);
    let i1 = (i0 + 1).min(src - 1);
    (i0, i1, f - i0 as f32)
  };

  RgbImage::from_fn(width, height, |x, y| {
    let (x0, x1, dx) = axis(x, source_w, width);
    let (y0, y1, dy) = axis(y, source_h, height);
    let (p00, p01) = (image.get_pixel(x0, y0), image.get_pixel(x1, y0));
    let (p10, p11) = (image.get_pixel(x0, y1), image.get_pixel(x1, y1));
    Rgb(std::array::from_fn(|c| {
      let top = p00[c] as f32 * (1.0 - dx) + p01[c] as f32 * dx;
      let bottom = p10[c] as f32 * (1.0 - dx) + p11[c] as f32 * dx;
      (top * (1.0 - dy) + bottom * dy).round().clamp(0.0, 255.0) as u8
    }))
  })
}

/// 等比例缩放后居中填充到 `target_w x target_h`，返回 [1, 3, H, W] 张量（0~1）
pub fn letterbox(image: &RgbImage, target_w: u32, target_h: u32) -> (Tensor, Letterbox) {
  let (source_w, source_h) = image.dimensions();
  let scale = (target_w as f32 / source_w as f32).min(target_h as f32 / source_h as f32);
  let new_w = ((source_w as f32 * scale).round() as u32).clamp(1, target_w);
  let new_h = ((source_h as f32 * scale).round() as u32).clamp(1, target_h);
  let pad_x = (target_w - new_w) as f32 / 2.0;
  let pad_y = (target_h - new_h) as f32 / 2.0;

  let resized = resize_bilinear(image, new_w, new_h);
  let mut canvas = RgbImage::from_pixel(target_w, target_h, Rgb([YOLO_PAD_VALUE; 3]));
  image::imageops::replace(
    &mut canvas,
    &resized,
    (pad_x - 0.1).round() as i64,
    (pad_y - 0.1).round() as i64,
  );

  let tensor = Tensor::from_rgb_image(&canvas, |_, v| v as f32 / 255.0);
  (
    tensor,
    Letterbox {
      scale,
      pad_x: (pad_x - 0.1).round(),
      pad_y: (pad_y - 0.1).round(),
      source_w,
      source_h,
    },
  )
}

/// 解码 `[1, 4 + classes, anchors]` 输出
fn decode(
  data: &[f32],
  classes: usize,
  anchors: usize,
  letterbox: &Letterbox,
  confidence: f32,
  names: &[String],
) -> Vec<DetectItem> {
  let mut items = Vec::new();
  for i in 0..anchors {
    let (mut class_id, mut score) = (0usize, f32::NEG_INFINITY);
    for c in 0..classes {
      let s = data[(YOLO_BOX_CHANNELS + c) * anchors + i];
      if s > score {
        score = s;
        class_id = c;
      }
    }
    if score < confidence {
      continue;
    }

    let cx = data[i];
    let cy = data[anchors + i];
    let w = data[2 * anchors + i];
    let h = data[3 * anchors + i];
    let bbox = letterbox.restore([cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0]);
    if !(bbox[0] < bbox[2] && bbox[1] < bbox[3]) {
      continue;
    }

    items.push(DetectItem {
      class_id: class_id as u32,
      class_name: names
        .get(class_id)
        .cloned()
        .unwrap_or_else(|| format!("class_{}", class_id)),
      score,
      bbox,
    });
  }
  items
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let area_a = (a[2] - a[0]) * (a[3] - a[1]);
  let area_b = (b[2] - b[0]) * (b[3] - b[1]);
  let union = area_a + area_b - intersection;

  if union > 0.0 { intersection / union } else { 0.0 }
}

/// 按类别的非极大值抑制，结果按置信度降序
pub fn nms(mut items: Vec<DetectItem>, iou_threshold: f32) -> Vec<DetectItem> {
  items.sort_by(|a, b| b.score.total_cmp(&a.score));

  let mut keep: Vec<DetectItem> = Vec::new();
  for item in items {
    let suppressed = keep
      .iter()
      .any(|k| k.class_id == item.class_id && iou(&k.bbox, &item.bbox) > iou_threshold);
    if !suppressed {
      keep.push(item);
    }
  }
  keep
}

/// 检测输出须为 `[1, 4 + 类别数, 锚点数]`，动态通道数留到推理时检查
pub(crate) fn ensure_detector_channels(
  path: &str,
  declared: &[Option<usize>],
  classes: usize,
) -> Result<(), OnnxError> {
  if declared.len() != 3 {
    return Err(OnnxError::invalid(format!(
      "预期输出为 [1, 4 + 类别数, 锚点数], 实际为 {} 维",
      declared.len()
    )));
  }
  match declared[1] {
    Some(channels) if channels != YOLO_BOX_CHANNELS + classes => {
      error!("模型输出通道数 {} 与类别数 {} 不匹配", channels, classes);
      Err(OnnxError::OutputWidth {
        path: path.to_string(),
        expected: YOLO_BOX_CHANNELS + classes,
        actual: channels,
      })
    }
    _ => Ok(()),
  }
}

pub struct OnnxYolo {
  session: Mutex<Session>,
  input_name: String,
  output_name: String,
  input_w: u32,
  input_h: u32,
  names: Vec<String>,
}

impl OnnxModelBuilder {
  /// 加载 YOLO 检测模型，类别名来自标签文件或模型元数据中的 `names`
  pub fn build_detector(&self) -> Result<OnnxYolo, OnnxError> {
    let manifest = self.label_manifest()?;
    let session = self.open_session()?;

    let names = match manifest {
      Some(manifest) => manifest.labels,
      None => {
        let metadata = session
          .metadata()
          .map_err(|e| OnnxError::invalid(format!("无法读取模型元数据: {}", e)))?;
        match metadata.custom("names") {
          Ok(Some(raw)) => parse_names_metadata(&raw).ok_or_else(|| {
            OnnxError::invalid(format!("无法解析模型元数据中的类别名: {}", raw))
          })?,
          _ => return Err(OnnxError::MissingLabels(self.model_path().to_string())),
        }
      }
    };
    debug!("检测类别: {:?}", names);

    let input = session
      .inputs
      .first()
      .ok_or_else(|| OnnxError::invalid("模型没有输入"))?;
    let output = session
      .outputs
      .first()
      .ok_or_else(|| OnnxError::invalid("模型没有输出"))?;

    let input_shape = tensor_dims(&input.input_type)
      .ok_or_else(|| OnnxError::invalid(format!("输入 {} 不是张量", input.name)))?;
    if input_shape.len() != 4 {
      return Err(OnnxError::invalid(format!(
        "预期输入为 4 维 NCHW 张量, 实际为 {} 维",
        input_shape.len()
      )));
    }
    let input_h = input_shape[2].unwrap_or(YOLO_INPUT_H) as u32;
    let input_w = input_shape[3].unwrap_or(YOLO_INPUT_W) as u32;

    if let Some(output_shape) = tensor_dims(&output.output_type) {
      ensure_detector_channels(self.model_path(), &output_shape, names.len())?;
    }

    let (input_name, output_name) = (input.name.clone(), output.name.clone());
    info!(
      "检测模型加载完成: {} ({}x{}, {} 个类别)",
      self.model_path(),
      input_w,
      input_h,
      names.len()
    );

    Ok(OnnxYolo {
      session: Mutex::new(session),
      input_name,
      output_name,
      input_w,
      input_h,
      names,
    })
  }
}

impl DetectorBackend for OnnxYolo {
  fn class_names(&self) -> &[String] {
    &self.names
  }

  fn detect(&self, image: &RgbImage, confidence: f32) -> Result<DetectResult, ModelError> {
    let (tensor, letterbox) = letterbox(image, self.input_w, self.input_h);
    let (shape, data) = run_session(&self.session, &self.input_name, &self.output_name, &tensor)?;

    if shape.len() != 3 || shape[1] <= YOLO_BOX_CHANNELS {
      return Err(ModelError::MalformedOutput(format!(
        "检测输出形状异常: {:?}",
        shape
      )));
    }
    let (classes, anchors) = (shape[1] - YOLO_BOX_CHANNELS, shape[2]);
    if data.len() < shape[1] * anchors {
      return Err(ModelError::MalformedOutput(format!(
        "检测输出长度 {} 小于 {:?}",
        data.len(),
        shape
      )));
    }

    let candidates = decode(&data, classes, anchors, &letterbox, confidence, &self.names);
    debug!("候选框数量: {}", candidates.len());

    let mut items = nms(candidates, YOLO_IOU_THRESHOLD);
    if items.len() > YOLO_MAX_DETECTIONS {
      warn!("检测数量 {} 超过上限，截断为 {}", items.len(), YOLO_MAX_DETECTIONS);
      items.truncate(YOLO_MAX_DETECTIONS);
    }

    Ok(DetectResult::from(items))
  }
}
