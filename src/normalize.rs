//! # 灰度归一化模块
//!
//! ## 设计思路
//!
//! 把任意原始帧（彩色或单通道、任意数值范围）映射为规范的 8 位单通道图像。
//! 是否重缩放只看峰值，不看位深：16 位帧若峰值低于 256，原样输出。
//!
//! ## 实现思路
//!
//! 1. 通道归约：三通道及以上按亮度权重加权求和（四舍五入），双通道取第一通道
//! 2. 取最大值，`max >= 256` 时整体线性缩放到 `[0, 255]`，并输出 debug 统计
//! 3. 截断转换为 `u8`（越界值饱和，NaN 视为 0）

use image::GrayImage;
use serde::Serialize;

use crate::frame_source::RawFrame;

/// 亮度权重（R, G, B）。
pub const LUMA_WEIGHTS: [f64; 3] = [0.299, 0.587, 0.114];

/// 峰值达到该阈值时触发重缩放。
pub const RESCALE_THRESHOLD: f64 = 256.0;

/// 按亮度权重合成单个灰度值，四舍五入到整数。
pub fn luma(r: f64, g: f64, b: f64) -> f64 {
    (LUMA_WEIGHTS[0] * r + LUMA_WEIGHTS[1] * g + LUMA_WEIGHTS[2] * b).round()
}

/// `luma` 的 8 位快捷版本，视频解码器用它在解码层面直接输出灰度。
pub(crate) fn luma8(r: u8, g: u8, b: u8) -> u8 {
    luma(r as f64, g as f64, b as f64) as u8
}

/// 将原始帧归一化为 8 位灰度图像。
///
/// 该函数是全函数：任何合法的 `RawFrame` 都有输出，不存在错误分支。
///
/// # 示例
/// ```rust
/// use tiff_play::frame_source::{RawFrame, Samples};
/// use tiff_play::normalize::to_grayscale;
///
/// let frame = RawFrame::new(2, 1, 1, Samples::U16(vec![0, 4095])).unwrap();
/// let gray = to_grayscale(&frame);
/// assert_eq!(gray.as_raw(), &vec![0u8, 255]);
/// ```
pub fn to_grayscale(frame: &RawFrame) -> GrayImage {
    let values = reduce_channels(frame);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let mut gray = GrayImage::new(frame.width(), frame.height());

    if max >= RESCALE_THRESHOLD {
        if log::log_enabled!(log::Level::Debug) {
            let stats = FrameStats::from_values(frame, &values);
            log::debug!("🎚️ 峰值超出 8 位范围，转换为灰度");
            log::debug!(
                "Max={}, min={}, std={:.4}",
                stats.max,
                stats.min,
                stats.std
            );
        }

        for (dst, value) in gray.iter_mut().zip(&values) {
            *dst = truncate_u8(255.0 * (value / max));
        }
    } else {
        for (dst, value) in gray.iter_mut().zip(&values) {
            *dst = truncate_u8(*value);
        }
    }

    gray
}

/// 通道归约后的逐像素数值。
fn reduce_channels(frame: &RawFrame) -> Vec<f64> {
    let pixels = frame.pixel_count();

    if frame.channels() >= 3 {
        (0..pixels)
            .map(|px| luma(frame.value(px, 0), frame.value(px, 1), frame.value(px, 2)))
            .collect()
    } else {
        // 单通道原样；灰度 + alpha 只取灰度
        (0..pixels).map(|px| frame.value(px, 0)).collect()
    }
}

/// 截断为 `u8`：向零取整，越界饱和。
fn truncate_u8(value: f64) -> u8 {
    value.trunc() as u8
}

/// 一帧在通道归约后的统计信息。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameStats {
    pub width: u32,
    pub height: u32,
    pub channels: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// 总体标准差（除以 N）。
    pub std: f64,
    /// 归一化时是否会触发重缩放。
    pub rescaled: bool,
}

impl FrameStats {
    /// 统计原始帧。
    pub fn measure(frame: &RawFrame) -> Self {
        let values = reduce_channels(frame);
        Self::from_values(frame, &values)
    }

    fn from_values(frame: &RawFrame, values: &[f64]) -> Self {
        let count = values.len().max(1) as f64;

        let (min, max, sum) = values.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY, 0.0),
            |(min, max, sum), v| (min.min(*v), max.max(*v), sum + v),
        );
        let mean = sum / count;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count;

        Self {
            width: frame.width(),
            height: frame.height(),
            channels: frame.channels(),
            min,
            max,
            mean,
            std: variance.sqrt(),
            rescaled: max >= RESCALE_THRESHOLD,
        }
    }
}
