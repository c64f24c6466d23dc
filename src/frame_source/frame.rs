//! # 帧数据模型
//!
//! ## 设计思路
//!
//! 将“解码器原始输出”和“归一化结果”解耦：
//! - `Samples` 保留解码器给出的原始数值类型（8/16/32/64 位整数或浮点）
//! - `RawFrame` 描述一帧的宽、高、通道数（通道在最后一维）
//! - 归一化结果直接使用 `image::GrayImage`

/// 解码得到的原始样本缓冲。
///
/// 变体与 TIFF 解码结果一一对应，视频解码统一输出 `U8`。
#[derive(Debug, Clone, PartialEq)]
pub enum Samples {
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    U64(Vec<u64>),
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

macro_rules! for_each_variant {
    ($samples:expr, $values:ident => $body:expr) => {
        match $samples {
            Samples::U8($values) => $body,
            Samples::U16($values) => $body,
            Samples::U32($values) => $body,
            Samples::U64($values) => $body,
            Samples::I8($values) => $body,
            Samples::I16($values) => $body,
            Samples::I32($values) => $body,
            Samples::I64($values) => $body,
            Samples::F32($values) => $body,
            Samples::F64($values) => $body,
        }
    };
}

impl Samples {
    /// 样本总数（像素数 × 通道数）。
    pub fn len(&self) -> usize {
        for_each_variant!(self, values => values.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 按下标读取样本并提升为 `f64`。
    ///
    /// 越界返回 `0.0`；调用方在构造 `RawFrame` 时已保证长度一致。
    pub fn get(&self, index: usize) -> f64 {
        for_each_variant!(self, values => values.get(index).map_or(0.0, |v| *v as f64))
    }
}

/// 一帧原始图像：二维灰度或通道在最后一维的三维彩色数组。
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    width: u32,
    height: u32,
    channels: usize,
    samples: Samples,
}

impl RawFrame {
    /// 构造一帧，要求 `samples.len() == width * height * channels`。
    ///
    /// 尺寸为零或长度不一致时返回 `None`。
    pub fn new(width: u32, height: u32, channels: usize, samples: Samples) -> Option<Self> {
        if width == 0 || height == 0 || channels == 0 {
            return None;
        }

        let expected = (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(channels)?;
        if samples.len() != expected {
            return None;
        }

        Some(Self {
            width,
            height,
            channels,
            samples,
        })
    }

    /// 单通道 8 位灰度帧。
    pub fn gray8(width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        Self::new(width, height, 1, Samples::U8(pixels))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn samples(&self) -> &Samples {
        &self.samples
    }

    /// 像素总数。
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// 读取第 `pixel` 个像素的第 `channel` 个通道。
    pub fn value(&self, pixel: usize, channel: usize) -> f64 {
        self.samples.get(pixel * self.channels + channel)
    }
}
