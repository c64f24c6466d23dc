//! 多页 TIFF 解码。
//!
//! 先读当前页，之后每次在“仍有下一页”时前进一页；没有下一页是正常结束，不是错误。

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use tiff::ColorType;
use tiff::decoder::{Decoder, DecodingResult, Limits};

use super::frame::{RawFrame, Samples};
use crate::config::DecodeLimits;
use crate::error::PlayError;

pub(super) struct TiffFrames {
    decoder: Decoder<BufReader<File>>,
    limits: DecodeLimits,
    started: bool,
}

impl TiffFrames {
    pub(super) fn open(path: &Path, limits: &DecodeLimits) -> Result<Self, PlayError> {
        let file = File::open(path)
            .map_err(|e| PlayError::FileSystem(format!("无法打开 {}：{}", path.display(), e)))?;

        let mut tiff_limits = Limits::default();
        tiff_limits.decoding_buffer_size =
            usize::try_from(limits.max_decoded_bytes).unwrap_or(usize::MAX);

        let decoder = Decoder::new(BufReader::new(file))
            .map_err(|e| PlayError::decode(0, format!("无法读取 TIFF 头：{}", e)))?
            .with_limits(tiff_limits);

        Ok(Self {
            decoder,
            limits: *limits,
            started: false,
        })
    }

    pub(super) fn next_frame(&mut self, index: usize) -> Result<Option<RawFrame>, PlayError> {
        if self.started {
            if !self.decoder.more_images() {
                return Ok(None);
            }
            self.decoder
                .next_image()
                .map_err(|e| PlayError::decode(index, format!("无法定位下一页：{}", e)))?;
        }
        self.started = true;

        let (width, height) = self
            .decoder
            .dimensions()
            .map_err(|e| PlayError::decode(index, format!("无法读取页尺寸：{}", e)))?;
        let colortype = self
            .decoder
            .colortype()
            .map_err(|e| PlayError::decode(index, format!("无法读取像素类型：{}", e)))?;

        self.limits
            .check_bytes(width, height, bytes_per_pixel(colortype))?;

        let image = self
            .decoder
            .read_image()
            .map_err(|e| PlayError::decode(index, format!("页数据读取失败：{}", e)))?;
        let samples = into_samples(image)
            .ok_or_else(|| PlayError::decode(index, format!("不支持的样本类型：{:?}", colortype)))?;

        let pixels = width as usize * height as usize;
        if pixels == 0 || samples.len() % pixels != 0 {
            return Err(PlayError::decode(
                index,
                format!("样本数 {} 与尺寸 {}x{} 不匹配", samples.len(), width, height),
            ));
        }
        let channels = samples.len() / pixels;

        log::trace!(
            "TIFF 第 {} 页：{}x{} {:?} {} 通道",
            index,
            width,
            height,
            colortype,
            channels
        );

        RawFrame::new(width, height, channels, samples)
            .map(Some)
            .ok_or_else(|| PlayError::decode(index, "帧形状不合法"))
    }
}

/// 按色彩类型估算每像素字节数，用于解码前的内存上限检查。
fn bytes_per_pixel(colortype: ColorType) -> u64 {
    let bits = match colortype {
        ColorType::Gray(b) | ColorType::Palette(b) => b as u64,
        ColorType::GrayA(b) => 2 * b as u64,
        ColorType::RGB(b) | ColorType::YCbCr(b) => 3 * b as u64,
        ColorType::RGBA(b) | ColorType::CMYK(b) => 4 * b as u64,
        #[allow(unreachable_patterns)]
        _ => 64,
    };
    bits.div_ceil(8).max(1)
}

fn into_samples(image: DecodingResult) -> Option<Samples> {
    let samples = match image {
        DecodingResult::U8(v) => Samples::U8(v),
        DecodingResult::U16(v) => Samples::U16(v),
        DecodingResult::U32(v) => Samples::U32(v),
        DecodingResult::U64(v) => Samples::U64(v),
        DecodingResult::I8(v) => Samples::I8(v),
        DecodingResult::I16(v) => Samples::I16(v),
        DecodingResult::I32(v) => Samples::I32(v),
        DecodingResult::I64(v) => Samples::I64(v),
        DecodingResult::F32(v) => Samples::F32(v),
        DecodingResult::F64(v) => Samples::F64(v),
        #[allow(unreachable_patterns)]
        _ => return None,
    };
    Some(samples)
}
