//! MP4 / H.264 解码。
//!
//! 样本是 AVCC 格式（大端长度前缀的 NAL，前缀宽度由 `avcC` 的
//! `lengthSizeMinusOne` 给出），送入 OpenH264 前改写为 Annex-B 起始码格式；
//! SPS/PPS 只在第一个样本前送一次。样本读完后向解码器发送流结束信号，
//! 取出仍缓存在解码器中的图像（帧重排序的流在末尾会有积压）。

use std::collections::VecDeque;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use mp4::{MediaType, Mp4Reader, TrackType};
use openh264::decoder::{DecodedYUV, Decoder};

use super::frame::RawFrame;
use crate::config::DecodeLimits;
use crate::error::PlayError;
use crate::normalize::luma8;

const START_CODE: [u8; 4] = [0, 0, 0, 1];

/// H.264 解码图像缓冲（DPB）的最大帧数，流结束时最多取出这么多帧。
const MAX_BUFFERED_PICTURES: usize = 16;

pub(super) struct Mp4Frames {
    reader: Mp4Reader<BufReader<File>>,
    track_id: u32,
    sample_count: u32,
    /// 下一个要读取的样本编号（从 1 开始）。
    next_sample: u32,
    decoder: Decoder,
    limits: DecodeLimits,
    parameter_sets: Option<Vec<u8>>,
    /// NAL 长度前缀的字节数（1 / 2 / 4）。
    nal_length_size: usize,
    annexb: Vec<u8>,
    rgb: Vec<u8>,
    /// 流结束后从解码器取出、尚未交出的帧。
    pending: VecDeque<Result<RawFrame, PlayError>>,
    drained: bool,
}

impl Mp4Frames {
    pub(super) fn open(path: &Path, limits: &DecodeLimits) -> Result<Self, PlayError> {
        let file = File::open(path)
            .map_err(|e| PlayError::FileSystem(format!("无法打开 {}：{}", path.display(), e)))?;
        let size = file
            .metadata()
            .map_err(|e| PlayError::FileSystem(format!("无法读取文件信息：{}", e)))?
            .len();

        let reader = Mp4Reader::read_header(BufReader::new(file), size)
            .map_err(|e| PlayError::decode(0, format!("无法读取 MP4 头：{}", e)))?;

        let track = reader
            .tracks()
            .values()
            .filter(|t| matches!(t.track_type(), Ok(TrackType::Video)))
            .min_by_key(|t| t.track_id())
            .ok_or_else(|| PlayError::UnsupportedFormat("MP4 中没有视频轨道".to_string()))?;

        match track.media_type() {
            Ok(MediaType::H264) => {}
            Ok(other) => {
                return Err(PlayError::UnsupportedFormat(format!(
                    "MP4 视频编码 {:?} 暂不支持（仅支持 H.264）",
                    other
                )));
            }
            Err(e) => return Err(PlayError::decode(0, format!("无法识别视频编码：{}", e))),
        }

        let sps = track
            .sequence_parameter_set()
            .map_err(|e| PlayError::decode(0, format!("缺少 SPS：{}", e)))?;
        let pps = track
            .picture_parameter_set()
            .map_err(|e| PlayError::decode(0, format!("缺少 PPS：{}", e)))?;

        let mut parameter_sets = Vec::with_capacity(sps.len() + pps.len() + 8);
        parameter_sets.extend_from_slice(&START_CODE);
        parameter_sets.extend_from_slice(sps);
        parameter_sets.extend_from_slice(&START_CODE);
        parameter_sets.extend_from_slice(pps);

        let nal_length_size = track
            .trak
            .mdia
            .minf
            .stbl
            .stsd
            .avc1
            .as_ref()
            .map_or(4, |avc1| (avc1.avcc.length_size_minus_one & 0x3) as usize + 1);
        if nal_length_size == 3 {
            return Err(PlayError::decode(0, "avcC 中的 NAL 长度前缀宽度 3 不合法"));
        }

        limits.check_pixels(track.width() as u32, track.height() as u32)?;

        let track_id = track.track_id();
        let sample_count = track.sample_count();

        log::info!(
            "🎞️ MP4 视频轨道 #{} - {}x{} 共 {} 个样本（NAL 长度前缀 {} 字节）",
            track_id,
            track.width(),
            track.height(),
            sample_count,
            nal_length_size
        );

        let decoder = Decoder::new()
            .map_err(|e| PlayError::decode(0, format!("OpenH264 初始化失败：{}", e)))?;

        Ok(Self {
            reader,
            track_id,
            sample_count,
            next_sample: 1,
            decoder,
            limits: *limits,
            parameter_sets: Some(parameter_sets),
            nal_length_size,
            annexb: Vec::new(),
            rgb: Vec::new(),
            pending: VecDeque::new(),
            drained: false,
        })
    }

    pub(super) fn next_frame(&mut self, index: usize) -> Result<Option<RawFrame>, PlayError> {
        if let Some(frame) = self.pending.pop_front() {
            return frame.map(Some);
        }

        while self.next_sample <= self.sample_count {
            let sample_id = self.next_sample;
            self.next_sample += 1;

            let sample = self
                .reader
                .read_sample(self.track_id, sample_id)
                .map_err(|e| PlayError::decode(index, format!("样本 {} 读取失败：{}", sample_id, e)))?;
            let Some(sample) = sample else {
                continue;
            };

            self.annexb.clear();
            if let Some(sets) = self.parameter_sets.take() {
                self.annexb.extend_from_slice(&sets);
            }
            avcc_to_annexb(&sample.bytes, self.nal_length_size, &mut self.annexb)
                .map_err(|reason| PlayError::decode(index, reason))?;

            let decoded = self
                .decoder
                .decode(&self.annexb)
                .map_err(|e| PlayError::decode(index, format!("H.264 解码失败：{}", e)))?;

            // 解码器尚未输出图像（参数集或参考帧缓冲），继续读下一个样本
            let Some(yuv) = decoded else {
                continue;
            };

            return yuv_to_gray(&yuv, &mut self.rgb, &self.limits, index).map(Some);
        }

        if !self.drained {
            self.drained = true;
            self.drain(index);
            return self.pending.pop_front().transpose();
        }

        Ok(None)
    }

    /// 发送流结束信号并取出解码器中剩余的图像，放入 `pending`。
    fn drain(&mut self, first_index: usize) {
        for offset in 0..MAX_BUFFERED_PICTURES {
            let index = first_index + offset;
            // 空输入即流结束，解码器据此输出重排序缓冲中的图像
            let frame = match self.decoder.decode(&[]) {
                Ok(Some(yuv)) => yuv_to_gray(&yuv, &mut self.rgb, &self.limits, index),
                Ok(None) => break,
                Err(e) => {
                    log::debug!("流结束后解码器不再输出图像：{}", e);
                    break;
                }
            };

            let failed = frame.is_err();
            self.pending.push_back(frame);
            if failed {
                break;
            }
        }

        if !self.pending.is_empty() {
            log::debug!("流结束后从解码器取出 {} 帧", self.pending.len());
        }
    }
}

/// 解码图像转为 8 位灰度帧。
fn yuv_to_gray(
    yuv: &DecodedYUV<'_>,
    rgb: &mut Vec<u8>,
    limits: &DecodeLimits,
    index: usize,
) -> Result<RawFrame, PlayError> {
    let (width, height) = yuv.dimension_rgb();
    limits.check_pixels(width as u32, height as u32)?;

    rgb.resize(width * height * 3, 0);
    yuv.write_rgb8(rgb);

    let gray = rgb
        .chunks_exact(3)
        .map(|px| luma8(px[0], px[1], px[2]))
        .collect();

    RawFrame::gray8(width as u32, height as u32, gray)
        .ok_or_else(|| PlayError::decode(index, "解码输出尺寸异常"))
}

/// 将 AVCC（`length_size` 字节大端长度前缀）样本改写为 Annex-B（起始码）并追加到 `out`。
pub(super) fn avcc_to_annexb(
    sample: &[u8],
    length_size: usize,
    out: &mut Vec<u8>,
) -> Result<(), String> {
    let mut rest = sample;

    while !rest.is_empty() {
        if rest.len() < length_size {
            return Err(format!("NAL 长度字段被截断（剩余 {} 字节）", rest.len()));
        }
        let (len_bytes, tail) = rest.split_at(length_size);
        let len = len_bytes
            .iter()
            .fold(0usize, |acc, byte| (acc << 8) | *byte as usize);
        if len > tail.len() {
            return Err(format!("NAL 长度 {} 超出样本剩余 {} 字节", len, tail.len()));
        }

        out.extend_from_slice(&START_CODE);
        out.extend_from_slice(&tail[..len]);
        rest = &tail[len..];
    }

    Ok(())
}
