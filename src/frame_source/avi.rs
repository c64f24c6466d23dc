//! AVI（RIFF）容器解码。
//!
//! ## 实现思路
//!
//! 1. 校验 `RIFF....AVI ` 头，扫描顶层块找到 `LIST hdrl` 与 `LIST movi`
//! 2. 在 `hdrl` 中取第一个 `vids` 流的 `strh` / `strf`（BITMAPINFOHEADER）
//! 3. 顺序读取 `movi` 中属于该流的 `##dc` / `##db` 块，`LIST rec ` 视为透明
//! 4. `movi` 读完后继续寻找 OpenDML 扩展段 `RIFF AVIX` 中的下一个 `movi`
//!
//! 支持 Motion-JPEG 与未压缩 DIB（8 / 24 / 32 位），解码后直接转为灰度。
//! 不依赖 `idx1` 索引；长度为 0 的块（丢帧）跳过。

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use image::{DynamicImage, ImageFormat};

use super::frame::RawFrame;
use crate::config::DecodeLimits;
use crate::error::PlayError;
use crate::normalize::luma8;

/// `hdrl` 列表允许的最大体积，超过视为损坏文件。
const MAX_HEADER_LIST_BYTES: u32 = 16 * 1024 * 1024;

type FourCc = [u8; 4];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DibLayout {
    Indexed8,
    Bgr24,
    Bgrx32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Codec {
    Mjpeg,
    Dib(DibLayout),
}

/// 第一个视频流的解码参数。
#[derive(Debug, Clone, PartialEq)]
struct VideoStream {
    index: usize,
    codec: Codec,
    width: u32,
    height: u32,
    bottom_up: bool,
    palette: Vec<[u8; 3]>,
}

struct ChunkHeader {
    id: FourCc,
    size: u32,
    data_start: u64,
}

impl ChunkHeader {
    /// 下一个同级块的位置（数据按 2 字节对齐）。
    fn next(&self) -> u64 {
        self.data_start + self.size as u64 + (self.size & 1) as u64
    }
}

/// 当前 `movi` 列表的数据结束位置与之后顶层扫描的恢复位置。
#[derive(Debug, Clone, Copy)]
struct MoviRange {
    end: u64,
    resume: u64,
}

pub(super) struct AviFrames {
    reader: BufReader<File>,
    file_len: u64,
    riff_end: u64,
    pos: u64,
    movi: Option<MoviRange>,
    stream: VideoStream,
    limits: DecodeLimits,
    payload: Vec<u8>,
}

impl AviFrames {
    pub(super) fn open(path: &Path, limits: &DecodeLimits) -> Result<Self, PlayError> {
        let file = File::open(path)
            .map_err(|e| PlayError::FileSystem(format!("无法打开 {}：{}", path.display(), e)))?;
        let file_len = file
            .metadata()
            .map_err(|e| PlayError::FileSystem(format!("无法读取文件信息：{}", e)))?
            .len();

        let mut reader = BufReader::new(file);
        let mut head = [0u8; 12];
        read_at(&mut reader, 0, &mut head)
            .map_err(|e| PlayError::decode(0, format!("无法读取 AVI 头：{}", e)))?;
        if &head[0..4] != b"RIFF" || &head[8..12] != b"AVI " {
            return Err(PlayError::decode(0, "不是 AVI 文件（缺少 RIFF/AVI 标记）"));
        }
        let riff_size = u32::from_le_bytes([head[4], head[5], head[6], head[7]]) as u64;

        let mut frames = Self {
            reader,
            file_len,
            riff_end: (8 + riff_size).min(file_len),
            pos: 12,
            movi: None,
            stream: VideoStream {
                index: 0,
                codec: Codec::Mjpeg,
                width: 0,
                height: 0,
                bottom_up: false,
                palette: Vec::new(),
            },
            limits: *limits,
            payload: Vec::new(),
        };

        let mut stream = None;
        loop {
            let Some(header) = frames.read_header(frames.pos, frames.riff_end)? else {
                return Err(PlayError::decode(0, "AVI 中没有 movi 列表"));
            };

            if &header.id == b"LIST" {
                let list_type = frames.read_list_type(&header)?;
                if &list_type == b"hdrl" {
                    stream = Some(frames.read_header_list(&header)?);
                } else if &list_type == b"movi" {
                    frames.movi = Some(MoviRange {
                        end: header.data_start + header.size as u64,
                        resume: header.next(),
                    });
                    frames.pos = header.data_start + 4;
                    break;
                }
            }
            frames.pos = header.next();
        }

        frames.stream =
            stream.ok_or_else(|| PlayError::decode(0, "AVI 在 movi 之前没有视频流头"))?;
        limits.check_pixels(frames.stream.width, frames.stream.height)?;

        log::info!(
            "🎞️ AVI 视频流 #{} - {}x{} 编码 {:?}",
            frames.stream.index,
            frames.stream.width,
            frames.stream.height,
            frames.stream.codec
        );

        Ok(frames)
    }

    pub(super) fn next_frame(&mut self, index: usize) -> Result<Option<RawFrame>, PlayError> {
        loop {
            let movi = match self.movi {
                Some(movi) => movi,
                None => match self.find_next_movi()? {
                    Some(movi) => movi,
                    None => return Ok(None),
                },
            };

            if self.pos + 8 > movi.end {
                self.pos = movi.resume;
                self.movi = None;
                continue;
            }
            let header = self
                .read_header(self.pos, movi.end)
                .map_err(|e| reindex(e, index))?
                .ok_or_else(|| PlayError::decode(index, "数据块头被截断"))?;

            if &header.id == b"LIST" {
                let list_type = self.read_list_type(&header).map_err(|e| reindex(e, index))?;
                // rec 列表内的块按顺序平铺读取
                self.pos = if &list_type == b"rec " {
                    header.data_start + 4
                } else {
                    header.next()
                };
                continue;
            }

            self.pos = header.next();
            if header.size == 0 || !self.is_frame_chunk(&header.id) {
                continue;
            }

            if header.data_start + header.size as u64 > self.file_len {
                return Err(PlayError::decode(
                    index,
                    format!(
                        "数据块 {} 被截断（声明 {} 字节，文件仅剩 {} 字节）",
                        fourcc_str(&header.id),
                        header.size,
                        self.file_len.saturating_sub(header.data_start)
                    ),
                ));
            }
            if header.size as u64 > self.limits.max_decoded_bytes {
                return Err(PlayError::ResourceLimit(format!(
                    "第 {} 帧数据块过大：{} 字节",
                    index, header.size
                )));
            }

            self.payload.resize(header.size as usize, 0);
            read_at(&mut self.reader, header.data_start, &mut self.payload)
                .map_err(|e| PlayError::decode(index, format!("帧数据读取失败：{}", e)))?;

            return self.decode_payload(index).map(Some);
        }
    }

    /// 在顶层继续寻找下一个 `movi`，必要时进入 `RIFF AVIX` 扩展段。
    fn find_next_movi(&mut self) -> Result<Option<MoviRange>, PlayError> {
        loop {
            if self.pos + 8 > self.riff_end {
                // 当前 RIFF 段结束，检查是否紧跟 AVIX 扩展段
                let next_riff = self.riff_end + (self.riff_end & 1);
                let mut head = [0u8; 12];
                if next_riff + 12 > self.file_len
                    || read_at(&mut self.reader, next_riff, &mut head).is_err()
                    || &head[0..4] != b"RIFF"
                    || &head[8..12] != b"AVIX"
                {
                    return Ok(None);
                }
                let size = u32::from_le_bytes([head[4], head[5], head[6], head[7]]) as u64;
                self.riff_end = (next_riff + 8 + size).min(self.file_len);
                self.pos = next_riff + 12;
                continue;
            }

            let Some(header) = self.read_header(self.pos, self.riff_end)? else {
                return Ok(None);
            };

            if &header.id == b"LIST" && &self.read_list_type(&header)? == b"movi" {
                let movi = MoviRange {
                    end: header.data_start + header.size as u64,
                    resume: header.next(),
                };
                self.pos = header.data_start + 4;
                self.movi = Some(movi);
                return Ok(Some(movi));
            }
            self.pos = header.next();
        }
    }

    fn read_header(&mut self, pos: u64, end: u64) -> Result<Option<ChunkHeader>, PlayError> {
        if pos + 8 > end || pos + 8 > self.file_len {
            return Ok(None);
        }

        let mut buf = [0u8; 8];
        read_at(&mut self.reader, pos, &mut buf)
            .map_err(|e| PlayError::decode(0, format!("块头读取失败：{}", e)))?;

        Ok(Some(ChunkHeader {
            id: [buf[0], buf[1], buf[2], buf[3]],
            size: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
            data_start: pos + 8,
        }))
    }

    fn read_list_type(&mut self, header: &ChunkHeader) -> Result<FourCc, PlayError> {
        if header.size < 4 {
            return Err(PlayError::decode(0, "LIST 块长度不足"));
        }
        let mut list_type = [0u8; 4];
        read_at(&mut self.reader, header.data_start, &mut list_type)
            .map_err(|e| PlayError::decode(0, format!("LIST 类型读取失败：{}", e)))?;
        Ok(list_type)
    }

    fn read_header_list(&mut self, header: &ChunkHeader) -> Result<VideoStream, PlayError> {
        if header.size > MAX_HEADER_LIST_BYTES {
            return Err(PlayError::decode(0, format!("hdrl 列表过大：{} 字节", header.size)));
        }
        let mut body = vec![0u8; header.size as usize - 4];
        read_at(&mut self.reader, header.data_start + 4, &mut body)
            .map_err(|e| PlayError::decode(0, format!("hdrl 读取失败：{}", e)))?;

        parse_header_list(&body)
    }

    /// 是否为所选视频流的帧数据块（`NNdc` 压缩帧 / `NNdb` 未压缩帧）。
    fn is_frame_chunk(&self, id: &FourCc) -> bool {
        let tag = &id[2..4];
        if tag != b"dc" && tag != b"db" {
            return false;
        }
        let digits = std::str::from_utf8(&id[0..2]).ok();
        digits.and_then(|d| d.parse::<usize>().ok()) == Some(self.stream.index)
    }

    fn decode_payload(&self, index: usize) -> Result<RawFrame, PlayError> {
        let stream = &self.stream;
        let data = self.payload.as_slice();

        match stream.codec {
            Codec::Mjpeg => {
                let image = image::load_from_memory_with_format(data, ImageFormat::Jpeg)
                    .map_err(|e| PlayError::decode(index, format!("MJPEG 帧解码失败：{}", e)))?;
                let (width, height) = (image.width(), image.height());
                self.limits.check_pixels(width, height)?;

                let gray = match image {
                    DynamicImage::ImageLuma8(luma) => luma.into_raw(),
                    other => other
                        .to_rgb8()
                        .pixels()
                        .map(|px| luma8(px[0], px[1], px[2]))
                        .collect(),
                };

                RawFrame::gray8(width, height, gray)
                    .ok_or_else(|| PlayError::decode(index, "MJPEG 帧尺寸异常"))
            }
            Codec::Dib(layout) => decode_dib(stream, layout, data)
                .ok_or_else(|| {
                    PlayError::decode(
                        index,
                        format!("未压缩帧数据不足：{} 字节", data.len()),
                    )
                }),
        }
    }
}

/// 解析 `hdrl` 列表体（不含列表类型），返回第一个视频流。
fn parse_header_list(body: &[u8]) -> Result<VideoStream, PlayError> {
    let mut stream_index = 0;

    for (id, chunk) in sub_chunks(body) {
        if &id != b"LIST" || chunk.len() < 4 || &chunk[0..4] != b"strl" {
            continue;
        }

        let mut stream_type = None;
        let mut format = None;
        for (sub_id, sub) in sub_chunks(&chunk[4..]) {
            match &sub_id {
                b"strh" if sub.len() >= 8 => stream_type = Some([sub[0], sub[1], sub[2], sub[3]]),
                b"strf" => format = Some(sub),
                _ => {}
            }
        }

        if stream_type.as_ref() == Some(b"vids") {
            let format =
                format.ok_or_else(|| PlayError::decode(0, "视频流缺少 strf 格式块"))?;
            return parse_bitmap_info(stream_index, format);
        }
        stream_index += 1;
    }

    Err(PlayError::UnsupportedFormat("AVI 中没有视频流".to_string()))
}

/// 解析 BITMAPINFOHEADER。
fn parse_bitmap_info(index: usize, data: &[u8]) -> Result<VideoStream, PlayError> {
    if data.len() < 40 {
        return Err(PlayError::decode(0, "BITMAPINFOHEADER 长度不足"));
    }

    let header_size = le_u32(data, 0) as usize;
    let width = le_u32(data, 4) as i32;
    let height = le_u32(data, 8) as i32;
    let bit_count = u16::from_le_bytes([data[14], data[15]]);
    let compression: FourCc = [data[16], data[17], data[18], data[19]];
    let colors_used = le_u32(data, 32) as usize;

    if width <= 0 || height == 0 {
        return Err(PlayError::decode(0, format!("视频尺寸非法：{}x{}", width, height)));
    }

    let codec = if compression.eq_ignore_ascii_case(b"MJPG") {
        Codec::Mjpeg
    } else if compression == [0, 0, 0, 0] || &compression == b"DIB " || &compression == b"RGB " {
        match bit_count {
            8 => Codec::Dib(DibLayout::Indexed8),
            24 => Codec::Dib(DibLayout::Bgr24),
            32 => Codec::Dib(DibLayout::Bgrx32),
            other => {
                return Err(PlayError::UnsupportedFormat(format!(
                    "未压缩 AVI 位深 {} 暂不支持（支持：8 / 24 / 32）",
                    other
                )));
            }
        }
    } else {
        return Err(PlayError::UnsupportedFormat(format!(
            "AVI 视频编码 '{}' 暂不支持（支持：MJPG / 未压缩 DIB）",
            fourcc_str(&compression)
        )));
    };

    let mut palette = Vec::new();
    if codec == Codec::Dib(DibLayout::Indexed8) {
        let count = if colors_used == 0 { 256 } else { colors_used.min(256) };
        let table = data.get(header_size.max(40)..).unwrap_or(&[]);
        palette = table
            .chunks_exact(4)
            .take(count)
            .map(|entry| [entry[2], entry[1], entry[0]])
            .collect();
    }

    Ok(VideoStream {
        index,
        codec,
        width: width as u32,
        height: height.unsigned_abs(),
        bottom_up: height > 0,
        palette,
    })
}

/// 未压缩 DIB 帧转灰度。行按 4 字节对齐，默认自底向上存储。
fn decode_dib(stream: &VideoStream, layout: DibLayout, data: &[u8]) -> Option<RawFrame> {
    let width = stream.width as usize;
    let height = stream.height as usize;
    let bytes_per_pixel = match layout {
        DibLayout::Indexed8 => 1,
        DibLayout::Bgr24 => 3,
        DibLayout::Bgrx32 => 4,
    };
    let stride = (width * bytes_per_pixel * 8).div_ceil(32) * 4;
    if data.len() < stride.checked_mul(height)? {
        return None;
    }

    let mut gray = Vec::with_capacity(width * height);
    for row in 0..height {
        let src_row = if stream.bottom_up { height - 1 - row } else { row };
        let line = &data[src_row * stride..src_row * stride + width * bytes_per_pixel];

        match layout {
            DibLayout::Indexed8 => gray.extend(line.iter().map(|&i| {
                stream
                    .palette
                    .get(i as usize)
                    .map_or(i, |[r, g, b]| luma8(*r, *g, *b))
            })),
            DibLayout::Bgr24 | DibLayout::Bgrx32 => gray.extend(
                line.chunks_exact(bytes_per_pixel)
                    .map(|px| luma8(px[2], px[1], px[0])),
            ),
        }
    }

    RawFrame::gray8(stream.width, stream.height, gray)
}

/// 切分 RIFF 块序列，遇到截断的块即停止。
fn sub_chunks(mut data: &[u8]) -> Vec<(FourCc, &[u8])> {
    let mut chunks = Vec::new();

    while data.len() >= 8 {
        let id = [data[0], data[1], data[2], data[3]];
        let size = le_u32(data, 4) as usize;
        let Some(body) = data.get(8..8 + size) else {
            break;
        };
        chunks.push((id, body));

        let next = (8 + size + (size & 1)).min(data.len());
        data = &data[next..];
    }

    chunks
}

fn le_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

fn fourcc_str(id: &FourCc) -> String {
    id.iter()
        .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '?' })
        .collect()
}

fn read_at<R: Read + Seek>(reader: &mut R, pos: u64, buf: &mut [u8]) -> std::io::Result<()> {
    reader.seek(SeekFrom::Start(pos))?;
    reader.read_exact(buf)
}

/// 扫描阶段产生的解码错误带的是占位序号，改写为当前帧序号。
fn reindex(error: PlayError, index: usize) -> PlayError {
    match error {
        PlayError::Decode { reason, .. } => PlayError::Decode { index, reason },
        other => other,
    }
}
