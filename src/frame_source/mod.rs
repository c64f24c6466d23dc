//! # 帧源模块（frame_source）
//!
//! ## 设计思路
//!
//! 给定文件路径，产出一个惰性、有限、只进、不可重启的原始帧序列。
//! 格式分派只看扩展名，各解码器只负责“读下一帧”：
//!
//! ```text
//! FrameSource::open(path)
//!    ↓
//! format.rs（扩展名 → SourceFormat，未知即 UnsupportedFormat）
//!    ├─ tiff_stack.rs（多页 TIFF，保留原始数值类型）
//!    ├─ avi.rs       （RIFF 扫描 + MJPEG / DIB，解码层转灰度）
//!    └─ mp4_video.rs （H.264 轨道 + OpenH264，解码层转灰度）
//!    ↓
//! Iterator<Item = Result<RawFrame, PlayError>>
//! ```
//!
//! ## 实现思路
//!
//! - `None` 是正常结束，与 `PlayError::Decode` 严格区分。
//! - 任一帧解码失败只产出一次错误，之后迭代器保持结束状态，不跳帧继续。
//! - 正常结束时记录一次成功读取的总帧数。
//! - 唯一的文件句柄归 `FrameSource` 所有，随其 drop 释放。

mod avi;
mod format;
mod frame;
mod mp4_video;
mod tiff_stack;

use std::iter::FusedIterator;
use std::path::{Path, PathBuf};

use crate::config::DecodeLimits;
use crate::error::PlayError;

pub use format::SourceFormat;
pub use frame::{RawFrame, Samples};

enum Decoder {
    Tiff(tiff_stack::TiffFrames),
    Avi(avi::AviFrames),
    Mp4(mp4_video::Mp4Frames),
}

impl Decoder {
    fn next_frame(&mut self, index: usize) -> Result<Option<RawFrame>, PlayError> {
        match self {
            Self::Tiff(frames) => frames.next_frame(index),
            Self::Avi(frames) => frames.next_frame(index),
            Self::Mp4(frames) => frames.next_frame(index),
        }
    }
}

/// 单个输入文件的帧序列。
pub struct FrameSource {
    path: PathBuf,
    format: SourceFormat,
    decoder: Decoder,
    frames_read: usize,
    finished: bool,
}

impl FrameSource {
    /// 按扩展名选择解码器并打开文件。
    ///
    /// # 示例
    /// ```rust,ignore
    /// use tiff_play::config::DecodeLimits;
    /// use tiff_play::frame_source::FrameSource;
    ///
    /// let source = FrameSource::open("stack.tiff", &DecodeLimits::default())?;
    /// for frame in source {
    ///     let frame = frame?;
    ///     println!("{}x{}", frame.width(), frame.height());
    /// }
    /// # Ok::<(), tiff_play::error::PlayError>(())
    /// ```
    pub fn open(path: impl AsRef<Path>, limits: &DecodeLimits) -> Result<Self, PlayError> {
        let path = path.as_ref();
        let format = SourceFormat::from_path(path)?;

        log::info!(
            "📂 打开输入文件 - 路径: {} 格式: {}{}",
            path.display(),
            format,
            if format.is_video() { "（视频，解码层转灰度）" } else { "" }
        );

        let decoder = match format {
            SourceFormat::Tiff => Decoder::Tiff(tiff_stack::TiffFrames::open(path, limits)?),
            SourceFormat::Avi => Decoder::Avi(avi::AviFrames::open(path, limits)?),
            SourceFormat::Mp4 => Decoder::Mp4(mp4_video::Mp4Frames::open(path, limits)?),
        };

        Ok(Self {
            path: path.to_path_buf(),
            format,
            decoder,
            frames_read: 0,
            finished: false,
        })
    }

    pub fn format(&self) -> SourceFormat {
        self.format
    }

    /// 已成功读取的帧数。
    pub fn frames_read(&self) -> usize {
        self.frames_read
    }
}

impl Iterator for FrameSource {
    type Item = Result<RawFrame, PlayError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.decoder.next_frame(self.frames_read) {
            Ok(Some(frame)) => {
                self.frames_read += 1;
                Some(Ok(frame))
            }
            Ok(None) => {
                self.finished = true;
                log::info!(
                    "📊 共读取 {} 帧 - 来源: {}",
                    self.frames_read,
                    self.path.display()
                );
                None
            }
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}

impl FusedIterator for FrameSource {}
