//! # 预览模块（viewer）
//!
//! ## 设计思路
//!
//! 播放循环只做三件事：向帧源拉取一帧 → 归一化 → 交给 `FrameSink`。
//! 显示后端（窗口、无头、统计输出）都实现同一个 trait，循环本身不关心帧如何呈现。
//!
//! - `window`：minifb 预览窗口，负责帧间延迟
//! - `preview`：仅用于显示的降采样，不影响归一化结果
//! - `stats`：逐帧输出 JSON 统计行
//!
//! ## 实现思路
//!
//! 遇到第一个错误立即停止并返回，不输出部分结果之外的任何帧。

mod preview;
mod stats;
mod window;

use image::GrayImage;

use crate::error::PlayError;
use crate::frame_source::RawFrame;
use crate::normalize::to_grayscale;

pub use stats::StatsSink;
pub use window::WindowSink;

/// 帧显示后的流程控制。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkFlow {
    /// 继续下一帧
    Continue,
    /// 提前结束（例如窗口被关闭）
    Stop,
}

/// 归一化帧的接收端。
pub trait FrameSink {
    /// 呈现第 `index` 帧。`raw` 为归一化前的原始帧。
    fn show(&mut self, index: usize, raw: &RawFrame, gray: &GrayImage)
    -> Result<SinkFlow, PlayError>;
}

impl<S: FrameSink + ?Sized> FrameSink for Box<S> {
    fn show(
        &mut self,
        index: usize,
        raw: &RawFrame,
        gray: &GrayImage,
    ) -> Result<SinkFlow, PlayError> {
        (**self).show(index, raw, gray)
    }
}

/// 不显示任何内容，仅记录帧信息。
#[derive(Debug, Default)]
pub struct HeadlessSink;

impl FrameSink for HeadlessSink {
    fn show(
        &mut self,
        index: usize,
        _raw: &RawFrame,
        gray: &GrayImage,
    ) -> Result<SinkFlow, PlayError> {
        log::debug!("第 {} 帧：{}x{}", index, gray.width(), gray.height());
        Ok(SinkFlow::Continue)
    }
}

/// 一次播放的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaySummary {
    /// 已显示的帧数。
    pub frames_shown: usize,
    /// 是否因接收端要求而提前结束。
    pub stopped_early: bool,
}

/// 逐帧拉取、归一化并交给接收端。
///
/// # 示例
/// ```rust
/// use tiff_play::frame_source::RawFrame;
/// use tiff_play::viewer::{play, HeadlessSink};
///
/// let frames = vec![Ok(RawFrame::gray8(1, 1, vec![7]).unwrap())];
/// let summary = play(frames, &mut HeadlessSink).unwrap();
/// assert_eq!(summary.frames_shown, 1);
/// ```
pub fn play<I, S>(frames: I, sink: &mut S) -> Result<PlaySummary, PlayError>
where
    I: IntoIterator<Item = Result<RawFrame, PlayError>>,
    S: FrameSink + ?Sized,
{
    let mut frames_shown = 0;

    for (index, frame) in frames.into_iter().enumerate() {
        let frame = frame?;
        let gray = to_grayscale(&frame);

        let flow = sink.show(index, &frame, &gray)?;
        frames_shown += 1;

        if flow == SinkFlow::Stop {
            log::info!("⏹️ 播放在第 {} 帧后提前结束", index);
            return Ok(PlaySummary {
                frames_shown,
                stopped_early: true,
            });
        }
    }

    Ok(PlaySummary {
        frames_shown,
        stopped_early: false,
    })
}
