//! 逐帧 JSON 统计输出。
//!
//! 每帧一行：`{"index":0,"width":..,"height":..,"channels":..,"min":..,"max":..,"mean":..,"std":..,"rescaled":..}`，
//! 写出后再把帧交给内层接收端。

use std::io::Write;

use image::GrayImage;
use serde::Serialize;

use super::{FrameSink, SinkFlow};
use crate::error::PlayError;
use crate::frame_source::RawFrame;
use crate::normalize::FrameStats;

#[derive(Serialize)]
struct StatsLine {
    index: usize,
    #[serde(flatten)]
    stats: FrameStats,
}

/// 包装另一个接收端，在其之前输出统计行。
pub struct StatsSink<S, W> {
    inner: S,
    out: W,
}

impl<S, W> StatsSink<S, W> {
    pub fn new(inner: S, out: W) -> Self {
        Self { inner, out }
    }

    pub fn into_parts(self) -> (S, W) {
        (self.inner, self.out)
    }
}

impl<S: FrameSink, W: Write> FrameSink for StatsSink<S, W> {
    fn show(
        &mut self,
        index: usize,
        raw: &RawFrame,
        gray: &GrayImage,
    ) -> Result<SinkFlow, PlayError> {
        let line = StatsLine {
            index,
            stats: FrameStats::measure(raw),
        };

        let json = serde_json::to_string(&line)
            .map_err(|e| PlayError::Display(format!("统计信息序列化失败：{}", e)))?;
        writeln!(self.out, "{}", json)?;

        self.inner.show(index, raw, gray)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viewer::{HeadlessSink, play};

    #[test]
    fn writes_one_json_line_per_frame() {
        let frames = vec![
            Ok(RawFrame::gray8(2, 1, vec![0, 10]).expect("frame")),
            Ok(RawFrame::gray8(2, 1, vec![5, 5]).expect("frame")),
        ];
        let mut sink = StatsSink::new(HeadlessSink, Vec::new());

        play(frames, &mut sink).expect("play");

        let (_, out) = sink.into_parts();
        let text = String::from_utf8(out).expect("utf8");
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).expect("json line"))
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["index"], 0);
        assert_eq!(lines[0]["max"], 10.0);
        assert_eq!(lines[1]["index"], 1);
        assert_eq!(lines[1]["std"], 0.0);
        assert_eq!(lines[1]["rescaled"], false);
    }
}
