//! # tiff-play — 库入口
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  main ── cli::Cli (clap) ── resolve() → Invocation       │
//! │                         │                                │
//! │                       run()                              │
//! └─────────────────────────┼────────────────────────────────┘
//!                           ↓
//! ┌──────────────────────────────────────────────────────────┐
//! │  frame_source ── FrameSource (Iterator)                  │
//! │   ├─ tiff_stack   多页 TIFF（保留原始数值类型）            │
//! │   ├─ avi          RIFF 扫描 + MJPEG / DIB                 │
//! │   └─ mp4_video    H.264 轨道 + OpenH264                   │
//! │                         ↓ RawFrame                        │
//! │  normalize ──── to_grayscale → GrayImage                 │
//! │                         ↓                                 │
//! │  viewer ─────── play → FrameSink                         │
//! │   ├─ WindowSink   minifb 预览窗口 + 帧间延迟              │
//! │   ├─ HeadlessSink 无显示                                  │
//! │   └─ StatsSink    JSON 统计行                             │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`error`] | 统一错误类型 `PlayError` 与退出码映射 |
//! | [`config`] | `PlayerConfig`、解码上限与预览参数 |
//! | [`cli`] | 命令行解析，生成 `Invocation` |
//! | [`frame_source`] | 按扩展名分派解码器，惰性产出原始帧 |
//! | [`normalize`] | 通道归约、阈值重缩放、截断为 8 位灰度 |
//! | [`viewer`] | 播放循环与各类帧接收端 |

pub mod cli;
pub mod config;
pub mod error;
pub mod frame_source;
pub mod normalize;
pub mod viewer;

use std::io;

use cli::Invocation;
use error::PlayError;
use frame_source::FrameSource;
use viewer::{FrameSink, HeadlessSink, PlaySummary, StatsSink, WindowSink};

/// 执行一次完整的播放：校验配置 → 打开帧源 → 构建接收端 → 播放。
pub fn run(invocation: &Invocation) -> Result<PlaySummary, PlayError> {
    let config = &invocation.config;
    config.validate()?;

    let source = FrameSource::open(&invocation.input, &config.decode)?;

    let display: Box<dyn FrameSink> = if config.display {
        Box::new(WindowSink::new(config.delay_ms, config.preview.clone()))
    } else {
        Box::new(HeadlessSink)
    };

    let mut sink: Box<dyn FrameSink> = if config.stats {
        Box::new(StatsSink::new(display, io::stdout().lock()))
    } else {
        display
    };

    viewer::play(source, &mut sink)
}
