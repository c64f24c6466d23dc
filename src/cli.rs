//! # 命令行模块
//!
//! `tiff-play <input-file> [delay-ms] [--no-display] [--stats] [--max-dimension N] [--title T]`
//!
//! 输入文件在 clap 层面是可选的，缺失时由 `resolve` 返回
//! `PlayError::MissingArgument`，保证在任何解码之前报错并使用统一的退出码。

use std::path::PathBuf;

use clap::Parser;

use crate::config::{DEFAULT_DELAY_MS, PlayerConfig};
use crate::error::PlayError;

#[derive(Parser, Debug)]
#[command(
    name = "tiff-play",
    version,
    about = "逐帧读取 TIFF 图像栈或 AVI/MP4 视频，归一化为 8 位灰度并预览"
)]
pub struct Cli {
    /// 输入文件（.tif / .tiff / .avi / .mp4）
    #[arg(value_name = "INPUT_FILE")]
    pub input: Option<PathBuf>,

    /// 帧间延迟（毫秒），0 或负数表示按任意键切换到下一帧
    #[arg(value_name = "DELAY_MS", allow_negative_numbers = true)]
    pub delay_ms: Option<i64>,

    /// 不打开预览窗口，只解码与归一化
    #[arg(long)]
    pub no_display: bool,

    /// 每帧向标准输出写一行 JSON 统计
    #[arg(long)]
    pub stats: bool,

    /// 预览窗口单边最大尺寸，超出时降采样显示
    #[arg(long, default_value_t = 1600)]
    pub max_dimension: u32,

    /// 预览窗口标题
    #[arg(long, default_value = "frame")]
    pub title: String,

    /// 单帧像素上限
    #[arg(long)]
    pub max_pixels: Option<u64>,
}

/// 解析完成、可直接执行的一次调用。
#[derive(Debug, Clone)]
pub struct Invocation {
    pub input: PathBuf,
    pub config: PlayerConfig,
}

impl Cli {
    /// 校验必需参数并生成播放配置。
    pub fn resolve(self) -> Result<Invocation, PlayError> {
        let input = self
            .input
            .ok_or_else(|| PlayError::MissingArgument("INPUT_FILE".to_string()))?;

        let mut config = PlayerConfig {
            delay_ms: self.delay_ms.map_or(DEFAULT_DELAY_MS, key_wait_if_not_positive),
            display: !self.no_display,
            stats: self.stats,
            ..PlayerConfig::default()
        };
        config.preview.max_dimension = self.max_dimension;
        config.preview.title = self.title;
        if let Some(max_pixels) = self.max_pixels {
            config.decode.max_decoded_pixels = max_pixels;
        }

        Ok(Invocation { input, config })
    }
}

/// 非正延迟统一视为 0（等待按键）。
fn key_wait_if_not_positive(delay_ms: i64) -> u64 {
    u64::try_from(delay_ms).unwrap_or(0)
}
