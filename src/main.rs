//! # tiff-play — 应用入口
//!
//! 本文件仅负责日志初始化、参数解析与退出码。
//! 业务逻辑分布在各子模块中，详见 `lib.rs` 架构文档。

use std::process::ExitCode;

use clap::Parser;
use tiff_play::cli::Cli;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let result = Cli::parse().resolve().and_then(|invocation| tiff_play::run(&invocation));

    match result {
        Ok(summary) => {
            log::info!(
                "✅ 播放结束 - 显示 {} 帧{}",
                summary.frames_shown,
                if summary.stopped_early { "（提前结束）" } else { "" }
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            log::error!("❌ {}", err);
            ExitCode::from(err.exit_code())
        }
    }
}
