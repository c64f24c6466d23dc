//! minifb 预览窗口。
//!
//! 窗口在第一帧到达时才创建，尺寸随帧（或其预览缩放结果）变化时重建。
//! 每帧显示后等待 `delay_ms` 毫秒，期间持续处理窗口事件；`delay_ms == 0`
//! 时等待任意按键。窗口被关闭或按下 Esc 时提前结束播放。

use std::thread;
use std::time::{Duration, Instant};

use image::GrayImage;
use minifb::{Key, KeyRepeat, Window, WindowOptions};

use super::preview::fit_for_preview;
use super::{FrameSink, SinkFlow};
use crate::config::PreviewConfig;
use crate::error::PlayError;
use crate::frame_source::RawFrame;

/// 等待期间处理窗口事件的间隔。
const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(5);

pub struct WindowSink {
    delay: Duration,
    preview: PreviewConfig,
    window: Option<Window>,
    buffer: Vec<u32>,
    size: (usize, usize),
}

impl WindowSink {
    pub fn new(delay_ms: u64, preview: PreviewConfig) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            preview,
            window: None,
            buffer: Vec::new(),
            size: (0, 0),
        }
    }

    fn window_for(&mut self, width: usize, height: usize) -> Result<&mut Window, PlayError> {
        if self.window.is_none() || self.size != (width, height) {
            // 旧窗口先释放，避免同时存在两个窗口
            self.window = None;

            let window = Window::new(
                &self.preview.title,
                width,
                height,
                WindowOptions {
                    resize: false,
                    ..WindowOptions::default()
                },
            )
            .map_err(|e| PlayError::Display(format!("创建预览窗口失败：{}", e)))?;

            log::info!("🪟 预览窗口已创建 - {}x{}", width, height);
            self.size = (width, height);
            self.window = Some(window);
        }

        self.window
            .as_mut()
            .ok_or_else(|| PlayError::Display("预览窗口不可用".to_string()))
    }

    /// 帧间等待；返回 `Stop` 表示用户关闭了窗口或按下 Esc。
    fn wait(window: &mut Window, delay: Duration) -> SinkFlow {
        if delay.is_zero() {
            loop {
                if !window.is_open() {
                    return SinkFlow::Stop;
                }
                let keys = window.get_keys_pressed(KeyRepeat::No);
                if keys.contains(&Key::Escape) {
                    return SinkFlow::Stop;
                }
                if !keys.is_empty() {
                    return SinkFlow::Continue;
                }
                thread::sleep(EVENT_POLL_INTERVAL);
                window.update();
            }
        }

        let deadline = Instant::now() + delay;
        loop {
            if !window.is_open() || window.is_key_down(Key::Escape) {
                return SinkFlow::Stop;
            }
            let now = Instant::now();
            if now >= deadline {
                return SinkFlow::Continue;
            }
            thread::sleep(EVENT_POLL_INTERVAL.min(deadline - now));
            window.update();
        }
    }
}

impl FrameSink for WindowSink {
    fn show(
        &mut self,
        _index: usize,
        _raw: &RawFrame,
        gray: &GrayImage,
    ) -> Result<SinkFlow, PlayError> {
        let shown = fit_for_preview(gray, &self.preview);
        let width = shown.width() as usize;
        let height = shown.height() as usize;

        self.buffer.clear();
        self.buffer.extend(shown.as_raw().iter().map(|&v| gray_to_rgb(v)));

        let delay = self.delay;
        let buffer = std::mem::take(&mut self.buffer);
        let window = self.window_for(width, height)?;

        let result = window
            .update_with_buffer(&buffer, width, height)
            .map_err(|e| PlayError::Display(format!("刷新预览窗口失败：{}", e)));
        let flow = match result {
            Ok(()) => Ok(Self::wait(window, delay)),
            Err(err) => Err(err),
        };

        self.buffer = buffer;
        flow
    }
}

/// 灰度值展开为 minifb 使用的 0RGB。
fn gray_to_rgb(value: u8) -> u32 {
    let v = value as u32;
    (v << 16) | (v << 8) | v
}
