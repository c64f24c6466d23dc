//! # 配置模块
//!
//! ## 设计思路
//!
//! 将所有“可调策略”集中到 `PlayerConfig`，保证运行时行为可观测、可调整、可测试。
//! 命令行只负责填充这些字段，解码与预览阶段只读取配置快照。
//!
//! ## 实现思路
//!
//! - `Default` 提供默认值（帧间延迟 10ms、显示预览窗口）。
//! - `DecodeLimits` 约束单帧像素数与解码缓冲，防止异常文件触发超大内存分配。
//! - `PreviewConfig` 仅影响显示，不影响归一化结果。
//! - `validate` 在进入流水线前拒绝不合法的组合。

use image::imageops::FilterType;

use crate::error::PlayError;

/// 默认帧间延迟（毫秒）。
pub const DEFAULT_DELAY_MS: u64 = 10;

/// 播放器配置。
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// 帧间延迟（毫秒）。`0` 表示等待按键后再显示下一帧。
    pub delay_ms: u64,
    /// 是否打开预览窗口；关闭时只解码与归一化。
    pub display: bool,
    /// 是否逐帧输出 JSON 统计行。
    pub stats: bool,
    /// 解码阶段的资源上限。
    pub decode: DecodeLimits,
    /// 预览窗口参数。
    pub preview: PreviewConfig,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            delay_ms: DEFAULT_DELAY_MS,
            display: true,
            stats: false,
            decode: DecodeLimits::default(),
            preview: PreviewConfig::default(),
        }
    }
}

/// 解码资源上限。
#[derive(Debug, Clone, Copy)]
pub struct DecodeLimits {
    /// 单帧像素上限（`width * height`）。
    pub max_decoded_pixels: u64,
    /// 单帧解码缓冲上限（字节，按实际样本宽度估算）。
    pub max_decoded_bytes: u64,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_decoded_pixels: 64_000_000,
            max_decoded_bytes: 512 * 1024 * 1024,
        }
    }
}

impl DecodeLimits {
    /// 校验像素数量是否超过上限。
    pub(crate) fn check_pixels(&self, width: u32, height: u32) -> Result<u64, PlayError> {
        let pixels = (width as u64)
            .checked_mul(height as u64)
            .ok_or_else(|| PlayError::ResourceLimit("帧像素数溢出".to_string()))?;

        if pixels > self.max_decoded_pixels {
            return Err(PlayError::ResourceLimit(format!(
                "帧像素过大：{}x{} = {} 像素（限制：{} 像素）",
                width, height, pixels, self.max_decoded_pixels
            )));
        }

        Ok(pixels)
    }

    /// 校验按样本字节数估算的解码内存是否超过上限。
    pub(crate) fn check_bytes(
        &self,
        width: u32,
        height: u32,
        bytes_per_pixel: u64,
    ) -> Result<(), PlayError> {
        let pixels = self.check_pixels(width, height)?;
        let estimated = pixels
            .checked_mul(bytes_per_pixel)
            .ok_or_else(|| PlayError::ResourceLimit("帧解码内存估算溢出".to_string()))?;

        if estimated > self.max_decoded_bytes {
            return Err(PlayError::ResourceLimit(format!(
                "帧解码预计内存过大：{:.2} MB（限制：{:.2} MB）",
                estimated as f64 / 1024.0 / 1024.0,
                self.max_decoded_bytes as f64 / 1024.0 / 1024.0
            )));
        }

        Ok(())
    }
}

/// 预览窗口配置。
#[derive(Debug, Clone)]
pub struct PreviewConfig {
    /// 窗口标题。
    pub title: String,
    /// 预览时宽/高单边最大值，超过则降采样后再显示。
    pub max_dimension: u32,
    /// 降采样滤镜。
    pub resize_filter: FilterType,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            title: "frame".to_string(),
            max_dimension: 1600,
            resize_filter: FilterType::Triangle,
        }
    }
}

impl PlayerConfig {
    /// 在进入流水线前校验配置。
    pub fn validate(&self) -> Result<(), PlayError> {
        if self.decode.max_decoded_pixels == 0 {
            return Err(PlayError::InvalidConfig(
                "max_decoded_pixels 必须大于 0".to_string(),
            ));
        }
        if self.decode.max_decoded_bytes == 0 {
            return Err(PlayError::InvalidConfig(
                "max_decoded_bytes 必须大于 0".to_string(),
            ));
        }
        if !(16..=16_384).contains(&self.preview.max_dimension) {
            return Err(PlayError::InvalidConfig(
                "max_dimension 必须在 16~16384 之间".to_string(),
            ));
        }
        Ok(())
    }
}
