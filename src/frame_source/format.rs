//! 按扩展名选择解码器。
//!
//! 支持集合是显式的，未知扩展名直接返回 `UnsupportedFormat`，不存在默认解码器。

use std::fmt;
use std::path::Path;

use crate::error::PlayError;

/// 输入文件格式标签。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// 多页 TIFF（`.tif` / `.tiff`）
    Tiff,
    /// AVI 容器（`.avi`）
    Avi,
    /// MP4 容器（`.mp4`）
    Mp4,
}

impl SourceFormat {
    /// 由文件路径的扩展名（大小写不敏感）推断格式。
    pub fn from_path(path: &Path) -> Result<Self, PlayError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        Self::from_extension(&ext).ok_or_else(|| {
            PlayError::UnsupportedFormat(format!(
                "文件 {} 的扩展名 '{}' 暂不支持（可选：tif / tiff / avi / mp4）",
                path.display(),
                ext
            ))
        })
    }

    fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "tif" | "tiff" => Some(Self::Tiff),
            "avi" => Some(Self::Avi),
            "mp4" => Some(Self::Mp4),
            _ => None,
        }
    }

    /// 是否为视频容器（视频帧在解码器层面直接转为灰度）。
    pub fn is_video(self) -> bool {
        matches!(self, Self::Avi | Self::Mp4)
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Tiff => "tiff",
            Self::Avi => "avi",
            Self::Mp4 => "mp4",
        };
        f.write_str(name)
    }
}
