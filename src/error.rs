//! 统一错误类型模块
//!
//! # 设计思路
//!
//! 定义全局统一的 `PlayError` 枚举，替代“打印错误后直接退出进程”的做法。
//! 帧源、归一化、预览窗口与命令行解析都返回 `Result<T, PlayError>`，
//! 由 `main` 统一决定退出码。
//!
//! # 实现思路
//!
//! - 使用 `thiserror` 派生可读错误消息。
//! - `exit_code` 将错误分类映射为约定的进程退出码。
//! - 解码失败携带帧序号，便于定位是哪一帧读取失败。

/// 应用级统一错误类型
///
/// 所有错误在检测点即不可恢复：不重试、不跳帧。
#[derive(Debug, thiserror::Error)]
pub enum PlayError {
    /// 文件扩展名或编码格式不受支持
    #[error("不支持的格式：{0}")]
    UnsupportedFormat(String),

    /// 第 `index` 帧解码失败
    #[error("第 {index} 帧解码失败：{reason}")]
    Decode { index: usize, reason: String },

    /// 缺少必需的命令行参数
    #[error("缺少必需参数：{0}")]
    MissingArgument(String),

    /// 文件打开 / 读取失败
    #[error("文件错误：{0}")]
    FileSystem(String),

    /// 帧尺寸或缓冲超过配置上限
    #[error("资源限制：{0}")]
    ResourceLimit(String),

    /// 预览窗口创建或刷新失败
    #[error("预览窗口错误：{0}")]
    Display(String),

    /// 配置值不合法
    #[error("配置错误：{0}")]
    InvalidConfig(String),
}

impl PlayError {
    /// 构造带帧序号的解码错误。
    pub fn decode(index: usize, reason: impl Into<String>) -> Self {
        Self::Decode {
            index,
            reason: reason.into(),
        }
    }

    /// 映射为进程退出码。
    ///
    /// - `2`：缺少参数（与 clap 的用法错误一致）
    /// - `3`：格式不支持
    /// - `4`：解码失败
    /// - `1`：其余错误
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::MissingArgument(_) => 2,
            Self::UnsupportedFormat(_) => 3,
            Self::Decode { .. } => 4,
            Self::FileSystem(_)
            | Self::ResourceLimit(_)
            | Self::Display(_)
            | Self::InvalidConfig(_) => 1,
        }
    }
}

impl From<std::io::Error> for PlayError {
    fn from(error: std::io::Error) -> Self {
        Self::FileSystem(error.to_string())
    }
}
