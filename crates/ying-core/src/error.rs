//! 统一错误类型定义.
//!
//! 所有 Ying crate 共用的错误类型, 支持跨模块传播.

use thiserror::Error;

/// Ying 框架统一错误类型
#[derive(Debug, Error)]
pub enum YingError {
    /// 无效参数
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 码流声明了本解码器不支持的特性
    #[error("不支持的特性: {0}")]
    Unsupported(String),

    /// 数据不足, 需要更多输入
    #[error("数据不足, 需要更多输入")]
    NeedMoreData,

    /// 已到达流末尾
    #[error("已到达流末尾")]
    Eof,

    /// 未找到指定的编解码器
    #[error("未找到编解码器: {0}")]
    CodecNotFound(String),

    /// 无效数据 (损坏的码流等)
    #[error("无效数据: {0}")]
    InvalidData(String),

    /// 内部错误 (不应发生)
    #[error("内部错误: {0}")]
    Internal(String),
}

/// Ying 框架统一 Result 类型
pub type YingResult<T> = Result<T, YingError>;
