//! 编解码器标识符.
//!
//! 为每种编解码算法分配唯一标识, 与容器格式无关.

use std::fmt;
use ying_core::MediaType;

/// 编解码器标识符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CodecId {
    /// 未知编解码器
    None,
    /// H.264 / AVC / MPEG-4 Part 10
    H264,
    /// H.265 / HEVC / MPEG-H Part 2
    H265,
    /// MPEG-4 Part 2 (ASP)
    Mpeg4,
    /// Raw 视频 (未压缩)
    RawVideo,
}

impl CodecId {
    /// 获取编解码器对应的媒体类型
    pub const fn media_type(&self) -> MediaType {
        match self {
            Self::None => MediaType::Data,
            Self::H264 | Self::H265 | Self::Mpeg4 | Self::RawVideo => MediaType::Video,
        }
    }

    /// 获取编解码器的人类可读名称
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::H264 => "h264",
            Self::H265 => "hevc",
            Self::Mpeg4 => "mpeg4",
            Self::RawVideo => "rawvideo",
        }
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
