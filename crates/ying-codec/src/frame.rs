//! 解码后的帧数据 (Frame).
//!
//! 表示解码后的原始视频数据.

use ying_core::{PixelFormat, Rational};

/// 视频帧
///
/// 包含解码后的原始像素数据, 多平面存储.
/// 例如 YUV420P 格式有 3 个平面: Y, U, V.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// 各平面的像素数据
    pub data: Vec<Vec<u8>>,
    /// 各平面每行的字节数 (linesize / stride)
    pub linesize: Vec<usize>,
    /// 宽度 (像素)
    pub width: u32,
    /// 高度 (像素)
    pub height: u32,
    /// 像素格式
    pub pixel_format: PixelFormat,
    /// 显示时间戳 (PTS)
    pub pts: i64,
    /// 图像顺序号 (Picture Order Count)
    pub poc: i32,
    /// 时间基
    pub time_base: Rational,
    /// 是否为关键帧 (IDR)
    pub is_keyframe: bool,
    /// 图片类型 (I/P 帧)
    pub picture_type: PictureType,
}

impl VideoFrame {
    /// 创建空的视频帧
    pub fn new(width: u32, height: u32, pixel_format: PixelFormat) -> Self {
        let plane_count = pixel_format.plane_count() as usize;
        Self {
            data: vec![Vec::new(); plane_count],
            linesize: vec![0; plane_count],
            width,
            height,
            pixel_format,
            pts: ying_core::timestamp::NOPTS_VALUE,
            poc: 0,
            time_base: Rational::UNDEFINED,
            is_keyframe: false,
            picture_type: PictureType::None,
        }
    }
}

/// 帧 (统一包装, 当前仅视频)
#[derive(Debug, Clone)]
pub enum Frame {
    /// 视频帧
    Video(VideoFrame),
}

impl Frame {
    /// 获取视频帧引用
    pub fn video(&self) -> &VideoFrame {
        match self {
            Self::Video(v) => v,
        }
    }
}

/// 图片类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PictureType {
    /// 未指定
    #[default]
    None,
    /// I 帧 (帧内编码)
    I,
    /// P 帧 (前向预测)
    P,
}
