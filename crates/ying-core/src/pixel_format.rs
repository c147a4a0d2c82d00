//! 像素格式定义.
//!
//! 描述解码输出帧的平面布局与色度子采样.

use std::fmt;

/// 像素格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum PixelFormat {
    /// 未知格式
    None,
    /// 平面 YUV 4:2:0, 8 位 (Y + U + V 三平面)
    Yuv420p,
    /// 平面 YUV 4:2:2, 8 位
    Yuv422p,
    /// 平面 YUV 4:4:4, 8 位
    Yuv444p,
}

impl PixelFormat {
    /// 色度子采样因子 (水平, 垂直), 以 2 的幂表示
    pub const fn chroma_subsampling(&self) -> (u32, u32) {
        match self {
            Self::Yuv420p => (1, 1),
            Self::Yuv422p => (1, 0),
            Self::Yuv444p | Self::None => (0, 0),
        }
    }

    /// 平面数量
    pub const fn plane_count(&self) -> u32 {
        match self {
            Self::None => 0,
            Self::Yuv420p | Self::Yuv422p | Self::Yuv444p => 3,
        }
    }

    /// 指定平面的行字节数 (stride 的最小值)
    pub fn plane_linesize(&self, plane: usize, width: u32) -> Option<usize> {
        if *self == Self::None || plane >= self.plane_count() as usize {
            return None;
        }
        let (sub_h, _) = self.chroma_subsampling();
        let w = if plane == 0 {
            width
        } else {
            width >> sub_h
        };
        Some(w as usize)
    }

    /// 指定平面的行数
    pub fn plane_height(&self, plane: usize, height: u32) -> Option<usize> {
        if *self == Self::None || plane >= self.plane_count() as usize {
            return None;
        }
        let (_, sub_v) = self.chroma_subsampling();
        let h = if plane == 0 {
            height
        } else {
            height >> sub_v
        };
        Some(h as usize)
    }

    /// 一帧图像的总字节数
    pub fn frame_size(&self, width: u32, height: u32) -> Option<usize> {
        if *self == Self::None {
            return None;
        }
        let mut total = 0usize;
        for plane in 0..self.plane_count() as usize {
            total += self.plane_linesize(plane, width)? * self.plane_height(plane, height)?;
        }
        Some(total)
    }

    /// 格式名称
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Yuv420p => "yuv420p",
            Self::Yuv422p => "yuv422p",
            Self::Yuv444p => "yuv444p",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuv420p_layout() {
        let pf = PixelFormat::Yuv420p;
        assert_eq!(pf.plane_count(), 3);
        assert_eq!(pf.plane_linesize(0, 416), Some(416));
        assert_eq!(pf.plane_linesize(1, 416), Some(208));
        assert_eq!(pf.plane_height(2, 176), Some(88));
        // 416x176 YUV420P: Y=73216 + U/V 各 18304
        assert_eq!(pf.frame_size(416, 176), Some(73216 + 18304 * 2));
    }

    #[test]
    fn test_none_format() {
        assert_eq!(PixelFormat::None.plane_count(), 0);
        assert_eq!(PixelFormat::None.frame_size(16, 16), None);
    }
}
