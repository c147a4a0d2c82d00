//! H.264 解码器公共常量与小工具.

/// 色度 QP 映射表 (规范 Table 8-15)
///
/// 亮度 QP (加上 chroma_qp_index_offset 并裁剪到 0-51 后) 映射为色度 QP.
pub const CHROMA_QP_TABLE: [u8; 52] = [
    0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25,
    26, 27, 28, 29, 29, 30, 31, 32, 32, 33, 34, 34, 35, 35, 36, 36, 37, 37, 37, 38, 38, 38, 39,
    39, 39, 39,
];

/// 由亮度 QP 与 PPS 偏移计算色度 QP
pub fn chroma_qp(qp: i32, chroma_qp_index_offset: i32) -> u8 {
    let idx = (qp + chroma_qp_index_offset).clamp(0, 51) as usize;
    CHROMA_QP_TABLE[idx]
}

/// 裁剪到 [0, 255]
#[inline(always)]
pub fn clip_u8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// 三数取中值
#[inline(always)]
pub fn median3(a: i32, b: i32, c: i32) -> i32 {
    let mn = a.min(b);
    let mx = a.max(b);
    c.clamp(mn, mx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_色度qp映射() {
        // QP < 30 时恒等映射
        assert_eq!(chroma_qp(26, 0), 26);
        assert_eq!(chroma_qp(0, 0), 0);
        // 高 QP 区段压缩
        assert_eq!(chroma_qp(51, 0), 39);
        assert_eq!(chroma_qp(40, 0), 36);
        // 偏移越界时裁剪
        assert_eq!(chroma_qp(51, 10), 39);
        assert_eq!(chroma_qp(0, -10), 0);
    }

    #[test]
    fn test_clip_u8() {
        assert_eq!(clip_u8(-1), 0);
        assert_eq!(clip_u8(0), 0);
        assert_eq!(clip_u8(255), 255);
        assert_eq!(clip_u8(300), 255);
    }

    #[test]
    fn test_median3() {
        assert_eq!(median3(1, 2, 3), 2);
        assert_eq!(median3(3, 1, 2), 2);
        assert_eq!(median3(5, 5, 0), 5);
        assert_eq!(median3(-4, 2, 0), 0);
    }
}
