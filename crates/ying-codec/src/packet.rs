//! 压缩数据包 (Packet).

use bytes::Bytes;
use ying_core::timestamp::NOPTS_VALUE;

/// 送入解码器的一份压缩数据, 通常对应一个访问单元
/// (H.264 下为一个或多个 NAL 单元).
///
/// `data` 为空的包是 flush 信号: 解码器收到后进入排空状态,
/// `receive_frame` 取完缓存帧后返回 `Eof`.
#[derive(Debug, Clone)]
pub struct Packet {
    /// 压缩数据
    pub data: Bytes,
    /// 显示时间戳, `NOPTS_VALUE` 表示未知
    pub pts: i64,
    /// 解码时间戳, `NOPTS_VALUE` 表示未知
    pub dts: i64,
    /// 容器层标记的关键帧提示
    pub is_keyframe: bool,
}

impl Packet {
    /// 创建空数据包 (flush 信号)
    pub fn empty() -> Self {
        Self {
            data: Bytes::new(),
            pts: NOPTS_VALUE,
            dts: NOPTS_VALUE,
            is_keyframe: false,
        }
    }

    /// 从压缩数据创建数据包, 时间戳未知
    pub fn from_data(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            ..Self::empty()
        }
    }

    /// 是否为 flush 信号
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_空包是flush信号() {
        let packet = Packet::empty();
        assert!(packet.is_empty());
        assert_eq!(packet.pts, NOPTS_VALUE);
    }

    #[test]
    fn test_from_data() {
        let packet = Packet::from_data(vec![1u8, 2, 3]);
        assert!(!packet.is_empty());
        assert_eq!(&packet.data[..], &[1, 2, 3]);
    }
}
