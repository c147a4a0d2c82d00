//! 解码器实现模块.
//!
//! 每个解码器注册到 [`CodecRegistry`](crate::CodecRegistry) 后,
//! 通过 `create_decoder` 按 [`CodecId`](crate::CodecId) 创建实例.

pub mod h264;

use crate::CodecId;
use crate::registry::CodecRegistry;

/// 注册所有内置解码器
pub fn register_all_decoders(registry: &mut CodecRegistry) {
    registry.register_decoder(CodecId::H264, "h264", || {
        Ok(Box::new(h264::H264Decoder::new()?))
    });
}
