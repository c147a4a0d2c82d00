//! # ying-codec
//!
//! Ying 解码框架, 提供解码器抽象与 H.264 Baseline 解码器实现.
//!
//! 本 crate 定义了解码器注册、Packet/Frame 抽象与解码流程的核心接口,
//! 并实现了一个宏块级 CAVLC H.264 (Baseline Profile) 解码器.
//!
//! ## 使用示例
//!
//! ```rust
//! use ying_codec::{CodecRegistry, CodecId};
//!
//! let mut reg = CodecRegistry::new();
//! ying_codec::register_all(&mut reg);
//!
//! let decoder = reg.create_decoder(CodecId::H264).unwrap();
//! assert_eq!(decoder.codec_id(), CodecId::H264);
//! ```

pub mod codec_id;
pub mod codec_parameters;
pub mod decoder;
pub mod decoders;
pub mod frame;
pub mod packet;
pub mod parsers;
pub mod registry;

// 重导出常用类型
pub use codec_id::CodecId;
pub use codec_parameters::{CodecParameters, CodecParamsType, VideoCodecParams};
pub use decoder::Decoder;
pub use frame::{Frame, PictureType, VideoFrame};
pub use packet::Packet;
pub use registry::CodecRegistry;

/// 注册所有内置解码器
pub fn register_all(registry: &mut CodecRegistry) {
    decoders::register_all_decoders(registry);
}
