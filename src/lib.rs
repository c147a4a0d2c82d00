//! # Ying (影)
//!
//! 纯 Rust 实现的 H.264/AVC Baseline 解码核心.
//!
//! Ying 聚焦于宏块级视频解码:
//! - **码流解析**: Annex B / AVCC NAL 单元切分, SPS/PPS 参数集
//! - **熵解码**: Exp-Golomb 与 CAVLC 系数解码
//! - **重建**: 帧内预测, P 帧运动补偿, 变换与反量化
//! - **参考管理**: POC 推导与滑动窗口参考队列
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use ying::codec::{CodecId, CodecParameters, Decoder, Packet};
//!
//! let registry = ying::default_codec_registry();
//! let mut decoder = registry.create_decoder(CodecId::H264).unwrap();
//! decoder.open(&CodecParameters::new(CodecId::H264)).unwrap();
//!
//! let annexb = std::fs::read("input.h264").unwrap();
//! decoder.send_packet(&Packet::from_data(annexb)).unwrap();
//! while let Ok(frame) = decoder.receive_frame() {
//!     let v = frame.video();
//!     println!("帧 {}x{} poc={}", v.width, v.height, v.poc);
//! }
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `ying-core` | 位流读写、错误类型等核心工具 |
//! | `ying-codec` | 解码器框架与 H.264 Baseline 解码器 |

/// 核心类型与位流工具
pub use ying_core as core;

/// 解码器框架与 H.264 解码器
pub use ying_codec as codec;

pub mod logging;

/// 获取 Ying 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// 创建已注册所有内置解码器的注册表
pub fn default_codec_registry() -> ying_codec::CodecRegistry {
    let mut registry = ying_codec::CodecRegistry::new();
    ying_codec::register_all(&mut registry);
    registry
}
