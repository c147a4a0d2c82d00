//! H.264 码流解析工具.
//!
//! 提供 NAL 单元分割、RBSP 提取与 avcC 配置解析,
//! 供解码器与探测工具共用.

pub mod nal;

pub use nal::{AvccConfig, NalUnit, NalUnitType};
