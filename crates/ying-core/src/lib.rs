//! # ying-core
//!
//! Ying 解码框架核心库, 提供基础类型定义、错误处理和位流工具.
//!
//! 本 crate 为整个 Ying 框架提供底层基础设施: 统一错误类型、
//! MSB-first 位流读写 (含 H.264 所需的指数哥伦布编码)、像素格式与时间基.

pub mod bitreader;
pub mod bitwriter;
pub mod error;
pub mod media_type;
pub mod pixel_format;
pub mod rational;
pub mod timestamp;

// 重导出常用类型
pub use bitreader::BitReader;
pub use bitwriter::BitWriter;
pub use error::{YingError, YingResult};
pub use media_type::MediaType;
pub use pixel_format::PixelFormat;
pub use rational::Rational;
