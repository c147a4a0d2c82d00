//! 码流解析器 (不做完整解码, 仅提取语法结构).

pub mod h264;
