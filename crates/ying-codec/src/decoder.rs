//! 解码器统一接口.

use ying_core::YingResult;

use crate::codec_id::CodecId;
use crate::codec_parameters::CodecParameters;
use crate::frame::Frame;
use crate::packet::Packet;

/// 解码器接口, send/receive 模型.
///
/// 压缩包与输出帧不要求一一对应: 一个包可以产出零帧或多帧.
/// 典型调用序列:
///
/// 1. `open()` 传入参数 (分辨率提示, avcC extradata 等)
/// 2. 循环 `send_packet()` + `receive_frame()` 直到 `NeedMoreData`
/// 3. 数据送完后送入空包, 继续 `receive_frame()` 直到 `Eof`
pub trait Decoder: Send {
    /// 本解码器实现的编解码标准
    fn codec_id(&self) -> CodecId;

    /// 实现名称, 用于注册表列表与日志
    fn name(&self) -> &str;

    /// 配置解码器. 无需配置的实现可以使用默认空操作.
    fn open(&mut self, _params: &CodecParameters) -> YingResult<()> {
        Ok(())
    }

    /// 送入一个压缩数据包; 空包表示输入结束, 开始排空.
    fn send_packet(&mut self, packet: &Packet) -> YingResult<()>;

    /// 取出一帧解码结果.
    ///
    /// `NeedMoreData` 表示需要继续送包; 排空状态下缓存取完后返回 `Eof`.
    fn receive_frame(&mut self) -> YingResult<Frame>;

    /// 丢弃全部内部状态 (缓存帧, 参考帧, 解码中的图像), seek 后调用.
    fn flush(&mut self);
}
