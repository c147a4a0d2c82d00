//! 比特流写入器.
//!
//! 提供向字节缓冲区按位写入数据的能力, 与 BitReader 对应 (MSB first).
//!
//! 除基础位写入外, 还提供指数哥伦布编码 ue(v) / se(v) / te(v) 的写入,
//! 用于构造 H.264 语法测试码流与残差编码.

/// 比特流写入器
///
/// 向字节缓冲区按位写入数据, 使用大端位序 (MSB first).
///
/// # 示例
/// ```
/// use ying_core::bitwriter::BitWriter;
///
/// let mut bw = BitWriter::new();
/// bw.write_bits(0b1011, 4);
/// bw.write_bits(0b0001, 4);
/// let data = bw.finish();
/// assert_eq!(data, vec![0b10110001]);
/// ```
pub struct BitWriter {
    /// 输出缓冲区
    data: Vec<u8>,
    /// 当前字节 (正在填充)
    current_byte: u8,
    /// 当前字节中已填充的位数 (0-7)
    bit_count: u8,
}

impl BitWriter {
    /// 创建新的比特流写入器
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            current_byte: 0,
            bit_count: 0,
        }
    }

    /// 以指定容量创建比特流写入器
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            current_byte: 0,
            bit_count: 0,
        }
    }

    /// 获取已写入的总位数
    pub fn bits_written(&self) -> usize {
        self.data.len() * 8 + self.bit_count as usize
    }

    /// 写入 1 个位
    pub fn write_bit(&mut self, bit: u32) {
        self.current_byte = (self.current_byte << 1) | (bit & 1) as u8;
        self.bit_count += 1;
        if self.bit_count >= 8 {
            self.data.push(self.current_byte);
            self.current_byte = 0;
            self.bit_count = 0;
        }
    }

    /// 写入 N 个位 (最多 32 位)
    ///
    /// 值的低 N 位被写入, 高位在前 (大端).
    pub fn write_bits(&mut self, value: u32, n: u32) {
        debug_assert!(n <= 32, "write_bits: n={} 超过 32 位", n);

        if n == 0 {
            return;
        }

        let mut remaining = n;
        while remaining > 0 {
            let available = 8 - self.bit_count as u32;
            let to_write = remaining.min(available);

            // 提取要写入的位
            let shift = remaining - to_write;
            let mask = if to_write >= 32 {
                u32::MAX
            } else {
                (1u32 << to_write) - 1
            };
            let bits = ((value >> shift) & mask) as u8;

            if to_write >= 8 {
                // 整字节写入 (bit_count 必定为 0)
                self.current_byte = bits;
            } else {
                self.current_byte = (self.current_byte << to_write) | bits;
            }
            self.bit_count += to_write as u8;

            if self.bit_count >= 8 {
                self.data.push(self.current_byte);
                self.current_byte = 0;
                self.bit_count = 0;
            }

            remaining -= to_write;
        }
    }

    /// 写入 N 个位 (最多 64 位)
    pub fn write_bits_u64(&mut self, value: u64, n: u32) {
        if n <= 32 {
            self.write_bits(value as u32, n);
        } else {
            let high_bits = n - 32;
            self.write_bits((value >> 32) as u32, high_bits);
            self.write_bits(value as u32, 32);
        }
    }

    /// 写入有符号整数 (二进制补码)
    pub fn write_bits_signed(&mut self, value: i32, n: u32) {
        let mask = (1u64 << n) - 1;
        self.write_bits((value as u32) & mask as u32, n);
    }

    /// 写入一元编码
    ///
    /// 写入 `count` 个 `!stop_bit`, 然后一个 `stop_bit`.
    pub fn write_unary(&mut self, count: u32, stop_bit: u32) {
        let fill = 1 - (stop_bit & 1);
        for _ in 0..count {
            self.write_bit(fill);
        }
        self.write_bit(stop_bit & 1);
    }

    /// 写入无符号指数哥伦布编码 ue(v)
    ///
    /// 与 `BitReader::read_ue` 互逆: 码字为 N 个前导零 + 1 + N 位后缀.
    pub fn write_ue(&mut self, value: u32) {
        debug_assert!(value < u32::MAX, "write_ue: value 溢出");
        let x = u64::from(value) + 1;
        let bits = 64 - x.leading_zeros(); // x 的有效位数
        self.write_bits(0, bits - 1);
        self.write_bits_u64(x, bits);
    }

    /// 写入有符号指数哥伦布编码 se(v)
    ///
    /// 映射: v > 0 -> ue(2v-1), v <= 0 -> ue(-2v).
    pub fn write_se(&mut self, value: i32) {
        let k = if value > 0 {
            (value as u32) * 2 - 1
        } else {
            (-(value as i64) as u32) * 2
        };
        self.write_ue(k);
    }

    /// 写入截断指数哥伦布编码 te(v)
    ///
    /// x == 1 时写入取反的单个位, x > 1 时按 ue(v) 写入, x == 0 时不写.
    pub fn write_te(&mut self, x: u32, value: u32) {
        match x {
            0 => {}
            1 => self.write_bit(1 - (value & 1)),
            _ => self.write_ue(value),
        }
    }

    /// 对齐到字节边界 (用 0 填充)
    pub fn align_to_byte(&mut self) {
        if self.bit_count > 0 {
            let pad = 8 - self.bit_count;
            self.current_byte <<= pad;
            self.data.push(self.current_byte);
            self.current_byte = 0;
            self.bit_count = 0;
        }
    }

    /// 完成写入, 返回字节数据
    ///
    /// 如果当前不在字节边界, 自动用 0 填充.
    pub fn finish(mut self) -> Vec<u8> {
        self.align_to_byte();
        self.data
    }

    /// 获取当前已完成的字节数据引用
    ///
    /// 注意: 不包括正在填充的当前字节.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// 写入完整字节
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        if self.bit_count == 0 {
            // 快速路径: 已对齐
            self.data.extend_from_slice(bytes);
        } else {
            for &b in bytes {
                self.write_bits(u32::from(b), 8);
            }
        }
    }
}

impl Default for BitWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitreader::BitReader;

    #[test]
    fn test_write_bits_basic() {
        let mut bw = BitWriter::new();
        bw.write_bits(0b1011, 4);
        bw.write_bits(0b0001, 4);
        let data = bw.finish();
        assert_eq!(data, vec![0b10110001]);
    }

    #[test]
    fn test_write_bits_cross_byte() {
        let mut bw = BitWriter::new();
        bw.write_bits(0b10110001, 8);
        bw.write_bits(0b01010101, 8);
        let data = bw.finish();
        assert_eq!(data, vec![0b10110001, 0b01010101]);
    }

    #[test]
    fn test_write_ue_known_codes() {
        // 0 -> "1", 1 -> "010", 2 -> "011", 3 -> "00100"
        let mut bw = BitWriter::new();
        bw.write_ue(0);
        assert_eq!(bw.bits_written(), 1);
        bw.write_ue(1);
        assert_eq!(bw.bits_written(), 4);
        bw.write_ue(2);
        assert_eq!(bw.bits_written(), 7);
        bw.write_ue(3);
        assert_eq!(bw.bits_written(), 12);
        let data = bw.finish();
        // 1 010 011 00100 + 4 位填充
        assert_eq!(data, vec![0b10100110, 0b01000000]);
    }

    #[test]
    fn test_ue_roundtrip() {
        let values: Vec<u32> = (0..64)
            .chain([255, 256, 1000, 65535, 65536, u32::MAX / 2])
            .collect();
        let mut bw = BitWriter::new();
        for &v in &values {
            bw.write_ue(v);
        }
        let data = bw.finish();
        let mut br = BitReader::new(&data);
        for &v in &values {
            assert_eq!(br.read_ue().unwrap(), v, "ue 往返失败: value={}", v);
        }
    }

    #[test]
    fn test_se_roundtrip() {
        let values: Vec<i32> = (-40..=40).chain([-32768, 32767, -65536, 65535]).collect();
        let mut bw = BitWriter::new();
        for &v in &values {
            bw.write_se(v);
        }
        let data = bw.finish();
        let mut br = BitReader::new(&data);
        for &v in &values {
            assert_eq!(br.read_se().unwrap(), v, "se 往返失败: value={}", v);
        }
    }

    #[test]
    fn test_te_roundtrip() {
        // x == 1
        let mut bw = BitWriter::new();
        bw.write_te(1, 0);
        bw.write_te(1, 1);
        // x > 1
        for v in 0..8 {
            bw.write_te(7, v);
        }
        let data = bw.finish();
        let mut br = BitReader::new(&data);
        assert_eq!(br.read_te(1).unwrap(), 0);
        assert_eq!(br.read_te(1).unwrap(), 1);
        for v in 0..8 {
            assert_eq!(br.read_te(7).unwrap(), v);
        }
    }

    #[test]
    fn test_write_unary() {
        let mut bw = BitWriter::new();
        bw.write_unary(3, 1); // 0001
        bw.write_unary(0, 1); // 1
        bw.write_bits(0, 3); // 000 填充
        let data = bw.finish();
        assert_eq!(data, vec![0b00011000]);
    }

    #[test]
    fn test_align_to_byte() {
        let mut bw = BitWriter::new();
        bw.write_bits(0b101, 3);
        bw.align_to_byte();
        bw.write_bits(0xFF, 8);
        let data = bw.finish();
        assert_eq!(data, vec![0b10100000, 0xFF]);
    }

    #[test]
    fn test_write_bytes() {
        let mut bw = BitWriter::new();
        bw.write_bytes(&[0x01, 0x02, 0x03]);
        let data = bw.finish();
        assert_eq!(data, vec![0x01, 0x02, 0x03]);
    }

    #[test]
    fn test_read_write_roundtrip_signed() {
        let mut bw = BitWriter::new();
        bw.write_bits_signed(-1, 5);
        bw.write_bits_signed(10, 5);
        bw.write_bits_signed(-128, 8);
        bw.align_to_byte();
        let data = bw.finish();

        let mut br = BitReader::new(&data);
        assert_eq!(br.read_bits_signed(5).unwrap(), -1);
        assert_eq!(br.read_bits_signed(5).unwrap(), 10);
        assert_eq!(br.read_bits_signed(8).unwrap(), -128);
    }
}
