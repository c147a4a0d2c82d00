//! 比特流读取器.
//!
//! 提供从字节缓冲区中按位读取数据的能力, 是 H.264 语法解析的基础设施.
//!
//! 按大端位序读取 (MSB first), 并提供 H.264 所需的指数哥伦布编码
//! (Exp-Golomb) 读取: ue(v) / se(v) / te(v).

use crate::{YingError, YingResult};

/// 比特流读取器
///
/// 从字节缓冲区中按位读取数据, 使用大端位序 (MSB first).
///
/// # 示例
/// ```
/// use ying_core::bitreader::BitReader;
///
/// let data = [0b10110001, 0b01010101];
/// let mut br = BitReader::new(&data);
/// assert_eq!(br.read_bits(4).unwrap(), 0b1011);
/// assert_eq!(br.read_bits(4).unwrap(), 0b0001);
/// assert_eq!(br.read_bits(8).unwrap(), 0b01010101);
/// ```
pub struct BitReader<'a> {
    /// 源数据
    data: &'a [u8],
    /// 当前字节索引
    byte_pos: usize,
    /// 当前字节中的位位置 (0-7, 0 表示最高位)
    bit_pos: u8,
}

impl<'a> BitReader<'a> {
    /// 创建新的比特流读取器
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte_pos: 0,
            bit_pos: 0,
        }
    }

    /// 获取已读取的总位数
    pub fn bits_read(&self) -> usize {
        self.byte_pos * 8 + self.bit_pos as usize
    }

    /// 获取剩余可读位数
    pub fn bits_left(&self) -> usize {
        if self.byte_pos >= self.data.len() {
            return 0;
        }
        (self.data.len() - self.byte_pos) * 8 - self.bit_pos as usize
    }

    /// 是否已到达末尾
    pub fn is_eof(&self) -> bool {
        self.bits_left() == 0
    }

    /// 读取 1 个位
    pub fn read_bit(&mut self) -> YingResult<u32> {
        if self.byte_pos >= self.data.len() {
            return Err(YingError::Eof);
        }

        let bit = (self.data[self.byte_pos] >> (7 - self.bit_pos)) & 1;
        self.bit_pos += 1;
        if self.bit_pos >= 8 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }

        Ok(u32::from(bit))
    }

    /// 读取 N 个位 (最多 32 位)
    ///
    /// 按大端位序读取, 返回值的低 N 位有效.
    pub fn read_bits(&mut self, n: u32) -> YingResult<u32> {
        if n == 0 {
            return Ok(0);
        }
        if n > 32 {
            return Err(YingError::InvalidArgument(format!(
                "read_bits: n={} 超过 32 位",
                n,
            )));
        }
        if (n as usize) > self.bits_left() {
            return Err(YingError::Eof);
        }

        let mut result: u32 = 0;
        let mut remaining = n;

        while remaining > 0 {
            let available = 8 - self.bit_pos as u32;
            let to_read = remaining.min(available);

            // 从当前字节中提取位
            let shift = available - to_read;
            let mask = ((1u32 << to_read) - 1) as u8;
            let bits = (self.data[self.byte_pos] >> shift) & mask;

            result = (result << to_read) | u32::from(bits);

            self.bit_pos += to_read as u8;
            if self.bit_pos >= 8 {
                self.bit_pos = 0;
                self.byte_pos += 1;
            }
            remaining -= to_read;
        }

        Ok(result)
    }

    /// 读取 N 个位 (最多 64 位)
    pub fn read_bits_u64(&mut self, n: u32) -> YingResult<u64> {
        if n <= 32 {
            return self.read_bits(n).map(u64::from);
        }
        if n > 64 {
            return Err(YingError::InvalidArgument(format!(
                "read_bits_u64: n={} 超过 64 位",
                n,
            )));
        }

        let high_bits = n - 32;
        let high = self.read_bits(high_bits)? as u64;
        let low = self.read_bits(32)? as u64;
        Ok((high << 32) | low)
    }

    /// 读取有符号整数 (二进制补码)
    pub fn read_bits_signed(&mut self, n: u32) -> YingResult<i32> {
        let val = self.read_bits(n)?;
        if n == 0 {
            return Ok(0);
        }
        // n == 32 时, val 的全部 32 位有效, 直接转换为 i32 (二进制补码)
        if n >= 32 {
            return Ok(val as i32);
        }
        // 符号扩展: 若最高有效位为 1, 则填充高位
        if (val >> (n - 1)) & 1 != 0 {
            Ok(val as i32 | !((1i32 << n) - 1))
        } else {
            Ok(val as i32)
        }
    }

    /// 读取无符号指数哥伦布编码 ue(v)
    ///
    /// 码字形如 `0...01xxx`: 前导零个数 N 决定后缀位数,
    /// 值为 `2^N - 1 + 后缀`.
    pub fn read_ue(&mut self) -> YingResult<u32> {
        let mut zeros = 0u32;
        loop {
            if self.read_bit()? == 1 {
                break;
            }
            zeros += 1;
            if zeros > 31 {
                return Err(YingError::InvalidData(
                    "ue(v): 前导零超过 31 位".into(),
                ));
            }
        }
        if zeros == 0 {
            return Ok(0);
        }
        let suffix = self.read_bits(zeros)?;
        Ok((1u32 << zeros) - 1 + suffix)
    }

    /// 读取有符号指数哥伦布编码 se(v)
    ///
    /// 映射: k=ue(v), k 为奇数时取 (k+1)/2, 偶数时取 -(k/2).
    pub fn read_se(&mut self) -> YingResult<i32> {
        let k = self.read_ue()?;
        if k & 1 == 1 {
            Ok(((k + 1) >> 1) as i32)
        } else {
            Ok(-((k >> 1) as i32))
        }
    }

    /// 读取截断指数哥伦布编码 te(v)
    ///
    /// 取值范围上限为 `x`: x == 1 时读取 1 位取反, x > 1 时按 ue(v) 读取,
    /// x == 0 时不消耗任何位.
    pub fn read_te(&mut self, x: u32) -> YingResult<u32> {
        match x {
            0 => Ok(0),
            1 => Ok(1 - self.read_bit()?),
            _ => self.read_ue(),
        }
    }

    /// 窥视 N 个位 (不移动位置)
    ///
    /// 超出数据末尾的位按 0 补齐, 便于 VLC 查表在流尾仍可窥视完整窗口.
    pub fn peek_bits(&mut self, n: u32) -> YingResult<u32> {
        if n == 0 {
            return Ok(0);
        }
        if n > 32 {
            return Err(YingError::InvalidArgument(format!(
                "peek_bits: n={} 超过 32 位",
                n,
            )));
        }

        let left = self.bits_left();
        if left == 0 {
            return Err(YingError::Eof);
        }

        let saved_byte = self.byte_pos;
        let saved_bit = self.bit_pos;
        let avail = (left as u32).min(n);
        let result = self.read_bits(avail);
        self.byte_pos = saved_byte;
        self.bit_pos = saved_bit;
        result.map(|v| v << (n - avail))
    }

    /// 跳过 N 个位
    pub fn skip_bits(&mut self, n: u32) -> YingResult<()> {
        if (n as usize) > self.bits_left() {
            return Err(YingError::Eof);
        }

        let total_bits = self.bit_pos as u32 + n;
        self.byte_pos += (total_bits / 8) as usize;
        self.bit_pos = (total_bits % 8) as u8;

        Ok(())
    }

    /// 对齐到下一个字节边界
    ///
    /// 如果当前已在字节边界, 则不做任何事.
    pub fn align_to_byte(&mut self) {
        if self.bit_pos > 0 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }
    }

    /// 获取当前字节位置
    pub fn byte_position(&self) -> usize {
        self.byte_pos
    }

    /// 从当前位置读取原始字节切片
    ///
    /// 仅在字节对齐时可用.
    pub fn read_bytes(&mut self, n: usize) -> YingResult<&'a [u8]> {
        if self.bit_pos != 0 {
            return Err(YingError::InvalidArgument("read_bytes 需要字节对齐".into()));
        }

        let end = self.byte_pos + n;
        if end > self.data.len() {
            return Err(YingError::Eof);
        }

        let slice = &self.data[self.byte_pos..end];
        self.byte_pos = end;
        Ok(slice)
    }

    /// 获取底层数据的引用
    pub fn data(&self) -> &'a [u8] {
        self.data
    }
}
