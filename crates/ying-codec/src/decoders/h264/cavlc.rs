//! CAVLC 残差块读写.
//!
//! 读取方向为解码主路径; 写入方向是其精确逆运算, 用于构造测试码流.
//! 上下文 (邻块非零系数数 nC) 由调用方预测后传入, `nc == -1` 表示
//! 色度 DC 块 (使用专用 coeff_token 与 total_zeros 表).

use ying_core::{BitReader, BitWriter, YingError, YingResult};

use super::vlc::{
    COEFF0_TOKEN, COEFF_TOKEN, LEVEL_PREFIX, RUN_BEFORE, TOTAL_ZEROS, TOTAL_ZEROS_DC, VlcTables,
};

/// nC → coeff_token 表号
const CT_INDEX: [usize; 17] = [0, 0, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 3, 3, 3, 3, 3];

fn coeff_token_table(nc: i32) -> usize {
    if nc < 0 {
        4
    } else {
        CT_INDEX[(nc as usize).min(16)]
    }
}

/// 读取一个残差块 (zig-zag 顺序系数), 返回非零系数个数
///
/// `coeffs` 的长度即块内系数个数: 亮度 4x4 为 16, AC 块为 15, 色度 DC 为 4.
pub fn read_block_residual(
    br: &mut BitReader,
    tables: &VlcTables,
    nc: i32,
    coeffs: &mut [i32],
) -> YingResult<u32> {
    let count = coeffs.len();
    coeffs.fill(0);

    let token = tables.coeff_token[coeff_token_table(nc)].read(br)?;
    let total = (token / 4) as usize;
    let trailing = (token % 4) as usize;

    if total == 0 {
        return Ok(0);
    }
    if total > count {
        return Err(YingError::InvalidData(format!(
            "CAVLC: total_coeff 超出块容量, total={}, count={}",
            total, count
        )));
    }

    // trailing ones: 每个一个符号位
    let mut level = [0i32; 16];
    for lv in level.iter_mut().take(trailing) {
        *lv = 1 - 2 * br.read_bit()? as i32;
    }

    // 其余系数: level_prefix (+ 后缀) 编码
    let mut suffix_length: u32 = if total > 10 && trailing < 3 { 1 } else { 0 };
    for i in trailing..total {
        let prefix = tables.level_prefix.read(br)? as i32;

        let mut code = if prefix < 14 {
            if suffix_length > 0 {
                (prefix << suffix_length) + br.read_bits(suffix_length)? as i32
            } else {
                prefix
            }
        } else if prefix == 14 {
            if suffix_length > 0 {
                (14 << suffix_length) + br.read_bits(suffix_length)? as i32
            } else {
                14 + br.read_bits(4)? as i32
            }
        } else {
            let mut v = (15 << suffix_length) + br.read_bits(12)? as i32;
            if suffix_length == 0 {
                v += 15;
            }
            v
        };

        if i == trailing && trailing < 3 {
            // trailing < 3 时首个普通系数不可能为 ±1
            code += 2;
        }

        level[i] = if code & 1 != 0 {
            -((code + 1) / 2)
        } else {
            (code + 2) / 2
        };

        if suffix_length == 0 {
            suffix_length = 1;
        }
        if level[i].abs() > (3 << (suffix_length - 1)) && suffix_length < 6 {
            suffix_length += 1;
        }
    }

    // total_zeros
    let mut zeros_left: i32 = 0;
    if total < count {
        zeros_left = if nc < 0 {
            tables.total_zeros_dc[total - 1].read(br)? as i32
        } else {
            tables.total_zeros[total - 1].read(br)? as i32
        };
    }

    // run_before
    let mut run = [0i32; 16];
    let mut i = 0;
    while i < total - 1 && zeros_left > 0 {
        let tbl = ((zeros_left - 1) as usize).min(6);
        run[i] = tables.run_before[tbl].read(br)? as i32;
        zeros_left -= run[i];
        if zeros_left < 0 {
            return Err(YingError::InvalidData(format!(
                "CAVLC: run_before 超出 total_zeros, run={}",
                run[i]
            )));
        }
        i += 1;
    }
    run[total - 1] = zeros_left;

    // 从最高频系数向低频重建
    let mut pos: i32 = -1;
    for i in (0..total).rev() {
        pos += run[i] + 1;
        if pos as usize >= count {
            return Err(YingError::InvalidData(format!(
                "CAVLC: 系数位置越界, pos={}, count={}",
                pos, count
            )));
        }
        coeffs[pos as usize] = level[i];
    }

    Ok(total as u32)
}

/// 写入一个残差块, [`read_block_residual`] 的逆运算
pub fn write_block_residual(bw: &mut BitWriter, nc: i32, coeffs: &[i32]) {
    let count = coeffs.len();

    // 自最高频向低频收集 (level, run) 对
    let mut last = count as i32 - 1;
    while last >= 0 && coeffs[last as usize] == 0 {
        last -= 1;
    }

    let mut level = [0i32; 16];
    let mut run = [0i32; 16];
    let mut total = 0usize;
    let mut trailing = 0usize;
    let mut total_zeros = 0i32;
    let mut sign_bits: u32 = 0;

    let mut still_trailing = true;
    while last >= 0 {
        level[total] = coeffs[last as usize];
        last -= 1;

        run[total] = 0;
        while last >= 0 && coeffs[last as usize] == 0 {
            run[total] += 1;
            last -= 1;
        }
        total_zeros += run[total];

        if still_trailing && level[total].abs() == 1 && trailing < 3 {
            sign_bits = (sign_bits << 1) | u32::from(level[total] < 0);
            trailing += 1;
        } else {
            still_trailing = false;
        }
        total += 1;
    }

    // coeff_token
    let table = coeff_token_table(nc);
    let token = if total == 0 {
        COEFF0_TOKEN[table]
    } else {
        COEFF_TOKEN[table][(total - 1) * 4 + trailing]
    };
    bw.write_bits(token.bits, u32::from(token.len));

    if total == 0 {
        return;
    }

    if trailing > 0 {
        bw.write_bits(sign_bits, trailing as u32);
    }

    let mut suffix_length: u32 = if total > 10 && trailing < 3 { 1 } else { 0 };
    for i in trailing..total {
        let mut code = if level[i] < 0 {
            -2 * level[i] - 1
        } else {
            2 * level[i] - 2
        };
        if i == trailing && trailing < 3 {
            code -= 2;
        }

        if (code >> suffix_length) < 14 {
            let prefix = LEVEL_PREFIX[(code >> suffix_length) as usize];
            bw.write_bits(prefix.bits, u32::from(prefix.len));
            if suffix_length > 0 {
                bw.write_bits(code as u32 & ((1 << suffix_length) - 1), suffix_length);
            }
        } else if suffix_length == 0 && code < 30 {
            let prefix = LEVEL_PREFIX[14];
            bw.write_bits(prefix.bits, u32::from(prefix.len));
            bw.write_bits((code - 14) as u32, 4);
        } else if suffix_length > 0 && (code >> suffix_length) == 14 {
            let prefix = LEVEL_PREFIX[14];
            bw.write_bits(prefix.bits, u32::from(prefix.len));
            bw.write_bits(code as u32 & ((1 << suffix_length) - 1), suffix_length);
        } else {
            let prefix = LEVEL_PREFIX[15];
            bw.write_bits(prefix.bits, u32::from(prefix.len));
            code -= 15 << suffix_length;
            if suffix_length == 0 {
                code -= 15;
            }
            bw.write_bits(code as u32, 12);
        }

        if suffix_length == 0 {
            suffix_length = 1;
        }
        if level[i].abs() > (3 << (suffix_length - 1)) && suffix_length < 6 {
            suffix_length += 1;
        }
    }

    if total < count {
        let tz = if nc < 0 {
            TOTAL_ZEROS_DC[total - 1][total_zeros as usize]
        } else {
            TOTAL_ZEROS[total - 1][total_zeros as usize]
        };
        bw.write_bits(tz.bits, u32::from(tz.len));
    }

    let mut zeros_left = total_zeros;
    for i in 0..total.saturating_sub(1) {
        if zeros_left <= 0 {
            break;
        }
        let tbl = ((zeros_left - 1) as usize).min(6);
        let rb = RUN_BEFORE[tbl][run[i] as usize];
        bw.write_bits(rb.bits, u32::from(rb.len));
        zeros_left -= run[i];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(nc: i32, coeffs: &[i32]) {
        let tables = VlcTables::new().unwrap();
        let mut bw = BitWriter::new();
        write_block_residual(&mut bw, nc, coeffs);
        bw.write_bits(0, 24); // 余量
        let data = bw.finish();

        let mut br = BitReader::new(&data);
        let mut out = vec![0i32; coeffs.len()];
        let total = read_block_residual(&mut br, &tables, nc, &mut out).unwrap();

        assert_eq!(out, coeffs, "nc={}, coeffs={:?}", nc, coeffs);
        assert_eq!(
            total as usize,
            coeffs.iter().filter(|&&v| v != 0).count(),
            "total_coeff 不符"
        );
    }

    #[test]
    fn test_残差往返_全零块() {
        roundtrip(0, &[0; 16]);
        roundtrip(-1, &[0; 4]);
    }

    #[test]
    fn test_残差往返_典型块() {
        // 低频几个小系数 + trailing ones
        roundtrip(0, &[7, -3, 2, 1, -1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        roundtrip(2, &[5, 2, 0, -1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        roundtrip(4, &[-2, 4, 3, -3, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_残差往返_稀疏块() {
        roundtrip(0, &[0, 0, 3, 0, 0, 0, 0, -1, 0, 0, 0, 0, 0, 0, 0, 1]);
        roundtrip(1, &[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, -1]);
    }

    #[test]
    fn test_残差往返_ac块15系数() {
        roundtrip(0, &[2, -1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        roundtrip(8, &[1, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_残差往返_色度dc块() {
        roundtrip(-1, &[3, 0, -1, 0]);
        roundtrip(-1, &[1, 1, 1, 1]);
        roundtrip(-1, &[-5, 2, 0, 0]);
    }

    #[test]
    fn test_残差往返_大幅值转义() {
        // 触发 level_prefix 14/15 转义路径
        roundtrip(0, &[40, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        roundtrip(0, &[-100, 30, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        roundtrip(0, &[500, -300, 12, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_残差往返_满块() {
        // total > 10 时 suffix_length 初值为 1
        roundtrip(
            16,
            &[9, -8, 7, -6, 5, -4, 3, -2, 2, -2, 1, -1, 1, -1, 1, -1],
        );
        roundtrip(0, &[1, -1, 1, -1, 1, -1, 1, -1, 1, -1, 1, -1, 1, -1, 1, -1]);
    }

    #[test]
    fn test_残差读取_全零token仅消耗token位() {
        let tables = VlcTables::new().unwrap();
        // nC=0 → 表 0, total=0 的码字为 "1" (1 位)
        let data = [0b1111_1111u8, 0xFF];
        let mut br = BitReader::new(&data);
        let mut out = [0i32; 16];
        let total = read_block_residual(&mut br, &tables, 0, &mut out).unwrap();
        assert_eq!(total, 0);
        assert_eq!(br.bits_read(), 1);
    }

    #[test]
    fn test_残差读取_色度dc越界报错() {
        // 色度 DC 块只有 4 个系数, 伪造 total=4 的合法码后接垃圾不会越界写
        let tables = VlcTables::new().unwrap();
        let mut out = [0i32; 4];
        // 全零输入: coeff_token 表 4 中 "000000.." 前缀会命中或报错, 不应 panic
        let data = [0x00u8; 8];
        let _ = read_block_residual(&mut BitReader::new(&data), &tables, -1, &mut out);
    }
}
