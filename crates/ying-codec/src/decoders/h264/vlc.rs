//! CAVLC 变长码表与多级查找表.
//!
//! 码表为编码方向描述 (码字, 码长), [`VlcTable::build`] 将其编译为
//! 解码方向的多级查找表: 一次窥视 (peek) `table_bits` 位直接命中短码;
//! 超长码通过负长度标记跳入子表, 子表宽度不超过父表宽度.
//!
//! 所有表在解码器创建时构建一次, 不使用全局状态.

use ying_core::{BitReader, YingError, YingResult};

/// 单个 VLC 码字: (码值, 码长). 码长 0 表示该索引无对应码字.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VlcCode {
    pub bits: u32,
    pub len: u8,
}

const fn c(bits: u32, len: u8) -> VlcCode {
    VlcCode { bits, len }
}

/// 无效项
pub const INV: VlcCode = c(0, 0);

// ============================================================
// 规范码表 (编码方向)
// ============================================================

/// coeff_token, total_coeff == 0 的码字. 索引与 [`COEFF_TOKEN`] 的表号一致.
pub const COEFF0_TOKEN: [VlcCode; 5] = [c(0x1, 1), c(0x3, 2), c(0xf, 4), c(0x3, 6), c(0x1, 2)];

/// coeff_token 码表, 编码方向索引 `(total_coeff - 1) * 4 + trailing_ones`.
///
/// 表 0-2 按邻块非零系数预测值 nC 选择, 表 3 为 6 位定长码 (nC >= 8),
/// 表 4 为色度 DC 专用 (nC == -1, total_coeff 最多 4).
pub const COEFF_TOKEN: [[VlcCode; 64]; 5] = [
    // 表 0 (0 <= nC < 2)
    [
        c(0x5, 6), c(0x1, 2), INV, INV,
        c(0x7, 8), c(0x4, 6), c(0x1, 3), INV,
        c(0x7, 9), c(0x6, 8), c(0x5, 7), c(0x3, 5),
        c(0x7, 10), c(0x6, 9), c(0x5, 8), c(0x3, 6),
        c(0x7, 11), c(0x6, 10), c(0x5, 9), c(0x4, 7),
        c(0xf, 13), c(0x6, 11), c(0x5, 10), c(0x4, 8),
        c(0xb, 13), c(0xe, 13), c(0x5, 11), c(0x4, 9),
        c(0x8, 13), c(0xa, 13), c(0xd, 13), c(0x4, 10),
        c(0xf, 14), c(0xe, 14), c(0x9, 13), c(0x4, 11),
        c(0xb, 14), c(0xa, 14), c(0xd, 14), c(0xc, 13),
        c(0xf, 15), c(0xe, 15), c(0x9, 14), c(0xc, 14),
        c(0xb, 15), c(0xa, 15), c(0xd, 15), c(0x8, 14),
        c(0xf, 16), c(0x1, 15), c(0x9, 15), c(0xc, 15),
        c(0xb, 16), c(0xe, 16), c(0xd, 16), c(0x8, 15),
        c(0x7, 16), c(0xa, 16), c(0x9, 16), c(0xc, 16),
        c(0x4, 16), c(0x6, 16), c(0x5, 16), c(0x8, 16),
    ],
    // 表 1 (2 <= nC < 4)
    [
        c(0xb, 6), c(0x2, 2), INV, INV,
        c(0x7, 6), c(0x7, 5), c(0x3, 3), INV,
        c(0x7, 7), c(0xa, 6), c(0x9, 6), c(0x5, 4),
        c(0x7, 8), c(0x6, 6), c(0x5, 6), c(0x4, 4),
        c(0x4, 8), c(0x6, 7), c(0x5, 7), c(0x6, 5),
        c(0x7, 9), c(0x6, 8), c(0x5, 8), c(0x8, 6),
        c(0xf, 11), c(0x6, 9), c(0x5, 9), c(0x4, 6),
        c(0xb, 11), c(0xe, 11), c(0xd, 11), c(0x4, 7),
        c(0xf, 12), c(0xa, 11), c(0x9, 11), c(0x4, 9),
        c(0xb, 12), c(0xe, 12), c(0xd, 12), c(0xc, 11),
        c(0x8, 12), c(0xa, 12), c(0x9, 12), c(0x8, 11),
        c(0xf, 13), c(0xe, 13), c(0xd, 13), c(0xc, 12),
        c(0xb, 13), c(0xa, 13), c(0x9, 13), c(0xc, 13),
        c(0x7, 13), c(0xb, 14), c(0x6, 13), c(0x8, 13),
        c(0x9, 14), c(0x8, 14), c(0xa, 14), c(0x1, 13),
        c(0x7, 14), c(0x6, 14), c(0x5, 14), c(0x4, 14),
    ],
    // 表 2 (4 <= nC < 8)
    [
        c(0xf, 6), c(0xe, 4), INV, INV,
        c(0xb, 6), c(0xf, 5), c(0xd, 4), INV,
        c(0x8, 6), c(0xc, 5), c(0xe, 5), c(0xc, 4),
        c(0xf, 7), c(0xa, 5), c(0xb, 5), c(0xb, 4),
        c(0xb, 7), c(0x8, 5), c(0x9, 5), c(0xa, 4),
        c(0x9, 7), c(0xe, 6), c(0xd, 6), c(0x9, 4),
        c(0x8, 7), c(0xa, 6), c(0x9, 6), c(0x8, 4),
        c(0xf, 8), c(0xe, 7), c(0xd, 7), c(0xd, 5),
        c(0xb, 8), c(0xe, 8), c(0xa, 7), c(0xc, 6),
        c(0xf, 9), c(0xa, 8), c(0xd, 8), c(0xc, 7),
        c(0xb, 9), c(0xe, 9), c(0x9, 8), c(0xc, 8),
        c(0x8, 9), c(0xa, 9), c(0xd, 9), c(0x8, 8),
        c(0xd, 10), c(0x7, 9), c(0x9, 9), c(0xc, 9),
        c(0x9, 10), c(0xc, 10), c(0xb, 10), c(0xa, 10),
        c(0x5, 10), c(0x8, 10), c(0x7, 10), c(0x6, 10),
        c(0x1, 10), c(0x4, 10), c(0x3, 10), c(0x2, 10),
    ],
    // 表 3 (nC >= 8, 6 位定长)
    [
        c(0x00, 6), c(0x01, 6), INV, INV,
        c(0x04, 6), c(0x05, 6), c(0x06, 6), INV,
        c(0x08, 6), c(0x09, 6), c(0x0a, 6), c(0x0b, 6),
        c(0x0c, 6), c(0x0d, 6), c(0x0e, 6), c(0x0f, 6),
        c(0x10, 6), c(0x11, 6), c(0x12, 6), c(0x13, 6),
        c(0x14, 6), c(0x15, 6), c(0x16, 6), c(0x17, 6),
        c(0x18, 6), c(0x19, 6), c(0x1a, 6), c(0x1b, 6),
        c(0x1c, 6), c(0x1d, 6), c(0x1e, 6), c(0x1f, 6),
        c(0x20, 6), c(0x21, 6), c(0x22, 6), c(0x23, 6),
        c(0x24, 6), c(0x25, 6), c(0x26, 6), c(0x27, 6),
        c(0x28, 6), c(0x29, 6), c(0x2a, 6), c(0x2b, 6),
        c(0x2c, 6), c(0x2d, 6), c(0x2e, 6), c(0x2f, 6),
        c(0x30, 6), c(0x31, 6), c(0x32, 6), c(0x33, 6),
        c(0x34, 6), c(0x35, 6), c(0x36, 6), c(0x37, 6),
        c(0x38, 6), c(0x39, 6), c(0x3a, 6), c(0x3b, 6),
        c(0x3c, 6), c(0x3d, 6), c(0x3e, 6), c(0x3f, 6),
    ],
    // 表 4 (色度 DC, nC == -1)
    [
        c(0x7, 6), c(0x1, 1), INV, INV,
        c(0x4, 6), c(0x6, 6), c(0x1, 3), INV,
        c(0x3, 6), c(0x3, 7), c(0x2, 7), c(0x5, 6),
        c(0x2, 6), c(0x3, 8), c(0x2, 8), c(0x0, 7),
        INV, INV, INV, INV,
        INV, INV, INV, INV,
        INV, INV, INV, INV,
        INV, INV, INV, INV,
        INV, INV, INV, INV,
        INV, INV, INV, INV,
        INV, INV, INV, INV,
        INV, INV, INV, INV,
        INV, INV, INV, INV,
        INV, INV, INV, INV,
        INV, INV, INV, INV,
        INV, INV, INV, INV,
    ],
];

/// level_prefix: 前缀 n 编码为 n 个 0 后跟一个 1
pub const LEVEL_PREFIX: [VlcCode; 16] = [
    c(0x1, 1), c(0x1, 2), c(0x1, 3), c(0x1, 4),
    c(0x1, 5), c(0x1, 6), c(0x1, 7), c(0x1, 8),
    c(0x1, 9), c(0x1, 10), c(0x1, 11), c(0x1, 12),
    c(0x1, 13), c(0x1, 14), c(0x1, 15), c(0x1, 16),
];

/// total_zeros, 索引 `[total_coeff - 1][total_zeros]`
pub const TOTAL_ZEROS: [[VlcCode; 16]; 15] = [
    [
        c(0x1, 1), c(0x3, 3), c(0x2, 3), c(0x3, 4), c(0x2, 4), c(0x3, 5), c(0x2, 5), c(0x3, 6),
        c(0x2, 6), c(0x3, 7), c(0x2, 7), c(0x3, 8), c(0x2, 8), c(0x3, 9), c(0x2, 9), c(0x1, 9),
    ],
    [
        c(0x7, 3), c(0x6, 3), c(0x5, 3), c(0x4, 3), c(0x3, 3), c(0x5, 4), c(0x4, 4), c(0x3, 4),
        c(0x2, 4), c(0x3, 5), c(0x2, 5), c(0x3, 6), c(0x2, 6), c(0x1, 6), c(0x0, 6), INV,
    ],
    [
        c(0x5, 4), c(0x7, 3), c(0x6, 3), c(0x5, 3), c(0x4, 4), c(0x3, 4), c(0x4, 3), c(0x3, 3),
        c(0x2, 4), c(0x3, 5), c(0x2, 5), c(0x1, 6), c(0x1, 5), c(0x0, 6), INV, INV,
    ],
    [
        c(0x3, 5), c(0x7, 3), c(0x5, 4), c(0x4, 4), c(0x6, 3), c(0x5, 3), c(0x4, 3), c(0x3, 4),
        c(0x3, 3), c(0x2, 4), c(0x2, 5), c(0x1, 5), c(0x0, 5), INV, INV, INV,
    ],
    [
        c(0x5, 4), c(0x4, 4), c(0x3, 4), c(0x7, 3), c(0x6, 3), c(0x5, 3), c(0x4, 3), c(0x3, 3),
        c(0x2, 4), c(0x1, 5), c(0x1, 4), c(0x0, 5), INV, INV, INV, INV,
    ],
    [
        c(0x1, 6), c(0x1, 5), c(0x7, 3), c(0x6, 3), c(0x5, 3), c(0x4, 3), c(0x3, 3), c(0x2, 3),
        c(0x1, 4), c(0x1, 3), c(0x0, 6), INV, INV, INV, INV, INV,
    ],
    [
        c(0x1, 6), c(0x1, 5), c(0x5, 3), c(0x4, 3), c(0x3, 3), c(0x3, 2), c(0x2, 3), c(0x1, 4),
        c(0x1, 3), c(0x0, 6), INV, INV, INV, INV, INV, INV,
    ],
    [
        c(0x1, 6), c(0x1, 4), c(0x1, 5), c(0x3, 3), c(0x3, 2), c(0x2, 2), c(0x2, 3), c(0x1, 3),
        c(0x0, 6), INV, INV, INV, INV, INV, INV, INV,
    ],
    [
        c(0x1, 6), c(0x0, 6), c(0x1, 4), c(0x3, 2), c(0x2, 2), c(0x1, 3), c(0x1, 2), c(0x1, 5),
        INV, INV, INV, INV, INV, INV, INV, INV,
    ],
    [
        c(0x1, 5), c(0x0, 5), c(0x1, 3), c(0x3, 2), c(0x2, 2), c(0x1, 2), c(0x1, 4), INV,
        INV, INV, INV, INV, INV, INV, INV, INV,
    ],
    [
        c(0x0, 4), c(0x1, 4), c(0x1, 3), c(0x2, 3), c(0x1, 1), c(0x3, 3), INV, INV,
        INV, INV, INV, INV, INV, INV, INV, INV,
    ],
    [
        c(0x0, 4), c(0x1, 4), c(0x1, 2), c(0x1, 1), c(0x1, 3), INV, INV, INV,
        INV, INV, INV, INV, INV, INV, INV, INV,
    ],
    [
        c(0x0, 3), c(0x1, 3), c(0x1, 1), c(0x1, 2), INV, INV, INV, INV,
        INV, INV, INV, INV, INV, INV, INV, INV,
    ],
    [
        c(0x0, 2), c(0x1, 2), c(0x1, 1), INV, INV, INV, INV, INV,
        INV, INV, INV, INV, INV, INV, INV, INV,
    ],
    [
        c(0x0, 1), c(0x1, 1), INV, INV, INV, INV, INV, INV,
        INV, INV, INV, INV, INV, INV, INV, INV,
    ],
];

/// 色度 DC 专用 total_zeros, 索引 `[total_coeff - 1][total_zeros]`
pub const TOTAL_ZEROS_DC: [[VlcCode; 4]; 3] = [
    [c(0x1, 1), c(0x1, 2), c(0x1, 3), c(0x0, 3)],
    [c(0x1, 1), c(0x1, 2), c(0x0, 2), INV],
    [c(0x1, 1), c(0x0, 1), INV, INV],
];

/// run_before, 索引 `[min(zeros_left - 1, 6)][run_before]`
pub const RUN_BEFORE: [[VlcCode; 16]; 7] = [
    [
        c(0x1, 1), c(0x0, 1), INV, INV, INV, INV, INV, INV,
        INV, INV, INV, INV, INV, INV, INV, INV,
    ],
    [
        c(0x1, 1), c(0x1, 2), c(0x0, 2), INV, INV, INV, INV, INV,
        INV, INV, INV, INV, INV, INV, INV, INV,
    ],
    [
        c(0x3, 2), c(0x2, 2), c(0x1, 2), c(0x0, 2), INV, INV, INV, INV,
        INV, INV, INV, INV, INV, INV, INV, INV,
    ],
    [
        c(0x3, 2), c(0x2, 2), c(0x1, 2), c(0x1, 3), c(0x0, 3), INV, INV, INV,
        INV, INV, INV, INV, INV, INV, INV, INV,
    ],
    [
        c(0x3, 2), c(0x2, 2), c(0x3, 3), c(0x2, 3), c(0x1, 3), c(0x0, 3), INV, INV,
        INV, INV, INV, INV, INV, INV, INV, INV,
    ],
    [
        c(0x3, 2), c(0x0, 3), c(0x1, 3), c(0x3, 3), c(0x2, 3), c(0x5, 3), c(0x4, 3), INV,
        INV, INV, INV, INV, INV, INV, INV, INV,
    ],
    [
        c(0x7, 3), c(0x6, 3), c(0x5, 3), c(0x4, 3), c(0x3, 3), c(0x2, 3), c(0x1, 3), c(0x1, 4),
        c(0x1, 5), c(0x1, 6), c(0x1, 7), c(0x1, 8), c(0x1, 9), c(0x1, 10), c(0x1, 11), INV,
    ],
];

// ============================================================
// 多级查找表
// ============================================================

/// 查找表项.
///
/// `len > 0`: 终结项, 消耗 `len` 位, `value` 为码表索引;
/// `len < 0`: 子表跳转, 消耗当前表宽度位, `-len` 为子表宽度, `value` 为子表基址;
/// `len == 0`: 无对应码字.
#[derive(Debug, Clone, Copy)]
struct VlcEntry {
    value: i32,
    len: i8,
}

const EMPTY_ENTRY: VlcEntry = VlcEntry { value: -1, len: 0 };

/// 解码方向的多级 VLC 查找表
#[derive(Debug, Clone)]
pub struct VlcTable {
    lookup: Vec<VlcEntry>,
    /// 根表一次窥视的位数
    table_bits: u32,
}

/// 解码时允许的最大子表嵌套层数
const MAX_VLC_DEPTH: u32 = 5;

impl VlcTable {
    /// 由编码方向码表构建解码查找表
    ///
    /// `codes[i]` 解码后返回索引 `i`. 码长 0 的项跳过 (解码到其码字空间时报错).
    pub fn build(codes: &[VlcCode], table_bits: u32) -> YingResult<Self> {
        if table_bits == 0 || table_bits > 16 {
            return Err(YingError::InvalidArgument(format!(
                "VLC: 表宽度非法, table_bits={}",
                table_bits
            )));
        }

        let mut table = Self {
            lookup: Vec::new(),
            table_bits,
        };
        let entries: Vec<(u32, u8, i32)> = codes
            .iter()
            .enumerate()
            .filter(|(_, code)| code.len > 0)
            .map(|(i, code)| (code.bits, code.len, i as i32))
            .collect();
        table.build_subtable(&entries, table_bits)?;
        Ok(table)
    }

    /// 在平坦数组尾部追加一张宽度为 `width` 的子表, 返回其基址
    fn build_subtable(&mut self, entries: &[(u32, u8, i32)], width: u32) -> YingResult<usize> {
        let base = self.lookup.len();
        self.lookup.resize(base + (1usize << width), EMPTY_ENTRY);

        // 第一遍: 短码直接展开填充
        for &(bits, len, value) in entries {
            if u32::from(len) > width {
                continue;
            }
            let shift = width - u32::from(len);
            let start = base + ((bits as usize) << shift);
            for slot in &mut self.lookup[start..start + (1 << shift)] {
                if slot.len != 0 {
                    return Err(YingError::InvalidArgument(format!(
                        "VLC: 码字冲突, bits={:#x}, len={}",
                        bits, len
                    )));
                }
                *slot = VlcEntry { value, len: len as i8 };
            }
        }

        // 第二遍: 超长码按前缀分组, 递归构建子表
        let mut long: Vec<(u32, u8, i32)> = entries
            .iter()
            .copied()
            .filter(|&(_, len, _)| u32::from(len) > width)
            .collect();
        long.sort_by_key(|&(bits, len, _)| bits >> (u32::from(len) - width));

        let mut i = 0;
        while i < long.len() {
            let prefix = long[i].0 >> (u32::from(long[i].1) - width);
            let mut group = Vec::new();
            let mut max_excess = 0u32;
            while i < long.len() && long[i].0 >> (u32::from(long[i].1) - width) == prefix {
                let (bits, len, value) = long[i];
                let excess = u32::from(len) - width;
                max_excess = max_excess.max(excess);
                group.push((bits & ((1 << excess) - 1), excess as u8, value));
                i += 1;
            }

            let slot = base + prefix as usize;
            if self.lookup[slot].len != 0 {
                return Err(YingError::InvalidArgument(format!(
                    "VLC: 前缀冲突, prefix={:#x}",
                    prefix
                )));
            }

            // 子表宽度不超过父表宽度, 深度由读取侧限制
            let sub_width = max_excess.min(width);
            // 子表内码长按子表宽度重新归一 (不足宽度的补齐在递归里完成)
            let sub_base = self.build_subtable(&group, sub_width)?;
            self.lookup[slot] = VlcEntry {
                value: sub_base as i32,
                len: -(sub_width as i8),
            };
        }

        Ok(base)
    }

    /// 从比特流读取一个码字, 返回其在源码表中的索引
    pub fn read(&self, br: &mut BitReader) -> YingResult<u32> {
        let mut width = self.table_bits;
        let mut table_base = 0usize;

        for _ in 0..=MAX_VLC_DEPTH {
            let peeked = br.peek_bits(width)? as usize;
            let entry = self.lookup[table_base + peeked];

            if entry.len > 0 {
                br.skip_bits(entry.len as u32)?;
                return Ok(entry.value as u32);
            }
            if entry.len == 0 {
                return Err(YingError::InvalidData(
                    "VLC: 码字无效 (码流损坏?)".into(),
                ));
            }

            br.skip_bits(width)?;
            table_base = entry.value as usize;
            width = (-entry.len) as u32;
        }

        Err(YingError::InvalidData("VLC: 码字嵌套层数越界".into()))
    }
}

/// H.264 CAVLC 解码所需的全部查找表
///
/// 解码器创建时构建一次, 由所有切片共享.
#[derive(Debug)]
pub struct VlcTables {
    /// 折叠后的 coeff_token 表 5 张, 解码值 = total_coeff * 4 + trailing_ones
    pub coeff_token: Vec<VlcTable>,
    pub level_prefix: VlcTable,
    /// 索引 [total_coeff - 1]
    pub total_zeros: Vec<VlcTable>,
    /// 索引 [total_coeff - 1], 色度 DC 专用
    pub total_zeros_dc: Vec<VlcTable>,
    /// 索引 [min(zeros_left - 1, 6)]
    pub run_before: Vec<VlcTable>,
}

impl VlcTables {
    pub fn new() -> YingResult<Self> {
        let mut coeff_token = Vec::with_capacity(5);
        for i in 0..5 {
            coeff_token.push(VlcTable::build(&folded_coeff_token(i), 4)?);
        }

        let level_prefix = VlcTable::build(&LEVEL_PREFIX, 8)?;

        let mut total_zeros = Vec::with_capacity(15);
        for row in &TOTAL_ZEROS {
            total_zeros.push(VlcTable::build(row, 9)?);
        }

        let mut total_zeros_dc = Vec::with_capacity(3);
        for row in &TOTAL_ZEROS_DC {
            total_zeros_dc.push(VlcTable::build(row, 3)?);
        }

        let mut run_before = Vec::with_capacity(7);
        for row in &RUN_BEFORE {
            run_before.push(VlcTable::build(row, 6)?);
        }

        Ok(Self {
            coeff_token,
            level_prefix,
            total_zeros,
            total_zeros_dc,
            run_before,
        })
    }
}

/// 将 total_coeff == 0 的码字与 coeff_token 表折叠为统一索引空间:
/// 解码值 `v` 满足 `total_coeff = v / 4`, `trailing_ones = v % 4`.
fn folded_coeff_token(table: usize) -> [VlcCode; 68] {
    let mut out = [INV; 68];
    out[0] = COEFF0_TOKEN[table];
    out[4..68].copy_from_slice(&COEFF_TOKEN[table]);
    out
}
