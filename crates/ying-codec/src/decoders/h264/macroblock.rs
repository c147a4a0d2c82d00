//! 宏块数据模型与邻块预测.
//!
//! 解码中的宏块由 [`MbBuilder`] 承载可变状态, 完成后冻结为不可变的
//! [`Macroblock`] 存入 [`MacroblockArena`] (以 (x, y) 宏块坐标索引,
//! 所有邻块访问经过边界与切片归属检查).

use super::common::median3;

/// 宏块内 4x4 块 z-scan 序 → 块列坐标
pub const BLOCK_IDX_X: [usize; 16] = [0, 1, 0, 1, 2, 3, 2, 3, 0, 1, 0, 1, 2, 3, 2, 3];
/// 宏块内 4x4 块 z-scan 序 → 块行坐标
pub const BLOCK_IDX_Y: [usize; 16] = [0, 0, 1, 1, 0, 0, 1, 1, 2, 2, 3, 3, 2, 2, 3, 3];
/// 块坐标 [y][x] → z-scan 序号
pub const BLOCK_IDX_XY: [[usize; 4]; 4] = [
    [0, 1, 4, 5],
    [2, 3, 6, 7],
    [8, 9, 12, 13],
    [10, 11, 14, 15],
];

/// 参考帧索引: 单元不可用
pub const REF_UNAVAILABLE: i8 = -2;
/// 参考帧索引: 帧内编码
pub const REF_INTRA: i8 = -1;

/// 宏块类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MbType {
    I4x4,
    I16x16,
    P16x16,
    P16x8,
    P8x16,
    P8x8,
    /// P_8x8 变体, 所有子块参考帧索引隐含为 0
    P8x8Ref0,
    PSkip,
}

impl MbType {
    pub fn is_intra(&self) -> bool {
        matches!(self, Self::I4x4 | Self::I16x16)
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, Self::PSkip)
    }
}

/// P_8x8 子宏块划分
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubMbType {
    L0_8x8,
    L0_8x4,
    L0_4x8,
    L0_4x4,
}

impl SubMbType {
    /// 子划分 (宽, 高, 个数), 单位 4x4 块
    pub fn partitions(&self) -> (usize, usize, usize) {
        match self {
            Self::L0_8x8 => (2, 2, 1),
            Self::L0_8x4 => (2, 1, 2),
            Self::L0_4x8 => (1, 2, 2),
            Self::L0_4x4 => (1, 1, 4),
        }
    }
}

/// 解码完成的宏块 (冻结后只读)
#[derive(Debug, Clone)]
pub struct Macroblock {
    pub mb_type: MbType,
    pub qp: i32,
    pub cbp_luma: u8,
    pub cbp_chroma: u8,
    /// Intra 16x16 亮度预测模式
    pub intra16_mode: u8,
    /// 色度预测模式
    pub chroma_mode: u8,
    /// Intra 4x4 各块预测模式 (z-scan 序)
    pub intra4x4_modes: [u8; 16],
    pub sub_types: [SubMbType; 4],
    /// 运动矢量, 4x4 单元光栅序 (y*4+x), 1/4 像素
    pub mv: [(i16, i16); 16],
    /// 参考帧索引, 4x4 单元光栅序; 帧内宏块为 [`REF_INTRA`]
    pub refidx: [i8; 16],
    /// 非零系数个数: 亮度 16 块 (z-scan) + Cb 4 块 + Cr 4 块 (各光栅序)
    pub nzc: [u8; 24],
    /// 所属切片编号, 邻块预测只在同切片内生效
    pub slice_id: u32,
}

impl Macroblock {
    fn empty(slice_id: u32) -> Self {
        Self {
            mb_type: MbType::PSkip,
            qp: 0,
            cbp_luma: 0,
            cbp_chroma: 0,
            intra16_mode: 0,
            chroma_mode: 0,
            intra4x4_modes: [0; 16],
            sub_types: [SubMbType::L0_8x8; 4],
            mv: [(0, 0); 16],
            refidx: [REF_UNAVAILABLE; 16],
            nzc: [0; 24],
            slice_id,
        }
    }

    /// 亮度块 (z-scan) 的非零系数个数
    pub fn nzc_luma(&self, idx: usize) -> u8 {
        self.nzc[idx]
    }

    /// 色度块非零系数个数, `ch` 0=Cb 1=Cr, `idx` 为分量内光栅序 0-3
    pub fn nzc_chroma(&self, ch: usize, idx: usize) -> u8 {
        self.nzc[16 + ch * 4 + idx]
    }
}

/// 正在解码的宏块 (可变), 完成后 [`MbBuilder::freeze`] 冻结
#[derive(Debug)]
pub struct MbBuilder {
    pub mb: Macroblock,
    pub x: usize,
    pub y: usize,
}

impl MbBuilder {
    pub fn new(x: usize, y: usize, slice_id: u32) -> Self {
        Self {
            mb: Macroblock::empty(slice_id),
            x,
            y,
        }
    }

    /// 为一个划分区域设置参考帧索引与运动矢量
    pub fn set_partition(&mut self, x4: usize, y4: usize, w4: usize, h4: usize, refidx: i8, mv: (i16, i16)) {
        for y in y4..y4 + h4 {
            for x in x4..x4 + w4 {
                self.mb.mv[y * 4 + x] = mv;
                self.mb.refidx[y * 4 + x] = refidx;
            }
        }
    }

    /// 帧内宏块: 所有单元标记为 intra
    pub fn mark_intra(&mut self) {
        self.mb.refidx = [REF_INTRA; 16];
        self.mb.mv = [(0, 0); 16];
    }

    pub fn freeze(self) -> Macroblock {
        self.mb
    }
}

/// 当前宏块的有效邻块 (同切片)
#[derive(Debug, Clone, Copy, Default)]
pub struct MbNeighbours {
    pub left: bool,
    pub top: bool,
    pub topright: bool,
    pub topleft: bool,
}

/// 一帧图像的宏块存储, (x, y) 宏块坐标索引
#[derive(Debug)]
pub struct MacroblockArena {
    mbs: Vec<Option<Macroblock>>,
    width: usize,
    height: usize,
}

impl MacroblockArena {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            mbs: vec![None; width * height],
            width,
            height,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn mb_count(&self) -> usize {
        self.width * self.height
    }

    /// 新图像开始时清空
    pub fn clear(&mut self) {
        self.mbs.fill(None);
    }

    /// 已解码宏块数
    pub fn decoded_count(&self) -> usize {
        self.mbs.iter().filter(|m| m.is_some()).count()
    }

    /// 边界检查的宏块访问, 坐标越界或未解码返回 None
    pub fn get(&self, x: i32, y: i32) -> Option<&Macroblock> {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return None;
        }
        self.mbs[y as usize * self.width + x as usize].as_ref()
    }

    /// 同切片内的已解码邻块
    pub fn get_in_slice(&self, x: i32, y: i32, slice_id: u32) -> Option<&Macroblock> {
        self.get(x, y).filter(|mb| mb.slice_id == slice_id)
    }

    pub fn put(&mut self, x: usize, y: usize, mb: Macroblock) {
        debug_assert!(x < self.width && y < self.height);
        self.mbs[y * self.width + x] = Some(mb);
    }

    /// 计算 (x, y) 处宏块的邻块可用性 (限同切片)
    pub fn neighbours(&self, x: usize, y: usize, slice_id: u32) -> MbNeighbours {
        let (x, y) = (x as i32, y as i32);
        MbNeighbours {
            left: self.get_in_slice(x - 1, y, slice_id).is_some(),
            top: self.get_in_slice(x, y - 1, slice_id).is_some(),
            topright: self.get_in_slice(x + 1, y - 1, slice_id).is_some(),
            topleft: self.get_in_slice(x - 1, y - 1, slice_id).is_some(),
        }
    }
}

// ============================================================
// 邻块预测
// ============================================================

/// 取相对当前宏块的 4x4 单元 (坐标可越出宏块边界进入邻块).
///
/// 返回 (参考帧索引, 运动矢量). 单元不可用时为 ([`REF_UNAVAILABLE`], (0,0)).
fn fetch_cell(
    arena: &MacroblockArena,
    cur: &MbBuilder,
    x4: i32,
    y4: i32,
) -> (i8, (i16, i16)) {
    let slice_id = cur.mb.slice_id;
    let (mb_x, mb_y) = (cur.x as i32, cur.y as i32);

    let (mb, cx, cy) = if (0..4).contains(&x4) && (0..4).contains(&y4) {
        // 当前宏块内部
        let cell = (y4 * 4 + x4) as usize;
        return (cur.mb.refidx[cell], cur.mb.mv[cell]);
    } else if x4 < 0 && (0..4).contains(&y4) {
        (arena.get_in_slice(mb_x - 1, mb_y, slice_id), x4 + 4, y4)
    } else if y4 < 0 && (0..4).contains(&x4) {
        (arena.get_in_slice(mb_x, mb_y - 1, slice_id), x4, y4 + 4)
    } else if y4 < 0 && x4 >= 4 {
        (arena.get_in_slice(mb_x + 1, mb_y - 1, slice_id), x4 - 4, y4 + 4)
    } else if y4 < 0 && x4 < 0 {
        (arena.get_in_slice(mb_x - 1, mb_y - 1, slice_id), x4 + 4, y4 + 4)
    } else {
        (None, 0, 0)
    };

    match mb {
        Some(mb) => {
            let cell = cy as usize * 4 + cx as usize;
            (mb.refidx[cell], mb.mv[cell])
        }
        None => (REF_UNAVAILABLE, (0, 0)),
    }
}

/// 划分的运动矢量中值预测.
///
/// `x4, y4, w4` 为划分在宏块内的 4x4 单元位置与宽度, `part_idx`
/// 标识 16x8 / 8x16 的上下/左右半区 (0 或 1).
pub fn predict_mv(
    arena: &MacroblockArena,
    cur: &MbBuilder,
    x4: usize,
    y4: usize,
    w4: usize,
    part_idx: usize,
    refidx: i8,
    mb_type_hint: MbType,
) -> (i16, i16) {
    let (ref_a, mv_a) = fetch_cell(arena, cur, x4 as i32 - 1, y4 as i32);
    let (ref_b, mv_b) = fetch_cell(arena, cur, x4 as i32, y4 as i32 - 1);

    // C = 右上角单元; 处于当前宏块上边界之下且越过右缘时不可用, 退化为左上 D
    let c_x = (x4 + w4) as i32;
    let (mut ref_c, mut mv_c) = if y4 > 0 && c_x >= 4 {
        (REF_UNAVAILABLE, (0, 0))
    } else {
        fetch_cell(arena, cur, c_x, y4 as i32 - 1)
    };
    if ref_c == REF_UNAVAILABLE {
        (ref_c, mv_c) = fetch_cell(arena, cur, x4 as i32 - 1, y4 as i32 - 1);
    }

    // 16x8 / 8x16 定向快捷规则
    match mb_type_hint {
        MbType::P16x8 => {
            if part_idx == 0 && ref_b == refidx {
                return mv_b;
            }
            if part_idx == 1 && ref_a == refidx {
                return mv_a;
            }
        }
        MbType::P8x16 => {
            if part_idx == 0 && ref_a == refidx {
                return mv_a;
            }
            if part_idx == 1 && ref_c == refidx {
                return mv_c;
            }
        }
        _ => {}
    }

    let mut matches = 0;
    let mut matched_mv = (0, 0);
    for (r, mv) in [(ref_a, mv_a), (ref_b, mv_b), (ref_c, mv_c)] {
        if r == refidx {
            matches += 1;
            matched_mv = mv;
        }
    }

    if matches == 1 {
        return matched_mv;
    }
    if matches == 0
        && ref_b == REF_UNAVAILABLE
        && ref_c == REF_UNAVAILABLE
        && ref_a != REF_UNAVAILABLE
    {
        return mv_a;
    }

    (
        median3(mv_a.0 as i32, mv_b.0 as i32, mv_c.0 as i32) as i16,
        median3(mv_a.1 as i32, mv_b.1 as i32, mv_c.1 as i32) as i16,
    )
}

/// P_SKIP 宏块运动矢量预测.
///
/// 左/上邻单元任一不可用, 或其参考为 0 且矢量为零时, 预测为零矢量;
/// 否则按 16x16 划分做中值预测 (参考 0).
pub fn predict_mv_pskip(arena: &MacroblockArena, cur: &MbBuilder) -> (i16, i16) {
    let (ref_a, mv_a) = fetch_cell(arena, cur, -1, 0);
    let (ref_b, mv_b) = fetch_cell(arena, cur, 0, -1);

    if ref_a == REF_UNAVAILABLE
        || ref_b == REF_UNAVAILABLE
        || (ref_a == 0 && mv_a == (0, 0))
        || (ref_b == 0 && mv_b == (0, 0))
    {
        return (0, 0);
    }

    predict_mv(arena, cur, 0, 0, 4, 0, 0, MbType::P16x16)
}

/// Intra 4x4 预测模式的预测值 (左/上邻块模式取小)
pub fn predict_intra4x4_mode(arena: &MacroblockArena, cur: &MbBuilder, idx: usize) -> u8 {
    let x4 = BLOCK_IDX_X[idx] as i32;
    let y4 = BLOCK_IDX_Y[idx] as i32;

    let mode_a = fetch_intra4x4_mode(arena, cur, x4 - 1, y4);
    let mode_b = fetch_intra4x4_mode(arena, cur, x4, y4 - 1);

    match (mode_a, mode_b) {
        (Some(a), Some(b)) => a.min(b),
        // 任一邻块不可用时预测为 DC
        _ => super::predict::mode4::DC,
    }
}

fn fetch_intra4x4_mode(
    arena: &MacroblockArena,
    cur: &MbBuilder,
    x4: i32,
    y4: i32,
) -> Option<u8> {
    if (0..4).contains(&x4) && (0..4).contains(&y4) {
        let idx = BLOCK_IDX_XY[y4 as usize][x4 as usize];
        return Some(cur.mb.intra4x4_modes[idx]);
    }

    let (mb, cx, cy) = if x4 < 0 {
        (
            arena.get_in_slice(cur.x as i32 - 1, cur.y as i32, cur.mb.slice_id),
            (x4 + 4) as usize,
            y4 as usize,
        )
    } else {
        (
            arena.get_in_slice(cur.x as i32, cur.y as i32 - 1, cur.mb.slice_id),
            x4 as usize,
            (y4 + 4) as usize,
        )
    };

    let mb = mb?;
    if mb.mb_type == MbType::I4x4 {
        Some(mb.intra4x4_modes[BLOCK_IDX_XY[cy][cx]])
    } else {
        // 非 I4x4 邻块视为 DC 模式
        Some(super::predict::mode4::DC)
    }
}

/// 亮度块 nC 预测 (coeff_token 表选择用): 左/上邻块非零系数数的均值
pub fn predict_nzc_luma(arena: &MacroblockArena, cur: &MbBuilder, idx: usize) -> i32 {
    let x4 = BLOCK_IDX_X[idx] as i32;
    let y4 = BLOCK_IDX_Y[idx] as i32;

    let a = fetch_nzc_luma(arena, cur, x4 - 1, y4);
    let b = fetch_nzc_luma(arena, cur, x4, y4 - 1);
    combine_nzc(a, b)
}

fn fetch_nzc_luma(arena: &MacroblockArena, cur: &MbBuilder, x4: i32, y4: i32) -> Option<i32> {
    if (0..4).contains(&x4) && (0..4).contains(&y4) {
        return Some(i32::from(cur.mb.nzc[BLOCK_IDX_XY[y4 as usize][x4 as usize]]));
    }
    let (mb, cx, cy) = if x4 < 0 {
        (
            arena.get_in_slice(cur.x as i32 - 1, cur.y as i32, cur.mb.slice_id),
            (x4 + 4) as usize,
            y4 as usize,
        )
    } else {
        (
            arena.get_in_slice(cur.x as i32, cur.y as i32 - 1, cur.mb.slice_id),
            x4 as usize,
            (y4 + 4) as usize,
        )
    };
    mb.map(|mb| i32::from(mb.nzc[BLOCK_IDX_XY[cy][cx]]))
}

/// 色度块 nC 预测, `ch` 0=Cb 1=Cr, `idx` 为分量内光栅序 0-3
pub fn predict_nzc_chroma(arena: &MacroblockArena, cur: &MbBuilder, ch: usize, idx: usize) -> i32 {
    let cx = (idx % 2) as i32;
    let cy = (idx / 2) as i32;

    let a = fetch_nzc_chroma(arena, cur, ch, cx - 1, cy);
    let b = fetch_nzc_chroma(arena, cur, ch, cx, cy - 1);
    combine_nzc(a, b)
}

fn fetch_nzc_chroma(
    arena: &MacroblockArena,
    cur: &MbBuilder,
    ch: usize,
    cx: i32,
    cy: i32,
) -> Option<i32> {
    if (0..2).contains(&cx) && (0..2).contains(&cy) {
        return Some(i32::from(cur.mb.nzc[16 + ch * 4 + cy as usize * 2 + cx as usize]));
    }
    let (mb, x, y) = if cx < 0 {
        (
            arena.get_in_slice(cur.x as i32 - 1, cur.y as i32, cur.mb.slice_id),
            (cx + 2) as usize,
            cy as usize,
        )
    } else {
        (
            arena.get_in_slice(cur.x as i32, cur.y as i32 - 1, cur.mb.slice_id),
            cx as usize,
            (cy + 2) as usize,
        )
    };
    mb.map(|mb| i32::from(mb.nzc[16 + ch * 4 + y * 2 + x]))
}

fn combine_nzc(a: Option<i32>, b: Option<i32>) -> i32 {
    match (a, b) {
        (Some(a), Some(b)) => (a + b + 1) >> 1,
        (Some(v), None) | (None, Some(v)) => v,
        (None, None) => 0,
    }
}
