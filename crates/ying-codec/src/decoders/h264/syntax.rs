//! 宏块层语法解析 (熵编码方案抽象).
//!
//! [`MacroblockSyntax`] 把熵编码方案与宏块语义解耦, CAVLC 由
//! [`CavlcSyntax`] 实现; PPS 指示 CABAC 时在 [`SliceEntropy::new`]
//! 处直接拒绝.

use ying_core::{BitReader, YingError, YingResult};

use super::cavlc::read_block_residual;
use super::macroblock::{
    predict_intra4x4_mode, predict_mv, predict_nzc_chroma, predict_nzc_luma, MacroblockArena,
    MbBuilder, MbType, SubMbType,
};
use super::parameter_sets::Pps;
use super::slice::SliceHeader;
use super::vlc::VlcTables;

// ============================================================
// CBP 映射表
// ============================================================

// coded_block_pattern 的 Exp-Golomb 码序 (cbp → codeNum), 帧内/帧间
// 各一张; 解码方向的表由 invert48 在编译期求逆.
const CBP_TO_GOLOMB_INTRA4X4: [u8; 48] = [
    3, 29, 30, 17, 31, 18, 37, 8, 32, 38, 19, 9, 20, 10, 11, 2,
    16, 33, 34, 21, 35, 22, 39, 4, 36, 40, 23, 5, 24, 6, 7, 1,
    41, 42, 43, 25, 44, 26, 46, 12, 45, 47, 27, 13, 28, 14, 15, 0,
];
const CBP_TO_GOLOMB_INTER: [u8; 48] = [
    0, 2, 3, 7, 4, 8, 17, 13, 5, 18, 9, 14, 10, 15, 16, 11,
    1, 32, 33, 36, 34, 37, 44, 40, 35, 45, 38, 41, 39, 42, 43, 19,
    6, 24, 25, 20, 26, 21, 46, 28, 27, 47, 22, 29, 23, 30, 31, 12,
];

const fn invert48(table: &[u8; 48]) -> [u8; 48] {
    let mut out = [0u8; 48];
    let mut i = 0;
    while i < 48 {
        out[table[i] as usize] = i as u8;
        i += 1;
    }
    out
}

const GOLOMB_TO_CBP_INTRA4X4: [u8; 48] = invert48(&CBP_TO_GOLOMB_INTRA4X4);
const GOLOMB_TO_CBP_INTER: [u8; 48] = invert48(&CBP_TO_GOLOMB_INTER);

// ============================================================
// 残差暂存
// ============================================================

/// 一个宏块解析出的全部残差系数 (zigzag 扫描序, 未反扫描)
#[derive(Debug)]
pub struct MbResiduals {
    /// Intra 16x16 亮度 DC (16 个)
    pub luma_dc: [i32; 16],
    /// 亮度 4x4 块 (z-scan 序); Intra 16x16 时仅 1..16 为 AC 系数
    pub luma: [[i32; 16]; 16],
    /// 色度 DC, [Cb, Cr] 各 4 个
    pub chroma_dc: [[i32; 4]; 2],
    /// 色度 AC, [分量][块], 仅 1..16 有效
    pub chroma_ac: [[[i32; 16]; 4]; 2],
}

impl MbResiduals {
    pub fn zeroed() -> Self {
        Self {
            luma_dc: [0; 16],
            luma: [[0; 16]; 16],
            chroma_dc: [[0; 4]; 2],
            chroma_ac: [[[0; 16]; 4]; 2],
        }
    }

    pub fn clear(&mut self) {
        self.luma_dc = [0; 16];
        self.luma = [[0; 16]; 16];
        self.chroma_dc = [[0; 4]; 2];
        self.chroma_ac = [[[0; 16]; 4]; 2];
    }
}

// ============================================================
// 语法接口
// ============================================================

/// 宏块层熵解码接口
pub trait MacroblockSyntax {
    /// P 切片的 mb_skip_run
    fn read_skip_run(&mut self, br: &mut BitReader) -> YingResult<u32>;

    /// 读取一个非 skip 宏块的全部语法元素, 填充 builder 与残差
    fn read_macroblock(
        &mut self,
        br: &mut BitReader,
        arena: &MacroblockArena,
        builder: &mut MbBuilder,
        header: &SliceHeader,
        pps: &Pps,
        residuals: &mut MbResiduals,
    ) -> YingResult<()>;
}

/// 切片使用的熵编码方案
pub enum SliceEntropy<'a> {
    Cavlc(CavlcSyntax<'a>),
}

impl<'a> SliceEntropy<'a> {
    pub fn new(pps: &Pps, tables: &'a VlcTables) -> YingResult<Self> {
        if pps.entropy_coding_mode {
            return Err(YingError::Unsupported(
                "H264: CABAC 熵编码暂不支持, 仅支持 CAVLC".to_string(),
            ));
        }
        Ok(Self::Cavlc(CavlcSyntax { tables }))
    }
}

impl MacroblockSyntax for SliceEntropy<'_> {
    fn read_skip_run(&mut self, br: &mut BitReader) -> YingResult<u32> {
        match self {
            Self::Cavlc(c) => c.read_skip_run(br),
        }
    }

    fn read_macroblock(
        &mut self,
        br: &mut BitReader,
        arena: &MacroblockArena,
        builder: &mut MbBuilder,
        header: &SliceHeader,
        pps: &Pps,
        residuals: &mut MbResiduals,
    ) -> YingResult<()> {
        match self {
            Self::Cavlc(c) => c.read_macroblock(br, arena, builder, header, pps, residuals),
        }
    }
}

// ============================================================
// CAVLC 实现
// ============================================================

pub struct CavlcSyntax<'a> {
    tables: &'a VlcTables,
}

impl MacroblockSyntax for CavlcSyntax<'_> {
    fn read_skip_run(&mut self, br: &mut BitReader) -> YingResult<u32> {
        br.read_ue()
    }

    fn read_macroblock(
        &mut self,
        br: &mut BitReader,
        arena: &MacroblockArena,
        builder: &mut MbBuilder,
        header: &SliceHeader,
        pps: &Pps,
        residuals: &mut MbResiduals,
    ) -> YingResult<()> {
        residuals.clear();

        let raw_type = br.read_ue()?;
        let intra_offset = if header.slice_type.is_intra() { 0 } else { 5 };

        if raw_type < intra_offset {
            // P 宏块
            let mb_type = match raw_type {
                0 => MbType::P16x16,
                1 => MbType::P16x8,
                2 => MbType::P8x16,
                3 => MbType::P8x8,
                4 => MbType::P8x8Ref0,
                _ => unreachable!(),
            };
            builder.mb.mb_type = mb_type;
            self.read_inter_prediction(br, arena, builder, header, mb_type)?;
        } else {
            let t = raw_type - intra_offset;
            builder.mark_intra();
            match t {
                0 => {
                    builder.mb.mb_type = MbType::I4x4;
                    self.read_intra4x4_modes(br, arena, builder)?;
                }
                1..=24 => {
                    builder.mb.mb_type = MbType::I16x16;
                    builder.mb.intra16_mode = ((t - 1) % 4) as u8;
                    builder.mb.cbp_chroma = (((t - 1) / 4) % 3) as u8;
                    builder.mb.cbp_luma = if (t - 1) / 12 != 0 { 0xf } else { 0 };
                }
                25 => {
                    return Err(YingError::Unsupported(
                        "H264: I_PCM 宏块暂不支持".to_string(),
                    ));
                }
                _ => {
                    return Err(YingError::InvalidData(format!(
                        "H264: 非法 mb_type, value={}",
                        raw_type
                    )));
                }
            }
            let chroma_mode = br.read_ue()?;
            if chroma_mode > 3 {
                return Err(YingError::InvalidData(format!(
                    "H264: 非法 intra_chroma_pred_mode, value={}",
                    chroma_mode
                )));
            }
            builder.mb.chroma_mode = chroma_mode as u8;
        }

        // coded_block_pattern (I16x16 的 CBP 已含在 mb_type 中)
        if builder.mb.mb_type != MbType::I16x16 {
            let code = br.read_ue()?;
            if code >= 48 {
                return Err(YingError::InvalidData(format!(
                    "H264: coded_block_pattern 越界, code={}",
                    code
                )));
            }
            let cbp = if builder.mb.mb_type == MbType::I4x4 {
                GOLOMB_TO_CBP_INTRA4X4[code as usize]
            } else {
                GOLOMB_TO_CBP_INTER[code as usize]
            };
            builder.mb.cbp_luma = cbp & 0xf;
            builder.mb.cbp_chroma = cbp >> 4;
        }

        // mb_qp_delta: 仅在存在残差时出现; 不跨宏块累积
        let has_residual = builder.mb.cbp_luma != 0
            || builder.mb.cbp_chroma != 0
            || builder.mb.mb_type == MbType::I16x16;
        let slice_qp = header.slice_qp(pps);
        builder.mb.qp = if has_residual {
            let qp = slice_qp + br.read_se()?;
            if !(0..=51).contains(&qp) {
                return Err(YingError::InvalidData(format!(
                    "H264: 宏块 QP 越界, qp={}",
                    qp
                )));
            }
            qp
        } else {
            slice_qp
        };

        if has_residual {
            self.read_residuals(br, arena, builder, residuals)?;
        }
        Ok(())
    }
}

impl CavlcSyntax<'_> {
    fn read_intra4x4_modes(
        &mut self,
        br: &mut BitReader,
        arena: &MacroblockArena,
        builder: &mut MbBuilder,
    ) -> YingResult<()> {
        for idx in 0..16 {
            let predicted = predict_intra4x4_mode(arena, builder, idx);
            let mode = if br.read_bit()? == 1 {
                predicted
            } else {
                let rem = br.read_bits(3)? as u8;
                if rem >= predicted { rem + 1 } else { rem }
            };
            builder.mb.intra4x4_modes[idx] = mode;
        }
        Ok(())
    }

    /// 参考帧索引, te(v) 编码, 上界 num_ref_idx_l0_active - 1
    fn read_ref_idx(&mut self, br: &mut BitReader, header: &SliceHeader) -> YingResult<i8> {
        let max = header.num_ref_idx_l0_active - 1;
        let value = br.read_te(max)?;
        if value > max {
            return Err(YingError::InvalidData(format!(
                "H264: ref_idx_l0 越界, value={} max={}",
                value, max
            )));
        }
        Ok(value as i8)
    }

    fn read_mvd(&mut self, br: &mut BitReader) -> YingResult<(i32, i32)> {
        Ok((br.read_se()?, br.read_se()?))
    }

    fn read_inter_prediction(
        &mut self,
        br: &mut BitReader,
        arena: &MacroblockArena,
        builder: &mut MbBuilder,
        header: &SliceHeader,
        mb_type: MbType,
    ) -> YingResult<()> {
        match mb_type {
            MbType::P16x16 => {
                let refidx = self.read_ref_idx(br, header)?;
                let mvd = self.read_mvd(br)?;
                let pred = predict_mv(arena, builder, 0, 0, 4, 0, refidx, mb_type);
                let mv = (pred.0 + mvd.0 as i16, pred.1 + mvd.1 as i16);
                builder.set_partition(0, 0, 4, 4, refidx, mv);
            }
            MbType::P16x8 | MbType::P8x16 => {
                // 语法顺序: 两个划分的 ref_idx 在前, mvd 在后
                let refs = [
                    self.read_ref_idx(br, header)?,
                    self.read_ref_idx(br, header)?,
                ];
                for part in 0..2 {
                    let (x4, y4, w4, h4) = if mb_type == MbType::P16x8 {
                        (0, part * 2, 4, 2)
                    } else {
                        (part * 2, 0, 2, 4)
                    };
                    let mvd = self.read_mvd(br)?;
                    let pred = predict_mv(arena, builder, x4, y4, w4, part, refs[part], mb_type);
                    let mv = (pred.0 + mvd.0 as i16, pred.1 + mvd.1 as i16);
                    builder.set_partition(x4, y4, w4, h4, refs[part], mv);
                }
            }
            MbType::P8x8 | MbType::P8x8Ref0 => {
                for i in 0..4 {
                    let sub = br.read_ue()?;
                    builder.mb.sub_types[i] = match sub {
                        0 => SubMbType::L0_8x8,
                        1 => SubMbType::L0_8x4,
                        2 => SubMbType::L0_4x8,
                        3 => SubMbType::L0_4x4,
                        _ => {
                            return Err(YingError::InvalidData(format!(
                                "H264: 非法 sub_mb_type, value={}",
                                sub
                            )));
                        }
                    };
                }
                let mut refs = [0i8; 4];
                if mb_type == MbType::P8x8 {
                    for r in refs.iter_mut() {
                        *r = self.read_ref_idx(br, header)?;
                    }
                }
                for i in 0..4 {
                    let x8 = (i % 2) * 2;
                    let y8 = (i / 2) * 2;
                    let (w4, h4, count) = builder.mb.sub_types[i].partitions();
                    for j in 0..count {
                        let (x4, y4) = match builder.mb.sub_types[i] {
                            SubMbType::L0_8x8 => (x8, y8),
                            SubMbType::L0_8x4 => (x8, y8 + j),
                            SubMbType::L0_4x8 => (x8 + j, y8),
                            SubMbType::L0_4x4 => (x8 + j % 2, y8 + j / 2),
                        };
                        let mvd = self.read_mvd(br)?;
                        let pred = predict_mv(arena, builder, x4, y4, w4, 0, refs[i], mb_type);
                        let mv = (pred.0 + mvd.0 as i16, pred.1 + mvd.1 as i16);
                        builder.set_partition(x4, y4, w4, h4, refs[i], mv);
                    }
                }
            }
            _ => unreachable!(),
        }
        Ok(())
    }

    fn read_residuals(
        &mut self,
        br: &mut BitReader,
        arena: &MacroblockArena,
        builder: &mut MbBuilder,
        residuals: &mut MbResiduals,
    ) -> YingResult<()> {
        let is_i16x16 = builder.mb.mb_type == MbType::I16x16;

        if is_i16x16 {
            // 亮度 DC: nC 取块 0 的邻块预测, 不计入 nzc 表
            let nc = predict_nzc_luma(arena, builder, 0);
            read_block_residual(br, self.tables, nc, &mut residuals.luma_dc)?;
        }

        for idx in 0..16 {
            if builder.mb.cbp_luma & (1 << (idx / 4)) == 0 {
                continue;
            }
            let nc = predict_nzc_luma(arena, builder, idx);
            let total = if is_i16x16 {
                read_block_residual(br, self.tables, nc, &mut residuals.luma[idx][1..16])?
            } else {
                read_block_residual(br, self.tables, nc, &mut residuals.luma[idx])?
            };
            builder.mb.nzc[idx] = total as u8;
        }

        if builder.mb.cbp_chroma != 0 {
            for ch in 0..2 {
                read_block_residual(br, self.tables, -1, &mut residuals.chroma_dc[ch])?;
            }
        }
        if builder.mb.cbp_chroma & 2 != 0 {
            for ch in 0..2 {
                for idx in 0..4 {
                    let nc = predict_nzc_chroma(arena, builder, ch, idx);
                    let total = read_block_residual(
                        br,
                        self.tables,
                        nc,
                        &mut residuals.chroma_ac[ch][idx][1..16],
                    )?;
                    builder.mb.nzc[16 + ch * 4 + idx] = total as u8;
                }
            }
        }
        Ok(())
    }
}
