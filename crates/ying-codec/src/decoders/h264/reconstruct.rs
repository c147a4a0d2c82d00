//! 宏块重建: 帧内预测 / 运动补偿 + 残差反变换叠加.
//!
//! 输入为已完成语法解析的宏块 (builder 状态 + 残差系数), 输出直接
//! 写入当前图像的三个平面. 色度与亮度共用运动矢量 (色度分辨率减半,
//! 同一矢量在色度平面上解释为 1/8 像素精度).

use ying_core::{YingError, YingResult};

use super::common::chroma_qp;
use super::macroblock::{Macroblock, MbBuilder, MbType, SubMbType, BLOCK_IDX_X, BLOCK_IDX_Y};
use super::macroblock::MacroblockArena;
use super::motion::{mc_chroma, mc_luma};
use super::parameter_sets::Pps;
use super::picture::Picture;
use super::predict::{
    predict_16x16, predict_4x4, predict_chroma_8x8, resolve_mode_16x16, resolve_mode_4x4,
    resolve_mode_chroma,
};
use super::syntax::MbResiduals;
use super::transform::{
    add_idct_4x4, dct_2x2_dc, dequant_2x2_dc, dequant_4x4, dequant_4x4_dc, idct_4x4_dc,
    unscan_2x2, unscan_4x4, unscan_4x4_ac,
};

/// 宏块的帧间划分列表, (x4, y4, w4, h4) 单位为 4x4 单元
fn partitions(mb: &Macroblock) -> Vec<(usize, usize, usize, usize)> {
    match mb.mb_type {
        MbType::P16x16 | MbType::PSkip => vec![(0, 0, 4, 4)],
        MbType::P16x8 => vec![(0, 0, 4, 2), (0, 2, 4, 2)],
        MbType::P8x16 => vec![(0, 0, 2, 4), (2, 0, 2, 4)],
        MbType::P8x8 | MbType::P8x8Ref0 => {
            let mut list = Vec::with_capacity(4);
            for i in 0..4 {
                let x8 = (i % 2) * 2;
                let y8 = (i / 2) * 2;
                match mb.sub_types[i] {
                    SubMbType::L0_8x8 => list.push((x8, y8, 2, 2)),
                    SubMbType::L0_8x4 => {
                        list.push((x8, y8, 2, 1));
                        list.push((x8, y8 + 1, 2, 1));
                    }
                    SubMbType::L0_4x8 => {
                        list.push((x8, y8, 1, 2));
                        list.push((x8 + 1, y8, 1, 2));
                    }
                    SubMbType::L0_4x4 => {
                        for j in 0..4 {
                            list.push((x8 + j % 2, y8 + j / 2, 1, 1));
                        }
                    }
                }
            }
            list
        }
        MbType::I4x4 | MbType::I16x16 => Vec::new(),
    }
}

fn motion_compensate(
    picture: &mut Picture,
    builder: &MbBuilder,
    list0: &[&Picture],
    x0: i32,
    y0: i32,
) -> YingResult<()> {
    for (x4, y4, w4, h4) in partitions(&builder.mb) {
        let cell = y4 * 4 + x4;
        let refidx = builder.mb.refidx[cell];
        let mv = builder.mb.mv[cell];
        let refpic = list0.get(refidx as usize).ok_or_else(|| {
            YingError::InvalidData(format!(
                "H264: 参考帧索引超出 list0, refidx={} list0_len={}",
                refidx,
                list0.len()
            ))
        })?;

        let mv = (i32::from(mv.0), i32::from(mv.1));
        mc_luma(
            &refpic.luma,
            &mut picture.luma,
            x0 + (x4 * 4) as i32,
            y0 + (y4 * 4) as i32,
            (w4 * 4) as i32,
            (h4 * 4) as i32,
            mv,
        );
        let (cx, cy, cw, chh) = (
            x0 / 2 + (x4 * 2) as i32,
            y0 / 2 + (y4 * 2) as i32,
            (w4 * 2) as i32,
            (h4 * 2) as i32,
        );
        mc_chroma(&refpic.cb, &mut picture.cb, cx, cy, cw, chh, mv);
        mc_chroma(&refpic.cr, &mut picture.cr, cx, cy, cw, chh, mv);
    }
    Ok(())
}

/// 重建一个宏块, 写入当前图像
pub fn reconstruct_macroblock(
    picture: &mut Picture,
    arena: &MacroblockArena,
    builder: &MbBuilder,
    residuals: &MbResiduals,
    pps: &Pps,
    list0: &[&Picture],
) -> YingResult<()> {
    let mb = &builder.mb;
    let x0 = (builder.x * 16) as i32;
    let y0 = (builder.y * 16) as i32;
    let nb = arena.neighbours(builder.x, builder.y, mb.slice_id);
    let qp = mb.qp;

    if !mb.mb_type.is_intra() {
        motion_compensate(picture, builder, list0, x0, y0)?;
    }

    // 亮度
    match mb.mb_type {
        MbType::I16x16 => {
            let mode = resolve_mode_16x16(mb.intra16_mode, nb.left, nb.top);
            predict_16x16(&mut picture.luma, x0, y0, mode)?;

            let mut dc = unscan_4x4(&residuals.luma_dc);
            idct_4x4_dc(&mut dc);
            dequant_4x4_dc(&mut dc, qp);

            for idx in 0..16 {
                let bx = BLOCK_IDX_X[idx];
                let by = BLOCK_IDX_Y[idx];
                let mut ac = [0i32; 15];
                ac.copy_from_slice(&residuals.luma[idx][1..16]);
                let mut dct = unscan_4x4_ac(&ac);
                dequant_4x4(&mut dct, qp);
                dct[0][0] = dc[by][bx];
                add_idct_4x4(
                    &mut picture.luma,
                    x0 + (bx * 4) as i32,
                    y0 + (by * 4) as i32,
                    &dct,
                );
            }
        }
        MbType::I4x4 => {
            // z-scan 序逐块: 预测依赖同宏块内已重建的块
            for idx in 0..16 {
                let bx = BLOCK_IDX_X[idx];
                let by = BLOCK_IDX_Y[idx];
                let (mode, emu) = resolve_mode_4x4(
                    idx,
                    mb.intra4x4_modes[idx],
                    nb.left,
                    nb.top,
                    nb.topright,
                );
                let px = x0 + (bx * 4) as i32;
                let py = y0 + (by * 4) as i32;
                predict_4x4(&mut picture.luma, px, py, mode, emu)?;
                if mb.nzc[idx] > 0 {
                    let mut dct = unscan_4x4(&residuals.luma[idx]);
                    dequant_4x4(&mut dct, qp);
                    add_idct_4x4(&mut picture.luma, px, py, &dct);
                }
            }
        }
        _ => {
            // 帧间残差
            for idx in 0..16 {
                if mb.nzc[idx] == 0 {
                    continue;
                }
                let mut dct = unscan_4x4(&residuals.luma[idx]);
                dequant_4x4(&mut dct, qp);
                add_idct_4x4(
                    &mut picture.luma,
                    x0 + (BLOCK_IDX_X[idx] * 4) as i32,
                    y0 + (BLOCK_IDX_Y[idx] * 4) as i32,
                    &dct,
                );
            }
        }
    }

    // 色度
    let qp_c = i32::from(chroma_qp(qp, pps.chroma_qp_index_offset));
    let (cx0, cy0) = (x0 / 2, y0 / 2);

    if mb.mb_type.is_intra() {
        let mode = resolve_mode_chroma(mb.chroma_mode, nb.left, nb.top);
        predict_chroma_8x8(&mut picture.cb, cx0, cy0, mode)?;
        predict_chroma_8x8(&mut picture.cr, cx0, cy0, mode)?;
    }

    if mb.cbp_chroma != 0 {
        for ch in 0..2 {
            let plane = if ch == 0 {
                &mut picture.cb
            } else {
                &mut picture.cr
            };
            let mut dc = unscan_2x2(&residuals.chroma_dc[ch]);
            dct_2x2_dc(&mut dc);
            dequant_2x2_dc(&mut dc, qp_c);

            for idx in 0..4 {
                let bx = idx % 2;
                let by = idx / 2;
                let mut ac = [0i32; 15];
                ac.copy_from_slice(&residuals.chroma_ac[ch][idx][1..16]);
                let mut dct = unscan_4x4_ac(&ac);
                dequant_4x4(&mut dct, qp_c);
                dct[0][0] = dc[by][bx];
                add_idct_4x4(
                    plane,
                    cx0 + (bx * 4) as i32,
                    cy0 + (by * 4) as i32,
                    &dct,
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoders::h264::parameter_sets::test_util::{PpsBuilder, SpsBuilder};
    use crate::decoders::h264::parameter_sets::Sps;
    use crate::decoders::h264::predict::{mode16, mode_chroma};

    fn small_sps() -> Sps {
        let mut b = SpsBuilder::default();
        b.mb_width_minus1 = 1;
        b.mb_height_minus1 = 1;
        Sps::parse(&b.build()).unwrap()
    }

    fn test_pps() -> Pps {
        Pps::parse(&PpsBuilder::default().build()).unwrap()
    }

    #[test]
    fn test_i16x16_dc128无残差() {
        let sps = small_sps();
        let pps = test_pps();
        let mut pic = Picture::new(&sps);
        let arena = MacroblockArena::new(2, 2);

        let mut builder = MbBuilder::new(0, 0, 0);
        builder.mb.mb_type = MbType::I16x16;
        builder.mb.intra16_mode = mode16::DC;
        builder.mb.chroma_mode = mode_chroma::DC;
        builder.mb.qp = 26;
        builder.mark_intra();
        let residuals = MbResiduals::zeroed();

        reconstruct_macroblock(&mut pic, &arena, &builder, &residuals, &pps, &[]).unwrap();

        // 无邻块 → DC_128, 无残差 → 全 128
        for y in 0..16 {
            for x in 0..16 {
                assert_eq!(pic.luma.get(x, y), 128);
            }
        }
        for y in 0..8 {
            for x in 0..8 {
                assert_eq!(pic.cb.get(x, y), 128);
                assert_eq!(pic.cr.get(x, y), 128);
            }
        }
    }

    #[test]
    fn test_i16x16_直流残差叠加() {
        let sps = small_sps();
        let pps = test_pps();
        let mut pic = Picture::new(&sps);
        let arena = MacroblockArena::new(2, 2);

        let mut builder = MbBuilder::new(0, 0, 0);
        builder.mb.mb_type = MbType::I16x16;
        builder.mb.intra16_mode = mode16::DC;
        builder.mb.qp = 24;
        builder.mark_intra();

        let mut residuals = MbResiduals::zeroed();
        residuals.luma_dc[0] = 8;

        reconstruct_macroblock(&mut pic, &arena, &builder, &residuals, &pps, &[]).unwrap();

        // qp=24: DC 反量化 8*10<<2 = 320, 反变换 (320+32)>>6 = 5
        for y in 0..16 {
            for x in 0..16 {
                assert_eq!(pic.luma.get(x, y), 133, "({}, {})", x, y);
            }
        }
    }

    #[test]
    fn test_pskip复制参考帧() {
        let sps = small_sps();
        let pps = test_pps();
        let mut pic = Picture::new(&sps);
        let arena = MacroblockArena::new(2, 2);

        let mut refpic = Picture::new(&sps);
        for y in 0..32 {
            for x in 0..32 {
                refpic.luma.set(x, y, 100);
            }
        }
        for y in 0..16 {
            for x in 0..16 {
                refpic.cb.set(x, y, 90);
                refpic.cr.set(x, y, 110);
            }
        }
        refpic.expand_borders();

        let mut builder = MbBuilder::new(0, 0, 0);
        builder.mb.mb_type = MbType::PSkip;
        builder.mb.qp = 26;
        builder.set_partition(0, 0, 4, 4, 0, (0, 0));
        let residuals = MbResiduals::zeroed();

        reconstruct_macroblock(&mut pic, &arena, &builder, &residuals, &pps, &[&refpic]).unwrap();

        for y in 0..16 {
            for x in 0..16 {
                assert_eq!(pic.luma.get(x, y), 100);
            }
        }
        for y in 0..8 {
            for x in 0..8 {
                assert_eq!(pic.cb.get(x, y), 90);
                assert_eq!(pic.cr.get(x, y), 110);
            }
        }
    }

    #[test]
    fn test_帧间_整数运动矢量() {
        let sps = small_sps();
        let pps = test_pps();
        let mut pic = Picture::new(&sps);
        let arena = MacroblockArena::new(2, 2);

        let mut refpic = Picture::new(&sps);
        for y in 0..32 {
            for x in 0..32 {
                refpic.luma.set(x, y, (x as i32 * 3 % 200) as u8);
            }
        }
        refpic.expand_borders();

        let mut builder = MbBuilder::new(0, 0, 0);
        builder.mb.mb_type = MbType::P16x16;
        builder.mb.qp = 26;
        // mv = (+4, 0) 即整像素右移 1
        builder.set_partition(0, 0, 4, 4, 0, (4, 0));
        let residuals = MbResiduals::zeroed();

        reconstruct_macroblock(&mut pic, &arena, &builder, &residuals, &pps, &[&refpic]).unwrap();

        for y in 0..16 {
            for x in 0..16 {
                assert_eq!(pic.luma.get(x, y), refpic.luma.get(x + 1, y));
            }
        }
    }

    #[test]
    fn test_帧间_参考索引越界报错() {
        let sps = small_sps();
        let pps = test_pps();
        let mut pic = Picture::new(&sps);
        let arena = MacroblockArena::new(2, 2);

        let mut builder = MbBuilder::new(0, 0, 0);
        builder.mb.mb_type = MbType::P16x16;
        builder.mb.qp = 26;
        builder.set_partition(0, 0, 4, 4, 1, (0, 0));
        let residuals = MbResiduals::zeroed();

        let refpic = Picture::new(&sps);
        let err =
            reconstruct_macroblock(&mut pic, &arena, &builder, &residuals, &pps, &[&refpic])
                .unwrap_err();
        assert!(matches!(err, YingError::InvalidData(_)));
    }

    #[test]
    fn test_p8x8划分列表() {
        let mut mb = MbBuilder::new(0, 0, 0).freeze();
        mb.mb_type = MbType::P8x8;
        mb.sub_types = [
            SubMbType::L0_8x8,
            SubMbType::L0_8x4,
            SubMbType::L0_4x8,
            SubMbType::L0_4x4,
        ];
        let parts = partitions(&mb);
        assert_eq!(parts.len(), 1 + 2 + 2 + 4);
        assert_eq!(parts[0], (0, 0, 2, 2));
        assert_eq!(parts[1], (2, 0, 2, 1));
        assert_eq!(parts[2], (2, 1, 2, 1));
        assert_eq!(parts[3], (0, 2, 1, 2));
        assert_eq!(parts[4], (1, 2, 1, 2));
        assert_eq!(parts[8], (3, 3, 1, 1));
    }
}
