//! 帧内预测.
//!
//! 预测直接写入图像平面, 邻接像素从平面上方/左方读取 (调用方负责
//! 可用性判定, 不可用组合先经 resolve_* 降级为 DC 变体).

use log::warn;
use ying_core::{YingError, YingResult};

use super::common::clip_u8;
use super::picture::Plane;

// ============================================================
// 预测模式编号
// ============================================================

/// 亮度 16x16 预测模式
pub mod mode16 {
    pub const V: u8 = 0;
    pub const H: u8 = 1;
    pub const DC: u8 = 2;
    pub const PLANE: u8 = 3;
    pub const DC_LEFT: u8 = 4;
    pub const DC_TOP: u8 = 5;
    pub const DC_128: u8 = 6;
}

/// 色度 8x8 预测模式
pub mod mode_chroma {
    pub const DC: u8 = 0;
    pub const H: u8 = 1;
    pub const V: u8 = 2;
    pub const PLANE: u8 = 3;
    pub const DC_LEFT: u8 = 4;
    pub const DC_TOP: u8 = 5;
    pub const DC_128: u8 = 6;
}

/// 亮度 4x4 预测模式
pub mod mode4 {
    pub const V: u8 = 0;
    pub const H: u8 = 1;
    pub const DC: u8 = 2;
    pub const DDL: u8 = 3;
    pub const DDR: u8 = 4;
    pub const VR: u8 = 5;
    pub const HD: u8 = 6;
    pub const VL: u8 = 7;
    pub const HU: u8 = 8;
    pub const DC_LEFT: u8 = 9;
    pub const DC_TOP: u8 = 10;
    pub const DC_128: u8 = 11;
}

// ============================================================
// 模式可用性降级
// ============================================================

/// 按邻块可用性修正 16x16 模式
pub fn resolve_mode_16x16(mode: u8, left: bool, top: bool) -> u8 {
    if left && top {
        mode
    } else if left {
        match mode {
            mode16::DC => mode16::DC_LEFT,
            mode16::H => mode16::H,
            _ => {
                warn!("H264: 16x16 预测模式 {} 缺少上邻块, 降级为 DC_LEFT", mode);
                mode16::DC_LEFT
            }
        }
    } else if top {
        match mode {
            mode16::DC => mode16::DC_TOP,
            mode16::V => mode16::V,
            _ => {
                warn!("H264: 16x16 预测模式 {} 缺少左邻块, 降级为 DC_TOP", mode);
                mode16::DC_TOP
            }
        }
    } else {
        mode16::DC_128
    }
}

/// 按邻块可用性修正色度 8x8 模式
pub fn resolve_mode_chroma(mode: u8, left: bool, top: bool) -> u8 {
    if left && top {
        mode
    } else if left {
        match mode {
            mode_chroma::DC => mode_chroma::DC_LEFT,
            mode_chroma::H => mode_chroma::H,
            _ => {
                warn!("H264: 色度预测模式 {} 缺少上邻块, 降级为 DC_LEFT", mode);
                mode_chroma::DC_LEFT
            }
        }
    } else if top {
        match mode {
            mode_chroma::DC => mode_chroma::DC_TOP,
            mode_chroma::V => mode_chroma::V,
            _ => {
                warn!("H264: 色度预测模式 {} 缺少左邻块, 降级为 DC_TOP", mode);
                mode_chroma::DC_TOP
            }
        }
    } else {
        mode_chroma::DC_128
    }
}

// 4x4 块对宏块级邻块的依赖 (z-scan 块序)
const N_LEFT: u8 = 1;
const N_TOP: u8 = 2;
const N_TOPRIGHT: u8 = 4;
/// 右上邻接采样属于尚未解码的本宏块内部块
const N_BLOCKED: u8 = 8;

const NEEDMB: [u8; 16] = [
    N_LEFT | N_TOP, N_TOP,
    N_LEFT,         N_BLOCKED,
    N_TOP,          N_TOP | N_TOPRIGHT,
    0,              N_BLOCKED,
    N_LEFT,         0,
    N_LEFT,         N_BLOCKED,
    0,              N_BLOCKED,
    0,              N_BLOCKED,
];

/// 按邻块可用性修正 4x4 模式.
///
/// 返回 (修正后模式, 是否需要右上采样仿真). 仿真 = 右上不可用但正上
/// 可用时, 以上行最后一个采样复制充当右上 4 个采样.
pub fn resolve_mode_4x4(
    idx: usize,
    mode: u8,
    mb_left: bool,
    mb_top: bool,
    mb_topright: bool,
) -> (u8, bool) {
    let need = NEEDMB[idx];
    let a = need & N_LEFT == 0 || mb_left;
    let b = need & N_TOP == 0 || mb_top;
    let mut c =
        need & N_BLOCKED == 0 && (need & N_TOPRIGHT == 0 || mb_topright);
    let mut emu = false;
    if !c && b {
        emu = true;
        c = true;
    }

    if mode == mode4::DC {
        return (
            match (a, b) {
                (true, true) => mode4::DC,
                (true, false) => mode4::DC_LEFT,
                (false, true) => mode4::DC_TOP,
                (false, false) => mode4::DC_128,
            },
            false,
        );
    }

    if (a && mode == mode4::H) || (b && mode == mode4::V) {
        return (mode, false);
    }

    if c && (mode == mode4::DDL || mode == mode4::VL) {
        return (mode, emu);
    }

    if a && b {
        // DDR / VR / HD / HU
        return (mode, false);
    }

    warn!("H264: 4x4 预测模式 {} 邻块不可用, idx={}, 降级为 DC_128", mode, idx);
    (mode4::DC_128, false)
}

// ============================================================
// 预测执行
// ============================================================

fn fill(plane: &mut Plane, x0: i32, y0: i32, size: i32, v: u8) {
    for y in 0..size {
        for x in 0..size {
            plane.set(x0 + x, y0 + y, v);
        }
    }
}

/// 亮度 16x16 预测, 写入 `(x0, y0)` 起始的 16x16 区域
pub fn predict_16x16(plane: &mut Plane, x0: i32, y0: i32, mode: u8) -> YingResult<()> {
    match mode {
        mode16::V => {
            for x in 0..16 {
                let v = plane.get(x0 + x, y0 - 1);
                for y in 0..16 {
                    plane.set(x0 + x, y0 + y, v);
                }
            }
        }
        mode16::H => {
            for y in 0..16 {
                let v = plane.get(x0 - 1, y0 + y);
                for x in 0..16 {
                    plane.set(x0 + x, y0 + y, v);
                }
            }
        }
        mode16::DC => {
            let mut dc = 0i32;
            for i in 0..16 {
                dc += i32::from(plane.get(x0 - 1, y0 + i));
                dc += i32::from(plane.get(x0 + i, y0 - 1));
            }
            fill(plane, x0, y0, 16, ((dc + 16) >> 5) as u8);
        }
        mode16::DC_LEFT => {
            let mut dc = 0i32;
            for i in 0..16 {
                dc += i32::from(plane.get(x0 - 1, y0 + i));
            }
            fill(plane, x0, y0, 16, ((dc + 8) >> 4) as u8);
        }
        mode16::DC_TOP => {
            let mut dc = 0i32;
            for i in 0..16 {
                dc += i32::from(plane.get(x0 + i, y0 - 1));
            }
            fill(plane, x0, y0, 16, ((dc + 8) >> 4) as u8);
        }
        mode16::DC_128 => fill(plane, x0, y0, 16, 128),
        mode16::PLANE => {
            let mut h = 0i32;
            let mut v = 0i32;
            for i in 0..8 {
                h += (i + 1)
                    * (i32::from(plane.get(x0 + 8 + i, y0 - 1))
                        - i32::from(plane.get(x0 + 6 - i, y0 - 1)));
                v += (i + 1)
                    * (i32::from(plane.get(x0 - 1, y0 + 8 + i))
                        - i32::from(plane.get(x0 - 1, y0 + 6 - i)));
            }
            let a = 16 * (i32::from(plane.get(x0 - 1, y0 + 15)) + i32::from(plane.get(x0 + 15, y0 - 1)));
            let b = (5 * h + 32) >> 6;
            let c = (5 * v + 32) >> 6;
            let mut i00 = a - 7 * b - 7 * c + 16;
            for y in 0..16 {
                for x in 0..16 {
                    plane.set(x0 + x, y0 + y, clip_u8((i00 + b * x) >> 5));
                }
                i00 += c;
            }
        }
        _ => {
            return Err(YingError::InvalidData(format!(
                "H264: 16x16 预测模式非法, mode={}",
                mode
            )));
        }
    }
    Ok(())
}

/// 色度 8x8 预测 (Cb/Cr 各调用一次)
pub fn predict_chroma_8x8(plane: &mut Plane, x0: i32, y0: i32, mode: u8) -> YingResult<()> {
    match mode {
        mode_chroma::DC => {
            // 四象限 DC: 左上用上+左, 右上只用上, 左下只用左, 右下用上+左
            let (mut s0, mut s1, mut s2, mut s3) = (0i32, 0i32, 0i32, 0i32);
            for i in 0..4 {
                s0 += i32::from(plane.get(x0 + i, y0 - 1));
                s1 += i32::from(plane.get(x0 + 4 + i, y0 - 1));
                s2 += i32::from(plane.get(x0 - 1, y0 + i));
                s3 += i32::from(plane.get(x0 - 1, y0 + 4 + i));
            }
            let dc0 = ((s0 + s2 + 4) >> 3) as u8;
            let dc1 = ((s1 + 2) >> 2) as u8;
            let dc2 = ((s3 + 2) >> 2) as u8;
            let dc3 = ((s1 + s3 + 4) >> 3) as u8;
            for y in 0..4 {
                for x in 0..4 {
                    plane.set(x0 + x, y0 + y, dc0);
                    plane.set(x0 + 4 + x, y0 + y, dc1);
                    plane.set(x0 + x, y0 + 4 + y, dc2);
                    plane.set(x0 + 4 + x, y0 + 4 + y, dc3);
                }
            }
        }
        mode_chroma::DC_LEFT => {
            let (mut s0, mut s1) = (0i32, 0i32);
            for i in 0..4 {
                s0 += i32::from(plane.get(x0 - 1, y0 + i));
                s1 += i32::from(plane.get(x0 - 1, y0 + 4 + i));
            }
            let dc0 = ((s0 + 2) >> 2) as u8;
            let dc1 = ((s1 + 2) >> 2) as u8;
            for y in 0..4 {
                for x in 0..8 {
                    plane.set(x0 + x, y0 + y, dc0);
                    plane.set(x0 + x, y0 + 4 + y, dc1);
                }
            }
        }
        mode_chroma::DC_TOP => {
            let (mut s0, mut s1) = (0i32, 0i32);
            for i in 0..4 {
                s0 += i32::from(plane.get(x0 + i, y0 - 1));
                s1 += i32::from(plane.get(x0 + 4 + i, y0 - 1));
            }
            let dc0 = ((s0 + 2) >> 2) as u8;
            let dc1 = ((s1 + 2) >> 2) as u8;
            for y in 0..8 {
                for x in 0..4 {
                    plane.set(x0 + x, y0 + y, dc0);
                    plane.set(x0 + 4 + x, y0 + y, dc1);
                }
            }
        }
        mode_chroma::DC_128 => fill(plane, x0, y0, 8, 128),
        mode_chroma::H => {
            for y in 0..8 {
                let v = plane.get(x0 - 1, y0 + y);
                for x in 0..8 {
                    plane.set(x0 + x, y0 + y, v);
                }
            }
        }
        mode_chroma::V => {
            for x in 0..8 {
                let v = plane.get(x0 + x, y0 - 1);
                for y in 0..8 {
                    plane.set(x0 + x, y0 + y, v);
                }
            }
        }
        mode_chroma::PLANE => {
            let mut h = 0i32;
            let mut v = 0i32;
            for i in 0..4 {
                h += (i + 1)
                    * (i32::from(plane.get(x0 + 4 + i, y0 - 1))
                        - i32::from(plane.get(x0 + 2 - i, y0 - 1)));
                v += (i + 1)
                    * (i32::from(plane.get(x0 - 1, y0 + 4 + i))
                        - i32::from(plane.get(x0 - 1, y0 + 2 - i)));
            }
            let a = 16 * (i32::from(plane.get(x0 - 1, y0 + 7)) + i32::from(plane.get(x0 + 7, y0 - 1)));
            let b = (17 * h + 16) >> 5;
            let c = (17 * v + 16) >> 5;
            let mut i00 = a - 3 * b - 3 * c + 16;
            for y in 0..8 {
                for x in 0..8 {
                    plane.set(x0 + x, y0 + y, clip_u8((i00 + b * x) >> 5));
                }
                i00 += c;
            }
        }
        _ => {
            return Err(YingError::InvalidData(format!(
                "H264: 色度预测模式非法, mode={}",
                mode
            )));
        }
    }
    Ok(())
}

/// 亮度 4x4 预测.
///
/// `emu` 为 true 时右上 4 个采样以上行最后一个采样替代
/// (右上邻块不可用但正上可用).
pub fn predict_4x4(plane: &mut Plane, x0: i32, y0: i32, mode: u8, emu: bool) -> YingResult<()> {
    // 邻接采样
    let l = [
        i32::from(plane.get(x0 - 1, y0)),
        i32::from(plane.get(x0 - 1, y0 + 1)),
        i32::from(plane.get(x0 - 1, y0 + 2)),
        i32::from(plane.get(x0 - 1, y0 + 3)),
    ];
    let lt = i32::from(plane.get(x0 - 1, y0 - 1));
    let mut t = [0i32; 8];
    for (i, v) in t.iter_mut().enumerate() {
        *v = i32::from(plane.get(x0 + i as i32, y0 - 1));
    }
    if emu {
        let t3 = t[3];
        t[4] = t3;
        t[5] = t3;
        t[6] = t3;
        t[7] = t3;
    }

    let mut out = [[0u8; 4]; 4];
    let mut set = |o: &mut [[u8; 4]; 4], y: usize, x: usize, v: i32| {
        o[y][x] = v as u8;
    };

    match mode {
        mode4::V => {
            for y in 0..4 {
                for x in 0..4 {
                    set(&mut out, y, x, t[x]);
                }
            }
        }
        mode4::H => {
            for y in 0..4 {
                for x in 0..4 {
                    set(&mut out, y, x, l[y]);
                }
            }
        }
        mode4::DC | mode4::DC_LEFT | mode4::DC_TOP | mode4::DC_128 => {
            let dc = match mode {
                mode4::DC => (l[0] + l[1] + l[2] + l[3] + t[0] + t[1] + t[2] + t[3] + 4) >> 3,
                mode4::DC_LEFT => (l[0] + l[1] + l[2] + l[3] + 2) >> 2,
                mode4::DC_TOP => (t[0] + t[1] + t[2] + t[3] + 2) >> 2,
                _ => 128,
            };
            for y in 0..4 {
                for x in 0..4 {
                    set(&mut out, y, x, dc);
                }
            }
        }
        mode4::DDL => {
            set(&mut out, 0, 0, (t[0] + 2 * t[1] + t[2] + 2) >> 2);
            let v = (t[1] + 2 * t[2] + t[3] + 2) >> 2;
            set(&mut out, 0, 1, v);
            set(&mut out, 1, 0, v);
            let v = (t[2] + 2 * t[3] + t[4] + 2) >> 2;
            set(&mut out, 0, 2, v);
            set(&mut out, 1, 1, v);
            set(&mut out, 2, 0, v);
            let v = (t[3] + 2 * t[4] + t[5] + 2) >> 2;
            set(&mut out, 0, 3, v);
            set(&mut out, 1, 2, v);
            set(&mut out, 2, 1, v);
            set(&mut out, 3, 0, v);
            let v = (t[4] + 2 * t[5] + t[6] + 2) >> 2;
            set(&mut out, 1, 3, v);
            set(&mut out, 2, 2, v);
            set(&mut out, 3, 1, v);
            let v = (t[5] + 2 * t[6] + t[7] + 2) >> 2;
            set(&mut out, 2, 3, v);
            set(&mut out, 3, 2, v);
            set(&mut out, 3, 3, (t[6] + 3 * t[7] + 2) >> 2);
        }
        mode4::DDR => {
            let v = (t[0] + 2 * lt + l[0] + 2) >> 2;
            for i in 0..4 {
                set(&mut out, i, i, v);
            }
            let v = (lt + 2 * t[0] + t[1] + 2) >> 2;
            set(&mut out, 0, 1, v);
            set(&mut out, 1, 2, v);
            set(&mut out, 2, 3, v);
            let v = (t[0] + 2 * t[1] + t[2] + 2) >> 2;
            set(&mut out, 0, 2, v);
            set(&mut out, 1, 3, v);
            set(&mut out, 0, 3, (t[1] + 2 * t[2] + t[3] + 2) >> 2);
            let v = (lt + 2 * l[0] + l[1] + 2) >> 2;
            set(&mut out, 1, 0, v);
            set(&mut out, 2, 1, v);
            set(&mut out, 3, 2, v);
            let v = (l[0] + 2 * l[1] + l[2] + 2) >> 2;
            set(&mut out, 2, 0, v);
            set(&mut out, 3, 1, v);
            set(&mut out, 3, 0, (l[1] + 2 * l[2] + l[3] + 2) >> 2);
        }
        mode4::VR => {
            let v = (lt + t[0] + 1) >> 1;
            set(&mut out, 0, 0, v);
            set(&mut out, 2, 1, v);
            let v = (t[0] + t[1] + 1) >> 1;
            set(&mut out, 0, 1, v);
            set(&mut out, 2, 2, v);
            let v = (t[1] + t[2] + 1) >> 1;
            set(&mut out, 0, 2, v);
            set(&mut out, 2, 3, v);
            set(&mut out, 0, 3, (t[2] + t[3] + 1) >> 1);
            let v = (l[0] + 2 * lt + t[0] + 2) >> 2;
            set(&mut out, 1, 0, v);
            set(&mut out, 3, 1, v);
            let v = (lt + 2 * t[0] + t[1] + 2) >> 2;
            set(&mut out, 1, 1, v);
            set(&mut out, 3, 2, v);
            let v = (t[0] + 2 * t[1] + t[2] + 2) >> 2;
            set(&mut out, 1, 2, v);
            set(&mut out, 3, 3, v);
            set(&mut out, 1, 3, (t[1] + 2 * t[2] + t[3] + 2) >> 2);
            set(&mut out, 2, 0, (lt + 2 * l[0] + l[1] + 2) >> 2);
            set(&mut out, 3, 0, (l[0] + 2 * l[1] + l[2] + 2) >> 2);
        }
        mode4::HD => {
            let v = (lt + l[0] + 1) >> 1;
            set(&mut out, 0, 0, v);
            set(&mut out, 1, 2, v);
            let v = (l[0] + 2 * lt + t[0] + 2) >> 2;
            set(&mut out, 0, 1, v);
            set(&mut out, 1, 3, v);
            set(&mut out, 0, 2, (lt + 2 * t[0] + t[1] + 2) >> 2);
            set(&mut out, 0, 3, (t[0] + 2 * t[1] + t[2] + 2) >> 2);
            let v = (l[0] + l[1] + 1) >> 1;
            set(&mut out, 1, 0, v);
            set(&mut out, 2, 2, v);
            let v = (lt + 2 * l[0] + l[1] + 2) >> 2;
            set(&mut out, 1, 1, v);
            set(&mut out, 2, 3, v);
            let v = (l[1] + l[2] + 1) >> 1;
            set(&mut out, 2, 0, v);
            set(&mut out, 3, 2, v);
            let v = (l[0] + 2 * l[1] + l[2] + 2) >> 2;
            set(&mut out, 2, 1, v);
            set(&mut out, 3, 3, v);
            set(&mut out, 3, 0, (l[2] + l[3] + 1) >> 1);
            set(&mut out, 3, 1, (l[1] + 2 * l[2] + l[3] + 2) >> 2);
        }
        mode4::VL => {
            set(&mut out, 0, 0, (t[0] + t[1] + 1) >> 1);
            let v = (t[1] + t[2] + 1) >> 1;
            set(&mut out, 0, 1, v);
            set(&mut out, 2, 0, v);
            let v = (t[2] + t[3] + 1) >> 1;
            set(&mut out, 0, 2, v);
            set(&mut out, 2, 1, v);
            let v = (t[3] + t[4] + 1) >> 1;
            set(&mut out, 0, 3, v);
            set(&mut out, 2, 2, v);
            set(&mut out, 2, 3, (t[4] + t[5] + 1) >> 1);
            set(&mut out, 1, 0, (t[0] + 2 * t[1] + t[2] + 2) >> 2);
            let v = (t[1] + 2 * t[2] + t[3] + 2) >> 2;
            set(&mut out, 1, 1, v);
            set(&mut out, 3, 0, v);
            let v = (t[2] + 2 * t[3] + t[4] + 2) >> 2;
            set(&mut out, 1, 2, v);
            set(&mut out, 3, 1, v);
            let v = (t[3] + 2 * t[4] + t[5] + 2) >> 2;
            set(&mut out, 1, 3, v);
            set(&mut out, 3, 2, v);
            set(&mut out, 3, 3, (t[4] + 2 * t[5] + t[6] + 2) >> 2);
        }
        mode4::HU => {
            set(&mut out, 0, 0, (l[0] + l[1] + 1) >> 1);
            set(&mut out, 0, 1, (l[0] + 2 * l[1] + l[2] + 2) >> 2);
            let v = (l[1] + l[2] + 1) >> 1;
            set(&mut out, 0, 2, v);
            set(&mut out, 1, 0, v);
            let v = (l[1] + 2 * l[2] + l[3] + 2) >> 2;
            set(&mut out, 0, 3, v);
            set(&mut out, 1, 1, v);
            let v = (l[2] + l[3] + 1) >> 1;
            set(&mut out, 1, 2, v);
            set(&mut out, 2, 0, v);
            let v = (l[2] + 3 * l[3] + 2) >> 2;
            set(&mut out, 1, 3, v);
            set(&mut out, 2, 1, v);
            let v = l[3];
            set(&mut out, 2, 2, v);
            set(&mut out, 2, 3, v);
            set(&mut out, 3, 0, v);
            set(&mut out, 3, 1, v);
            set(&mut out, 3, 2, v);
            set(&mut out, 3, 3, v);
        }
        _ => {
            return Err(YingError::InvalidData(format!(
                "H264: 4x4 预测模式非法, mode={}",
                mode
            )));
        }
    }

    for y in 0..4 {
        for x in 0..4 {
            plane.set(x0 + x as i32, y0 + y as i32, out[y][x]);
        }
    }
    Ok(())
}
