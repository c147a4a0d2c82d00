//! 反扫描, 反量化与反变换.
//!
//! 残差系数按 zig-zag 顺序解码, 反扫描还原为 4x4 矩阵后做反量化,
//! 再经整数反 DCT 叠加到预测像素上. DC 系数 (Intra 16x16 亮度 DC 与
//! 色度 DC) 走独立的 Hadamard 反变换与 DC 专用反量化.

use super::common::clip_u8;
use super::picture::Plane;

/// 4x4 zig-zag 扫描顺序 (x 坐标)
pub const SCAN_ZIGZAG_X: [usize; 16] = [0, 1, 0, 0, 1, 2, 3, 2, 1, 0, 1, 2, 3, 3, 2, 3];
/// 4x4 zig-zag 扫描顺序 (y 坐标)
pub const SCAN_ZIGZAG_Y: [usize; 16] = [0, 0, 1, 2, 1, 0, 0, 1, 2, 3, 3, 2, 1, 2, 3, 3];

/// 反量化缩放基值, 索引 `[qp % 6]`, 三元组按矩阵位置展开
const DEQUANT_SCALE: [[i32; 3]; 6] = [
    [10, 13, 16],
    [11, 14, 18],
    [13, 16, 20],
    [14, 18, 23],
    [16, 20, 25],
    [18, 23, 29],
];

/// 反量化矩阵系数
#[inline]
fn dequant_mf(qp_rem: usize, y: usize, x: usize) -> i32 {
    let s = &DEQUANT_SCALE[qp_rem];
    match (y & 1, x & 1) {
        (0, 0) => s[0],
        (1, 1) => s[2],
        _ => s[1],
    }
}

/// 16 个 zig-zag 系数 → 4x4 矩阵
pub fn unscan_4x4(levels: &[i32; 16]) -> [[i32; 4]; 4] {
    let mut dct = [[0i32; 4]; 4];
    for i in 0..16 {
        dct[SCAN_ZIGZAG_Y[i]][SCAN_ZIGZAG_X[i]] = levels[i];
    }
    dct
}

/// 15 个 AC 系数 → 4x4 矩阵 (DC 位置留零, 由 DC 变换单独填入)
pub fn unscan_4x4_ac(levels: &[i32; 15]) -> [[i32; 4]; 4] {
    let mut dct = [[0i32; 4]; 4];
    for i in 0..15 {
        dct[SCAN_ZIGZAG_Y[i + 1]][SCAN_ZIGZAG_X[i + 1]] = levels[i];
    }
    dct
}

/// 4 个色度 DC 系数 → 2x2 矩阵 (光栅顺序)
pub fn unscan_2x2(levels: &[i32; 4]) -> [[i32; 2]; 2] {
    [[levels[0], levels[1]], [levels[2], levels[3]]]
}

/// 普通 4x4 块反量化
pub fn dequant_4x4(dct: &mut [[i32; 4]; 4], qp: i32) {
    let qbits = qp / 6;
    let qp_rem = (qp % 6) as usize;
    for y in 0..4 {
        for x in 0..4 {
            dct[y][x] = (dct[y][x] * dequant_mf(qp_rem, y, x)) << qbits;
        }
    }
}

/// Intra 16x16 亮度 DC 反量化 (Hadamard 后)
pub fn dequant_4x4_dc(dct: &mut [[i32; 4]; 4], qp: i32) {
    let qbits = qp / 6 - 2;
    let mf = dequant_mf((qp % 6) as usize, 0, 0);
    if qbits >= 0 {
        for row in dct.iter_mut() {
            for v in row.iter_mut() {
                *v = (*v * mf) << qbits;
            }
        }
    } else {
        let f = 1 << (-qbits - 1);
        for row in dct.iter_mut() {
            for v in row.iter_mut() {
                *v = (*v * mf + f) >> -qbits;
            }
        }
    }
}

/// 色度 DC 反量化 (2x2 Hadamard 后)
pub fn dequant_2x2_dc(dct: &mut [[i32; 2]; 2], qp: i32) {
    let qbits = qp / 6 - 1;
    let mf = dequant_mf((qp % 6) as usize, 0, 0);
    if qbits >= 0 {
        for row in dct.iter_mut() {
            for v in row.iter_mut() {
                *v = (*v * mf) << qbits;
            }
        }
    } else {
        for row in dct.iter_mut() {
            for v in row.iter_mut() {
                *v = (*v * mf) >> 1;
            }
        }
    }
}

/// Intra 16x16 亮度 DC 的 4x4 Hadamard 反变换 (无缩放移位)
pub fn idct_4x4_dc(d: &mut [[i32; 4]; 4]) {
    let mut tmp = [[0i32; 4]; 4];

    // 列方向蝶形
    for x in 0..4 {
        let s01 = d[0][x] + d[1][x];
        let d01 = d[0][x] - d[1][x];
        let s23 = d[2][x] + d[3][x];
        let d23 = d[2][x] - d[3][x];
        tmp[0][x] = s01 + s23;
        tmp[1][x] = s01 - s23;
        tmp[2][x] = d01 - d23;
        tmp[3][x] = d01 + d23;
    }
    // 行方向蝶形
    for y in 0..4 {
        let s01 = tmp[y][0] + tmp[y][1];
        let d01 = tmp[y][0] - tmp[y][1];
        let s23 = tmp[y][2] + tmp[y][3];
        let d23 = tmp[y][2] - tmp[y][3];
        d[y][0] = s01 + s23;
        d[y][1] = s01 - s23;
        d[y][2] = d01 - d23;
        d[y][3] = d01 + d23;
    }
}

/// 色度 DC 的 2x2 Hadamard 变换 (自反)
pub fn dct_2x2_dc(d: &mut [[i32; 2]; 2]) {
    let t0 = d[0][0] + d[0][1];
    let t1 = d[0][0] - d[0][1];
    let t2 = d[1][0] + d[1][1];
    let t3 = d[1][0] - d[1][1];
    d[0][0] = t0 + t2;
    d[0][1] = t1 + t3;
    d[1][0] = t0 - t2;
    d[1][1] = t1 - t3;
}

/// 4x4 整数反 DCT, 结果叠加到平面 `(x0, y0)` 处的 4x4 区域
pub fn add_idct_4x4(plane: &mut Plane, x0: i32, y0: i32, dct: &[[i32; 4]; 4]) {
    let mut tmp = [[0i32; 4]; 4];

    // 行变换
    for i in 0..4 {
        let d0 = dct[i][0];
        let d1 = dct[i][1];
        let d2 = dct[i][2];
        let d3 = dct[i][3];
        let s02 = d0 + d2;
        let d02 = d0 - d2;
        let s13 = d1 + (d3 >> 1);
        let d13 = (d1 >> 1) - d3;
        tmp[i][0] = s02 + s13;
        tmp[i][1] = d02 + d13;
        tmp[i][2] = d02 - d13;
        tmp[i][3] = s02 - s13;
    }
    // 列变换 + 舍入移位 + 叠加
    for x in 0..4 {
        let d0 = tmp[0][x];
        let d1 = tmp[1][x];
        let d2 = tmp[2][x];
        let d3 = tmp[3][x];
        let s02 = d0 + d2;
        let d02 = d0 - d2;
        let s13 = d1 + (d3 >> 1);
        let d13 = (d1 >> 1) - d3;
        let col = [s02 + s13, d02 + d13, d02 - d13, s02 - s13];
        for (y, v) in col.iter().enumerate() {
            let px = x0 + x as i32;
            let py = y0 + y as i32;
            let sum = i32::from(plane.get(px, py)) + ((v + 32) >> 6);
            plane.set(px, py, clip_u8(sum));
        }
    }
}
