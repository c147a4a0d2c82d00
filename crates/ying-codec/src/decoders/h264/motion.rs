//! 运动补偿.
//!
//! 亮度 1/4 像素插值: 半像素位置用 6 抽头滤波 (1,-5,20,20,-5,1),
//! 1/4 像素位置由整像素/半像素样本平均得到. 色度 1/8 像素双线性插值.
//! 参考帧平面已做边界扩展, 越界运动矢量读取填充带.

use super::common::clip_u8;
use super::picture::Plane;

#[inline]
fn tap6(a: i32, b: i32, c: i32, d: i32, e: i32, f: i32) -> i32 {
    a - 5 * b + 20 * c + 20 * d - 5 * e + f
}

/// 水平半像素样本 (整像素列间)
#[inline]
fn hpel_h(p: &Plane, x: i32, y: i32) -> u8 {
    let v = tap6(
        i32::from(p.get(x - 2, y)),
        i32::from(p.get(x - 1, y)),
        i32::from(p.get(x, y)),
        i32::from(p.get(x + 1, y)),
        i32::from(p.get(x + 2, y)),
        i32::from(p.get(x + 3, y)),
    );
    clip_u8((v + 16) >> 5)
}

/// 垂直半像素样本
#[inline]
fn hpel_v(p: &Plane, x: i32, y: i32) -> u8 {
    let v = tap6(
        i32::from(p.get(x, y - 2)),
        i32::from(p.get(x, y - 1)),
        i32::from(p.get(x, y)),
        i32::from(p.get(x, y + 1)),
        i32::from(p.get(x, y + 2)),
        i32::from(p.get(x, y + 3)),
    );
    clip_u8((v + 16) >> 5)
}

/// 中心半像素样本: 先水平滤波 (不移位) 再垂直滤波
#[inline]
fn hpel_c(p: &Plane, x: i32, y: i32) -> u8 {
    let mut tmp = [0i32; 6];
    for (i, t) in tmp.iter_mut().enumerate() {
        let yy = y - 2 + i as i32;
        *t = tap6(
            i32::from(p.get(x - 2, yy)),
            i32::from(p.get(x - 1, yy)),
            i32::from(p.get(x, yy)),
            i32::from(p.get(x + 1, yy)),
            i32::from(p.get(x + 2, yy)),
            i32::from(p.get(x + 3, yy)),
        );
    }
    let v = tap6(tmp[0], tmp[1], tmp[2], tmp[3], tmp[4], tmp[5]);
    clip_u8((v + 512) >> 10)
}

#[inline]
fn avg(a: u8, b: u8) -> u8 {
    ((u16::from(a) + u16::from(b) + 1) >> 1) as u8
}

/// 亮度块运动补偿.
///
/// 从参考平面 `(x0 + mvx/4, y0 + mvy/4)` 处取 `w x h` 块写入目标平面
/// `(x0, y0)`. `mv` 单位为 1/4 像素.
pub fn mc_luma(refp: &Plane, dst: &mut Plane, x0: i32, y0: i32, w: i32, h: i32, mv: (i32, i32)) {
    let ix = x0 + (mv.0 >> 2);
    let iy = y0 + (mv.1 >> 2);
    let fx = mv.0 & 3;
    let fy = mv.1 & 3;

    for y in 0..h {
        for x in 0..w {
            let sx = ix + x;
            let sy = iy + y;
            let v = match (fx, fy) {
                (0, 0) => refp.get(sx, sy),
                (2, 0) => hpel_h(refp, sx, sy),
                (0, 2) => hpel_v(refp, sx, sy),
                (2, 2) => hpel_c(refp, sx, sy),
                (1, 0) => avg(refp.get(sx, sy), hpel_h(refp, sx, sy)),
                (3, 0) => avg(refp.get(sx + 1, sy), hpel_h(refp, sx, sy)),
                (0, 1) => avg(refp.get(sx, sy), hpel_v(refp, sx, sy)),
                (0, 3) => avg(refp.get(sx, sy + 1), hpel_v(refp, sx, sy)),
                (1, 1) => avg(hpel_v(refp, sx, sy), hpel_h(refp, sx, sy)),
                (3, 1) => avg(hpel_v(refp, sx + 1, sy), hpel_h(refp, sx, sy)),
                (2, 1) => avg(hpel_c(refp, sx, sy), hpel_h(refp, sx, sy)),
                (1, 2) => avg(hpel_c(refp, sx, sy), hpel_v(refp, sx, sy)),
                (3, 2) => avg(hpel_c(refp, sx, sy), hpel_v(refp, sx + 1, sy)),
                (1, 3) => avg(hpel_v(refp, sx, sy), hpel_h(refp, sx, sy + 1)),
                (2, 3) => avg(hpel_c(refp, sx, sy), hpel_h(refp, sx, sy + 1)),
                (3, 3) => avg(hpel_v(refp, sx + 1, sy), hpel_h(refp, sx, sy + 1)),
                _ => unreachable!(),
            };
            dst.set(x0 + x, y0 + y, v);
        }
    }
}

/// 色度块运动补偿 (双线性).
///
/// `mv` 沿用亮度 1/4 像素矢量, 在半分辨率色度平面上即为 1/8 像素.
pub fn mc_chroma(refp: &Plane, dst: &mut Plane, x0: i32, y0: i32, w: i32, h: i32, mv: (i32, i32)) {
    let ix = x0 + (mv.0 >> 3);
    let iy = y0 + (mv.1 >> 3);
    let dx = mv.0 & 7;
    let dy = mv.1 & 7;

    let ca = (8 - dx) * (8 - dy);
    let cb = dx * (8 - dy);
    let cc = (8 - dx) * dy;
    let cd = dx * dy;

    for y in 0..h {
        for x in 0..w {
            let sx = ix + x;
            let sy = iy + y;
            let v = (ca * i32::from(refp.get(sx, sy))
                + cb * i32::from(refp.get(sx + 1, sy))
                + cc * i32::from(refp.get(sx, sy + 1))
                + cd * i32::from(refp.get(sx + 1, sy + 1))
                + 32)
                >> 6;
            dst.set(x0 + x, y0 + y, v as u8);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_plane() -> Plane {
        let mut p = Plane::new(32, 32, 32);
        for y in 0..32 {
            for x in 0..32 {
                p.set(x, y, (x * 4 + y) as u8);
            }
        }
        p.expand_border();
        p
    }

    #[test]
    fn test_整像素拷贝() {
        let refp = gradient_plane();
        let mut dst = Plane::new(32, 32, 32);
        // mv = (+4, +8) 1/4 像素 = (+1, +2) 整像素
        mc_luma(&refp, &mut dst, 8, 8, 4, 4, (4, 8));
        for y in 0..4 {
            for x in 0..4 {
                assert_eq!(dst.get(8 + x, 8 + y), refp.get(9 + x, 10 + y));
            }
        }
    }

    #[test]
    fn test_负运动矢量() {
        let refp = gradient_plane();
        let mut dst = Plane::new(32, 32, 32);
        mc_luma(&refp, &mut dst, 8, 8, 4, 4, (-8, -4));
        assert_eq!(dst.get(8, 8), refp.get(6, 7));
    }

    #[test]
    fn test_水平半像素_线性区域() {
        // 水平梯度每列 +4: 6 抽头滤波在线性区域应给出中点值
        let refp = gradient_plane();
        let mut dst = Plane::new(32, 32, 32);
        mc_luma(&refp, &mut dst, 8, 8, 4, 4, (2, 0));
        for y in 0..4 {
            for x in 0..4 {
                let a = i32::from(refp.get(8 + x, 8 + y));
                let b = i32::from(refp.get(9 + x, 8 + y));
                assert_eq!(i32::from(dst.get(8 + x, 8 + y)), (a + b) / 2);
            }
        }
    }

    #[test]
    fn test_四分之一像素_平坦区域() {
        let mut refp = Plane::new(32, 32, 32);
        for y in 0..32 {
            for x in 0..32 {
                refp.set(x, y, 77);
            }
        }
        refp.expand_border();

        let mut dst = Plane::new(32, 32, 32);
        for fy in 0..4 {
            for fx in 0..4 {
                mc_luma(&refp, &mut dst, 8, 8, 4, 4, (fx, fy));
                assert_eq!(dst.get(8, 8), 77, "fx={}, fy={}", fx, fy);
            }
        }
    }

    #[test]
    fn test_色度双线性() {
        let mut refp = Plane::new(16, 16, 16);
        for y in 0..16 {
            for x in 0..16 {
                refp.set(x, y, (x * 16) as u8);
            }
        }
        refp.expand_border();

        let mut dst = Plane::new(16, 16, 16);
        // dx = 4 → 水平中点: (4*16*A + 4*16*B... ) 实为 (A+B)/2
        mc_chroma(&refp, &mut dst, 4, 4, 2, 2, (4, 0));
        let a = i32::from(refp.get(4, 4));
        let b = i32::from(refp.get(5, 4));
        assert_eq!(i32::from(dst.get(4, 4)), (a + b + 1) / 2);

        // 整像素色度位移: mv=(16, 8) → (+2, +1)
        mc_chroma(&refp, &mut dst, 4, 4, 2, 2, (16, 8));
        assert_eq!(dst.get(4, 4), refp.get(6, 5));
    }

    #[test]
    fn test_越界参考读取填充带() {
        let refp = gradient_plane();
        let mut dst = Plane::new(32, 32, 32);
        // 大幅负矢量, 完全落在填充带
        mc_luma(&refp, &mut dst, 0, 0, 4, 4, (-64, -64));
        assert_eq!(dst.get(0, 0), refp.get(0, 0), "填充带应复制边缘像素");
    }
}
