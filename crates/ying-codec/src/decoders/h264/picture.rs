//! 解码图像缓冲 (带填充边界的平面存储).
//!
//! 每个平面四周预留填充带, 运动补偿允许参考帧读取越过图像边缘;
//! 图像解码完成后调用 [`Picture::expand_borders`] 将边缘像素复制进填充带.

use ying_core::PixelFormat;

use super::parameter_sets::Sps;
use crate::frame::{PictureType, VideoFrame};

/// 亮度平面填充宽度 (像素). 6 抽头半像素插值最多越界读 3 像素,
/// 加整像素运动矢量越界, 16 足够覆盖一个宏块的越界参考.
pub const LUMA_PAD: usize = 32;
/// 色度平面填充宽度
pub const CHROMA_PAD: usize = 16;

/// 单个 8 位采样平面
#[derive(Debug, Clone)]
pub struct Plane {
    data: Vec<u8>,
    width: usize,
    height: usize,
    stride: usize,
    pad: usize,
}

impl Plane {
    pub fn new(width: usize, height: usize, pad: usize) -> Self {
        let stride = width + 2 * pad;
        Self {
            data: vec![128; stride * (height + 2 * pad)],
            width,
            height,
            stride,
            pad,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    fn index(&self, x: i32, y: i32) -> usize {
        // 裁剪到含填充带的合法范围, 边界外读取退化为最近填充像素
        let min = -(self.pad as i32);
        let x = x.clamp(min, (self.width + self.pad) as i32 - 1);
        let y = y.clamp(min, (self.height + self.pad) as i32 - 1);
        (y + self.pad as i32) as usize * self.stride + (x + self.pad as i32) as usize
    }

    /// 读采样 (允许越界, 越界坐标读取填充带)
    #[inline]
    pub fn get(&self, x: i32, y: i32) -> u8 {
        self.data[self.index(x, y)]
    }

    /// 写采样 (仅图像内部坐标)
    #[inline]
    pub fn set(&mut self, x: i32, y: i32, v: u8) {
        debug_assert!(x >= 0 && (x as usize) < self.width);
        debug_assert!(y >= 0 && (y as usize) < self.height);
        let idx = self.index(x, y);
        self.data[idx] = v;
    }

    /// 将边缘像素复制进填充带
    pub fn expand_border(&mut self) {
        let w = self.width as i32;
        let h = self.height as i32;
        let pad = self.pad as i32;

        // 左右
        for y in 0..h {
            let left = self.get(0, y);
            let right = self.get(w - 1, y);
            for x in 1..=pad {
                let il = self.index(-x, y);
                self.data[il] = left;
                let ir = self.index(w - 1 + x, y);
                self.data[ir] = right;
            }
        }
        // 上下 (包含四角, 整行复制)
        for x in -pad..w + pad {
            let top = self.get(x, 0);
            let bottom = self.get(x, h - 1);
            for y in 1..=pad {
                let it = self.index(x, -y);
                self.data[it] = top;
                let ib = self.index(x, h - 1 + y);
                self.data[ib] = bottom;
            }
        }
    }

    /// 拷贝一行图像内部数据 (裁剪输出用)
    fn copy_row(&self, x0: usize, y: usize, out: &mut [u8]) {
        let base = (y + self.pad) * self.stride + self.pad + x0;
        out.copy_from_slice(&self.data[base..base + out.len()]);
    }
}

/// 一帧解码图像 (YUV 4:2:0)
#[derive(Debug, Clone)]
pub struct Picture {
    pub luma: Plane,
    pub cb: Plane,
    pub cr: Plane,
    pub poc: i32,
    pub frame_num: u32,
    pub is_idr: bool,
}

impl Picture {
    pub fn new(sps: &Sps) -> Self {
        let w = sps.width() as usize;
        let h = sps.height() as usize;
        Self {
            luma: Plane::new(w, h, LUMA_PAD),
            cb: Plane::new(w / 2, h / 2, CHROMA_PAD),
            cr: Plane::new(w / 2, h / 2, CHROMA_PAD),
            poc: 0,
            frame_num: 0,
            is_idr: false,
        }
    }

    /// 解码完成后扩展三个平面的填充带
    pub fn expand_borders(&mut self) {
        self.luma.expand_border();
        self.cb.expand_border();
        self.cr.expand_border();
    }

    /// 导出为输出帧, 应用 SPS 裁剪窗口
    pub fn to_video_frame(&self, sps: &Sps, picture_type: PictureType) -> VideoFrame {
        let out_w = sps.cropped_width() as usize;
        let out_h = sps.cropped_height() as usize;
        let crop_x = 2 * sps.crop.0 as usize;
        let crop_y = 2 * sps.crop.2 as usize;

        let mut frame = VideoFrame::new(out_w as u32, out_h as u32, PixelFormat::Yuv420p);
        frame.poc = self.poc;
        frame.is_keyframe = self.is_idr;
        frame.picture_type = picture_type;

        frame.linesize = vec![out_w, out_w / 2, out_w / 2];
        frame.data[0] = vec![0; out_w * out_h];
        frame.data[1] = vec![0; (out_w / 2) * (out_h / 2)];
        frame.data[2] = vec![0; (out_w / 2) * (out_h / 2)];

        for y in 0..out_h {
            self.luma
                .copy_row(crop_x, crop_y + y, &mut frame.data[0][y * out_w..(y + 1) * out_w]);
        }
        let cw = out_w / 2;
        for y in 0..out_h / 2 {
            self.cb
                .copy_row(crop_x / 2, crop_y / 2 + y, &mut frame.data[1][y * cw..(y + 1) * cw]);
            self.cr
                .copy_row(crop_x / 2, crop_y / 2 + y, &mut frame.data[2][y * cw..(y + 1) * cw]);
        }

        frame
    }
}
