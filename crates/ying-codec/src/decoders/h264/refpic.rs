//! 图像序计数 (POC) 与参考帧管理.
//!
//! 仅支持 poc_type 0 与 2 (类型 1 在切片头部解析时已拒绝).
//! 参考帧按滑动窗口管理: 新参考帧插入队首, 超出 SPS 容量时移除最旧帧,
//! IDR 清空全部参考.

use std::collections::VecDeque;

use ying_core::{YingError, YingResult};

use super::parameter_sets::Sps;
use super::picture::Picture;
use super::slice::SliceHeader;

/// POC 推导状态, 跨图像维护
#[derive(Debug, Default)]
pub struct PocContext {
    msb: i32,
    prev_lsb: i32,
    /// poc_type == 2 的 frame_num 回绕偏移
    frame_num_offset: i32,
    prev_frame_num: u32,
}

impl PocContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// 计算当前图像的 POC, 并推进内部状态
    pub fn compute(&mut self, sps: &Sps, header: &SliceHeader) -> YingResult<i32> {
        if header.is_idr {
            self.reset();
        }

        match sps.poc_type {
            0 => {
                let max = 1i32 << sps.log2_max_poc_lsb;
                let lsb = header.poc_lsb as i32;
                if lsb < self.prev_lsb && self.prev_lsb - lsb >= max / 2 {
                    self.msb += max;
                } else if lsb > self.prev_lsb && lsb - self.prev_lsb > max / 2 {
                    self.msb -= max;
                }
                self.prev_lsb = lsb;
                Ok(self.msb + lsb)
            }
            2 => {
                let frame_num = header.frame_num;
                if !header.is_idr && frame_num < self.prev_frame_num {
                    self.frame_num_offset += 1i32 << sps.log2_max_frame_num;
                }
                self.prev_frame_num = frame_num;
                let poc = 2 * (self.frame_num_offset + frame_num as i32)
                    - i32::from(header.nal_ref_idc == 0);
                Ok(poc)
            }
            other => Err(YingError::Unsupported(format!(
                "H264: pic_order_cnt_type 暂不支持, type={}",
                other
            ))),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 短期参考帧滑动窗口
#[derive(Debug, Default)]
pub struct ReferenceQueue {
    pictures: VecDeque<Picture>,
}

impl ReferenceQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pictures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pictures.is_empty()
    }

    pub fn clear(&mut self) {
        self.pictures.clear();
    }

    /// 插入新参考帧, 超出容量时移除最旧的一帧
    pub fn push(&mut self, picture: Picture, sps: &Sps) {
        self.pictures.push_front(picture);
        let cap = (sps.num_ref_frames as usize).max(1);
        while self.pictures.len() > cap {
            self.pictures.pop_back();
        }
    }

    /// 构建 list0: POC 小于当前图像的参考帧, 按 POC 降序,
    /// 截断到切片头部的激活数
    pub fn build_list0(&self, cur_poc: i32, num_active: usize) -> Vec<&Picture> {
        let mut list: Vec<&Picture> = self
            .pictures
            .iter()
            .filter(|p| p.poc < cur_poc)
            .collect();
        list.sort_by(|a, b| b.poc.cmp(&a.poc));
        list.truncate(num_active.max(1));
        list
    }

    /// 构建 list1: POC 大于当前图像的参考帧, 按 POC 升序
    pub fn build_list1(&self, cur_poc: i32, num_active: usize) -> Vec<&Picture> {
        let mut list: Vec<&Picture> = self
            .pictures
            .iter()
            .filter(|p| p.poc > cur_poc)
            .collect();
        list.sort_by(|a, b| a.poc.cmp(&b.poc));
        list.truncate(num_active.max(1));
        list
    }
}
