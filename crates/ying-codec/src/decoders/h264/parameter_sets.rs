//! SPS / PPS (序列参数集 / 图像参数集) 解析.
//!
//! 输入为去除 NAL 头部与 emulation prevention 字节后的 RBSP 数据.

use ying_core::{BitReader, YingError, YingResult};

/// 序列参数集 (Sequence Parameter Set)
#[derive(Debug, Clone)]
pub struct Sps {
    pub profile_idc: u8,
    pub level_idc: u8,
    pub sps_id: u32,
    /// log2_max_frame_num_minus4 + 4
    pub log2_max_frame_num: u32,
    /// 图像序号 (POC) 计数方式, 0/1/2
    pub poc_type: u32,
    /// log2_max_pic_order_cnt_lsb_minus4 + 4 (仅 poc_type == 0)
    pub log2_max_poc_lsb: u32,
    /// delta_pic_order_always_zero_flag (仅 poc_type == 1)
    pub delta_pic_order_always_zero: bool,
    pub num_ref_frames: u32,
    pub gaps_in_frame_num_allowed: bool,
    /// 宏块单位宽度 (pic_width_in_mbs_minus1 + 1)
    pub mb_width: u32,
    /// 宏块单位高度 (pic_height_in_map_units_minus1 + 1)
    pub mb_height: u32,
    pub frame_mbs_only: bool,
    pub mb_adaptive_frame_field: bool,
    pub direct_8x8_inference: bool,
    /// 裁剪量, 单位为采样对 (左, 右, 上, 下)
    pub crop: (u32, u32, u32, u32),
}

impl Sps {
    /// 解码宽度 (像素, 未裁剪)
    pub fn width(&self) -> u32 {
        self.mb_width * 16
    }

    /// 解码高度 (像素, 未裁剪)
    pub fn height(&self) -> u32 {
        self.mb_height * 16
    }

    /// 输出宽度 (像素, 应用裁剪后)
    ///
    /// 4:2:0 帧编码时裁剪单位为 2 像素.
    pub fn cropped_width(&self) -> u32 {
        self.width().saturating_sub(2 * (self.crop.0 + self.crop.1))
    }

    /// 输出高度 (像素, 应用裁剪后)
    pub fn cropped_height(&self) -> u32 {
        self.height().saturating_sub(2 * (self.crop.2 + self.crop.3))
    }

    /// 图像总宏块数
    pub fn mb_count(&self) -> u32 {
        self.mb_width * self.mb_height
    }

    /// 从 RBSP 数据解析 SPS
    pub fn parse(rbsp: &[u8]) -> YingResult<Self> {
        let mut br = BitReader::new(rbsp);

        let profile_idc = br.read_bits(8)? as u8;
        // constraint_set0..2_flag + reserved_zero_5bits
        let _constraint = br.read_bits(8)?;
        let level_idc = br.read_bits(8)? as u8;

        let sps_id = br.read_ue()?;
        if sps_id >= 32 {
            return Err(YingError::InvalidData(format!(
                "H264: sps_id 越界, value={}",
                sps_id
            )));
        }

        let log2_max_frame_num = br.read_ue()? + 4;
        if log2_max_frame_num > 16 {
            return Err(YingError::InvalidData(format!(
                "H264: log2_max_frame_num 越界, value={}",
                log2_max_frame_num
            )));
        }

        let poc_type = br.read_ue()?;
        let mut log2_max_poc_lsb = 0;
        let mut delta_pic_order_always_zero = false;
        match poc_type {
            0 => {
                log2_max_poc_lsb = br.read_ue()? + 4;
                if log2_max_poc_lsb > 16 {
                    return Err(YingError::InvalidData(format!(
                        "H264: log2_max_poc_lsb 越界, value={}",
                        log2_max_poc_lsb
                    )));
                }
            }
            1 => {
                // poc_type 1 的语法需完整读取以保持对齐, 解码阶段再拒绝
                delta_pic_order_always_zero = br.read_bit()? == 1;
                let _offset_for_non_ref_pic = br.read_se()?;
                let _offset_for_top_to_bottom = br.read_se()?;
                let cycle_len = br.read_ue()?;
                if cycle_len > 256 {
                    return Err(YingError::InvalidData(format!(
                        "H264: num_ref_frames_in_pic_order_cnt_cycle 越界, value={}",
                        cycle_len
                    )));
                }
                for _ in 0..cycle_len {
                    let _offset_for_ref_frame = br.read_se()?;
                }
            }
            2 => {}
            _ => {
                return Err(YingError::InvalidData(format!(
                    "H264: pic_order_cnt_type 非法, value={}",
                    poc_type
                )));
            }
        }

        let num_ref_frames = br.read_ue()?;
        if num_ref_frames > 16 {
            return Err(YingError::InvalidData(format!(
                "H264: num_ref_frames 越界, value={}",
                num_ref_frames
            )));
        }
        let gaps_in_frame_num_allowed = br.read_bit()? == 1;

        let mb_width = br.read_ue()? + 1;
        let mb_height = br.read_ue()? + 1;
        if mb_width > 1024 || mb_height > 1024 {
            return Err(YingError::InvalidData(format!(
                "H264: 图像尺寸越界, mb_width={}, mb_height={}",
                mb_width, mb_height
            )));
        }

        let frame_mbs_only = br.read_bit()? == 1;
        let mut mb_adaptive_frame_field = false;
        if !frame_mbs_only {
            mb_adaptive_frame_field = br.read_bit()? == 1;
        }
        let direct_8x8_inference = br.read_bit()? == 1;

        let mut crop = (0, 0, 0, 0);
        if br.read_bit()? == 1 {
            crop.0 = br.read_ue()?;
            crop.1 = br.read_ue()?;
            crop.2 = br.read_ue()?;
            crop.3 = br.read_ue()?;
        }

        // vui_parameters_present_flag 及后续 VUI 内容忽略
        let _vui_present = br.read_bit()?;

        Ok(Self {
            profile_idc,
            level_idc,
            sps_id,
            log2_max_frame_num,
            poc_type,
            log2_max_poc_lsb,
            delta_pic_order_always_zero,
            num_ref_frames,
            gaps_in_frame_num_allowed,
            mb_width,
            mb_height,
            frame_mbs_only,
            mb_adaptive_frame_field,
            direct_8x8_inference,
            crop,
        })
    }
}

/// 切片组映射类型 (FMO). 仅解析语法, Baseline 解码路径只接受单切片组.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SliceGroupMap {
    /// num_slice_groups == 1, 无 FMO
    None,
    /// map_type 0: 轮询 (interleaved), 每组 run_length
    Interleaved(Vec<u32>),
    /// map_type 1: 分散 (dispersed)
    Dispersed,
    /// map_type 2: 前景矩形 (top_left, bottom_right) 对
    Foreground(Vec<(u32, u32)>),
    /// map_type 3-5: 变化型 (change_direction_flag, change_rate)
    Changing(bool, u32),
    /// map_type 6: 显式映射
    Explicit(Vec<u32>),
}

/// 图像参数集 (Picture Parameter Set)
#[derive(Debug, Clone)]
pub struct Pps {
    pub pps_id: u32,
    pub sps_id: u32,
    /// true = CABAC, false = CAVLC
    pub entropy_coding_mode: bool,
    pub pic_order_present: bool,
    pub num_slice_groups: u32,
    pub slice_group_map: SliceGroupMap,
    pub num_ref_idx_l0_active: u32,
    pub num_ref_idx_l1_active: u32,
    pub weighted_pred: bool,
    pub weighted_bipred_idc: u32,
    pub pic_init_qp: i32,
    pub pic_init_qs: i32,
    pub chroma_qp_index_offset: i32,
    pub deblocking_filter_control: bool,
    pub constrained_intra_pred: bool,
    pub redundant_pic_cnt_present: bool,
}

impl Pps {
    /// 从 RBSP 数据解析 PPS
    pub fn parse(rbsp: &[u8]) -> YingResult<Self> {
        let mut br = BitReader::new(rbsp);

        let pps_id = br.read_ue()?;
        if pps_id >= 256 {
            return Err(YingError::InvalidData(format!(
                "H264: pps_id 越界, value={}",
                pps_id
            )));
        }
        let sps_id = br.read_ue()?;
        if sps_id >= 32 {
            return Err(YingError::InvalidData(format!(
                "H264: PPS 引用的 sps_id 越界, value={}",
                sps_id
            )));
        }

        let entropy_coding_mode = br.read_bit()? == 1;
        let pic_order_present = br.read_bit()? == 1;

        let num_slice_groups = br.read_ue()? + 1;
        if num_slice_groups > 8 {
            return Err(YingError::InvalidData(format!(
                "H264: num_slice_groups 越界, value={}",
                num_slice_groups
            )));
        }
        let slice_group_map = if num_slice_groups > 1 {
            Self::parse_slice_group_map(&mut br, num_slice_groups)?
        } else {
            SliceGroupMap::None
        };

        let num_ref_idx_l0_active = br.read_ue()? + 1;
        let num_ref_idx_l1_active = br.read_ue()? + 1;
        if num_ref_idx_l0_active > 32 || num_ref_idx_l1_active > 32 {
            return Err(YingError::InvalidData(format!(
                "H264: num_ref_idx_active 越界, l0={}, l1={}",
                num_ref_idx_l0_active, num_ref_idx_l1_active
            )));
        }

        let weighted_pred = br.read_bit()? == 1;
        let weighted_bipred_idc = br.read_bits(2)?;

        let pic_init_qp = br.read_se()? + 26;
        let pic_init_qs = br.read_se()? + 26;
        if !(0..=51).contains(&pic_init_qp) {
            return Err(YingError::InvalidData(format!(
                "H264: pic_init_qp 越界, value={}",
                pic_init_qp
            )));
        }

        let chroma_qp_index_offset = br.read_se()?;
        if !(-12..=12).contains(&chroma_qp_index_offset) {
            return Err(YingError::InvalidData(format!(
                "H264: chroma_qp_index_offset 越界, value={}",
                chroma_qp_index_offset
            )));
        }

        let deblocking_filter_control = br.read_bit()? == 1;
        let constrained_intra_pred = br.read_bit()? == 1;
        let redundant_pic_cnt_present = br.read_bit()? == 1;

        Ok(Self {
            pps_id,
            sps_id,
            entropy_coding_mode,
            pic_order_present,
            num_slice_groups,
            slice_group_map,
            num_ref_idx_l0_active,
            num_ref_idx_l1_active,
            weighted_pred,
            weighted_bipred_idc,
            pic_init_qp,
            pic_init_qs,
            chroma_qp_index_offset,
            deblocking_filter_control,
            constrained_intra_pred,
            redundant_pic_cnt_present,
        })
    }

    fn parse_slice_group_map(br: &mut BitReader, groups: u32) -> YingResult<SliceGroupMap> {
        let map_type = br.read_ue()?;
        match map_type {
            0 => {
                let mut runs = Vec::with_capacity(groups as usize);
                for _ in 0..groups {
                    runs.push(br.read_ue()? + 1);
                }
                Ok(SliceGroupMap::Interleaved(runs))
            }
            1 => Ok(SliceGroupMap::Dispersed),
            2 => {
                let mut rects = Vec::with_capacity(groups as usize - 1);
                for _ in 0..groups - 1 {
                    let top_left = br.read_ue()?;
                    let bottom_right = br.read_ue()?;
                    rects.push((top_left, bottom_right));
                }
                Ok(SliceGroupMap::Foreground(rects))
            }
            3..=5 => {
                let direction = br.read_bit()? == 1;
                let rate = br.read_ue()? + 1;
                Ok(SliceGroupMap::Changing(direction, rate))
            }
            6 => {
                let count = br.read_ue()? + 1;
                if count > 1024 * 1024 {
                    return Err(YingError::InvalidData(format!(
                        "H264: pic_size_in_map_units 越界, value={}",
                        count
                    )));
                }
                let id_bits = 32 - (groups - 1).leading_zeros().min(31);
                let id_bits = if groups > 1 { id_bits.max(1) } else { 1 };
                let mut ids = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    ids.push(br.read_bits(id_bits)?);
                }
                Ok(SliceGroupMap::Explicit(ids))
            }
            _ => Err(YingError::InvalidData(format!(
                "H264: slice_group_map_type 非法, value={}",
                map_type
            ))),
        }
    }
}
