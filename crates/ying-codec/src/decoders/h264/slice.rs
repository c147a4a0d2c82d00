//! 切片 (slice) 层语法解析.
//!
//! 解析切片头部并解析出其引用的 SPS/PPS. Baseline 之外的特性
//! (场编码, B/SP/SI 切片, 参考帧重排序, 加权预测, 自适应参考帧标记)
//! 在此处显式拒绝, 返回 [`YingError::Unsupported`].

use std::collections::HashMap;

use ying_core::{BitReader, YingError, YingResult};

use super::parameter_sets::{Pps, Sps};

/// 切片类型
///
/// 语法值 5-9 与 0-4 同义 (表示图像内所有切片同类型), 解析时折叠.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceType {
    P,
    B,
    I,
    Sp,
    Si,
}

impl SliceType {
    /// 从 slice_type 语法值创建 (0-9)
    pub fn from_syntax(value: u32) -> YingResult<Self> {
        match value % 5 {
            0 => Ok(Self::P),
            1 => Ok(Self::B),
            2 => Ok(Self::I),
            3 => Ok(Self::Sp),
            4 => Ok(Self::Si),
            _ => Err(YingError::InvalidData(format!(
                "H264: slice_type 非法, value={}",
                value
            ))),
        }
    }

    pub fn is_intra(&self) -> bool {
        matches!(self, Self::I | Self::Si)
    }
}

impl std::fmt::Display for SliceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::P => write!(f, "P"),
            Self::B => write!(f, "B"),
            Self::I => write!(f, "I"),
            Self::Sp => write!(f, "SP"),
            Self::Si => write!(f, "SI"),
        }
    }
}

/// 已解析的切片头部
#[derive(Debug, Clone)]
pub struct SliceHeader {
    pub first_mb: u32,
    pub slice_type: SliceType,
    pub pps_id: u32,
    pub frame_num: u32,
    pub idr_pic_id: u32,
    /// pic_order_cnt_lsb (poc_type == 0)
    pub poc_lsb: u32,
    pub redundant_pic_cnt: u32,
    /// 本切片生效的 list0 激活参考帧数 (PPS 默认或头部覆盖)
    pub num_ref_idx_l0_active: u32,
    /// slice_qp_delta, 叠加在 pic_init_qp 上
    pub qp_delta: i32,
    pub disable_deblocking_idc: u32,
    pub alpha_c0_offset_div2: i32,
    pub beta_offset_div2: i32,
    pub is_idr: bool,
    pub nal_ref_idc: u8,
}

impl SliceHeader {
    /// 本切片的基准 QP (未含宏块级 mb_qp_delta)
    pub fn slice_qp(&self, pps: &Pps) -> i32 {
        pps.pic_init_qp + self.qp_delta
    }
}

/// 解析切片头部, 并解析出其引用的参数集
///
/// 读取位置停在切片数据 (宏块层) 的第一个比特处.
pub fn parse_slice_header<'a>(
    br: &mut BitReader,
    sps_map: &'a HashMap<u32, Sps>,
    pps_map: &'a HashMap<u32, Pps>,
    is_idr: bool,
    nal_ref_idc: u8,
) -> YingResult<(SliceHeader, &'a Sps, &'a Pps)> {
    let first_mb = br.read_ue()?;
    let slice_type = SliceType::from_syntax(br.read_ue()?)?;
    match slice_type {
        SliceType::P | SliceType::I => {}
        other => {
            return Err(YingError::Unsupported(format!(
                "H264: 不支持 {} 切片 (Baseline 仅支持 I/P)",
                other
            )));
        }
    }

    let pps_id = br.read_ue()?;
    let pps = pps_map.get(&pps_id).ok_or_else(|| {
        YingError::InvalidData(format!("H264: 切片引用了未知 PPS, pps_id={}", pps_id))
    })?;
    let sps = sps_map.get(&pps.sps_id).ok_or_else(|| {
        YingError::InvalidData(format!("H264: PPS 引用了未知 SPS, sps_id={}", pps.sps_id))
    })?;

    if pps.num_slice_groups > 1 {
        return Err(YingError::Unsupported(
            "H264: 不支持多切片组 (FMO)".into(),
        ));
    }
    if sps.poc_type == 1 {
        return Err(YingError::Unsupported(
            "H264: 不支持 pic_order_cnt_type=1".into(),
        ));
    }

    let frame_num = br.read_bits(sps.log2_max_frame_num)?;

    if !sps.frame_mbs_only {
        let field_pic = br.read_bit()? == 1;
        if field_pic {
            return Err(YingError::Unsupported("H264: 不支持场编码图像".into()));
        }
    }

    let mut idr_pic_id = 0;
    if is_idr {
        idr_pic_id = br.read_ue()?;
    }

    let mut poc_lsb = 0;
    if sps.poc_type == 0 {
        poc_lsb = br.read_bits(sps.log2_max_poc_lsb)?;
        if pps.pic_order_present {
            let _delta_poc_bottom = br.read_se()?;
        }
    }

    let mut redundant_pic_cnt = 0;
    if pps.redundant_pic_cnt_present {
        redundant_pic_cnt = br.read_ue()?;
    }

    let mut num_ref_idx_l0_active = pps.num_ref_idx_l0_active;
    if slice_type == SliceType::P {
        let override_flag = br.read_bit()? == 1;
        if override_flag {
            num_ref_idx_l0_active = br.read_ue()? + 1;
            if num_ref_idx_l0_active > 32 {
                return Err(YingError::InvalidData(format!(
                    "H264: num_ref_idx_l0_active 越界, value={}",
                    num_ref_idx_l0_active
                )));
            }
        }

        // ref_pic_list_reordering
        let reordering = br.read_bit()? == 1;
        if reordering {
            return Err(YingError::Unsupported(
                "H264: 不支持参考帧列表重排序".into(),
            ));
        }

        if pps.weighted_pred {
            return Err(YingError::Unsupported("H264: 不支持加权预测".into()));
        }
    }

    if nal_ref_idc != 0 {
        if is_idr {
            let _no_output_of_prior_pics = br.read_bit()?;
            let _long_term_reference = br.read_bit()?;
        } else {
            let adaptive_marking = br.read_bit()? == 1;
            if adaptive_marking {
                return Err(YingError::Unsupported(
                    "H264: 不支持自适应参考帧标记".into(),
                ));
            }
        }
    }

    if pps.entropy_coding_mode && !slice_type.is_intra() {
        let _cabac_init_idc = br.read_ue()?;
    }

    let qp_delta = br.read_se()?;
    let slice_qp = pps.pic_init_qp + qp_delta;
    if !(0..=51).contains(&slice_qp) {
        return Err(YingError::InvalidData(format!(
            "H264: 切片 QP 越界, value={}",
            slice_qp
        )));
    }

    let mut disable_deblocking_idc = 0;
    let mut alpha_c0_offset_div2 = 0;
    let mut beta_offset_div2 = 0;
    if pps.deblocking_filter_control {
        disable_deblocking_idc = br.read_ue()?;
        if disable_deblocking_idc > 2 {
            return Err(YingError::InvalidData(format!(
                "H264: disable_deblocking_filter_idc 非法, value={}",
                disable_deblocking_idc
            )));
        }
        if disable_deblocking_idc != 1 {
            alpha_c0_offset_div2 = br.read_se()?;
            beta_offset_div2 = br.read_se()?;
        }
    }

    Ok((
        SliceHeader {
            first_mb,
            slice_type,
            pps_id,
            frame_num,
            idr_pic_id,
            poc_lsb,
            redundant_pic_cnt,
            num_ref_idx_l0_active,
            qp_delta,
            disable_deblocking_idc,
            alpha_c0_offset_div2,
            beta_offset_div2,
            is_idr,
            nal_ref_idc,
        },
        sps,
        pps,
    ))
}

/// RBSP 中是否还有有效数据 (rbsp_stop_one_bit 检测)
///
/// 剩余比特全部属于尾部填充 (一个 1 之后跟 0) 时返回 false.
pub fn more_rbsp_data(br: &mut BitReader) -> bool {
    let left = br.bits_left();
    if left == 0 {
        return false;
    }
    if left > 8 {
        return true;
    }
    match br.peek_bits(left as u32) {
        Ok(tail) => tail != 1 << (left - 1),
        Err(_) => false,
    }
}
