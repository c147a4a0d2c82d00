//! H.264 NAL (Network Abstraction Layer) 单元解析.
//!
//! # Annex B 格式
//!
//! Annex B 使用起始码 (start code) 分隔 NAL 单元:
//! - 3 字节起始码: `00 00 01`
//! - 4 字节起始码: `00 00 00 01`
//!
//! # NAL 头部 (1 字节)
//!
//! `forbidden_zero_bit(1) | nal_ref_idc(2) | nal_unit_type(5)`
//!
//! # AVCC 格式
//!
//! AVCC (length-prefixed) 使用大端长度前缀:
//! `[length: N bytes BE] [NAL data: length bytes]`

use ying_core::YingResult;

/// NAL 单元类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum NalUnitType {
    /// 非 IDR 图像切片 (P/B slice)
    Slice,
    /// 数据分区 A (DPA)
    SliceDpa,
    /// 数据分区 B (DPB)
    SliceDpb,
    /// 数据分区 C (DPC)
    SliceDpc,
    /// IDR 图像切片 (关键帧)
    SliceIdr,
    /// 增补增强信息 (SEI)
    Sei,
    /// 序列参数集 (SPS)
    Sps,
    /// 图像参数集 (PPS)
    Pps,
    /// 访问单元分隔符 (AUD)
    Aud,
    /// 序列结束
    EndOfSequence,
    /// 流结束
    EndOfStream,
    /// 填充数据
    FillerData,
    /// SPS 扩展
    SpsExtension,
    /// 未知类型
    Unknown(u8),
}

impl NalUnitType {
    /// 从 NAL 类型编号创建
    pub fn from_type_id(type_id: u8) -> Self {
        match type_id {
            1 => Self::Slice,
            2 => Self::SliceDpa,
            3 => Self::SliceDpb,
            4 => Self::SliceDpc,
            5 => Self::SliceIdr,
            6 => Self::Sei,
            7 => Self::Sps,
            8 => Self::Pps,
            9 => Self::Aud,
            10 => Self::EndOfSequence,
            11 => Self::EndOfStream,
            12 => Self::FillerData,
            13 => Self::SpsExtension,
            _ => Self::Unknown(type_id),
        }
    }

    /// 获取类型编号
    pub fn type_id(&self) -> u8 {
        match self {
            Self::Slice => 1,
            Self::SliceDpa => 2,
            Self::SliceDpb => 3,
            Self::SliceDpc => 4,
            Self::SliceIdr => 5,
            Self::Sei => 6,
            Self::Sps => 7,
            Self::Pps => 8,
            Self::Aud => 9,
            Self::EndOfSequence => 10,
            Self::EndOfStream => 11,
            Self::FillerData => 12,
            Self::SpsExtension => 13,
            Self::Unknown(id) => *id,
        }
    }

    /// 是否为 VCL (Video Coding Layer) NAL
    pub fn is_vcl(&self) -> bool {
        matches!(
            self,
            Self::Slice | Self::SliceDpa | Self::SliceDpb | Self::SliceDpc | Self::SliceIdr
        )
    }

    /// 是否为数据分区切片 (DPA/DPB/DPC)
    pub fn is_data_partition(&self) -> bool {
        matches!(self, Self::SliceDpa | Self::SliceDpb | Self::SliceDpc)
    }

    /// 是否为关键帧 (IDR)
    pub fn is_idr(&self) -> bool {
        matches!(self, Self::SliceIdr)
    }
}

impl std::fmt::Display for NalUnitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Slice => write!(f, "Slice"),
            Self::SliceDpa => write!(f, "SliceDPA"),
            Self::SliceDpb => write!(f, "SliceDPB"),
            Self::SliceDpc => write!(f, "SliceDPC"),
            Self::SliceIdr => write!(f, "IDR"),
            Self::Sei => write!(f, "SEI"),
            Self::Sps => write!(f, "SPS"),
            Self::Pps => write!(f, "PPS"),
            Self::Aud => write!(f, "AUD"),
            Self::EndOfSequence => write!(f, "EndOfSeq"),
            Self::EndOfStream => write!(f, "EndOfStream"),
            Self::FillerData => write!(f, "Filler"),
            Self::SpsExtension => write!(f, "SPSExt"),
            Self::Unknown(id) => write!(f, "Unknown({id})"),
        }
    }
}

/// 解析后的 NAL 单元
#[derive(Debug, Clone)]
pub struct NalUnit {
    /// NAL 单元类型
    pub nal_type: NalUnitType,
    /// nal_ref_idc (参考重要性, 0-3)
    pub ref_idc: u8,
    /// NAL 单元原始数据 (不含起始码, 含 NAL 头部字节)
    pub data: Vec<u8>,
}

impl NalUnit {
    /// 从 NAL 数据 (含头部字节) 解析
    pub fn parse(data: &[u8]) -> YingResult<Self> {
        if data.is_empty() {
            return Err(ying_core::YingError::InvalidData(
                "H264: NAL 单元数据为空".into(),
            ));
        }

        let header = data[0];
        let forbidden = (header >> 7) & 1;
        if forbidden != 0 {
            return Err(ying_core::YingError::InvalidData(format!(
                "H264: forbidden_zero_bit 非法, value={}",
                forbidden
            )));
        }
        let ref_idc = (header >> 5) & 0x03;
        let type_id = header & 0x1F;

        Ok(Self {
            nal_type: NalUnitType::from_type_id(type_id),
            ref_idc,
            data: data.to_vec(),
        })
    }

    /// 获取 RBSP (Raw Byte Sequence Payload) 数据
    ///
    /// 移除 NAL 头部字节和 emulation prevention 字节 (0x03).
    pub fn rbsp(&self) -> Vec<u8> {
        remove_emulation_prevention(&self.data[1..])
    }
}

/// 从 Annex B 字节流中分割出所有 NAL 单元
///
/// 支持 3 字节 (00 00 01) 和 4 字节 (00 00 00 01) 起始码.
/// 返回的 NAL 单元不含起始码.
pub fn split_annex_b(data: &[u8]) -> Vec<NalUnit> {
    let offsets = find_start_codes(data);
    let mut nalus = Vec::new();

    for (i, &start) in offsets.iter().enumerate() {
        let end = if i + 1 < offsets.len() {
            offsets[i + 1]
        } else {
            data.len()
        };

        let nal_start = skip_start_code(data, start);
        if nal_start >= end {
            continue;
        }

        // 去除尾部的 0 字节 (trailing zeros)
        let mut nal_end = end;
        while nal_end > nal_start && data[nal_end - 1] == 0x00 {
            nal_end -= 1;
        }

        if nal_end > nal_start {
            if let Ok(nalu) = NalUnit::parse(&data[nal_start..nal_end]) {
                nalus.push(nalu);
            }
        }
    }

    nalus
}

/// 从 AVCC (length-prefixed) 数据中提取 NAL 单元
///
/// `length_size` 通常为 4 (来自 AVCDecoderConfigurationRecord 的 lengthSizeMinusOne + 1)
pub fn split_avcc(data: &[u8], length_size: usize) -> Vec<NalUnit> {
    if !(1..=4).contains(&length_size) {
        return Vec::new();
    }

    let mut nalus = Vec::new();
    let mut pos = 0;

    while pos + length_size <= data.len() {
        let mut nal_len: usize = 0;
        for i in 0..length_size {
            nal_len = (nal_len << 8) | data[pos + i] as usize;
        }
        pos += length_size;

        if pos + nal_len > data.len() {
            break;
        }

        if let Ok(nalu) = NalUnit::parse(&data[pos..pos + nal_len]) {
            nalus.push(nalu);
        }
        pos += nal_len;
    }

    nalus
}

/// avcC 配置解析结果
#[derive(Debug)]
pub struct AvccConfig {
    /// SPS 列表
    pub sps_list: Vec<Vec<u8>>,
    /// PPS 列表
    pub pps_list: Vec<Vec<u8>>,
    /// NAL 长度前缀大小 (字节)
    pub length_size: usize,
}

/// 解析 AVCDecoderConfigurationRecord (MP4 avcC box 内容)
pub fn parse_avcc_config(data: &[u8]) -> YingResult<AvccConfig> {
    if data.len() < 7 {
        return Err(ying_core::YingError::InvalidData(
            "H264: avcC 数据太短".into(),
        ));
    }

    let _version = data[0];
    let _profile = data[1];
    let _compat = data[2];
    let _level = data[3];
    let length_size = ((data[4] & 0x03) + 1) as usize;

    let num_sps = (data[5] & 0x1F) as usize;
    let mut pos = 6;
    let mut sps_list = Vec::new();

    for i in 0..num_sps {
        if pos + 2 > data.len() {
            return Err(ying_core::YingError::InvalidData(format!(
                "H264: avcC SPS 长度字段截断, index={}",
                i
            )));
        }
        let sps_len = (u16::from(data[pos]) << 8 | u16::from(data[pos + 1])) as usize;
        pos += 2;
        if sps_len == 0 || pos + sps_len > data.len() {
            return Err(ying_core::YingError::InvalidData(format!(
                "H264: avcC SPS 数据截断或长度非法, index={}, declared_len={}, remain={}",
                i,
                sps_len,
                data.len().saturating_sub(pos)
            )));
        }
        sps_list.push(data[pos..pos + sps_len].to_vec());
        pos += sps_len;
    }

    if pos >= data.len() {
        return Err(ying_core::YingError::InvalidData(
            "H264: avcC 缺少 numOfPictureParameterSets 字段".into(),
        ));
    }

    let mut pps_list = Vec::new();
    let num_pps = data[pos] as usize;
    pos += 1;
    for i in 0..num_pps {
        if pos + 2 > data.len() {
            return Err(ying_core::YingError::InvalidData(format!(
                "H264: avcC PPS 长度字段截断, index={}",
                i
            )));
        }
        let pps_len = (u16::from(data[pos]) << 8 | u16::from(data[pos + 1])) as usize;
        pos += 2;
        if pps_len == 0 || pos + pps_len > data.len() {
            return Err(ying_core::YingError::InvalidData(format!(
                "H264: avcC PPS 数据截断或长度非法, index={}, declared_len={}, remain={}",
                i,
                pps_len,
                data.len().saturating_sub(pos)
            )));
        }
        pps_list.push(data[pos..pos + pps_len].to_vec());
        pos += pps_len;
    }

    Ok(AvccConfig {
        sps_list,
        pps_list,
        length_size,
    })
}

// ============================================================
// 内部工具函数
// ============================================================

/// 查找所有起始码的位置
fn find_start_codes(data: &[u8]) -> Vec<usize> {
    let mut positions = Vec::new();
    let mut i = 0;

    while i + 2 < data.len() {
        if data[i] == 0x00 && data[i + 1] == 0x00 {
            if data[i + 2] == 0x01 {
                positions.push(i);
                i += 3;
                continue;
            } else if i + 3 < data.len() && data[i + 2] == 0x00 && data[i + 3] == 0x01 {
                positions.push(i);
                i += 4;
                continue;
            }
        }
        i += 1;
    }

    positions
}

/// 跳过起始码, 返回 NAL 数据的起始位置
fn skip_start_code(data: &[u8], pos: usize) -> usize {
    if pos + 3 < data.len()
        && data[pos] == 0x00
        && data[pos + 1] == 0x00
        && data[pos + 2] == 0x00
        && data[pos + 3] == 0x01
    {
        pos + 4
    } else if pos + 2 < data.len()
        && data[pos] == 0x00
        && data[pos + 1] == 0x00
        && data[pos + 2] == 0x01
    {
        pos + 3
    } else {
        pos
    }
}

/// 移除 emulation prevention 字节 (0x00 0x00 0x03 → 0x00 0x00)
///
/// H.264 规范要求在 RBSP 中, 如果出现连续两个 0x00,
/// 后面必须插入 0x03 以防止与起始码混淆. 解析时需要移除.
fn remove_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut rbsp = Vec::with_capacity(data.len());
    let mut i = 0;

    while i < data.len() {
        let is_emulation_prevention =
            i + 2 < data.len() && data[i] == 0x00 && data[i + 1] == 0x00 && data[i + 2] == 0x03;
        if is_emulation_prevention {
            rbsp.push(0x00);
            rbsp.push(0x00);
            i += 3; // 跳过 0x03
        } else {
            rbsp.push(data[i]);
            i += 1;
        }
    }

    rbsp
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nal_type_create() {
        assert_eq!(NalUnitType::from_type_id(7), NalUnitType::Sps);
        assert_eq!(NalUnitType::from_type_id(8), NalUnitType::Pps);
        assert_eq!(NalUnitType::from_type_id(5), NalUnitType::SliceIdr);
        assert_eq!(NalUnitType::from_type_id(1), NalUnitType::Slice);
    }

    #[test]
    fn test_nal_type_property() {
        assert!(NalUnitType::SliceIdr.is_vcl());
        assert!(NalUnitType::SliceIdr.is_idr());
        assert!(NalUnitType::Slice.is_vcl());
        assert!(!NalUnitType::Slice.is_idr());
        assert!(NalUnitType::SliceDpa.is_data_partition());
        assert!(!NalUnitType::Sps.is_vcl());
    }

    #[test]
    fn test_nal_type_type_id() {
        for id in 0..=13 {
            let nt = NalUnitType::from_type_id(id);
            assert_eq!(nt.type_id(), id);
        }
    }

    #[test]
    fn test_nal_unit_parse() {
        // NAL header: forbidden=0, ref_idc=3, type=7 (SPS)
        // 0b0_11_00111 = 0x67
        let data = [0x67, 0x42, 0x00, 0x1E];
        let nalu = NalUnit::parse(&data).unwrap();
        assert_eq!(nalu.nal_type, NalUnitType::Sps);
        assert_eq!(nalu.ref_idc, 3);
    }

    #[test]
    fn test_nal_unit_empty_data_error() {
        assert!(NalUnit::parse(&[]).is_err());
    }

    #[test]
    fn test_nal_unit_reject_forbidden_zero_bit_set() {
        let err = NalUnit::parse(&[0xE7]).expect_err("forbidden_zero_bit=1 应返回错误");
        let msg = format!("{err}");
        assert!(
            msg.contains("forbidden_zero_bit"),
            "错误信息应包含 forbidden_zero_bit, actual={}",
            msg
        );
    }

    #[test]
    fn test_annex_b_split_3_byte_start_code() {
        let data = [
            0x00, 0x00, 0x01, 0x67, 0xAA, 0xBB, // SPS
            0x00, 0x00, 0x01, 0x68, 0xCC, // PPS
            0x00, 0x00, 0x01, 0x65, 0xDD, 0xEE, 0xFF, // IDR
        ];

        let nalus = split_annex_b(&data);
        assert_eq!(nalus.len(), 3);
        assert_eq!(nalus[0].nal_type, NalUnitType::Sps);
        assert_eq!(nalus[1].nal_type, NalUnitType::Pps);
        assert_eq!(nalus[2].nal_type, NalUnitType::SliceIdr);
    }

    #[test]
    fn test_annex_b_split_mixed_start_code() {
        let data = [
            0x00, 0x00, 0x00, 0x01, 0x67, 0xAA, // SPS (4字节)
            0x00, 0x00, 0x01, 0x68, 0xBB, // PPS (3字节)
        ];

        let nalus = split_annex_b(&data);
        assert_eq!(nalus.len(), 2);
        assert_eq!(nalus[0].nal_type, NalUnitType::Sps);
        assert_eq!(nalus[1].nal_type, NalUnitType::Pps);
    }

    #[test]
    fn test_avcc_split() {
        let mut data = Vec::new();
        // NAL 1: SPS, 3 bytes
        data.extend_from_slice(&[0x00, 0x00, 0x00, 0x03]);
        data.extend_from_slice(&[0x67, 0xAA, 0xBB]);
        // NAL 2: PPS, 2 bytes
        data.extend_from_slice(&[0x00, 0x00, 0x00, 0x02]);
        data.extend_from_slice(&[0x68, 0xCC]);

        let nalus = split_avcc(&data, 4);
        assert_eq!(nalus.len(), 2);
        assert_eq!(nalus[0].nal_type, NalUnitType::Sps);
        assert_eq!(nalus[1].nal_type, NalUnitType::Pps);
    }

    #[test]
    fn test_avcc_split_reject_invalid_length_size() {
        let data = [0x00, 0x00, 0x00, 0x02, 0x67, 0xAA];
        assert!(
            split_avcc(&data, 0).is_empty(),
            "length_size=0 应直接返回空结果, 避免死循环"
        );
        assert!(split_avcc(&data, 5).is_empty(), "length_size>4 应直接返回空结果");
    }

    #[test]
    fn test_emulation_prevention_remove() {
        // 00 00 03 → 00 00
        let data = [0x01, 0x00, 0x00, 0x03, 0x02, 0x03];
        let rbsp = remove_emulation_prevention(&data);
        assert_eq!(rbsp, vec![0x01, 0x00, 0x00, 0x02, 0x03]);
    }

    #[test]
    fn test_emulation_prevention_consecutive() {
        let data = [0x00, 0x00, 0x03, 0x00, 0x00, 0x03, 0x01];
        let rbsp = remove_emulation_prevention(&data);
        assert_eq!(rbsp, vec![0x00, 0x00, 0x00, 0x00, 0x01]);
    }

    #[test]
    fn test_avcc_config_parse() {
        let sps = [0x67u8, 0x42, 0x00, 0x1E, 0xAB];
        let pps = [0x68u8, 0xCE, 0x38, 0x80];

        let mut data = vec![
            1,    // configurationVersion
            0x42, // profile
            0x00, // compat
            0x1E, // level
            0xFF, // lengthSizeMinusOne = 3
            0xE1, // numOfSPS = 1
        ];
        data.extend_from_slice(&(sps.len() as u16).to_be_bytes());
        data.extend_from_slice(&sps);
        data.push(1); // numOfPPS
        data.extend_from_slice(&(pps.len() as u16).to_be_bytes());
        data.extend_from_slice(&pps);

        let parsed = parse_avcc_config(&data).unwrap();
        assert_eq!(parsed.length_size, 4);
        assert_eq!(parsed.sps_list.len(), 1);
        assert_eq!(parsed.pps_list.len(), 1);
        assert_eq!(parsed.sps_list[0], sps);
        assert_eq!(parsed.pps_list[0], pps);
    }

    #[test]
    fn test_parse_avcc_config_reject_truncated_sps() {
        // num_sps=1, declared_len=4, 实际仅 2 字节.
        let data = [0x01, 0x64, 0x00, 0x1E, 0xFF, 0xE1, 0x00, 0x04, 0x67, 0x64];
        assert!(parse_avcc_config(&data).is_err());
    }

    #[test]
    fn test_rbsp_extract() {
        // SPS header + emulation prevention
        let data = [0x67, 0x42, 0x00, 0x00, 0x03, 0x01, 0xAA];
        let nalu = NalUnit::parse(&data).unwrap();
        let rbsp = nalu.rbsp();
        // 移除头部 (0x67) 和 emulation prevention
        assert_eq!(rbsp, vec![0x42, 0x00, 0x00, 0x01, 0xAA]);
    }
}
