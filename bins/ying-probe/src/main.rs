//! ying-probe - H.264 码流探测工具
//!
//! 分析 Annex B 裸码流: 列出 NAL 单元, 汇总 SPS/PPS 参数,
//! 可选地完整解码并统计输出帧.

use clap::Parser;
use serde::Serialize;
use std::process;

use ying_codec::decoders::h264::parameter_sets::{Pps, Sps};
use ying_codec::parsers::h264::nal::{split_annex_b, NalUnit, NalUnitType};
use ying_codec::{CodecId, CodecParameters, CodecRegistry, Decoder, Packet};
use ying_core::YingError;

/// Ying H.264 码流探测工具
#[derive(Parser, Debug)]
#[command(name = "ying-probe", version, about = "纯 Rust H.264 码流探测工具")]
struct Cli {
    /// 输入文件路径 (Annex B 裸码流)
    input: Option<String>,

    /// 逐个列出 NAL 单元
    #[arg(long)]
    show_nals: bool,

    /// NAL 列表最大条数 (0 为不限)
    #[arg(long, default_value_t = 64)]
    limit: usize,

    /// 完整解码并统计输出帧 (会解码全部数据)
    #[arg(long)]
    decode: bool,

    /// 输出 JSON 格式
    #[arg(long)]
    json: bool,

    /// 静默模式 (只输出探测结果)
    #[arg(short, long)]
    quiet: bool,
}

// ============================================================
// JSON 输出结构体
// ============================================================

/// 完整探测结果
#[derive(Serialize)]
struct ProbeOutput {
    stream: StreamSummary,
    sps: Vec<SpsInfo>,
    pps: Vec<PpsInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    nals: Option<Vec<NalInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frames: Option<DecodeSummary>,
}

/// 码流统计
#[derive(Serialize)]
struct StreamSummary {
    filename: String,
    total_bytes: u64,
    nal_count: usize,
    vcl_nal_count: usize,
    idr_nal_count: usize,
}

/// SPS 摘要
#[derive(Serialize)]
struct SpsInfo {
    sps_id: u32,
    profile_idc: u8,
    level_idc: u8,
    width: u32,
    height: u32,
    cropped_width: u32,
    cropped_height: u32,
    mb_count: u32,
    num_ref_frames: u32,
    poc_type: u32,
    frame_mbs_only: bool,
}

/// PPS 摘要
#[derive(Serialize)]
struct PpsInfo {
    pps_id: u32,
    sps_id: u32,
    entropy_coding: String,
    pic_init_qp: i32,
    chroma_qp_index_offset: i32,
    num_ref_idx_l0_active: u32,
    deblocking_filter_control: bool,
}

/// 单个 NAL 单元
#[derive(Serialize)]
struct NalInfo {
    index: usize,
    nal_type: String,
    ref_idc: u8,
    size: usize,
}

/// 解码统计
#[derive(Serialize)]
struct DecodeSummary {
    decoded_frames: u64,
    keyframes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

// ============================================================
// 主逻辑
// ============================================================

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let Some(input_path) = cli.input.as_ref() else {
        print_banner();
        return;
    };

    if !cli.quiet {
        eprintln!(
            "ying-probe 版本 {} -- 纯 Rust H.264 码流探测工具",
            env!("CARGO_PKG_VERSION")
        );
        eprintln!("输入文件: {input_path}");
    }

    let data = match std::fs::read(input_path) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("错误: 无法读取文件 '{input_path}': {e}");
            process::exit(1);
        }
    };

    let nalus = split_annex_b(&data);
    if nalus.is_empty() {
        eprintln!("错误: 未找到 Annex B 起始码, 不是裸 H.264 码流?");
        process::exit(1);
    }

    let stream = StreamSummary {
        filename: input_path.clone(),
        total_bytes: data.len() as u64,
        nal_count: nalus.len(),
        vcl_nal_count: nalus.iter().filter(|n| n.nal_type.is_vcl()).count(),
        idr_nal_count: nalus.iter().filter(|n| n.nal_type.is_idr()).count(),
    };

    let (sps_list, pps_list) = collect_parameter_sets(&nalus);

    let nal_infos = if cli.show_nals {
        let take = if cli.limit == 0 { nalus.len() } else { cli.limit };
        Some(
            nalus
                .iter()
                .take(take)
                .enumerate()
                .map(|(i, n)| NalInfo {
                    index: i,
                    nal_type: format!("{}", n.nal_type),
                    ref_idc: n.ref_idc,
                    size: n.data.len(),
                })
                .collect::<Vec<_>>(),
        )
    } else {
        None
    };

    let decode_summary = if cli.decode {
        Some(decode_stream(&data))
    } else {
        None
    };

    if cli.json {
        let output = ProbeOutput {
            stream,
            sps: sps_list,
            pps: pps_list,
            nals: nal_infos,
            frames: decode_summary,
        };
        match serde_json::to_string_pretty(&output) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("错误: JSON 序列化失败: {e}");
                process::exit(1);
            }
        }
    } else {
        print_stream_text(&stream);
        for sps in &sps_list {
            print_sps_text(sps);
        }
        for pps in &pps_list {
            print_pps_text(pps);
        }
        if let Some(ref nals) = nal_infos {
            print_nals_text(nals, nalus.len());
        }
        if let Some(ref summary) = decode_summary {
            print_decode_text(summary);
        }
    }
}

/// 解析码流中出现的全部 SPS/PPS (同 id 的以最后一个为准)
fn collect_parameter_sets(nalus: &[NalUnit]) -> (Vec<SpsInfo>, Vec<PpsInfo>) {
    let mut sps_list: Vec<SpsInfo> = Vec::new();
    let mut pps_list: Vec<PpsInfo> = Vec::new();

    for nalu in nalus {
        match nalu.nal_type {
            NalUnitType::Sps => match Sps::parse(&nalu.rbsp()) {
                Ok(sps) => {
                    sps_list.retain(|s| s.sps_id != sps.sps_id);
                    sps_list.push(build_sps_info(&sps));
                }
                Err(e) => eprintln!("警告: SPS 解析失败: {e}"),
            },
            NalUnitType::Pps => match Pps::parse(&nalu.rbsp()) {
                Ok(pps) => {
                    pps_list.retain(|p| p.pps_id != pps.pps_id);
                    pps_list.push(build_pps_info(&pps));
                }
                Err(e) => eprintln!("警告: PPS 解析失败: {e}"),
            },
            _ => {}
        }
    }

    (sps_list, pps_list)
}

fn build_sps_info(sps: &Sps) -> SpsInfo {
    SpsInfo {
        sps_id: sps.sps_id,
        profile_idc: sps.profile_idc,
        level_idc: sps.level_idc,
        width: sps.width(),
        height: sps.height(),
        cropped_width: sps.cropped_width(),
        cropped_height: sps.cropped_height(),
        mb_count: sps.mb_count(),
        num_ref_frames: sps.num_ref_frames,
        poc_type: sps.poc_type,
        frame_mbs_only: sps.frame_mbs_only,
    }
}

fn build_pps_info(pps: &Pps) -> PpsInfo {
    PpsInfo {
        pps_id: pps.pps_id,
        sps_id: pps.sps_id,
        entropy_coding: if pps.entropy_coding_mode {
            "CABAC".to_string()
        } else {
            "CAVLC".to_string()
        },
        pic_init_qp: pps.pic_init_qp,
        chroma_qp_index_offset: pps.chroma_qp_index_offset,
        num_ref_idx_l0_active: pps.num_ref_idx_l0_active,
        deblocking_filter_control: pps.deblocking_filter_control,
    }
}

/// 完整解码码流, 统计输出帧
fn decode_stream(data: &[u8]) -> DecodeSummary {
    let mut summary = DecodeSummary {
        decoded_frames: 0,
        keyframes: 0,
        width: None,
        height: None,
        error: None,
    };

    let mut registry = CodecRegistry::new();
    ying_codec::register_all(&mut registry);

    let mut decoder = match registry.create_decoder(CodecId::H264) {
        Ok(d) => d,
        Err(e) => {
            summary.error = Some(format!("无法创建解码器: {e}"));
            return summary;
        }
    };
    if let Err(e) = decoder.open(&CodecParameters::new(CodecId::H264)) {
        summary.error = Some(format!("解码器打开失败: {e}"));
        return summary;
    }

    for packet in [Packet::from_data(data.to_vec()), Packet::empty()] {
        if let Err(e) = decoder.send_packet(&packet) {
            summary.error = Some(format!("{e}"));
            break;
        }
        loop {
            match decoder.receive_frame() {
                Ok(frame) => {
                    let v = frame.video();
                    summary.decoded_frames += 1;
                    if v.is_keyframe {
                        summary.keyframes += 1;
                    }
                    summary.width = Some(v.width);
                    summary.height = Some(v.height);
                }
                Err(YingError::NeedMoreData) | Err(YingError::Eof) => break,
                Err(e) => {
                    summary.error = Some(format!("{e}"));
                    return summary;
                }
            }
        }
    }

    summary
}

// ============================================================
// 文本输出
// ============================================================

fn print_stream_text(stream: &StreamSummary) {
    println!("[STREAM]");
    println!("  文件名       : {}", stream.filename);
    println!(
        "  数据总量     : {} 字节 ({:.2} KB)",
        stream.total_bytes,
        stream.total_bytes as f64 / 1024.0
    );
    println!("  NAL 总数     : {}", stream.nal_count);
    println!("  VCL NAL 数   : {}", stream.vcl_nal_count);
    println!("  IDR NAL 数   : {}", stream.idr_nal_count);
    println!("[/STREAM]");
    println!();
}

fn print_sps_text(sps: &SpsInfo) {
    println!("[SPS #{}]", sps.sps_id);
    println!(
        "  档次/级别    : profile={} level={}",
        sps.profile_idc, sps.level_idc
    );
    println!("  解码分辨率   : {}x{}", sps.width, sps.height);
    if sps.cropped_width != sps.width || sps.cropped_height != sps.height {
        println!("  输出分辨率   : {}x{}", sps.cropped_width, sps.cropped_height);
    }
    println!("  宏块数       : {}", sps.mb_count);
    println!("  参考帧数     : {}", sps.num_ref_frames);
    println!("  POC 类型     : {}", sps.poc_type);
    println!("  逐行编码     : {}", sps.frame_mbs_only);
    println!("[/SPS]");
    println!();
}

fn print_pps_text(pps: &PpsInfo) {
    println!("[PPS #{}]", pps.pps_id);
    println!("  引用 SPS     : {}", pps.sps_id);
    println!("  熵编码       : {}", pps.entropy_coding);
    println!("  初始 QP      : {}", pps.pic_init_qp);
    println!("  色度 QP 偏移 : {}", pps.chroma_qp_index_offset);
    println!("  L0 参考数    : {}", pps.num_ref_idx_l0_active);
    println!("  去块控制     : {}", pps.deblocking_filter_control);
    println!("[/PPS]");
    println!();
}

fn print_nals_text(nals: &[NalInfo], total: usize) {
    println!("[NALS]");
    for nal in nals {
        println!(
            "  #{:<4} {:<28} ref_idc={} size={}",
            nal.index, nal.nal_type, nal.ref_idc, nal.size
        );
    }
    if nals.len() < total {
        println!("  ... 其余 {} 个 NAL 未列出 (--limit)", total - nals.len());
    }
    println!("[/NALS]");
    println!();
}

fn print_decode_text(summary: &DecodeSummary) {
    println!("[FRAMES]");
    println!("  解码帧数     : {}", summary.decoded_frames);
    println!("  关键帧数     : {}", summary.keyframes);
    if let (Some(w), Some(h)) = (summary.width, summary.height) {
        println!("  输出分辨率   : {w}x{h}");
    }
    if let Some(ref err) = summary.error {
        println!("  解码错误     : {err}");
    }
    println!("[/FRAMES]");
    println!();
}

/// 打印版本横幅
fn print_banner() {
    println!(
        "ying-probe 版本 {} -- 纯 Rust H.264 码流探测工具",
        env!("CARGO_PKG_VERSION")
    );
    println!();
    println!("用法: ying-probe [选项] <输入文件>");
    println!();
    println!("选项:");
    println!("  --show-nals       逐个列出 NAL 单元");
    println!("  --limit <N>       NAL 列表最大条数 (默认 64, 0 为不限)");
    println!("  --decode          完整解码并统计输出帧");
    println!("  --json            以 JSON 格式输出");
    println!("  -q, --quiet       静默模式");
    println!();
    println!("使用 --help 查看完整用法.");
}
