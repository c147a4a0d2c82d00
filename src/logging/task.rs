//! 日志后台维护: 每日零点翻滚, 历史压缩与保留期清理.

use super::{log_file_path, LogConfig};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveDate, TimeZone, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::error;

pub(super) fn spawn_maintenance(config: LogConfig, reopen_flag: Arc<AtomicBool>) {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(Duration::from_secs(config.maintenance_interval_secs.max(1)));

        if let Err(err) = prune_old_logs(&config) {
            error!("启动时清理日志失败: {}", err);
        }

        let mut next_midnight = next_rollover_instant(Local::now());

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(err) = prune_old_logs(&config) {
                        error!("清理日志失败: {}", err);
                    }
                }
                _ = tokio::time::sleep_until(next_midnight) => {
                    // 写入器在下一次写入时切到当日文件
                    if let Err(err) = touch_current_log(&config) {
                        error!("创建当日日志文件失败: {}", err);
                    } else {
                        reopen_flag.store(true, Ordering::Release);
                    }
                    if let Err(err) = prune_old_logs(&config) {
                        error!("翻滚后清理日志失败: {}", err);
                    }
                    next_midnight = next_rollover_instant(Local::now());
                }
            }
        }
    });
}

/// 预创建当日日志文件, 保证翻滚后写入器有目标可开
fn touch_current_log(config: &LogConfig) -> Result<()> {
    let directory = Path::new(&config.directory);
    fs::create_dir_all(directory)?;
    let path = log_file_path(directory, &config.prefix, Local::now().date_naive());
    super::open_append(&path)?;
    Ok(())
}

/// 删除超过保留期的日志, 压缩非当日的未压缩日志
fn prune_old_logs(config: &LogConfig) -> Result<()> {
    let directory = Path::new(&config.directory);
    if !directory.exists() {
        return Ok(());
    }

    let today = Local::now().date_naive();
    let cutoff = today - ChronoDuration::days(config.retention_days);

    for entry in fs::read_dir(directory)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        let path = entry.path();

        let Some((date, compressed)) = parse_log_name(&name, &config.prefix) else {
            continue;
        };

        if date < cutoff {
            let _ = fs::remove_file(&path);
            continue;
        }

        if config.compress_rotated && !compressed && date < today {
            let _ = gzip_log(&path);
        }
    }

    Ok(())
}

/// gzip 压缩单个日志并删除原文件, 目标已存在时跳过
fn gzip_log(path: &Path) -> Result<()> {
    let gz_path = PathBuf::from(format!("{}.gz", path.display()));
    if gz_path.exists() {
        return Ok(());
    }

    let mut input =
        File::open(path).with_context(|| format!("打开待压缩日志失败, path={}", path.display()))?;
    let output = File::create(&gz_path)
        .with_context(|| format!("创建压缩文件失败, path={}", gz_path.display()))?;
    let mut encoder = GzEncoder::new(output, Compression::default());

    let mut buf = [0u8; 8 * 1024];
    loop {
        let n = input.read(&mut buf)?;
        if n == 0 {
            break;
        }
        encoder.write_all(&buf[..n])?;
    }
    encoder.finish()?;

    fs::remove_file(path)
        .with_context(|| format!("删除已压缩日志失败, path={}", path.display()))?;
    Ok(())
}

/// 解析 "<prefix>-YYYYMMDD.log[.gz]" 形式的文件名
fn parse_log_name(name: &str, prefix: &str) -> Option<(NaiveDate, bool)> {
    let rest = name.strip_prefix(prefix)?.strip_prefix('-')?;

    if let Some(date_part) = rest.strip_suffix(".log") {
        return Some((parse_date(date_part)?, false));
    }
    if let Some(date_part) = rest.strip_suffix(".log.gz") {
        return Some((parse_date(date_part)?, true));
    }
    None
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    if value.len() != 8 {
        return None;
    }
    NaiveDate::parse_from_str(value, "%Y%m%d").ok()
}

fn next_rollover_instant(now: DateTime<Local>) -> tokio::time::Instant {
    let next_date = now.date_naive() + ChronoDuration::days(1);
    let wait = next_date
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| Local.from_local_datetime(&midnight).earliest())
        .map(|next_local| SystemTime::from(next_local.with_timezone(&Utc)))
        .and_then(|at| at.duration_since(SystemTime::now()).ok())
        .unwrap_or(Duration::from_secs(1));
    tokio::time::Instant::now() + wait
}
