//! 日志初始化与按日轮转.
//!
//! 控制台与文件双路输出, 文件按自然日切分, 由后台任务负责
//! 压缩历史与按保留期清理.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt::{self, FormatEvent, FormatFields, format::Writer},
    layer::{Layer, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
};

mod task;

/// 日志配置
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    /// 文件输出过滤表达式, 如 "info" 或 "ying_codec=debug"
    pub level: String,
    /// 日志目录
    pub directory: String,
    /// 日志文件名前缀
    pub prefix: String,
    /// 历史日志保留天数
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    /// 是否 gzip 压缩非当日日志
    #[serde(default = "default_true")]
    pub compress_rotated: bool,
    /// 清理任务执行间隔 (秒)
    #[serde(default = "default_maintenance_interval")]
    pub maintenance_interval_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_retention_days() -> i64 {
    14
}

fn default_maintenance_interval() -> u64 {
    1800
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: "logs".to_string(),
            prefix: "ying".to_string(),
            retention_days: default_retention_days(),
            compress_rotated: default_true(),
            maintenance_interval_secs: default_maintenance_interval(),
        }
    }
}

static WORKER_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// 初始化全局日志.
///
/// 需在 tokio 运行时内调用, 否则跳过后台维护任务.
pub fn init(config: LogConfig) -> Result<()> {
    std::fs::create_dir_all(&config.directory)
        .with_context(|| format!("创建日志目录失败, dir={}", config.directory))?;

    let reopen_flag = Arc::new(AtomicBool::new(false));
    let writer = DailyLogWriter::new(
        Path::new(&config.directory),
        &config.prefix,
        Arc::clone(&reopen_flag),
    )?;

    let (non_blocking, guard) = tracing_appender::non_blocking(writer);
    WORKER_GUARD.set(guard).ok();

    let console_layer = fmt::Layer::default()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .event_format(ConsoleFormat)
        .with_filter(EnvFilter::from_default_env());

    let file_layer = fmt::Layer::default()
        .with_writer(non_blocking)
        .with_ansi(false)
        .event_format(PlainFormat)
        .with_filter(EnvFilter::new(&config.level));

    Registry::default()
        .with(console_layer)
        .with(file_layer)
        .init();

    if tokio::runtime::Handle::try_current().is_ok() {
        task::spawn_maintenance(config, reopen_flag);
    }

    Ok(())
}

/// 按日切分的文件写入器, 收到重开标记时切换到当日文件
struct DailyLogWriter {
    directory: PathBuf,
    prefix: String,
    reopen_flag: Arc<AtomicBool>,
    file: File,
}

impl DailyLogWriter {
    fn new(directory: &Path, prefix: &str, reopen_flag: Arc<AtomicBool>) -> Result<Self> {
        let path = log_file_path(directory, prefix, Local::now().date_naive());
        let file = open_append(&path)?;
        Ok(Self {
            directory: directory.to_path_buf(),
            prefix: prefix.to_string(),
            reopen_flag,
            file,
        })
    }

    fn reopen(&mut self) -> std::io::Result<()> {
        let path = log_file_path(&self.directory, &self.prefix, Local::now().date_naive());
        self.file = open_append(&path).map_err(std::io::Error::other)?;
        Ok(())
    }
}

impl Write for DailyLogWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.reopen_flag.swap(false, Ordering::AcqRel) {
            self.reopen()?;
        }
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("打开日志文件失败, path={}", path.display()))
}

pub(crate) fn log_file_path(directory: &Path, prefix: &str, date: NaiveDate) -> PathBuf {
    directory.join(format!("{}-{}.log", prefix, date.format("%Y%m%d")))
}

/// 控制台格式: 时间 + 着色级别 + target
struct ConsoleFormat;

impl<S, N> FormatEvent<S, N> for ConsoleFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &fmt::FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let meta = event.metadata();
        let color = match *meta.level() {
            tracing::Level::ERROR => "\x1b[31m",
            tracing::Level::WARN => "\x1b[33m",
            tracing::Level::INFO => "\x1b[32m",
            _ => "\x1b[36m",
        };
        write!(
            writer,
            "{} {}{:5}\x1b[0m {}: ",
            Local::now().format("%H:%M:%S%.3f"),
            color,
            meta.level(),
            meta.target()
        )?;
        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// 文件格式: 完整日期时间 + 级别 + target, 无着色
struct PlainFormat;

impl<S, N> FormatEvent<S, N> for PlainFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &fmt::FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let meta = event.metadata();
        write!(
            writer,
            "{} {:5} {}: ",
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            meta.level(),
            meta.target()
        )?;
        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
