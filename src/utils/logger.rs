use log::LevelFilter;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::append::rolling_file::policy::compound::{
    CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
};
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Target for mutation and index events.
pub const AUDIT_TARGET: &str = "shelfquery::audit";
/// Target for per-execution timing and counts.
pub const METRICS_TARGET: &str = "shelfquery::metrics";

const ENCODER_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} - {m}{n}";
const ROLL_SIZE_BYTES: u64 = 10 * 1024 * 1024;
const DEFAULT_RETENTION: u32 = 7;

static HANDLE: OnceLock<log4rs::Handle> = OnceLock::new();

/// Map a textual level (`error|warn|info|debug|trace`) to a filter. Unknown values fall back to info.
#[must_use]
pub fn parse_level(level: &str) -> LevelFilter {
    match level.to_ascii_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

fn rolling_appender(
    base: &Path,
    stem: &str,
    keep: u32,
) -> Result<RollingFileAppender, Box<dyn std::error::Error>> {
    let roller = FixedWindowRoller::builder()
        .build(&format!("{}", base.join(format!("{stem}.{{}}.log")).display()), keep)?;
    let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(ROLL_SIZE_BYTES)), Box::new(roller));
    let appender = RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(ENCODER_PATTERN)))
        .build(base.join(format!("{stem}.log")), Box::new(policy))?;
    Ok(appender)
}

/// Configure process-wide logging with `app.log`, `audit.log` and `metrics.log` under `dir`
/// (current directory when `None`). Calling it again replaces the active configuration.
///
/// # Errors
/// Returns an error if the directory or appenders cannot be created.
pub fn configure_logging(
    dir: Option<&Path>,
    level: Option<&str>,
    retention: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    configure_logging_with_dev(dir, level, retention, false)
}

/// Like [`configure_logging`], optionally persisting `dev6!` traces to `dev6.log`.
///
/// # Errors
/// Returns an error if the directory or appenders cannot be created.
pub fn configure_logging_with_dev(
    dir: Option<&Path>,
    level: Option<&str>,
    retention: Option<usize>,
    enable_dev6: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let base = match dir {
        Some(d) => PathBuf::from(d),
        None => std::env::current_dir()?,
    };
    std::fs::create_dir_all(&base)?;
    let keep = retention.map_or(DEFAULT_RETENTION, |r| u32::try_from(r).unwrap_or(u32::MAX));
    let lvl = parse_level(level.unwrap_or("info"));

    let mut builder = Config::builder()
        .appender(Appender::builder().build("app", Box::new(rolling_appender(&base, "app", keep)?)))
        .appender(
            Appender::builder().build("audit", Box::new(rolling_appender(&base, "audit", keep)?)),
        )
        .appender(
            Appender::builder()
                .build("metrics", Box::new(rolling_appender(&base, "metrics", keep)?)),
        )
        .logger(Logger::builder().appender("audit").additive(false).build(AUDIT_TARGET, lvl))
        .logger(Logger::builder().appender("metrics").additive(false).build(METRICS_TARGET, lvl));

    builder = if enable_dev6 {
        builder
            .appender(
                Appender::builder().build("dev6", Box::new(rolling_appender(&base, "dev6", keep)?)),
            )
            .logger(
                Logger::builder()
                    .appender("dev6")
                    .additive(false)
                    .build(crate::utils::devlog::DEV_TARGET, LevelFilter::Trace),
            )
    } else {
        builder.logger(
            Logger::builder()
                .additive(false)
                .build(crate::utils::devlog::DEV_TARGET, LevelFilter::Off),
        )
    };

    let config = builder.build(Root::builder().appender("app").build(lvl))?;
    if let Some(handle) = HANDLE.get() {
        handle.set_config(config);
        return Ok(());
    }
    let handle = log4rs::init_config(config)?;
    let _ = HANDLE.set(handle);
    Ok(())
}

/// Configure logging from a [`LogConfig`](crate::config::LogConfig).
///
/// # Errors
/// Returns an error if the directory or appenders cannot be created.
pub fn configure_from_config(cfg: &crate::config::LogConfig) -> Result<(), Box<dyn std::error::Error>> {
    configure_logging_with_dev(
        cfg.dir.as_deref(),
        Some(cfg.level.as_str()),
        Some(cfg.retention),
        cfg.dev6,
    )
}

/// Configure logging from environment variables if present:
/// - `SHELFQUERY_LOG_DIR`
/// - `SHELFQUERY_LOG_LEVEL`
/// - `SHELFQUERY_LOG_RETENTION`
/// - `SHELFQUERY_DEV6` (`1|true|yes`)
///
/// # Errors
/// Returns an error if a variable is malformed or the directory or appenders cannot be created.
pub fn configure_from_env() -> Result<(), Box<dyn std::error::Error>> {
    let mut cfg = crate::config::LogConfig::default();
    cfg.apply_env_with(|k| std::env::var(k).ok())?;
    configure_from_config(&cfg)
}
