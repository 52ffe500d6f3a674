//! Console output for the deduplication pipeline: an env_logger build
//! bridged with indicatif, so the record-progress spinner and log lines do
//! not clobber one another.

use std::io::Write;

use env_logger::fmt::{Color, Formatter};
use env_logger::{Builder, Env};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use log::{Level, LevelFilter, Record};
use once_cell::sync::OnceCell;

/// Environment variable overriding the verbosity picked on the command line.
pub const LOG_ENV_VAR: &str = "FAMDUP_LOG";

static PROGRESS: OnceCell<MultiProgress> = OnceCell::new();

/// Map `-v` occurrences onto a level filter. Warnings are on by default;
/// `--quiet` callers pass 0 to keep errors only.
fn level_filter(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Error,
        1 => LevelFilter::Warn,
        2 => LevelFilter::Info,
        3 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// One log line.
///
/// A deduplication run is minutes, not days: a wall-clock time of day beats
/// a full date stamp. Stage targets (`dedupe::index`, `famdup_io::read`, ..)
/// only matter when debugging one pipeline stage, so they appear from Debug
/// down; errors are fatal to the run and point back at their call site.
fn format_record(buf: &mut Formatter, record: &Record<'_>) -> std::io::Result<()> {
    let mut level_style = buf.style();
    let color = match record.level() {
        Level::Error => Color::Red,
        Level::Warn  => Color::Yellow,
        Level::Info  => Color::Green,
        Level::Debug => Color::Blue,
        Level::Trace => Color::Cyan,
    };
    level_style.set_color(color).set_bold(true);

    write!(
        buf,
        "[{} {:>5}] ",
        chrono::Local::now().format("%H:%M:%S"),
        level_style.value(record.level())
    )?;
    if record.level() >= Level::Debug {
        write!(buf, "({}) ", record.target())?;
    }
    write!(buf, "{}", record.args())?;
    if record.level() == Level::Error {
        write!(buf, " [{}:{}]", record.file().unwrap_or("?"), record.line().unwrap_or(0))?;
    }
    writeln!(buf)
}

/// Install the global logger and the progress-bar anchor. The `FAMDUP_LOG`
/// environment variable overrides `verbosity`.
///
/// Calling `init` again only adjusts the level filter.
pub fn init(verbosity: u8) {
    if PROGRESS.get().is_some() {
        return set_verbosity(verbosity);
    }
    let logger = Builder::new()
        .filter_level(level_filter(verbosity))
        .format(format_record)
        .parse_env(Env::default().filter(LOG_ENV_VAR))
        .build();

    let progress = MultiProgress::new();
    if LogWrapper::new(progress.clone(), logger).try_init().is_ok() {
        let _ = PROGRESS.set(progress);
    }
}

/// Tighten or relax the installed filter.
pub fn set_verbosity(verbosity: u8) {
    log::set_max_level(level_filter(verbosity));
}

/// A spinner counting alignment records as the stream goes by, drawn through
/// the log bridge. `None` before `init` (unit tests run without a console
/// logger), in which case callers simply skip drawing it.
pub fn record_spinner() -> Option<ProgressBar> {
    let progress = PROGRESS.get()?;
    let style = ProgressStyle::with_template("{spinner} {human_pos} records scanned")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    Some(progress.add(ProgressBar::new_spinner().with_style(style)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_filters() {
        assert_eq!(level_filter(0), LevelFilter::Error);
        assert_eq!(level_filter(1), LevelFilter::Warn);
        assert_eq!(level_filter(2), LevelFilter::Info);
        assert_eq!(level_filter(3), LevelFilter::Debug);
        assert_eq!(level_filter(4), LevelFilter::Trace);
        assert_eq!(level_filter(u8::MAX), LevelFilter::Trace);
    }

    #[test]
    fn init_only_adjusts_the_filter_when_repeated() {
        init(1);
        init(3);
        assert_eq!(log::max_level(), LevelFilter::Debug);
        set_verbosity(0);
        assert_eq!(log::max_level(), LevelFilter::Error);
        assert!(record_spinner().is_some());
    }
}
