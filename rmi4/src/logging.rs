use core::fmt::Arguments;

use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, set_logger, set_max_level};
use spin::Once;

/// Where formatted log lines end up, e.g. a serial console writer.
pub type Sink = fn(Arguments);

pub struct Logger {
    sink: Sink,
}

impl Logger {
    pub const fn new(sink: Sink) -> Logger {
        Logger { sink }
    }
}

impl Log for Logger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let color = match record.level() {
            Level::Error => 31, // Red
            Level::Warn => 93,  // BrightYellow
            Level::Info => 20,  // White
            Level::Debug => 32, // Green
            Level::Trace => 90, // BrightBlack
        };
        (self.sink)(format_args!(
            "\u{1B}[{}m[{:}] {}\u{1B}[0m",
            color,
            record.level(),
            record.args(),
        ));
    }

    fn flush(&self) {}
}

static LOGGER: Once<Logger> = Once::new();

/// Install the global logger. Only the first call installs a sink.
pub fn init(sink: Sink, level: LevelFilter) -> Result<(), SetLoggerError> {
    let logger = LOGGER.call_once(|| Logger::new(sink));
    set_logger(logger)?;
    set_max_level(level);
    Ok(())
}
