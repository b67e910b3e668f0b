//! TA trace logging subsystem.
//!
//! A Trusted Application has no console of its own: every trace line is
//! handed to a [`TraceSink`] (on target, the `utee_log` syscall). The sink
//! is installed once at startup; until then trace output is dropped.
//!
//! Records emitted through the `log` facade by dependencies are routed
//! into the same sink and filtered by the same level.
#![cfg_attr(not(test), no_std)]

use core::fmt;
use core::sync::atomic::{AtomicU8, Ordering};

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => " INFO",
            Level::Warn => " WARN",
            Level::Error => "ERROR",
        }
    }

    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Level::Trace,
            1 => Level::Debug,
            2 => Level::Info,
            3 => Level::Warn,
            _ => Level::Error,
        }
    }

    fn from_log(level: log::Level) -> Self {
        match level {
            log::Level::Trace => Level::Trace,
            log::Level::Debug => Level::Debug,
            log::Level::Info => Level::Info,
            log::Level::Warn => Level::Warn,
            log::Level::Error => Level::Error,
        }
    }

    fn to_log_filter(self) -> log::LevelFilter {
        match self {
            Level::Trace => log::LevelFilter::Trace,
            Level::Debug => log::LevelFilter::Debug,
            Level::Info => log::LevelFilter::Info,
            Level::Warn => log::LevelFilter::Warn,
            Level::Error => log::LevelFilter::Error,
        }
    }
}

/// Destination of formatted trace output.
pub trait TraceSink: Sync {
    fn write_str(&self, s: &str);
}

/// Level-filtered logger writing into a single [`TraceSink`].
pub struct Logger {
    threshold: AtomicU8,
    sink: spin::Once<&'static dyn TraceSink>,
}

impl Logger {
    pub const fn new() -> Self {
        Self {
            threshold: AtomicU8::new(Level::Info as u8),
            sink: spin::Once::new(),
        }
    }

    /// Install the sink. Only the first installation takes effect.
    pub fn install(&self, sink: &'static dyn TraceSink) -> bool {
        let mut installed = false;
        self.sink.call_once(|| {
            installed = true;
            sink
        });
        installed
    }

    pub fn set_level(&self, level: Level) {
        self.threshold.store(level as u8, Ordering::Relaxed);
    }

    pub fn level(&self) -> Level {
        Level::from_u8(self.threshold.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn enabled(&self, level: Level) -> bool {
        level as u8 >= self.threshold.load(Ordering::Relaxed)
    }

    /// Emit one line: `[LEVEL] message\n`.
    pub fn log(&self, level: Level, args: fmt::Arguments) {
        if !self.enabled(level) {
            return;
        }
        if let Some(sink) = self.sink.get() {
            let mut out = SinkWriter(*sink);
            let _ = fmt::Write::write_fmt(&mut out, format_args!("[{}] {}\n", level.as_str(), args));
        }
    }

    /// Emit raw text without level prefix or filtering.
    pub fn print(&self, args: fmt::Arguments) {
        if let Some(sink) = self.sink.get() {
            let _ = fmt::Write::write_fmt(&mut SinkWriter(*sink), args);
        }
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

impl log::Log for Logger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        Logger::enabled(self, Level::from_log(metadata.level()))
    }

    fn log(&self, record: &log::Record) {
        Logger::log(self, Level::from_log(record.level()), *record.args());
    }

    fn flush(&self) {}
}

struct SinkWriter(&'static dyn TraceSink);

impl fmt::Write for SinkWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.write_str(s);
        Ok(())
    }
}

// ── Global logger ───────────────────────────────────────────────

static LOGGER: Logger = Logger::new();

/// Install the global trace sink and hook up the `log` facade.
pub fn init(sink: &'static dyn TraceSink) {
    if LOGGER.install(sink) {
        // Another logger may already own the facade; our macros still work.
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(LOGGER.level().to_log_filter());
    }
}

/// Set the global trace threshold (the TA header's trace level).
pub fn set_level(level: Level) {
    LOGGER.set_level(level);
    log::set_max_level(level.to_log_filter());
}

/// Current global trace threshold.
pub fn level() -> Level {
    LOGGER.level()
}

/// Log a message with a specific level
pub fn log(level: Level, args: fmt::Arguments) {
    LOGGER.log(level, args);
}

/// Print to the sink without formatting
pub fn print(args: fmt::Arguments) {
    LOGGER.print(args);
}

/// Log at TRACE level
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {
        $crate::log($crate::Level::Trace, format_args!($($arg)*))
    };
}

/// Log at DEBUG level
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        $crate::log($crate::Level::Debug, format_args!($($arg)*))
    };
}

/// Log at INFO level
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::log($crate::Level::Info, format_args!($($arg)*))
    };
}

/// Log at WARN level
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        $crate::log($crate::Level::Warn, format_args!($($arg)*))
    };
}

/// Log at ERROR level
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::log($crate::Level::Error, format_args!($($arg)*))
    };
}

/// Print without newline
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {
        $crate::print(format_args!($($arg)*))
    };
}

/// Print with newline
#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => {{
        $crate::print(format_args!($($arg)*));
        $crate::print(format_args!("\n"));
    }};
}
