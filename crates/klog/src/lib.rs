//! Kernel logging subsystem.
//!
//! Levelled macros (`klog::info!` and friends) write straight to the
//! PL011 UART through `khal::serial`. Crates below klog (khal itself) log
//! through the `log` facade; [`init`] installs a bridge so those records
//! land on the same port with the same prefix.
#![cfg_attr(not(test), no_std)]

use core::fmt;

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
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

    pub fn color(&self) -> &'static str {
        match self {
            Level::Trace => "\x1b[90m", // Gray
            Level::Debug => "\x1b[36m", // Cyan
            Level::Info => "\x1b[32m",  // Green
            Level::Warn => "\x1b[33m",  // Yellow
            Level::Error => "\x1b[31m", // Red
        }
    }

    fn to_filter(self) -> log::LevelFilter {
        match self {
            Level::Trace => log::LevelFilter::Trace,
            Level::Debug => log::LevelFilter::Debug,
            Level::Info => log::LevelFilter::Info,
            Level::Warn => log::LevelFilter::Warn,
            Level::Error => log::LevelFilter::Error,
        }
    }
}

impl From<log::Level> for Level {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Trace => Level::Trace,
            log::Level::Debug => Level::Debug,
            log::Level::Info => Level::Info,
            log::Level::Warn => Level::Warn,
            log::Level::Error => Level::Error,
        }
    }
}

/// Messages below this level are compiled out of the macros.
#[cfg(feature = "verbose")]
pub const MAX_LEVEL: Level = Level::Trace;
#[cfg(not(feature = "verbose"))]
pub const MAX_LEVEL: Level = Level::Info;

/// Whether messages at `level` are emitted.
#[inline(always)]
pub const fn enabled(level: Level) -> bool {
    level as u8 >= MAX_LEVEL as u8
}

/// Bridges `log` facade records onto the UART.
struct KernelLogger;

impl log::Log for KernelLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        enabled(metadata.level().into())
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            log(record.level().into(), *record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: KernelLogger = KernelLogger;

/// Initialize the kernel logger (sets up serial port, installs the facade bridge)
pub fn init() {
    khal::serial::init();
    // Only fails if a logger is already installed, which leaves the
    // existing one in place.
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(MAX_LEVEL.to_filter());
    }
}

/// Log a message with a specific level
pub fn log(level: Level, args: fmt::Arguments) {
    khal::serial::write_str(level.color());
    khal::serial::write_str("[");
    khal::serial::write_str(level.as_str());
    khal::serial::write_str("]\x1b[0m ");
    khal::serial::write_fmt(args);
    khal::serial::write_str("\n");
}

/// Print to serial without formatting
pub fn print(args: fmt::Arguments) {
    khal::serial::write_fmt(args);
}

/// Log at TRACE level
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {
        if $crate::enabled($crate::Level::Trace) {
            $crate::log($crate::Level::Trace, format_args!($($arg)*))
        }
    };
}

/// Log at DEBUG level
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        if $crate::enabled($crate::Level::Debug) {
            $crate::log($crate::Level::Debug, format_args!($($arg)*))
        }
    };
}

/// Log at INFO level
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        if $crate::enabled($crate::Level::Info) {
            $crate::log($crate::Level::Info, format_args!($($arg)*))
        }
    };
}

/// Log at WARN level
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        if $crate::enabled($crate::Level::Warn) {
            $crate::log($crate::Level::Warn, format_args!($($arg)*))
        }
    };
}

/// Log at ERROR level
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        if $crate::enabled($crate::Level::Error) {
            $crate::log($crate::Level::Error, format_args!($($arg)*))
        }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_order_by_severity() {
        assert!(Level::Trace < Level::Debug);
        assert!(Level::Warn < Level::Error);
    }

    #[test]
    fn threshold_filters_below_max_level() {
        assert!(enabled(Level::Error));
        assert!(enabled(MAX_LEVEL));
        #[cfg(not(feature = "verbose"))]
        assert!(!enabled(Level::Debug));
    }

    #[test]
    fn facade_levels_map_one_to_one() {
        assert_eq!(Level::from(log::Level::Warn), Level::Warn);
        assert_eq!(Level::Trace.to_filter(), log::LevelFilter::Trace);
    }

    #[test]
    fn macros_expand_without_a_serial_port() {
        info!("booting {}", 1);
        trace!("dropped");
        println!("value = {:#x}", 0x1000);
    }
}
