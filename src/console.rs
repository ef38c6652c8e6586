//! Console output for ksync
//!
//! The console keeps a bounded in-memory transcript of kernel output. Under
//! the `std` feature every write is mirrored to stderr as well. The `log`
//! facade is routed here by [`KernelLogger`], which formats each record into
//! a fixed-size line before it reaches the console.

use core::fmt::{self, Write};

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use spin::Mutex;

use crate::config::{CONSOLE_CAPACITY, LOG_LINE_CAPACITY};

/// Console writer interface
pub struct Console {
    buffer: heapless::String<CONSOLE_CAPACITY>,
}

impl Console {
    /// Create a new console instance
    pub const fn new() -> Self {
        Console {
            buffer: heapless::String::new(),
        }
    }

    /// Write a string to the console
    ///
    /// When the transcript is full it is dropped and restarted, so the most
    /// recent output is always retained.
    pub fn write_str(&mut self, s: &str) {
        #[cfg(feature = "std")]
        {
            use std::io::Write as _;
            let _ = std::io::stderr().write_all(s.as_bytes());
        }

        for c in s.chars() {
            if self.buffer.push(c).is_err() {
                self.clear();
                let _ = self.buffer.push(c);
            }
        }
    }

    /// Current transcript
    pub fn contents(&self) -> &str {
        &self.buffer
    }

    /// Clear the console
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Write for Console {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        Console::write_str(self, s);
        Ok(())
    }
}

/// Global console instance
static CONSOLE: Mutex<Console> = Mutex::new(Console::new());

/// Print formatted text to console
pub fn print(args: fmt::Arguments) {
    let _ = CONSOLE.lock().write_fmt(args);
}

/// Run `f` over the console transcript
pub fn with_contents<R>(f: impl FnOnce(&str) -> R) -> R {
    f(CONSOLE.lock().contents())
}

/// Print macro for kernel use
#[macro_export]
macro_rules! kprint {
    ($($arg:tt)*) => {
        $crate::console::print(format_args!($($arg)*))
    };
}

/// Print with newline macro
#[macro_export]
macro_rules! kprintln {
    () => {
        $crate::kprint!("\n")
    };
    ($($arg:tt)*) => {
        $crate::console::print(format_args!("{}\n", format_args!($($arg)*)))
    };
}

// ============================================================================
// Logger
// ============================================================================

/// One formatted log line
type LogLine = heapless::String<LOG_LINE_CAPACITY>;

/// Writer that keeps what fits and silently drops the rest
struct Truncate<'a>(&'a mut LogLine);

impl fmt::Write for Truncate<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for c in s.chars() {
            if self.0.push(c).is_err() {
                break;
            }
        }
        Ok(())
    }
}

/// `log` backend writing to the kernel console
pub struct KernelLogger;

static LOGGER: KernelLogger = KernelLogger;

impl KernelLogger {
    /// Render a record as `[LEVEL target] message`, truncated to one line
    pub fn format(record: &Record) -> LogLine {
        let mut line = LogLine::new();
        let _ = write!(
            Truncate(&mut line),
            "[{:<5} {}] {}",
            record.level(),
            record.target(),
            record.args()
        );
        if line.push('\n').is_err() {
            line.pop();
            let _ = line.push('\n');
        }
        line
    }
}

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = Self::format(record);
        CONSOLE.lock().write_str(&line);
    }

    fn flush(&self) {}
}

/// Initialize the console subsystem and install the kernel logger
pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
    log::set_logger(&LOGGER)?;
    log::set_max_level(level);
    Ok(())
}
