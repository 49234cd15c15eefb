// SPDX-License-Identifier: GPL-2.0

//! Kernel logging and debugging system.
//!
//! A ring-buffered logger routed through the console, exposed to the rest
//! of the kernel via the `info!`/`warn!`/`error!` macros in [`crate::
//! prelude`] and, for anything written against the ecosystem-standard
//! `log` facade, via a [`log::Log`] implementation registered at boot.

use alloc::{format, string::String, vec, vec::Vec};

use crate::error::Result;
use crate::sync::Spinlock;

/// Log levels (kept close to the classic syslog priority set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
	Emergency = 0,
	Alert = 1,
	Critical = 2,
	Error = 3,
	Warning = 4,
	Notice = 5,
	Info = 6,
	Debug = 7,
}

impl LogLevel {
	pub fn as_str(&self) -> &'static str {
		match self {
			LogLevel::Emergency => "EMERG",
			LogLevel::Alert => "ALERT",
			LogLevel::Critical => "CRIT",
			LogLevel::Error => "ERROR",
			LogLevel::Warning => "WARN",
			LogLevel::Notice => "NOTICE",
			LogLevel::Info => "INFO",
			LogLevel::Debug => "DEBUG",
		}
	}

	fn from_log_level(level: log::Level) -> Self {
		match level {
			log::Level::Error => LogLevel::Error,
			log::Level::Warn => LogLevel::Warning,
			log::Level::Info => LogLevel::Info,
			log::Level::Debug => LogLevel::Debug,
			log::Level::Trace => LogLevel::Debug,
		}
	}
}

/// Log entry structure
#[derive(Debug, Clone)]
pub struct LogEntry {
	pub level: LogLevel,
	pub timestamp: u64,
	pub pid: Option<u32>,
	pub module: String,
	pub message: String,
}

impl LogEntry {
	pub fn new(level: LogLevel, module: String, message: String) -> Self {
		Self {
			level,
			timestamp: crate::scheduler::tick_count(),
			pid: crate::process::current_process().map(|p| p.0),
			module,
			message,
		}
	}

	pub fn format(&self) -> String {
		format!(
			"[{:>5}] [{:>10}] {}: {}\n",
			self.level.as_str(),
			self.timestamp,
			self.module,
			self.message
		)
	}
}

/// Logger configuration
#[derive(Debug)]
pub struct LoggerConfig {
	pub min_level: LogLevel,
	pub max_entries: usize,
	pub console_output: bool,
}

impl LoggerConfig {
	pub fn new() -> Self {
		Self {
			min_level: LogLevel::Info,
			max_entries: 1000,
			console_output: true,
		}
	}

	pub fn with_level(mut self, level: LogLevel) -> Self {
		self.min_level = level;
		self
	}

	pub fn with_max_entries(mut self, max: usize) -> Self {
		self.max_entries = max;
		self
	}
}

/// Logging statistics
#[derive(Debug, Default, Clone, Copy)]
pub struct LogStats {
	pub total_entries: u64,
	pub entries_by_level: [u64; 8],
	pub dropped_entries: u64,
}

/// Ring-buffered kernel logger.
pub struct KernelLogger {
	config: LoggerConfig,
	entries: Vec<LogEntry>,
	stats: LogStats,
}

impl KernelLogger {
	pub const fn new() -> Self {
		Self {
			config: LoggerConfig {
				min_level: LogLevel::Info,
				max_entries: 1000,
				console_output: true,
			},
			entries: Vec::new(),
			stats: LogStats {
				total_entries: 0,
				entries_by_level: [0; 8],
				dropped_entries: 0,
			},
		}
	}

	pub fn init(&mut self, config: LoggerConfig) {
		self.config = config;
	}

	pub fn log(&mut self, level: LogLevel, module: &str, message: &str) {
		if level > self.config.min_level {
			return;
		}

		let entry = LogEntry::new(level, module.into(), message.into());
		self.stats.total_entries += 1;
		self.stats.entries_by_level[level as usize] += 1;

		if self.config.console_output {
			crate::print!("{}", entry.format());
		}

		if self.entries.len() >= self.config.max_entries {
			self.entries.remove(0);
			self.stats.dropped_entries += 1;
		}
		self.entries.push(entry);
	}

	pub fn get_entries(&self) -> &[LogEntry] {
		&self.entries
	}

	pub fn clear(&mut self) {
		self.entries.clear();
	}

	pub fn get_stats(&self) -> LogStats {
		self.stats
	}

	pub fn set_level(&mut self, level: LogLevel) {
		self.config.min_level = level;
	}

	pub fn dump_buffer(&self) -> String {
		let mut output = String::new();
		for entry in &self.entries {
			output.push_str(&entry.format());
		}
		output
	}
}

static KERNEL_LOGGER: Spinlock<KernelLogger> = Spinlock::new(KernelLogger::new());

/// Bridges the `log` crate's facade onto [`KERNEL_LOGGER`] so any
/// dependency that logs through `log::info!`/`log::error!`/... lands in the
/// same ring buffer and console sink as the kernel's own `info!`/`warn!`.
struct LogBridge;

impl log::Log for LogBridge {
	fn enabled(&self, _metadata: &log::Metadata) -> bool {
		true
	}

	fn log(&self, record: &log::Record) {
		let level = LogLevel::from_log_level(record.level());
		KERNEL_LOGGER
			.lock()
			.log(level, record.target(), &format!("{}", record.args()));
	}

	fn flush(&self) {}
}

static LOG_BRIDGE: LogBridge = LogBridge;

/// Initialize kernel logging and register the `log` facade bridge.
pub fn init_logging() -> Result<()> {
	{
		let mut logger = KERNEL_LOGGER.lock();
		let config = LoggerConfig::new().with_level(LogLevel::Info).with_max_entries(2000);
		logger.init(config);
	}

	// `set_logger` fails only if a logger was already installed; harmless
	// to ignore on a system that never re-initializes logging twice.
	let _ = log::set_logger(&LOG_BRIDGE).map(|()| log::set_max_level(log::LevelFilter::Debug));

	log_info("logging", "kernel logging system initialized");
	Ok(())
}

pub fn log(level: LogLevel, module: &str, message: &str) {
	KERNEL_LOGGER.lock().log(level, module, message);
}

pub fn log_emergency(module: &str, message: &str) {
	log(LogLevel::Emergency, module, message);
}

pub fn log_alert(module: &str, message: &str) {
	log(LogLevel::Alert, module, message);
}

pub fn log_critical(module: &str, message: &str) {
	log(LogLevel::Critical, module, message);
}

pub fn log_error(module: &str, message: &str) {
	log(LogLevel::Error, module, message);
}

pub fn log_warning(module: &str, message: &str) {
	log(LogLevel::Warning, module, message);
}

pub fn log_notice(module: &str, message: &str) {
	log(LogLevel::Notice, module, message);
}

pub fn log_info(module: &str, message: &str) {
	log(LogLevel::Info, module, message);
}

pub fn log_debug(module: &str, message: &str) {
	log(LogLevel::Debug, module, message);
}

pub fn get_log_stats() -> LogStats {
	KERNEL_LOGGER.lock().get_stats()
}

pub fn dump_log_buffer() -> String {
	KERNEL_LOGGER.lock().dump_buffer()
}

pub fn clear_log_buffer() {
	KERNEL_LOGGER.lock().clear();
}

pub fn set_log_level(level: LogLevel) {
	KERNEL_LOGGER.lock().set_level(level);
}

#[macro_export]
macro_rules! debug_print {
    ($category:expr, $($arg:tt)*) => {
        $crate::logging::log_debug(stringify!($category), &alloc::format!($($arg)*));
    };
}

#[macro_export]
macro_rules! kernel_assert {
	($cond:expr) => {
		if !$cond {
			$crate::logging::log_critical(
				"assert",
				&alloc::format!("assertion failed: {} at {}:{}", stringify!($cond), file!(), line!()),
			);
			panic!("kernel assertion failed: {}", stringify!($cond));
		}
	};
	($cond:expr, $msg:expr) => {
		if !$cond {
			$crate::logging::log_critical(
				"assert",
				&alloc::format!(
					"assertion failed: {} - {} at {}:{}",
					stringify!($cond),
					$msg,
					file!(),
					line!()
				),
			);
			panic!("kernel assertion failed: {} - {}", stringify!($cond), $msg);
		}
	};
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn logger_respects_min_level_filter() {
		let mut logger = KernelLogger::new();
		logger.init(LoggerConfig::new().with_level(LogLevel::Warning));
		logger.log(LogLevel::Debug, "test", "should be dropped");
		assert_eq!(logger.get_stats().total_entries, 0);
		logger.log(LogLevel::Error, "test", "should be kept");
		assert_eq!(logger.get_stats().total_entries, 1);
	}

	#[test]
	fn ring_buffer_drops_oldest_when_full() {
		let mut logger = KernelLogger::new();
		logger.init(LoggerConfig::new().with_level(LogLevel::Debug).with_max_entries(2));
		logger.log(LogLevel::Info, "a", "1");
		logger.log(LogLevel::Info, "a", "2");
		logger.log(LogLevel::Info, "a", "3");
		assert_eq!(logger.get_entries().len(), 2);
		assert_eq!(logger.get_stats().dropped_entries, 1);
	}
}
