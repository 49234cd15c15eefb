// SPDX-License-Identifier: GPL-2.0

//! System monitor: per-task resource accounting and CPU-load averages.
//!
//! The structured counterpart of what `top`/`free`/`df` would otherwise
//! read off `/proc`: per-owner-class heap usage (from [`crate::memory`]),
//! per-task open heap blocks, and smoothed CPU-load figures over several
//! windows. No CPUID/`lscpu`-style hardware report — that has no analogue
//! on a target with one fixed CPU.

use alloc::vec::Vec;

use crate::error::Result;
use crate::memory::{self, OwnerClass};
use crate::sync::Spinlock;
use crate::types::{Pid, Tid};

/// A snapshot of one task's resource footprint.
#[derive(Debug, Clone)]
pub struct TaskReport {
	pub tid: Tid,
	pub pid: Pid,
	pub heap_blocks: usize,
	pub heap_bytes: usize,
	pub cpu_time_ticks: u64,
}

/// A snapshot of the whole system's memory and load state.
#[derive(Debug, Clone)]
pub struct Snapshot {
	pub memory_total: usize,
	pub memory_used: usize,
	pub memory_free: usize,
	pub usage_by_class: [(OwnerClass, isize); 7],
	pub load_avg: [f32; 4],
	pub tasks: Vec<TaskReport>,
}

/// One exponentially-weighted moving average over a fixed window.
struct LoadWindow {
	window_ms: u64,
	alpha: f32,
	value: f32,
}

impl LoadWindow {
	/// `alpha = 1 - exp(-period / window)`: the standard discrete EWMA
	/// smoothing constant for a sampler that runs every `period_ms`
	/// against a window of `window_ms`. Derived rather than copied because
	/// the original implementation's constants aren't documented anywhere
	/// reachable from here.
	fn new(window_ms: u64, period_ms: u64) -> Self {
		let x = -(period_ms as f32) / (window_ms as f32);
		let alpha = 1.0 - libm_exp(x);
		Self {
			window_ms,
			alpha,
			value: 0.0,
		}
	}

	fn sample(&mut self, instantaneous: f32) {
		self.value += self.alpha * (instantaneous - self.value);
	}
}

/// Minimal `exp` for `no_std` without pulling in `libm` as a dependency,
/// good enough for smoothing a load average (not a precision requirement).
fn libm_exp(x: f32) -> f32 {
	// exp(x) via its Taylor series around 0; our inputs are small negative
	// fractions (period/window is always < 1 here) so this converges fast.
	let mut term = 1.0f32;
	let mut sum = 1.0f32;
	for n in 1..12 {
		term *= x / n as f32;
		sum += term;
	}
	sum
}

struct MonitorState {
	windows: [LoadWindow; 4],
	last_tick: u64,
	last_idle_ticks: u64,
}

const SAMPLE_PERIOD_MS: u64 = 1000;

static MONITOR: Spinlock<Option<MonitorState>> = Spinlock::new(None);

pub fn init() -> Result<()> {
	let windows = crate::config::LOAD_AVG_WINDOWS_MS;
	*MONITOR.lock() = Some(MonitorState {
		windows: [
			LoadWindow::new(windows[0], SAMPLE_PERIOD_MS),
			LoadWindow::new(windows[1], SAMPLE_PERIOD_MS),
			LoadWindow::new(windows[2], SAMPLE_PERIOD_MS),
			LoadWindow::new(windows[3], SAMPLE_PERIOD_MS),
		],
		last_tick: 0,
		last_idle_ticks: 0,
	});
	crate::info!("system monitor initialized");
	Ok(())
}

/// Sample the current instantaneous CPU load (fraction busy, 0.0-1.0) into
/// every averaging window. Meant to be called roughly every
/// `SAMPLE_PERIOD_MS` off the scheduler tick, with `idle_ticks` being the
/// cumulative tick count the idle task (pid 0) has accumulated so far.
pub fn sample(now_tick: u64, idle_ticks: u64) {
	let mut guard = MONITOR.lock();
	let Some(state) = guard.as_mut() else { return };

	let elapsed_ticks = now_tick.saturating_sub(state.last_tick);
	let idle_delta = idle_ticks.saturating_sub(state.last_idle_ticks);
	state.last_tick = now_tick;
	state.last_idle_ticks = idle_ticks;

	if elapsed_ticks == 0 {
		return;
	}
	let busy_fraction = 1.0 - (idle_delta as f32 / elapsed_ticks as f32);
	for window in state.windows.iter_mut() {
		window.sample(busy_fraction.clamp(0.0, 1.0));
	}
}

fn load_avg() -> [f32; 4] {
	let guard = MONITOR.lock();
	match guard.as_ref() {
		Some(state) => [
			state.windows[0].value,
			state.windows[1].value,
			state.windows[2].value,
			state.windows[3].value,
		],
		None => [0.0; 4],
	}
}

/// Produce a full system snapshot: memory usage, load averages, and a
/// per-task resource report.
pub fn snapshot() -> Snapshot {
	let usage_by_class = [
		(OwnerClass::Kernel, memory::get_usage(OwnerClass::Kernel)),
		(OwnerClass::FileSystem, memory::get_usage(OwnerClass::FileSystem)),
		(OwnerClass::Network, memory::get_usage(OwnerClass::Network)),
		(OwnerClass::Module, memory::get_usage(OwnerClass::Module)),
		(OwnerClass::Program, memory::get_usage(OwnerClass::Program)),
		(OwnerClass::Shared, memory::get_usage(OwnerClass::Shared)),
		(OwnerClass::Cache, memory::get_usage(OwnerClass::Cache)),
	];

	let tasks = crate::process::list_processes()
		.into_iter()
		.flat_map(|pid| {
			let blocks = crate::memory::kmalloc::blocks_for_process(pid);
			let heap_bytes: usize = blocks.iter().map(|(_, size)| size).sum();
			crate::process::with_process(pid, |p| p.tasks.clone())
				.unwrap_or_default()
				.into_iter()
				.filter_map(move |tid| {
					crate::process::with_task_mut(tid, |t| TaskReport {
						tid,
						pid,
						heap_blocks: blocks.len(),
						heap_bytes,
						cpu_time_ticks: t.cpu_time_ticks,
					})
				})
		})
		.collect();

	Snapshot {
		memory_total: memory::get_total(),
		memory_used: memory::get_used(),
		memory_free: memory::get_free(),
		usage_by_class,
		load_avg: load_avg(),
		tasks,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn load_window_converges_toward_sustained_input() {
		let mut window = LoadWindow::new(1_000, 1_000);
		for _ in 0..50 {
			window.sample(1.0);
		}
		assert!(window.value > 0.99, "expected convergence, got {}", window.value);
	}

	#[test]
	fn load_window_starts_at_zero() {
		let window = LoadWindow::new(60_000, 1_000);
		assert_eq!(window.value, 0.0);
	}
}
