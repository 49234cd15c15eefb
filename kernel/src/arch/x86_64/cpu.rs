// SPDX-License-Identifier: GPL-2.0

//! Architecture-level CPU control: reset, the monotonic tick source, and
//! interrupt priority grouping. This is the leaf module everything else in
//! the kernel is ultimately built on: it has no dependency on any other
//! kernel subsystem.

use core::sync::atomic::{AtomicU64, Ordering};

use super::port::outb;

static TICKS: AtomicU64 = AtomicU64::new(0);

/// Number of distinct interrupt priority groups the architecture layer
/// exposes to the scheduler (used to keep the timer tick itself
/// un-preemptable by lower-priority device interrupts).
pub const PRIORITY_GROUPS: u8 = 4;

/// Called once from the timer interrupt handler on every tick.
pub fn tick() {
	TICKS.fetch_add(1, Ordering::Relaxed);
}

/// Ticks elapsed since boot.
pub fn ticks() -> u64 {
	TICKS.load(Ordering::Relaxed)
}

/// Busy-wait for approximately `ms` milliseconds, polling the tick counter.
/// Used only before the scheduler is up; once tasks exist they should block
/// on `kernel::delay_ms` instead so other tasks can run.
pub fn busy_delay_ms(ms: u32) {
	let start = TICKS.load(Ordering::Relaxed);
	let target = start + (ms as u64 * crate::config::TICK_RATE_HZ as u64) / 1000;
	while TICKS.load(Ordering::Relaxed) < target {
		core::hint::spin_loop();
	}
}

/// Reset the machine. On real hardware this triggers a watchdog-style
/// reset via the keyboard controller's reset line; there is no portable
/// instruction for it on x86_64.
pub fn reset() -> ! {
	unsafe {
		outb(0x64, 0xFE);
	}
	loop {
		core::hint::spin_loop();
	}
}

/// Halt the CPU until the next interrupt.
pub fn halt() {
	unsafe {
		core::arch::asm!("hlt", options(nomem, nostack));
	}
}
