// SPDX-License-Identifier: GPL-2.0

//! Kernel initialization.
//!
//! By the time [`main_init`] runs, [`crate::subsystem_init`] has already
//! brought up memory, the scheduler, the process table, the VFS, IPC, and
//! the system monitor in that order; what's left is printing the boot
//! banner and entering the idle loop that lets the scheduler preempt it.

/// Print the boot banner and enter the idle loop.
pub fn main_init() -> ! {
	crate::console::write_str("\n");
	crate::console::write_str("========================================\n");
	crate::console::write_str("  dnx-rtos\n");
	crate::console::write_str("========================================\n");
	crate::info!("kernel initialization complete, entering idle loop");

	idle_loop()
}

/// The idle task: yield to the scheduler every tick, halting the CPU
/// in between to save power when nothing else is runnable. Every tick it
/// doesn't hand off to another task counts as idle time for the monitor's
/// load average; roughly once a second it also samples the load windows
/// and sweeps expired mbus messages.
fn idle_loop() -> ! {
	let mut idle_ticks: u64 = 0;

	loop {
		crate::scheduler::on_tick();
		idle_ticks += 1;

		let now_tick = crate::scheduler::tick_count();
		if now_tick % crate::config::TICK_RATE_HZ as u64 == 0 {
			crate::monitor::sample(now_tick, idle_ticks);
			crate::ipc::mbus_collect_garbage(
				crate::types::Jiffies(now_tick).as_millis(),
			);
		}

		crate::scheduler::yield_now();
		crate::arch::x86_64::cpu::halt();
	}
}
