// SPDX-License-Identifier: GPL-2.0

//! dnx-rtos kernel crate.
//!
//! A small preemptive multitasking kernel for resource-constrained 32-bit
//! targets: fixed-priority scheduler, a flat heap with per-owner-class
//! accounting, a mountable VFS, a flat major/minor driver table, and pipes
//! plus a message bus for inter-process communication.

#![no_std]
#![feature(alloc_error_handler)]
#![feature(panic_info_message)]
#![feature(asm_const)]
#![feature(const_mut_refs)]
#![feature(custom_test_frameworks)]
#![feature(allocator_api)]
#![test_runner(crate::test_runner)]
#![reexport_test_harness_main = "test_main"]

extern crate alloc;

pub mod arch;
pub mod config;
pub mod console;
pub mod driver;
pub mod drivers_init;
pub mod error;
pub mod fs;
pub mod init;
pub mod ipc;
pub mod logging;
pub mod memory;
pub mod monitor;
pub mod panic;
pub mod prelude;
pub mod primitives;
pub mod process;
pub mod scheduler;
pub mod sync;
pub mod types;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = "dnx-rtos";

/// Kernel entry point, called from the architecture-specific startup code
/// once the CPU is in a state where Rust can run (stack set up, BSS
/// zeroed).
#[no_mangle]
pub extern "C" fn kernel_main() -> ! {
	early_kernel_init();

	if let Err(e) = subsystem_init() {
		panic!("subsystem initialization failed: {}", e);
	}

	init::main_init();

	panic!("kernel_main returned unexpectedly");
}

/// Bring up the console before anything else, so every later failure can at
/// least be reported.
fn early_kernel_init() {
	if console::init().is_err() {
		loop {
			core::hint::spin_loop();
		}
	}
	crate::console::write_str("\nBooting dnx-rtos...\n");
}

/// Initialize every kernel subsystem in dependency order: memory before
/// anything that allocates, the scheduler and process table before any task
/// can be spawned, then the VFS/driver/IPC/monitor layers a spawned task's
/// program would actually use.
fn subsystem_init() -> Result<(), error::Error> {
	let _ = logging::init_logging();
	memory::init()?;
	scheduler::init()?;
	process::init()?;
	fs::init()?;
	ipc::init()?;
	monitor::init()?;
	drivers_init::init_drivers()?;
	Ok(())
}

#[cfg(test)]
fn test_runner(tests: &[&dyn Fn()]) {
	println!("Running {} tests", tests.len());
	for test in tests {
		test();
	}
	exit_qemu(QemuExitCode::Success);
}

#[cfg(test)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum QemuExitCode {
	Success = 0x10,
	Failed = 0x11,
}

#[cfg(test)]
pub fn exit_qemu(exit_code: QemuExitCode) {
	use arch::x86_64::port::Port;

	unsafe {
		let mut port = Port::new(0xf4);
		port.write(exit_code as u32);
	}
}

#[alloc_error_handler]
fn alloc_error_handler(layout: alloc::alloc::Layout) -> ! {
	panic!("allocation error: {:?}", layout)
}
