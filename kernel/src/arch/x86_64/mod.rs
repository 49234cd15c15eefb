// SPDX-License-Identifier: GPL-2.0

//! x86_64 architecture support
//!
//! Backs the scheduler's tick/context-switch/halt calls
//! ([`cpu::tick`]/[`cpu::ticks`]/[`cpu::halt`], [`context::switch_context`])
//! and the QEMU test-exit port. Register-controller-level detail (GDT/IDT/PIC
//! programming, paging) is a board-support concern and lives outside the
//! kernel crate; only the pieces the scheduler needs directly are kept here.

pub mod context;
pub mod cpu;
pub mod port;
