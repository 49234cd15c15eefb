// SPDX-License-Identifier: GPL-2.0

//! Compile-time kernel configuration.
//!
//! Centralizes the constants a dnx-rtos build-time configuration header
//! (`config.h`) would otherwise scatter across the tree: tick rate, heap
//! size, task limits, and the like. A board-support crate that wants
//! different values recompiles the kernel crate with this file edited, the
//! same way the original C build selects its header through `CONFIG_*`
//! macros.

/// Scheduler tick frequency, in Hz.
pub const TICK_RATE_HZ: u32 = 1000;

/// Total heap size managed by the kernel allocator, in bytes.
pub const HEAP_SIZE: usize = 4 * 1024 * 1024;

/// Maximum number of simultaneously existing tasks (processes + threads).
pub const MAX_TASKS: usize = 256;

/// Number of distinct scheduling priority levels.
pub const PRIORITY_LEVELS: usize = 8;

/// Minimum stack size a task may be spawned with, in bytes.
pub const MIN_STACK_SIZE: usize = 1024;

/// Maximum stack size a task may be spawned with, in bytes.
pub const MAX_STACK_SIZE: usize = 64 * 1024;

/// Maximum number of file descriptors open simultaneously per process.
pub const MAX_OPEN_FILES: usize = 32;

/// Maximum number of mounted file systems.
pub const MAX_MOUNTS: usize = 16;

/// Maximum symlink expansion recursion depth, to bound `open()` against
/// symlink loops.
pub const MAX_SYMLINK_DEPTH: usize = 1;

/// Maximum path component length, in bytes.
pub const MAX_NAME_LEN: usize = 255;

/// How long an undelivered message bus entry survives before the garbage
/// collector reclaims it, in milliseconds.
pub const MBUS_GARBAGE_LIVE_TIME_MS: u64 = 2000;

/// CPU load averaging windows, in milliseconds, matching the conventional
/// 1/5/15-minute load-average report plus a fast 1-second window.
pub const LOAD_AVG_WINDOWS_MS: [u64; 4] = [1_000, 60_000, 300_000, 900_000];
