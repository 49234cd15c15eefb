// SPDX-License-Identifier: GPL-2.0

//! Memory management subsystem: a single flat heap (no per-task address
//! spaces or paging — virtual memory is out of scope for this kernel)
//! shared by every owner class the system monitor reports on.

pub mod kmalloc;

use core::sync::atomic::{AtomicIsize, AtomicUsize, Ordering};

use crate::error::Result;
use crate::types::Pid;

/// Who an allocation is charged to, for the system monitor's per-class
/// memory usage report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum OwnerClass {
	Kernel,
	FileSystem,
	Network,
	Module,
	Program,
	Shared,
	Cache,
}

impl OwnerClass {
	const COUNT: usize = 7;

	const fn index(self) -> usize {
		match self {
			OwnerClass::Kernel => 0,
			OwnerClass::FileSystem => 1,
			OwnerClass::Network => 2,
			OwnerClass::Module => 3,
			OwnerClass::Program => 4,
			OwnerClass::Shared => 5,
			OwnerClass::Cache => 6,
		}
	}
}

/// A single allocation's bookkeeping entry, keyed by pointer in the
/// allocation ledger so `kfree` can recover the layout and owner it was
/// allocated with.
#[derive(Debug, Clone, Copy)]
pub(crate) struct AllocationRecord {
	pub size: usize,
	pub align: usize,
	pub class: OwnerClass,
	pub owner_pid: Option<Pid>,
}

static USAGE_BY_CLASS: [AtomicIsize; OwnerClass::COUNT] = [
	AtomicIsize::new(0),
	AtomicIsize::new(0),
	AtomicIsize::new(0),
	AtomicIsize::new(0),
	AtomicIsize::new(0),
	AtomicIsize::new(0),
	AtomicIsize::new(0),
];

static HEAP_TOTAL: AtomicUsize = AtomicUsize::new(0);

pub(crate) fn charge(class: OwnerClass, bytes: usize) {
	USAGE_BY_CLASS[class.index()].fetch_add(bytes as isize, Ordering::Relaxed);
}

pub(crate) fn uncharge(class: OwnerClass, bytes: usize) {
	USAGE_BY_CLASS[class.index()].fetch_sub(bytes as isize, Ordering::Relaxed);
}

/// Bytes currently charged to `class`. Signed because a double-free or a
/// bookkeeping bug would otherwise wrap silently; a negative reading is a
/// detectable invariant violation instead.
pub fn get_usage(class: OwnerClass) -> isize {
	USAGE_BY_CLASS[class.index()].load(Ordering::Relaxed)
}

/// Total heap capacity, in bytes.
pub fn get_total() -> usize {
	HEAP_TOTAL.load(Ordering::Relaxed)
}

/// Bytes currently allocated across every owner class.
pub fn get_used() -> usize {
	USAGE_BY_CLASS
		.iter()
		.map(|c| c.load(Ordering::Relaxed).max(0) as usize)
		.sum()
}

pub fn get_free() -> usize {
	get_total().saturating_sub(get_used())
}

/// Initialize the memory subsystem: bring up the kernel heap allocator.
pub fn init() -> Result<()> {
	kmalloc::init()?;
	HEAP_TOTAL.store(crate::config::HEAP_SIZE, Ordering::Relaxed);
	crate::info!(
		"memory subsystem initialized, heap size {} bytes",
		crate::config::HEAP_SIZE
	);
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn charge_and_uncharge_are_symmetric() {
		let before = get_usage(OwnerClass::Cache);
		charge(OwnerClass::Cache, 128);
		assert_eq!(get_usage(OwnerClass::Cache), before + 128);
		uncharge(OwnerClass::Cache, 128);
		assert_eq!(get_usage(OwnerClass::Cache), before);
	}
}
