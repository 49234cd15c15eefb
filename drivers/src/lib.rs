// SPDX-License-Identifier: GPL-2.0

//! Driver fixtures: `/dev/null`, `/dev/zero`, `/dev/full`, and a RAM-backed
//! loop device, each implementing [`kernel::driver::DriverOps`] and
//! registered under a fixed `(major, minor)`.

#![no_std]

extern crate alloc;

pub mod full;
pub mod loop_dev;
pub mod null;
pub mod zero;

use kernel::error::Result;
use kernel::types::DeviceId;

/// Register the fixture driver set under conventional device numbers:
/// major 1 for memory-style devices (null, zero, full), major 2 for the
/// loop device.
pub fn register_all() -> Result<()> {
	kernel::driver::register(
		DeviceId::new(1, 0),
		"null".into(),
		alloc::boxed::Box::new(null::NullDevice),
	)?;
	kernel::driver::register(
		DeviceId::new(1, 1),
		"zero".into(),
		alloc::boxed::Box::new(zero::ZeroDevice),
	)?;
	kernel::driver::register(
		DeviceId::new(1, 2),
		"full".into(),
		alloc::boxed::Box::new(full::FullDevice),
	)?;
	kernel::driver::register(
		DeviceId::new(2, 0),
		"loop0".into(),
		alloc::boxed::Box::new(loop_dev::LoopDevice::new(64 * 1024)),
	)?;
	Ok(())
}
