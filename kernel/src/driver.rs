// SPDX-License-Identifier: GPL-2.0

//! Driver model: a flat table of character drivers keyed by `(major,
//! minor)`, grounded on dnx-rtos's `_drvreg_t` driver registry (`major`,
//! `minor`, an interface vtable, and an open-instance count). No bus
//! enumeration, no PCI/USB matching, no hotplug — drivers are registered
//! once at boot by the board-support init sequence and addressed purely by
//! device number thereafter.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::string::String;

use crate::error::{Error, Result};
use crate::fs::Stat;
use crate::sync::Spinlock;
use crate::types::{DeviceId, IoctlRequest};

/// Operations a character driver implements, addressed by device number
/// rather than by path the way a filesystem's [`crate::fs::FsOps`] is.
pub trait DriverOps: Send + Sync {
	fn open(&self) -> Result<()> {
		Ok(())
	}
	fn close(&self) -> Result<()> {
		Ok(())
	}
	fn read(&self, buf: &mut [u8], offset: u64) -> Result<usize>;
	fn write(&self, buf: &[u8], offset: u64) -> Result<usize>;
	/// Drivers reject a request whose group doesn't match their own
	/// (`EBADRQC`) — see [`IoctlRequest`].
	fn ioctl(&self, req: IoctlRequest, arg: usize) -> Result<isize> {
		let _ = (req, arg);
		Err(Error::ENOTTY)
	}
	fn flush(&self) -> Result<()> {
		Ok(())
	}
	fn stat(&self) -> Result<Stat>;
	/// The ioctl group this driver accepts; [`ioctl_checked`] rejects any
	/// request outside it before calling into the driver.
	fn ioctl_group(&self) -> u16;
}

struct DriverEntry {
	name: String,
	ops: Box<dyn DriverOps>,
	open_count: core::sync::atomic::AtomicUsize,
}

static DRIVERS: Spinlock<BTreeMap<DeviceId, DriverEntry>> = Spinlock::new(BTreeMap::new());

/// Register a driver under `id`. `EEXIST` if that device number is already
/// taken.
pub fn register(id: DeviceId, name: String, ops: Box<dyn DriverOps>) -> Result<()> {
	let mut drivers = DRIVERS.lock();
	if drivers.contains_key(&id) {
		return Err(Error::EEXIST);
	}
	drivers.insert(
		id,
		DriverEntry {
			name,
			ops,
			open_count: core::sync::atomic::AtomicUsize::new(0),
		},
	);
	crate::info!("driver registered: {} ({})", id, drivers[&id].name);
	Ok(())
}

/// Unregister a driver. `EBUSY` while any open instance remains.
pub fn unregister(id: DeviceId) -> Result<()> {
	let mut drivers = DRIVERS.lock();
	let entry = drivers.get(&id).ok_or(Error::ENODEV)?;
	if entry.open_count.load(core::sync::atomic::Ordering::Relaxed) > 0 {
		return Err(Error::EBUSY);
	}
	drivers.remove(&id);
	Ok(())
}

pub fn open(id: DeviceId) -> Result<()> {
	let drivers = DRIVERS.lock();
	let entry = drivers.get(&id).ok_or(Error::ENODEV)?;
	entry.ops.open()?;
	entry.open_count.fetch_add(1, core::sync::atomic::Ordering::Relaxed);
	Ok(())
}

pub fn close(id: DeviceId) -> Result<()> {
	let drivers = DRIVERS.lock();
	let entry = drivers.get(&id).ok_or(Error::ENODEV)?;
	entry.ops.close()?;
	entry.open_count.fetch_sub(1, core::sync::atomic::Ordering::Relaxed);
	Ok(())
}

pub fn read(id: DeviceId, buf: &mut [u8], offset: u64) -> Result<usize> {
	let drivers = DRIVERS.lock();
	drivers.get(&id).ok_or(Error::ENODEV)?.ops.read(buf, offset)
}

pub fn write(id: DeviceId, buf: &[u8], offset: u64) -> Result<usize> {
	let drivers = DRIVERS.lock();
	drivers.get(&id).ok_or(Error::ENODEV)?.ops.write(buf, offset)
}

/// Dispatch an ioctl, rejecting a mismatched group before the driver ever
/// sees the request.
pub fn ioctl(id: DeviceId, req: IoctlRequest, arg: usize) -> Result<isize> {
	let drivers = DRIVERS.lock();
	let entry = drivers.get(&id).ok_or(Error::ENODEV)?;
	if req.group() != entry.ops.ioctl_group() {
		return Err(Error::EBADRQC);
	}
	entry.ops.ioctl(req, arg)
}

pub fn flush(id: DeviceId) -> Result<()> {
	let drivers = DRIVERS.lock();
	drivers.get(&id).ok_or(Error::ENODEV)?.ops.flush()
}

pub fn stat(id: DeviceId) -> Result<Stat> {
	let drivers = DRIVERS.lock();
	drivers.get(&id).ok_or(Error::ENODEV)?.ops.stat()
}

/// List of `(device id, name)` for every registered driver, for the system
/// monitor / a `/proc`-style listing.
pub fn list() -> alloc::vec::Vec<(DeviceId, String)> {
	DRIVERS
		.lock()
		.iter()
		.map(|(&id, entry)| (id, entry.name.clone()))
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::fs::mode;
	use crate::types::Uid;

	struct Null;

	impl DriverOps for Null {
		fn read(&self, _buf: &mut [u8], _offset: u64) -> Result<usize> {
			Ok(0)
		}
		fn write(&self, buf: &[u8], _offset: u64) -> Result<usize> {
			Ok(buf.len())
		}
		fn stat(&self) -> Result<Stat> {
			Ok(Stat {
				mode: mode::S_IFCHR | 0o666,
				size: 0,
				uid: Uid(0),
				gid: crate::types::Gid(0),
				mtime: 0,
			})
		}
		fn ioctl_group(&self) -> u16 {
			0
		}
	}

	fn reset() {
		DRIVERS.lock().clear();
	}

	#[test]
	fn register_rejects_duplicate_device_id() {
		reset();
		let id = DeviceId::new(1, 0);
		register(id, "null".into(), Box::new(Null)).unwrap();
		assert_eq!(register(id, "null2".into(), Box::new(Null)).unwrap_err(), Error::EEXIST);
	}

	#[test]
	fn unregister_refuses_while_open() {
		reset();
		let id = DeviceId::new(1, 1);
		register(id, "null".into(), Box::new(Null)).unwrap();
		open(id).unwrap();
		assert_eq!(unregister(id).unwrap_err(), Error::EBUSY);
		close(id).unwrap();
		unregister(id).unwrap();
	}

	#[test]
	fn ioctl_rejects_mismatched_group() {
		reset();
		let id = DeviceId::new(2, 0);
		register(id, "null".into(), Box::new(Null)).unwrap();
		let req = IoctlRequest::new(7, 1);
		assert_eq!(ioctl(id, req, 0).unwrap_err(), Error::EBADRQC);
	}
}
