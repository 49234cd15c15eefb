// SPDX-License-Identifier: GPL-2.0

//! Built-in driver registration: the fixture character/block devices the
//! kernel brings up on its own at boot, independent of any board-specific
//! driver set. Registered once, by device number, through [`crate::driver`].

use alloc::boxed::Box;

use crate::driver::DriverOps;
use crate::error::{Error, Result};
use crate::fs::{mode, Stat};
use crate::info;
use crate::sync::Spinlock;
use crate::types::{DeviceId, Gid, IoctlRequest, Uid};

/// Register the built-in fixture devices under conventional device numbers:
/// major 1 for memory-style devices (`null`, `zero`, `full`), major 2 for
/// the loop device.
pub fn init_drivers() -> Result<()> {
	info!("Registering built-in drivers");

	crate::driver::register(DeviceId::new(1, 0), "null".into(), Box::new(NullDevice))?;
	crate::driver::register(DeviceId::new(1, 1), "zero".into(), Box::new(ZeroDevice))?;
	crate::driver::register(DeviceId::new(1, 2), "full".into(), Box::new(FullDevice))?;
	crate::driver::register(
		DeviceId::new(2, 0),
		"loop0".into(),
		Box::new(LoopDevice::new(64 * 1024)),
	)?;

	info!("Built-in drivers registered");
	Ok(())
}

/// Reads return EOF, writes discard and report full success.
struct NullDevice;

impl DriverOps for NullDevice {
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
			gid: Gid(0),
			mtime: 0,
		})
	}

	fn ioctl_group(&self) -> u16 {
		0
	}
}

/// Reads return an endless stream of zero bytes, writes discard.
struct ZeroDevice;

impl DriverOps for ZeroDevice {
	fn read(&self, buf: &mut [u8], _offset: u64) -> Result<usize> {
		buf.fill(0);
		Ok(buf.len())
	}

	fn write(&self, buf: &[u8], _offset: u64) -> Result<usize> {
		Ok(buf.len())
	}

	fn stat(&self) -> Result<Stat> {
		Ok(Stat {
			mode: mode::S_IFCHR | 0o666,
			size: 0,
			uid: Uid(0),
			gid: Gid(0),
			mtime: 0,
		})
	}

	fn ioctl_group(&self) -> u16 {
		0
	}
}

/// Reads return an endless stream of zero bytes; every write fails with
/// `ENOSPC`, the classic `/dev/full` behavior for exercising out-of-space
/// error paths without actually filling storage.
struct FullDevice;

impl DriverOps for FullDevice {
	fn read(&self, buf: &mut [u8], _offset: u64) -> Result<usize> {
		buf.fill(0);
		Ok(buf.len())
	}

	fn write(&self, _buf: &[u8], _offset: u64) -> Result<usize> {
		Err(Error::ENOSPC)
	}

	fn stat(&self) -> Result<Stat> {
		Ok(Stat {
			mode: mode::S_IFCHR | 0o666,
			size: 0,
			uid: Uid(0),
			gid: Gid(0),
			mtime: 0,
		})
	}

	fn ioctl_group(&self) -> u16 {
		0
	}
}

const LOOP_IOCTL_GROUP: u16 = 1;
const LOOP_IOCTL_GET_SIZE: u16 = 0;

/// A fixed-capacity, RAM-backed block store addressable by offset.
struct LoopDevice {
	storage: Spinlock<alloc::vec::Vec<u8>>,
}

impl LoopDevice {
	fn new(capacity: usize) -> Self {
		Self {
			storage: Spinlock::new(alloc::vec![0u8; capacity]),
		}
	}
}

impl DriverOps for LoopDevice {
	fn read(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
		let storage = self.storage.lock();
		let start = offset as usize;
		if start >= storage.len() {
			return Ok(0);
		}
		let n = core::cmp::min(buf.len(), storage.len() - start);
		buf[..n].copy_from_slice(&storage[start..start + n]);
		Ok(n)
	}

	fn write(&self, buf: &[u8], offset: u64) -> Result<usize> {
		let mut storage = self.storage.lock();
		let start = offset as usize;
		if start + buf.len() > storage.len() {
			return Err(Error::ENOSPC);
		}
		storage[start..start + buf.len()].copy_from_slice(buf);
		Ok(buf.len())
	}

	fn ioctl(&self, req: IoctlRequest, arg: usize) -> Result<isize> {
		match req.number() {
			LOOP_IOCTL_GET_SIZE => {
				let size = self.storage.lock().len();
				unsafe { *(arg as *mut usize) = size };
				Ok(0)
			}
			_ => Err(Error::ENOTTY),
		}
	}

	fn stat(&self) -> Result<Stat> {
		Ok(Stat {
			mode: mode::S_IFBLK | 0o660,
			size: self.storage.lock().len() as u64,
			uid: Uid(0),
			gid: Gid(0),
			mtime: 0,
		})
	}

	fn ioctl_group(&self) -> u16 {
		LOOP_IOCTL_GROUP
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn null_reads_are_eof_and_writes_succeed() {
		let mut buf = [1u8; 8];
		assert_eq!(NullDevice.read(&mut buf, 0).unwrap(), 0);
		assert_eq!(NullDevice.write(b"hi", 0).unwrap(), 2);
	}

	#[test]
	fn zero_reads_fill_with_zeros() {
		let mut buf = [0xFFu8; 8];
		assert_eq!(ZeroDevice.read(&mut buf, 0).unwrap(), 8);
		assert_eq!(buf, [0u8; 8]);
	}

	#[test]
	fn full_writes_always_fail_with_enospc() {
		assert_eq!(FullDevice.write(b"x", 0).unwrap_err(), Error::ENOSPC);
	}

	#[test]
	fn loop_device_write_then_read_round_trips() {
		let dev = LoopDevice::new(16);
		dev.write(b"abcd", 4).unwrap();
		let mut buf = [0u8; 4];
		dev.read(&mut buf, 4).unwrap();
		assert_eq!(&buf, b"abcd");
	}

	#[test]
	fn loop_device_write_past_capacity_is_enospc() {
		let dev = LoopDevice::new(4);
		assert_eq!(dev.write(b"12345", 0).unwrap_err(), Error::ENOSPC);
	}
}
