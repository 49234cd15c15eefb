// SPDX-License-Identifier: GPL-2.0

//! `/dev/full`-equivalent driver: reads return an endless stream of zero
//! bytes, every write fails with `ENOSPC`.

use kernel::driver::DriverOps;
use kernel::error::{Error, Result};
use kernel::fs::{mode, Stat};
use kernel::types::{Gid, Uid};

#[derive(Debug, Default)]
pub struct FullDevice;

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

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn writes_always_fail_with_enospc() {
		assert_eq!(FullDevice.write(b"x", 0).unwrap_err(), Error::ENOSPC);
	}
}
