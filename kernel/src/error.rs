// SPDX-License-Identifier: GPL-2.0

//! Error handling types and utilities

use core::fmt;

/// Kernel error type, doubling as the dnx-rtos errno set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
	/// Operation not permitted (EPERM)
	EPERM,
	/// No such file or directory (ENOENT)
	ENOENT,
	/// No such process (ESRCH)
	ESRCH,
	/// I/O error (EIO)
	EIO,
	/// No such device or address (ENXIO)
	ENXIO,
	/// Argument list too long (E2BIG)
	E2BIG,
	/// Resource temporarily unavailable (EAGAIN)
	EAGAIN,
	/// Out of memory (ENOMEM)
	ENOMEM,
	/// Permission denied (EACCES)
	EACCES,
	/// Bad address (EFAULT)
	EFAULT,
	/// Device or resource busy (EBUSY)
	EBUSY,
	/// File exists (EEXIST)
	EEXIST,
	/// No such device (ENODEV)
	ENODEV,
	/// Not a directory (ENOTDIR)
	ENOTDIR,
	/// Is a directory (EISDIR)
	EISDIR,
	/// Invalid argument (EINVAL)
	EINVAL,
	/// Too many open files (EMFILE)
	EMFILE,
	/// File too large (EFBIG)
	EFBIG,
	/// No space left on device (ENOSPC)
	ENOSPC,
	/// Illegal seek (ESPIPE)
	ESPIPE,
	/// Read-only file system (EROFS)
	EROFS,
	/// File name too long (ENAMETOOLONG)
	ENAMETOOLONG,
	/// Directory not empty (ENOTEMPTY)
	ENOTEMPTY,
	/// Invalid ioctl request code for this device (EBADRQC)
	EBADRQC,
	/// Inappropriate ioctl for device (ENOTTY)
	ENOTTY,
	/// Broken pipe (EPIPE)
	EPIPE,
	/// Bad file descriptor (EBADF)
	EBADF,
	/// No child processes (ECHILD)
	ECHILD,
	/// Interrupted operation (EINTR)
	EINTR,
	/// Function not implemented (ENOSYS)
	ENOSYS,
	/// No data available (ENODATA)
	ENODATA,
	/// Timer expired (ETIME)
	ETIME,
	/// Operation canceled (ECANCELED)
	ECANCELED,
	/// Operation not supported (ENOTSUP)
	ENOTSUP,
	/// Resource deadlock would occur (EDEADLK)
	EDEADLK,
}

impl Error {
	/// Convert error to the conventional negative errno value.
	pub const fn to_errno(self) -> i32 {
		match self {
			Error::EPERM => -1,
			Error::ENOENT => -2,
			Error::ESRCH => -3,
			Error::EIO => -5,
			Error::ENXIO => -6,
			Error::E2BIG => -7,
			Error::EAGAIN => -11,
			Error::ENOMEM => -12,
			Error::EACCES => -13,
			Error::EFAULT => -14,
			Error::EBUSY => -16,
			Error::EEXIST => -17,
			Error::ENODEV => -19,
			Error::ENOTDIR => -20,
			Error::EISDIR => -21,
			Error::EINVAL => -22,
			Error::EMFILE => -24,
			Error::EFBIG => -27,
			Error::ENOSPC => -28,
			Error::ESPIPE => -29,
			Error::EROFS => -30,
			Error::ENAMETOOLONG => -36,
			Error::ENOTEMPTY => -39,
			Error::EBADRQC => -56,
			Error::ENOTTY => -25,
			Error::EPIPE => -32,
			Error::EBADF => -9,
			Error::ECHILD => -10,
			Error::EINTR => -4,
			Error::ENOSYS => -38,
			Error::ENODATA => -61,
			Error::ETIME => -62,
			Error::ECANCELED => -125,
			Error::ENOTSUP => -95,
			Error::EDEADLK => -35,
		}
	}
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			Error::EPERM => "operation not permitted",
			Error::ENOENT => "no such file or directory",
			Error::ESRCH => "no such process",
			Error::EIO => "I/O error",
			Error::ENXIO => "no such device or address",
			Error::E2BIG => "argument list too long",
			Error::EAGAIN => "resource temporarily unavailable",
			Error::ENOMEM => "out of memory",
			Error::EACCES => "permission denied",
			Error::EFAULT => "bad address",
			Error::EBUSY => "device or resource busy",
			Error::EEXIST => "file exists",
			Error::ENODEV => "no such device",
			Error::ENOTDIR => "not a directory",
			Error::EISDIR => "is a directory",
			Error::EINVAL => "invalid argument",
			Error::EMFILE => "too many open files",
			Error::EFBIG => "file too large",
			Error::ENOSPC => "no space left on device",
			Error::ESPIPE => "illegal seek",
			Error::EROFS => "read-only file system",
			Error::ENAMETOOLONG => "file name too long",
			Error::ENOTEMPTY => "directory not empty",
			Error::EBADRQC => "invalid request code",
			Error::ENOTTY => "inappropriate ioctl for device",
			Error::EPIPE => "broken pipe",
			Error::EBADF => "bad file descriptor",
			Error::ECHILD => "no child processes",
			Error::EINTR => "interrupted operation",
			Error::ENOSYS => "function not implemented",
			Error::ENODATA => "no data available",
			Error::ETIME => "timer expired",
			Error::ECANCELED => "operation canceled",
			Error::ENOTSUP => "operation not supported",
			Error::EDEADLK => "resource deadlock would occur",
		};
		f.write_str(s)
	}
}

/// Kernel result type
pub type Result<T> = core::result::Result<T, Error>;

impl From<core::alloc::AllocError> for Error {
	fn from(_: core::alloc::AllocError) -> Self {
		Error::ENOMEM
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloc::string::ToString;

	#[test]
	fn to_errno_matches_classic_values() {
		assert_eq!(Error::ENOENT.to_errno(), -2);
		assert_eq!(Error::EAGAIN.to_errno(), -11);
		assert_eq!(Error::EBADF.to_errno(), -9);
	}

	#[test]
	fn display_strings_are_distinct() {
		assert_ne!(Error::EPIPE.to_string(), Error::ENOSYS.to_string());
	}
}
