// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error codes returned (negated) in a0 by every syscall.

use core::fmt;

/// Error taxonomy shared by the kernel and userland.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Errno {
    /// Failure without a more specific code.
    Unspecified = 1,
    /// Unknown, stale or unauthorized environment id.
    BadEnv = 2,
    /// Invalid argument (address, permission or status).
    Inval = 3,
    /// Physical page pool exhausted.
    NoMem = 4,
    /// Environment table exhausted.
    NoFreeEnv = 5,
    /// IPC target is not waiting in `ipc_recv`.
    IpcNotRecv = 6,
    /// Syscall number outside the dispatch table.
    NoSys = 7,
}

impl Errno {
    /// Register encoding of this error (`-code` as a machine word).
    #[inline]
    pub const fn to_ret(self) -> isize {
        -(self as i32 as isize)
    }

    /// Decodes a syscall return word. Non-negative values are successes.
    pub const fn from_ret(ret: isize) -> Result<usize, Errno> {
        if ret >= 0 {
            return Ok(ret as usize);
        }
        Err(match -ret {
            2 => Self::BadEnv,
            3 => Self::Inval,
            4 => Self::NoMem,
            5 => Self::NoFreeEnv,
            6 => Self::IpcNotRecv,
            7 => Self::NoSys,
            _ => Self::Unspecified,
        })
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Unspecified => "unspecified error",
            Self::BadEnv => "bad environment",
            Self::Inval => "invalid parameter",
            Self::NoMem => "out of memory",
            Self::NoFreeEnv => "out of environments",
            Self::IpcNotRecv => "env is not recving",
            Self::NoSys => "no such syscall",
        };
        f.write_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::Errno;

    #[test]
    fn negative_words_decode_to_codes() {
        assert_eq!(Errno::from_ret(0), Ok(0));
        assert_eq!(Errno::from_ret(4096), Ok(4096));
        assert_eq!(Errno::from_ret(Errno::Inval.to_ret()), Err(Errno::Inval));
        assert_eq!(Errno::from_ret(-6), Err(Errno::IpcNotRecv));
        assert_eq!(Errno::from_ret(-99), Err(Errno::Unspecified));
    }
}
