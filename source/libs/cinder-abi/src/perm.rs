// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Page permission bits carried by mapping entries and syscall arguments.

use bitflags::bitflags;

bitflags! {
    /// Permission bits of a user mapping. Values are wire-stable.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Perm: usize {
        /// Entry is present.
        const VALID = 0x200;
        /// Stores are allowed.
        const WRITABLE = 0x400;
        /// Copy-on-write: shared until the first store, then privately copied.
        const COW = 0x001;
        /// Shared-library page: stays shared and writable across fork.
        const LIBRARY = 0x004;
        /// Kernel-owned global entry.
        const GLOBAL = 0x100;
    }
}

impl Perm {
    /// Decodes a register word, dropping unknown bits.
    #[inline]
    pub const fn from_raw(raw: usize) -> Self {
        Self::from_bits_truncate(raw)
    }

    /// Entry is present.
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.contains(Self::VALID)
    }

    /// Entry allows stores.
    #[inline]
    pub const fn is_writable(self) -> bool {
        self.contains(Self::WRITABLE)
    }

    /// Entry is marked copy-on-write.
    #[inline]
    pub const fn is_copy_on_write(self) -> bool {
        self.contains(Self::COW)
    }

    /// Entry is a shared-library page.
    #[inline]
    pub const fn is_shared_library(self) -> bool {
        self.contains(Self::LIBRARY)
    }
}

#[cfg(test)]
mod tests {
    use super::Perm;

    #[test]
    fn raw_decode_drops_unknown_bits() {
        let perm = Perm::from_raw(0x200 | 0x400 | 0x8000);
        assert_eq!(perm, Perm::VALID | Perm::WRITABLE);
        assert!(perm.is_valid() && perm.is_writable());
        assert!(!perm.is_copy_on_write() && !perm.is_shared_library());
    }
}
