//! Secure memory containers for derived key material.
//!
//! Every secret this crate touches host-side is fixed-size (32-byte HMAC
//! output, 36-byte slot-format private key), so a single container covers
//! them all:
//! - [`SecretBytes`] — fixed-size buffer, zeroed on drop, `mlock`'d
//!   best-effort, masked `Debug`/`Display`
//! - [`LockedRegion`] — RAII `mlock`/`munlock` guard
//! - [`disable_core_dumps`] — process-wide hygiene for host-side tooling

use crate::error::TokenError;
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

// ---------------------------------------------------------------------------
// Memory locking
// ---------------------------------------------------------------------------

/// RAII guard that pins a memory region in RAM via `mlock` and releases it
/// with `munlock` on drop.
///
/// Locking is best-effort: if `mlock` fails (privileges, `RLIMIT_MEMLOCK`),
/// the region stays unlocked and a one-time warning is printed. The
/// zeroize-on-drop guarantee of [`SecretBytes`] does not depend on it.
pub struct LockedRegion {
    ptr: *const u8,
    len: usize,
    locked: bool,
}

// SAFETY: the pointer is only handed to mlock/munlock, which are
// thread-safe; the pointed-to bytes are owned by SecretBytes and never
// read through LockedRegion.
unsafe impl Send for LockedRegion {}
unsafe impl Sync for LockedRegion {}

impl LockedRegion {
    pub(crate) fn try_lock(ptr: *const u8, len: usize) -> Self {
        let locked = platform::try_mlock(ptr, len);
        if !locked && len > 0 {
            static WARNED: std::sync::Once = std::sync::Once::new();
            WARNED.call_once(|| {
                eprintln!(
                    "[clef-core] WARNING: mlock failed — derived key material \
                     may be swapped to disk. Consider raising RLIMIT_MEMLOCK."
                );
            });
        }
        Self { ptr, len, locked }
    }

    /// Returns `true` if the region is currently pinned.
    #[must_use]
    pub const fn is_locked(&self) -> bool {
        self.locked
    }
}

impl Drop for LockedRegion {
    fn drop(&mut self) {
        if self.locked {
            platform::try_munlock(self.ptr, self.len);
        }
    }
}

// ---------------------------------------------------------------------------
// SecretBytes<N>
// ---------------------------------------------------------------------------

/// Fixed-size secret buffer, securely erased when it goes out of scope.
///
/// `mlock` pins the bytes at their current address; if the value is moved
/// afterwards the stale `munlock` is a harmless no-op, and zeroize-on-drop
/// holds regardless.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecretBytes<const N: usize> {
    bytes: [u8; N],
    #[zeroize(skip)]
    lock: LockedRegion,
}

impl<const N: usize> SecretBytes<N> {
    /// Take ownership of a fixed-size array of secret bytes.
    ///
    /// The caller should zeroize its own copy of the source afterwards.
    #[must_use]
    pub fn new(data: [u8; N]) -> Self {
        // The lock must reference `bytes` at its resting address, so the
        // struct is built first with an inert placeholder guard.
        let mut s = Self {
            bytes: data,
            lock: LockedRegion {
                ptr: std::ptr::null(),
                len: 0,
                locked: false,
            },
        };
        s.lock = LockedRegion::try_lock(s.bytes.as_ptr(), N);
        s
    }

    /// Fill a fresh buffer from the operating system CSPRNG.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::SecureMemory`] if the CSPRNG fails.
    pub fn random() -> Result<Self, TokenError> {
        let mut bytes = [0u8; N];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| TokenError::SecureMemory(format!("CSPRNG fill failed: {e}")))?;
        let out = Self::new(bytes);
        bytes.zeroize();
        Ok(out)
    }

    /// Expose the bytes for a cryptographic operation. Keep the exposure
    /// short-lived.
    #[must_use]
    pub const fn expose(&self) -> &[u8; N] {
        &self.bytes
    }

    /// Returns `true` if the underlying memory is `mlock`'d.
    #[must_use]
    pub const fn is_mlocked(&self) -> bool {
        self.lock.is_locked()
    }
}

impl<const N: usize> fmt::Debug for SecretBytes<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretBytes<{N}>(***)")
    }
}

impl<const N: usize> fmt::Display for SecretBytes<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretBytes<{N}>(***)")
    }
}

impl<const N: usize> From<[u8; N]> for SecretBytes<N> {
    fn from(data: [u8; N]) -> Self {
        Self::new(data)
    }
}

// ---------------------------------------------------------------------------
// Core dump lockdown
// ---------------------------------------------------------------------------

/// Disable core dumps for the current process (`RLIMIT_CORE` = 0 on Unix,
/// no-op elsewhere).
///
/// # Errors
///
/// Returns [`TokenError::SecureMemory`] if the `setrlimit` call fails.
pub fn disable_core_dumps() -> Result<(), TokenError> {
    platform::disable_core_dumps_impl()
}

// ---------------------------------------------------------------------------
// Platform glue
// ---------------------------------------------------------------------------

#[cfg(unix)]
mod platform {
    use crate::error::TokenError;

    pub(super) fn try_mlock(ptr: *const u8, len: usize) -> bool {
        if len == 0 {
            return true;
        }
        // SAFETY: mlock accepts any valid pointer/length pair; an invalid
        // region yields ENOMEM, reported as unlocked.
        unsafe { libc::mlock(ptr.cast(), len) == 0 }
    }

    pub(super) fn try_munlock(ptr: *const u8, len: usize) {
        if len == 0 {
            return;
        }
        // SAFETY: munlock failure is non-critical.
        unsafe {
            libc::munlock(ptr.cast(), len);
        }
    }

    pub(super) fn disable_core_dumps_impl() -> Result<(), TokenError> {
        let limit = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        // SAFETY: setrlimit with RLIMIT_CORE is a standard POSIX call.
        let ret = unsafe { libc::setrlimit(libc::RLIMIT_CORE, &raw const limit) };
        if ret != 0 {
            return Err(TokenError::SecureMemory(
                "failed to disable core dumps via RLIMIT_CORE".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(not(unix))]
mod platform {
    use crate::error::TokenError;

    pub(super) fn try_mlock(_ptr: *const u8, _len: usize) -> bool {
        false
    }

    pub(super) fn try_munlock(_ptr: *const u8, _len: usize) {}

    pub(super) fn disable_core_dumps_impl() -> Result<(), TokenError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
