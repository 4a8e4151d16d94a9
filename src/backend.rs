//! Architecture selection module.
//!
//! This module defines the architectures kernels can be launched on and
//! provides functions to set and get the process-wide default.
//!
//! # Supported Architectures
//!
//! - `Cpu` — Iterations of a kernel are traced in parallel on the rayon pool (default).
//! - `Serial` — Iterations run one after the other on the calling thread.
//!
//! The default is stored globally in an `AtomicU8`. A [`Runtime`](crate::runtime::Runtime)
//! captures it once at construction, so changing the default never affects a
//! runtime that already exists.

use core::convert::TryFrom;
use core::sync::atomic::{AtomicU8, Ordering};
use serde::{Deserialize, Serialize};

/// Enumeration of supported launch architectures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Arch {
    /// Parallel CPU launches through rayon (default).
    #[default]
    Cpu = 0,
    /// Single-threaded launches.
    Serial,
}

impl TryFrom<u8> for Arch {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Cpu),
            1 => Ok(Self::Serial),
            _ => Err(()),
        }
    }
}

/// Internal global state for the default architecture.
///
/// Relaxed use is fine here: the default is read once per runtime.
static GLOBAL_DEFAULT_ARCH: AtomicU8 = AtomicU8::new(Arch::Cpu as u8);

/// Sets the architecture new runtimes will launch kernels on.
///
/// # Example
///
/// ```
/// use tapegrad::backend::{set_default_arch, Arch};
/// set_default_arch(Arch::Serial);
/// ```
pub fn set_default_arch(arch: Arch) {
    GLOBAL_DEFAULT_ARCH.store(arch as u8, Ordering::Release);
}

/// Returns the architecture new runtimes will launch kernels on.
///
/// If the stored value is invalid, defaults to [`Arch::Cpu`].
pub fn default_arch() -> Arch {
    Arch::try_from(GLOBAL_DEFAULT_ARCH.load(Ordering::Acquire)).unwrap_or_default()
}
