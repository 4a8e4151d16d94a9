//! # Kernel Launch Layer
//!
//! This module executes traced [`Kernel`](crate::kernel::Kernel)s over the
//! fields of a runtime, forward and in reverse.
//!
//! ## Submodules
//!
//! - [`cpu`] — Iterations traced in parallel on the rayon pool (default)
//! - [`serial`] — Iterations traced one after the other on the calling thread
//! - [`dispatch`] — Arch selection and the write/gradient merge shared by both
//!
//! ## Notes
//!
//! - Tracing only ever borrows fields immutably; all mutation happens in
//!   [`dispatch`] after tracing completes
//! - Writes and gradient contributions are merged in iteration order, so
//!   `cpu` and `serial` produce bit-identical fields
//! - A fault in any iteration aborts the launch before anything is written

pub mod cpu;
pub mod dispatch;
pub mod serial;
