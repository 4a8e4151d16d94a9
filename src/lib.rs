//! tapegrad: traced kernels, reverse-mode autodiff and gradient descent in Rust.
//!
//! Kernels are plain closures over a loop index. Launching one traces each
//! iteration into a small expression tape, which the runtime can evaluate
//! forward and sweep in reverse to accumulate gradients into fields.
//!
//! # Features
//!
//! - Fixed-shape `f32` fields with optional gradient buffers.
//! - Kernels traced per iteration, launched in parallel with rayon or serially.
//! - A scoped tape that differentiates a scalar loss through every recorded launch.
//! - Gradient descent as an ordinary update kernel.
//! - Finite-difference gradient checking.
//! - Two complete drivers (vector minimization and polynomial regression)
//!   that render their progress to SVG.
//!
//! # Modules
//!
//! - [`field`] — Tensors, fields and field handles.
//! - [`kernel`] — Kernel definitions, tracing scopes and the reverse sweep.
//! - [`ops`] — Parallel and serial launch implementations.
//! - [`runtime`] — Field ownership, launches and the tape.
//! - [`optim`] — Gradient descent.
//! - [`gradcheck`] — Central-difference validation.
//! - [`plot`] — Panel grids rendered with `plotters`.
//! - [`config`] — JSON-loadable run configuration.
//! - [`demos`] — The minimization and regression drivers.
//!
//! # Example
//!
//! ```rust
//! use tapegrad::{backend::Arch, kernel::Kernel, optim::GradientDescent, runtime::Runtime};
//!
//! let mut rt = Runtime::new(Arch::Cpu);
//! let x = rt.vector("x", 4, true).unwrap();
//! let loss = rt.scalar("loss", true);
//! rt.copy_from_slice(x, &[1.0, -2.0, 3.0, -4.0]).unwrap();
//!
//! let l2 = Kernel::over("l2", x, move |s, i| {
//!     let v = s.load(x, i);
//!     s.atomic_add(loss, 0, 0.5 * v * v);
//! });
//! let step = GradientDescent::new(0.5).kernel(x);
//!
//! for _ in 0..10 {
//!     rt.tape(loss, |rt| rt.launch(&l2)).unwrap();
//!     rt.launch(&step).unwrap();
//! }
//! assert!(rt.to_vec(x).unwrap().iter().all(|v| v.abs() < 0.01));
//! ```

pub mod backend;
pub mod config;
pub mod demos;
pub mod error;
pub mod field;
pub mod gradcheck;
pub mod kernel;
pub mod ops;
pub mod optim;
pub mod plot;
pub mod runtime;

pub use error::{Error, Result};
