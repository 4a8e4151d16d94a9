//! Traced kernels and their reverse sweep.
//!
//! # Kernels
//!
//! A [`Kernel`] is a loop domain plus a body `Fn(&Scope, usize)`. Launching a
//! kernel calls the body once per loop index. Instead of mutating fields
//! directly, the body records what it reads, computes and writes into a
//! per-iteration [`Trace`] through the [`Scope`] it is handed:
//!
//! ```rust
//! use tapegrad::{kernel::Kernel, runtime::Runtime, backend::Arch};
//!
//! let mut rt = Runtime::new(Arch::Serial);
//! let x = rt.vector("x", 3, true).unwrap();
//! let loss = rt.scalar("loss", true);
//! rt.copy_from_slice(x, &[1.0, 2.0, 3.0]).unwrap();
//!
//! let sum_sq = Kernel::over("sum_sq", x, move |s, i| {
//!     let v = s.load(x, i);
//!     s.atomic_add(loss, 0, v * v);
//! });
//! rt.tape(loss, |rt| rt.launch(&sum_sq)).unwrap();
//! assert_eq!(rt.get(loss, 0).unwrap(), 14.0);
//! assert_eq!(rt.grad_to_vec(x).unwrap(), vec![2.0, 4.0, 6.0]);
//! ```
//!
//! # Trace Pattern
//!
//! 1. **Loads** snapshot field values as of launch time.
//! 2. **Arithmetic** on [`Var`] appends nodes carrying their forward value.
//! 3. **Writes** (`store` / `atomic_add`) are collected, not applied.
//! 4. The launch layer applies writes in iteration order once every
//!    iteration has been traced, which keeps results independent of scheduling.
//!
//! The reverse sweep re-traces an iteration, seeds each write's value with the
//! current gradient of the written element and walks the nodes backwards,
//! emitting a gradient contribution at every load of a field with gradients.
//!
//! ## Usage Guidelines
//!
//! - A kernel that is differentiated must not overwrite a field it also reads;
//!   the backward pass re-traces against current values.
//! - Gradient reads (`load_grad`) are constants for differentiation.
//! - Out-of-range indices fault the scope and fail the whole launch.

use std::cell::RefCell;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::field::{Field, FieldId};

/// Signature of a kernel body.
pub type KernelBody = dyn Fn(&Scope<'_>, usize) + Send + Sync;

/// Loop domain of a kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    /// `0..n`.
    Range(usize),
    /// Every element of a field, resolved at launch.
    Field(FieldId),
    /// A single iteration with index 0.
    Single,
}

/// A named, cloneable unit of traced computation.
#[derive(Clone)]
pub struct Kernel {
    name: Arc<str>,
    domain: Domain,
    body: Arc<KernelBody>,
}

impl Kernel {
    /// Kernel iterating `0..n`.
    pub fn range<F>(name: &str, n: usize, body: F) -> Self
    where
        F: Fn(&Scope<'_>, usize) + Send + Sync + 'static,
    {
        Self::with_domain(name, Domain::Range(n), body)
    }

    /// Kernel iterating over every element of `field`.
    pub fn over<F>(name: &str, field: FieldId, body: F) -> Self
    where
        F: Fn(&Scope<'_>, usize) + Send + Sync + 'static,
    {
        Self::with_domain(name, Domain::Field(field), body)
    }

    /// Kernel running its body exactly once.
    pub fn single<F>(name: &str, body: F) -> Self
    where
        F: Fn(&Scope<'_>) + Send + Sync + 'static,
    {
        Self::with_domain(name, Domain::Single, move |s, _| body(s))
    }

    fn with_domain<F>(name: &str, domain: Domain, body: F) -> Self
    where
        F: Fn(&Scope<'_>, usize) + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name),
            domain,
            body: Arc::new(body),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    /// Number of iterations a launch over `fields` performs.
    pub(crate) fn extent(&self, fields: &[Field]) -> Result<usize> {
        match self.domain {
            Domain::Range(n) => Ok(n),
            Domain::Single => Ok(1),
            Domain::Field(id) => fields
                .get(id.0)
                .map(Field::len)
                .ok_or(Error::UnknownField(id.0)),
        }
    }

    /// Traces a single iteration.
    pub(crate) fn trace(&self, fields: &[Field], index: usize) -> Result<Trace> {
        let scope = Scope::new(fields);
        (self.body)(&scope, index);
        scope.finish()
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("name", &self.name)
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Op {
    Const,
    Load { field: usize, index: usize },
    LoadGrad,
    Add,
    Sub,
    Mul,
    Div,
    Neg,
    Powi(i32),
    Exp,
    Ln,
    Sqrt,
    Sin,
    Cos,
    Tanh,
}

const UNUSED: u32 = u32::MAX;

#[derive(Debug, Clone, Copy)]
struct Node {
    op: Op,
    args: [u32; 2],
    value: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteMode {
    Store,
    AtomicAdd,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Write {
    pub mode: WriteMode,
    pub field: usize,
    pub index: usize,
    node: u32,
}

/// A gradient to add into `fields[field].grad[index]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Contribution {
    pub field: usize,
    pub index: usize,
    pub value: f32,
}

/// Everything one iteration of a kernel body recorded.
#[derive(Debug, Default)]
pub(crate) struct Trace {
    nodes: Vec<Node>,
    writes: Vec<Write>,
    fault: Option<Error>,
}

impl Trace {
    fn push(&mut self, op: Op, args: [u32; 2], value: f32) -> u32 {
        let idx = self.nodes.len() as u32;
        self.nodes.push(Node { op, args, value });
        idx
    }

    fn value(&self, node: u32) -> f32 {
        self.nodes[node as usize].value
    }

    fn fault(&mut self, err: Error) {
        if self.fault.is_none() {
            self.fault = Some(err);
        }
    }

    /// Writes with their forward values, in recording order.
    pub(crate) fn writes(&self) -> impl Iterator<Item = (Write, f32)> + '_ {
        self.writes.iter().map(|w| (*w, self.value(w.node)))
    }

    /// Reverse sweep seeded from the gradients of the written elements.
    pub(crate) fn backward(&self, fields: &[Field]) -> Vec<Contribution> {
        let mut adjoints = vec![0.0f32; self.nodes.len()];
        for w in &self.writes {
            if let Some(grad) = &fields[w.field].grad {
                adjoints[w.node as usize] += grad.data[w.index];
            }
        }

        let mut out = Vec::new();
        for i in (0..self.nodes.len()).rev() {
            let adj = adjoints[i];
            if adj == 0.0 {
                continue;
            }
            let node = self.nodes[i];
            match node.op {
                Op::Const | Op::LoadGrad => {}
                Op::Load { field, index } => {
                    if fields[field].needs_grad() {
                        out.push(Contribution {
                            field,
                            index,
                            value: adj,
                        });
                    }
                }
                op => {
                    let [a_idx, b_idx] = node.args;
                    let a = self.value(a_idx);
                    let b = if b_idx != UNUSED {
                        self.value(b_idx)
                    } else {
                        0.0
                    };
                    let (da, db) = partials(op, a, b, node.value);
                    adjoints[a_idx as usize] += da * adj;
                    if b_idx != UNUSED {
                        adjoints[b_idx as usize] += db * adj;
                    }
                }
            }
        }
        out
    }
}

fn eval(op: Op, a: f32, b: f32) -> f32 {
    match op {
        Op::Add => a + b,
        Op::Sub => a - b,
        Op::Mul => a * b,
        Op::Div => a / b,
        Op::Neg => -a,
        Op::Powi(n) => a.powi(n),
        Op::Exp => a.exp(),
        Op::Ln => a.ln(),
        Op::Sqrt => a.sqrt(),
        Op::Sin => a.sin(),
        Op::Cos => a.cos(),
        Op::Tanh => a.tanh(),
        Op::Const | Op::Load { .. } | Op::LoadGrad => unreachable!("leaf ops are not evaluated"),
    }
}

/// Local partial derivatives `(d r / d a, d r / d b)` of `r = op(a, b)`.
fn partials(op: Op, a: f32, b: f32, r: f32) -> (f32, f32) {
    match op {
        Op::Add => (1.0, 1.0),
        Op::Sub => (1.0, -1.0),
        Op::Mul => (b, a),
        Op::Div => (1.0 / b, -a / (b * b)),
        Op::Neg => (-1.0, 0.0),
        // a^0 is constant; the general form would evaluate 0 * a^-1
        Op::Powi(0) => (0.0, 0.0),
        Op::Powi(n) => (n as f32 * a.powi(n - 1), 0.0),
        Op::Exp => (r, 0.0),
        Op::Ln => (1.0 / a, 0.0),
        Op::Sqrt => (0.5 / r, 0.0),
        Op::Sin => (a.cos(), 0.0),
        Op::Cos => (-a.sin(), 0.0),
        Op::Tanh => (1.0 - r * r, 0.0),
        Op::Const | Op::Load { .. } | Op::LoadGrad => (0.0, 0.0),
    }
}

/// Recording context handed to a kernel body for one iteration.
pub struct Scope<'f> {
    fields: &'f [Field],
    trace: RefCell<Trace>,
}

impl<'f> Scope<'f> {
    fn new(fields: &'f [Field]) -> Self {
        Self {
            fields,
            trace: RefCell::new(Trace::default()),
        }
    }

    fn finish(self) -> Result<Trace> {
        let mut trace = self.trace.into_inner();
        match trace.fault.take() {
            Some(err) => Err(err),
            None => Ok(trace),
        }
    }

    fn var(&self, node: u32) -> Var<'_> {
        Var {
            trace: &self.trace,
            node,
        }
    }

    fn resolve(&self, id: FieldId, index: usize) -> Result<&'f Field> {
        let field = self.fields.get(id.0).ok_or(Error::UnknownField(id.0))?;
        if index >= field.len() {
            return Err(Error::IndexOutOfRange {
                field: field.name.clone(),
                index,
                len: field.len(),
            });
        }
        Ok(field)
    }

    /// Number of elements in `field`, or 0 for an unknown id.
    pub fn len(&self, field: FieldId) -> usize {
        self.fields.get(field.0).map_or(0, Field::len)
    }

    /// A constant.
    pub fn constant(&self, value: f32) -> Var<'_> {
        let node = self.trace.borrow_mut().push(Op::Const, [UNUSED; 2], value);
        self.var(node)
    }

    /// Differentiable read of `field[index]`.
    pub fn load(&self, field: FieldId, index: usize) -> Var<'_> {
        match self.resolve(field, index) {
            Ok(f) => {
                let value = f.value.data[index];
                let op = Op::Load {
                    field: field.0,
                    index,
                };
                let node = self.trace.borrow_mut().push(op, [UNUSED; 2], value);
                self.var(node)
            }
            Err(err) => {
                self.trace.borrow_mut().fault(err);
                self.constant(0.0)
            }
        }
    }

    /// Read of `field.grad[index]`, a constant as far as differentiation goes.
    pub fn load_grad(&self, field: FieldId, index: usize) -> Var<'_> {
        let value = self.resolve(field, index).and_then(|f| {
            f.grad
                .as_ref()
                .map(|g| g.data[index])
                .ok_or_else(|| Error::MissingGrad(f.name.clone()))
        });
        match value {
            Ok(value) => {
                let node = self.trace.borrow_mut().push(Op::LoadGrad, [UNUSED; 2], value);
                self.var(node)
            }
            Err(err) => {
                self.trace.borrow_mut().fault(err);
                self.constant(0.0)
            }
        }
    }

    /// `field[index] = value`, applied after the launch traced every iteration.
    pub fn store(&self, field: FieldId, index: usize, value: Var<'_>) {
        self.write(WriteMode::Store, field, index, value);
    }

    /// `field[index] += value`, applied after the launch traced every iteration.
    pub fn atomic_add(&self, field: FieldId, index: usize, value: Var<'_>) {
        self.write(WriteMode::AtomicAdd, field, index, value);
    }

    fn write(&self, mode: WriteMode, field: FieldId, index: usize, value: Var<'_>) {
        let mut trace = self.trace.borrow_mut();
        match self.resolve(field, index) {
            Ok(_) => trace.writes.push(Write {
                mode,
                field: field.0,
                index,
                node: value.node,
            }),
            Err(err) => trace.fault(err),
        }
    }
}

/// A traced scalar value inside a kernel body.
#[derive(Clone, Copy)]
pub struct Var<'s> {
    trace: &'s RefCell<Trace>,
    node: u32,
}

impl<'s> Var<'s> {
    /// Forward value of this variable.
    pub fn value(self) -> f32 {
        self.trace.borrow().value(self.node)
    }

    fn unary(self, op: Op) -> Self {
        let mut trace = self.trace.borrow_mut();
        let value = eval(op, trace.value(self.node), 0.0);
        let node = trace.push(op, [self.node, UNUSED], value);
        Self {
            trace: self.trace,
            node,
        }
    }

    fn binary(self, rhs: Self, op: Op) -> Self {
        let mut trace = self.trace.borrow_mut();
        let value = eval(op, trace.value(self.node), trace.value(rhs.node));
        let node = trace.push(op, [self.node, rhs.node], value);
        Self {
            trace: self.trace,
            node,
        }
    }

    fn lift(self, value: f32) -> Self {
        let node = self.trace.borrow_mut().push(Op::Const, [UNUSED; 2], value);
        Self {
            trace: self.trace,
            node,
        }
    }

    pub fn powi(self, n: i32) -> Self {
        self.unary(Op::Powi(n))
    }

    pub fn exp(self) -> Self {
        self.unary(Op::Exp)
    }

    pub fn ln(self) -> Self {
        self.unary(Op::Ln)
    }

    pub fn sqrt(self) -> Self {
        self.unary(Op::Sqrt)
    }

    pub fn sin(self) -> Self {
        self.unary(Op::Sin)
    }

    pub fn cos(self) -> Self {
        self.unary(Op::Cos)
    }

    pub fn tanh(self) -> Self {
        self.unary(Op::Tanh)
    }
}

impl fmt::Debug for Var<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Var")
            .field("node", &self.node)
            .field("value", &self.value())
            .finish()
    }
}

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $op:expr) => {
        impl<'s> $trait for Var<'s> {
            type Output = Var<'s>;

            fn $method(self, rhs: Var<'s>) -> Var<'s> {
                self.binary(rhs, $op)
            }
        }

        impl<'s> $trait<f32> for Var<'s> {
            type Output = Var<'s>;

            fn $method(self, rhs: f32) -> Var<'s> {
                let rhs = self.lift(rhs);
                self.binary(rhs, $op)
            }
        }

        impl<'s> $trait<Var<'s>> for f32 {
            type Output = Var<'s>;

            fn $method(self, rhs: Var<'s>) -> Var<'s> {
                rhs.lift(self).binary(rhs, $op)
            }
        }
    };
}

impl_binary_op!(Add, add, Op::Add);
impl_binary_op!(Sub, sub, Op::Sub);
impl_binary_op!(Mul, mul, Op::Mul);
impl_binary_op!(Div, div, Op::Div);

impl<'s> Neg for Var<'s> {
    type Output = Var<'s>;

    fn neg(self) -> Var<'s> {
        self.unary(Op::Neg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> Vec<Field> {
        let mut x = Field::zeros("x", vec![2], true);
        x.value.data = vec![3.0, -2.0];
        x.grad.as_mut().unwrap().data = vec![0.0, 0.0];
        let mut out = Field::zeros("out", Vec::<usize>::new(), true);
        out.grad.as_mut().unwrap().data = vec![1.0];
        vec![x, out]
    }

    #[test]
    fn partials_follow_chain_rule() {
        let fields = fields();
        let kernel = Kernel::single("f", |s| {
            let a = s.load(FieldId(0), 0);
            let b = s.load(FieldId(0), 1);
            // a * b + a^2 / b
            s.atomic_add(FieldId(1), 0, a * b + a.powi(2) / b);
        });
        let trace = kernel.trace(&fields, 0).unwrap();
        let (_, value) = trace.writes().next().unwrap();
        assert_eq!(value, 3.0 * -2.0 + 9.0 / -2.0);

        let mut grads = [0.0f32; 2];
        for c in trace.backward(&fields) {
            grads[c.index] += c.value;
        }
        // d/da = b + 2a/b, d/db = a - a^2/b^2
        assert!((grads[0] - (-2.0 + 6.0 / -2.0)).abs() < 1e-6);
        assert!((grads[1] - (3.0 - 9.0 / 4.0)).abs() < 1e-6);
    }

    #[test]
    fn powi_zero_has_no_gradient_at_origin() {
        let mut fields = fields();
        fields[0].value.data[0] = 0.0;
        let kernel = Kernel::single("p", |s| {
            let a = s.load(FieldId(0), 0);
            s.atomic_add(FieldId(1), 0, a.powi(0));
        });
        let trace = kernel.trace(&fields, 0).unwrap();
        assert!(trace.backward(&fields).is_empty());
    }

    #[test]
    fn out_of_range_load_faults() {
        let fields = fields();
        let kernel = Kernel::range("oob", 1, |s, _| {
            let v = s.load(FieldId(0), 5);
            s.store(FieldId(0), 0, v);
        });
        assert!(matches!(
            kernel.trace(&fields, 0),
            Err(Error::IndexOutOfRange { index: 5, len: 2, .. })
        ));
    }
}
