//! Field storage, kernel launches and the gradient tape.
//!
//! A [`Runtime`] owns every field of a run and launches kernels against them
//! on the [`Arch`] it was created with.
//!
//! # Gradients
//!
//! Two ways to obtain `dL/dfield`:
//!
//! - **Tape**: [`Runtime::tape`] clears gradients and the loss, records every
//!   kernel launched inside its body, seeds `loss.grad = 1` and replays the
//!   recorded kernels' reverse sweeps in reverse launch order.
//! - **Manual**: clear gradients, zero the loss, seed its gradient, launch the
//!   forward kernel and then [`Runtime::launch_grad`] it.
//!
//! Both accumulate into the same gradient buffers and agree exactly.

use log::debug;

use crate::backend::{Arch, default_arch};
use crate::error::{Error, Result};
use crate::field::{Field, FieldId};
use crate::kernel::Kernel;
use crate::ops::dispatch;

/// Owner of all fields of a run.
#[derive(Debug)]
pub struct Runtime {
    arch: Arch,
    fields: Vec<Field>,
    recording: Option<Vec<Kernel>>,
    launches: usize,
}

impl Default for Runtime {
    /// A runtime on the process-wide [`default_arch`].
    fn default() -> Self {
        Self::new(default_arch())
    }
}

impl Runtime {
    pub fn new(arch: Arch) -> Self {
        Self {
            arch,
            fields: Vec::new(),
            recording: None,
            launches: 0,
        }
    }

    pub fn arch(&self) -> Arch {
        self.arch
    }

    /// Number of forward and reverse launches performed so far.
    pub fn launch_count(&self) -> usize {
        self.launches
    }

    /// Declares a zero-filled field of the given shape.
    ///
    /// # Errors
    /// [`Error::EmptyField`] if the shape has no elements.
    pub fn field(
        &mut self,
        name: &str,
        shape: impl Into<Vec<usize>>,
        needs_grad: bool,
    ) -> Result<FieldId> {
        let field = Field::zeros(name, shape, needs_grad);
        if field.is_empty() {
            return Err(Error::EmptyField(field.name));
        }
        Ok(self.push(field))
    }

    /// Declares a one-dimensional field of length `n`.
    pub fn vector(&mut self, name: &str, n: usize, needs_grad: bool) -> Result<FieldId> {
        self.field(name, vec![n], needs_grad)
    }

    /// Declares a scalar field (shape `[]`).
    pub fn scalar(&mut self, name: &str, needs_grad: bool) -> FieldId {
        self.push(Field::zeros(name, Vec::<usize>::new(), needs_grad))
    }

    fn push(&mut self, field: Field) -> FieldId {
        debug!(
            "declared field `{}` with shape {:?} (grad: {})",
            field.name,
            field.value.shape,
            field.needs_grad()
        );
        self.fields.push(field);
        FieldId(self.fields.len() - 1)
    }

    /// Borrows a field.
    pub fn field_ref(&self, id: FieldId) -> Result<&Field> {
        self.fields.get(id.0).ok_or(Error::UnknownField(id.0))
    }

    fn field_mut(&mut self, id: FieldId) -> Result<&mut Field> {
        self.fields.get_mut(id.0).ok_or(Error::UnknownField(id.0))
    }

    pub fn get(&self, id: FieldId, index: usize) -> Result<f32> {
        let field = self.field_ref(id)?;
        check_index(field, index)?;
        Ok(field.value.data[index])
    }

    pub fn set(&mut self, id: FieldId, index: usize, value: f32) -> Result<()> {
        let field = self.field_mut(id)?;
        check_index(field, index)?;
        field.value.data[index] = value;
        Ok(())
    }

    pub fn grad(&self, id: FieldId, index: usize) -> Result<f32> {
        let field = self.field_ref(id)?;
        check_index(field, index)?;
        let grad = field
            .grad
            .as_ref()
            .ok_or_else(|| Error::MissingGrad(field.name.clone()))?;
        Ok(grad.data[index])
    }

    pub fn set_grad(&mut self, id: FieldId, index: usize, value: f32) -> Result<()> {
        let field = self.field_mut(id)?;
        check_index(field, index)?;
        match &mut field.grad {
            Some(grad) => {
                grad.data[index] = value;
                Ok(())
            }
            None => Err(Error::MissingGrad(field.name.clone())),
        }
    }

    /// Copies the values of a field out.
    pub fn to_vec(&self, id: FieldId) -> Result<Vec<f32>> {
        Ok(self.field_ref(id)?.value.data.clone())
    }

    /// Copies the gradient of a field out.
    pub fn grad_to_vec(&self, id: FieldId) -> Result<Vec<f32>> {
        let field = self.field_ref(id)?;
        field
            .grad
            .as_ref()
            .map(|g| g.data.clone())
            .ok_or_else(|| Error::MissingGrad(field.name.clone()))
    }

    /// Overwrites every value of a field.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if `values` does not have exactly the field's length.
    pub fn copy_from_slice(&mut self, id: FieldId, values: &[f32]) -> Result<()> {
        let field = self.field_mut(id)?;
        if values.len() != field.len() {
            return Err(Error::ShapeMismatch {
                field: field.name.clone(),
                got: values.len(),
                expected: field.len(),
            });
        }
        field.value.data.copy_from_slice(values);
        Ok(())
    }

    /// Zeroes the gradient buffer of every field.
    pub fn clear_all_gradients(&mut self) {
        for field in &mut self.fields {
            field.clear_grad();
        }
    }

    /// Runs `kernel` forward. Recorded when a tape is active.
    ///
    /// A failed launch leaves every field untouched and is not recorded.
    pub fn launch(&mut self, kernel: &Kernel) -> Result<()> {
        dispatch::launch(self.arch, kernel, &mut self.fields)?;
        self.launches += 1;
        if let Some(recording) = &mut self.recording {
            recording.push(kernel.clone());
        }
        Ok(())
    }

    /// Runs the reverse sweep of `kernel`, accumulating into gradients.
    pub fn launch_grad(&mut self, kernel: &Kernel) -> Result<()> {
        dispatch::launch_grad(self.arch, kernel, &mut self.fields)?;
        self.launches += 1;
        Ok(())
    }

    /// Records the kernels launched by `body` and differentiates `loss` through them.
    ///
    /// # Behavior
    /// 1. Clears all gradients and sets `loss` to 0
    /// 2. Runs `body`, recording each successful [`launch`](Self::launch)
    /// 3. Sets `loss.grad` to 1 and runs the recorded reverse sweeps in reverse order
    ///
    /// # Errors
    /// - [`Error::InvalidLoss`] if `loss` is not a scalar with a gradient
    /// - [`Error::TapeActive`] when called from inside another tape
    /// - Whatever `body` or a reverse sweep returns; the tape is discarded
    pub fn tape<F>(&mut self, loss: FieldId, body: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        if self.recording.is_some() {
            return Err(Error::TapeActive);
        }
        let loss_field = self.field_ref(loss)?;
        if !loss_field.is_scalar() || !loss_field.needs_grad() {
            return Err(Error::InvalidLoss(loss_field.name.clone()));
        }

        self.clear_all_gradients();
        self.set(loss, 0, 0.0)?;

        self.recording = Some(Vec::new());
        let outcome = body(self);
        let recorded = self.recording.take().unwrap_or_default();
        outcome?;

        debug!("tape recorded {} kernels", recorded.len());
        self.set_grad(loss, 0, 1.0)?;
        for kernel in recorded.iter().rev() {
            self.launch_grad(kernel)?;
        }
        Ok(())
    }
}

fn check_index(field: &Field, index: usize) -> Result<()> {
    if index >= field.len() {
        return Err(Error::IndexOutOfRange {
            field: field.name.clone(),
            index,
            len: field.len(),
        });
    }
    Ok(())
}
