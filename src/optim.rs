//! Gradient descent.

use crate::error::Result;
use crate::field::FieldId;
use crate::kernel::Kernel;
use crate::runtime::Runtime;

/// Fixed-step gradient descent.
///
/// # Formula
///
/// $$ w := w - \text{lr} \cdot \frac{\partial L}{\partial w} $$
///
/// Unlike an optimizer that owns its parameters, the update is an ordinary
/// kernel over the parameter field. Gradients are left in place; the next
/// [`Runtime::tape`] clears them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientDescent {
    pub learning_rate: f32,
}

impl GradientDescent {
    pub fn new(learning_rate: f32) -> Self {
        Self { learning_rate }
    }

    /// Builds the update kernel `param[i] -= lr * param.grad[i]`.
    ///
    /// Launching it on a field without gradients fails with
    /// [`Error::MissingGrad`](crate::error::Error::MissingGrad).
    pub fn kernel(&self, param: FieldId) -> Kernel {
        let lr = self.learning_rate;
        Kernel::over("gradient_descent", param, move |s, i| {
            let w = s.load(param, i);
            let g = s.load_grad(param, i);
            s.store(param, i, w - g * lr);
        })
    }

    /// Applies one update to `param`.
    pub fn step(&self, rt: &mut Runtime, param: FieldId) -> Result<()> {
        rt.launch(&self.kernel(param))
    }
}
