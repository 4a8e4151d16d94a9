//! Fixed-shape numeric buffers with optional gradients.
//!
//! A [`Tensor`] is a shape plus flat row-major data. A [`Field`] pairs a
//! `Tensor<f32>` value with an optional gradient of the same shape, which is
//! what kernels read from and write to. Fields live inside a
//! [`Runtime`](crate::runtime::Runtime) and are addressed by [`FieldId`].
//!
//! ## Example
//!
//! ```rust
//! use tapegrad::field::Tensor;
//! let t = Tensor::new(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
//! assert_eq!(t.shape, vec![2, 3]);
//! ```

/// Shape plus flat row-major data. `[]` is a scalar holding one element.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor<T> {
    pub shape: Vec<usize>,
    pub data: Vec<T>,
}

impl<T> Tensor<T> {
    /// # Panics
    /// If `data.len()` differs from the product of `shape`.
    pub fn new(shape: impl Into<Vec<usize>>, data: Vec<T>) -> Self {
        let shape = shape.into();
        let expected = element_count(&shape);
        if data.len() != expected {
            panic!(
                "tensor of shape {shape:?} needs {expected} elements, got {}",
                data.len()
            );
        }
        Self { shape, data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl<T: Clone + Default> Tensor<T> {
    pub fn zeros(shape: impl Into<Vec<usize>>) -> Self {
        let shape = shape.into();
        let data = vec![T::default(); element_count(&shape)];
        Self::new(shape, data)
    }
}

fn element_count(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// Handle to a field owned by a runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldId(pub(crate) usize);

impl FieldId {
    /// Position of the field inside its runtime.
    pub fn index(self) -> usize {
        self.0
    }
}

/// A named `f32` buffer, optionally carrying a gradient buffer of the same shape.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub value: Tensor<f32>,
    pub grad: Option<Tensor<f32>>,
}

impl Field {
    /// Creates a zero-filled field.
    pub fn zeros(name: impl Into<String>, shape: impl Into<Vec<usize>>, needs_grad: bool) -> Self {
        let value = Tensor::zeros(shape);
        let grad = needs_grad.then(|| Tensor::zeros(value.shape.clone()));
        Self {
            name: name.into(),
            value,
            grad,
        }
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// `true` for shape `[]`.
    pub fn is_scalar(&self) -> bool {
        self.value.shape.is_empty()
    }

    pub fn needs_grad(&self) -> bool {
        self.grad.is_some()
    }

    /// Zeroes the gradient buffer, if any.
    pub fn clear_grad(&mut self) {
        if let Some(grad) = &mut self.grad {
            grad.data.fill(0.0);
        }
    }
}
