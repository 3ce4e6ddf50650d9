use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD, Zip};

use crate::error::{LstmError, Result};

/// Numerical-stability term added to √v in the Adam update.
pub const ADAM_EPSILON: f32 = 1e-7;

/// Optimizer trait for in-place parameter updates.
///
/// `params[i]` is updated with `grads[i]`; both lists come from the model in
/// the same fixed order on every call.
pub trait Optimizer {
    fn update(&mut self, params: &mut [ArrayViewMutD<'_, f32>], grads: &[ArrayViewD<'_, f32>]) -> Result<()>;
    fn reset(&mut self);
}

fn check_aligned(params: &[ArrayViewMutD<'_, f32>], grads: &[ArrayViewD<'_, f32>]) -> Result<()> {
    if params.len() != grads.len() {
        return Err(LstmError::ParameterCount {
            got: grads.len(),
            expected: params.len(),
        });
    }
    for (param, grad) in params.iter().zip(grads) {
        if param.shape() != grad.shape() {
            return Err(LstmError::shape_mismatch("gradient", grad.shape(), param.shape()));
        }
    }
    Ok(())
}

/// Stochastic Gradient Descent: θ = θ - η∇θ
#[derive(Clone, Debug)]
pub struct SGD {
    learning_rate: f32,
}

impl SGD {
    pub fn new(learning_rate: f32) -> Self {
        SGD { learning_rate }
    }
}

impl Optimizer for SGD {
    fn update(&mut self, params: &mut [ArrayViewMutD<'_, f32>], grads: &[ArrayViewD<'_, f32>]) -> Result<()> {
        check_aligned(params, grads)?;
        for (param, grad) in params.iter_mut().zip(grads) {
            param.scaled_add(-self.learning_rate, grad);
        }
        Ok(())
    }

    fn reset(&mut self) {
        // SGD has no state to reset
    }
}

/// First and second moment estimates, one pair per parameter
#[derive(Clone, Debug)]
pub struct Moments {
    pub m: Vec<ArrayD<f32>>,
    pub v: Vec<ArrayD<f32>>,
}

/// Adam optimizer (<http://arxiv.org/abs/1412.6980v8>)
///
/// Folds both bias corrections into the step size:
///
///   lr_t = lr · √(1 - β₂ᵗ) / (1 - β₁ᵗ)
///   m    = m + (1 - β₁)(g - m)
///   v    = v + (1 - β₂)(g² - v)
///   θ    = θ - lr_t · m / (√v + ε)
///
/// No per-parameter scaling or clipping is applied here.
#[derive(Clone, Debug)]
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    iter: i32,
    moments: Option<Moments>,
}

impl Adam {
    pub fn new(learning_rate: f32) -> Self {
        Adam::with_params(learning_rate, 0.9, 0.999)
    }

    pub fn with_params(learning_rate: f32, beta1: f32, beta2: f32) -> Self {
        Adam {
            learning_rate,
            beta1,
            beta2,
            iter: 0,
            moments: None,
        }
    }

    pub fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    /// Number of update calls since construction or the last reset.
    pub fn iterations(&self) -> i32 {
        self.iter
    }

    /// Moment estimates, allocated on the first `update`.
    pub fn moments(&self) -> Option<&Moments> {
        self.moments.as_ref()
    }
}

impl Optimizer for Adam {
    fn update(&mut self, params: &mut [ArrayViewMutD<'_, f32>], grads: &[ArrayViewD<'_, f32>]) -> Result<()> {
        check_aligned(params, grads)?;

        let moments = self.moments.get_or_insert_with(|| Moments {
            m: params.iter().map(|p| ArrayD::zeros(p.raw_dim())).collect(),
            v: params.iter().map(|p| ArrayD::zeros(p.raw_dim())).collect(),
        });
        if moments.m.len() != params.len() {
            return Err(LstmError::ParameterCount {
                got: params.len(),
                expected: moments.m.len(),
            });
        }
        for (param, m) in params.iter().zip(&moments.m) {
            if param.shape() != m.shape() {
                return Err(LstmError::shape_mismatch("parameter", param.shape(), m.shape()));
            }
        }

        self.iter += 1;
        let (beta1, beta2) = (self.beta1, self.beta2);
        let lr_t = self.learning_rate * (1.0 - beta2.powi(self.iter)).sqrt() / (1.0 - beta1.powi(self.iter));

        for (((param, grad), m), v) in params
            .iter_mut()
            .zip(grads)
            .zip(moments.m.iter_mut())
            .zip(moments.v.iter_mut())
        {
            Zip::from(param).and(grad).and(m).and(v).for_each(|p, &g, m, v| {
                *m += (1.0 - beta1) * (g - *m);
                *v += (1.0 - beta2) * (g * g - *v);
                *p -= lr_t * *m / (v.sqrt() + ADAM_EPSILON);
            });
        }

        Ok(())
    }

    fn reset(&mut self) {
        self.iter = 0;
        self.moments = None;
    }
}
