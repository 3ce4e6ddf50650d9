use ndarray::{Array2, Array3, ArrayView2, Axis};

use crate::error::{LstmError, Result};

/// Loss computed on one timestep's `(N, O)` slice of predictions and targets
pub trait LossFunction {
    /// Compute the loss between predictions and targets
    fn compute_loss(&self, predictions: &ArrayView2<f32>, targets: &ArrayView2<f32>) -> f32;

    /// Compute the gradient of the loss with respect to predictions, before any
    /// upstream scaling
    fn compute_gradient(&self, predictions: &ArrayView2<f32>, targets: &ArrayView2<f32>) -> Array2<f32>;
}

/// Mean Squared Error loss function
///
/// The gradient is the bare residual `prediction - target`, without the
/// `2/N` factor of the textbook derivative.
#[derive(Clone, Copy, Debug, Default)]
pub struct MSELoss;

impl LossFunction for MSELoss {
    fn compute_loss(&self, predictions: &ArrayView2<f32>, targets: &ArrayView2<f32>) -> f32 {
        let diff = predictions - targets;
        (&diff * &diff).mean().unwrap_or(0.0)
    }

    fn compute_gradient(&self, predictions: &ArrayView2<f32>, targets: &ArrayView2<f32>) -> Array2<f32> {
        predictions - targets
    }
}

/// Applies a per-step loss at every timestep of an `(N, T, O)` batch and
/// averages the results over time.
#[derive(Clone, Debug, Default)]
pub struct TimeDistributedLoss<L: LossFunction> {
    loss_fn: L,
    cache: Option<(Array3<f32>, Array3<f32>)>,
}

/// The regression loss: MSE averaged over the batch, then over time.
pub type TimeMSE = TimeDistributedLoss<MSELoss>;

impl<L: LossFunction> TimeDistributedLoss<L> {
    pub fn new(loss_fn: L) -> Self {
        TimeDistributedLoss { loss_fn, cache: None }
    }

    /// Mean over timesteps of the per-step loss.
    ///
    /// A trailing output axis of size 1 behaves exactly like a squeezed
    /// `(N, T)` batch, including when `N == 1`.
    pub fn forward(&mut self, predictions: &Array3<f32>, targets: &Array3<f32>) -> Result<f32> {
        if predictions.shape() != targets.shape() {
            return Err(LstmError::shape_mismatch("loss targets", targets.shape(), predictions.shape()));
        }

        let t_len = predictions.len_of(Axis(1));
        let total: f32 = (0..t_len)
            .map(|t| {
                self.loss_fn.compute_loss(
                    &predictions.index_axis(Axis(1), t),
                    &targets.index_axis(Axis(1), t),
                )
            })
            .sum();

        self.cache = Some((predictions.clone(), targets.clone()));
        Ok(total / t_len as f32)
    }

    /// Forgets the last forward pass so a following `backward` fails.
    pub fn clear(&mut self) {
        self.cache = None;
    }

    /// Spreads `seed / T` over every timestep and scales each step's raw gradient by it.
    pub fn backward(&mut self, seed: f32) -> Result<Array3<f32>> {
        let (predictions, targets) = self.cache.take().ok_or(LstmError::NoCachedForward { layer: "TimeDistributedLoss" })?;
        let t_len = predictions.len_of(Axis(1));
        let scale = seed / t_len as f32;

        let mut grads = Array3::zeros(predictions.raw_dim());
        for t in 0..t_len {
            let step = self.loss_fn.compute_gradient(
                &predictions.index_axis(Axis(1), t),
                &targets.index_axis(Axis(1), t),
            );
            grads.index_axis_mut(Axis(1), t).assign(&(step * scale));
        }

        Ok(grads)
    }
}
