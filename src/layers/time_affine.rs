use ndarray::{Array1, Array2, Array3, ArrayViewD, ArrayViewMutD, Axis};
use ndarray_rand::RandomExt;
use rand::Rng;
use rand_distr::StandardNormal;

use crate::error::{LstmError, Result};

/// Holds gradients for the affine parameters during backpropagation
#[derive(Clone, Debug)]
pub struct TimeAffineGradients {
    pub weight: Array2<f32>,
    pub bias: Array1<f32>,
}

/// One linear projection applied independently at every timestep.
///
/// Performs `y[:, t] = x[:, t]·W + b` for each `t` by folding the batch and
/// time axes into a single `N·T` row axis.
/// `weight` has shape (input_size, output_size) and `bias` has shape (output_size,).
#[derive(Clone, Debug)]
pub struct TimeAffine {
    pub weight: Array2<f32>,
    pub bias: Array1<f32>,
    pub input_size: usize,
    pub output_size: usize,
    grads: TimeAffineGradients,
    // flattened (N·T, D) input plus the (N, T) it was folded from
    input_cache: Option<(Array2<f32>, (usize, usize))>,
}

impl TimeAffine {
    /// Create a new layer with normal weights scaled by 1/√input_size and zero bias
    pub fn new(input_size: usize, output_size: usize) -> Self {
        Self::new_with_rng(input_size, output_size, &mut rand::thread_rng())
    }

    pub fn new_with_rng<R: Rng + ?Sized>(input_size: usize, output_size: usize, rng: &mut R) -> Self {
        let weight = Array2::<f32>::random_using((input_size, output_size), StandardNormal, rng)
            / (input_size as f32).sqrt();
        Self::assemble(weight, Array1::zeros(output_size))
    }

    /// Create a new layer with zero initialization
    pub fn new_zeros(input_size: usize, output_size: usize) -> Self {
        Self::assemble(Array2::zeros((input_size, output_size)), Array1::zeros(output_size))
    }

    /// Create a new layer from explicit weights
    pub fn from_weights(weight: Array2<f32>, bias: Array1<f32>) -> Result<Self> {
        if bias.len() != weight.ncols() {
            return Err(LstmError::shape_mismatch("affine bias", bias.shape(), &[weight.ncols()]));
        }
        Ok(Self::assemble(weight, bias))
    }

    fn assemble(weight: Array2<f32>, bias: Array1<f32>) -> Self {
        let (input_size, output_size) = weight.dim();
        let grads = TimeAffineGradients {
            weight: Array2::zeros(weight.raw_dim()),
            bias: Array1::zeros(bias.raw_dim()),
        };

        Self {
            weight,
            bias,
            input_size,
            output_size,
            grads,
            input_cache: None,
        }
    }

    /// Forward pass: `x (N, T, D)` to `y (N, T, O)`
    pub fn forward(&mut self, x: &Array3<f32>) -> Result<Array3<f32>> {
        let (n, t_len, d) = x.dim();

        let rx = x.as_standard_layout().into_owned().into_shape((n * t_len, d))?;
        let mut out = rx.dot(&self.weight);
        out += &self.bias;

        self.input_cache = Some((rx, (n, t_len)));
        Ok(out.into_shape((n, t_len, self.output_size))?)
    }

    /// Backward pass: `dy (N, T, O)` to `dx (N, T, D)`, storing `dW` and `db`
    pub fn backward(&mut self, dy: &Array3<f32>) -> Result<Array3<f32>> {
        let (rx, (n, t_len)) = self.input_cache.take().ok_or(LstmError::NoCachedForward { layer: "TimeAffine" })?;
        let d = rx.ncols();
        let expected = [n, t_len, self.output_size];
        if dy.shape() != expected {
            return Err(LstmError::shape_mismatch("TimeAffine upstream gradient", dy.shape(), &expected));
        }

        let rdy = dy.as_standard_layout().into_owned().into_shape((n * t_len, self.output_size))?;

        self.grads = TimeAffineGradients {
            weight: rx.t().dot(&rdy),
            bias: rdy.sum_axis(Axis(0)),
        };

        let dx = rdy.dot(&self.weight.t());
        Ok(dx.into_shape((n, t_len, d))?)
    }

    /// Gradients from the most recent backward pass
    pub fn grads(&self) -> &TimeAffineGradients {
        &self.grads
    }

    /// Parameters in `[weight, bias]` order.
    pub fn params(&self) -> Vec<ArrayViewD<'_, f32>> {
        vec![self.weight.view().into_dyn(), self.bias.view().into_dyn()]
    }

    pub fn grad_views(&self) -> Vec<ArrayViewD<'_, f32>> {
        vec![self.grads.weight.view().into_dyn(), self.grads.bias.view().into_dyn()]
    }

    pub fn params_and_grads_mut(&mut self) -> (Vec<ArrayViewMutD<'_, f32>>, Vec<ArrayViewD<'_, f32>>) {
        let params = vec![self.weight.view_mut().into_dyn(), self.bias.view_mut().into_dyn()];
        let grads = vec![self.grads.weight.view().into_dyn(), self.grads.bias.view().into_dyn()];
        (params, grads)
    }

    pub(crate) fn grads_mut(&mut self) -> Vec<ArrayViewMutD<'_, f32>> {
        vec![self.grads.weight.view_mut().into_dyn(), self.grads.bias.view_mut().into_dyn()]
    }

    /// Get the number of parameters in this layer
    pub fn num_parameters(&self) -> usize {
        self.weight.len() + self.bias.len()
    }

    /// Get layer dimensions
    pub fn dimensions(&self) -> (usize, usize) {
        (self.input_size, self.output_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2, arr3};

    #[test]
    fn test_time_affine_creation() {
        let layer = TimeAffine::new(10, 5);
        assert_eq!(layer.dimensions(), (10, 5));
        assert_eq!(layer.weight.shape(), &[10, 5]);
        assert_eq!(layer.bias.shape(), &[5]);
        assert_eq!(layer.num_parameters(), 10 * 5 + 5);
    }

    #[test]
    fn test_zero_layer_outputs_zero() {
        let mut layer = TimeAffine::new_zeros(3, 2);
        let x = Array3::ones((2, 4, 3));

        let y = layer.forward(&x).unwrap();
        assert_eq!(y.shape(), &[2, 4, 2]);
        assert!(y.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_same_projection_at_every_timestep() {
        let weight = arr2(&[[1.0, 0.0], [0.0, 2.0]]);
        let bias = arr1(&[0.5, -0.5]);
        let mut layer = TimeAffine::from_weights(weight, bias).unwrap();

        let x = arr3(&[[[1.0, 1.0], [2.0, 3.0]], [[0.0, -1.0], [4.0, 0.0]]]);
        let y = layer.forward(&x).unwrap();

        let expected = arr3(&[[[1.5_f32, 1.5], [2.5, 5.5]], [[0.5, -2.5], [4.5, -0.5]]]);
        assert_eq!(y, expected);
    }

    #[test]
    fn test_backward_gradients() {
        let weight = arr2(&[[1.0], [2.0]]);
        let mut layer = TimeAffine::from_weights(weight, arr1(&[0.0])).unwrap();

        let x = arr3(&[[[1.0, 2.0], [3.0, 4.0]]]); // (1, 2, 2)
        layer.forward(&x).unwrap();
        let dy = arr3(&[[[1.0], [0.5]]]);
        let dx = layer.backward(&dy).unwrap();

        // dW = xᵀ·dy over both timesteps, db = Σ dy, dx = dy·Wᵀ
        assert_eq!(layer.grads().weight, arr2(&[[2.5_f32], [4.0]]));
        assert_eq!(layer.grads().bias, arr1(&[1.5_f32]));
        assert_eq!(dx, arr3(&[[[1.0_f32, 2.0], [0.5, 1.0]]]));
    }

    #[test]
    fn test_backward_requires_forward() {
        let mut layer = TimeAffine::new(2, 1);
        let err = layer.backward(&Array3::zeros((1, 1, 1))).unwrap_err();
        assert!(matches!(err, LstmError::NoCachedForward { layer: "TimeAffine" }));
    }

    #[test]
    fn test_from_weights_checks_bias() {
        assert!(TimeAffine::from_weights(Array2::zeros((3, 2)), Array1::zeros(3)).is_err());
    }
}
