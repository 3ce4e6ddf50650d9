use ndarray::{s, Array1, Array2, ArrayViewD, ArrayViewMutD, Axis};
use ndarray_rand::RandomExt;
use rand::Rng;
use rand_distr::StandardNormal;

use crate::error::{LstmError, Result};
use crate::utils::{sigmoid, sigmoid_grad, tanh, tanh_grad};

/// Holds gradients for all LSTM cell parameters during backpropagation
#[derive(Clone, Debug)]
pub struct LSTMCellGradients {
    pub w_x: Array2<f32>,
    pub w_h: Array2<f32>,
    pub b: Array1<f32>,
}

impl LSTMCellGradients {
    /// Adds another set of gradients into this one (used to sum over timesteps).
    pub fn accumulate(&mut self, other: &LSTMCellGradients) {
        self.w_x += &other.w_x;
        self.w_h += &other.w_h;
        self.b += &other.b;
    }
}

/// Caches intermediate values during forward pass for efficient backward computation
#[derive(Clone, Debug)]
pub struct LSTMCellCache {
    pub input: Array2<f32>,
    pub h_prev: Array2<f32>,
    pub c_prev: Array2<f32>,
    pub forget_gate: Array2<f32>,
    pub cell_gate: Array2<f32>,
    pub input_gate: Array2<f32>,
    pub output_gate: Array2<f32>,
    pub c_next: Array2<f32>,
}

/// LSTM cell operating on a batch of row vectors.
///
/// Shapes: `x (N, D)`, `h, c (N, H)`, `w_x (D, 4H)`, `w_h (H, 4H)`, `b (4H,)`.
///
/// The fused pre-activation `A = x·w_x + h·w_h + b` is split column-wise as
/// `[forget | cell candidate | input | output]`. Saved weights depend on this
/// order, so it must not change.
///
/// - f_t = σ(A_f), g_t = tanh(A_g), i_t = σ(A_i), o_t = σ(A_o)
/// - c_t = f_t ⊙ c_t-1 + g_t ⊙ i_t
/// - h_t = o_t ⊙ tanh(c_t)
#[derive(Clone, Debug)]
pub struct LSTMCell {
    pub w_x: Array2<f32>, // (input_size, 4*hidden_size)
    pub w_h: Array2<f32>, // (hidden_size, 4*hidden_size)
    pub b: Array1<f32>,   // (4*hidden_size,)
    pub input_size: usize,
    pub hidden_size: usize,
    grads: LSTMCellGradients,
    cache: Option<LSTMCellCache>,
}

impl LSTMCell {
    /// Creates a new cell with normal weights scaled by 1/√fan_in and zero bias
    pub fn new(input_size: usize, hidden_size: usize) -> Self {
        Self::new_with_rng(input_size, hidden_size, &mut rand::thread_rng())
    }

    pub fn new_with_rng<R: Rng + ?Sized>(input_size: usize, hidden_size: usize, rng: &mut R) -> Self {
        let w_x = Array2::<f32>::random_using((input_size, 4 * hidden_size), StandardNormal, rng)
            / (input_size as f32).sqrt();
        let w_h = Array2::<f32>::random_using((hidden_size, 4 * hidden_size), StandardNormal, rng)
            / (hidden_size as f32).sqrt();
        let b = Array1::zeros(4 * hidden_size);

        Self::assemble(w_x, w_h, b)
    }

    /// Builds a cell from explicit weights, checking that their shapes agree.
    pub fn from_weights(w_x: Array2<f32>, w_h: Array2<f32>, b: Array1<f32>) -> Result<Self> {
        let hidden_size = w_h.nrows();
        let expected = [hidden_size, 4 * hidden_size];
        if w_h.shape() != expected {
            return Err(LstmError::shape_mismatch("LSTM w_h", w_h.shape(), &expected));
        }
        if w_x.ncols() != 4 * hidden_size {
            return Err(LstmError::shape_mismatch(
                "LSTM w_x",
                w_x.shape(),
                &[w_x.nrows(), 4 * hidden_size],
            ));
        }
        if b.len() != 4 * hidden_size {
            return Err(LstmError::shape_mismatch("LSTM b", b.shape(), &[4 * hidden_size]));
        }

        Ok(Self::assemble(w_x, w_h, b))
    }

    fn assemble(w_x: Array2<f32>, w_h: Array2<f32>, b: Array1<f32>) -> Self {
        let input_size = w_x.nrows();
        let hidden_size = w_h.nrows();
        let grads = LSTMCellGradients {
            w_x: Array2::zeros(w_x.raw_dim()),
            w_h: Array2::zeros(w_h.raw_dim()),
            b: Array1::zeros(b.raw_dim()),
        };

        LSTMCell {
            w_x,
            w_h,
            b,
            input_size,
            hidden_size,
            grads,
            cache: None,
        }
    }

    /// Single-step forward pass that remembers its cache for `backward`.
    pub fn forward(&mut self, x: &Array2<f32>, h_prev: &Array2<f32>, c_prev: &Array2<f32>) -> (Array2<f32>, Array2<f32>) {
        let (h_next, c_next, cache) = self.forward_with_cache(x, h_prev, c_prev);
        self.cache = Some(cache);
        (h_next, c_next)
    }

    /// Single-step backward pass. Consumes the cache left by `forward` and
    /// overwrites this cell's gradients.
    ///
    /// Returns `(dx, dh_prev, dc_prev)`.
    pub fn backward(&mut self, dh_next: &Array2<f32>, dc_next: &Array2<f32>) -> Result<(Array2<f32>, Array2<f32>, Array2<f32>)> {
        let cache = self.cache.take().ok_or(LstmError::NoCachedForward { layer: "LSTMCell" })?;
        let (grads, dx, dh_prev, dc_prev) = self.backward_with_cache(dh_next, dc_next, &cache);
        self.grads = grads;
        Ok((dx, dh_prev, dc_prev))
    }

    /// Forward pass that hands the cache back to the caller instead of storing it.
    pub fn forward_with_cache(&self, x: &Array2<f32>, h_prev: &Array2<f32>, c_prev: &Array2<f32>) -> (Array2<f32>, Array2<f32>, LSTMCellCache) {
        let h = self.hidden_size;

        let mut a = x.dot(&self.w_x) + h_prev.dot(&self.w_h);
        a += &self.b;

        let forget_gate = a.slice(s![.., 0..h]).mapv(sigmoid);
        let cell_gate = a.slice(s![.., h..2 * h]).mapv(tanh);
        let input_gate = a.slice(s![.., 2 * h..3 * h]).mapv(sigmoid);
        let output_gate = a.slice(s![.., 3 * h..4 * h]).mapv(sigmoid);

        let c_next = &forget_gate * c_prev + &cell_gate * &input_gate;
        let h_next = &output_gate * &c_next.mapv(tanh);

        let cache = LSTMCellCache {
            input: x.clone(),
            h_prev: h_prev.clone(),
            c_prev: c_prev.clone(),
            forget_gate,
            cell_gate,
            input_gate,
            output_gate,
            c_next: c_next.clone(),
        };

        (h_next, c_next, cache)
    }

    /// Backward pass against an explicit cache.
    ///
    /// Returns (parameter_gradients, dx, dh_prev, dc_prev)
    pub fn backward_with_cache(
        &self,
        dh_next: &Array2<f32>,
        dc_next: &Array2<f32>,
        cache: &LSTMCellCache,
    ) -> (LSTMCellGradients, Array2<f32>, Array2<f32>, Array2<f32>) {
        let h = self.hidden_size;
        let tanh_c_next = cache.c_next.mapv(tanh);

        // Total gradient reaching c_t: direct path plus the path through h_t
        let ds = dc_next + &(dh_next * &cache.output_gate * &tanh_c_next.mapv(tanh_grad));
        let dc_prev = &ds * &cache.forget_gate;

        let df_raw = &ds * &cache.c_prev * &cache.forget_gate.mapv(sigmoid_grad);
        let dg_raw = &ds * &cache.input_gate * &cache.cell_gate.mapv(tanh_grad);
        let di_raw = &ds * &cache.cell_gate * &cache.input_gate.mapv(sigmoid_grad);
        let do_raw = dh_next * &tanh_c_next * &cache.output_gate.mapv(sigmoid_grad);

        // Same column order as the forward slices
        let mut da = Array2::zeros((ds.nrows(), 4 * h));
        da.slice_mut(s![.., 0..h]).assign(&df_raw);
        da.slice_mut(s![.., h..2 * h]).assign(&dg_raw);
        da.slice_mut(s![.., 2 * h..3 * h]).assign(&di_raw);
        da.slice_mut(s![.., 3 * h..4 * h]).assign(&do_raw);

        let gradients = LSTMCellGradients {
            w_x: cache.input.t().dot(&da),
            w_h: cache.h_prev.t().dot(&da),
            b: da.sum_axis(Axis(0)),
        };

        let dx = da.dot(&self.w_x.t());
        let dh_prev = da.dot(&self.w_h.t());

        (gradients, dx, dh_prev, dc_prev)
    }

    /// Gradients from the most recent backward pass
    pub fn grads(&self) -> &LSTMCellGradients {
        &self.grads
    }

    pub(crate) fn set_grads(&mut self, grads: LSTMCellGradients) {
        self.grads = grads;
    }

    /// Initialize zero gradients for accumulation
    pub fn zero_gradients(&self) -> LSTMCellGradients {
        LSTMCellGradients {
            w_x: Array2::zeros(self.w_x.raw_dim()),
            w_h: Array2::zeros(self.w_h.raw_dim()),
            b: Array1::zeros(self.b.raw_dim()),
        }
    }

    /// Parameters in `[w_x, w_h, b]` order.
    pub fn params(&self) -> Vec<ArrayViewD<'_, f32>> {
        vec![self.w_x.view().into_dyn(), self.w_h.view().into_dyn(), self.b.view().into_dyn()]
    }

    /// Gradients in the same order as `params`.
    pub fn grad_views(&self) -> Vec<ArrayViewD<'_, f32>> {
        vec![
            self.grads.w_x.view().into_dyn(),
            self.grads.w_h.view().into_dyn(),
            self.grads.b.view().into_dyn(),
        ]
    }

    /// Mutable parameter views alongside read-only gradient views, for optimizers.
    pub fn params_and_grads_mut(&mut self) -> (Vec<ArrayViewMutD<'_, f32>>, Vec<ArrayViewD<'_, f32>>) {
        let params = vec![
            self.w_x.view_mut().into_dyn(),
            self.w_h.view_mut().into_dyn(),
            self.b.view_mut().into_dyn(),
        ];
        let grads = vec![
            self.grads.w_x.view().into_dyn(),
            self.grads.w_h.view().into_dyn(),
            self.grads.b.view().into_dyn(),
        ];
        (params, grads)
    }

    pub(crate) fn grads_mut(&mut self) -> Vec<ArrayViewMutD<'_, f32>> {
        vec![
            self.grads.w_x.view_mut().into_dyn(),
            self.grads.w_h.view_mut().into_dyn(),
            self.grads.b.view_mut().into_dyn(),
        ]
    }

    pub fn num_parameters(&self) -> usize {
        self.w_x.len() + self.w_h.len() + self.b.len()
    }
}
