use ndarray::{Array3, ArrayD, ArrayViewD, ArrayViewMutD, Ix1, Ix2, IxDyn};
use rand::Rng;

use crate::error::{LstmError, Result};
use crate::layers::lstm_cell::LSTMCell;
use crate::layers::time_affine::TimeAffine;
use crate::layers::time_lstm::TimeLSTM;
use crate::loss::TimeMSE;

/// Number of trainable arrays: LSTM `[w_x, w_h, b]` then affine `[weight, bias]`.
pub const NUM_PARAM_ARRAYS: usize = 5;

/// Sequence regressor: `TimeLSTM -> TimeAffine -> TimeMSE`.
///
/// Owns every trainable array. `params()` and `grads()` always list them in
/// the same order (LSTM `w_x, w_h, b`, then affine `weight, bias`), which is
/// the order optimizers and saved parameter files rely on.
#[derive(Clone, Debug)]
pub struct LSTMRegressor {
    lstm: TimeLSTM,
    affine: TimeAffine,
    loss: TimeMSE,
    pub input_size: usize,
    pub hidden_size: usize,
    pub output_size: usize,
}

impl LSTMRegressor {
    /// Creates a stateful regressor with one output per timestep
    pub fn new(input_size: usize, hidden_size: usize) -> Self {
        Self::new_with_rng(input_size, hidden_size, &mut rand::thread_rng())
    }

    pub fn new_with_rng<R: Rng + ?Sized>(input_size: usize, hidden_size: usize, rng: &mut R) -> Self {
        let lstm = TimeLSTM::new_with_rng(input_size, hidden_size, true, rng);
        let affine = TimeAffine::new_with_rng(hidden_size, 1, rng);
        Self::assemble(lstm, affine)
    }

    /// Builds a regressor from existing layers, checking that they connect.
    pub fn from_layers(cell: LSTMCell, affine: TimeAffine, stateful: bool) -> Result<Self> {
        if affine.input_size != cell.hidden_size {
            return Err(LstmError::shape_mismatch(
                "affine weight",
                affine.weight.shape(),
                &[cell.hidden_size, affine.output_size],
            ));
        }
        Ok(Self::assemble(TimeLSTM::from_cell(cell, stateful), affine))
    }

    /// Rebuilds a regressor from a parameter list in contract order.
    pub fn from_params(params: Vec<ArrayD<f32>>, stateful: bool) -> Result<Self> {
        let [w_x, w_h, b, weight, bias]: [ArrayD<f32>; NUM_PARAM_ARRAYS] =
            params.try_into().map_err(|params: Vec<ArrayD<f32>>| LstmError::ParameterCount {
                got: params.len(),
                expected: NUM_PARAM_ARRAYS,
            })?;

        let cell = LSTMCell::from_weights(
            w_x.into_dimensionality::<Ix2>()?,
            w_h.into_dimensionality::<Ix2>()?,
            b.into_dimensionality::<Ix1>()?,
        )?;
        let affine = TimeAffine::from_weights(weight.into_dimensionality::<Ix2>()?, bias.into_dimensionality::<Ix1>()?)?;
        Self::from_layers(cell, affine, stateful)
    }

    fn assemble(lstm: TimeLSTM, affine: TimeAffine) -> Self {
        let input_size = lstm.input_size();
        let hidden_size = lstm.hidden_size();
        let output_size = affine.output_size;
        LSTMRegressor {
            lstm,
            affine,
            loss: TimeMSE::default(),
            input_size,
            hidden_size,
            output_size,
        }
    }

    /// Carry (or stop carrying) hidden state across forward calls
    pub fn with_stateful(mut self, stateful: bool) -> Self {
        self.lstm.stateful = stateful;
        self.lstm.reset_state();
        self
    }

    pub fn is_stateful(&self) -> bool {
        self.lstm.stateful
    }

    pub fn lstm(&self) -> &TimeLSTM {
        &self.lstm
    }

    pub fn lstm_mut(&mut self) -> &mut TimeLSTM {
        &mut self.lstm
    }

    pub fn affine(&self) -> &TimeAffine {
        &self.affine
    }

    /// Raw predictions `(N, T, O)` for inputs `(N, T, D)`, without the loss layer.
    ///
    /// Discards any loss from an earlier `forward`, so `backward` afterwards
    /// fails instead of mixing two passes.
    pub fn predict(&mut self, xs: &Array3<f32>) -> Result<Array3<f32>> {
        self.loss.clear();
        let hs = self.lstm.forward(xs)?;
        self.affine.forward(&hs)
    }

    /// Predicts and returns the loss against `ts (N, T, O)`.
    ///
    /// Targets are checked before anything runs; on a mismatch the carried
    /// state and the layer caches are left as they were.
    pub fn forward(&mut self, xs: &Array3<f32>, ts: &Array3<f32>) -> Result<f32> {
        let (n, t_len, _) = xs.dim();
        let expected = [n, t_len, self.output_size];
        if ts.shape() != expected {
            return Err(LstmError::shape_mismatch("loss targets", ts.shape(), &expected));
        }

        let score = self.predict(xs)?;
        self.loss.forward(&score, ts)
    }

    /// Backpropagates loss -> affine -> LSTM, leaving fresh gradients behind.
    ///
    /// Returns the gradient with respect to the inputs of the last forward call.
    pub fn backward(&mut self, seed: f32) -> Result<Array3<f32>> {
        let dout = self.loss.backward(seed)?;
        let dhs = self.affine.backward(&dout)?;
        self.lstm.backward(&dhs)
    }

    pub fn reset_state(&mut self) {
        self.lstm.reset_state();
    }

    /// Parameter views in the fixed contract order
    pub fn params(&self) -> Vec<ArrayViewD<'_, f32>> {
        let mut params = self.lstm.params();
        params.extend(self.affine.params());
        params
    }

    /// Gradient views aligned with `params()`
    pub fn grads(&self) -> Vec<ArrayViewD<'_, f32>> {
        let mut grads = self.lstm.grads();
        grads.extend(self.affine.grad_views());
        grads
    }

    /// Mutable parameter views with the matching gradient views, for an optimizer step
    pub fn params_and_grads_mut(&mut self) -> (Vec<ArrayViewMutD<'_, f32>>, Vec<ArrayViewD<'_, f32>>) {
        let (mut params, mut grads) = self.lstm.params_and_grads_mut();
        let (affine_params, affine_grads) = self.affine.params_and_grads_mut();
        params.extend(affine_params);
        grads.extend(affine_grads);
        (params, grads)
    }

    /// Owned copy of every parameter, in contract order
    pub fn export_params(&self) -> Vec<ArrayD<f32>> {
        self.params().into_iter().map(|p| p.to_owned()).collect()
    }

    /// Replaces every parameter, provided the list matches the current one in
    /// length and in each array's shape. Nothing is modified on failure.
    pub fn set_params(&mut self, params: Vec<ArrayD<f32>>) -> Result<()> {
        {
            let current = self.params();
            if params.len() != current.len() {
                return Err(LstmError::ParameterCount {
                    got: params.len(),
                    expected: current.len(),
                });
            }
            for (new, old) in params.iter().zip(&current) {
                if new.shape() != old.shape() {
                    return Err(LstmError::shape_mismatch("loaded parameter", new.shape(), old.shape()));
                }
            }
        }

        let (mut targets, _) = self.params_and_grads_mut();
        for (target, source) in targets.iter_mut().zip(&params) {
            target.assign(source);
        }
        log::debug!("replaced {} parameter arrays", params.len());
        Ok(())
    }

    /// Rescales all gradients together when their global L2 norm exceeds `max_norm`.
    ///
    /// Returns the norm measured before clipping.
    pub fn clip_gradients(&mut self, max_norm: f32) -> f32 {
        let total_norm = self
            .grads()
            .iter()
            .map(|g| g.iter().map(|&x| x * x).sum::<f32>())
            .sum::<f32>()
            .sqrt();

        let rate = max_norm / (total_norm + 1e-6);
        if rate < 1.0 {
            for mut grad in self.lstm.grads_mut().into_iter().chain(self.affine.grads_mut()) {
                grad *= rate;
            }
        }
        total_norm
    }

    /// Get the number of parameters in this model
    pub fn num_parameters(&self) -> usize {
        self.params().iter().map(|p| p.len()).sum()
    }

    /// Shapes of the parameter arrays, in contract order
    pub fn param_shapes(&self) -> Vec<IxDyn> {
        self.params().iter().map(|p| p.raw_dim()).collect()
    }
}
