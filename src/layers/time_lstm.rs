use ndarray::{Array2, Array3, ArrayViewD, ArrayViewMutD, Axis};
use rand::Rng;

use crate::error::{LstmError, Result};
use crate::layers::lstm_cell::{LSTMCell, LSTMCellCache};

/// LSTM unrolled over the time axis of an `(N, T, D)` batch.
///
/// Every timestep shares the weights of a single [`LSTMCell`]; only the
/// per-step caches are kept between `forward` and `backward`. When `stateful`
/// is set, the final hidden and cell states of one call seed the next call
/// until [`TimeLSTM::reset_state`] is invoked.
#[derive(Clone, Debug)]
pub struct TimeLSTM {
    cell: LSTMCell,
    pub stateful: bool,
    h: Option<Array2<f32>>,
    c: Option<Array2<f32>>,
    dh: Option<Array2<f32>>,
    caches: Option<Vec<LSTMCellCache>>,
}

impl TimeLSTM {
    pub fn new(input_size: usize, hidden_size: usize, stateful: bool) -> Self {
        Self::from_cell(LSTMCell::new(input_size, hidden_size), stateful)
    }

    pub fn new_with_rng<R: Rng + ?Sized>(input_size: usize, hidden_size: usize, stateful: bool, rng: &mut R) -> Self {
        Self::from_cell(LSTMCell::new_with_rng(input_size, hidden_size, rng), stateful)
    }

    pub fn from_cell(cell: LSTMCell, stateful: bool) -> Self {
        TimeLSTM {
            cell,
            stateful,
            h: None,
            c: None,
            dh: None,
            caches: None,
        }
    }

    pub fn cell(&self) -> &LSTMCell {
        &self.cell
    }

    pub fn cell_mut(&mut self) -> &mut LSTMCell {
        &mut self.cell
    }

    pub fn input_size(&self) -> usize {
        self.cell.input_size
    }

    pub fn hidden_size(&self) -> usize {
        self.cell.hidden_size
    }

    /// Runs the cell over `xs (N, T, D)` in increasing time order and returns
    /// every hidden state as `(N, T, H)`.
    pub fn forward(&mut self, xs: &Array3<f32>) -> Result<Array3<f32>> {
        let (n, t_len, _) = xs.dim();
        let hidden_size = self.cell.hidden_size;

        let mut h = self.initial_state(self.h.as_ref(), n, "carried hidden state")?;
        let mut c = self.initial_state(self.c.as_ref(), n, "carried cell state")?;

        let mut hs = Array3::zeros((n, t_len, hidden_size));
        let mut caches = Vec::with_capacity(t_len);

        for t in 0..t_len {
            let x = xs.index_axis(Axis(1), t).to_owned();
            let (h_next, c_next, cache) = self.cell.forward_with_cache(&x, &h, &c);
            hs.index_axis_mut(Axis(1), t).assign(&h_next);
            caches.push(cache);
            h = h_next;
            c = c_next;
        }

        self.h = Some(h);
        self.c = Some(c);
        self.caches = Some(caches);
        Ok(hs)
    }

    fn initial_state(&self, carried: Option<&Array2<f32>>, n: usize, what: &'static str) -> Result<Array2<f32>> {
        let expected = [n, self.cell.hidden_size];
        match carried {
            Some(state) if self.stateful => {
                if state.shape() != expected {
                    return Err(LstmError::shape_mismatch(what, state.shape(), &expected));
                }
                Ok(state.clone())
            }
            _ => Ok(Array2::zeros(expected)),
        }
    }

    /// Truncated BPTT over the window seen by the last `forward`.
    ///
    /// Walks timesteps from last to first. The hidden gradient entering step
    /// `t` is `dhs[:, t]` plus whatever flowed back from step `t + 1`; the cell
    /// gradient only travels along the cell channel. Weight gradients are
    /// summed over all steps and replace the cell's previous gradients.
    pub fn backward(&mut self, dhs: &Array3<f32>) -> Result<Array3<f32>> {
        let caches = self.caches.take().ok_or(LstmError::NoCachedForward { layer: "TimeLSTM" })?;
        let (n, t_len, hidden_size) = dhs.dim();
        if t_len != caches.len() {
            return Err(LstmError::shape_mismatch(
                "TimeLSTM upstream gradient",
                dhs.shape(),
                &[n, caches.len(), hidden_size],
            ));
        }

        let mut dxs = Array3::zeros((n, t_len, self.cell.input_size));
        let mut dh = Array2::zeros((n, hidden_size));
        let mut dc = Array2::zeros((n, hidden_size));
        let mut total = self.cell.zero_gradients();

        for (t, cache) in caches.iter().enumerate().rev() {
            let dh_in = &dhs.index_axis(Axis(1), t) + &dh;
            let (step_grads, dx, dh_prev, dc_prev) = self.cell.backward_with_cache(&dh_in, &dc, cache);
            dxs.index_axis_mut(Axis(1), t).assign(&dx);
            total.accumulate(&step_grads);
            dh = dh_prev;
            dc = dc_prev;
        }

        self.cell.set_grads(total);
        self.dh = Some(dh);
        Ok(dxs)
    }

    /// Overrides the carried state. A missing cell state is zero-initialised on
    /// the next forward call.
    pub fn set_state(&mut self, h: Array2<f32>, c: Option<Array2<f32>>) {
        self.h = Some(h);
        self.c = c;
    }

    /// Drops the carried state so the next forward call starts from zeros.
    pub fn reset_state(&mut self) {
        self.h = None;
        self.c = None;
    }

    /// Hidden and cell state left by the last forward call (or `set_state`).
    pub fn state(&self) -> (Option<&Array2<f32>>, Option<&Array2<f32>>) {
        (self.h.as_ref(), self.c.as_ref())
    }

    /// Gradient with respect to the initial hidden state of the last backward window.
    pub fn hidden_gradient(&self) -> Option<&Array2<f32>> {
        self.dh.as_ref()
    }

    pub fn params(&self) -> Vec<ArrayViewD<'_, f32>> {
        self.cell.params()
    }

    pub fn grads(&self) -> Vec<ArrayViewD<'_, f32>> {
        self.cell.grad_views()
    }

    pub fn params_and_grads_mut(&mut self) -> (Vec<ArrayViewMutD<'_, f32>>, Vec<ArrayViewD<'_, f32>>) {
        self.cell.params_and_grads_mut()
    }

    pub(crate) fn grads_mut(&mut self) -> Vec<ArrayViewMutD<'_, f32>> {
        self.cell.grads_mut()
    }
}
