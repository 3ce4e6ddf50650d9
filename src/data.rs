use ndarray::{s, Array1, Array2, Array3, Axis};

use crate::error::{LstmError, Result};

/// Pairs each row of `features` with the *next* value of `target`.
///
/// Returns `(features[..L-1], target[1..])` so that a model fed with day `t`
/// learns to predict day `t + 1`.
pub fn next_step_pairs(features: &Array2<f32>, target: &Array1<f32>) -> Result<(Array2<f32>, Array1<f32>)> {
    let len = features.nrows();
    if target.len() != len {
        return Err(LstmError::shape_mismatch("target series", target.shape(), &[len]));
    }
    if len < 2 {
        return Ok((Array2::zeros((0, features.ncols())), Array1::zeros(0)));
    }

    Ok((features.slice(s![..len - 1, ..]).to_owned(), target.slice(s![1..]).to_owned()))
}

/// Per-column min-max scaling to `[0, 1]`
#[derive(Clone, Debug)]
pub struct MinMaxScaler {
    pub min: Array1<f32>,
    pub max: Array1<f32>,
}

impl MinMaxScaler {
    /// Learns each column's range. Constant columns later scale to 0.
    pub fn fit(data: &Array2<f32>) -> Self {
        let min = data.fold_axis(Axis(0), f32::INFINITY, |&acc, &x| acc.min(x));
        let max = data.fold_axis(Axis(0), f32::NEG_INFINITY, |&acc, &x| acc.max(x));
        MinMaxScaler { min, max }
    }

    pub fn transform(&self, data: &Array2<f32>) -> Array2<f32> {
        let range = self.range();
        let mut scaled = data - &self.min;
        scaled /= &range;
        scaled
    }

    pub fn fit_transform(data: &Array2<f32>) -> (Self, Array2<f32>) {
        let scaler = Self::fit(data);
        let scaled = scaler.transform(data);
        (scaler, scaled)
    }

    pub fn inverse_transform(&self, data: &Array2<f32>) -> Array2<f32> {
        let mut restored = data * &self.range();
        restored += &self.min;
        restored
    }

    fn range(&self) -> Array1<f32> {
        (&self.max - &self.min).mapv(|r| if r > 0.0 { r } else { 1.0 })
    }
}

/// Cuts an aligned `(inputs, targets)` series into `(N, T, D)` / `(N, T, 1)` batches.
///
/// The series is split into `batch_size` lanes starting at offsets
/// `i * (L / batch_size)`. Each batch advances every lane by `time_size`
/// steps, wrapping around the end of the series, so consecutive batches
/// continue each lane where the previous batch stopped. That continuity is
/// what lets a stateful LSTM carry its state from batch to batch.
#[derive(Clone, Debug)]
pub struct TimeSeriesBatcher {
    inputs: Array2<f32>,
    targets: Array1<f32>,
    batch_size: usize,
    time_size: usize,
    offsets: Vec<usize>,
    time_idx: usize,
}

impl TimeSeriesBatcher {
    pub fn new(inputs: Array2<f32>, targets: Array1<f32>, batch_size: usize, time_size: usize) -> Result<Self> {
        let len = inputs.nrows();
        if targets.len() != len {
            return Err(LstmError::shape_mismatch("batcher targets", targets.shape(), &[len]));
        }
        if batch_size == 0 || time_size == 0 {
            return Err(LstmError::InvalidInput("batch_size and time_size must be positive"));
        }
        if len < batch_size {
            return Err(LstmError::InvalidInput("series is shorter than batch_size"));
        }

        let jump = len / batch_size;
        let offsets = (0..batch_size).map(|i| i * jump).collect();

        Ok(TimeSeriesBatcher {
            inputs,
            targets,
            batch_size,
            time_size,
            offsets,
            time_idx: 0,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn time_size(&self) -> usize {
        self.time_size
    }

    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// Number of batches that cover the series roughly once.
    pub fn iters_per_epoch(&self) -> usize {
        self.inputs.nrows() / (self.batch_size * self.time_size)
    }

    /// Builds the next batch and advances the time cursor.
    pub fn next_batch(&mut self) -> (Array3<f32>, Array3<f32>) {
        let len = self.inputs.nrows();
        let features = self.inputs.ncols();
        let mut batch_x = Array3::zeros((self.batch_size, self.time_size, features));
        let mut batch_t = Array3::zeros((self.batch_size, self.time_size, 1));

        for t in 0..self.time_size {
            for (i, &offset) in self.offsets.iter().enumerate() {
                let idx = (offset + self.time_idx) % len;
                batch_x.slice_mut(s![i, t, ..]).assign(&self.inputs.row(idx));
                batch_t[[i, t, 0]] = self.targets[idx];
            }
            self.time_idx += 1;
        }

        (batch_x, batch_t)
    }

    /// Rewinds every lane to its starting offset.
    pub fn reset(&mut self) {
        self.time_idx = 0;
    }
}
