use ndarray::Array3;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::data::TimeSeriesBatcher;
use crate::error::{LstmError, Result};
use crate::models::regressor::LSTMRegressor;
use crate::optimizers::{Adam, Optimizer};

/// Configuration for training hyperparameters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub epochs: usize,
    /// Log a summary every this many epochs; 0 disables the per-epoch line.
    pub print_every: usize,
    /// Global gradient-norm ceiling applied before each update.
    pub clip_gradient: Option<f32>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            epochs: 500,
            print_every: 1,
            clip_gradient: None,
        }
    }
}

/// Training metrics tracked during training
#[derive(Debug, Clone)]
pub struct TrainingMetrics {
    pub epoch: usize,
    /// Mean batch loss over the epoch
    pub train_loss: f32,
    pub batches: usize,
    pub time_elapsed: f64,
}

/// Drives an [`LSTMRegressor`] through forward, backward and optimizer steps
pub struct RegressionTrainer<O: Optimizer> {
    pub model: LSTMRegressor,
    pub optimizer: O,
    pub config: TrainingConfig,
    pub metrics_history: Vec<TrainingMetrics>,
}

impl<O: Optimizer> RegressionTrainer<O> {
    pub fn new(model: LSTMRegressor, optimizer: O) -> Self {
        RegressionTrainer {
            model,
            optimizer,
            config: TrainingConfig::default(),
            metrics_history: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: TrainingConfig) -> Self {
        self.config = config;
        self
    }

    /// One optimisation step on a single `(N, T, D)` / `(N, T, 1)` batch.
    ///
    /// Returns the batch loss measured before the update.
    pub fn train_batch(&mut self, xs: &Array3<f32>, ts: &Array3<f32>) -> Result<f32> {
        let loss = self.model.forward(xs, ts)?;
        if !loss.is_finite() {
            log::warn!("non-finite loss {} on a batch of shape {:?}", loss, xs.shape());
        }

        self.model.backward(1.0)?;
        if let Some(max_norm) = self.config.clip_gradient {
            let norm = self.model.clip_gradients(max_norm);
            if norm > max_norm {
                log::debug!("clipped gradient norm {:.4} to {}", norm, max_norm);
            }
        }

        let (mut params, grads) = self.model.params_and_grads_mut();
        self.optimizer.update(&mut params, &grads)?;
        log::debug!("batch loss {:.6}", loss);
        Ok(loss)
    }

    /// Runs `iters_per_epoch` batches, then rewinds the batcher.
    ///
    /// Model state is not reset, so a stateful model keeps carrying it into
    /// the next epoch. Returns the mean batch loss.
    pub fn train_epoch(&mut self, batcher: &mut TimeSeriesBatcher) -> Result<f32> {
        let iters = batcher.iters_per_epoch();
        if iters == 0 {
            return Err(LstmError::InvalidInput("series too short for one batch per epoch"));
        }

        let mut total_loss = 0.0;
        for _ in 0..iters {
            let (xs, ts) = batcher.next_batch();
            total_loss += self.train_batch(&xs, &ts)?;
        }
        batcher.reset();

        Ok(total_loss / iters as f32)
    }

    /// Trains for `config.epochs` epochs, recording one [`TrainingMetrics`] per epoch.
    pub fn train(&mut self, batcher: &mut TimeSeriesBatcher) -> Result<()> {
        log::info!(
            "starting training: {} epochs, {} batches of {}x{} per epoch",
            self.config.epochs,
            batcher.iters_per_epoch(),
            batcher.batch_size(),
            batcher.time_size()
        );

        for epoch in 0..self.config.epochs {
            let start_time = Instant::now();
            let train_loss = self.train_epoch(batcher)?;
            let time_elapsed = start_time.elapsed().as_secs_f64();

            self.metrics_history.push(TrainingMetrics {
                epoch,
                train_loss,
                batches: batcher.iters_per_epoch(),
                time_elapsed,
            });

            if self.config.print_every > 0 && (epoch + 1) % self.config.print_every == 0 {
                log::info!("epoch {} | loss {:.6} | {:.2}s", epoch + 1, train_loss, time_elapsed);
            }
        }

        log::info!("training completed");
        Ok(())
    }

    /// Loss on a batch without touching gradients or parameters.
    ///
    /// A stateful model still advances its carried state.
    pub fn evaluate(&mut self, xs: &Array3<f32>, ts: &Array3<f32>) -> Result<f32> {
        self.model.forward(xs, ts)
    }

    pub fn predict(&mut self, xs: &Array3<f32>) -> Result<Array3<f32>> {
        self.model.predict(xs)
    }

    pub fn get_latest_metrics(&self) -> Option<&TrainingMetrics> {
        self.metrics_history.last()
    }

    pub fn get_metrics_history(&self) -> &[TrainingMetrics] {
        &self.metrics_history
    }
}

/// Create a trainer with the Adam optimizer (β₁ = 0.9, β₂ = 0.999)
pub fn create_adam_trainer(model: LSTMRegressor, learning_rate: f32) -> RegressionTrainer<Adam> {
    RegressionTrainer::new(model, Adam::new(learning_rate))
}
