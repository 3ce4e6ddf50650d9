//! # LSTM Forecast
//!
//! A small sequence-regression library: a time-unrolled LSTM followed by a
//! per-timestep affine projection, trained against a time-averaged MSE loss
//! with Adam.
//!
//! ## Core Components
//!
//! - **Layers**: `LSTMCell`, the time-unrolled `TimeLSTM` (optionally stateful
//!   across calls) and the time-distributed `TimeAffine`
//! - **Loss**: `TimeMSE`, mean squared error averaged over batch then time
//! - **Model**: `LSTMRegressor`, which owns all parameters in a fixed order
//! - **Optimizers**: `Adam` and `SGD`, updating parameters in place
//! - **Training**: batching of a single long series and an epoch loop
//! - **Persistence**: parameter blobs and full models with metadata
//!
//! ## Quick Start
//!
//! ```rust
//! use lstm_forecast::models::regressor::LSTMRegressor;
//! use lstm_forecast::training::create_adam_trainer;
//! use ndarray::Array3;
//!
//! // 8 input features, 16 hidden units, one prediction per timestep
//! let model = LSTMRegressor::new(8, 16);
//! let mut trainer = create_adam_trainer(model, 0.05);
//!
//! let xs = Array3::<f32>::zeros((4, 10, 8));
//! let ts = Array3::<f32>::zeros((4, 10, 1));
//! let loss = trainer.train_batch(&xs, &ts).unwrap();
//! assert!(loss >= 0.0);
//! ```

pub mod data;
pub mod error;
pub mod layers;
pub mod loss;
pub mod models;
pub mod optimizers;
pub mod persistence;
pub mod training;
pub mod utils;

// Re-export commonly used items
pub use data::{next_step_pairs, MinMaxScaler, TimeSeriesBatcher};
pub use error::{LstmError, Result};
pub use layers::lstm_cell::LSTMCell;
pub use layers::time_affine::TimeAffine;
pub use layers::time_lstm::TimeLSTM;
pub use loss::{LossFunction, MSELoss, TimeDistributedLoss, TimeMSE};
pub use models::regressor::LSTMRegressor;
pub use optimizers::{Adam, Optimizer, SGD};
pub use persistence::{ModelMetadata, ModelPersistence, PersistenceError, PersistentModel};
pub use training::{create_adam_trainer, RegressionTrainer, TrainingConfig};
