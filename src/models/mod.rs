/// Module for the LSTM sequence regressor.
pub mod regressor;
