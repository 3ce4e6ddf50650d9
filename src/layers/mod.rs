/// Single-timestep LSTM cell.
pub mod lstm_cell;

/// LSTM unrolled over the time axis.
pub mod time_lstm;

/// Linear projection applied at every timestep.
pub mod time_affine;
