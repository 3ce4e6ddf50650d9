use ndarray::ShapeError;

/// Result alias used by layers, the model and the optimizers.
pub type Result<T> = std::result::Result<T, LstmError>;

/// Errors raised by the forward/backward machinery and the optimizers.
#[derive(Debug)]
pub enum LstmError {
    /// `backward` was called without a preceding `forward`, or twice in a row.
    NoCachedForward { layer: &'static str },
    /// Two arrays that must agree in shape do not.
    ShapeMismatch {
        what: &'static str,
        got: Vec<usize>,
        expected: Vec<usize>,
    },
    /// A parameter, gradient or moment list has the wrong length.
    ParameterCount { got: usize, expected: usize },
    /// An argument is invalid regardless of array shapes.
    InvalidInput(&'static str),
    /// Flattening or restoring the time axis failed.
    Reshape(ShapeError),
}

impl LstmError {
    pub(crate) fn shape_mismatch(what: &'static str, got: &[usize], expected: &[usize]) -> Self {
        LstmError::ShapeMismatch {
            what,
            got: got.to_vec(),
            expected: expected.to_vec(),
        }
    }
}

impl std::fmt::Display for LstmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LstmError::NoCachedForward { layer } => {
                write!(f, "{}: no cached forward pass to backpropagate through", layer)
            }
            LstmError::ShapeMismatch { what, got, expected } => {
                write!(f, "shape mismatch for {}: got {:?}, expected {:?}", what, got, expected)
            }
            LstmError::ParameterCount { got, expected } => {
                write!(f, "parameter count mismatch: got {}, expected {}", got, expected)
            }
            LstmError::InvalidInput(msg) => write!(f, "invalid input: {}", msg),
            LstmError::Reshape(err) => write!(f, "reshape error: {}", err),
        }
    }
}

impl std::error::Error for LstmError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LstmError::Reshape(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ShapeError> for LstmError {
    fn from(error: ShapeError) -> Self {
        LstmError::Reshape(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = LstmError::NoCachedForward { layer: "TimeAffine" };
        assert_eq!(err.to_string(), "TimeAffine: no cached forward pass to backpropagate through");

        let err = LstmError::shape_mismatch("targets", &[1, 3, 1], &[2, 3, 1]);
        assert_eq!(err.to_string(), "shape mismatch for targets: got [1, 3, 1], expected [2, 3, 1]");

        let err = LstmError::ParameterCount { got: 4, expected: 5 };
        assert_eq!(err.to_string(), "parameter count mismatch: got 4, expected 5");
    }
}
