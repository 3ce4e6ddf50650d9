//! Activation functions and their derivatives.

/// Sigmoid activation function: σ(x) = 1 / (1 + e^(-x))
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Hyperbolic tangent activation.
pub fn tanh(x: f32) -> f32 {
    x.tanh()
}

/// Derivative of the sigmoid written in terms of its output `s = σ(x)`.
pub fn sigmoid_grad(s: f32) -> f32 {
    s * (1.0 - s)
}

/// Derivative of tanh written in terms of its output `t = tanh(x)`.
pub fn tanh_grad(t: f32) -> f32 {
    1.0 - t * t
}
