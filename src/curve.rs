//! Monotonic curve helpers shared by every scoring path.

/// Beyond this magnitude `exp` overflows f64, so saturate first.
const EXP_CLAMP: f64 = 700.0;

/// `L / (1 + e^(-k(x - x0)))`: monotonic increasing for k > 0, range (0, L),
/// inflection at `x0`. Saturates to 0 or L instead of overflowing.
pub fn logistic_curve(x: f64, l: f64, k: f64, x0: f64) -> f64 {
    let t = -k * (x - x0);
    if t > EXP_CLAMP {
        return 0.0;
    }
    if t < -EXP_CLAMP {
        return l;
    }
    l / (1.0 + t.exp())
}

/// `1 / (1 + e^(-z))`, strictly inside (0, 1). The clamp keeps the output
/// off the endpoints even for extreme arguments.
pub fn sigmoid(z: f64) -> f64 {
    let z = z.clamp(-36.0, 36.0);
    1.0 / (1.0 + (-z).exp())
}
