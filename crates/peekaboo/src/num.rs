//! Numeric helpers for network post-processing.

/// The logistic function, squashing raw network scores into `0.0..=1.0`.
pub fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn sigmoid_range() {
        assert_relative_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(20.0) > 0.99);
        assert!(sigmoid(-20.0) < 0.01);
    }
}
