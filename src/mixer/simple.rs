use crate::mixer::{Mixer, MixerError};
use ndarray::{Array1, Array2};

/// Linear damping of the partial charges.
/// It updates |x_i+1 > in iteration i + 1 according to
/// |x_i+1 > = |x_i > + α * | F_i >, where | F_i > is the charge residual.
#[derive(Debug, Clone)]
pub struct SimpleMixer {
    /// Mixing parameter α in (0, 1].
    alpha: f64,
    /// Dimension of the mixed vector, set by `reset`.
    n_elem: usize,
}

impl SimpleMixer {
    pub fn new(alpha: f64) -> Self {
        SimpleMixer { alpha, n_elem: 0 }
    }
}

impl Mixer for SimpleMixer {
    fn reset(&mut self, n_elem: usize) {
        self.n_elem = n_elem;
    }

    fn mix(&mut self, q_inp_res: Array1<f64>, q_diff: Array1<f64>) -> Array1<f64> {
        assert!(self.n_elem > 0, "Simple mixer: mix called before reset");
        assert_eq!(
            q_inp_res.len(),
            self.n_elem,
            "Simple mixer: iterate length does not match the mixer dimension"
        );
        assert_eq!(
            q_diff.len(),
            self.n_elem,
            "Simple mixer: residual length does not match the mixer dimension"
        );
        &q_inp_res + &(self.alpha * &q_diff)
    }

    fn has_inverse_jacobian(&self) -> bool {
        false
    }

    fn inverse_jacobian(&self) -> Result<Array2<f64>, MixerError> {
        Err(MixerError::unsupported_jacobian("Simple"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::AbsDiffEq;
    use ndarray::array;

    #[test]
    fn damping_is_affine() {
        let mut mixer = SimpleMixer::new(0.25);
        mixer.reset(3);
        let q = array![1.0, -2.0, 0.5];
        let dq = array![0.4, 0.8, -1.2];
        let q_new = mixer.mix(q.clone(), dq.clone());
        assert!(q_new.abs_diff_eq(&(&q + &(0.25 * &dq)), f64::EPSILON));
    }

    #[test]
    fn zero_residual_is_a_fixed_point() {
        let mut mixer = SimpleMixer::new(0.5);
        mixer.reset(2);
        let q = array![0.3, -0.7];
        let q_new = mixer.mix(q.clone(), array![0.0, 0.0]);
        assert_eq!(q_new, q);
    }

    #[test]
    #[should_panic(expected = "mix called before reset")]
    fn mix_before_reset_panics() {
        let mut mixer = SimpleMixer::new(0.25);
        mixer.mix(array![1.0], array![0.0]);
    }

    #[test]
    fn no_inverse_jacobian() {
        let mixer = SimpleMixer::new(0.25);
        assert!(!mixer.has_inverse_jacobian());
        assert!(mixer.inverse_jacobian().is_err());
    }
}
