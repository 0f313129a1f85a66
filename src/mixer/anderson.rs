use crate::defaults;
use crate::mixer::history::History;
use crate::mixer::{Mixer, MixerError};
use derive_builder::Builder;
use itertools::Itertools;
use log::warn;
use ndarray::prelude::*;
use ndarray_linalg::{Norm, Solve};
use std::ops::AddAssign;

/// Anderson mixing of the partial charges.
///
/// The last `memory` iterate/residual pairs are kept and the coefficients
/// c_1..c_k that minimize the norm of the combined residual | Σ c_i F_i >
/// (subject to Σ c_i = 1) are obtained from the eliminated form of the
/// least-squares problem over the residual differences | ΔF_j >. The new
/// iterate is the same combination of the stored iterates with the residual
/// contribution damped by α:
/// |x_i+1 > = |x_i > + α | F_i > - Σ_j γ_j (| Δx_j > + α | ΔF_j >)
#[derive(Builder, Clone, Debug)]
pub struct AndersonMixer {
    /// Mixing parameter α: |x_i+1 > = |x_i > + α * | F_i >
    #[builder(default = "defaults::MIXING_PARAMETER")]
    alpha: f64,
    /// Number of iterate/residual pairs to store.
    #[builder(default = "defaults::MIXER_MEMORY")]
    memory: usize,
    /// Regularization added to the diagonal of the normal equations, scaled
    /// by the norm of the matrix.
    #[builder(default = "defaults::ANDERSON_REGULARIZATION")]
    regularization: f64,
    /// Safeguard tolerance factor on the growth of the residual norm.
    #[builder(default = "defaults::ANDERSON_SAFEGUARD_FACTOR")]
    safeguard_factor: f64,
    /// Maximum norm of the extrapolation weights γ.
    #[builder(default = "defaults::ANDERSON_MAX_WEIGHT_NORM")]
    max_weight_norm: f64,
    /// Dimension of the mixed vector, set by `reset`.
    #[builder(default = "0", setter(skip))]
    n_elem: usize,
    /// || | F_(i-1) > ||_2 of the previous accepted step.
    #[builder(default = "0.0", setter(skip))]
    norm_f_old: f64,
    /// Stored iterate/residual pairs.
    #[builder(default = "self.default_history()", setter(skip))]
    history: History,
}

impl AndersonMixerBuilder {
    // Private helper method to size the history buffer.
    fn default_history(&self) -> History {
        History::new(self.memory.unwrap_or(defaults::MIXER_MEMORY))
    }
}

impl AndersonMixer {
    /// Linear damping step used before any history exists and as the
    /// fallback for degenerate least-squares systems.
    fn damping(&self, q: &Array1<f64>, f: &Array1<f64>) -> Array1<f64> {
        q + &(self.alpha * f)
    }
}

impl Mixer for AndersonMixer {
    fn reset(&mut self, n_elem: usize) {
        self.n_elem = n_elem;
        self.norm_f_old = 0.0;
        self.history.clear();
    }

    fn mix(&mut self, q_inp_res: Array1<f64>, q_diff: Array1<f64>) -> Array1<f64> {
        assert!(self.n_elem > 0, "Anderson mixer: mix called before reset");
        assert_eq!(
            q_inp_res.len(),
            self.n_elem,
            "Anderson mixer: iterate length does not match the mixer dimension"
        );
        assert_eq!(
            q_diff.len(),
            self.n_elem,
            "Anderson mixer: residual length does not match the mixer dimension"
        );

        // Safeguarding check: if the residual norm has grown too much since the
        // previous step the extrapolation is not trusted and the history is
        // discarded. The check starts after the first accelerated iteration,
        // as the damping step might increase the norm in non locally
        // convergent cases.
        let norm_f = q_diff.norm_l2();
        if self.history.len() > 1 && norm_f > self.safeguard_factor * self.norm_f_old {
            warn!(
                "Anderson mixer: residual norm grew from {:.6e} to {:.6e}, history is discarded",
                self.norm_f_old, norm_f
            );
            self.history.clear();
        }
        self.norm_f_old = norm_f;

        self.history.push(q_inp_res.clone(), q_diff.clone());

        // Number of available difference vectors.
        let m = self.history.len() - 1;
        if m == 0 {
            return self.damping(&q_inp_res, &q_diff);
        }

        // Matrices of stacked |Δx_j> and |ΔF_j> built from consecutive
        // history entries.
        let mut dq: Array2<f64> = Array2::zeros((m, self.n_elem));
        let mut df: Array2<f64> = Array2::zeros((m, self.n_elem));
        for (j, (a, b)) in self.history.iterates().iter().tuple_windows().enumerate() {
            dq.row_mut(j).assign(&(b - a));
        }
        for (j, (a, b)) in self.history.residuals().iter().tuple_windows().enumerate() {
            df.row_mut(j).assign(&(b - a));
        }

        // Normal equations (ΔF ΔF') γ = ΔF | F_i >, regularized on the
        // diagonal in proportion to the matrix norm.
        let mut m_mat: Array2<f64> = df.dot(&df.t());
        if self.regularization != 0.0 {
            let r = m_mat.norm_l2() * self.regularization;
            m_mat.diag_mut().add_assign(r);
        }
        let rhs: Array1<f64> = df.dot(&q_diff);

        // Try to solve the system of equations, falling back to the damping
        // step if the system is singular.
        let gamma: Array1<f64> = match m_mat.solve_into(rhs) {
            Ok(gamma) if gamma.iter().all(|g| g.is_finite()) => gamma,
            _ => {
                warn!("Anderson mixer: singular least-squares system, falling back to damping");
                self.history.clear();
                return self.damping(&q_inp_res, &q_diff);
            }
        };

        // If the norm of the weights is larger than the threshold the
        // extrapolation is rejected as well.
        if gamma.norm_l2() >= self.max_weight_norm {
            warn!("Anderson mixer: extrapolation weights exceed the norm bound, falling back to damping");
            self.history.clear();
            return self.damping(&q_inp_res, &q_diff);
        }

        // |x_i+1 > = |x_i > + α | F_i > - Σ_j γ_j (| Δx_j > + α | ΔF_j >)
        let correction: Array1<f64> = dq.t().dot(&gamma) + self.alpha * df.t().dot(&gamma);
        &self.damping(&q_inp_res, &q_diff) - &correction
    }

    fn has_inverse_jacobian(&self) -> bool {
        false
    }

    fn inverse_jacobian(&self) -> Result<Array2<f64>, MixerError> {
        Err(MixerError::unsupported_jacobian("Anderson"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::AbsDiffEq;
    use ndarray::array;

    fn mixer() -> AndersonMixer {
        AndersonMixerBuilder::default().build().unwrap()
    }

    #[test]
    fn first_step_is_linear_damping() {
        let mut mixer = AndersonMixerBuilder::default().alpha(0.25).build().unwrap();
        mixer.reset(2);
        let q_new = mixer.mix(array![1.0, -1.0], array![0.5, 0.25]);
        assert!(q_new.abs_diff_eq(&array![1.125, -0.9375], f64::EPSILON));
    }

    #[test]
    fn identical_residuals_degrade_gracefully() {
        let mut mixer = mixer();
        mixer.reset(3);
        let f = array![1.0, 1.0, 1.0];
        let mut q = array![0.0, 0.0, 0.0];
        for _ in 0..3 {
            q = mixer.mix(q, f.clone());
            assert!(q.iter().all(|x| x.is_finite()));
        }
    }

    #[test]
    fn history_is_bounded() {
        let mut mixer = AndersonMixerBuilder::default().memory(4).build().unwrap();
        mixer.reset(2);
        let mut q = array![0.0, 0.0];
        for i in 0..12 {
            // residuals decay so that the safeguard never triggers
            let f = array![1.0, -0.5] / (i + 1) as f64;
            q = mixer.mix(q, f);
            assert!(mixer.history.len() <= 4);
        }
    }

    #[test]
    #[should_panic(expected = "does not match the mixer dimension")]
    fn dimension_mismatch_panics() {
        let mut mixer = mixer();
        mixer.reset(3);
        mixer.mix(array![0.0, 0.0], array![0.0, 0.0]);
    }
}
