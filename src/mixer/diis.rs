use crate::mixer::history::History;
use crate::mixer::{Mixer, MixerError};
use log::{debug, warn};
use ndarray::prelude::*;
use ndarray_linalg::{Norm, Solve};
use ndarray_stats::QuantileExt;

/// DIIS mixing of the partial charges (Pulay mixing).
///
/// The bordered error matrix B, [Pulay:1980:393], Eqn. 6, is built from the
/// stored residuals, B_ij = < F_i | F_j >, augmented with the Lagrange
/// row/column that enforces Σ c_i = 1. The new iterate is the combination
/// | Σ c_i x_i > of the stored iterates. A singular subspace is shrunk by
/// discarding the oldest pair and retrying; as a last resort a linear
/// damping step is taken.
#[derive(Debug, Clone)]
pub struct DiisMixer {
    /// Mixing parameter α used for the damping fallback.
    alpha: f64,
    /// Number of iterate/residual pairs to store.
    memory: usize,
    /// Stored iterate/residual pairs.
    history: History,
    /// Dimension of the mixed vector, set by `reset`.
    n_elem: usize,
}

impl DiisMixer {
    pub fn new(alpha: f64, memory: usize) -> Self {
        DiisMixer {
            alpha,
            memory,
            history: History::new(memory),
            n_elem: 0,
        }
    }
}

impl Mixer for DiisMixer {
    fn reset(&mut self, n_elem: usize) {
        self.n_elem = n_elem;
        self.history = History::new(self.memory);
    }

    fn mix(&mut self, q_inp_res: Array1<f64>, q_diff: Array1<f64>) -> Array1<f64> {
        assert!(self.n_elem > 0, "DIIS mixer: mix called before reset");
        assert_eq!(
            q_inp_res.len(),
            self.n_elem,
            "DIIS mixer: iterate length does not match the mixer dimension"
        );
        assert_eq!(
            q_diff.len(),
            self.n_elem,
            "DIIS mixer: residual length does not match the mixer dimension"
        );

        self.history.push(q_inp_res.clone(), q_diff.clone());

        loop {
            let diis_count: usize = self.history.len();
            // At least two residuals are needed to span a subspace; below
            // that the damping step is the only option.
            if diis_count < 2 {
                return &q_inp_res + &(self.alpha * &q_diff);
            }

            // Build error matrix B, [Pulay:1980:393], Eqn. 6, LHS
            let mut b: Array2<f64> = Array2::zeros((diis_count + 1, diis_count + 1));
            for (idx1, e1) in self.history.residuals().iter().enumerate() {
                for (idx2, e2) in self.history.residuals().iter().enumerate() {
                    if idx2 <= idx1 {
                        let val: f64 = e1.dot(e2);
                        b[[idx1, idx2]] = val;
                        b[[idx2, idx1]] = val;
                    }
                }
            }
            b.slice_mut(s![diis_count, ..]).fill(-1.0);
            b.slice_mut(s![.., diis_count]).fill(-1.0);
            b[[diis_count, diis_count]] = 0.0;

            // normalize by the maximal element of the Gram block
            let max: f64 = *b
                .slice(s![0..diis_count, 0..diis_count])
                .map(|x| x.abs())
                .max()
                .unwrap();
            if max > 0.0 {
                b.slice_mut(s![0..diis_count, 0..diis_count])
                    .map_inplace(|x| *x /= max);
            }

            // build residual vector, [Pulay:1980:393], Eqn. 6, RHS
            let mut resid: Array1<f64> = Array1::zeros(diis_count + 1);
            resid[diis_count] = -1.0;

            // Solve Pulay equations, [Pulay:1980:393], Eqn. 6
            match b.solve_into(resid) {
                Ok(ci) if ci.iter().all(|c| c.is_finite()) => {
                    // new charges as linear combination of the stored iterates
                    let mut q_new: Array1<f64> = Array1::zeros(self.n_elem);
                    let mut f_comb: Array1<f64> = Array1::zeros(self.n_elem);
                    for (coeff, (qi, fi)) in ci.iter().zip(
                        self.history
                            .iterates()
                            .iter()
                            .zip(self.history.residuals()),
                    ) {
                        q_new += &qi.map(|x| x * *coeff);
                        f_comb += &fi.map(|x| x * *coeff);
                    }
                    // the combined residual is a convergence diagnostic only
                    debug!(
                        "DIIS extrapolation over {} vectors, combined residual norm {:.6e}",
                        diis_count,
                        f_comb.norm()
                    );
                    return q_new;
                }
                _ => {
                    // Shrink the subspace and retry with the remaining pairs.
                    warn!("DIIS mixer: singular subspace, the oldest trial vector is discarded");
                    self.history.evict_oldest();
                }
            }
        }
    }

    fn has_inverse_jacobian(&self) -> bool {
        false
    }

    fn inverse_jacobian(&self) -> Result<Array2<f64>, MixerError> {
        Err(MixerError::unsupported_jacobian("DIIS"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults;
    use approx::AbsDiffEq;
    use ndarray::array;

    #[test]
    fn first_step_is_linear_damping() {
        let mut mixer = DiisMixer::new(0.25, defaults::MIXER_MEMORY);
        mixer.reset(2);
        let q_new = mixer.mix(array![1.0, -1.0], array![0.5, 0.25]);
        assert!(q_new.abs_diff_eq(&array![1.125, -0.9375], f64::EPSILON));
    }

    #[test]
    fn identical_residuals_degrade_gracefully() {
        let mut mixer = DiisMixer::new(0.25, defaults::MIXER_MEMORY);
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
        let mut mixer = DiisMixer::new(0.25, 4);
        mixer.reset(2);
        let mut q = array![0.0, 0.0];
        for i in 0..12 {
            let f = array![1.0, -0.5] / (i + 1) as f64;
            q = mixer.mix(q, f);
            assert!(mixer.history.len() <= 4);
        }
    }

    #[test]
    fn exact_on_a_linear_subspace() {
        // Two distinct pairs of a linear residual map span the solution, the
        // Pulay combination then hits the root of the residual exactly.
        let mut mixer = DiisMixer::new(0.25, defaults::MIXER_MEMORY);
        mixer.reset(2);
        let target = array![1.0, -0.5];
        let mut q = array![0.0, 0.0];
        for _ in 0..2 {
            let f: Array1<f64> = -2.0 * &(&q - &target);
            q = mixer.mix(q, f);
        }
        assert!(q.abs_diff_eq(&target, 1.0e-10));
    }
}
