use crate::defaults;
use crate::mixer::{Mixer, MixerError};
use log::warn;
use ndarray::prelude::*;
use ndarray_linalg::Inverse;

/// Modified Broyden mixer
///
/// The algorithm is based on Phys. Rev. B 38, 12807 (1988) and
/// J. Chem. Phys. 152, 124101 (2020); https://doi.org/10.1063/1.5143190
///
/// An explicit approximation of the inverse Jacobian of the residual map is
/// kept and refined by weighted rank-1 updates built from the history of
/// iterate/residual differences. Every mix step applies the current matrix:
/// |x_i+1 > = |x_i > - J^-1 | F_i >
#[derive(Debug, Clone)]
pub struct BroydenMixer {
    // current iteration
    iter: usize,
    // number of difference vectors accumulated since the last fold
    updates: usize,
    // maximum number of difference vectors kept before folding
    memory: usize,
    omega0: f64,
    // mixing parameter
    alpha: f64,
    // minimal weight allowed
    min_weight: f64,
    // maximal weight allowed
    max_weight: f64,
    // numerator of the weight
    weight_factor: f64,
    weights: Array1<f64>,
    // charge residual of the last iteration
    f_last: Array1<f64>,
    // input charges of the last iteration
    q_last: Array1<f64>,
    // overlap matrix of the normalized residual differences
    a_mat: Array2<f64>,
    // normalized |ΔF> vectors
    df: Array2<f64>,
    // update vectors |u>
    uu: Array2<f64>,
    // base matrix the accumulated updates are folded into
    base: Array2<f64>,
    // explicit approximate inverse Jacobian
    jac_inv: Array2<f64>,
    n_elem: usize,
}

impl BroydenMixer {
    pub fn new(alpha: f64, memory: usize) -> Self {
        BroydenMixer::with_weighting(
            alpha,
            memory,
            defaults::BROYDEN_OMEGA0,
            defaults::BROYDEN_MIN_WEIGHT,
            defaults::BROYDEN_MAX_WEIGHT,
            defaults::BROYDEN_WEIGHT_FACTOR,
        )
    }

    /// Full control over the weighting scheme of the rank-1 updates. `omega0`
    /// regularizes the inversion of the weighted overlap matrix, the
    /// remaining parameters clamp the per-step weight w = weight_factor/||F||.
    pub fn with_weighting(
        alpha: f64,
        memory: usize,
        omega0: f64,
        min_weight: f64,
        max_weight: f64,
        weight_factor: f64,
    ) -> Self {
        BroydenMixer {
            iter: 0,
            updates: 0,
            memory,
            omega0,
            alpha,
            min_weight,
            max_weight,
            weight_factor,
            weights: Array1::zeros([0]),
            f_last: Array1::zeros([0]),
            q_last: Array1::zeros([0]),
            a_mat: Array2::zeros([0, 0]),
            df: Array2::zeros([0, 0]),
            uu: Array2::zeros([0, 0]),
            base: Array2::zeros([0, 0]),
            jac_inv: Array2::zeros([0, 0]),
            n_elem: 0,
        }
    }

    /// Fold the accumulated updates into the base matrix. The rank-1 history
    /// is cleared while the cumulative Jacobian approximation is preserved.
    fn fold_history(&mut self) {
        self.base = self.jac_inv.clone();
        self.weights.fill(0.0);
        self.a_mat.fill(0.0);
        self.df.fill(0.0);
        self.uu.fill(0.0);
        self.updates = 0;
    }
}

impl Mixer for BroydenMixer {
    fn reset(&mut self, n_elem: usize) {
        self.iter = 0;
        self.updates = 0;
        self.n_elem = n_elem;
        self.weights = Array1::zeros([self.memory]);
        self.f_last = Array1::zeros([n_elem]);
        self.q_last = Array1::zeros([n_elem]);
        self.a_mat = Array2::zeros([self.memory, self.memory]);
        self.df = Array2::zeros([n_elem, self.memory]);
        self.uu = Array2::zeros([n_elem, self.memory]);
        self.base = Array2::eye(n_elem) * (-self.alpha);
        self.jac_inv = self.base.clone();
    }

    /// Mixes the current charges and the difference to the last iteration.
    fn mix(&mut self, q_inp_res: Array1<f64>, q_diff: Array1<f64>) -> Array1<f64> {
        assert!(self.n_elem > 0, "Broyden mixer: mix called before reset");
        assert_eq!(
            q_inp_res.len(),
            self.n_elem,
            "Broyden mixer: iterate length does not match the mixer dimension"
        );
        assert_eq!(
            q_diff.len(),
            self.n_elem,
            "Broyden mixer: residual length does not match the mixer dimension"
        );

        // In the first iteration no difference vectors exist yet and the
        // matrix is still -α·1, so the update below reduces to linear damping.
        if self.iter > 0 {
            if self.updates == self.memory {
                self.fold_history();
            }
            let idx: usize = self.updates;

            // Create the weight factor of the current iteration.
            let mut weight: f64 = q_diff.dot(&q_diff).sqrt();
            if weight > self.weight_factor / self.max_weight {
                weight = self.weight_factor / weight;
            } else {
                weight = self.max_weight;
            }
            if weight < self.min_weight {
                weight = self.min_weight;
            }
            self.weights[idx] = weight;

            // Build |DF(idx)>.
            let df_new: Array1<f64> = &q_diff - &self.f_last;
            let norm: f64 = df_new.dot(&df_new).sqrt();
            // A vanishing residual difference carries no curvature
            // information; the matrix is left unchanged for that step.
            if norm > f64::EPSILON {
                // Normalize it.
                let inv_norm: f64 = 1.0 / norm;
                let df_idx: Array1<f64> = &df_new * inv_norm;

                // Extend the overlap matrix a_ij = <dF(i)|dF(j)>.
                for i in 0..idx {
                    let overlap: f64 = self.df.slice(s![.., i]).dot(&df_idx);
                    self.a_mat[[i, idx]] = overlap;
                    self.a_mat[[idx, i]] = overlap;
                }
                self.a_mat[[idx, idx]] = 1.0;

                // Store |dF(idx)> and create |u(idx)> relative to the base
                // matrix; for B0 = -α·1 this reduces to α|dF> + |Δq>/||ΔF||.
                self.df.slice_mut(s![.., idx]).assign(&df_idx);
                self.uu.slice_mut(s![.., idx]).assign(
                    &(&((&q_inp_res - &self.q_last) * inv_norm) - &self.base.dot(&df_idx)),
                );
                self.updates += 1;

                // Build the weighted overlap matrix and regularize its
                // diagonal with ω0^2.
                let nn: usize = self.updates;
                let mut beta: Array2<f64> = Array2::zeros([nn, nn]);
                for i in 0..nn {
                    beta.slice_mut(s![i, ..]).assign(
                        &(self.weights[i]
                            * &(&self.weights.slice(s![0..nn])
                                * &self.a_mat.slice(s![0..nn, i]))),
                    );
                    beta[[i, i]] += self.omega0.powi(2);
                }
                // The inverse of the matrix is computed and the explicit
                // inverse Jacobian is rebuilt on top of the base matrix:
                // J^-1 = B0 + Σ_ij w_i w_j β_ji |u(i)><dF(j)|
                match beta.inv() {
                    Ok(beta_inv) => {
                        let df_w: Array2<f64> =
                            &self.df.slice(s![.., 0..nn]) * &self.weights.slice(s![0..nn]);
                        let uu_w: Array2<f64> =
                            &self.uu.slice(s![.., 0..nn]) * &self.weights.slice(s![0..nn]);
                        self.jac_inv = &self.base + &uu_w.dot(&beta_inv.t()).dot(&df_w.t());
                    }
                    Err(_) => {
                        warn!("Broyden mixer: singular weighted overlap matrix, the inverse Jacobian is left unchanged");
                    }
                }
            }
        }

        // Build the new vector.
        let q_new: Array1<f64> = &q_inp_res - &self.jac_inv.dot(&q_diff);

        // Save the charge vectors for the next iteration.
        self.q_last = q_inp_res;
        self.f_last = q_diff;
        self.iter += 1;
        q_new
    }

    fn has_inverse_jacobian(&self) -> bool {
        true
    }

    fn inverse_jacobian(&self) -> Result<Array2<f64>, MixerError> {
        Ok(self.jac_inv.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults;
    use approx::AbsDiffEq;
    use ndarray::array;

    #[test]
    fn inverse_jacobian_after_reset() {
        let mut mixer = BroydenMixer::new(0.25, defaults::MIXER_MEMORY);
        mixer.reset(3);
        let jac_inv = mixer.inverse_jacobian().unwrap();
        assert_eq!(jac_inv, Array2::eye(3) * (-0.25));
    }

    #[test]
    fn first_step_is_linear_damping() {
        let mut mixer = BroydenMixer::new(0.25, defaults::MIXER_MEMORY);
        mixer.reset(2);
        let q_new = mixer.mix(array![1.0, -1.0], array![0.5, 0.25]);
        assert!(q_new.abs_diff_eq(&array![1.125, -0.9375], f64::EPSILON));
    }

    #[test]
    fn secant_condition_after_one_update() {
        // For a linear residual map the updated matrix has to reproduce the
        // sampled step: J^-1 |ΔF> ≈ |Δx> up to the ω0 regularization.
        let mut mixer = BroydenMixer::new(0.25, defaults::MIXER_MEMORY);
        mixer.reset(2);
        let target = array![1.0, -0.5];
        let q0 = array![0.0, 0.0];
        let f0: Array1<f64> = -2.0 * &(&q0 - &target);
        let q1 = mixer.mix(q0.clone(), f0.clone());
        let f1: Array1<f64> = -2.0 * &(&q1 - &target);
        mixer.mix(q1.clone(), f1.clone());
        let jac_inv = mixer.inverse_jacobian().unwrap();
        let lhs: Array1<f64> = jac_inv.dot(&(&f1 - &f0));
        assert!(lhs.abs_diff_eq(&(&q1 - &q0), 1.0e-3));
    }

    #[test]
    fn folding_preserves_the_jacobian() {
        // A history cap of two forces a fold every other step; the folded
        // matrix must keep accelerating the iteration instead of degrading
        // back to plain damping.
        let mut mixer = BroydenMixer::new(0.25, 2);
        mixer.reset(2);
        let target = array![1.0, -0.5];
        let mut q = array![0.0, 0.0];
        for _ in 0..12 {
            let f: Array1<f64> = -2.0 * &(&q - &target);
            q = mixer.mix(q, f);
        }
        assert!(q.abs_diff_eq(&target, 1.0e-8));
    }

    #[test]
    #[should_panic(expected = "mix called before reset")]
    fn mix_before_reset_panics() {
        let mut mixer = BroydenMixer::new(0.25, defaults::MIXER_MEMORY);
        mixer.mix(array![1.0], array![0.0]);
    }
}
