use ndarray::{Array1, Array2};
use std::fmt;

pub mod anderson;
pub mod broyden;
pub mod diis;
mod history;
pub mod simple;

pub use anderson::{AndersonMixer, AndersonMixerBuilder};
pub use broyden::BroydenMixer;
pub use diis::DiisMixer;
pub use simple::SimpleMixer;

/// Trait that allows mixing of partial charge differences for the
/// acceleration of the SCC routine.
///
/// `reset` establishes the dimension of the mixed vectors and discards any
/// accumulated history while the configuration parameters are kept. `mix`
/// consumes the current iterate together with its residual (the difference
/// between the output and the input charges of the iteration) and returns
/// the new iterate. Passing vectors whose length does not match the last
/// `reset`, or mixing before any `reset`, is a contract violation and
/// panics.
pub trait Mixer {
    fn reset(&mut self, n_elem: usize);
    fn mix(&mut self, q_inp_res: Array1<f64>, q_diff: Array1<f64>) -> Array1<f64>;
    /// Whether the scheme maintains an approximate inverse Jacobian.
    fn has_inverse_jacobian(&self) -> bool;
    /// A copy of the current approximate inverse Jacobian. Only the Broyden
    /// mixer supports this; every other scheme reports an error.
    fn inverse_jacobian(&self) -> Result<Array2<f64>, MixerError>;
}

/// Error reported when an operation is not supported by the active mixing
/// scheme.
#[derive(Debug, Clone)]
pub struct MixerError {
    pub message: String,
}

impl MixerError {
    pub fn unsupported_jacobian(scheme: &str) -> Self {
        let message: String = format!(
            "The {} mixer does not maintain an approximate inverse Jacobian",
            scheme
        );
        Self { message }
    }
}

impl fmt::Display for MixerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for MixerError {}

/// Polymorphic handle over the available mixing schemes.
///
/// Exactly one concrete mixer is bound at construction; the handle forwards
/// the uniform [`Mixer`] contract to it. Binding consumes the concrete
/// instance, so it cannot be mixed past the handle, and a handle cannot be
/// re-bound without being dropped.
#[derive(Debug, Clone)]
pub enum ChargeMixer {
    Simple(SimpleMixer),
    Anderson(AndersonMixer),
    Broyden(BroydenMixer),
    Diis(DiisMixer),
}

impl ChargeMixer {
    /// Name of the bound scheme, used in log output.
    pub fn scheme(&self) -> &'static str {
        match self {
            ChargeMixer::Simple(_) => "Simple",
            ChargeMixer::Anderson(_) => "Anderson",
            ChargeMixer::Broyden(_) => "Broyden",
            ChargeMixer::Diis(_) => "DIIS",
        }
    }
}

impl From<SimpleMixer> for ChargeMixer {
    fn from(mixer: SimpleMixer) -> Self {
        ChargeMixer::Simple(mixer)
    }
}

impl From<AndersonMixer> for ChargeMixer {
    fn from(mixer: AndersonMixer) -> Self {
        ChargeMixer::Anderson(mixer)
    }
}

impl From<BroydenMixer> for ChargeMixer {
    fn from(mixer: BroydenMixer) -> Self {
        ChargeMixer::Broyden(mixer)
    }
}

impl From<DiisMixer> for ChargeMixer {
    fn from(mixer: DiisMixer) -> Self {
        ChargeMixer::Diis(mixer)
    }
}

impl Mixer for ChargeMixer {
    fn reset(&mut self, n_elem: usize) {
        match self {
            ChargeMixer::Simple(mixer) => mixer.reset(n_elem),
            ChargeMixer::Anderson(mixer) => mixer.reset(n_elem),
            ChargeMixer::Broyden(mixer) => mixer.reset(n_elem),
            ChargeMixer::Diis(mixer) => mixer.reset(n_elem),
        }
    }

    fn mix(&mut self, q_inp_res: Array1<f64>, q_diff: Array1<f64>) -> Array1<f64> {
        match self {
            ChargeMixer::Simple(mixer) => mixer.mix(q_inp_res, q_diff),
            ChargeMixer::Anderson(mixer) => mixer.mix(q_inp_res, q_diff),
            ChargeMixer::Broyden(mixer) => mixer.mix(q_inp_res, q_diff),
            ChargeMixer::Diis(mixer) => mixer.mix(q_inp_res, q_diff),
        }
    }

    fn has_inverse_jacobian(&self) -> bool {
        match self {
            ChargeMixer::Simple(mixer) => mixer.has_inverse_jacobian(),
            ChargeMixer::Anderson(mixer) => mixer.has_inverse_jacobian(),
            ChargeMixer::Broyden(mixer) => mixer.has_inverse_jacobian(),
            ChargeMixer::Diis(mixer) => mixer.has_inverse_jacobian(),
        }
    }

    fn inverse_jacobian(&self) -> Result<Array2<f64>, MixerError> {
        match self {
            ChargeMixer::Simple(mixer) => mixer.inverse_jacobian(),
            ChargeMixer::Anderson(mixer) => mixer.inverse_jacobian(),
            ChargeMixer::Broyden(mixer) => mixer.inverse_jacobian(),
            ChargeMixer::Diis(mixer) => mixer.inverse_jacobian(),
        }
    }
}
