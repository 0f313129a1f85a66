//! Convergence acceleration for self-consistent charge (SCC) calculations.
//!
//! The crate provides several fixed-point acceleration schemes for the
//! iterative charge/Hamiltonian loop of tight-binding DFT codes: linear
//! damping, Anderson mixing, modified Broyden mixing and Pulay/DIIS
//! extrapolation, all behind the uniform [`Mixer`](mixer::Mixer) contract.
//! The driving SCC routine selects and configures a scheme through
//! [`MixConfig`](config::MixConfig), resets the returned
//! [`ChargeMixer`](mixer::ChargeMixer) with the dimension of the mixed
//! vector and feeds it one iterate/residual pair per iteration until its
//! own convergence criterion is met.

pub mod config;
pub mod defaults;
pub mod logging;
pub mod mixer;

pub use config::{Method, MixConfig};
pub use mixer::{
    AndersonMixer, AndersonMixerBuilder, BroydenMixer, ChargeMixer, DiisMixer, Mixer, MixerError,
    SimpleMixer,
};
