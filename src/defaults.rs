// config file
pub const CONFIG_FILE_NAME: &str = "qmix.toml";

// CHARGE MIXING
// mixing parameter used for the linear damping step of every scheme
pub const MIXING_PARAMETER: f64 = 0.25;
// number of iterate/residual pairs kept by the bounded-history schemes
pub const MIXER_MEMORY: usize = 6;

// Anderson Mixer
pub const ANDERSON_REGULARIZATION: f64 = 1.0e-3;
pub const ANDERSON_SAFEGUARD_FACTOR: f64 = 2.0;
pub const ANDERSON_MAX_WEIGHT_NORM: f64 = 1.0e10;

// Broyden Mixer
pub const BROYDEN_OMEGA0: f64 = 1.0e-2;
pub const BROYDEN_MIN_WEIGHT: f64 = 1.0;
pub const BROYDEN_MAX_WEIGHT: f64 = 1.0e5;
pub const BROYDEN_WEIGHT_FACTOR: f64 = 1.0e-2;
