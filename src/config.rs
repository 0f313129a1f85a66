use crate::defaults::*;
use crate::mixer::{
    AndersonMixerBuilder, BroydenMixer, ChargeMixer, DiisMixer, SimpleMixer,
};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

/// Available charge-mixing schemes.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Simple,
    Anderson,
    Broyden,
    Diis,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Method::Simple => "Simple",
            Method::Anderson => "Anderson",
            Method::Broyden => "Broyden",
            Method::Diis => "DIIS",
        };
        write!(f, "{}", name)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug)]
#[serde(default)]
pub struct MixConfig {
    pub method: Method,
    pub alpha: f64,
    pub memory: usize,
    pub regularization: f64,
    pub tol_safe: f64,
    pub max_norm: f64,
    pub omega0: f64,
    pub min_weight: f64,
    pub max_weight: f64,
    pub weight_factor: f64,
}

impl Default for MixConfig {
    fn default() -> Self {
        Self {
            method: Method::Broyden,
            alpha: MIXING_PARAMETER,
            memory: MIXER_MEMORY,
            regularization: ANDERSON_REGULARIZATION,
            tol_safe: ANDERSON_SAFEGUARD_FACTOR,
            max_norm: ANDERSON_MAX_WEIGHT_NORM,
            omega0: BROYDEN_OMEGA0,
            min_weight: BROYDEN_MIN_WEIGHT,
            max_weight: BROYDEN_MAX_WEIGHT,
            weight_factor: BROYDEN_WEIGHT_FACTOR,
        }
    }
}

impl MixConfig {
    /// Read the mixer block from a TOML file. A missing file yields the
    /// default settings, so that a calculation can always be started without
    /// a configuration file in the directory.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config_string: String = if path.exists() {
            fs::read_to_string(path)
                .with_context(|| format!("Unable to read config file {}", path.display()))?
        } else {
            String::from("")
        };
        toml::from_str(&config_string)
            .with_context(|| format!("Unable to parse config file {}", path.display()))
    }

    /// Initialize an instance of the selected mixing scheme. The returned
    /// handle is bound to exactly one concrete mixer; it still has to be
    /// `reset` with the dimension of the mixed vector before the first call
    /// to `mix`.
    pub fn build_mixer(&self) -> Result<ChargeMixer> {
        if !(self.alpha > 0.0 && self.alpha <= 1.0) {
            bail!(
                "The mixing parameter alpha has to lie in (0, 1], got {}",
                self.alpha
            );
        }
        if self.memory == 0 {
            bail!("The mixer history depth has to be at least 1");
        }
        let mixer: ChargeMixer = match self.method {
            Method::Simple => SimpleMixer::new(self.alpha).into(),
            Method::Anderson => AndersonMixerBuilder::default()
                .alpha(self.alpha)
                .memory(self.memory)
                .regularization(self.regularization)
                .safeguard_factor(self.tol_safe)
                .max_weight_norm(self.max_norm)
                .build()
                .context("Could not initialize the Anderson mixer")?
                .into(),
            Method::Broyden => BroydenMixer::with_weighting(
                self.alpha,
                self.memory,
                self.omega0,
                self.min_weight,
                self.max_weight,
                self.weight_factor,
            )
            .into(),
            Method::Diis => DiisMixer::new(self.alpha, self.memory).into(),
        };
        Ok(mixer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mixer::Mixer;
    use ndarray::array;

    #[test]
    fn defaults_from_empty_input() {
        let config: MixConfig = toml::from_str("").unwrap();
        assert_eq!(config.method, Method::Broyden);
        assert_eq!(config.alpha, MIXING_PARAMETER);
        assert_eq!(config.memory, MIXER_MEMORY);
    }

    #[test]
    fn method_selection_from_toml() {
        let config: MixConfig = toml::from_str("method = \"diis\"\nalpha = 0.2").unwrap();
        assert_eq!(config.method, Method::Diis);
        assert_eq!(config.alpha, 0.2);
        let mut mixer = config.build_mixer().unwrap();
        assert_eq!(mixer.scheme(), "DIIS");
        mixer.reset(2);
        let q_new = mixer.mix(array![0.0, 0.0], array![1.0, -1.0]);
        assert_eq!(q_new, array![0.2, -0.2]);
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let mut config = MixConfig::default();
        config.alpha = 0.0;
        assert!(config.build_mixer().is_err());
        config.alpha = 1.5;
        assert!(config.build_mixer().is_err());
        config = MixConfig::default();
        config.memory = 0;
        assert!(config.build_mixer().is_err());
    }

    #[test]
    fn config_round_trip() {
        let config = MixConfig::default();
        let serialized = toml::to_string(&config).unwrap();
        let parsed: MixConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.method, config.method);
        assert_eq!(parsed.alpha, config.alpha);
        assert_eq!(parsed.omega0, config.omega0);
    }
}
