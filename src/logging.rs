use crate::config::{Method, MixConfig};
use log::{debug, info};

/// Writes the settings of the active charge mixer to the log, in the same
/// table layout the SCC driver uses for its iteration output.
pub fn print_mixer_init(config: &MixConfig) {
    info!("{:^80}", "");
    info!("{: ^80}", "Charge Mixer");
    info!("{:-^80}", "");
    info!("{: <25} {}", "mixing scheme:", config.method);
    info!("{: <25} {}", "mixing parameter:", config.alpha);
    match config.method {
        Method::Simple => {}
        Method::Anderson => {
            info!("{: <25} {}", "history depth:", config.memory);
            info!("{: <25} {:e}", "regularization:", config.regularization);
            info!("{: <25} {}", "safeguard factor:", config.tol_safe);
        }
        Method::Broyden => {
            info!("{: <25} {}", "history depth:", config.memory);
            info!("{: <25} {:e}", "inv. Jacobian weight:", config.omega0);
        }
        Method::Diis => {
            info!("{: <25} {}", "history depth:", config.memory);
        }
    }
    info!("{:-^80}", "");
}

/// Per-iteration record of the mixed charge difference, written by the
/// driving SCC loop.
pub fn print_mixing_step(iter: usize, charge_diff: f64) {
    debug!("{: >5} {:>18.10e}", iter + 1, charge_diff);
}
