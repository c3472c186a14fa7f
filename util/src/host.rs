//! Host platform utility functions

use std::env;
use std::path::PathBuf;

/// Name of the environment variable pointing at the software root.
pub const SW_ROOT_ENV_VAR: &str = "EXO_SW_ROOT";

/// Get the root directory of the exoskeleton software.
///
/// Parameter files are found under `<root>/params` and sessions are created
/// under `<root>/<sessions_dir>`.
pub fn get_exo_sw_root() -> Result<PathBuf, env::VarError> {
    env::var(SW_ROOT_ENV_VAR).map(PathBuf::from)
}
