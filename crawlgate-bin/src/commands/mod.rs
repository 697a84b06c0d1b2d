pub(crate) mod check;
pub(crate) mod simulate;

pub(crate) use check::check;
pub(crate) use simulate::simulate;

use std::path::Path;

use crawlgate_lib::ConfigFile;
use log::error;

/// Load and validate a configuration file, logging the problem on failure
///
/// Returns `None` if the file cannot be used. Callers should exit with
/// [`crate::ExitCode::ConfigFile`] in that case.
pub(crate) fn load_config(path: &Path) -> Option<ConfigFile> {
    match ConfigFile::load_from_file(path) {
        Ok(config) => Some(config),
        Err(e) => {
            error!("Cannot load configuration file `{}`: {e}", path.display());
            None
        }
    }
}
