//! Settings persistence: wraps [`logfathom_types::Settings`] with `confy`
//! load/store, grounded on `core/src/context/config.rs`'s `AppConfigExt`
//! pattern.

use crate::error::Error;
use logfathom_types::Settings;

const APP_NAME: &str = "logfathom";
const CONFIG_NAME: &str = "settings";

/// Loads persisted settings, falling back to platform defaults (with
/// `templog_folder_path` filled in) when no config file exists yet
/// (mirrors `AppConfigExt::load`'s `unwrap_or_else` fallback).
pub fn load() -> Settings {
    confy::load(APP_NAME, CONFIG_NAME).unwrap_or_else(|_| with_platform_defaults())
}

pub fn store(settings: &Settings) -> Result<(), Error> {
    confy::store(APP_NAME, CONFIG_NAME, settings).map_err(|e| Error::Io(std::io::Error::other(e.to_string())))
}

/// Path `confy` resolves this app's config file to (surfaced for the CLI's
/// `help` verb and for diagnostics).
pub fn config_path() -> Result<std::path::PathBuf, Error> {
    confy::get_configuration_file_path(APP_NAME, CONFIG_NAME).map_err(|e| Error::Io(std::io::Error::other(e.to_string())))
}

fn with_platform_defaults() -> Settings {
    let mut settings = Settings::default();
    if let Some(dir) = dirs::data_local_dir() {
        settings.templog_folder_path = dir.join(APP_NAME).join("temp").to_string_lossy().into_owned();
    }
    settings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_defaults_fill_templog_folder_path() {
        let settings = with_platform_defaults();
        assert_eq!(settings.combat_min_lines, 20);
        // Not every CI sandbox has a resolvable data-local dir; only assert
        // the field is populated when one exists.
        if dirs::data_local_dir().is_some() {
            assert!(!settings.templog_folder_path.is_empty());
        }
    }
}
