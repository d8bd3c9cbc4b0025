// SPDX-FileCopyrightText: 2026 Chatkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for the chatkeep store.
//!
//! TOML files are layered system, user, then local, with `CHATKEEP_*`
//! environment overrides on top. Unknown keys are rejected and reported as
//! miette diagnostics with typo suggestions.
//!
//! ```no_run
//! let config = chatkeep_config::load_and_validate().expect("config errors");
//! println!("database: {}", config.storage.database_path);
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

use std::path::Path;

pub use diagnostic::{ConfigError, render_errors};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::{AppConfig, ChatkeepConfig, LocksConfig, StorageConfig};

/// Load from the standard hierarchy and validate.
pub fn load_and_validate() -> Result<ChatkeepConfig, Vec<ConfigError>> {
    finish(loader::load_config(), collect_toml_sources)
}

/// Load from one explicit file (plus env) and validate.
pub fn load_and_validate_path(path: &Path) -> Result<ChatkeepConfig, Vec<ConfigError>> {
    finish(loader::load_config_from_path(path), || {
        std::fs::read_to_string(path)
            .map(|content| vec![(path.display().to_string(), content)])
            .unwrap_or_default()
    })
}

/// Load from TOML text and validate.
pub fn load_and_validate_str(toml_content: &str) -> Result<ChatkeepConfig, Vec<ConfigError>> {
    finish(loader::load_config_from_str(toml_content), || {
        vec![("<inline>".to_string(), toml_content.to_string())]
    })
}

fn finish(
    loaded: Result<ChatkeepConfig, figment::Error>,
    sources: impl FnOnce() -> Vec<(String, String)>,
) -> Result<ChatkeepConfig, Vec<ConfigError>> {
    match loaded {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => Err(diagnostic::figment_to_config_errors(err, &sources())),
    }
}

/// Contents of whichever config files exist, keyed by the path figment reports.
fn collect_toml_sources() -> Vec<(String, String)> {
    let local = std::env::current_dir()
        .map(|d| d.join(loader::LOCAL_CONFIG))
        .unwrap_or_else(|_| loader::LOCAL_CONFIG.into());
    [
        local,
        loader::user_config_path(),
        Path::new(loader::SYSTEM_CONFIG).to_path_buf(),
    ]
    .into_iter()
    .filter_map(|path| {
        let content = std::fs::read_to_string(&path).ok()?;
        Some((path.display().to_string(), content))
    })
    .collect()
}
