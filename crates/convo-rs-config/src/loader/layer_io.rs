//! Discovery and reading of file-backed config layers.

use super::{
    ConfigLayer, ConfigLayerSource, DEFAULT_CONFIG_DIR, DEFAULT_CONFIG_FILE,
    LayeredConfigOptions, LoadedLayer, SchemaMode, schema,
};
use crate::ConfigError;
use directories::UserDirs;
use log::debug;
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// A file layer the loader will try, in precedence order.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct LayerCandidate {
    pub(super) source: ConfigLayerSource,
    pub(super) path: PathBuf,
    /// Runtime paths were named explicitly, so a missing file is an error.
    pub(super) required: bool,
}

/// List file layers low to high: user, cwd, then each runtime path.
///
/// The same file reached through two routes (for example a runtime path that
/// points at the cwd config) is only listed once, at its first position.
pub(super) fn layer_candidates(
    options: &LayeredConfigOptions,
) -> Result<Vec<LayerCandidate>, ConfigError> {
    let cwd = canonical_or_given(&options.cwd)?;
    let mut candidates = Vec::new();
    if let Some(path) = &options.user_config_path {
        candidates.push(LayerCandidate {
            source: ConfigLayerSource::User,
            path: path.clone(),
            required: false,
        });
    }
    candidates.push(LayerCandidate {
        source: ConfigLayerSource::Cwd,
        path: cwd.join(DEFAULT_CONFIG_FILE),
        required: false,
    });
    candidates.extend(options.runtime_paths.iter().map(|path| LayerCandidate {
        source: ConfigLayerSource::Runtime,
        path: path.clone(),
        required: true,
    }));

    let mut seen = HashSet::new();
    candidates.retain(|candidate| {
        let key = candidate
            .path
            .canonicalize()
            .unwrap_or_else(|_| candidate.path.clone());
        let first = seen.insert(key);
        if !first {
            debug!(
                "skipping duplicate layer (source={:?}, path={})",
                candidate.source,
                candidate.path.display()
            );
        }
        first
    });
    Ok(candidates)
}

/// Read, parse and partially validate one layer.
///
/// Optional layers that do not exist yield `None`; other read failures are
/// errors for every layer.
pub(super) fn read_layer(candidate: &LayerCandidate) -> Result<Option<LoadedLayer>, ConfigError> {
    let contents = match fs::read_to_string(&candidate.path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound && !candidate.required => {
            debug!(
                "optional layer missing (source={:?}, path={})",
                candidate.source,
                candidate.path.display()
            );
            return Ok(None);
        }
        Err(err) => return Err(ConfigError::ReadFailed(err)),
    };
    debug!(
        "loaded config layer (source={:?}, path={}, len={})",
        candidate.source,
        candidate.path.display(),
        contents.len()
    );
    let value: Value = json5::from_str(&contents)?;
    schema::validate_layer_schema(&value, SchemaMode::Partial, &layer_label(candidate))?;
    Ok(Some(LoadedLayer {
        meta: ConfigLayer {
            source: candidate.source,
            path: Some(candidate.path.clone()),
        },
        value,
    }))
}

/// Label used to prefix schema errors, e.g. `cwd(/srv/convo.json5)`.
fn layer_label(candidate: &LayerCandidate) -> String {
    let name = match candidate.source {
        ConfigLayerSource::User => "user",
        ConfigLayerSource::Cwd => "cwd",
        ConfigLayerSource::Runtime => "runtime",
        ConfigLayerSource::Environment => "env",
    };
    format!("{name}({})", candidate.path.display())
}

/// Canonicalize when the path exists; keep it as given otherwise.
fn canonical_or_given(path: &Path) -> Result<PathBuf, ConfigError> {
    match path.canonicalize() {
        Ok(path) => Ok(path),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(path.to_path_buf()),
        Err(err) => Err(ConfigError::ReadFailed(err)),
    }
}

/// `~/.convo/convo.json5`, when a home directory can be resolved.
pub(super) fn default_user_config_path() -> Option<PathBuf> {
    UserDirs::new().map(|dirs| {
        dirs.home_dir()
            .join(DEFAULT_CONFIG_DIR)
            .join(DEFAULT_CONFIG_FILE)
    })
}
