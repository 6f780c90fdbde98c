//! Rule files: one TOML [`RuleDefinition`] per `*.toml` file.

use std::path::{Path, PathBuf};

use phonebot_domain::rule::RuleDefinition;

/// A rule file that could not be read or parsed.
#[derive(Debug, thiserror::Error)]
pub enum RuleFileError {
    #[error("failed to read rule file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse rule file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Parse a single rule file.
///
/// # Errors
///
/// Returns [`RuleFileError`] if the file cannot be read or is not a valid
/// rule definition.
pub fn read_rule_file(path: &Path) -> Result<RuleDefinition, RuleFileError> {
    let content = std::fs::read_to_string(path).map_err(|source| RuleFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| RuleFileError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Read every `*.toml` file in `dir`, sorted by file name.
///
/// Each file is parsed independently; a broken file only yields its own
/// error. A missing directory yields nothing.
///
/// # Errors
///
/// Returns [`RuleFileError::Io`] if the directory exists but cannot be listed.
pub fn read_rule_dir(
    dir: &Path,
) -> Result<Vec<Result<RuleDefinition, RuleFileError>>, RuleFileError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(RuleFileError::Io {
                path: dir.to_path_buf(),
                source,
            });
        }
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    paths.sort();

    Ok(paths.iter().map(|path| read_rule_file(path)).collect())
}
