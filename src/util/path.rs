use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Extension of files holding leaf definitions.
pub const DEFINITION_EXTENSION: &str = "toml";

pub trait PathExt {
    fn is_definition_file(&self) -> bool;
    fn expanded(&self) -> PathBuf;
}

impl PathExt for Path {
    fn is_definition_file(&self) -> bool {
        self.extension() == Some(OsStr::new(DEFINITION_EXTENSION))
    }

    fn expanded(&self) -> PathBuf {
        PathBuf::from(expand_env_vars(&self.to_string_lossy()))
    }
}

/// Expand environment variables in a path string.
///
/// Supports `$VAR`, `${VAR}` and `~` for the home directory. Unknown
/// variables leave the input untouched.
pub fn expand_env_vars(path: &str) -> String {
    shellexpand::full(path)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| path.to_string())
}
