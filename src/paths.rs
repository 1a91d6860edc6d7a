//! Log directory resolution
//!
//! Picks a per-application log directory following the conventions of the
//! host OS, creates it when missing and checks that it is writable. When the
//! platform location is unusable the resolver falls back to `./logs`.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use crate::config::FileFormat;
use crate::error::PathResolutionError;

/// Directory name used for the working-directory fallback
pub const FALLBACK_DIR_NAME: &str = "logs";

const WRITE_CHECK_FILE: &str = ".standard_logger_write_check";

/// Where a [`LogDirectory`] came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectorySource {
    /// Caller-supplied override
    Override,
    /// OS user log directory
    Platform,
    /// `./logs` fallback
    WorkingDirectory,
}

/// A resolved, writable log directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogDirectory {
    /// Absolute path to the directory
    pub path: PathBuf,
    /// Whether this resolution created the directory
    pub created: bool,
    pub source: DirectorySource,
}

impl LogDirectory {
    /// Path of a file inside this directory
    pub fn join(&self, file_name: &str) -> PathBuf {
        self.path.join(file_name)
    }
}

/// Resolve the log directory for `app_name`
///
/// An override is used verbatim (after `~` expansion). Without one the
/// platform convention is tried first, then `./logs`.
pub fn resolve(
    app_name: &str,
    override_path: Option<&Path>,
) -> Result<LogDirectory, PathResolutionError> {
    let app_name = app_name.trim();
    if app_name.is_empty() {
        return Err(PathResolutionError::new(
            PathBuf::new(),
            "application name is empty",
        ));
    }

    if let Some(path) = override_path {
        let expanded = expand_tilde(path);
        return ensure_writable(&expanded, DirectorySource::Override);
    }

    match platform_log_dir(app_name) {
        Some(dir) => match ensure_writable(&dir, DirectorySource::Platform) {
            Ok(resolved) => {
                tracing::debug!(path = %resolved.path.display(), "Using platform log directory");
                Ok(resolved)
            }
            Err(e) => {
                tracing::warn!("Failed to use platform log directory: {}. Falling back to CWD.", e);
                working_dir_fallback()
            }
        },
        None => {
            tracing::warn!("Could not determine platform log directory, falling back to CWD");
            working_dir_fallback()
        }
    }
}

fn working_dir_fallback() -> Result<LogDirectory, PathResolutionError> {
    let cwd = std::env::current_dir()
        .map_err(|e| PathResolutionError::new(FALLBACK_DIR_NAME, e.to_string()))?;
    let resolved = ensure_writable(&cwd.join(FALLBACK_DIR_NAME), DirectorySource::WorkingDirectory)?;
    tracing::warn!(path = %resolved.path.display(), "Using fallback log directory");
    Ok(resolved)
}

/// Platform convention for per-user application logs
///
/// - Linux and other Unix: `$XDG_STATE_HOME/<app>/log`
/// - macOS: `~/Library/Logs/<app>`
/// - Windows: `%LOCALAPPDATA%\<app>\Logs`
pub fn platform_log_dir(app_name: &str) -> Option<PathBuf> {
    let app = sanitize_name(app_name);

    #[cfg(target_os = "macos")]
    {
        dirs::home_dir().map(|h| h.join("Library").join("Logs").join(app))
    }

    #[cfg(windows)]
    {
        dirs::data_local_dir().map(|d| d.join(app).join("Logs"))
    }

    #[cfg(not(any(target_os = "macos", windows)))]
    {
        dirs::state_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".local").join("state")))
            .map(|d| d.join(app).join("log"))
    }
}

/// File name of the active log file for `app_name`
pub fn log_file_name(app_name: &str, format: FileFormat) -> String {
    format!("{}.{}", sanitize_name(app_name), format.extension())
}

/// Replace characters that are awkward in file names
pub fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    // Leading dots would make hidden files (or `..`)
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "app".to_string()
    } else {
        cleaned.to_string()
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(s) => PathBuf::from(shellexpand::tilde(s).into_owned()),
        None => path.to_path_buf(),
    }
}

/// Create `dir` if needed and prove it is writable with a scratch file
fn ensure_writable(dir: &Path, source: DirectorySource) -> Result<LogDirectory, PathResolutionError> {
    let absolute = if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| PathResolutionError::new(dir, e.to_string()))?
            .join(dir)
    };

    let existed = absolute.is_dir();
    if !existed {
        if absolute.exists() {
            return Err(PathResolutionError::new(&absolute, "exists but is not a directory"));
        }
        fs::create_dir_all(&absolute)
            .map_err(|e| PathResolutionError::new(&absolute, format!("cannot create: {}", e)))?;
    }

    let scratch = absolute.join(WRITE_CHECK_FILE);
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&scratch)
        .map_err(|e| PathResolutionError::new(&absolute, format!("not writable: {}", e)))?;
    let _ = fs::remove_file(&scratch);

    Ok(LogDirectory {
        path: absolute,
        created: !existed,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_override_is_created() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("nested").join("logs");

        let dir = resolve("demo", Some(&target)).unwrap();
        assert_eq!(dir.path, target);
        assert!(dir.created);
        assert_eq!(dir.source, DirectorySource::Override);
        assert!(target.is_dir());
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("logs");

        let first = resolve("demo", Some(&target)).unwrap();
        let second = resolve("demo", Some(&target)).unwrap();
        assert_eq!(first.path, second.path);
        assert!(first.created);
        assert!(!second.created);
        // Scratch file must not linger
        assert_eq!(fs::read_dir(&target).unwrap().count(), 0);
    }

    #[test]
    fn test_override_that_is_a_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("not-a-dir");
        fs::write(&file, b"x").unwrap();

        let err = resolve("demo", Some(&file)).unwrap_err();
        assert_eq!(err.path, file);
    }

    #[test]
    fn test_empty_app_name_fails() {
        assert!(resolve("   ", None).is_err());
    }

    #[test]
    fn test_platform_dir_contains_app_name() {
        if let Some(dir) = platform_log_dir("demo app") {
            assert!(dir.to_string_lossy().contains("demo_app"));
        }
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("my app/v2"), "my_app_v2");
        assert_eq!(sanitize_name("..hidden"), "hidden");
        assert_eq!(sanitize_name("..."), "app");
        assert_eq!(sanitize_name("svc-1.0_x"), "svc-1.0_x");
    }

    #[test]
    fn test_log_file_name() {
        assert_eq!(log_file_name("demo", FileFormat::Json), "demo.jsonl");
        assert_eq!(log_file_name("demo", FileFormat::Text), "demo.log");
    }
}
