//! Credential storage for the QuickBooks token pair
//!
//! `CredentialStore` is the load/save contract the rest of the workspace
//! depends on. `EnvFileStore` persists the pair as two keys of a dotenv-style
//! file, rewriting only those two lines and committing with an atomic
//! temp-file + rename so a failed save leaves the prior pair intact.
//! `MemoryStore` keeps the pair in process for embedding and tests.
//!
//! The store is the single source of truth: callers load a fresh snapshot
//! before every request instead of caching tokens themselves.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::constants::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
use crate::error::{Error, Result};

/// The OAuth token pair for the single QuickBooks company this deployment
/// talks to.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// Bearer token for API calls
    pub access_token: String,
    /// Single-use token exchanged for a new pair
    pub refresh_token: String,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .finish()
    }
}

/// Persistence contract for the token pair.
///
/// `save` must be all-or-nothing over both fields. Uses `Pin<Box<dyn Future>>`
/// return types so the store can be shared as `Arc<dyn CredentialStore>`.
pub trait CredentialStore: Send + Sync {
    /// Read the current pair. Fails with `StoreUnavailable` when the medium
    /// cannot be read and `MissingCredential` when a field is absent.
    fn load(&self) -> Pin<Box<dyn Future<Output = Result<Credential>> + Send + '_>>;

    /// Replace the stored pair. Fails with `StoreWriteError`.
    fn save(&self, credential: Credential)
    -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Dotenv-style file store.
///
/// Only the access and refresh token lines are ever rewritten; every other
/// line (client ID, company ID, comments) is preserved byte for byte.
pub struct EnvFileStore {
    path: PathBuf,
    access_key: String,
    refresh_key: String,
    write_lock: Mutex<()>,
}

impl EnvFileStore {
    /// Store using the default `QB_ACCESS_TOKEN` / `QB_REFRESH_TOKEN` keys.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_keys(path, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY)
    }

    pub fn with_keys(
        path: impl Into<PathBuf>,
        access_key: impl Into<String>,
        refresh_key: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            access_key: access_key.into(),
            refresh_key: refresh_key.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load_inner(&self) -> Result<Credential> {
        let contents = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            Error::StoreUnavailable(format!("reading {}: {e}", self.path.display()))
        })?;

        let access = lookup(&contents, &self.access_key);
        let refresh = lookup(&contents, &self.refresh_key);

        match (access, refresh) {
            (Some(access), Some(refresh)) => Ok(Credential::new(access, refresh)),
            (None, _) => Err(Error::MissingCredential(format!(
                "{} not set in {}",
                self.access_key,
                self.path.display()
            ))),
            (_, None) => Err(Error::MissingCredential(format!(
                "{} not set in {}",
                self.refresh_key,
                self.path.display()
            ))),
        }
    }

    async fn save_inner(&self, credential: Credential) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let current = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => {
                return Err(Error::StoreWriteError(format!(
                    "reading {} before update: {e}",
                    self.path.display()
                )));
            }
        };

        let updated = rewrite(
            &current,
            &[
                (self.access_key.as_str(), credential.access_token.as_str()),
                (self.refresh_key.as_str(), credential.refresh_token.as_str()),
            ],
        );

        if updated == current {
            debug!(path = %self.path.display(), "credential unchanged, skipping write");
            return Ok(());
        }

        write_atomic(&self.path, &updated).await?;
        info!(path = %self.path.display(), "persisted credential");
        Ok(())
    }
}

impl CredentialStore for EnvFileStore {
    fn load(&self) -> Pin<Box<dyn Future<Output = Result<Credential>> + Send + '_>> {
        Box::pin(self.load_inner())
    }

    fn save(
        &self,
        credential: Credential,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(self.save_inner(credential))
    }
}

/// In-process store.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<Option<Credential>>,
}

impl MemoryStore {
    pub fn new(credential: Credential) -> Self {
        Self {
            state: RwLock::new(Some(credential)),
        }
    }

    /// A store with nothing in it; `load()` fails with `MissingCredential`.
    pub fn empty() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryStore {
    fn load(&self) -> Pin<Box<dyn Future<Output = Result<Credential>> + Send + '_>> {
        Box::pin(async move {
            self.state
                .read()
                .await
                .clone()
                .ok_or_else(|| Error::MissingCredential("no credential in memory store".into()))
        })
    }

    fn save(
        &self,
        credential: Credential,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            *self.state.write().await = Some(credential);
            Ok(())
        })
    }
}

/// Split a dotenv line into key and unquoted value.
///
/// Accepts an optional `export ` prefix. Comments and blank lines yield None.
fn parse_line(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
    let (key, value) = trimmed.split_once('=')?;
    Some((key.trim(), unquote(value.trim())))
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Last value assigned to `key`; an empty assignment counts as unset.
fn lookup(contents: &str, key: &str) -> Option<String> {
    contents
        .lines()
        .filter_map(parse_line)
        .filter(|(k, _)| *k == key)
        .map(|(_, v)| v)
        .next_back()
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

/// Set each key to its value, keeping line endings and untouched lines.
///
/// A line whose value already matches is kept verbatim (quotes included),
/// so writing back what was just loaded produces identical bytes.
fn rewrite(contents: &str, updates: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(contents.len() + 128);
    let mut seen = vec![false; updates.len()];

    for line in contents.split_inclusive('\n') {
        let body = line.trim_end_matches(['\r', '\n']);
        let ending = &line[body.len()..];

        let replacement = parse_line(body).and_then(|(key, value)| {
            let idx = updates.iter().position(|(k, _)| *k == key)?;
            seen[idx] = true;
            let new_value = updates[idx].1;
            if value == new_value {
                None
            } else {
                let export = if body.trim_start().starts_with("export ") {
                    "export "
                } else {
                    ""
                };
                Some(format!("{export}{key}={new_value}"))
            }
        });

        match replacement {
            Some(new_line) => {
                out.push_str(&new_line);
                out.push_str(ending);
            }
            None => out.push_str(line),
        }
    }

    for ((key, value), present) in updates.iter().zip(seen) {
        if !present {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&format!("{key}={value}\n"));
        }
    }

    out
}

/// Write the credential file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. A crash or failed rename leaves the previous file untouched.
/// Sets permissions to 0600 since the file holds OAuth tokens.
async fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "credentials".into());
    let tmp_path = dir.join(format!(".{file_name}.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, contents.as_bytes())
        .await
        .map_err(|e| Error::StoreWriteError(format!("writing temp credential file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        if let Err(e) = tokio::fs::set_permissions(&tmp_path, perms).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(Error::StoreWriteError(format!(
                "setting credential file permissions: {e}"
            )));
        }
    }

    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(Error::StoreWriteError(format!(
            "renaming temp credential file: {e}"
        )));
    }

    debug!(path = %path.display(), "credential file replaced");
    Ok(())
}
