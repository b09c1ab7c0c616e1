//! On-disk store of saved session tokens.
//!
//! Layout inside the credential directory:
//! - `lastuser`: name of the account that last logged in
//! - `<account>.key`: that account's session token
//!
//! Both files are replaced atomically and are readable by the owner only.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

const LAST_USER_FILE: &str = "lastuser";
const TOKEN_EXTENSION: &str = "key";

/// A token found on disk, ready to resume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedSession {
    pub account: String,
    pub token: String,
}

#[derive(Debug, Clone)]
pub struct CredentialStore {
    dir: PathBuf,
}

impl CredentialStore {
    /// Opens the store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create credential directory: {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The last account that logged in successfully.
    pub fn last_user(&self) -> Result<Option<String>> {
        let path = self.dir.join(LAST_USER_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let user = content.trim();
        Ok((!user.is_empty()).then(|| user.to_string()))
    }

    /// The saved token for `account`. Missing and malformed tokens are both
    /// `None`.
    pub fn read_token(&self, account: &str) -> Result<Option<String>> {
        let path = self.token_path(account);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let token = content.trim();
        if !is_well_formed(token) {
            tracing::warn!(account, path = %path.display(), "Ignoring malformed session token");
            return Ok(None);
        }
        Ok(Some(token.to_string()))
    }

    /// Token for `account`, or for the last user when no account is given.
    pub fn load_saved(&self, account: Option<&str>) -> Result<Option<SavedSession>> {
        let account = match account {
            Some(account) => account.to_string(),
            None => match self.last_user()? {
                Some(user) => user,
                None => return Ok(None),
            },
        };
        Ok(self
            .read_token(&account)?
            .map(|token| SavedSession { account, token }))
    }

    /// Stores `token` for `account` and marks the account as last used.
    pub fn save(&self, account: &str, token: &str) -> Result<()> {
        write_private(&self.token_path(account), token)?;
        write_private(&self.dir.join(LAST_USER_FILE), account)?;
        tracing::debug!(account, dir = %self.dir.display(), "Saved session token");
        Ok(())
    }

    fn token_path(&self, account: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}", file_stem(account), TOKEN_EXTENSION))
    }
}

/// Account names are case-insensitive; anything outside `[a-z0-9_-]` is
/// replaced so a name can never escape the directory.
fn file_stem(account: &str) -> String {
    account
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn is_well_formed(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| c.is_ascii_graphic())
}

fn write_private(path: &Path, content: &str) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .context("Credential path has no file name")?;
    let temp_path = path.with_file_name(format!(".{}.tmp", file_name));

    fs::write(&temp_path, content)
        .with_context(|| format!("Failed to write {}", temp_path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&temp_path, fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to restrict {}", temp_path.display()))?;
    }

    fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to rename temp file to: {}", path.display()))?;
    Ok(())
}
