//! Account file persistence
//!
//! Two formats:
//!
//! 1. Status directory: one `<STATUS>.txt` file per status (`UNKNOWN.txt`,
//!    `GOOD.txt`, ...). Each line is `auth_token[:extra...]`; the extra data is
//!    opaque to us and written back verbatim, so operators can keep passwords,
//!    emails or notes next to the token. Saving moves each line into the file
//!    matching the account's current status.
//! 2. JSON snapshot: the full in-memory state (`auth_token`, `ct0`, status,
//!    identity) as a JSON array.
//!
//! All writes use atomic temp-file + rename and 0600 permissions, since every
//! file holds live session tokens.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::account::{Account, AccountStatus};
use crate::error::{Error, Result};

/// Separator between the token and the operator's extra data.
pub const LINE_SEPARATOR: char = ':';

/// An account together with the raw line it was loaded from.
#[derive(Debug, Clone)]
pub struct AccountRecord {
    pub account: Account,
    pub line: String,
}

impl AccountRecord {
    /// Parse `auth_token[:extra...]`.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        let token = line.split(LINE_SEPARATOR).next().unwrap_or_default();
        let account = Account::new(token)?;
        Ok(Self {
            account,
            line: line.to_string(),
        })
    }
}

/// Path of the file holding accounts with `status`.
pub fn status_file(dir: &Path, status: AccountStatus) -> PathBuf {
    dir.join(format!("{}.txt", status.label()))
}

/// Load every account from a status directory.
///
/// Missing status files are treated as empty. A malformed line is an error
/// rather than a skip: a skipped line would be dropped on the next save.
pub async fn load_status_dir(dir: &Path) -> Result<Vec<AccountRecord>> {
    let mut records = Vec::new();
    for status in AccountStatus::ALL {
        let path = status_file(dir, status);
        let exists = tokio::fs::try_exists(&path)
            .await
            .map_err(|e| Error::Io(format!("checking {}: {e}", path.display())))?;
        if !exists {
            continue;
        }
        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| Error::Io(format!("reading {}: {e}", path.display())))?;

        let before = records.len();
        for (index, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let mut record = AccountRecord::parse(line).map_err(|e| {
                Error::Parse(format!("{}:{}: {e}", path.display(), index + 1))
            })?;
            record.account.mark_status(status);
            records.push(record);
        }
        debug!(path = %path.display(), accounts = records.len() - before, "loaded status file");
    }
    info!(dir = %dir.display(), accounts = records.len(), "loaded accounts");
    Ok(records)
}

/// Write every record into the file for its current status.
///
/// All status files are rewritten, including empty ones, so an account that
/// changed status disappears from its old file.
pub async fn save_status_dir(dir: &Path, records: &[AccountRecord]) -> Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| Error::Io(format!("creating {}: {e}", dir.display())))?;

    for status in AccountStatus::ALL {
        let mut contents = String::new();
        for record in records.iter().filter(|r| r.account.status() == status) {
            contents.push_str(&record.line);
            contents.push('\n');
        }
        write_atomic(&status_file(dir, status), contents.as_bytes()).await?;
    }
    info!(dir = %dir.display(), accounts = records.len(), "saved accounts");
    Ok(())
}

/// Serialized form of one account in a JSON snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotEntry {
    auth_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ct0: Option<String>,
    status: AccountStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_id: Option<u64>,
}

impl From<&Account> for SnapshotEntry {
    fn from(account: &Account) -> Self {
        Self {
            auth_token: account.auth_token().to_string(),
            ct0: account.csrf_token().map(str::to_string),
            status: account.status(),
            username: account.username().map(str::to_string),
            user_id: account.user_id(),
        }
    }
}

impl TryFrom<SnapshotEntry> for Account {
    type Error = Error;

    fn try_from(entry: SnapshotEntry) -> Result<Self> {
        let mut account = Account::new(entry.auth_token)?;
        if let Some(ct0) = entry.ct0 {
            account.set_csrf_token(ct0);
        }
        if let Some(username) = entry.username {
            account.set_username(username);
        }
        if let Some(user_id) = entry.user_id {
            account.set_user_id(user_id);
        }
        account.mark_status(entry.status);
        Ok(account)
    }
}

/// Save accounts as a JSON snapshot.
pub async fn save_snapshot(path: &Path, accounts: &[Account]) -> Result<()> {
    let entries: Vec<SnapshotEntry> = accounts.iter().map(SnapshotEntry::from).collect();
    let json = serde_json::to_string_pretty(&entries)
        .map_err(|e| Error::Parse(format!("serializing snapshot: {e}")))?;
    write_atomic(path, json.as_bytes()).await
}

/// Load accounts from a JSON snapshot.
pub async fn load_snapshot(path: &Path) -> Result<Vec<Account>> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::Io(format!("reading snapshot {}: {e}", path.display())))?;
    let entries: Vec<SnapshotEntry> = serde_json::from_str(&contents)
        .map_err(|e| Error::Parse(format!("parsing snapshot {}: {e}", path.display())))?;
    entries.into_iter().map(Account::try_from).collect()
}

/// Write a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over the
/// target. Sets 0600 permissions on unix.
async fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("account path has no parent directory".into()))?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::Io("account path has no file name".into()))?;

    let tmp_path = dir.join(format!(".{file_name}.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, data)
        .await
        .map_err(|e| Error::Io(format!("writing temp account file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting account file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp account file: {e}")))?;

    debug!(path = %path.display(), "persisted account file");
    Ok(())
}
