use crate::config::KerberosSettings;
use crate::AdRestError;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

pub const CCACHE_ENV: &str = "KRB5CCNAME";

/// Process-wide credential caches, one temp file per (user, password).
///
/// Entries are never evicted. A cached file is probed with `klist -s`
/// before each use and refreshed with `kinit` when the probe fails.
#[derive(Debug)]
pub struct TicketCache {
    klist: PathBuf,
    kinit: PathBuf,
    tickets: Mutex<HashMap<String, NamedTempFile>>,
}

/// Holds the cache lock on one valid credential cache. Binds must
/// complete before this guard is dropped.
pub struct TicketGuard<'a> {
    _tickets: MutexGuard<'a, HashMap<String, NamedTempFile>>,
    path: PathBuf,
}

impl TicketGuard<'_> {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Points the process-wide `KRB5CCNAME` at this cache for a GSSAPI
    /// bind, which reads it from the environment.
    pub fn export(&self) {
        std::env::set_var(CCACHE_ENV, &self.path);
    }
}

pub fn cache_key(user: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user.as_bytes());
    hasher.update([0u8]);
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl TicketCache {
    pub fn new(settings: &KerberosSettings) -> Self {
        Self {
            klist: settings.klist.clone(),
            kinit: settings.kinit.clone(),
            tickets: Mutex::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.tickets.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tickets.lock().await.is_empty()
    }

    /// Locks and returns a valid ticket cache for `user`, running `kinit`
    /// when the cached one fails the probe.
    pub async fn acquire(&self, user: &str, password: &str) -> crate::Result<TicketGuard<'_>> {
        let mut tickets = self.tickets.lock().await;

        let key = cache_key(user, password);
        if !tickets.contains_key(&key) {
            let file = NamedTempFile::new()?;
            debug!("Allocated ticket cache {:?} for {}", file.path(), user);
            tickets.insert(key.clone(), file);
        }
        let path = tickets
            .get(&key)
            .map(|file| file.path().to_path_buf())
            .ok_or_else(|| AdRestError::Kerberos("ticket cache entry vanished".to_string()))?;

        if !self.probe(&path).await? {
            self.kinit(&path, user, password).await?;
            info!("Obtained Kerberos ticket for {}", user);
        }

        Ok(TicketGuard {
            _tickets: tickets,
            path,
        })
    }

    async fn probe(&self, ccache: &Path) -> crate::Result<bool> {
        let status = Command::new(&self.klist)
            .arg("-s")
            .env(CCACHE_ENV, ccache)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| AdRestError::Kerberos(format!("failed to run {:?}: {}", self.klist, e)))?;
        Ok(status.success())
    }

    async fn kinit(&self, ccache: &Path, user: &str, password: &str) -> crate::Result<()> {
        let mut child = Command::new(&self.kinit)
            .arg(user)
            .env(CCACHE_ENV, ccache)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| AdRestError::Kerberos(format!("failed to run {:?}: {}", self.kinit, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(format!("{}\n", password).as_bytes())
                .await
                .map_err(|e| AdRestError::Kerberos(format!("kinit stdin: {}", e)))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| AdRestError::Kerberos(format!("kinit: {}", e)))?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() || !stderr.trim().is_empty() {
            return Err(AdRestError::Kerberos(format!(
                "kinit failed for {}: {}",
                user,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(klist: &str, kinit: &str) -> KerberosSettings {
        KerberosSettings {
            klist: PathBuf::from(klist),
            kinit: PathBuf::from(kinit),
        }
    }

    #[test]
    fn test_cache_key_separates_fields() {
        assert_ne!(cache_key("ab", "c"), cache_key("a", "bc"));
        assert_eq!(cache_key("user", "pw"), cache_key("user", "pw"));
        assert_eq!(cache_key("user", "pw").len(), 64);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_valid_probe_reuses_cache_file() {
        // `true` stands in for a klist that reports a valid ticket
        let cache = TicketCache::new(&settings("true", "false"));

        let first = cache.acquire("alice@EXAMPLE.COM", "pw").await.unwrap().path().to_path_buf();
        let second = cache.acquire("alice@EXAMPLE.COM", "pw").await.unwrap().path().to_path_buf();
        assert_eq!(first, second);
        assert!(second.exists());

        cache.acquire("bob@EXAMPLE.COM", "pw").await.unwrap();
        assert_eq!(cache.len().await, 2);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_tools_see_cache_without_global_env() {
        use std::os::unix::fs::PermissionsExt;

        // succeeds only when the child is handed an existing cache file
        let dir = tempfile::tempdir().unwrap();
        let klist = dir.path().join("klist");
        std::fs::write(&klist, "#!/bin/sh\ntest -f \"$KRB5CCNAME\"\n").unwrap();
        std::fs::set_permissions(&klist, std::fs::Permissions::from_mode(0o755)).unwrap();

        let cache = TicketCache::new(&KerberosSettings {
            klist,
            kinit: PathBuf::from("false"),
        });
        let guard = cache.acquire("carol@EXAMPLE.COM", "pw").await.unwrap();
        assert_ne!(
            std::env::var_os(CCACHE_ENV).as_deref(),
            Some(guard.path().as_os_str())
        );

        guard.export();
        assert_eq!(
            std::env::var_os(CCACHE_ENV).as_deref(),
            Some(guard.path().as_os_str())
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_kinit_is_reported() {
        let cache = TicketCache::new(&settings("false", "false"));
        let result = cache.acquire("alice@EXAMPLE.COM", "pw").await;
        assert!(matches!(result, Err(AdRestError::Kerberos(_))));
    }

    #[tokio::test]
    async fn test_missing_klist_is_reported() {
        let cache = TicketCache::new(&settings("/nonexistent/klist", "/nonexistent/kinit"));
        let result = cache.acquire("alice@EXAMPLE.COM", "pw").await;
        assert!(matches!(result, Err(AdRestError::Kerberos(_))));
    }
}
