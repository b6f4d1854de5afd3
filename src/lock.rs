//! Advisory repository lock.
//!
//! The blob store has no compare-and-swap, so the lock is a best-effort
//! write followed by a read-back. Two claimants racing within the same
//! window are told apart by a random nonce in the claim; whoever reads back
//! someone else's claim has lost.

use crate::error::{Error, Result};
use crate::storage::{Conflict, Storage};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

const LOCK_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// The part of the repository a lock covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockScope {
    pub codename: String,
    pub component: Option<String>,
    pub architecture: Option<String>,
}

impl LockScope {
    pub fn codename(codename: &str) -> Self {
        Self {
            codename: codename.to_string(),
            component: None,
            architecture: None,
        }
    }

    pub fn component(codename: &str, component: &str) -> Self {
        Self {
            component: Some(component.to_string()),
            ..Self::codename(codename)
        }
    }

    pub fn architecture(codename: &str, component: &str, architecture: &str) -> Self {
        Self {
            architecture: Some(architecture.to_string()),
            ..Self::component(codename, component)
        }
    }

    /// Repository path of the lockfile for this scope.
    pub fn path(&self) -> String {
        match (&self.component, &self.architecture) {
            (Some(component), Some(arch)) => format!(
                "dists/{}/{}/binary-{}/lockfile",
                self.codename, component, arch
            ),
            (Some(component), None) => format!("dists/{}/{}/lockfile", self.codename, component),
            _ => format!("dists/{}/lockfile", self.codename),
        }
    }
}

impl fmt::Display for LockScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.codename)?;
        if let Some(component) = &self.component {
            write!(f, "/{}", component)?;
        }
        if let Some(arch) = &self.architecture {
            write!(f, "/{}", arch)?;
        }
        Ok(())
    }
}

/// Who holds a lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lock {
    pub user: String,
    pub host: String,
}

impl Lock {
    /// Parse a `user@host_nonce` claim.
    pub fn parse(claim: &str) -> Self {
        let claim = claim.trim();
        let (user, rest) = claim.split_once('@').unwrap_or(("unknown", claim));
        let host = rest.rsplit_once('_').map(|(host, _)| host).unwrap_or(rest);
        Self {
            user: user.to_string(),
            host: host.to_string(),
        }
    }
}

impl fmt::Display for Lock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user, self.host)
    }
}

fn identity() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("LOGNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

fn new_claim() -> String {
    format!(
        "{}@{}_{}",
        identity(),
        gethostname::gethostname().to_string_lossy(),
        uuid::Uuid::new_v4()
    )
}

pub fn locked(storage: &Storage, scope: &LockScope) -> Result<bool> {
    storage.exists(&scope.path())
}

/// Write a fresh claim for `scope` and return it.
pub(crate) fn write_claim(storage: &Storage, scope: &LockScope) -> Result<String> {
    let claim = new_claim();
    debug!("Claiming lock {} as {}", scope.path(), claim);
    storage.store(
        &scope.path(),
        claim.as_bytes(),
        LOCK_CONTENT_TYPE,
        None,
        Conflict::Overwrite,
    )?;
    Ok(claim)
}

/// Check that the stored claim for `scope` is still `claim`.
pub(crate) fn confirm(storage: &Storage, scope: &LockScope, claim: &str) -> Result<()> {
    let stored = storage
        .read(&scope.path())?
        .map(|data| String::from_utf8_lossy(&data).trim().to_string())
        .unwrap_or_default();
    if stored != claim {
        return Err(Error::LockLost {
            path: scope.path(),
            holder: if stored.is_empty() {
                "nobody".to_string()
            } else {
                Lock::parse(&stored).to_string()
            },
        });
    }
    Ok(())
}

/// Claim the lock for `scope`.
///
/// Fails with [`Error::LockLost`] if another claimant overwrote the claim
/// before it could be read back.
pub fn lock(storage: &Storage, scope: &LockScope) -> Result<()> {
    let claim = write_claim(storage, scope)?;
    confirm(storage, scope, &claim)
}

/// Poll until `scope` is free, at most `max_attempts` times.
pub fn wait_for_lock(
    storage: &Storage,
    scope: &LockScope,
    max_attempts: u32,
    wait: Duration,
) -> Result<()> {
    for attempt in 1..=max_attempts {
        if !locked(storage, scope)? {
            return Ok(());
        }
        if let Some(holder) = current(storage, scope)? {
            info!(
                "Repository {} is locked by {} (attempt {}/{})",
                scope, holder, attempt, max_attempts
            );
        }
        if attempt < max_attempts {
            std::thread::sleep(wait);
        }
    }
    Err(Error::LockTimeout {
        path: scope.path(),
        attempts: max_attempts,
    })
}

/// Release the lock for `scope`, whoever holds it.
pub fn unlock(storage: &Storage, scope: &LockScope) -> Result<()> {
    storage.remove(&scope.path())
}

/// Current holder of the lock for `scope`, if any.
pub fn current(storage: &Storage, scope: &LockScope) -> Result<Option<Lock>> {
    Ok(storage
        .read(&scope.path())?
        .map(|data| Lock::parse(&String::from_utf8_lossy(&data))))
}

/// Wait for `scope` to be free and claim it, retrying lost races within the
/// same attempt budget.
pub fn acquire(
    storage: &Storage,
    scope: &LockScope,
    max_attempts: u32,
    wait: Duration,
) -> Result<()> {
    let mut remaining = max_attempts;
    loop {
        wait_for_lock(storage, scope, remaining, wait)?;
        match lock(storage, scope) {
            Ok(()) => {
                debug!("Acquired lock {}", scope.path());
                return Ok(());
            }
            Err(Error::LockLost { holder, .. }) if remaining > 1 => {
                warn!("Lost race for {} to {}, retrying", scope, holder);
                remaining -= 1;
                std::thread::sleep(wait);
            }
            Err(Error::LockLost { .. }) => {
                return Err(Error::LockTimeout {
                    path: scope.path(),
                    attempts: max_attempts,
                })
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Visibility;
    use crate::storage::MemoryStore;
    use std::sync::Arc;

    fn storage() -> Storage {
        Storage::new(Arc::new(MemoryStore::new()), None, Visibility::Private, false)
    }

    #[test]
    fn test_scope_paths() {
        assert_eq!(LockScope::codename("stable").path(), "dists/stable/lockfile");
        assert_eq!(
            LockScope::component("stable", "main").path(),
            "dists/stable/main/lockfile"
        );
        assert_eq!(
            LockScope::architecture("stable", "main", "amd64").path(),
            "dists/stable/main/binary-amd64/lockfile"
        );
        assert_eq!(
            LockScope::architecture("stable", "main", "amd64").to_string(),
            "stable/main/amd64"
        );
    }

    #[test]
    fn test_parse_claim() {
        let lock = Lock::parse("jane@build-01_0b4e7a0e-5b6f-4f6c-9a4b-1c2d3e4f5a6b\n");
        assert_eq!(lock.user, "jane");
        assert_eq!(lock.host, "build-01");
        assert_eq!(lock.to_string(), "jane@build-01");
    }

    #[test]
    fn test_lock_unlock() {
        let storage = storage();
        let scope = LockScope::component("stable", "main");
        assert!(!locked(&storage, &scope).unwrap());
        assert_eq!(current(&storage, &scope).unwrap(), None);

        lock(&storage, &scope).unwrap();
        assert!(locked(&storage, &scope).unwrap());
        let holder = current(&storage, &scope).unwrap().unwrap();
        assert_eq!(
            holder.host,
            gethostname::gethostname().to_string_lossy().as_ref()
        );

        unlock(&storage, &scope).unwrap();
        assert!(!locked(&storage, &scope).unwrap());
    }

    #[test]
    fn test_race_has_one_winner() {
        let storage = storage();
        let scope = LockScope::architecture("stable", "main", "amd64");

        let first = write_claim(&storage, &scope).unwrap();
        let second = write_claim(&storage, &scope).unwrap();
        assert_ne!(first, second);

        let err = confirm(&storage, &scope, &first).unwrap_err();
        assert!(matches!(err, Error::LockLost { .. }));
        confirm(&storage, &scope, &second).unwrap();
    }

    #[test]
    fn test_wait_gives_up() {
        let storage = storage();
        let scope = LockScope::codename("stable");
        lock(&storage, &scope).unwrap();

        let err = wait_for_lock(&storage, &scope, 3, Duration::from_millis(1)).unwrap_err();
        assert!(matches!(err, Error::LockTimeout { attempts: 3, .. }));

        let err = acquire(&storage, &scope, 2, Duration::from_millis(1)).unwrap_err();
        assert!(matches!(err, Error::LockTimeout { .. }));
    }

    #[test]
    fn test_wait_free() {
        let storage = storage();
        let scope = LockScope::codename("stable");
        wait_for_lock(&storage, &scope, 1, Duration::from_secs(60)).unwrap();
        acquire(&storage, &scope, 1, Duration::from_secs(60)).unwrap();
        assert!(locked(&storage, &scope).unwrap());
    }
}
