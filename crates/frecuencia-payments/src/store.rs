//! Ledger Storage
//!
//! Every mutation runs as a closure against the ledger while the store's
//! lock is held, so concurrent webhook deliveries are applied one at a time.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};

use crate::error::{PaymentError, Result};
use crate::ledger::Ledger;

/// Ledger storage trait
pub trait LedgerStore: Send + Sync {
    /// Copy of the current ledger
    fn snapshot(&self) -> Result<Ledger>;

    /// Apply `f` to the ledger as a single serialized step.
    ///
    /// If `f` fails the ledger is left untouched.
    fn update<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Ledger) -> Result<T>;

    /// Persist whatever is held in memory
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// In-memory ledger store (for development and tests)
#[derive(Default)]
pub struct MemoryLedgerStore {
    ledger: RwLock<Ledger>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn snapshot(&self) -> Result<Ledger> {
        Ok(self
            .ledger
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn update<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Ledger) -> Result<T>,
    {
        let mut guard = self.ledger.write().unwrap_or_else(PoisonError::into_inner);
        let mut draft = guard.clone();
        let out = f(&mut draft)?;
        *guard = draft;
        Ok(out)
    }
}

/// Ledger persisted as one JSON document.
///
/// Loaded once on open. Each mutation is written to a temporary file next to
/// the target and renamed over it; memory is only updated after the write
/// succeeds.
pub struct JsonFileLedgerStore {
    path: PathBuf,
    ledger: Mutex<Ledger>,
}

impl JsonFileLedgerStore {
    /// Open the ledger at `path`, starting empty if the file does not exist
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let ledger = match std::fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => Ledger::default(),
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
                PaymentError::Storage(format!("corrupt ledger {}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ledger::default(),
            Err(e) => {
                return Err(PaymentError::Storage(format!(
                    "cannot read {}: {e}",
                    path.display()
                )));
            }
        };

        tracing::info!(
            path = %path.display(),
            records = ledger.record_count(),
            "Loaded session ledger"
        );

        Ok(Self {
            path,
            ledger: Mutex::new(ledger),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, ledger: &Ledger) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;

        let body = serde_json::to_vec_pretty(ledger)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&body)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .map_err(|e| PaymentError::Storage(format!("cannot replace ledger: {e}")))?;

        Ok(())
    }
}

impl LedgerStore for JsonFileLedgerStore {
    fn snapshot(&self) -> Result<Ledger> {
        Ok(self
            .ledger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn update<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Ledger) -> Result<T>,
    {
        let mut guard = self.ledger.lock().unwrap_or_else(PoisonError::into_inner);
        let mut draft = guard.clone();
        let out = f(&mut draft)?;

        if draft != *guard {
            self.write(&draft)?;
            *guard = draft;
        }

        Ok(out)
    }

    fn flush(&self) -> Result<()> {
        let guard = self.ledger.lock().unwrap_or_else(PoisonError::into_inner);
        self.write(&guard)?;
        tracing::info!(path = %self.path.display(), "Flushed session ledger");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::DonationRecord;
    use chrono::Utc;

    fn donation(amount: i64) -> DonationRecord {
        DonationRecord::new(amount, "eur", "anonymous", format!("cs_{amount}"), Utc::now())
    }

    #[test]
    fn test_memory_store_rolls_back_on_error() {
        let store = MemoryLedgerStore::new();
        store
            .update(|ledger| {
                ledger.donations.push(donation(100));
                Ok(())
            })
            .unwrap();

        let result: Result<()> = store.update(|ledger| {
            ledger.donations.push(donation(200));
            Err(PaymentError::Storage("boom".into()))
        });
        assert!(result.is_err());
        assert_eq!(store.snapshot().unwrap().donations.len(), 1);
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.json");

        let store = JsonFileLedgerStore::open(&path).unwrap();
        store
            .update(|ledger| {
                ledger.donations.push(donation(500));
                Ok(())
            })
            .unwrap();
        drop(store);

        let reopened = JsonFileLedgerStore::open(&path).unwrap();
        let ledger = reopened.snapshot().unwrap();
        assert_eq!(ledger.donations.len(), 1);
        assert_eq!(ledger.donations[0].amount, 500);
    }

    #[test]
    fn test_file_store_starts_empty_and_creates_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("db.json");

        let store = JsonFileLedgerStore::open(&path).unwrap();
        assert_eq!(store.snapshot().unwrap().record_count(), 0);

        store.flush().unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            JsonFileLedgerStore::open(&path),
            Err(PaymentError::Storage(_))
        ));
    }
}
