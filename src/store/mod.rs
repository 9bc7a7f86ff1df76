//! Connection & statement cache (spec §4.1) — opens the underlying store,
//! runs schema creation/migration, and owns the single outer write
//! transaction's lifecycle.

pub mod param;
pub mod transaction;

use std::sync::Mutex;

use crate::config::Config;
use crate::error::{DbError, DbResult};
use crate::store::param::{param_get, param_int_get_def, param_int_set, ParamId};
pub use crate::store::transaction::Transaction;

/// Current schema version this crate knows how to read and write.
/// Mirrors `NodeDB::CreateTables##` / `MigrateFromNN` versioning (spec §4.11).
pub const CURRENT_SCHEMA_VERSION: u64 = 31;

/// Callback invoked after a transaction commits with at least one changed
/// row (spec §4.1 "notify-modified hook").
pub type ModifiedHook = Box<dyn Fn() + Send + Sync>;

pub struct Store {
    pub(crate) db: sled::Db,
    hook: Mutex<Option<ModifiedHook>>,
    pub(crate) config: Config,
}

impl Store {
    /// Opens the database, creating it if absent, and runs schema
    /// migration if an older version is found (spec §4.11).
    pub fn open(config: Config) -> DbResult<Self> {
        let db = sled::Config::new()
            .path(&config.path)
            .open()
            .map_err(DbError::Open)?;

        let store = Store {
            db,
            hook: Mutex::new(None),
            config,
        };

        store.ensure_schema()?;
        store.check_cfg_checksum()?;
        Ok(store)
    }

    /// Opens a database entirely in memory (used by tests and scratch
    /// scenarios — mirrors sled's own `temporary(true)` mode).
    pub fn open_temporary() -> DbResult<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(DbError::Open)?;
        let store = Store {
            db,
            hook: Mutex::new(None),
            config: Config::new("<memory>"),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    pub fn set_modified_hook(&self, hook: ModifiedHook) {
        *self.hook.lock().expect("hook mutex poisoned") = Some(hook);
    }

    pub(crate) fn notify_modified(&self) {
        if let Some(hook) = self.hook.lock().expect("hook mutex poisoned").as_ref() {
            hook();
        }
    }

    /// Starts the single outer write transaction (spec §4.1).
    pub fn begin(&self) -> Transaction<'_> {
        Transaction::new(self)
    }

    fn ensure_schema(&self) -> DbResult<()> {
        let mut tx = self.begin();
        let version = param_int_get_def(&tx, ParamId::DbVer, 0)?;
        if version == 0 {
            log::info!("initializing fresh schema at version {CURRENT_SCHEMA_VERSION}");
            param_int_set(&mut tx, ParamId::DbVer, CURRENT_SCHEMA_VERSION)?;
            tx.commit()?;
            return Ok(());
        }
        if version > CURRENT_SCHEMA_VERSION {
            return Err(DbError::UnsupportedSchemaVersion { found: version, max: CURRENT_SCHEMA_VERSION });
        }
        if version < CURRENT_SCHEMA_VERSION {
            log::info!("migrating schema from version {version} to {CURRENT_SCHEMA_VERSION}");
            crate::maintenance::migrate(&mut tx, version)?;
            param_int_set(&mut tx, ParamId::DbVer, CURRENT_SCHEMA_VERSION)?;
            tx.commit()?;
        }
        Ok(())
    }

    fn check_cfg_checksum(&self) -> DbResult<()> {
        let Some(expected) = self.config.cfg_checksum else {
            return Ok(());
        };
        let tx = self.begin();
        let (_, blob) = param_get(&tx, ParamId::CfgChecksum)?;
        match blob {
            None => {
                drop(tx);
                let mut tx = self.begin();
                param::param_set(&mut tx, ParamId::CfgChecksum, None, Some(&expected))?;
                tx.commit()
            }
            Some(found) if found == expected => Ok(()),
            Some(_) => Err(DbError::ConfigChecksumMismatch),
        }
    }

    pub fn check_integrity(&self) -> DbResult<()> {
        // sled checksums every page on read and returns `sled::Error::Corruption`
        // the moment it finds a bad one; walking every key forces exactly that
        // check across the whole tree, mirroring `NodeDB::CheckIntegrity`'s
        // delegation to the engine's own self-check.
        for entry in self.db.iter() {
            entry.map_err(DbError::Store)?;
        }
        Ok(())
    }

    pub fn vacuum(&self) -> DbResult<()> {
        // sled reclaims space incrementally; a flush is the closest
        // equivalent action callers can force (spec §4.11 `Vacuum`).
        self.db.flush().map_err(DbError::Store)?;
        Ok(())
    }

    pub fn size_on_disk(&self) -> DbResult<u64> {
        self.db.size_on_disk().map_err(DbError::Store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_fresh_initializes_schema_version() {
        let store = Store::open_temporary().unwrap();
        let tx = store.begin();
        assert_eq!(param_int_get_def(&tx, ParamId::DbVer, 0).unwrap(), CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn modified_hook_fires_only_on_nonempty_commit() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let store = Store::open_temporary().unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        store.set_modified_hook(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));

        let tx = store.begin();
        tx.commit().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        let mut tx = store.begin();
        param_int_set(&mut tx, ParamId::MyId, 1).unwrap();
        tx.commit().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_without_commit_rolls_back() {
        let store = Store::open_temporary().unwrap();
        {
            let mut tx = store.begin();
            param_int_set(&mut tx, ParamId::MyId, 99).unwrap();
            // dropped, not committed
        }
        let tx = store.begin();
        assert_eq!(param_int_get_def(&tx, ParamId::MyId, 0).unwrap(), 0);
    }
}
