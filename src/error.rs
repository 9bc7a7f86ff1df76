use thiserror::Error;

/// All faults the database can raise.
///
/// `Inconsistency` is fatal: callers must treat the database as suspect and
/// abort rather than retry (spec §7). Constraint collisions are never
/// represented here — `*_safe` operations report them as `Ok(false)` instead.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("cannot open database: {0}")]
    Open(#[source] sled::Error),

    #[error("unsupported schema version {found}, expected at most {max}")]
    UnsupportedSchemaVersion { found: u64, max: u64 },

    #[error("genesis configuration checksum mismatch")]
    ConfigChecksumMismatch,

    #[error("store error: {0}")]
    Store(#[from] sled::Error),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("inconsistent database state: {0}")]
    Inconsistency(String),
}

impl DbError {
    pub fn inconsistent(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        log::error!("database inconsistency: {msg}");
        DbError::Inconsistency(msg)
    }
}

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("buffer too short: need {need}, have {have}")]
    TooShort { need: usize, have: usize },

    #[error("trailing bytes after decode")]
    TrailingBytes,

    #[error("invalid tag byte {0:#x}")]
    InvalidTag(u8),
}

pub type DbResult<T> = Result<T, DbError>;
