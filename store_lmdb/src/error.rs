use thiserror::Error;

#[derive(Debug, Error)]
pub enum LmdbError {
    #[error("LMDB error: {0}")]
    Heed(String),

    #[error("failed to prepare data directory {path}: {reason}")]
    Directory { path: String, reason: String },
}

impl From<heed::Error> for LmdbError {
    fn from(e: heed::Error) -> Self {
        LmdbError::Heed(e.to_string())
    }
}

impl From<LmdbError> for peg_store::StoreError {
    fn from(e: LmdbError) -> Self {
        peg_store::StoreError::Backend(e.to_string())
    }
}
