use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("{0}")]
    Peg(#[from] peg_types::PegError),

    #[error("store error: {0}")]
    Store(#[from] peg_store::StoreError),

    #[error("lmdb error: {0}")]
    Lmdb(#[from] peg_store_lmdb::LmdbError),

    #[error("config error: {0}")]
    Config(String),

    #[error("logging already initialised: {0}")]
    Logging(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
