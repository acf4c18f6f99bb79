#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("eigendecomposition failed: {reason}")]
    EigenDecomposition { reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
