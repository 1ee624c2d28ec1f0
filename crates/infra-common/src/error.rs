use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors from the shared logging/config layer. Narrow on purpose — each
/// crate that builds on this one defines its own domain error type and
/// converts into it via `#[from]`, not the other way around.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),
}
