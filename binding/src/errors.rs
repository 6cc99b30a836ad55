use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BindingError {
    #[error("Unknown binding attribute {0}, expected ic-src or ic-bg")]
    UnknownAttribute(String),
}
