//! Crate-level error: every failure a caller can see, with a machine-readable
//! kind and a human-readable message.

use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;
use crate::history::HistoryError;
use crate::store::StoreError;
use crate::translate::TranslateError;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    History(#[from] HistoryError),

    #[error(transparent)]
    Translate(#[from] TranslateError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    BusinessRule,
    Protection,
    NotFound,
    Store,
    Translate,
    Config,
}

impl HistoryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HistoryError::Validation(_) => ErrorKind::Validation,
            HistoryError::BusinessRule(_) => ErrorKind::BusinessRule,
            HistoryError::Protected { .. } => ErrorKind::Protection,
            HistoryError::NotFound(_) => ErrorKind::NotFound,
            HistoryError::Store(_) => ErrorKind::Store,
        }
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::History(e) => e.kind(),
            Error::Translate(_) => ErrorKind::Translate,
            Error::Store(_) => ErrorKind::Store,
            Error::Config(_) => ErrorKind::Config,
        }
    }
}
