use std::{io, path::StripPrefixError};

use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use serde_yaml::Error as YamlError;
use sqlx::Error as SqlxError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum FabulaError {
    #[error("Index/Cache error: {0}")]
    Cache(String),
    #[error("Invalid Command: {0}")]
    Command(String),
    #[error("Git error: {0}")]
    Git(String),
    #[error("File System error: {0}")]
    Io(String),
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("You do not have permission to access this resource")]
    PermissionDenied,
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
}

impl From<StripPrefixError> for FabulaError {
    fn from(src: StripPrefixError) -> FabulaError {
        FabulaError::NotFound(format!("Strip prefix failed for path. Error: {src}"))
    }
}

impl From<YamlError> for FabulaError {
    fn from(src: YamlError) -> FabulaError {
        FabulaError::Serialization(format!("YAML (de)serialization error: {src}"))
    }
}

impl From<JsonError> for FabulaError {
    fn from(src: JsonError) -> FabulaError {
        FabulaError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<io::Error> for FabulaError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => FabulaError::NotFound(format!("{x}")),
            io::ErrorKind::PermissionDenied => FabulaError::PermissionDenied,
            _ => FabulaError::Io(format!("IOError: {x}")),
        }
    }
}

impl From<SqlxError> for FabulaError {
    fn from(db_error: SqlxError) -> Self {
        FabulaError::Cache(format!("database error: {db_error:?}"))
    }
}

impl From<walkdir::Error> for FabulaError {
    fn from(walk_error: walkdir::Error) -> Self {
        match walk_error.io_error().map(|e| e.kind()) {
            Some(io::ErrorKind::NotFound) => FabulaError::NotFound(format!("{walk_error}")),
            Some(io::ErrorKind::PermissionDenied) => FabulaError::PermissionDenied,
            _ => FabulaError::Io(format!("Directory walk error: {walk_error}")),
        }
    }
}
