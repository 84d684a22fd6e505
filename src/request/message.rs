use std::fs;
use std::path::{Path, PathBuf};

use jsonschema::JSONSchema;
use log::{info, warn};
use serde_json::Value;
use thiserror::Error;

use crate::job::JobDefinition;

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("can't read {path}: {source}")]
    MessageReadError { path: PathBuf, source: std::io::Error },
    #[error("{path} is not valid JSON: {source}")]
    JSONDecodeError { path: PathBuf, source: serde_json::Error },
    #[error("{path} fails validation: {reasons}")]
    JSONValidationError { path: PathBuf, reasons: String },
    #[error("{path} can't be deserialised: {source}")]
    DeserialisationError { path: PathBuf, source: serde_json::Error },
}

/// A job manifest on disk
pub struct Message<'a> {
    pub path: PathBuf,
    pub compiled_schema: &'a JSONSchema,
}

impl Message<'_> {
    pub fn read(&self) -> Result<JobDefinition, MessageError> {
        let json: Value = self.parse_untyped_json()?;

        match self.validate(&json) {
            Ok(_) => {
                info!("Manifest {} is valid", self.path.display());
                self.parse_json(json)
            }
            Err(err) => {
                warn!("Manifest {} fails validation", self.path.display());
                Err(err)
            }
        }
    }

    fn validate(&self, json: &Value) -> Result<(), MessageError> {
        match self.compiled_schema.validate(json) {
            Ok(_) => Ok(()),
            Err(errors) => {
                let reasons: Vec<String> = errors.map(|e| e.to_string()).collect();
                Err(MessageError::JSONValidationError { path: self.path.clone(), reasons: reasons.join("; ") })
            }
        }
    }

    fn read_file(&self) -> Result<String, MessageError> {
        let path: &Path = self.path.as_path();
        info!("Reading manifest at {}", path.display());
        fs::read_to_string(path)
            .map_err(|source| MessageError::MessageReadError { path: self.path.clone(), source })
    }

    fn parse_json(&self, value: Value) -> Result<JobDefinition, MessageError> {
        // from_value is a generic function, so request JobDefinition specifically
        serde_json::from_value::<JobDefinition>(value)
            .map_err(|source| MessageError::DeserialisationError { path: self.path.clone(), source })
    }

    fn parse_untyped_json(&self) -> Result<Value, MessageError> {
        let json_string = self.read_file()?;
        serde_json::from_str::<Value>(&json_string)
            .map_err(|source| MessageError::JSONDecodeError { path: self.path.clone(), source })
    }
}
