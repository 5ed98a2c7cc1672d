//! Per-model configuration.
//!
//! A [`ModelConfig`] is built once per entity type and shared, immutably, by
//! the model and every entity it creates. It can be assembled in code with
//! [`ModelConfig::builder`] or loaded from JSON with [`ModelConfig::from_json`].
//!
//! # Example
//!
//! ```ignore
//! use docmodel::config::{ModelConfig, RetryPolicy};
//!
//! let config = ModelConfig::builder("jedi")
//!     .soft_delete(true)
//!     .retry(RetryPolicy::default().max_attempts(3))
//!     .build()?;
//!
//! let same = ModelConfig::from_json(r#"{ "collection": "jedi", "soft_delete": true, "retry": { "max_attempts": 3 } }"#)?;
//! ```

use bson::{Bson, Uuid, oid::ObjectId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{
    backend::WriteConcern,
    error::{DocumentStoreError, DocumentStoreResult},
    path::FieldPath,
};

/// Stored names of the bookkeeping timestamp fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimestampFields {
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: String,
}

impl Default for TimestampFields {
    fn default() -> Self {
        Self {
            created_at: "created_at".to_string(),
            updated_at: "updated_at".to_string(),
            deleted_at: "deleted_at".to_string(),
        }
    }
}

/// How identifiers are generated for entities inserted without one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdGeneration {
    #[default]
    ObjectId,
    Uuid,
}

impl IdGeneration {
    pub fn generate(&self) -> Bson {
        match self {
            IdGeneration::ObjectId => Bson::ObjectId(ObjectId::new()),
            IdGeneration::Uuid => Bson::from(Uuid::new()),
        }
    }
}

/// Exponential delay between attempts: `initial_ms * 2^(attempt - 1)`, capped at `max_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backoff {
    pub initial_ms: u64,
    pub max_ms: u64,
}

impl Backoff {
    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
        Duration::from_millis(self.initial_ms.saturating_mul(factor).min(self.max_ms))
    }
}

/// Attempt ceiling and failure policy shared by every write of a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts per write, including the first one.
    pub max_attempts: u32,
    /// Delay between attempts. `None` retries immediately.
    pub backoff: Option<Backoff>,
    /// Return the last store error instead of `Ok(false)` once attempts run out.
    pub raise_on_exhausted: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff: None,
            raise_on_exhausted: false,
        }
    }
}

impl RetryPolicy {
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn backoff(mut self, initial_ms: u64, max_ms: u64) -> Self {
        self.backoff = Some(Backoff { initial_ms, max_ms });
        self
    }

    pub fn raise_on_exhausted(mut self, raise: bool) -> Self {
        self.raise_on_exhausted = raise;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub collection: String,
    /// Maintain the created/updated timestamps on every save.
    pub timestamps: bool,
    /// `delete()` marks documents instead of removing them.
    pub soft_delete: bool,
    pub fields: TimestampFields,
    pub write_concern: WriteConcern,
    pub retry: RetryPolicy,
    pub id_generation: IdGeneration,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            collection: String::new(),
            timestamps: true,
            soft_delete: false,
            fields: TimestampFields::default(),
            write_concern: WriteConcern::default(),
            retry: RetryPolicy::default(),
            id_generation: IdGeneration::default(),
        }
    }
}

impl ModelConfig {
    pub fn builder(collection: impl Into<String>) -> ModelConfigBuilder {
        ModelConfigBuilder::new(collection)
    }

    /// Parses and validates a configuration from JSON. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` for malformed JSON and `InvalidArgument` for an
    /// invalid configuration (see [`ModelConfig::validate`]).
    pub fn from_json(json: &str) -> DocumentStoreResult<Self> {
        let config: ModelConfig = serde_json::from_str(json)?;
        config.validate()?;

        Ok(config)
    }

    /// Checks the collection name, timestamp field names and attempt ceiling.
    pub fn validate(&self) -> DocumentStoreResult<()> {
        if self.collection.trim().is_empty() {
            return Err(DocumentStoreError::InvalidArgument(
                "collection name must not be empty".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(DocumentStoreError::InvalidArgument(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }

        let names = [
            &self.fields.created_at,
            &self.fields.updated_at,
            &self.fields.deleted_at,
        ];
        for name in names {
            if name == "_id" {
                return Err(DocumentStoreError::InvalidArgument(
                    "timestamp fields must not use the identifier field".to_string(),
                ));
            }
            FieldPath::parse(name)?;
        }
        if names[0] == names[1] || names[0] == names[2] || names[1] == names[2] {
            return Err(DocumentStoreError::InvalidArgument(
                "timestamp field names must be distinct".to_string(),
            ));
        }

        Ok(())
    }
}

/// Fluent builder for [`ModelConfig`].
#[derive(Debug, Clone)]
pub struct ModelConfigBuilder {
    config: ModelConfig,
}

impl ModelConfigBuilder {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            config: ModelConfig {
                collection: collection.into(),
                ..ModelConfig::default()
            },
        }
    }

    pub fn timestamps(mut self, enabled: bool) -> Self {
        self.config.timestamps = enabled;
        self
    }

    pub fn soft_delete(mut self, enabled: bool) -> Self {
        self.config.soft_delete = enabled;
        self
    }

    pub fn fields(mut self, fields: TimestampFields) -> Self {
        self.config.fields = fields;
        self
    }

    pub fn write_concern(mut self, write_concern: WriteConcern) -> Self {
        self.config.write_concern = write_concern;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    pub fn id_generation(mut self, id_generation: IdGeneration) -> Self {
        self.config.id_generation = id_generation;
        self
    }

    /// Validates and returns the configuration.
    pub fn build(self) -> DocumentStoreResult<ModelConfig> {
        self.config.validate()?;

        Ok(self.config)
    }
}
