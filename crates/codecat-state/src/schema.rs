//! Database row types for SurrealDB
//!
//! The `generations` table keeps the queryable columns (id, status,
//! revision, timestamps) flat, and the full record as a JSON document.
//! Conversion to and from [`Generation`] happens at the store boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StateError;
use crate::model::Generation;

/// Module for serializing chrono DateTime to SurrealDB datetime format
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// Generation row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRow {
    /// SurrealDB record ID
    pub id: Option<surrealdb::sql::Thing>,
    /// Generation id (UUID string), unique
    pub generation_id: String,
    /// Status string, see `GenerationStatus::as_str`
    pub status: String,
    pub revision: u64,
    pub cancel_requested: bool,
    /// Whether `status` is terminal; indexed for resumption scans
    pub terminal: bool,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "surreal_datetime")]
    pub updated_at: DateTime<Utc>,
    /// The full `Generation` document
    pub record: serde_json::Value,
}

impl GenerationRow {
    /// Build a row for a new record.
    pub fn from_generation(generation: &Generation) -> Result<Self, StateError> {
        Ok(GenerationRow {
            id: None,
            generation_id: generation.id.to_string(),
            status: generation.status.as_str().to_string(),
            revision: generation.revision,
            cancel_requested: generation.cancel_requested,
            terminal: generation.status.is_terminal(),
            created_at: generation.created_at,
            updated_at: generation.updated_at,
            record: serde_json::to_value(generation)?,
        })
    }

    /// Replace this row's content with `generation`, keeping the record id.
    pub fn replaced_by(&self, generation: &Generation) -> Result<Self, StateError> {
        let mut row = Self::from_generation(generation)?;
        row.id = self.id.clone();
        Ok(row)
    }

    /// Decode the stored document, with the flat columns taking precedence.
    pub fn into_generation(self) -> Result<Generation, StateError> {
        let mut generation: Generation = serde_json::from_value(self.record)?;
        generation.revision = self.revision;
        generation.cancel_requested = self.cancel_requested;
        generation.status = self.status.parse().map_err(StateError::Serialization)?;
        generation.updated_at = self.updated_at;
        Ok(generation)
    }
}
