//! Data model
//!
//! Logical records in the per-user knowledge graph: `User`, `Memory`,
//! `Entity`, `Category`, `Community`, and the typed edges connecting them.
//! These are pure value types — nothing here talks to the graph store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a [`Memory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryState {
    Active,
    Deleted,
    Archived,
}

impl std::fmt::Display for MemoryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemoryState::Active => write!(f, "active"),
            MemoryState::Deleted => write!(f, "deleted"),
            MemoryState::Archived => write!(f, "archived"),
        }
    }
}

/// A durable text fact owned by a `User`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Memory {
    pub id: String,
    pub content: String,
    pub state: MemoryState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Logical validity start.
    pub valid_at: DateTime<Utc>,
    /// Absent means "currently valid" — never serialized as a null literal
    /// into the store (see write::addMemory).
    pub invalid_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl Memory {
    /// `state != 'deleted' AND invalidAt IS NULL`.
    pub fn is_live(&self) -> bool {
        self.state != MemoryState::Deleted && self.invalid_at.is_none()
    }
}

/// Open-ontology entity type. Known buckets have a fixed priority
/// (`PERSON > ORGANIZATION > LOCATION > PRODUCT > CONCEPT > OTHER`);
/// anything else is a domain-specific label ranked above `CONCEPT`/`OTHER`
/// (see [`EntityType::priority`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityType(pub String);

impl EntityType {
    pub const PERSON: &'static str = "PERSON";
    pub const ORGANIZATION: &'static str = "ORGANIZATION";
    pub const LOCATION: &'static str = "LOCATION";
    pub const PRODUCT: &'static str = "PRODUCT";
    pub const CONCEPT: &'static str = "CONCEPT";
    pub const OTHER: &'static str = "OTHER";

    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into().to_uppercase())
    }

    pub fn is_person(&self) -> bool {
        self.0 == Self::PERSON
    }

    /// Higher value wins a type-upgrade comparison. Known buckets get a
    /// fixed rank; any other label is treated as a more specific,
    /// domain-defined type and ranks above `CONCEPT`/`OTHER`.
    pub fn priority(&self) -> u8 {
        match self.0.as_str() {
            Self::PERSON => 6,
            Self::ORGANIZATION => 5,
            Self::LOCATION => 4,
            Self::PRODUCT => 3,
            Self::CONCEPT => 1,
            Self::OTHER => 0,
            _ => 2, // open-ontology domain label, e.g. SERVICE, DATABASE
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A person, org, location, product, concept, or open-ontology domain label.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: String,
    pub name: String,
    pub normalized_name: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description_embedding: Option<Vec<f32>>,
    /// Degree-centrality score, used to order neighbor fan-out during
    /// traversal (higher rank traversed first).
    pub rank: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity {
    /// Lowercased, whitespace-stripped form used for per-user uniqueness.
    pub fn normalize_name(name: &str) -> String {
        name.split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }
}

/// Shared classification label (global, not per-user).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub name: String,
}

impl Category {
    pub const MAX_PER_MEMORY: usize = 3;
    pub const MAX_LEN: usize = 50;
}

/// A cluster of related memories, owned by a `User`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Community {
    pub id: String,
    pub name: String,
    pub summary: String,
    pub rank: u8,
    pub findings: Vec<String>,
    pub member_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A typed, bi-temporal relationship between two entities.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedTo {
    #[serde(rename = "type")]
    pub relation_type: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub weight: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl RelatedTo {
    /// Missing `weight` on a traversed edge defaults to 0.5 (spec §4.9).
    pub const DEFAULT_WEIGHT: f32 = 0.5;

    pub fn is_live(&self) -> bool {
        self.invalid_at.is_none()
    }
}
