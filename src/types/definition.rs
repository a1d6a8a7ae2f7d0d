//! Declarative structure-definition configuration.
//!
//! This is the raw JSON shape supplied by callers when registering a
//! definition for a contract:
//!
//! ```json
//! {
//!   "initSeq": {
//!     "agreement": { "min": 0, "len": "getNumberOfAgreements" },
//!     "party":     { "len": "getNumberOfParties", "dependent": "agreement" }
//!   },
//!   "tables": {
//!     "agreements": { "call": "getAgreementData" },
//!     "parties":    { "call": "getPartyData", "keys": ["agreement", "party"] }
//!   },
//!   "events": { "LogAgreementUpdate": "update" }
//! }
//! ```
//!
//! Call specs accept three shorthands: a bare function name, an object with
//! `call` (and optional `field`), or a literal constant. Normalization into
//! the validated model happens in `cache::normalize`.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value as JsonValue;

/// A call spec as written in configuration. Untagged so that the shorthand
/// forms deserialize naturally; anything that is not a string or a call/constant
/// object is treated as a literal constant.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CallSpecConfig {
    Name(String),
    Spec {
        call: String,
        #[serde(default)]
        field: Option<String>,
    },
    Constant {
        constant: JsonValue,
    },
    Literal(JsonValue),
}

/// One key column's derivation recipe.
#[derive(Debug, Clone, Deserialize)]
pub struct KeySpecConfig {
    #[serde(default)]
    pub min: Option<CallSpecConfig>,
    #[serde(default)]
    pub len: Option<CallSpecConfig>,
    #[serde(default)]
    pub deserialize: Option<CallSpecConfig>,
    #[serde(default)]
    pub dependent: Option<String>,
}

/// One table entry: the row-accessor call and the keys it requires.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TableSpecConfig {
    Name(String),
    Spec {
        call: String,
        #[serde(default)]
        keys: Option<Vec<String>>,
    },
}

/// Role an event plays in keeping the cache current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventRole {
    Update,
    Remove,
}

/// Top-level structure definition as deserialized from JSON.
///
/// `BTreeMap` keeps table iteration order deterministic, which in turn keeps
/// backfill order and table contents reproducible.
#[derive(Debug, Clone, Deserialize)]
pub struct DefinitionConfig {
    #[serde(rename = "initSeq")]
    pub init_seq: BTreeMap<String, KeySpecConfig>,
    pub tables: BTreeMap<String, TableSpecConfig>,
    /// Explicit event-role wiring. When absent, roles are derived from the
    /// interface's event names (names containing "update" or "remove").
    #[serde(default)]
    pub events: Option<BTreeMap<String, EventRole>>,
}

impl DefinitionConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
