use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

/// Mapping of entity id to its state, as returned by `GET /api/states`.
pub type EntityStates = HashMap<String, EntityState>;

/// Mapping of action id to its descriptor, as returned by `GET /api/actions`.
pub type ActionCatalog = HashMap<String, ActionDescriptor>;

/// Last observed condition of one Home Assistant entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    /// Short status string ("on", "off", a numeric reading as text, ...).
    pub state: String,

    /// Domain-specific attributes (brightness, friendly_name, unit, ...).
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,

    /// ISO 8601 timestamp of the most recent change
    #[serde(default)]
    pub last_updated: String,
}

impl EntityState {
    /// The `friendly_name` attribute, if the entity has one.
    pub fn friendly_name(&self) -> Option<&str> {
        self.attributes
            .get("friendly_name")
            .and_then(|v| v.as_str())
    }
}

/// A state change as delivered to stream subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct StateChange {
    pub entity_id: String,
    pub new_state: EntityState,
    /// `None` when the entity was not in the store before this change.
    pub old_state: Option<EntityState>,
}

/// Field accepted by a callable action.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ActionField {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub selector: Option<serde_json::Value>,
}

/// Callable action (Home Assistant service) offered by the backend.
///
/// The backend fills these leniently, so every member may be missing.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ActionDescriptor {
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub target: Option<serde_json::Value>,
    #[serde(default)]
    pub fields: HashMap<String, ActionField>,
    #[serde(default)]
    pub id: Option<String>,
}
