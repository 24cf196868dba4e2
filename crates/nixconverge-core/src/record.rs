//! Persisted deployment record and remote state

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use kameo_macros::Reply;
use nixconverge_nix::SystemImage;
use serde::{Deserialize, Serialize};

use crate::field::{Field, Value};

/// Recorded value of `nixos_system` when the target could not be inspected
pub const UNKNOWN_SYSTEM: &str = "unknown";

/// Computed `nixos_system` attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteState {
    /// The target runs this system
    Active(SystemImage),
    /// The target could not be inspected
    Unknown,
}

impl RemoteState {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            RemoteState::Active(image) => image.as_str(),
            RemoteState::Unknown => UNKNOWN_SYSTEM,
        }
    }

    /// Interpret a recorded attribute value
    #[must_use]
    pub fn from_recorded(value: &str) -> Self {
        if value == UNKNOWN_SYSTEM {
            RemoteState::Unknown
        } else {
            RemoteState::Active(SystemImage::new(value))
        }
    }
}

impl fmt::Display for RemoteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What persists between invocations for one deployment
///
/// The configuration itself is not persisted as such; `attributes` holds the
/// values the last successful apply saw, used to detect changes.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize, Reply)]
pub struct ResourceRecord {
    /// Assigned on first successful create, never reassigned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<Field, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ResourceRecord {
    /// Whether an identity has been assigned
    #[must_use]
    pub fn is_created(&self) -> bool {
        self.id.is_some()
    }

    #[must_use]
    pub fn attribute(&self, field: Field) -> Option<&Value> {
        self.attributes.get(&field)
    }

    pub fn set_attribute(&mut self, field: Field, value: Option<Value>) {
        match value {
            Some(v) => self.attributes.insert(field, v),
            None => self.attributes.remove(&field),
        };
    }

    /// Recorded `nixos_system`, if any
    #[must_use]
    pub fn remote_state(&self) -> Option<RemoteState> {
        self.attribute(Field::NixosSystem)
            .and_then(Value::as_str)
            .map(RemoteState::from_recorded)
    }

    pub fn set_remote_state(&mut self, state: &RemoteState) {
        self.attributes
            .insert(Field::NixosSystem, Value::from(state.as_str()));
    }
}

impl fmt::Debug for ResourceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        struct Attributes<'a>(&'a BTreeMap<Field, Value>);

        impl fmt::Debug for Attributes<'_> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let mut map = f.debug_map();
                for (field, value) in self.0 {
                    if field.is_sensitive() {
                        map.entry(&field.name(), &"<sensitive>");
                    } else {
                        map.entry(&field.name(), value);
                    }
                }
                map.finish()
            }
        }

        f.debug_struct("ResourceRecord")
            .field("id", &self.id)
            .field("attributes", &Attributes(&self.attributes))
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Fresh opaque identity for a new deployment
#[must_use]
pub fn new_identity() -> String {
    uuid::Uuid::new_v4().to_string()
}
