use crate::layers::style::Style;
use serde::{Deserialize, Serialize};

/// Identifier of a layer, stable within its owning map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayerId(pub u32);

impl std::fmt::Display for LayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "layer#{}", self.0)
    }
}

/// Data binding of a layer, by logical name.
///
/// Bindings are resolved through the context registries when the
/// rendering collaborator asks for draw data, so a persisted map never
/// embeds live store handles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerSource {
    /// A feature class inside a named data store.
    Features { store: String, class: String },
    /// A named remote tile source.
    Tiles { source: String },
}

/// A named, ordered entry in a map.
///
/// Binds a data source to a style and a visibility flag. A layer never
/// outlives its map; callers address it by [`LayerId`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub id: LayerId,
    pub name: String,
    pub source: LayerSource,
    pub style: Style,
    pub visible: bool,
}

impl Layer {
    pub(crate) fn new(id: LayerId, name: impl Into<String>, source: LayerSource) -> Self {
        Self {
            id,
            name: name.into(),
            source,
            style: Style::new(),
            visible: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_source_serde_round_trip() {
        let source = LayerSource::Features {
            store: "store".to_string(),
            class: "points".to_string(),
        };
        let json = serde_json::to_string(&source).unwrap();
        let back: LayerSource = serde_json::from_str(&json).unwrap();
        assert_eq!(back, source);

        let tiles = LayerSource::Tiles {
            source: "osm".to_string(),
        };
        let json = serde_json::to_string(&tiles).unwrap();
        assert!(json.contains("\"type\":\"tiles\""));
    }
}
