//! Minimal crystal structure view consumed by family lookups.

use serde::{Deserialize, Serialize};

/// One kind (site species) of a structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kind {
    /// Kind name, e.g. `Fe1`.
    pub name: String,
    /// Chemical symbol of the kind, e.g. `Fe`.
    pub symbol: String,
}

impl Kind {
    pub fn new(name: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            symbol: symbol.into(),
        }
    }
}

/// Structure described by its kinds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Structure {
    pub kinds: Vec<Kind>,
}

impl Structure {
    pub fn new(kinds: Vec<Kind>) -> Self {
        Self { kinds }
    }

    /// Returns kind symbols without duplicates, in first-seen order.
    pub fn kind_symbols(&self) -> Vec<&str> {
        let mut symbols: Vec<&str> = Vec::with_capacity(self.kinds.len());
        for kind in &self.kinds {
            if !symbols.contains(&kind.symbol.as_str()) {
                symbols.push(kind.symbol.as_str());
            }
        }
        symbols
    }
}

#[cfg(test)]
mod tests {
    use super::{Kind, Structure};

    #[test]
    fn kind_symbols_deduplicates_in_order() {
        let structure = Structure::new(vec![
            Kind::new("Fe1", "Fe"),
            Kind::new("O", "O"),
            Kind::new("Fe2", "Fe"),
        ]);
        assert_eq!(structure.kind_symbols(), vec!["Fe", "O"]);
    }

    #[test]
    fn deserializes_from_json() {
        let structure: Structure = serde_json::from_str(
            r#"{"kinds": [{"name": "Si", "symbol": "Si"}, {"name": "C1", "symbol": "C"}]}"#,
        )
        .unwrap();
        assert_eq!(structure.kind_symbols(), vec!["Si", "C"]);
    }
}
