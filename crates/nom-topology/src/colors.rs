//! Named colors

use std::collections::HashMap;

use nom_config::{ColorConfig, ConfigError};
use nom_core::Rgb;

/// Color names resolved to RGB
#[derive(Debug, Clone, Default)]
pub struct ColorTable {
    colors: HashMap<String, Rgb>,
}

impl ColorTable {
    /// Build the table, following alias chains
    pub fn from_config(colors: &[ColorConfig]) -> Result<Self, ConfigError> {
        let by_id: HashMap<&str, &ColorConfig> = colors.iter().map(|c| (c.id.as_str(), c)).collect();
        let mut resolved = HashMap::new();
        let mut errors = Vec::new();

        for color in colors {
            let mut seen = vec![color.id.as_str()];
            let mut current = color;
            loop {
                if let Some(rgb) = current.rgb {
                    resolved.insert(color.id.clone(), rgb);
                    break;
                }
                if let Some(rgb) = current.hex.as_deref().and_then(Rgb::from_hex) {
                    resolved.insert(color.id.clone(), rgb);
                    break;
                }
                let Some(alias) = current.color.as_deref() else {
                    break;
                };
                if seen.contains(&alias) {
                    errors.push(ConfigError::CyclicColor(color.id.clone()));
                    break;
                }
                let Some(&next) = by_id.get(alias) else {
                    errors.push(ConfigError::UnknownReference {
                        kind: "color",
                        id: color.id.clone(),
                        target_kind: "color",
                        target: alias.to_string(),
                    });
                    break;
                };
                seen.push(alias);
                current = next;
            }
        }

        ConfigError::from_list(errors)?;
        Ok(Self { colors: resolved })
    }

    /// A color name, `#rrggbb`, `rrggbb` or `(r,g,b)`
    pub fn lookup(&self, token: &str) -> Option<Rgb> {
        self.colors
            .get(token)
            .copied()
            .or_else(|| Rgb::from_hex(token))
            .or_else(|| Rgb::from_literal(token))
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}
