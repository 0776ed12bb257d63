//! Macro actions

use indexmap::IndexMap;
use nom_config::ActionConfig;

/// Actions by id, plus the ones bound to an event
#[derive(Debug, Clone, Default)]
pub struct ActionTable {
    by_id: IndexMap<String, Vec<String>>,
    triggered: Vec<ActionConfig>,
}

impl ActionTable {
    pub fn from_config(actions: &[ActionConfig]) -> Self {
        let mut table = Self::default();
        for action in actions {
            if let Some(id) = &action.id {
                table.by_id.insert(id.clone(), action.commands.to_vec());
            }
            if action.event.is_some() {
                table.triggered.push(action.clone());
            }
        }
        table
    }

    /// Commands of an action
    pub fn get(&self, id: &str) -> Option<&[String]> {
        self.by_id.get(id).map(Vec::as_slice)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.by_id.keys().map(String::as_str)
    }

    /// Actions with an `event`
    pub fn triggered(&self) -> &[ActionConfig] {
        &self.triggered
    }
}
