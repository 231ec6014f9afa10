//! Entity metadata used to validate field paths and resolve joins.

use crate::core::EntityConfig;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Columns and relations of one entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityMetadata {
    pub name: String,
    pub table: String,
    pub columns: HashSet<String>,
    /// Relation property name to target entity name
    pub relations: HashMap<String, String>,
}

impl EntityMetadata {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            table: name.to_string(),
            ..Self::default()
        }
    }

    pub fn column(mut self, column: &str) -> Self {
        self.columns.insert(column.to_string());
        self
    }

    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns.extend(columns.iter().map(|c| c.to_string()));
        self
    }

    pub fn relation(mut self, property: &str, target: &str) -> Self {
        self.relations.insert(property.to_string(), target.to_string());
        self
    }
}

/// All known entities, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    entities: HashMap<String, EntityMetadata>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(entities: &BTreeMap<String, EntityConfig>) -> Self {
        let mut registry = Self::new();
        for (name, config) in entities {
            let mut metadata = EntityMetadata::new(name);
            if let Some(table) = &config.table {
                metadata.table = table.clone();
            }
            metadata.columns = config.columns.iter().cloned().collect();
            metadata.relations = config
                .relations
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            registry.register(metadata);
        }
        registry
    }

    pub fn register(&mut self, metadata: EntityMetadata) {
        self.entities.insert(metadata.name.clone(), metadata);
    }

    pub fn get(&self, name: &str) -> Option<&EntityMetadata> {
        self.entities.get(name)
    }

    /// Follow `relations` from `entity`; `None` if any hop is not a relation.
    pub fn follow(&self, entity: &str, relations: &[String]) -> Option<&EntityMetadata> {
        relations.iter().try_fold(self.get(entity)?, |current, relation| {
            current
                .relations
                .get(relation)
                .and_then(|target| self.get(target))
        })
    }

    /// True when every base segment is a relation and the last one is a column.
    pub fn is_column(&self, entity: &str, path: &[String]) -> bool {
        match path.split_last() {
            Some((name, base)) => self
                .follow(entity, base)
                .map_or(false, |target| target.columns.contains(name)),
            None => false,
        }
    }

    /// True when every segment is a relation.
    pub fn is_relation(&self, entity: &str, path: &[String]) -> bool {
        !path.is_empty() && self.follow(entity, path).is_some()
    }
}
