//! Config validation: referential integrity across model documents.

use crate::config::{FieldKind, ModelConfig};
use crate::error::ConfigError;
use std::collections::{HashMap, HashSet};

pub fn validate(models: &[ModelConfig]) -> Result<(), ConfigError> {
    let mut tables = HashSet::new();
    for m in models {
        if !tables.insert(m.table.as_str()) {
            return Err(ConfigError::DuplicateTable(m.table.clone()));
        }
    }

    let columns_by_table: HashMap<&str, HashSet<&str>> = models
        .iter()
        .map(|m| (m.table.as_str(), m.fields.iter().map(|f| f.column.as_str()).collect()))
        .collect();

    for m in models {
        let own = &columns_by_table[m.table.as_str()];
        if !m.fields.iter().any(|f| f.primary_key) {
            return Err(ConfigError::MissingPrimaryKey { table: m.table.clone() });
        }
        let mut seen = HashSet::new();
        for f in &m.fields {
            if !seen.insert(f.column.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "model {}: duplicate column {}",
                    m.table, f.column
                )));
            }
            if FieldKind::from_type_name(f.type_.name()).is_none() {
                return Err(ConfigError::UnknownType {
                    column: f.column.clone(),
                    ty: f.type_.name().to_string(),
                });
            }
        }

        if let Some(sd) = &m.soft_delete {
            if !own.contains(sd.column.as_str()) {
                return Err(ConfigError::MissingReference {
                    kind: "soft delete column",
                    id: format!("{}.{}", m.table, sd.column),
                });
            }
        }

        let mut relation_names = HashSet::new();
        for r in &m.relations {
            if !relation_names.insert(r.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "model {}: duplicate relation {}",
                    m.table, r.name
                )));
            }
            let target = columns_by_table
                .get(r.table.as_str())
                .ok_or_else(|| ConfigError::MissingReference {
                    kind: "table",
                    id: r.table.clone(),
                })?;
            let (fk_owner, fk_table) = match r.kind {
                crate::config::RelationKindConfig::BelongsTo => (own, m.table.as_str()),
                _ => (target, r.table.as_str()),
            };
            if !fk_owner.contains(r.foreign_key.as_str()) {
                return Err(ConfigError::MissingReference {
                    kind: "column",
                    id: format!("{}.{}", fk_table, r.foreign_key),
                });
            }
            if let Some(references) = &r.references {
                let (ref_owner, ref_table) = match r.kind {
                    crate::config::RelationKindConfig::BelongsTo => (target, r.table.as_str()),
                    _ => (own, m.table.as_str()),
                };
                if !ref_owner.contains(references.as_str()) {
                    return Err(ConfigError::MissingReference {
                        kind: "column",
                        id: format!("{}.{}", ref_table, references),
                    });
                }
            }
        }
    }

    Ok(())
}
