//! Process-wide registry of model schemas.
//!
//! # Responsibility
//! - Build each model's [`Schema`] once and hand out shared references.
//! - Offer an explicit reset for test isolation.
//!
//! # Invariants
//! - At most one descriptor per model type is visible at any time; racing
//!   registrations keep the first one stored.
//! - Records keep their own `Arc<Schema>`, so clearing the registry never
//!   invalidates live records.

use crate::model::record::Model;
use crate::schema::{DeclarationError, Schema};
use log::info;
use once_cell::sync::Lazy;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

static REGISTRY: Lazy<RwLock<HashMap<TypeId, Arc<Schema>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Registers `M`, returning the already stored descriptor when present.
///
/// # Errors
/// - Returns [`DeclarationError`] when `M` declares no table or an invalid one.
pub fn register<M: Model>() -> Result<Arc<Schema>, DeclarationError> {
    if let Some(schema) = lookup::<M>() {
        return Ok(schema);
    }

    let entity = M::entity_name();
    let table = M::table().ok_or_else(|| DeclarationError::MissingTable {
        entity: entity.to_string(),
    })?;
    let schema = Arc::new(Schema::build(entity, table, &M::encryption())?);

    let mut registry = REGISTRY.write().unwrap_or_else(PoisonError::into_inner);
    let stored = registry
        .entry(TypeId::of::<M>())
        .or_insert_with(|| {
            info!(
                "event=model_register module=schema status=ok entity={} table={} columns={}",
                schema.entity(),
                schema.table_name(),
                schema.columns().len()
            );
            Arc::clone(&schema)
        })
        .clone();
    Ok(stored)
}

/// Returns the descriptor of `M` if it was registered.
pub fn lookup<M: Model>() -> Option<Arc<Schema>> {
    REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&TypeId::of::<M>())
        .cloned()
}

/// Returns the descriptor of `M`, registering it on first use.
pub fn resolve<M: Model>() -> Result<Arc<Schema>, DeclarationError> {
    match lookup::<M>() {
        Some(schema) => Ok(schema),
        None => register::<M>(),
    }
}

/// Number of registered model types.
pub fn registered_count() -> usize {
    REGISTRY.read().unwrap_or_else(PoisonError::into_inner).len()
}

/// Drops every registered descriptor.
pub fn clear() {
    REGISTRY
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .clear();
}

/// Drops the descriptor of `M` only.
pub fn unregister<M: Model>() -> bool {
    REGISTRY
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(&TypeId::of::<M>())
        .is_some()
}

#[cfg(test)]
mod tests {
    use super::{lookup, register, resolve, unregister};
    use crate::model::record::Model;
    use crate::model::table::{Column, ColumnType, Table};
    use crate::schema::DeclarationError;
    use std::sync::Arc;

    struct RegistryProbe;

    impl Model for RegistryProbe {
        fn table() -> Option<Table> {
            Some(
                Table::new("registry_sample")
                    .column(Column::primary_key("id"))
                    .column(Column::new("label", ColumnType::Text)),
            )
        }
    }

    struct Tableless;

    impl Model for Tableless {}

    #[test]
    fn register_is_idempotent_and_lookup_is_total_afterwards() {
        let first = register::<RegistryProbe>().unwrap();
        let second = register::<RegistryProbe>().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(lookup::<RegistryProbe>().is_some());
        assert_eq!(first.entity(), "RegistryProbe");
    }

    #[test]
    fn unregister_then_resolve_builds_a_fresh_descriptor() {
        struct Scratch;
        impl Model for Scratch {
            fn table() -> Option<Table> {
                Some(Table::new("scratch").column(Column::primary_key("id")))
            }
        }

        let before = resolve::<Scratch>().unwrap();
        assert!(unregister::<Scratch>());
        assert!(lookup::<Scratch>().is_none());
        let after = resolve::<Scratch>().unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn models_without_table_fail_registration() {
        let err = register::<Tableless>().unwrap_err();
        assert!(matches!(err, DeclarationError::MissingTable { .. }));
        assert!(err.to_string().contains("Tableless"));
        assert!(lookup::<Tableless>().is_none());
    }
}
