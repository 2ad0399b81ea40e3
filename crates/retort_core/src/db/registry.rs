//! Process-wide named engine registry.
//!
//! # Responsibility
//! - Keep engines reachable by key so model types can resolve a manager
//!   without an explicit handle (`M::objects()`).
//!
//! # Invariants
//! - The default engine lives under [`DEFAULT_ENGINE_KEY`].
//! - Registration order is kept; the first registered engine is the
//!   fallback when no default is set.

use super::{DbResult, Engine};
use log::info;
use once_cell::sync::Lazy;
use std::sync::{PoisonError, RwLock};

/// Registry key of the default engine.
pub const DEFAULT_ENGINE_KEY: &str = "__default__";

static ENGINES: Lazy<RwLock<Vec<(String, Engine)>>> = Lazy::new(|| RwLock::new(Vec::new()));

/// Stores `engine` under `key`, returning the engine it replaced.
pub fn register_engine(key: &str, engine: Engine) -> Option<Engine> {
    let mut engines = ENGINES.write().unwrap_or_else(PoisonError::into_inner);
    info!(
        "event=engine_register module=db key={} uri={}",
        key,
        engine.uri()
    );
    match engines.iter_mut().find(|(existing, _)| existing == key) {
        Some((_, slot)) => Some(std::mem::replace(slot, engine)),
        None => {
            engines.push((key.to_string(), engine));
            None
        }
    }
}

pub fn engine(key: &str) -> Option<Engine> {
    ENGINES
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .find(|(existing, _)| existing == key)
        .map(|(_, engine)| engine.clone())
}

pub fn set_default_engine(engine: Engine) -> Option<Engine> {
    register_engine(DEFAULT_ENGINE_KEY, engine)
}

/// The default engine, else the first registered one.
pub fn default_engine() -> Option<Engine> {
    engine(DEFAULT_ENGINE_KEY).or_else(first_available_engine)
}

pub fn first_available_engine() -> Option<Engine> {
    ENGINES
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .first()
        .map(|(_, engine)| engine.clone())
}

/// Returns the engine registered under `uri` or `key`, creating one from
/// `uri` when neither exists. The result is stored under `key` (defaults
/// to `uri`).
pub fn get_or_create_engine(uri: &str, key: Option<&str>) -> DbResult<Engine> {
    let key = key.unwrap_or(uri);
    let existing = engine(uri).or_else(|| engine(key));
    let engine = match existing {
        Some(engine) => engine,
        None => Engine::from_uri(uri)?,
    };
    register_engine(key, engine.clone());
    Ok(engine)
}

/// Drops every registered engine.
pub fn clear_engines() {
    ENGINES
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .clear();
}

pub fn registered_engine_count() -> usize {
    ENGINES.read().unwrap_or_else(PoisonError::into_inner).len()
}
