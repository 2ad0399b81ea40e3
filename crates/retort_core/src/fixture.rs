//! Record factories for seeding test data.
//!
//! # Responsibility
//! - Build and persist records from default keyword data plus per-call
//!   overrides, then run post-build actions on them.
//! - Keep named factories per model, derived from one another.
//!
//! # Invariants
//! - Overrides win over defaults; defaults are never mutated by `build`.
//! - Actions run in registration order on the saved record.
//! - Factory names match `^[a-zA-Z_][a-z_]*$` and are unique per set.

use crate::db::Engine;
use crate::error::OrmResult;
use crate::model::fields::Fields;
use crate::model::record::{Model, Record};
use crate::repo::{ActiveRecord, Manager};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

static FACTORY_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z_][a-z_]*$").expect("valid factory name regex"));

/// Post-build step applied to every record a factory creates.
pub type Action<M> = Arc<dyn Fn(&mut Record<M>) -> OrmResult<()> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FactoryError {
    InvalidName(String),
    AlreadyRegistered {
        set: String,
        name: String,
        entity: String,
    },
    UnknownFactory(String),
}

impl Display for FactoryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName(name) => write!(
                f,
                "factory names must be valid identifiers (letters and underscores), got {name}"
            ),
            Self::AlreadyRegistered { set, name, entity } => write!(
                f,
                "The factory set {set} already has a factory named {name}, registered to the model {entity}"
            ),
            Self::UnknownFactory(name) => write!(f, "no factory named {name}"),
        }
    }
}

impl Error for FactoryError {}

/// Creates `M` records from defaults merged with per-call params.
pub struct Factory<M: Model> {
    defaults: Fields,
    actions: Vec<Action<M>>,
    engine: Option<Engine>,
}

impl<M: Model> Factory<M> {
    pub fn new(defaults: Fields) -> Self {
        Self {
            defaults,
            actions: Vec::new(),
            engine: None,
        }
    }

    /// Persists through `engine` instead of the registry default.
    pub fn using(mut self, engine: Engine) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Appends a post-build action.
    pub fn then(
        mut self,
        action: impl Fn(&mut Record<M>) -> OrmResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.actions.push(Arc::new(action));
        self
    }

    /// Copy of this factory whose defaults are overlaid with `params`.
    pub fn with_params(&self, params: &Fields) -> Self {
        let mut derived = self.clone();
        derived.defaults = self.defaults.clone().merged(params);
        derived
    }

    pub fn defaults(&self) -> &Fields {
        &self.defaults
    }

    /// Creates one record from the defaults overlaid with `params`, then
    /// runs every action on it.
    ///
    /// # Errors
    /// - `EngineNotSpecified` without a factory engine or registered default.
    /// - Any error raised by `create` or an action.
    pub fn build(&self, params: Fields) -> OrmResult<Record<M>> {
        let data = self.defaults.clone().merged(&params);
        let manager = match &self.engine {
            Some(engine) => Manager::<M>::new(engine.clone())?,
            None => M::objects()?,
        };
        let mut record = manager.create(data)?;
        for action in &self.actions {
            action(&mut record)?;
        }
        Ok(record)
    }
}

impl<M: Model> Clone for Factory<M> {
    fn clone(&self) -> Self {
        Self {
            defaults: self.defaults.clone(),
            actions: self.actions.clone(),
            engine: self.engine.clone(),
        }
    }
}

impl<M: Model> Debug for Factory<M> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Factory")
            .field("entity", &M::entity_name())
            .field("defaults", &self.defaults)
            .field("actions", &self.actions.len())
            .field("engine", &self.engine)
            .finish()
    }
}

/// Named factories of one model.
pub struct FactorySet<M: Model> {
    label: String,
    factories: BTreeMap<String, Factory<M>>,
    engine: Option<Engine>,
}

impl<M: Model> FactorySet<M> {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            factories: BTreeMap::new(),
            engine: None,
        }
    }

    /// Factories registered from now on persist through `engine`.
    pub fn using(mut self, engine: Engine) -> Self {
        self.engine = Some(engine);
        self
    }

    /// # Errors
    /// - `InvalidName` / `AlreadyRegistered` for a bad or taken name.
    pub fn register(&mut self, name: &str, defaults: Fields) -> Result<&Factory<M>, FactoryError> {
        self.validate_name(name)?;
        let mut factory = Factory::new(defaults);
        factory.engine = self.engine.clone();
        Ok(self.insert(name, factory))
    }

    /// Registers `name` as a copy of `original` with `defaults` overlaid.
    ///
    /// # Errors
    /// - `UnknownFactory` when `original` is not registered.
    pub fn extend(
        &mut self,
        original: &str,
        name: &str,
        defaults: &Fields,
    ) -> Result<&Factory<M>, FactoryError> {
        self.validate_name(name)?;
        let derived = self.get(original)?.with_params(defaults);
        Ok(self.insert(name, derived))
    }

    /// Replaces the factory under `name`, e.g. after adding actions.
    pub fn replace(&mut self, name: &str, factory: Factory<M>) -> Result<(), FactoryError> {
        match self.factories.get_mut(name) {
            Some(slot) => {
                *slot = factory;
                Ok(())
            }
            None => Err(FactoryError::UnknownFactory(name.to_string())),
        }
    }

    pub fn get(&self, name: &str) -> Result<&Factory<M>, FactoryError> {
        self.factories
            .get(name)
            .ok_or_else(|| FactoryError::UnknownFactory(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    fn insert(&mut self, name: &str, factory: Factory<M>) -> &Factory<M> {
        self.factories.insert(name.to_string(), factory);
        &self.factories[name]
    }

    fn validate_name(&self, name: &str) -> Result<(), FactoryError> {
        if !FACTORY_NAME_RE.is_match(name) {
            return Err(FactoryError::InvalidName(name.to_string()));
        }
        if self.factories.contains_key(name) {
            return Err(FactoryError::AlreadyRegistered {
                set: self.label.clone(),
                name: name.to_string(),
                entity: M::entity_name().to_string(),
            });
        }
        Ok(())
    }
}
