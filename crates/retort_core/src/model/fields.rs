//! Keyword-style input mappings for construction and filtering.
//!
//! A [`Fields`] value is the ordered `name -> input` mapping passed to record
//! construction, `set_many`, and filter compilation. Inputs may be deferred:
//! a lazy input is invoked with no arguments right before it is used.

use crate::model::value::Value;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// One input value, either ready or produced on demand.
#[derive(Clone)]
pub enum Input {
    Ready(Value),
    Lazy(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl Input {
    pub fn lazy(producer: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        Self::Lazy(Arc::new(producer))
    }

    /// Resolves the input, invoking a lazy producer.
    pub fn resolve(&self) -> Value {
        match self {
            Self::Ready(value) => value.clone(),
            Self::Lazy(producer) => producer(),
        }
    }
}

impl Debug for Input {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            Self::Lazy(_) => f.write_str("Lazy(..)"),
        }
    }
}

impl<T: Into<Value>> From<T> for Input {
    fn from(value: T) -> Self {
        Self::Ready(value.into())
    }
}

/// Ordered field-name to input mapping.
///
/// Setting an existing name replaces its input in place.
#[derive(Debug, Clone, Default)]
pub struct Fields {
    entries: Vec<(String, Input)>,
}

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Fields::insert`].
    pub fn with(mut self, name: impl Into<String>, input: impl Into<Input>) -> Self {
        self.insert(name, input);
        self
    }

    /// Builder form for deferred inputs.
    pub fn with_lazy(
        mut self,
        name: impl Into<String>,
        producer: impl Fn() -> Value + Send + Sync + 'static,
    ) -> Self {
        self.insert(name, Input::lazy(producer));
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, input: impl Into<Input>) {
        let name = name.into();
        let input = input.into();
        match self.entries.iter_mut().find(|(key, _)| *key == name) {
            Some(entry) => entry.1 = input,
            None => self.entries.push((name, input)),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Input> {
        let index = self.entries.iter().position(|(key, _)| key == name)?;
        Some(self.entries.remove(index).1)
    }

    pub fn get(&self, name: &str) -> Option<&Input> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, input)| input)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Field names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Input)> {
        self.entries.iter().map(|(key, input)| (key.as_str(), input))
    }

    /// Overlays `other` on top of `self`.
    pub fn merged(mut self, other: &Fields) -> Self {
        for (name, input) in other.iter() {
            self.insert(name, input.clone());
        }
        self
    }
}

impl IntoIterator for Fields {
    type Item = (String, Input);
    type IntoIter = std::vec::IntoIter<(String, Input)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<K: Into<String>, V: Into<Input>> FromIterator<(K, V)> for Fields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut fields = Self::new();
        for (name, input) in iter {
            fields.insert(name, input);
        }
        fields
    }
}

/// Builds [`Fields`] from `name => value` pairs.
///
/// ```
/// let data = retort_core::fields! { "name" => "Gabriel", "age" => "25" };
/// assert_eq!(data.len(), 2);
/// ```
#[macro_export]
macro_rules! fields {
    () => {
        $crate::Fields::new()
    };
    ($($name:expr => $value:expr),+ $(,)?) => {{
        let mut fields = $crate::Fields::new();
        $(fields.insert($name, $value);)+
        fields
    }};
}
