//! Catalog of rule instances and rule-kind factories

use crate::rule::{Rule, RuleFactory};
use log::debug;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("rule '{0}' not found")]
    NotFound(String),

    #[error("no factory registered for rule type '{0}'")]
    UnknownKind(String),
}

/// Rules by name, factories by kind.
///
/// Both maps are ordered, so iteration is always by name. Mutation needs
/// `&mut Registry`; evaluation only ever holds `&Registry`, which keeps
/// registration and evaluation from overlapping.
#[derive(Default)]
pub struct Registry {
    rules: BTreeMap<String, Box<dyn Rule>>,
    factories: BTreeMap<String, Box<dyn RuleFactory>>,
}

impl Registry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry seeded with every built-in rule and factory
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::rules::register_builtins(&mut registry);
        registry
    }

    /// Insert a rule, replacing (and returning) any rule of the same name
    pub fn register(&mut self, rule: Box<dyn Rule>) -> Option<Box<dyn Rule>> {
        let name = rule.name().to_string();
        let previous = self.rules.insert(name.clone(), rule);
        if previous.is_some() {
            debug!("Rule '{}' replaced by a new registration", name);
        }
        previous
    }

    pub fn get(&self, name: &str) -> Option<&dyn Rule> {
        self.rules.get(name).map(|r| r.as_ref())
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut (dyn Rule + 'static)> {
        self.rules.get_mut(name).map(|r| r.as_mut())
    }

    /// Like [`get`](Self::get), but absence is an error
    pub fn require(&self, name: &str) -> Result<&dyn Rule, RegistryError> {
        self.get(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    /// Every rule, sorted by name
    pub fn all(&self) -> Vec<&dyn Rule> {
        self.rules.values().map(|r| r.as_ref()).collect()
    }

    /// Every rule name, sorted
    pub fn names(&self) -> Vec<&str> {
        self.rules.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Register a factory for a rule kind, replacing any previous one
    pub fn register_factory(&mut self, kind: &str, factory: Box<dyn RuleFactory>) {
        self.factories.insert(kind.to_string(), factory);
    }

    /// Registered factory kinds, sorted
    pub fn kinds(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Instantiate a rule of the given kind. The rule is not registered.
    pub fn create_rule(
        &self,
        kind: &str,
        name: &str,
        description: &str,
    ) -> Result<Box<dyn Rule>, RegistryError> {
        let factory = self
            .factories
            .get(kind)
            .ok_or_else(|| RegistryError::UnknownKind(kind.to_string()))?;
        Ok(factory.create(name, description))
    }
}
