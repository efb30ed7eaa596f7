use super::{TaskError, TaskHandler};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

pub type TaskFactory = Arc<dyn Fn() -> Box<dyn TaskHandler> + Send + Sync>;

/// Metadata of a registered handler.
#[derive(Debug, Clone, Serialize)]
pub struct TaskDescriptor {
    pub alias: &'static str,
    pub title: &'static str,
    pub description: &'static str,
}

/// Alias to handler factory map. Filled once at startup, read-only afterwards.
#[derive(Default, Clone)]
pub struct TaskRegistry {
    factories: HashMap<String, TaskFactory>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, factory: F) -> Result<(), TaskError>
    where
        F: Fn() -> Box<dyn TaskHandler> + Send + Sync + 'static,
    {
        let alias = factory().alias().to_string();
        if self.factories.contains_key(&alias) {
            return Err(TaskError::DuplicateAlias(alias));
        }
        debug!("Registered task handler {}", alias);
        self.factories.insert(alias, Arc::new(factory));
        Ok(())
    }

    /// A fresh handler instance for `alias`.
    pub fn instantiate(&self, alias: &str) -> Option<Box<dyn TaskHandler>> {
        self.factories.get(alias).map(|factory| factory())
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.factories.contains_key(alias)
    }

    /// Registered aliases, sorted.
    pub fn aliases(&self) -> Vec<&str> {
        let mut aliases: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        aliases.sort_unstable();
        aliases
    }

    pub fn descriptors(&self) -> Vec<TaskDescriptor> {
        self.aliases()
            .into_iter()
            .filter_map(|alias| self.instantiate(alias))
            .map(|handler| TaskDescriptor {
                alias: handler.alias(),
                title: handler.title(),
                description: handler.description(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}
