//! Name to handler lookup.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::command::CommandHandler;

/// Case-insensitive table of command handlers, fixed once the executor runs.
pub struct CommandRegistry<H> {
    handlers: BTreeMap<String, Arc<dyn CommandHandler<H>>>,
}

impl<H> CommandRegistry<H> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }

    /// Adds a handler, replacing any previous handler with the same name.
    pub fn register<C>(&mut self, handler: C)
    where
        C: CommandHandler<H> + 'static,
    {
        self.handlers
            .insert(normalise(handler.name()), Arc::new(handler));
    }

    /// Builder form of [`CommandRegistry::register`].
    #[must_use]
    pub fn with<C>(mut self, handler: C) -> Self
    where
        C: CommandHandler<H> + 'static,
    {
        self.register(handler);
        self
    }

    /// Finds the handler for `name`, ignoring ASCII case and surrounding
    /// whitespace.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&Arc<dyn CommandHandler<H>>> {
        self.handlers.get(&normalise(name))
    }

    /// Registered command names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<H> Default for CommandRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

fn normalise(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}
