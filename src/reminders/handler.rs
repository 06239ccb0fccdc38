//! Scheduled handlers and their registry

use crate::reminders::cron::JobArgs;
use crate::reminders::ScheduleError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// A function the scheduler can invoke by name
#[async_trait]
pub trait ScheduledHandler: Send + Sync {
    async fn run(&self, args: &JobArgs) -> Result<(), ScheduleError>;
}

/// Handlers by registry name
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn ScheduledHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, handler: Arc<dyn ScheduledHandler>) -> &mut Self {
        self.handlers.insert(name.to_string(), handler);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ScheduledHandler>> {
        self.handlers.get(name).cloned()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
