//! Job type → handler resolution

use futures::future::BoxFuture;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use crate::job::{HandlerError, JobContext, JobHandler, Payload};

/// Handlers keyed by job type name. Shared between workers and the
/// synchronous backend.
#[derive(Default)]
pub struct JobRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn JobHandler>>>,
}

impl fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRegistry")
            .field("job_types", &self.names())
            .finish()
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job type handler, replacing any previous one
    pub fn register<H: JobHandler + 'static>(&self, job_type: &str, handler: H) {
        self.register_arc(job_type, Arc::new(handler));
    }

    pub fn register_arc(&self, job_type: &str, handler: Arc<dyn JobHandler>) {
        self.handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(job_type.to_string(), handler);
    }

    /// Register a closure as handler (useful for tests and small glue jobs)
    pub fn register_fn<F>(&self, job_type: &str, f: F)
    where
        F: Fn(Payload, JobContext) -> BoxFuture<'static, Result<(), HandlerError>>
            + Send
            + Sync
            + 'static,
    {
        self.register(job_type, FnHandler { f: Box::new(f) });
    }

    pub fn resolve(&self, job_type: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(job_type)
            .cloned()
    }

    /// Registered job types, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

type HandlerFn =
    Box<dyn Fn(Payload, JobContext) -> BoxFuture<'static, Result<(), HandlerError>> + Send + Sync>;

struct FnHandler {
    f: HandlerFn,
}

impl fmt::Debug for FnHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnHandler")
    }
}

#[async_trait::async_trait]
impl JobHandler for FnHandler {
    async fn handle(&self, payload: &Payload, ctx: JobContext) -> Result<(), HandlerError> {
        (self.f)(payload.clone(), ctx).await
    }
}
