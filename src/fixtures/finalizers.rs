//! Cleanup actions run in reverse creation order

use futures::future::BoxFuture;
use std::future::Future;
use tracing::{debug, error, info};

use crate::error::Result;
use crate::k8s::ObjectHandle;

/// LIFO stack of cleanups; a failing cleanup never stops the rest
#[derive(Default)]
pub struct Finalizers {
    stack: Vec<(String, BoxFuture<'static, Result<()>>)>,
}

impl Finalizers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cleanup; it runs before everything registered earlier
    pub fn push<F>(&mut self, what: impl Into<String>, action: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        self.stack.push((what.into(), Box::pin(action)));
    }

    /// Register deletion of a cluster object, tolerating its absence
    pub fn delete(&mut self, handle: ObjectHandle) {
        let what = format!("delete {handle}");
        self.push(what, async move { handle.delete(true).await });
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Run every cleanup, newest first; returns descriptions of the failed ones
    pub async fn run(&mut self) -> Vec<String> {
        let mut failed = Vec::new();
        if !self.stack.is_empty() {
            info!("Running {} finalizers", self.stack.len());
        }

        while let Some((what, action)) = self.stack.pop() {
            debug!("Finalizer: {}", what);
            if let Err(e) = action.await {
                error!("Finalizer '{}' failed: {}", what, e);
                failed.push(format!("{what}: {e}"));
            }
        }
        failed
    }
}
