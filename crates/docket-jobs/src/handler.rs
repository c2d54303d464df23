//! Typed registry of job handlers, keyed by method name.

use crate::error::{HandlerError, JobQueueError};
use crate::job::JobArgs;
use async_trait::async_trait;
use parking_lot::RwLock;
use regex::Regex;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, OnceLock};

/// Work performed for one job method.
///
/// Closures `Fn(JobArgs) -> impl Future<Output = Result<(), HandlerError>>`
/// implement this directly.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn call(&self, args: JobArgs) -> Result<(), HandlerError>;
}

#[async_trait]
impl<F, Fut> JobHandler for F
where
    F: Fn(JobArgs) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    async fn call(&self, args: JobArgs) -> Result<(), HandlerError> {
        self(args).await
    }
}

fn method_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_.-]*$").expect("method-name regex must compile")
    })
}

/// Check that `name` can form part of a job filename.
pub fn validate_method_name(name: &str) -> Result<(), JobQueueError> {
    if !method_name_re().is_match(name) {
        return Err(JobQueueError::InvalidMethodName {
            name: name.to_string(),
            reason: "expected a letter or underscore followed by [A-Za-z0-9_.-]".to_string(),
        });
    }
    Ok(())
}

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<BTreeMap<String, Arc<dyn JobHandler>>>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.handlers.read().keys()).finish()
    }
}

impl HandlerRegistry {
    /// Register or replace the handler for `method_name`.
    pub fn register(
        &self,
        method_name: impl Into<String>,
        handler: impl JobHandler + 'static,
    ) -> Result<(), JobQueueError> {
        let method_name = method_name.into();
        validate_method_name(&method_name)?;
        self.handlers.write().insert(method_name, Arc::new(handler));
        Ok(())
    }

    pub fn get(&self, method_name: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.read().get(method_name).cloned()
    }

    pub fn contains(&self, method_name: &str) -> bool {
        self.handlers.read().contains_key(method_name)
    }

    pub fn method_names(&self) -> Vec<String> {
        self.handlers.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn method_names_must_be_filename_safe() {
        for good in ["sendEmail", "resize_image", "_private", "v2.cleanup-old"] {
            validate_method_name(good).unwrap_or_else(|e| panic!("{good} rejected: {e}"));
        }
        for bad in ["", "9lives", "has space", "a/b", "x%y"] {
            assert!(validate_method_name(bad).is_err(), "{bad:?} accepted");
        }
    }

    async fn require_non_negative(args: JobArgs) -> Result<(), HandlerError> {
        let n = args.arg(0).and_then(|v| v.as_i64()).ok_or("missing n")?;
        if n < 0 {
            return Err("negative".into());
        }
        Ok(())
    }

    #[tokio::test]
    async fn async_fns_register_as_handlers() {
        let registry = HandlerRegistry::default();
        registry
            .register("check", require_non_negative)
            .expect("handler should register");

        let handler = registry.get("check").expect("handler registered");
        handler
            .call(JobArgs::Positional(vec![json!(2)]))
            .await
            .expect("positive input succeeds");
        let err = handler
            .call(JobArgs::Positional(vec![json!(-1)]))
            .await
            .expect_err("negative input fails");
        assert_eq!(err.to_string(), "negative");
        assert!(registry.contains("check"));
        assert!(registry.get("other").is_none());
        assert_eq!(registry.method_names(), vec!["check".to_string()]);
    }

    #[test]
    fn invalid_names_are_not_registered() {
        let registry = HandlerRegistry::default();
        let err = registry
            .register("bad name", require_non_negative)
            .expect_err("invalid name");
        assert!(matches!(err, JobQueueError::InvalidMethodName { .. }));
        assert!(registry.method_names().is_empty());
    }
}
