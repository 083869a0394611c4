//! Execution backend abstraction.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

use sl_types::{BoxedHandle, JobHandle, LaunchError, OverrideSet, SlResult};

use crate::process::CommandBackend;

/// Runs override sets somewhere and hands back one handle per set.
///
/// Implementations may run jobs in-process, as local subprocesses, or on a
/// cluster scheduler. The dispatcher only relies on the returned handles.
#[async_trait]
pub trait ExecutionBackend: Send {
    type Handle: JobHandle + 'static;

    /// Short backend name used in logs and errors.
    fn name(&self) -> &str;

    /// Launch one job per override set. Job `i` of the batch gets submission
    /// index `start_index + i`. Must return exactly `overrides.len()` handles.
    async fn launch(
        &mut self,
        overrides: &[OverrideSet],
        start_index: usize,
    ) -> Result<Vec<Self::Handle>, LaunchError>;

    /// Stop accepting launches. Jobs already launched keep running.
    async fn close(&mut self) -> Result<(), LaunchError> {
        Ok(())
    }
}

#[async_trait]
impl<B: ExecutionBackend + ?Sized> ExecutionBackend for Box<B> {
    type Handle = B::Handle;

    fn name(&self) -> &str {
        (**self).name()
    }

    async fn launch(
        &mut self,
        overrides: &[OverrideSet],
        start_index: usize,
    ) -> Result<Vec<Self::Handle>, LaunchError> {
        (**self).launch(overrides, start_index).await
    }

    async fn close(&mut self) -> Result<(), LaunchError> {
        (**self).close().await
    }
}

/// Backend chosen at runtime.
pub type BoxedBackend = Box<dyn ExecutionBackend<Handle = BoxedHandle>>;

/// Adapts a concrete backend to [`BoxedBackend`] by boxing its handles.
pub struct ErasedBackend<B>(pub B);

impl<B> ErasedBackend<B>
where
    B: ExecutionBackend + 'static,
{
    pub fn boxed(backend: B) -> BoxedBackend {
        Box::new(Self(backend))
    }
}

#[async_trait]
impl<B> ExecutionBackend for ErasedBackend<B>
where
    B: ExecutionBackend + 'static,
{
    type Handle = BoxedHandle;

    fn name(&self) -> &str {
        self.0.name()
    }

    async fn launch(
        &mut self,
        overrides: &[OverrideSet],
        start_index: usize,
    ) -> Result<Vec<BoxedHandle>, LaunchError> {
        let handles = self.0.launch(overrides, start_index).await?;
        Ok(handles
            .into_iter()
            .map(|h| Box::new(h) as BoxedHandle)
            .collect())
    }

    async fn close(&mut self) -> Result<(), LaunchError> {
        self.0.close().await
    }
}

type BackendFactory = Box<dyn Fn(&Value) -> SlResult<BoxedBackend> + Send + Sync>;

/// Maps a backend tag from configuration to a constructor.
pub struct BackendRegistry {
    factories: HashMap<String, BackendFactory>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with the backends that can be built from parameters alone.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("command", |params| {
            Ok(ErasedBackend::boxed(CommandBackend::from_params(params)?))
        });
        registry
    }

    /// Register or replace the constructor for `tag`.
    pub fn register<F>(&mut self, tag: impl Into<String>, factory: F)
    where
        F: Fn(&Value) -> SlResult<BoxedBackend> + Send + Sync + 'static,
    {
        self.factories.insert(tag.into(), Box::new(factory));
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.factories.contains_key(tag)
    }

    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }

    pub fn build(&self, tag: &str, params: &Value) -> SlResult<BoxedBackend> {
        let factory = self
            .factories
            .get(tag)
            .ok_or_else(|| LaunchError::UnknownBackend {
                tag: tag.to_string(),
            })?;
        factory(params)
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("tags", &self.tags())
            .finish()
    }
}
