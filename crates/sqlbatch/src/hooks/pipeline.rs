use sqlbatch_core::{BatchError, Metadata, Result};

use super::{HookContext, HookFailurePolicy, HookFn, HookType, Plugin};

/// Ordered set of plugins owned by one batcher.
///
/// Hooks for a point run in plugin registration order, and within a plugin
/// in the order they were added.
#[derive(Debug, Clone, Default)]
pub struct HookPipeline {
    plugins: Vec<Plugin>,
    policy: HookFailurePolicy,
}

impl HookPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(mut self, policy: HookFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> HookFailurePolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: HookFailurePolicy) {
        self.policy = policy;
    }

    /// Register a plugin. Names must be unique within the pipeline.
    pub fn register(&mut self, plugin: impl Into<Plugin>) -> Result<()> {
        let plugin = plugin.into();
        if self.plugins.iter().any(|p| p.name() == plugin.name()) {
            return Err(BatchError::Plugin(format!(
                "plugin '{}' is already registered",
                plugin.name()
            )));
        }
        tracing::debug!(plugin = %plugin.name(), "registered plugin");
        self.plugins.push(plugin);
        Ok(())
    }

    /// Remove a plugin and exactly the hooks it contributed.
    pub fn unregister(&mut self, name: &str) -> Result<Plugin> {
        let idx = self
            .plugins
            .iter()
            .position(|p| p.name() == name)
            .ok_or_else(|| BatchError::Plugin(format!("plugin '{}' is not registered", name)))?;
        tracing::debug!(plugin = %name, "unregistered plugin");
        Ok(self.plugins.remove(idx))
    }

    pub fn plugins(&self) -> &[Plugin] {
        &self.plugins
    }

    pub fn plugin_names(&self) -> Vec<&str> {
        self.plugins.iter().map(Plugin::name).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Every hook bound to `hook_type`, in firing order.
    pub fn hooks_for(&self, hook_type: HookType) -> Vec<HookFn> {
        self.plugins
            .iter()
            .flat_map(|p| p.hooks(hook_type).iter().cloned())
            .collect()
    }

    pub fn hook_count(&self, hook_type: HookType) -> usize {
        self.plugins.iter().map(|p| p.hooks(hook_type).len()).sum()
    }

    /// Fire every hook bound to `hook_type` over one shared context.
    ///
    /// Returns the statement list as the hooks left it. A failing hook never
    /// stops the remaining hooks; under [`HookFailurePolicy::AbortOnPreHook`]
    /// a failure at a pre hook is returned once all hooks have run.
    pub fn fire(
        &self,
        hook_type: HookType,
        statements: Vec<String>,
        metadata: &mut Metadata,
        error: Option<&BatchError>,
    ) -> Result<Vec<String>> {
        match self.run(hook_type, statements, metadata, error) {
            (_, Some(err)) => Err(err),
            (statements, None) => Ok(statements),
        }
    }

    /// Fire hooks whose failures can never abort a batch.
    ///
    /// Used for post hooks and ON_ERROR. Failures are logged and the
    /// statement list is always handed back.
    pub fn notify(
        &self,
        hook_type: HookType,
        statements: Vec<String>,
        metadata: &mut Metadata,
        error: Option<&BatchError>,
    ) -> Vec<String> {
        self.run(hook_type, statements, metadata, error).0
    }

    fn run(
        &self,
        hook_type: HookType,
        statements: Vec<String>,
        metadata: &mut Metadata,
        error: Option<&BatchError>,
    ) -> (Vec<String>, Option<BatchError>) {
        let mut context = HookContext::new(hook_type, statements, metadata, error);
        let mut first_failure: Option<BatchError> = None;

        for plugin in &self.plugins {
            for hook in plugin.hooks(hook_type) {
                let Err(err) = hook(&mut context) else {
                    continue;
                };

                if hook_type == HookType::OnError {
                    tracing::error!(
                        plugin = %plugin.name(),
                        hook = %hook_type,
                        error = %err,
                        "error hook failed"
                    );
                    continue;
                }

                tracing::warn!(
                    plugin = %plugin.name(),
                    hook = %hook_type,
                    error = %err,
                    "hook failed"
                );
                if self.policy == HookFailurePolicy::AbortOnPreHook
                    && hook_type.is_pre()
                    && first_failure.is_none()
                {
                    first_failure = Some(BatchError::Hook {
                        hook: hook_type.to_string(),
                        message: format!("{}: {}", plugin.name(), err),
                    });
                }
            }
        }

        (context.into_statements(), first_failure)
    }
}
