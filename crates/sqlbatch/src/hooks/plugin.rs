use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::{HookContext, HookFn, HookType};

/// A named bundle of hooks.
///
/// # Example
///
/// ```
/// use sqlbatch::{HookType, Plugin};
///
/// let plugin = Plugin::new("uppercase").with_hook(HookType::PreExecute, |ctx| {
///     ctx.rewrite(|sql| sql.to_uppercase());
///     Ok(())
/// });
///
/// assert_eq!(plugin.hooks(HookType::PreExecute).len(), 1);
/// ```
#[derive(Clone)]
pub struct Plugin {
    name: String,
    hooks: BTreeMap<HookType, Vec<HookFn>>,
}

impl Plugin {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hooks: BTreeMap::new(),
        }
    }

    pub fn with_hook<F>(mut self, hook_type: HookType, hook: F) -> Self
    where
        F: Fn(&mut HookContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.add_hook(hook_type, hook);
        self
    }

    pub fn add_hook<F>(&mut self, hook_type: HookType, hook: F)
    where
        F: Fn(&mut HookContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.hooks.entry(hook_type).or_default().push(Arc::new(hook));
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Hooks bound to `hook_type`, in the order they were added.
    pub fn hooks(&self, hook_type: HookType) -> &[HookFn] {
        self.hooks.get(&hook_type).map_or(&[], Vec::as_slice)
    }

    /// Remove the hooks for one point, or all of them with `None`.
    pub fn clear_hooks(&mut self, hook_type: Option<HookType>) {
        match hook_type {
            Some(hook_type) => {
                self.hooks.remove(&hook_type);
            }
            None => self.hooks.clear(),
        }
    }

    /// Hook points this plugin contributes to.
    pub fn hook_types(&self) -> impl Iterator<Item = HookType> + '_ {
        self.hooks
            .iter()
            .filter(|(_, hooks)| !hooks.is_empty())
            .map(|(hook_type, _)| *hook_type)
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: BTreeMap<HookType, usize> = self
            .hooks
            .iter()
            .map(|(hook_type, hooks)| (*hook_type, hooks.len()))
            .collect();
        f.debug_struct("Plugin")
            .field("name", &self.name)
            .field("hooks", &counts)
            .finish()
    }
}
