use sqlbatch_core::{BatchError, Metadata};

use super::HookType;

/// State shared by every hook of one firing.
///
/// Mutation is the extension mechanism: replacing or editing the statement
/// list changes what later hooks see and what the batcher goes on to merge
/// or execute. Metadata writes persist for the rest of the flush.
#[derive(Debug)]
pub struct HookContext<'a> {
    hook_type: HookType,
    statements: Vec<String>,
    metadata: &'a mut Metadata,
    error: Option<&'a BatchError>,
}

impl<'a> HookContext<'a> {
    pub fn new(
        hook_type: HookType,
        statements: Vec<String>,
        metadata: &'a mut Metadata,
        error: Option<&'a BatchError>,
    ) -> Self {
        Self {
            hook_type,
            statements,
            metadata,
            error,
        }
    }

    pub fn hook_type(&self) -> HookType {
        self.hook_type
    }

    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    pub fn statements_mut(&mut self) -> &mut Vec<String> {
        &mut self.statements
    }

    /// Replace every statement with `f(statement)`.
    pub fn rewrite<F>(&mut self, f: F)
    where
        F: Fn(&str) -> String,
    {
        for statement in &mut self.statements {
            *statement = f(statement);
        }
    }

    pub fn metadata(&self) -> &Metadata {
        self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        self.metadata
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.metadata.insert(key.into(), value.into());
    }

    /// The error that triggered an `OnError` firing.
    pub fn error(&self) -> Option<&BatchError> {
        self.error
    }

    pub(crate) fn into_statements(self) -> Vec<String> {
        self.statements
    }
}
