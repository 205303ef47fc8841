use std::sync::Arc;

use http::{HeaderMap, StatusCode};

use crate::{FileConcat, IntentType, MetadataMap, Outcome, ResourceId, TusResponse};

/// Passed to `on_authorize` before anything else runs for an operation
#[derive(Debug)]
pub struct AuthorizeContext<'a> {
    pub intent: IntentType,
    /// Set for concatenation requests
    pub file_concatenation: Option<&'a FileConcat>,
    pub file_id: Option<&'a ResourceId>,
    pub headers: &'a HeaderMap,
    pub response: &'a mut TusResponse,
}

impl AuthorizeContext<'_> {
    /// Reject the request with `status` and stop processing
    pub fn fail_request(&mut self, status: StatusCode, message: impl Into<String>) -> Outcome {
        self.response.error(status, message);
        Outcome::StopExecution
    }
}

/// Passed to `on_before_create` once the creation headers validated
#[derive(Debug)]
pub struct BeforeCreateContext<'a> {
    pub metadata: &'a MetadataMap,
    pub upload_length: Option<u64>,
    pub file_concatenation: Option<&'a FileConcat>,
    pub response: &'a mut TusResponse,
}

impl BeforeCreateContext<'_> {
    pub fn fail_request(&mut self, status: StatusCode, message: impl Into<String>) -> Outcome {
        self.response.error(status, message);
        Outcome::StopExecution
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CreateCompleteContext<'a> {
    pub file_id: &'a ResourceId,
    pub upload_length: Option<u64>,
    pub file_concatenation: Option<&'a FileConcat>,
}

#[derive(Debug, Clone, Copy)]
pub struct FileCompleteContext<'a> {
    pub file_id: &'a ResourceId,
}

#[derive(Debug, Clone, Copy)]
pub struct DeleteCompleteContext<'a> {
    pub file_id: &'a ResourceId,
}

pub type AuthorizeHook = Arc<dyn Fn(&mut AuthorizeContext<'_>) -> Outcome + Send + Sync>;
pub type BeforeCreateHook = Arc<dyn Fn(&mut BeforeCreateContext<'_>) -> Outcome + Send + Sync>;
pub type CreateCompleteHook = Arc<dyn Fn(&CreateCompleteContext<'_>) + Send + Sync>;
pub type FileCompleteHook = Arc<dyn Fn(&FileCompleteContext<'_>) + Send + Sync>;
pub type DeleteCompleteHook = Arc<dyn Fn(&DeleteCompleteContext<'_>) + Send + Sync>;

/// Application callbacks invoked by the engine
#[derive(Clone, Default)]
pub struct TusEvents {
    pub on_authorize: Option<AuthorizeHook>,
    pub on_before_create: Option<BeforeCreateHook>,
    pub on_create_complete: Option<CreateCompleteHook>,
    pub on_file_complete: Option<FileCompleteHook>,
    pub on_delete_complete: Option<DeleteCompleteHook>,
}

impl std::fmt::Debug for TusEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TusEvents")
            .field("on_authorize", &self.on_authorize.is_some())
            .field("on_before_create", &self.on_before_create.is_some())
            .field("on_create_complete", &self.on_create_complete.is_some())
            .field("on_file_complete", &self.on_file_complete.is_some())
            .field("on_delete_complete", &self.on_delete_complete.is_some())
            .finish()
    }
}

impl TusEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_on_authorize<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut AuthorizeContext<'_>) -> Outcome + Send + Sync + 'static,
    {
        self.on_authorize = Some(Arc::new(hook));
        self
    }

    pub fn with_on_before_create<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut BeforeCreateContext<'_>) -> Outcome + Send + Sync + 'static,
    {
        self.on_before_create = Some(Arc::new(hook));
        self
    }

    pub fn with_on_create_complete<F>(mut self, hook: F) -> Self
    where
        F: Fn(&CreateCompleteContext<'_>) + Send + Sync + 'static,
    {
        self.on_create_complete = Some(Arc::new(hook));
        self
    }

    pub fn with_on_file_complete<F>(mut self, hook: F) -> Self
    where
        F: Fn(&FileCompleteContext<'_>) + Send + Sync + 'static,
    {
        self.on_file_complete = Some(Arc::new(hook));
        self
    }

    pub fn with_on_delete_complete<F>(mut self, hook: F) -> Self
    where
        F: Fn(&DeleteCompleteContext<'_>) + Send + Sync + 'static,
    {
        self.on_delete_complete = Some(Arc::new(hook));
        self
    }

    pub(crate) fn authorize(&self, ctx: &mut AuthorizeContext<'_>) -> Outcome {
        match &self.on_authorize {
            Some(hook) => hook(ctx),
            None => Outcome::ContinueExecution,
        }
    }

    pub(crate) fn before_create(&self, ctx: &mut BeforeCreateContext<'_>) -> Outcome {
        match &self.on_before_create {
            Some(hook) => hook(ctx),
            None => Outcome::ContinueExecution,
        }
    }

    pub(crate) fn create_complete(&self, ctx: &CreateCompleteContext<'_>) {
        if let Some(hook) = &self.on_create_complete {
            hook(ctx);
        }
    }

    pub(crate) fn file_complete(&self, ctx: &FileCompleteContext<'_>) {
        if let Some(hook) = &self.on_file_complete {
            hook(ctx);
        }
    }

    pub(crate) fn delete_complete(&self, ctx: &DeleteCompleteContext<'_>) {
        if let Some(hook) = &self.on_delete_complete {
            hook(ctx);
        }
    }
}
