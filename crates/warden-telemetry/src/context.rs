//! Request context for correlation across operations.

use uuid::Uuid;

/// A correlation context for one unit of work: a dispatch tick, an ops
/// call, an IPC request.
///
/// Creates a tracing span carrying the request id and component so log
/// lines from nested calls can be grouped back together.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Unique id for this unit of work.
    pub request_id: Uuid,
    /// The component that started it.
    pub component: String,
    /// The operation name, if set.
    pub operation: Option<String>,
}

impl RequestContext {
    /// Create a context for a component.
    #[must_use]
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            component: component.into(),
            operation: None,
        }
    }

    /// Attach an operation name.
    #[must_use]
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    /// The tracing span for this context.
    #[must_use]
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "request",
            request_id = %self.request_id,
            component = %self.component,
            operation = self.operation.as_deref().unwrap_or(""),
        )
    }
}
