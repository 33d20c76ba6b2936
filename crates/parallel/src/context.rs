//! Caller-side context of a dispatch.

use commerce_core::{Namespace, RequestSnapshot};

/// Who is dispatching, and for which tenant.
///
/// Without an explicit namespace, a dispatch fans out over every namespace
/// the collection store knows about.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchContext {
    pub namespace: Option<Namespace>,
    /// Diagnostic runs use one record per batch.
    pub test_mode: bool,
    /// Request-scoped values restored on the executing side.
    pub request: RequestSnapshot,
}

impl DispatchContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict the dispatch to one namespace.
    pub fn for_namespace(namespace: Namespace) -> Self {
        Self {
            namespace: Some(namespace),
            ..Self::default()
        }
    }

    pub fn with_namespace(mut self, namespace: Namespace) -> Self {
        self.namespace = Some(namespace);
        self
    }

    pub fn with_test_mode(mut self, test_mode: bool) -> Self {
        self.test_mode = test_mode;
        self
    }

    pub fn with_request(mut self, request: RequestSnapshot) -> Self {
        self.request = request;
        self
    }
}
