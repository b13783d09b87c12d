//! Device fingerprinting capability.

use std::sync::OnceLock;

use uuid::Uuid;

/// Produces the visitor id attached to auth requests.
///
/// Host applications with a real fingerprinting provider implement this; the
/// default [`GeneratedVisitorId`] issues one random id per process.
pub trait VisitorIdSource: Send + Sync {
    fn visitor_id(&self) -> String;
}

/// Process-lifetime random visitor id.
#[derive(Debug, Default)]
pub struct GeneratedVisitorId {
    id: OnceLock<String>,
}

impl GeneratedVisitorId {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VisitorIdSource for GeneratedVisitorId {
    fn visitor_id(&self) -> String {
        self.id.get_or_init(|| Uuid::new_v4().to_string()).clone()
    }
}
