//! RAII admission permit.

use std::fmt;
use std::sync::Arc;

use crate::admission::controller::Shared;

/// A granted permit that returns itself to the pool when dropped.
///
/// Record the call's result with [`succeeded`](Self::succeeded) or
/// [`failed`](Self::failed); dropping without either releases the permit
/// but leaves the breaker untouched.
#[must_use = "dropping the permit releases it immediately"]
pub struct AdmissionPermit {
    shared: Arc<Shared>,
    resource_id: String,
}

impl AdmissionPermit {
    pub(crate) fn new(shared: Arc<Shared>, resource_id: &str) -> Self {
        Self {
            shared,
            resource_id: resource_id.to_string(),
        }
    }

    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    /// Record a successful call, then release.
    pub fn succeeded(self) {
        self.shared.record_outcome(&self.resource_id, true);
    }

    /// Record a failed call, then release.
    pub fn failed(self) {
        self.shared.record_outcome(&self.resource_id, false);
    }
}

impl fmt::Debug for AdmissionPermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionPermit")
            .field("resource_id", &self.resource_id)
            .finish()
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        // Errors are logged and counted inside `release`.
        let _ = self.shared.release(&self.resource_id);
    }
}
