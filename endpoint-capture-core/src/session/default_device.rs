//! Default-endpoint tracker.
//!
//! Registered against the platform enumerator for the session's lifetime.
//! A change of the platform default only matters when the session is bound
//! to `"default"` and the event's direction/role match the session's
//! direction; repeated notifications for the same id (including empty →
//! empty) are deduplicated. A genuine change requests a zero-backoff
//! restart; the next initialization re-resolves the default against the
//! new endpoint.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::session::source::SessionShared;
use crate::traits::enumerator::{EndpointDirection, EndpointNotificationSink, EndpointRole};

pub(crate) struct DefaultDeviceTracker {
    shared: Arc<SessionShared>,
    last_id: Mutex<Option<String>>,
}

impl DefaultDeviceTracker {
    pub(crate) fn new(shared: Arc<SessionShared>) -> Self {
        Self {
            shared,
            last_id: Mutex::new(None),
        }
    }
}

impl EndpointNotificationSink for DefaultDeviceTracker {
    fn default_endpoint_changed(
        &self,
        direction: EndpointDirection,
        role: EndpointRole,
        new_id: Option<&str>,
    ) {
        if !self.shared.is_default_device() {
            return;
        }

        let source_type = self.shared.source_type();
        if direction != source_type.endpoint_direction() || role != source_type.endpoint_role() {
            return;
        }

        {
            let mut last_id = self.last_id.lock();
            match new_id {
                Some(id) => {
                    if last_id.as_deref() == Some(id) {
                        return;
                    }
                    *last_id = Some(id.to_string());
                }
                None => {
                    if last_id.is_none() {
                        return;
                    }
                    *last_id = None;
                }
            }
        }

        log::info!(
            "default endpoint changed, restarting '{}'",
            self.shared.identity()
        );
        self.shared.request_restart();
    }
}
