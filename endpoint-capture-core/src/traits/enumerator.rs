//! Endpoint enumerator seam.
//!
//! The platform backend (or a test double) implements direction-filtered
//! endpoint queries and default-endpoint-change notifications. Enumeration
//! for UI pick-lists lives with the host; this crate only consumes what the
//! resolver and the default-device tracker need.

use std::sync::Arc;

use crate::models::error::CaptureError;

/// Data-flow direction of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointDirection {
    Capture,
    Render,
}

/// Role an endpoint is assigned by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointRole {
    Console,
    Communications,
}

/// A resolved endpoint: platform id plus human-readable name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointInfo {
    pub id: String,
    pub name: String,
}

/// Receives default-endpoint-changed notifications.
///
/// Called from the platform's notification thread; implementations must not
/// block and must tolerate calls at any point up to unregistration.
pub trait EndpointNotificationSink: Send + Sync {
    fn default_endpoint_changed(
        &self,
        direction: EndpointDirection,
        role: EndpointRole,
        new_id: Option<&str>,
    );
}

/// Guard for a registered notification sink. Unregistration is deterministic:
/// either explicit via `unregister` or on drop. After it returns, no further
/// notification reaches the sink.
pub trait NotificationRegistration: Send {
    fn unregister(&mut self);
}

pub trait EndpointEnumerator: Send + Sync {
    /// The platform's current default endpoint for a direction/role, or
    /// `EndpointUnavailable`.
    fn default_endpoint(
        &self,
        direction: EndpointDirection,
        role: EndpointRole,
    ) -> Result<EndpointInfo, CaptureError>;

    /// Resolve an endpoint id directly, or `DeviceNotFound`.
    fn endpoint_by_id(&self, id: &str) -> Result<EndpointInfo, CaptureError>;

    /// All active endpoints of a direction.
    fn endpoints(&self, direction: EndpointDirection) -> Result<Vec<EndpointInfo>, CaptureError>;

    /// Register for default-endpoint-change notifications. Ownership of the
    /// sink is shared between the enumerator and the caller for the
    /// registration's lifetime.
    fn register_notifications(
        &self,
        sink: Arc<dyn EndpointNotificationSink>,
    ) -> Result<Box<dyn NotificationRegistration>, CaptureError>;
}
