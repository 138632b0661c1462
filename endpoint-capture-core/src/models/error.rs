use thiserror::Error;

/// Errors raised while acquiring or draining a capture interface.
///
/// Every variant except `ResourceCreationFailed` is recoverable: the session
/// logs it, tears the client/capture pair down and schedules a reconnect.
/// `ResourceCreationFailed` aborts session construction entirely.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("no default endpoint available: {0}")]
    EndpointUnavailable(String),

    #[error("device not found: {0}")]
    DeviceNotFound(String),

    #[error("audio client initialization failed: {0}")]
    ClientInitFailed(String),

    #[error("process loopback activation failed: {0}")]
    ActivationFailed(String),

    #[error("capture start failed: {0}")]
    CaptureStartFailed(String),

    #[error("process loopback capture is not supported on this platform")]
    UnsupportedPlatform,

    #[error("device invalidated")]
    DeviceInvalidated,

    #[error("target window gone")]
    TargetWindowGone,

    #[error("resource creation failed: {0}")]
    ResourceCreationFailed(String),
}

impl CaptureError {
    /// Whether this error aborts session construction instead of scheduling
    /// a reconnect.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ResourceCreationFailed(_))
    }

    pub fn is_device_invalidated(&self) -> bool {
        matches!(self, Self::DeviceInvalidated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_resource_creation_is_fatal() {
        assert!(CaptureError::ResourceCreationFailed("event".into()).is_fatal());
        assert!(!CaptureError::EndpointUnavailable("x".into()).is_fatal());
        assert!(!CaptureError::DeviceInvalidated.is_fatal());
        assert!(!CaptureError::TargetWindowGone.is_fatal());
    }
}
