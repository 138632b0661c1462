//! Endpoint resolution: configured identifier → live endpoint.
//!
//! Query-only; nothing is activated here.

use crate::models::error::CaptureError;
use crate::models::settings::SourceType;
use crate::traits::enumerator::{EndpointDirection, EndpointEnumerator, EndpointInfo, EndpointRole};

impl SourceType {
    /// Direction of the endpoint this source captures from.
    pub fn endpoint_direction(self) -> EndpointDirection {
        if self.is_input() {
            EndpointDirection::Capture
        } else {
            EndpointDirection::Render
        }
    }

    /// Role used when resolving (and tracking) the platform default.
    pub fn endpoint_role(self) -> EndpointRole {
        if self.is_input() {
            EndpointRole::Communications
        } else {
            EndpointRole::Console
        }
    }
}

/// Resolve the configured device for a session.
///
/// Non-default ids that fail direct resolution fall back to a lookup by the
/// previously known display name among endpoints of the matching direction,
/// adopting the first match. Endpoint ids churn across reboots and driver
/// updates; the display name usually survives. When several endpoints share
/// a name the first enumerated one wins.
pub fn resolve_endpoint(
    enumerator: &dyn EndpointEnumerator,
    is_default: bool,
    source_type: SourceType,
    device_id: &str,
    known_name: &str,
) -> Result<EndpointInfo, CaptureError> {
    if is_default {
        return enumerator.default_endpoint(source_type.endpoint_direction(), source_type.endpoint_role());
    }

    match enumerator.endpoint_by_id(device_id) {
        Ok(info) => Ok(info),
        Err(err) => {
            if known_name.is_empty() {
                return Err(err);
            }
            log::info!(
                "endpoint id '{device_id}' no longer resolves, looking up by name '{known_name}'"
            );
            let candidates = enumerator.endpoints(source_type.endpoint_direction())?;
            match candidates.into_iter().find(|e| e.name == known_name) {
                Some(info) => {
                    log::info!("adopted endpoint '{}' for name '{known_name}'", info.id);
                    Ok(info)
                }
                None => Err(CaptureError::DeviceNotFound(format!(
                    "'{device_id}' ('{known_name}')"
                ))),
            }
        }
    }
}
