//! Window/process locator seam.
//!
//! Window discovery and matching is host territory; the session only needs
//! two operations: resolve configured match criteria to a concrete target,
//! and probe whether a previously resolved target is still alive.

use crate::models::error::CaptureError;
use crate::models::settings::{MatchPriority, WindowSpec};

/// A bound process-loopback target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessTarget {
    pub process_id: u32,
    /// Platform window handle when the target was matched by window.
    pub window: Option<isize>,
    /// Session token when the target was resolved through the process
    /// registry.
    pub session_token: Option<String>,
}

impl ProcessTarget {
    pub fn from_window(process_id: u32, window: isize) -> Self {
        Self {
            process_id,
            window: Some(window),
            session_token: None,
        }
    }

    pub fn from_session(process_id: u32, token: String) -> Self {
        Self {
            process_id,
            window: None,
            session_token: Some(token),
        }
    }
}

pub trait ProcessLocator: Send + Sync {
    /// Resolve match criteria to a live target, honoring the priority order
    /// when several windows match.
    fn locate(
        &self,
        spec: &WindowSpec,
        priority: MatchPriority,
    ) -> Result<ProcessTarget, CaptureError>;

    /// Whether the target is still valid. For window targets this means the
    /// window handle is still live; for session-token targets, that the
    /// token still resolves.
    fn target_alive(&self, target: &ProcessTarget) -> bool;
}
