//! Configuration surface consumed from the external settings store.
//!
//! The store itself is opaque to this crate; these types are its in-memory
//! image. Window matches travel as a single encoded string
//! (`"title:class:executable"`, colons escaped as `#3A`); a leading `{`
//! marks an opaque session token instead.

use serde::{Deserialize, Serialize};

/// Identifier meaning "track the platform default endpoint".
pub const DEFAULT_DEVICE_ID: &str = "default";

/// Reserved identifier: the session constructs successfully but stays
/// permanently idle. Used by validation and test doubles.
pub const NO_DEVICE_ID: &str = "does_not_exist";

/// What kind of endpoint a session captures from. Immutable for the
/// session's life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// A physical capture endpoint (microphone, line-in).
    Input,
    /// The mixed output of a render endpoint (device loopback).
    DeviceOutput,
    /// The mixed output of a single process tree (application loopback).
    ProcessOutput,
}

impl SourceType {
    pub fn is_input(self) -> bool {
        matches!(self, Self::Input)
    }

    /// Non-input sources capture through a loopback interface.
    pub fn is_loopback(self) -> bool {
        !self.is_input()
    }
}

/// Which window-match criterion wins when several windows match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPriority {
    Title,
    Class,
    Executable,
}

/// Structured window match criteria.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WindowSpec {
    pub window_class: String,
    pub title: String,
    pub executable: String,
}

/// A parsed window/process match descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchDescriptor {
    /// No target configured.
    None,
    /// Match a window by class/title/executable.
    Window(WindowSpec),
    /// An opaque session token resolved through the process registry.
    Session(String),
}

impl MatchDescriptor {
    /// Decode the settings-store window string.
    pub fn parse(window: &str) -> Self {
        if window.is_empty() {
            return Self::None;
        }
        if window.starts_with('{') {
            return Self::Session(window.to_string());
        }
        let mut parts = window.splitn(3, ':');
        let title = unescape(parts.next().unwrap_or(""));
        let window_class = unescape(parts.next().unwrap_or(""));
        let executable = unescape(parts.next().unwrap_or(""));
        Self::Window(WindowSpec {
            window_class,
            title,
            executable,
        })
    }

    /// Re-encode to the settings-store string form.
    pub fn encode(&self) -> String {
        match self {
            Self::None => String::new(),
            Self::Session(token) => token.clone(),
            Self::Window(spec) => format!(
                "{}:{}:{}",
                escape(&spec.title),
                escape(&spec.window_class),
                escape(&spec.executable)
            ),
        }
    }
}

fn escape(value: &str) -> String {
    value.replace(':', "#3A")
}

fn unescape(value: &str) -> String {
    value.replace("#3A", ":")
}

/// Per-session settings as read from the external store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSettings {
    pub device_id: String,
    pub use_device_timing: bool,
    /// Encoded window match string; empty for device sources.
    pub window: String,
    pub priority: MatchPriority,
}

impl SourceSettings {
    /// Store defaults for a freshly created source of the given type.
    pub fn defaults_for(source_type: SourceType) -> Self {
        match source_type {
            SourceType::Input => Self {
                device_id: DEFAULT_DEVICE_ID.into(),
                use_device_timing: false,
                window: String::new(),
                priority: MatchPriority::Executable,
            },
            SourceType::DeviceOutput => Self {
                device_id: DEFAULT_DEVICE_ID.into(),
                use_device_timing: true,
                window: String::new(),
                priority: MatchPriority::Executable,
            },
            SourceType::ProcessOutput => Self {
                device_id: String::new(),
                use_device_timing: true,
                window: String::new(),
                priority: MatchPriority::Executable,
            },
        }
    }

    pub fn is_default_device(&self) -> bool {
        self.device_id.eq_ignore_ascii_case(DEFAULT_DEVICE_ID)
    }

    pub fn is_no_device(&self) -> bool {
        self.device_id == NO_DEVICE_ID
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_window_parses_to_none() {
        assert_eq!(MatchDescriptor::parse(""), MatchDescriptor::None);
    }

    #[test]
    fn brace_prefix_is_a_session_token() {
        let d = MatchDescriptor::parse("{b6e95e...}");
        assert_eq!(d, MatchDescriptor::Session("{b6e95e...}".into()));
        assert_eq!(d.encode(), "{b6e95e...}");
    }

    #[test]
    fn window_string_round_trips() {
        let d = MatchDescriptor::parse("My Song - Player:PlayerWnd:player.exe");
        let MatchDescriptor::Window(spec) = &d else {
            panic!("expected window descriptor");
        };
        assert_eq!(spec.title, "My Song - Player");
        assert_eq!(spec.window_class, "PlayerWnd");
        assert_eq!(spec.executable, "player.exe");
        assert_eq!(d.encode(), "My Song - Player:PlayerWnd:player.exe");
    }

    #[test]
    fn escaped_colons_survive_the_codec() {
        let spec = WindowSpec {
            window_class: "Chrome_WidgetWin_1".into(),
            title: "track 12:30".into(),
            executable: "chrome.exe".into(),
        };
        let encoded = MatchDescriptor::Window(spec.clone()).encode();
        assert_eq!(encoded, "track 12#3A30:Chrome_WidgetWin_1:chrome.exe");
        assert_eq!(MatchDescriptor::parse(&encoded), MatchDescriptor::Window(spec));
    }

    #[test]
    fn defaults_match_source_type() {
        let input = SourceSettings::defaults_for(SourceType::Input);
        assert!(input.is_default_device());
        assert!(!input.use_device_timing);

        let output = SourceSettings::defaults_for(SourceType::DeviceOutput);
        assert!(output.is_default_device());
        assert!(output.use_device_timing);

        let process = SourceSettings::defaults_for(SourceType::ProcessOutput);
        assert!(process.device_id.is_empty());
        assert!(process.use_device_timing);
        assert_eq!(process.priority, MatchPriority::Executable);
    }

    #[test]
    fn default_id_is_case_insensitive() {
        let mut s = SourceSettings::defaults_for(SourceType::Input);
        s.device_id = "Default".into();
        assert!(s.is_default_device());
        s.device_id = NO_DEVICE_ID.into();
        assert!(!s.is_default_device());
        assert!(s.is_no_device());
    }
}
