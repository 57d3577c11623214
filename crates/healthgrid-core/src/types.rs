//! Domain types shared by the aggregator and its collaborators.
//!
//! Keys are plain value types so they can be used directly as map keys.
//! Everything here is serializable to/from JSON so events can be replayed
//! from files or forwarded to an event bus unchanged.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Identifier of an application (e.g. `/prod/web`).
pub type AppId = String;

/// Version of an application deployment.
pub type Version = String;

/// Identifier of a running instance.
pub type InstanceId = String;

// ── Keys ──────────────────────────────────────────────────────────

/// One versioned deployment of an application.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApplicationKey {
    pub app_id: AppId,
    pub version: Version,
}

impl ApplicationKey {
    pub fn new(app_id: impl Into<AppId>, version: impl Into<Version>) -> Self {
        Self {
            app_id: app_id.into(),
            version: version.into(),
        }
    }

    /// Key of `instance_id` running this application version.
    pub fn instance(&self, instance_id: impl Into<InstanceId>) -> InstanceKey {
        InstanceKey {
            app: self.clone(),
            instance_id: instance_id.into(),
        }
    }
}

impl fmt::Display for ApplicationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.app_id, self.version)
    }
}

/// One running instance of one application version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceKey {
    pub app: ApplicationKey,
    pub instance_id: InstanceId,
}

impl InstanceKey {
    pub fn new(app: ApplicationKey, instance_id: impl Into<InstanceId>) -> Self {
        Self {
            app,
            instance_id: instance_id.into(),
        }
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.app, self.instance_id)
    }
}

// ── Health check definition ───────────────────────────────────────

/// Probe protocol of a health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    Http,
    Https,
    Tcp,
    Command,
}

/// A configured health check for an application.
///
/// Checks are compared by value over every field, so two definitions with
/// the same settings are the same check. Deserialized checks are normalized
/// per protocol so they compare equal to the matching constructor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RawHealthCheck")]
pub struct HealthCheck {
    pub protocol: Protocol,
    /// HTTP path to probe (http/https only).
    pub path: Option<String>,
    /// Index into the instance's port list.
    pub port_index: Option<u32>,
    /// Shell command to run (command protocol only).
    pub command: Option<String>,
    /// Failures are ignored for this long after the instance starts.
    pub grace_period_seconds: u64,
    pub interval_seconds: u64,
    pub timeout_seconds: u64,
    /// Consecutive failures before the instance is killed; 0 disables.
    pub max_consecutive_failures: u32,
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self {
            protocol: Protocol::Http,
            path: Some("/".to_string()),
            port_index: Some(0),
            command: None,
            grace_period_seconds: 300,
            interval_seconds: 60,
            timeout_seconds: 20,
            max_consecutive_failures: 3,
        }
    }
}

/// Wire form of [`HealthCheck`]; every field is optional.
#[derive(Deserialize)]
struct RawHealthCheck {
    #[serde(default = "default_protocol")]
    protocol: Protocol,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    port_index: Option<u32>,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    grace_period_seconds: Option<u64>,
    #[serde(default)]
    interval_seconds: Option<u64>,
    #[serde(default)]
    timeout_seconds: Option<u64>,
    #[serde(default)]
    max_consecutive_failures: Option<u32>,
}

fn default_protocol() -> Protocol {
    Protocol::Http
}

impl From<RawHealthCheck> for HealthCheck {
    fn from(raw: RawHealthCheck) -> Self {
        let defaults = HealthCheck::default();
        HealthCheck {
            protocol: raw.protocol,
            path: raw.path,
            port_index: raw.port_index,
            command: raw.command,
            grace_period_seconds: raw
                .grace_period_seconds
                .unwrap_or(defaults.grace_period_seconds),
            interval_seconds: raw.interval_seconds.unwrap_or(defaults.interval_seconds),
            timeout_seconds: raw.timeout_seconds.unwrap_or(defaults.timeout_seconds),
            max_consecutive_failures: raw
                .max_consecutive_failures
                .unwrap_or(defaults.max_consecutive_failures),
        }
        .normalized()
    }
}

impl HealthCheck {
    /// Fill or clear the target fields so only those the protocol uses are set.
    ///
    /// http/https default to path `/` on port 0, tcp to port 0, and command
    /// checks carry only the command.
    pub fn normalized(mut self) -> Self {
        match self.protocol {
            Protocol::Http | Protocol::Https => {
                self.path.get_or_insert_with(|| "/".to_string());
                self.port_index.get_or_insert(0);
                self.command = None;
            }
            Protocol::Tcp => {
                self.path = None;
                self.port_index.get_or_insert(0);
                self.command = None;
            }
            Protocol::Command => {
                self.path = None;
                self.port_index = None;
                self.command.get_or_insert_with(String::new);
            }
        }
        self
    }

    /// An HTTP check against `path` on the first port.
    pub fn http(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// A TCP connect check against the port at `port_index`.
    pub fn tcp(port_index: u32) -> Self {
        Self {
            protocol: Protocol::Tcp,
            path: None,
            port_index: Some(port_index),
            ..Self::default()
        }
    }

    /// A check that runs `command` inside the instance.
    pub fn command(command: impl Into<String>) -> Self {
        Self {
            protocol: Protocol::Command,
            path: None,
            port_index: None,
            command: Some(command.into()),
            ..Self::default()
        }
    }
}

impl fmt::Display for HealthCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.protocol {
            Protocol::Http | Protocol::Https => {
                let scheme = if self.protocol == Protocol::Http { "http" } else { "https" };
                write!(
                    f,
                    "{scheme}:{}{}",
                    self.port_index.unwrap_or(0),
                    self.path.as_deref().unwrap_or("/")
                )
            }
            Protocol::Tcp => write!(f, "tcp:{}", self.port_index.unwrap_or(0)),
            Protocol::Command => {
                write!(f, "command:{}", self.command.as_deref().unwrap_or_default())
            }
        }
    }
}

// ── Results ───────────────────────────────────────────────────────

/// Outcome of one probe execution against one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResult {
    pub instance_id: InstanceId,
    pub alive: bool,
    /// Probe output, if the executor captured any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl HealthResult {
    pub fn healthy(instance_id: impl Into<InstanceId>) -> Self {
        Self {
            instance_id: instance_id.into(),
            alive: true,
            detail: None,
        }
    }

    pub fn unhealthy(instance_id: impl Into<InstanceId>, detail: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            alive: false,
            detail: Some(detail.into()),
        }
    }
}

/// Aggregate health of an instance across all of its checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GlobalHealth {
    Healthy,
    Unhealthy,
    Unknown,
}

impl GlobalHealth {
    /// `Some(true)`/`Some(false)` for a decided state, `None` for unknown.
    pub fn as_option(self) -> Option<bool> {
        match self {
            Self::Healthy => Some(true),
            Self::Unhealthy => Some(false),
            Self::Unknown => None,
        }
    }
}

impl From<Option<bool>> for GlobalHealth {
    fn from(value: Option<bool>) -> Self {
        match value {
            Some(true) => Self::Healthy,
            Some(false) => Self::Unhealthy,
            None => Self::Unknown,
        }
    }
}

impl From<GlobalHealth> for Option<bool> {
    fn from(value: GlobalHealth) -> Self {
        value.as_option()
    }
}

impl fmt::Display for GlobalHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
            Self::Unknown => "unknown",
        })
    }
}

// ── Events ────────────────────────────────────────────────────────

/// Inbound messages handled by the health aggregator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HealthEvent {
    AddHealthCheck {
        app: ApplicationKey,
        check: HealthCheck,
    },
    RemoveHealthCheck {
        app: ApplicationKey,
        check: HealthCheck,
    },
    PurgeHealthCheckStatuses {
        statuses: Vec<(InstanceKey, HealthCheck)>,
    },
    HealthCheckStatusChanged {
        app: ApplicationKey,
        check: HealthCheck,
        result: HealthResult,
    },
}

impl HealthEvent {
    /// Short name for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AddHealthCheck { .. } => "add_health_check",
            Self::RemoveHealthCheck { .. } => "remove_health_check",
            Self::PurgeHealthCheckStatuses { .. } => "purge_health_check_statuses",
            Self::HealthCheckStatusChanged { .. } => "health_check_status_changed",
        }
    }
}

pub const INSTANCE_HEALTH_CHANGED_EVENT: &str = "instance_health_changed_event";

/// Published whenever an instance's global health changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceHealthChanged {
    pub event_type: String,
    pub instance_id: InstanceId,
    pub version: Version,
    pub app_id: AppId,
    pub healthiness: GlobalHealth,
    /// Unix timestamp (seconds) when the transition was computed.
    pub timestamp: u64,
}

impl InstanceHealthChanged {
    pub fn new(app: &ApplicationKey, instance_id: &str, healthiness: GlobalHealth) -> Self {
        Self {
            event_type: INSTANCE_HEALTH_CHANGED_EVENT.to_string(),
            instance_id: instance_id.to_string(),
            version: app.version.clone(),
            app_id: app.app_id.clone(),
            healthiness,
            timestamp: epoch_secs(),
        }
    }

    /// Key of the application version this event belongs to.
    pub fn app_key(&self) -> ApplicationKey {
        ApplicationKey::new(self.app_id.clone(), self.version.clone())
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_compare_by_value() {
        let a = ApplicationKey::new("/web", "v1");
        let b = ApplicationKey::new("/web".to_string(), "v1".to_string());
        assert_eq!(a, b);
        assert_eq!(a.instance("i1"), InstanceKey::new(b, "i1"));
        assert_ne!(a.instance("i1"), ApplicationKey::new("/web", "v2").instance("i1"));
    }

    #[test]
    fn display_formats() {
        let key = ApplicationKey::new("/web", "v1").instance("i1");
        assert_eq!(key.to_string(), "/web@v1/i1");
        assert_eq!(HealthCheck::http("/healthz").to_string(), "http:0/healthz");
        assert_eq!(HealthCheck::tcp(2).to_string(), "tcp:2");
        assert_eq!(HealthCheck::command("true").to_string(), "command:true");
    }

    #[test]
    fn checks_with_different_settings_are_distinct() {
        let a = HealthCheck::http("/healthz");
        let mut b = HealthCheck::http("/healthz");
        assert_eq!(a, b);
        b.interval_seconds = 5;
        assert_ne!(a, b);
    }

    #[test]
    fn json_checks_equal_constructed_checks() {
        let cases = [
            (r#"{"protocol":"tcp","port_index":0}"#, HealthCheck::tcp(0)),
            (r#"{"protocol":"tcp"}"#, HealthCheck::tcp(0)),
            (r#"{"protocol":"http","path":"/healthz"}"#, HealthCheck::http("/healthz")),
            (r#"{}"#, HealthCheck::default()),
            (
                r#"{"protocol":"command","command":"exit 0","path":"/ignored"}"#,
                HealthCheck::command("exit 0"),
            ),
        ];
        for (json, expected) in cases {
            let parsed: HealthCheck = serde_json::from_str(json).unwrap();
            assert_eq!(parsed, expected, "{json}");
        }
    }

    #[test]
    fn checks_roundtrip_through_json() {
        for check in [
            HealthCheck::tcp(3),
            HealthCheck::http("/ready"),
            HealthCheck::command("true"),
        ] {
            let json = serde_json::to_string(&check).unwrap();
            assert_eq!(serde_json::from_str::<HealthCheck>(&json).unwrap(), check);
        }
    }

    #[test]
    fn global_health_option_conversion() {
        assert_eq!(GlobalHealth::Healthy.as_option(), Some(true));
        assert_eq!(GlobalHealth::Unhealthy.as_option(), Some(false));
        assert_eq!(GlobalHealth::Unknown.as_option(), None);
        for value in [Some(true), Some(false), None] {
            let health = GlobalHealth::from(value);
            assert_eq!(Option::<bool>::from(health), value);
        }
    }

    #[test]
    fn health_event_parses_from_tagged_json() {
        let json = r#"{
            "type": "health_check_status_changed",
            "app": {"app_id": "/web", "version": "v1"},
            "check": {"protocol": "tcp", "port_index": 1},
            "result": {"instance_id": "i1", "alive": true}
        }"#;
        let event: HealthEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.kind(), "health_check_status_changed");
        match event {
            HealthEvent::HealthCheckStatusChanged { app, check, result } => {
                assert_eq!(app, ApplicationKey::new("/web", "v1"));
                assert_eq!(check.protocol, Protocol::Tcp);
                assert_eq!(check.port_index, Some(1));
                // Unspecified fields fall back to defaults.
                assert_eq!(check.interval_seconds, 60);
                assert!(result.alive);
                assert_eq!(result.detail, None);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn instance_health_changed_carries_app_fields() {
        let app = ApplicationKey::new("/web", "v1");
        let event = InstanceHealthChanged::new(&app, "i1", GlobalHealth::Unhealthy);
        assert_eq!(event.event_type, INSTANCE_HEALTH_CHANGED_EVENT);
        assert_eq!(event.app_key(), app);
        assert_eq!(event.instance_id, "i1");

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["healthiness"], "unhealthy");
        assert_eq!(json["app_id"], "/web");
    }
}
