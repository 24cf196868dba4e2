//! Attribute surface of a deployment

use std::fmt;

use serde::{Deserialize, Serialize};

/// Every attribute a deployment exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    TargetHost,
    TargetUser,
    BuildHost,
    NixosConfig,
    SshOpts,
    NixPath,
    SshTimeout,
    CollectGarbage,
    /// Computed: the active system, or `unknown`
    NixosSystem,
    PreSwitchHook,
    PostSwitchHook,
}

impl Field {
    /// User-settable fields, in declaration order
    pub const CONFIG: [Field; 10] = [
        Field::TargetHost,
        Field::TargetUser,
        Field::BuildHost,
        Field::NixosConfig,
        Field::SshOpts,
        Field::NixPath,
        Field::SshTimeout,
        Field::CollectGarbage,
        Field::PreSwitchHook,
        Field::PostSwitchHook,
    ];

    /// Fields whose change triggers activation
    pub const TRACKED: [Field; 4] = [
        Field::NixosSystem,
        Field::TargetHost,
        Field::PreSwitchHook,
        Field::PostSwitchHook,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Field::TargetHost => "target_host",
            Field::TargetUser => "target_user",
            Field::BuildHost => "build_host",
            Field::NixosConfig => "nixos_config",
            Field::SshOpts => "ssh_opts",
            Field::NixPath => "nix_path",
            Field::SshTimeout => "ssh_timeout",
            Field::CollectGarbage => "collect_garbage",
            Field::NixosSystem => "nixos_system",
            Field::PreSwitchHook => "pre_switch_hook",
            Field::PostSwitchHook => "post_switch_hook",
        }
    }

    /// Values that must never be logged
    #[must_use]
    pub fn is_sensitive(self) -> bool {
        matches!(self, Field::PreSwitchHook | Field::PostSwitchHook)
    }

    /// Schema default applied when no explicit value is given
    ///
    /// `ssh_opts` and `nix_path` have no schema default here; resolution
    /// supplies the session-option default and the environment fallbacks.
    #[must_use]
    pub fn default_value(self) -> Option<Value> {
        match self {
            Field::TargetUser => Some(Value::from("root")),
            Field::BuildHost => Some(Value::from("localhost")),
            Field::SshTimeout => Some(Value::Int(180)),
            Field::CollectGarbage => Some(Value::Bool(true)),
            Field::PreSwitchHook | Field::PostSwitchHook => Some(Value::from("")),
            _ => None,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Attribute value
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl Value {
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Str(s) => write!(f, "{s:?}"),
        }
    }
}

/// Explicitly supplied configuration for one deployment
///
/// `None` means "not set"; defaults and environment fallbacks are applied
/// during resolution, never here.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceInput {
    pub target_host: Option<String>,
    pub target_user: Option<String>,
    pub build_host: Option<String>,
    pub nixos_config: Option<String>,
    pub ssh_opts: Option<String>,
    pub nix_path: Option<String>,
    pub ssh_timeout: Option<i64>,
    pub collect_garbage: Option<bool>,
    pub pre_switch_hook: Option<String>,
    pub post_switch_hook: Option<String>,
}

impl ResourceInput {
    /// Explicit value of `field`, if set
    #[must_use]
    pub fn get(&self, field: Field) -> Option<Value> {
        let text = |v: &Option<String>| v.as_deref().map(Value::from);
        match field {
            Field::TargetHost => text(&self.target_host),
            Field::TargetUser => text(&self.target_user),
            Field::BuildHost => text(&self.build_host),
            Field::NixosConfig => text(&self.nixos_config),
            Field::SshOpts => text(&self.ssh_opts),
            Field::NixPath => text(&self.nix_path),
            Field::SshTimeout => self.ssh_timeout.map(Value::Int),
            Field::CollectGarbage => self.collect_garbage.map(Value::Bool),
            Field::PreSwitchHook => text(&self.pre_switch_hook),
            Field::PostSwitchHook => text(&self.post_switch_hook),
            Field::NixosSystem => None,
        }
    }
}

impl fmt::Debug for ResourceInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hook = |v: &Option<String>| v.as_ref().map(|_| "<sensitive>");
        f.debug_struct("ResourceInput")
            .field("target_host", &self.target_host)
            .field("target_user", &self.target_user)
            .field("build_host", &self.build_host)
            .field("nixos_config", &self.nixos_config)
            .field("ssh_opts", &self.ssh_opts)
            .field("nix_path", &self.nix_path)
            .field("ssh_timeout", &self.ssh_timeout)
            .field("collect_garbage", &self.collect_garbage)
            .field("pre_switch_hook", &hook(&self.pre_switch_hook))
            .field("post_switch_hook", &hook(&self.post_switch_hook))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_names_match_serde() {
        for field in Field::CONFIG.into_iter().chain([Field::NixosSystem]) {
            let json = serde_json::to_string(&field).unwrap();
            assert_eq!(json, format!("\"{}\"", field.name()));
        }
    }

    #[test]
    fn test_tracked_fields() {
        assert!(Field::TRACKED.contains(&Field::NixosSystem));
        assert!(Field::TRACKED.contains(&Field::PostSwitchHook));
        assert!(!Field::TRACKED.contains(&Field::BuildHost));
        assert!(!Field::TRACKED.contains(&Field::CollectGarbage));
    }

    #[test]
    fn test_input_get() {
        let input = ResourceInput {
            target_host: Some("web".to_string()),
            ssh_timeout: Some(30),
            ..ResourceInput::default()
        };

        assert_eq!(input.get(Field::TargetHost), Some(Value::from("web")));
        assert_eq!(input.get(Field::SshTimeout), Some(Value::Int(30)));
        assert_eq!(input.get(Field::TargetUser), None);
        assert_eq!(input.get(Field::NixosSystem), None);
    }

    #[test]
    fn test_input_debug_redacts_hooks() {
        let input = ResourceInput {
            target_host: Some("web".to_string()),
            pre_switch_hook: Some("curl -H 'token: s3cr3t' https://hooks".to_string()),
            ..ResourceInput::default()
        };

        let shown = format!("{input:?}");
        assert!(shown.contains("web"));
        assert!(!shown.contains("s3cr3t"));
    }

    #[test]
    fn test_value_untagged_roundtrip() {
        let values = vec![Value::Bool(true), Value::Int(180), Value::from("root")];
        let json = serde_json::to_string(&values).unwrap();
        assert_eq!(json, r#"[true,180,"root"]"#);
    }
}
