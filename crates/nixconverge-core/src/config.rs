//! Deployment configuration resolution

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use nixconverge_nix::{RebuildConfig, SshTarget};
use secrecy::SecretString;

use crate::context::FieldSource;
use crate::error::CoreError;
use crate::field::{Field, Value};

/// Session options used when `ssh_opts` is unset
pub const DEFAULT_SSH_OPTS: &str = "-o StrictHostKeyChecking=accept-new -o BatchMode=yes";

/// Environment variable consulted when `nix_path` is unset
pub const NIX_PATH_ENV: &str = "NIX_PATH";

/// Environment variable consulted when `ssh_opts` is explicitly empty
pub const NIX_SSHOPTS_ENV: &str = "NIX_SSHOPTS";

/// The parts of the process environment resolution depends on
///
/// Captured once per invocation so resolution is a pure function.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    pub nix_path: Option<String>,
    pub ssh_opts: Option<String>,
    /// Base for relative `nixos_config` paths
    pub working_dir: Option<PathBuf>,
}

impl Environment {
    /// Snapshot the current process environment
    #[must_use]
    pub fn from_process() -> Self {
        Self {
            nix_path: std::env::var(NIX_PATH_ENV).ok(),
            ssh_opts: std::env::var(NIX_SSHOPTS_ENV).ok(),
            working_dir: std::env::current_dir().ok(),
        }
    }
}

/// Fully resolved configuration for one invocation
#[derive(Debug, Clone)]
pub struct DeploymentConfig {
    pub target_host: String,
    pub target_user: String,
    pub build_host: String,
    /// Always absolute
    pub nixos_config: PathBuf,
    pub ssh_opts: String,
    pub nix_path: String,
    pub ssh_timeout: Duration,
    pub collect_garbage: bool,
    pub pre_switch_hook: Option<SecretString>,
    pub post_switch_hook: Option<SecretString>,
}

impl DeploymentConfig {
    /// Resolve fields from `source`, falling back to `env` and defaults
    ///
    /// # Errors
    /// Returns `CoreError::Config` if a required field is missing, has the
    /// wrong type, or the configuration path cannot be made absolute.
    pub fn resolve(source: &dyn FieldSource, env: &Environment) -> Result<Self, CoreError> {
        let target_host = required_str(source, Field::TargetHost)?;
        if target_host.trim().is_empty() {
            return Err(CoreError::Config("target_host must not be empty".to_string()));
        }

        let nixos_config = absolute_path(
            &required_str(source, Field::NixosConfig)?,
            env.working_dir.as_deref(),
        )?;

        let ssh_opts = session_opts(source, env.ssh_opts.as_deref())?;
        let nix_path =
            explicit_or_env(source, Field::NixPath, env.nix_path.as_deref())?.unwrap_or_default();

        let timeout = int(source, Field::SshTimeout)?;
        let ssh_timeout = u64::try_from(timeout)
            .map(Duration::from_secs)
            .map_err(|_| CoreError::Config(format!("ssh_timeout must not be negative, got {timeout}")))?;

        Ok(Self {
            target_host,
            target_user: optional_str(source, Field::TargetUser)?,
            build_host: optional_str(source, Field::BuildHost)?,
            nixos_config,
            ssh_opts,
            nix_path,
            ssh_timeout,
            collect_garbage: bool_field(source, Field::CollectGarbage)?,
            pre_switch_hook: hook(source, Field::PreSwitchHook)?,
            post_switch_hook: hook(source, Field::PostSwitchHook)?,
        })
    }

    /// ssh target for probing and garbage collection
    #[must_use]
    pub fn ssh_target(&self) -> SshTarget {
        SshTarget::new(&self.target_user, &self.target_host, &self.ssh_opts)
    }

    /// Projection handed to the build and activation tools
    #[must_use]
    pub fn rebuild_config(&self) -> RebuildConfig {
        RebuildConfig {
            target_host: self.target_host.clone(),
            target_user: self.target_user.clone(),
            build_host: self.build_host.clone(),
            nixos_config: self.nixos_config.clone(),
            nix_path: self.nix_path.clone(),
            ssh_opts: self.ssh_opts.clone(),
            pre_switch_hook: self.pre_switch_hook.clone(),
            post_switch_hook: self.post_switch_hook.clone(),
        }
    }
}

/// Make `path` absolute against `base` (or the process working directory)
/// and drop `.` and `..` components lexically
///
/// # Errors
/// Returns `CoreError::Config` for an empty path or when no working
/// directory is available.
pub fn absolute_path(path: &str, base: Option<&Path>) -> Result<PathBuf, CoreError> {
    if path.trim().is_empty() {
        return Err(CoreError::Config("nixos_config must not be empty".to_string()));
    }

    let path = Path::new(path);
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        let base = match base {
            Some(b) => b.to_path_buf(),
            None => std::env::current_dir().map_err(|e| {
                CoreError::Config(format!("cannot resolve nixos_config: {e}"))
            })?,
        };
        base.join(path)
    };

    let mut clean = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                clean.pop();
            }
            other => clean.push(other),
        }
    }
    Ok(clean)
}

fn type_error(field: Field, expected: &str) -> CoreError {
    CoreError::Config(format!("{field} must be a {expected}"))
}

fn text(source: &dyn FieldSource, field: Field) -> Result<Option<String>, CoreError> {
    match source.value(field) {
        None => Ok(None),
        Some(Value::Str(s)) => Ok(Some(s)),
        Some(_) => Err(type_error(field, "string")),
    }
}

fn required_str(source: &dyn FieldSource, field: Field) -> Result<String, CoreError> {
    text(source, field)?.ok_or_else(|| CoreError::Config(format!("{field} is required")))
}

fn optional_str(source: &dyn FieldSource, field: Field) -> Result<String, CoreError> {
    Ok(text(source, field)?.unwrap_or_default())
}

fn int(source: &dyn FieldSource, field: Field) -> Result<i64, CoreError> {
    source
        .value(field)
        .map_or(Ok(0), |v| v.as_int().ok_or_else(|| type_error(field, "integer")))
}

fn bool_field(source: &dyn FieldSource, field: Field) -> Result<bool, CoreError> {
    source
        .value(field)
        .map_or(Ok(false), |v| v.as_bool().ok_or_else(|| type_error(field, "boolean")))
}

/// Explicit non-empty value, else the environment variable if non-empty
fn explicit_or_env(
    source: &dyn FieldSource,
    field: Field,
    env_value: Option<&str>,
) -> Result<Option<String>, CoreError> {
    if source.is_explicit(field)
        && let Some(value) = text(source, field)?.filter(|v| !v.is_empty())
    {
        return Ok(Some(value));
    }
    Ok(env_value.filter(|v| !v.is_empty()).map(str::to_string))
}

/// `ssh_opts`: explicit value, else `NIX_SSHOPTS` when set to `""`, else the
/// fixed default
fn session_opts(source: &dyn FieldSource, env_value: Option<&str>) -> Result<String, CoreError> {
    let opts = match text(source, Field::SshOpts)? {
        Some(value) if !value.is_empty() => value,
        Some(_) => env_value
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_SSH_OPTS)
            .to_string(),
        None => DEFAULT_SSH_OPTS.to_string(),
    };
    Ok(opts)
}

fn hook(source: &dyn FieldSource, field: Field) -> Result<Option<SecretString>, CoreError> {
    Ok(text(source, field)?
        .filter(|h| !h.trim().is_empty())
        .map(SecretString::from))
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;
    use crate::context::PlanView;
    use crate::field::ResourceInput;
    use crate::record::ResourceRecord;

    fn input() -> ResourceInput {
        ResourceInput {
            target_host: Some("10.0.0.7".to_string()),
            nixos_config: Some("hosts/web.nix".to_string()),
            ..ResourceInput::default()
        }
    }

    fn env() -> Environment {
        Environment {
            nix_path: None,
            ssh_opts: None,
            working_dir: Some(PathBuf::from("/srv/fleet")),
        }
    }

    fn resolve(input: &ResourceInput, env: &Environment) -> Result<DeploymentConfig, CoreError> {
        let prior = ResourceRecord::default();
        DeploymentConfig::resolve(&PlanView::new(input, &prior), env)
    }

    #[test]
    fn test_defaults() {
        let cfg = resolve(&input(), &env()).unwrap();

        assert_eq!(cfg.target_user, "root");
        assert_eq!(cfg.build_host, "localhost");
        assert_eq!(cfg.nixos_config, PathBuf::from("/srv/fleet/hosts/web.nix"));
        assert_eq!(cfg.ssh_opts, DEFAULT_SSH_OPTS);
        assert_eq!(cfg.nix_path, "");
        assert_eq!(cfg.ssh_timeout, Duration::from_secs(180));
        assert!(cfg.collect_garbage);
        assert!(cfg.pre_switch_hook.is_none());
        assert!(cfg.post_switch_hook.is_none());
    }

    #[test]
    fn test_env_fallback() {
        let env = Environment {
            nix_path: Some("nixpkgs=/srv/nixpkgs".to_string()),
            ssh_opts: Some("-p 2222".to_string()),
            ..env()
        };

        let cfg = resolve(&input(), &env).unwrap();
        assert_eq!(cfg.nix_path, "nixpkgs=/srv/nixpkgs");
        assert_eq!(cfg.ssh_opts, DEFAULT_SSH_OPTS);

        let mut explicit = input();
        explicit.nix_path = Some("nixpkgs=/opt/pinned".to_string());
        explicit.ssh_opts = Some("-o BatchMode=yes".to_string());
        let cfg = resolve(&explicit, &env).unwrap();
        assert_eq!(cfg.nix_path, "nixpkgs=/opt/pinned");
        assert_eq!(cfg.ssh_opts, "-o BatchMode=yes");
    }

    #[test]
    fn test_explicit_empty_falls_back_to_env() {
        let mut blank = input();
        blank.ssh_opts = Some(String::new());
        assert_eq!(resolve(&blank, &env()).unwrap().ssh_opts, DEFAULT_SSH_OPTS);

        let env = Environment {
            ssh_opts: Some("-p 2222".to_string()),
            ..env()
        };
        assert_eq!(resolve(&blank, &env).unwrap().ssh_opts, "-p 2222");
    }

    #[test]
    fn test_unset_ssh_opts_ignores_env() {
        let env = Environment {
            ssh_opts: Some("-p 2222".to_string()),
            ..env()
        };

        assert_eq!(resolve(&input(), &env).unwrap().ssh_opts, DEFAULT_SSH_OPTS);
    }

    #[test]
    fn test_hooks_exposed_only_through_secret() {
        let mut with_hooks = input();
        with_hooks.pre_switch_hook = Some("echo pre".to_string());
        with_hooks.post_switch_hook = Some("   ".to_string());

        let cfg = resolve(&with_hooks, &env()).unwrap();
        let pre = cfg.pre_switch_hook.as_ref().unwrap();

        assert_eq!(pre.expose_secret(), "echo pre");
        assert!(cfg.post_switch_hook.is_none());
        assert!(!format!("{cfg:?}").contains("echo pre"));
    }

    #[test]
    fn test_missing_and_empty_target_host() {
        let mut missing = input();
        missing.target_host = None;
        assert!(matches!(resolve(&missing, &env()), Err(CoreError::Config(_))));

        let mut empty = input();
        empty.target_host = Some(" ".to_string());
        assert!(matches!(resolve(&empty, &env()), Err(CoreError::Config(_))));
    }

    #[test]
    fn test_negative_timeout_rejected() {
        let mut negative = input();
        negative.ssh_timeout = Some(-1);

        assert!(matches!(resolve(&negative, &env()), Err(CoreError::Config(_))));
    }

    #[test]
    fn test_absolute_path_cleans_components() {
        let base = Path::new("/srv/fleet/envs");

        assert_eq!(
            absolute_path("../hosts/./web.nix", Some(base)).unwrap(),
            PathBuf::from("/srv/fleet/hosts/web.nix")
        );
        assert_eq!(
            absolute_path("/etc/nixos/../nixos/configuration.nix", Some(base)).unwrap(),
            PathBuf::from("/etc/nixos/configuration.nix")
        );
        assert!(absolute_path("", Some(base)).is_err());
    }

    #[test]
    fn test_absolute_path_idempotent_and_cwd_independent() {
        for raw in ["web.nix", "./a/../b/web.nix", "/abs/x/../web.nix", "../../web.nix"] {
            let once = absolute_path(raw, Some(Path::new("/work/dir"))).unwrap();
            let twice = absolute_path(once.to_str().unwrap(), Some(Path::new("/elsewhere"))).unwrap();

            assert!(once.is_absolute());
            assert_eq!(once, twice);
        }
    }
}
