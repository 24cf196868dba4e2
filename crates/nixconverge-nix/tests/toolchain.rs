use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;

use nixconverge_exec::{CommandExecutor, CommandResult, CommandSpec, ExecError};
use nixconverge_nix::{
    Backoff, HookStage, NixToolchain, ReachabilityProbe, RebuildConfig, SshTarget, Toolchain,
    ToolchainError,
};

// Mock executor: records programs and answers by program name
#[derive(Default)]
struct MockExecutor {
    calls: Mutex<Vec<CommandSpec>>,
    replies: Mutex<Vec<(&'static str, i32, &'static str)>>,
}

impl MockExecutor {
    fn reply(self, program: &'static str, status: i32, stdout: &'static str) -> Self {
        self.replies.lock().unwrap().push((program, status, stdout));
        self
    }

    fn programs(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.program.clone())
            .collect()
    }
}

#[async_trait]
impl CommandExecutor for MockExecutor {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandResult, ExecError> {
        self.calls.lock().unwrap().push(spec.clone());
        let (status, stdout) = self
            .replies
            .lock()
            .unwrap()
            .iter()
            .find(|(program, _, _)| *program == spec.program)
            .map_or((0, ""), |(_, status, stdout)| (*status, *stdout));

        Ok(CommandResult {
            status,
            stdout: stdout.to_string(),
            stderr: if status == 0 { String::new() } else { "boom".to_string() },
            duration: Duration::from_millis(1),
        })
    }

    async fn run_with_timeout(
        &self,
        spec: &CommandSpec,
        _timeout: Duration,
    ) -> Result<CommandResult, ExecError> {
        self.run(spec).await
    }

    fn executor_type(&self) -> &'static str {
        "mock"
    }
}

fn rebuild_config() -> RebuildConfig {
    RebuildConfig {
        target_host: "10.0.0.7".to_string(),
        target_user: "root".to_string(),
        build_host: "localhost".to_string(),
        nixos_config: PathBuf::from("/srv/fleet/web.nix"),
        nix_path: String::new(),
        ssh_opts: "-o BatchMode=yes".to_string(),
        pre_switch_hook: Some(SecretString::from("echo pre".to_string())),
        post_switch_hook: Some(SecretString::from("echo post".to_string())),
    }
}

fn toolchain(executor: &Arc<MockExecutor>) -> NixToolchain {
    NixToolchain::with_probe(
        executor.clone(),
        ReachabilityProbe::new(Backoff {
            initial: Duration::from_millis(10),
            max: Duration::from_millis(20),
            multiplier: 2.0,
        }),
    )
}

#[tokio::test]
async fn test_build_image_parses_store_path() {
    let executor = Arc::new(MockExecutor::default().reply(
        "nix-build",
        0,
        "these derivations will be built:\n/nix/store/abc123-nixos-system-web\n",
    ));

    let image = toolchain(&executor)
        .build_image(&rebuild_config())
        .await
        .unwrap();

    assert_eq!(image.as_str(), "/nix/store/abc123-nixos-system-web");
}

#[tokio::test]
async fn test_build_image_failure() {
    let executor = Arc::new(MockExecutor::default().reply("nix-build", 1, ""));

    let result = toolchain(&executor).build_image(&rebuild_config()).await;

    assert!(matches!(
        result,
        Err(ToolchainError::CommandFailed { status: 1, .. })
    ));
}

#[tokio::test]
async fn test_activate_runs_hooks_around_switch() {
    let executor = Arc::new(MockExecutor::default());

    toolchain(&executor)
        .activate_image(&rebuild_config())
        .await
        .unwrap();

    assert_eq!(executor.programs(), vec!["sh", "nixos-rebuild", "sh"]);
}

#[tokio::test]
async fn test_failed_pre_hook_skips_switch() {
    let executor = Arc::new(MockExecutor::default().reply("sh", 3, ""));

    let err = toolchain(&executor)
        .activate_image(&rebuild_config())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ToolchainError::HookFailed {
            stage: HookStage::PreSwitch,
            status: 3
        }
    ));
    assert!(!err.to_string().contains("echo pre"));
    assert_eq!(executor.programs(), vec!["sh"]);
}

#[tokio::test]
async fn test_activate_without_hooks() {
    let executor = Arc::new(MockExecutor::default());
    let mut cfg = rebuild_config();
    cfg.pre_switch_hook = None;
    cfg.post_switch_hook = None;

    toolchain(&executor).activate_image(&cfg).await.unwrap();

    assert_eq!(executor.programs(), vec!["nixos-rebuild"]);
}

#[tokio::test]
async fn test_query_active_image_rejects_garbage() {
    let executor = Arc::new(MockExecutor::default().reply("ssh", 0, "not-a-store-path\n"));

    let result = toolchain(&executor)
        .query_active_image(&rebuild_config())
        .await;

    assert!(matches!(
        result,
        Err(ToolchainError::InvalidOutput { tool: "readlink", .. })
    ));
}

#[tokio::test]
async fn test_probe_unreachable_host_times_out() {
    let executor = Arc::new(MockExecutor::default().reply("ssh", 255, ""));
    let target = SshTarget::new("root", "10.0.0.7", "-o BatchMode=yes");

    let result = toolchain(&executor)
        .probe(&target, Duration::from_millis(100))
        .await;

    assert!(matches!(result, Err(ToolchainError::Unreachable { .. })));
    assert!(executor.programs().len() > 1);
}

#[tokio::test]
async fn test_collect_garbage_runs_over_ssh() {
    let executor = Arc::new(MockExecutor::default());
    let target = SshTarget::new("root", "10.0.0.7", "-o BatchMode=yes");

    toolchain(&executor).collect_garbage(&target).await.unwrap();

    let calls = executor.calls.lock().unwrap();
    assert_eq!(
        calls[0].to_string(),
        "ssh -o BatchMode=yes root@10.0.0.7 nix-collect-garbage"
    );
}

#[test]
fn test_type_names() {
    let executor = Arc::new(MockExecutor::default());

    assert_eq!(executor.executor_type(), "mock");
    assert_eq!(toolchain(&executor).toolchain_type(), "nixos");
}
