use super::shell::{env_prelude, shell_quote};
use super::{
    BridgeLaunch, BridgeLaunchSpec, ForkSpec, MainSandboxSpec, RepoSyncSpec, SandboxBootstrapSpec,
    SparkApi, SparkError,
};
use crate::shared::truncate_chars;
use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const VERSION_TIMEOUT: Duration = Duration::from_secs(10);
const VOLUME_TIMEOUT: Duration = Duration::from_secs(60);
const SANDBOX_TIMEOUT: Duration = Duration::from_secs(300);
const REPO_SYNC_TIMEOUT: Duration = Duration::from_secs(300);
const FORK_TIMEOUT: Duration = Duration::from_secs(300);
const LAUNCH_TIMEOUT: Duration = Duration::from_secs(60);

const ALREADY_EXISTS_MARKER: &str = "already exists";
const OUTPUT_MAX_CHARS: usize = 2_000;

#[derive(Debug, Clone)]
pub struct SparkCli {
    binary: String,
}

impl Default for SparkCli {
    fn default() -> Self {
        Self {
            binary: "spark".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct CommandOutput {
    exit_code: Option<i32>,
    stdout: String,
    stderr: String,
}

impl CommandOutput {
    fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

impl SparkCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn command_form(&self, args: &[String]) -> String {
        format!("{} {}", self.binary, args.join(" "))
    }

    fn run(&self, args: &[String], timeout: Duration) -> Result<CommandOutput, SparkError> {
        let command_form = self.command_form(args);

        let mut command = Command::new(&self.binary);
        command.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(SparkError::MissingBinary {
                    binary: self.binary.clone(),
                });
            }
            Err(source) => {
                return Err(SparkError::Io {
                    command: command_form,
                    source,
                });
            }
        };

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stdout_reader = thread::spawn(move || read_to_string(stdout));
        let stderr_reader = thread::spawn(move || read_to_string(stderr));

        let start = Instant::now();
        let exit_status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if start.elapsed() > timeout {
                        let _ = child.kill();
                        let _ = child.wait();
                        let _ = stdout_reader.join();
                        let _ = stderr_reader.join();
                        return Err(SparkError::Timeout {
                            command: command_form,
                            timeout_secs: timeout.as_secs(),
                        });
                    }
                    thread::sleep(Duration::from_millis(10));
                }
                Err(source) => {
                    return Err(SparkError::Io {
                        command: command_form,
                        source,
                    });
                }
            }
        };

        Ok(CommandOutput {
            exit_code: exit_status.code(),
            stdout: stdout_reader.join().unwrap_or_default(),
            stderr: stderr_reader.join().unwrap_or_default(),
        })
    }

    fn run_expecting_success(
        &self,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, SparkError> {
        let output = self.run(args, timeout)?;
        if output.success() {
            return Ok(output);
        }
        Err(self.command_failed(args, &output))
    }

    fn run_allowing_existing(&self, args: &[String], timeout: Duration) -> Result<(), SparkError> {
        let output = self.run(args, timeout)?;
        if output.success() {
            return Ok(());
        }
        if output
            .combined()
            .to_ascii_lowercase()
            .contains(ALREADY_EXISTS_MARKER)
        {
            return Ok(());
        }
        Err(self.command_failed(args, &output))
    }

    fn command_failed(&self, args: &[String], output: &CommandOutput) -> SparkError {
        SparkError::CommandFailed {
            command: self.command_form(args),
            exit_code: output.exit_code.unwrap_or(-1),
            output: truncate_chars(&output.combined(), OUTPUT_MAX_CHARS).to_string(),
        }
    }

    fn exec_args(target: &str, background: bool, script: &str) -> Vec<String> {
        let mut args = vec!["exec".to_string()];
        if background {
            args.push("--bg".to_string());
        }
        args.extend([
            target.to_string(),
            "--".to_string(),
            "sh".to_string(),
            "-c".to_string(),
            script.to_string(),
        ]);
        args
    }
}

fn read_to_string(pipe: Option<impl Read>) -> String {
    let mut buf = String::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_string(&mut buf);
    }
    buf
}

impl SparkApi for SparkCli {
    fn verify_availability(&self) -> Result<(), SparkError> {
        self.run_expecting_success(&["--version".to_string()], VERSION_TIMEOUT)?;
        Ok(())
    }

    fn ensure_work_volume(&self, project: &str, volume: &str) -> Result<(), SparkError> {
        let args = vec![
            "volume".to_string(),
            "create".to_string(),
            format!("{project}:{volume}"),
        ];
        self.run_allowing_existing(&args, VOLUME_TIMEOUT)
    }

    fn ensure_main_sandbox(&self, spec: &MainSandboxSpec) -> Result<(), SparkError> {
        let args = vec![
            "create".to_string(),
            format!("{}:{}", spec.project, spec.main_sandbox),
            "--base".to_string(),
            spec.base.clone(),
            "--volume".to_string(),
            format!("{}:{}", spec.work_volume, spec.work_mount_path),
        ];
        self.run_allowing_existing(&args, SANDBOX_TIMEOUT)
    }

    fn ensure_repo_in_main_sandbox(&self, spec: &RepoSyncSpec) -> Result<(), SparkError> {
        let script = repo_sync_script(&spec.repo, &spec.branch, &spec.workdir);
        let target = format!("{}:{}", spec.project, spec.sandbox_name);
        self.run_expecting_success(&Self::exec_args(&target, false, &script), REPO_SYNC_TIMEOUT)?;
        Ok(())
    }

    fn run_bootstrap(&self, spec: &SandboxBootstrapSpec) -> Result<(), SparkError> {
        let script = bootstrap_script(&spec.workdir, &spec.script_path);
        let target = format!("{}:{}", spec.project, spec.sandbox_name);
        let args = Self::exec_args(&target, false, &script);
        let timeout = Duration::from_secs(spec.timeout_sec);

        let mut attempt = 0u32;
        loop {
            match self.run_expecting_success(&args, timeout) {
                Ok(_) => return Ok(()),
                Err(err) if attempt >= spec.retries => return Err(err),
                Err(_) => attempt += 1,
            }
        }
    }

    fn create_task_sandbox_fork(&self, spec: &ForkSpec) -> Result<(), SparkError> {
        let mut args = vec![
            "fork".to_string(),
            format!("{}:{}", spec.project, spec.main_sandbox),
            format!("{}:{}", spec.project, spec.task_sandbox),
        ];
        for (key, value) in &spec.tags {
            args.push("-t".to_string());
            args.push(format!("{key}={value}"));
        }
        self.run_expecting_success(&args, FORK_TIMEOUT)?;
        Ok(())
    }

    fn launch_bridge_in_sandbox(
        &self,
        spec: &BridgeLaunchSpec,
    ) -> Result<BridgeLaunch, SparkError> {
        let script = format!(
            "{}cd {} && exec {}",
            env_prelude(&spec.env),
            shell_quote(&spec.bridge_workdir),
            shell_quote(&spec.bridge_entrypoint),
        );
        let target = format!("{}:{}", spec.project, spec.sandbox_name);
        let output =
            self.run_expecting_success(&Self::exec_args(&target, true, &script), LAUNCH_TIMEOUT)?;

        let raw_output = output.combined();
        let (pid, process_id) = parse_launch_output(&raw_output);
        Ok(BridgeLaunch {
            pid,
            process_id,
            raw_output,
        })
    }
}

/// Clone on first use; otherwise force-sync the existing checkout onto the
/// branch head.
fn repo_sync_script(repo: &str, branch: &str, workdir: &str) -> String {
    let workdir_q = shell_quote(workdir);
    let repo_q = shell_quote(repo);
    let branch_q = shell_quote(branch);
    let origin_branch_q = shell_quote(&format!("origin/{branch}"));
    format!(
        "if [ ! -d {workdir_q}/.git ]; then \
         git clone --branch {branch_q} {repo_q} {workdir_q}; \
         else cd {workdir_q} && git fetch origin && git checkout {branch_q} \
         && git reset --hard {origin_branch_q}; fi"
    )
}

fn bootstrap_script(workdir: &str, script_path: &str) -> String {
    let workdir_q = shell_quote(workdir);
    let script_q = shell_quote(&format!("{workdir}/{script_path}"));
    format!(
        "if [ -x {script_q} ]; then cd {workdir_q} && {script_q}; \
         else echo 'bootstrap script not present, skipping'; fi"
    )
}

/// Scans launch output for `pid[:=]<decimal>` and `process[_id][:=]<token>`,
/// tolerating absence of either.
pub fn parse_launch_output(raw: &str) -> (Option<u64>, Option<String>) {
    let pid = capture_after(raw, "pid").and_then(|token| {
        let digits: String = token.chars().take_while(char::is_ascii_digit).collect();
        digits.parse::<u64>().ok()
    });
    let process_id = capture_after(raw, "process_id").or_else(|| capture_after(raw, "process"));
    (pid, process_id)
}

fn capture_after(raw: &str, key: &str) -> Option<String> {
    let haystack = raw.to_ascii_lowercase();
    let mut from = 0;
    while let Some(offset) = haystack[from..].find(key) {
        let start = from + offset;
        let end = start + key.len();
        from = end;

        let preceded_ok = start == 0
            || !haystack.as_bytes()[start - 1].is_ascii_alphanumeric()
                && haystack.as_bytes()[start - 1] != b'_';
        if !preceded_ok {
            continue;
        }
        let Some(sep) = haystack.as_bytes().get(end) else {
            continue;
        };
        if *sep != b':' && *sep != b'=' {
            continue;
        }

        let value_start = end + 1;
        let token: String = raw[value_start..]
            .chars()
            .skip_while(|c| *c == ' ')
            .take_while(|c| !c.is_whitespace() && !matches!(c, ',' | ';' | '"' | '\''))
            .collect();
        if !token.is_empty() {
            return Some(token);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn repo_sync_script_clones_then_falls_back_to_force_sync() {
        let script = repo_sync_script("git@github.com:example/app.git", "main", "/work/repo");
        assert!(script.contains("if [ ! -d '/work/repo'/.git ]"));
        assert!(script.contains("git clone --branch 'main' 'git@github.com:example/app.git' '/work/repo'"));
        assert!(script.contains("git fetch origin"));
        assert!(script.contains("git checkout 'main'"));
        assert!(script.contains("git reset --hard 'origin/main'"));
    }

    #[test]
    fn bootstrap_script_skips_when_not_executable() {
        let script = bootstrap_script("/work/repo", "scripts/bootstrap.sh");
        assert!(script.contains("if [ -x '/work/repo/scripts/bootstrap.sh' ]"));
        assert!(script.contains("cd '/work/repo'"));
        assert!(script.contains("skipping"));
    }

    #[test]
    fn launch_output_parsing_reads_pid_and_process_id() {
        let (pid, process) = parse_launch_output("started pid=4242 process_id=bridge-7f3a\n");
        assert_eq!(pid, Some(4242));
        assert_eq!(process.as_deref(), Some("bridge-7f3a"));

        let (pid, process) = parse_launch_output("PID: 77\nProcess: runner-1");
        assert_eq!(pid, Some(77));
        assert_eq!(process.as_deref(), Some("runner-1"));
    }

    #[test]
    fn launch_output_parsing_tolerates_absence() {
        assert_eq!(parse_launch_output("launched ok"), (None, None));
        assert_eq!(parse_launch_output(""), (None, None));
    }

    #[test]
    fn launch_output_parsing_ignores_non_decimal_pids_and_embedded_keys() {
        let (pid, process) = parse_launch_output("vapid=9 pid=abc process_id=x1");
        assert_eq!(pid, None);
        assert_eq!(process.as_deref(), Some("x1"));
    }

    #[test]
    fn exec_args_place_the_background_flag_before_the_target() {
        let args = SparkCli::exec_args("proj:box", true, "echo hi");
        assert_eq!(
            args,
            vec!["exec", "--bg", "proj:box", "--", "sh", "-c", "echo hi"]
        );
        let args = SparkCli::exec_args("proj:box", false, "echo hi");
        assert_eq!(args, vec!["exec", "proj:box", "--", "sh", "-c", "echo hi"]);
    }

    #[test]
    fn launch_script_exports_env_before_exec() {
        let mut env = BTreeMap::new();
        env.insert("INITIAL_PROMPT".to_string(), "fix the bug".to_string());
        let spec = BridgeLaunchSpec {
            project: "proj".to_string(),
            sandbox_name: "task-1".to_string(),
            bridge_entrypoint: "/opt/bridge/agent-bridge".to_string(),
            bridge_workdir: "/work/repo".to_string(),
            env,
        };
        let script = format!(
            "{}cd {} && exec {}",
            env_prelude(&spec.env),
            shell_quote(&spec.bridge_workdir),
            shell_quote(&spec.bridge_entrypoint),
        );
        assert_eq!(
            script,
            "export INITIAL_PROMPT='fix the bug'; cd '/work/repo' && exec '/opt/bridge/agent-bridge'"
        );
    }
}
