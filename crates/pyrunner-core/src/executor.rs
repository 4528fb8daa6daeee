//! Out-of-process execution of a single submission
//!
//! Every call gets its own working directory, runs `python3 main.py` there
//! under the restricted identity with rlimits applied, captures capped
//! output, and tears everything down when the [`Workspace`] guard drops.

use crate::{
    config::SandboxConfig,
    result::{decode_output, ExecutionResult},
    Result, SandboxError,
};
use nix::sys::resource::{setrlimit, Resource};
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::{chown, geteuid, Gid, Pid, Uid, User};
use std::os::unix::fs::{symlink, MetadataExt};
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::Stdio;
use std::time::Instant;
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

/// File name the submission is written to
pub const ENTRYPOINT: &str = "main.py";

/// Name of the link to the shared dataset directory
pub const DATASETS_LINK: &str = "datasets";

/// Passes over /proc when killing leftovers; a forking submission can
/// spawn new processes between passes.
const KILL_PASSES: usize = 3;

/// Unprivileged account submissions run as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub uid: Uid,
    pub gid: Gid,
}

impl Identity {
    /// Resolve an account by name
    pub fn lookup(name: &str) -> Result<Self> {
        let user = User::from_name(name)
            .map_err(|e| SandboxError::Identity(format!("failed to look up user {name}: {e}")))?
            .ok_or_else(|| SandboxError::Identity(format!("user {name} does not exist")))?;

        if user.uid.is_root() {
            return Err(SandboxError::Identity(format!(
                "refusing to run submissions as {name}: uid 0"
            )));
        }

        Ok(Self {
            uid: user.uid,
            gid: user.gid,
        })
    }
}

/// Runs submissions one call at a time. Serialization across callers is the
/// job of [`crate::gate::GatedExecutor`], not of this type.
#[derive(Debug)]
pub struct SandboxExecutor {
    config: SandboxConfig,
    identity: Option<Identity>,
}

impl SandboxExecutor {
    pub fn new(config: SandboxConfig) -> Result<Self> {
        config.validate()?;

        let identity = match config.run_as.as_deref() {
            Some(name) => {
                let identity = Identity::lookup(name)?;
                ensure_can_switch(geteuid(), identity, name)?;
                Some(identity)
            }
            None => {
                tracing::warn!(
                    "no restricted user configured, submissions run with the service identity"
                );
                None
            }
        };

        std::fs::create_dir_all(&config.workdir_root).map_err(|e| {
            SandboxError::Workdir(format!(
                "failed to create {}: {e}",
                config.workdir_root.display()
            ))
        })?;

        if let Some(datasets) = &config.datasets_dir {
            warn_if_writable(datasets, identity);
        }

        tracing::info!(
            python = ?config.python_path,
            root = ?config.workdir_root,
            user = config.run_as.as_deref().unwrap_or("<service>"),
            timeout_secs = config.timeout.as_secs_f64(),
            "sandbox executor ready"
        );

        Ok(Self { config, identity })
    }

    /// Run `code` to completion or until the wall-clock limit.
    ///
    /// Only harness faults are `Err`; a submission that fails to start,
    /// crashes or times out still yields an [`ExecutionResult`].
    pub async fn execute(&self, code: &str) -> Result<ExecutionResult> {
        let mut workspace = Workspace::create(&self.config, self.identity)?;
        workspace.write_entrypoint(code)?;
        workspace.hand_over()?;

        tracing::debug!(workdir = ?workspace.path(), code_len = code.len(), "starting submission");

        let start = Instant::now();
        let mut child = match self.command(workspace.path()).spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(error = %e, python = ?self.config.python_path, "failed to spawn interpreter");
                return Ok(ExecutionResult::spawn_failed(format!(
                    "failed to start {}: {e}",
                    self.config.python_path.display()
                )));
            }
        };
        workspace.track(child.id());

        let mut stdout_task = tokio::spawn(read_capped(child.stdout.take(), self.config.max_stdout_bytes));
        let mut stderr_task = tokio::spawn(read_capped(child.stderr.take(), self.config.max_stderr_bytes));

        let finished = tokio::time::timeout(self.config.timeout, async {
            let status = child.wait().await?;
            let stdout = (&mut stdout_task).await.map_err(join_error)??;
            let stderr = (&mut stderr_task).await.map_err(join_error)??;
            Ok::<_, SandboxError>((status, stdout, stderr))
        })
        .await;

        match finished {
            Ok(Ok((status, stdout, stderr))) => {
                let exit_code = status.code().or_else(|| status.signal().map(|sig| -sig));
                let duration = start.elapsed();
                tracing::info!(?exit_code, elapsed_ms = duration.as_millis(), "submission finished");

                Ok(ExecutionResult {
                    stdout: decode_output(stdout),
                    stderr: decode_output(stderr),
                    exit_code,
                    timed_out: false,
                    duration,
                })
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                stdout_task.abort();
                stderr_task.abort();
                workspace.terminate();
                // already SIGKILLed; this only reaps
                let _ = child.wait().await;

                tracing::info!(
                    timeout_secs = self.config.timeout.as_secs_f64(),
                    "submission timed out"
                );
                Ok(ExecutionResult::timed_out(start.elapsed()))
            }
        }
    }

    fn command(&self, workdir: &Path) -> Command {
        let mut cmd = Command::new(&self.config.python_path);
        cmd.arg(ENTRYPOINT)
            .current_dir(workdir)
            .env_clear()
            .envs(self.config.env.iter().map(|(k, v)| (k, v)))
            .env("HOME", workdir)
            .env("TMPDIR", workdir)
            .env("MPLCONFIGDIR", workdir)
            .env("XDG_CONFIG_HOME", workdir)
            .env("XDG_CACHE_HOME", workdir)
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);

        if let Some(identity) = self.identity {
            cmd.uid(identity.uid.as_raw()).gid(identity.gid.as_raw());
        }

        let limits = ResourceLimits::new(&self.config, self.identity.is_some());
        // SAFETY: the hook only calls setrlimit(2), which is async-signal-safe,
        // and does not allocate.
        #[allow(unsafe_code)]
        unsafe {
            cmd.pre_exec(move || limits.apply());
        }

        cmd
    }
}

/// The restricted identity must differ from the service's own, since cleanup
/// kills every process of that uid, and switching to it needs root.
fn ensure_can_switch(service: Uid, identity: Identity, name: &str) -> Result<()> {
    if identity.uid == service {
        return Err(SandboxError::Identity(format!(
            "{name} is the service's own uid {service}"
        )));
    }
    if !service.is_root() {
        return Err(SandboxError::Identity(format!(
            "service runs as uid {service} and cannot switch to {name}"
        )));
    }
    Ok(())
}

/// rlimits applied in the child between fork and exec
#[derive(Debug, Clone, Copy)]
struct ResourceLimits {
    address_space: libc::rlim_t,
    cpu_secs: libc::rlim_t,
    file_size: libc::rlim_t,
    /// RLIMIT_NPROC counts every process of the uid, so it is only set once
    /// the child runs under its own identity
    processes: Option<libc::rlim_t>,
}

impl ResourceLimits {
    fn new(config: &SandboxConfig, switched_identity: bool) -> Self {
        Self {
            address_space: config.memory_limit as libc::rlim_t,
            cpu_secs: config.timeout.as_secs() as libc::rlim_t + 1,
            file_size: config.max_file_size as libc::rlim_t,
            processes: switched_identity.then_some(libc::rlim_t::from(config.max_pids)),
        }
    }

    fn apply(&self) -> std::io::Result<()> {
        setrlimit(Resource::RLIMIT_AS, self.address_space, self.address_space)?;
        // soft limit raises SIGXCPU, hard limit SIGKILL
        setrlimit(Resource::RLIMIT_CPU, self.cpu_secs, self.cpu_secs + 1)?;
        setrlimit(Resource::RLIMIT_FSIZE, self.file_size, self.file_size)?;
        if let Some(processes) = self.processes {
            setrlimit(Resource::RLIMIT_NPROC, processes, processes)?;
        }
        Ok(())
    }
}

/// Per-run working directory.
///
/// Dropping it kills the run's process group and, when an identity is in
/// use, every process of that identity, then removes the directory.
#[derive(Debug)]
struct Workspace {
    dir: Option<TempDir>,
    identity: Option<Identity>,
    process_group: Option<Pid>,
}

impl Workspace {
    fn create(config: &SandboxConfig, identity: Option<Identity>) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("run-")
            .tempdir_in(&config.workdir_root)
            .map_err(|e| {
                SandboxError::Workdir(format!(
                    "failed to create working directory under {}: {e}",
                    config.workdir_root.display()
                ))
            })?;

        if let Some(datasets) = &config.datasets_dir {
            symlink(datasets, dir.path().join(DATASETS_LINK)).map_err(|e| {
                SandboxError::Workdir(format!("failed to link {}: {e}", datasets.display()))
            })?;
        }

        Ok(Self {
            dir: Some(dir),
            identity,
            process_group: None,
        })
    }

    fn path(&self) -> &Path {
        self.dir.as_ref().map_or_else(|| Path::new(""), TempDir::path)
    }

    fn write_entrypoint(&self, code: &str) -> Result<()> {
        let path = self.path().join(ENTRYPOINT);
        std::fs::write(&path, code).map_err(|e| {
            SandboxError::Workdir(format!("failed to write {}: {e}", path.display()))
        })
    }

    /// Give the directory and the entrypoint to the restricted identity
    fn hand_over(&self) -> Result<()> {
        let Some(identity) = self.identity else {
            return Ok(());
        };

        for path in [self.path().to_path_buf(), self.path().join(ENTRYPOINT)] {
            chown(&path, Some(identity.uid), Some(identity.gid)).map_err(|e| {
                SandboxError::Identity(format!(
                    "failed to hand {} over to uid {}: {e}",
                    path.display(),
                    identity.uid
                ))
            })?;
        }
        Ok(())
    }

    fn track(&mut self, pid: Option<u32>) {
        self.process_group = pid
            .and_then(|pid| i32::try_from(pid).ok())
            .map(Pid::from_raw);
    }

    fn terminate(&self) {
        if let Some(pgid) = self.process_group {
            // ESRCH just means the group is already gone
            let _ = killpg(pgid, Signal::SIGKILL);
        }
        if let Some(identity) = self.identity {
            kill_all_owned_by(identity.uid);
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.terminate();

        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            match dir.close() {
                Ok(()) => tracing::debug!(workdir = ?path, "working directory removed"),
                Err(e) => tracing::error!(workdir = ?path, error = %e, "failed to remove working directory"),
            }
        }
    }
}

/// SIGKILL every process whose /proc entry belongs to `uid`
fn kill_all_owned_by(uid: Uid) {
    let own_pid = std::process::id();
    let mut killed = 0usize;

    for _ in 0..KILL_PASSES {
        let Ok(entries) = std::fs::read_dir("/proc") else {
            tracing::warn!("cannot read /proc, leftover processes not killed");
            return;
        };

        let mut found = 0usize;
        for entry in entries.flatten() {
            let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
                continue;
            };
            if pid == own_pid {
                continue;
            }
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            if meta.uid() != uid.as_raw() {
                continue;
            }
            let Ok(raw) = i32::try_from(pid) else {
                continue;
            };
            if kill(Pid::from_raw(raw), Signal::SIGKILL).is_ok() {
                found += 1;
            }
        }

        killed += found;
        if found == 0 {
            break;
        }
    }

    if killed > 0 {
        tracing::info!(uid = uid.as_raw(), killed, "killed leftover processes");
    }
}

fn warn_if_writable(datasets: &Path, identity: Option<Identity>) {
    let meta = match std::fs::metadata(datasets) {
        Ok(meta) => meta,
        Err(e) => {
            tracing::warn!(datasets = ?datasets, error = %e, "dataset directory is not accessible");
            return;
        }
    };
    let Some(identity) = identity else {
        return;
    };

    let mode = meta.mode();
    let writable = (meta.uid() == identity.uid.as_raw() && mode & 0o200 != 0)
        || (meta.gid() == identity.gid.as_raw() && mode & 0o020 != 0)
        || mode & 0o002 != 0;
    if writable {
        tracing::warn!(datasets = ?datasets, mode = format!("{mode:o}"), "restricted user can write to the dataset directory");
    }
}

/// Read a pipe to EOF keeping at most `limit` bytes. The rest is drained so
/// the child never blocks on a full pipe.
async fn read_capped<R>(pipe: Option<R>, limit: usize) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = pipe else {
        return Ok(Vec::new());
    };

    let mut kept = Vec::with_capacity(limit.min(64 * 1024));
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        let room = limit.saturating_sub(kept.len());
        kept.extend_from_slice(&chunk[..n.min(room)]);
    }
    Ok(kept)
}

fn join_error(e: tokio::task::JoinError) -> SandboxError {
    SandboxError::Execution(format!("output reader failed: {e}"))
}
