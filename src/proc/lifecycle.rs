// src/proc/lifecycle.rs

//! Lifecycle control for one running instance.
//!
//! An [`Instance`] is a single execution attempt of a service: the spawned
//! OS process (owned exclusively by its monitor task), the state machine
//! `starting -> running -> stopping -> stopped` (with `error` reachable from
//! every non-terminal state), and the reader tasks feeding the log hub.
//!
//! Tasks per instance:
//! - one reader per output stream, appending each line to the hub in
//!   arrival order, tagged with its stream;
//! - one monitor that owns the `Child`, performs the `starting -> running`
//!   transition once the spawn is confirmed, and `select!`s between the
//!   process exiting on its own and a force-kill request from `stop`
//!   escalation.

use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ServiceConfig;
use crate::errors::{ProcwatchError, Result};
use crate::logs::LogHub;
use crate::proc::kill;
use crate::proc::types::{LogEntry, ServiceStatus, StatusEvent, StreamKind};

/// Environment forced onto every child so interpreter output stays
/// unbuffered and colour-capable even though stdout is a pipe.
const FORCED_ENV: &[(&str, &str)] = &[
    ("PYTHONUNBUFFERED", "1"),
    ("FORCE_COLOR", "1"),
    ("CLICOLOR_FORCE", "1"),
];

/// After the process exits, how long the monitor waits for the stream
/// readers to drain buffered pipe output before publishing the terminal
/// status. Bounded because an orphaned descendant can inherit the write end
/// and keep the pipe open indefinitely.
const OUTPUT_DRAIN: Duration = Duration::from_millis(250);

#[derive(Debug)]
pub struct Instance {
    pub service_id: String,
    state: Mutex<InstanceState>,
    /// Mirrors `state.status` so `stop`/`shutdown_all` can await terminal
    /// states without polling.
    status_rx: watch::Receiver<ServiceStatus>,
    events: broadcast::Sender<StatusEvent>,
}

#[derive(Debug)]
struct InstanceState {
    status: ServiceStatus,
    pid: Option<u32>,
    /// Process-group id for tree signalling; equal to the child pid because
    /// the child runs in its own session.
    pgid: Option<i32>,
    started_at: SystemTime,
    last_error: Option<String>,
    /// Portable forceful-kill path: tells the monitor task to kill the
    /// direct child through its handle.
    force_kill: Option<oneshot::Sender<()>>,
    status_tx: watch::Sender<ServiceStatus>,
}

impl InstanceState {
    /// Must be called with the transition already applied; keeps the watch
    /// mirror and the global event feed in state-machine order because the
    /// caller holds the state lock.
    fn publish(&self, service_id: &str, events: &broadcast::Sender<StatusEvent>) {
        let _ = self.status_tx.send(self.status);
        let _ = events.send(StatusEvent {
            service_id: service_id.to_string(),
            status: self.status,
            pid: self.pid,
            error: self.last_error.clone(),
        });
    }
}

/// Spawn the OS process for `config` and wire up its instance.
///
/// Returns with the instance in `Starting`; the monitor task moves it to
/// `Running` asynchronously. A spawn failure leaves nothing behind: no
/// instance, no status events, an untouched hub.
pub fn spawn_instance(
    config: &ServiceConfig,
    hub: Arc<LogHub>,
    events: broadcast::Sender<StatusEvent>,
) -> Result<Arc<Instance>> {
    if let Some(dir) = config.dir.as_deref()
        && !dir.is_dir()
    {
        return Err(ProcwatchError::InvalidWorkingDirectory {
            service: config.id.clone(),
            dir: dir.display().to_string(),
        });
    }

    // The configured command is an opaque shell line; hand it to the
    // platform shell untouched.
    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(&config.command);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(&config.command);
        c
    };

    if let Some(dir) = config.dir.as_deref() {
        cmd.current_dir(dir);
    }
    cmd.envs(&config.env);
    for (key, value) in FORCED_ENV {
        cmd.env(key, value);
    }

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(unix)]
    {
        unsafe {
            cmd.pre_exec(|| {
                // Own session => child pid is the pgid for the whole tree.
                if libc::setsid() == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
    }

    let mut child = cmd.spawn().map_err(|e| ProcwatchError::SpawnFailure {
        service: config.id.clone(),
        reason: e.to_string(),
    })?;

    let pid = child.id().ok_or_else(|| ProcwatchError::SpawnFailure {
        service: config.id.clone(),
        reason: "child exited before a pid could be captured".to_string(),
    })?;

    info!(service = %config.id, pid, cmd = %config.command, "spawned service process");

    let (status_tx, status_rx) = watch::channel(ServiceStatus::Starting);
    let (force_tx, force_rx) = oneshot::channel();

    let instance = Arc::new(Instance {
        service_id: config.id.clone(),
        state: Mutex::new(InstanceState {
            status: ServiceStatus::Starting,
            pid: Some(pid),
            pgid: Some(pid as i32),
            started_at: SystemTime::now(),
            last_error: None,
            force_kill: Some(force_tx),
            status_tx,
        }),
        status_rx,
        events,
    });

    instance.lock_state().publish(&instance.service_id, &instance.events);

    // Fresh instance, fresh buffer: clear before the readers attach so the
    // first line this process writes is also the first entry in the ring.
    // History from a previous instance is deliberately not carried over.
    hub.reset();

    let readers = vec![
        spawn_stream_reader(&config.id, StreamKind::Stdout, child.stdout.take(), &hub),
        spawn_stream_reader(&config.id, StreamKind::Stderr, child.stderr.take(), &hub),
    ];

    tokio::spawn(monitor(Arc::clone(&instance), child, force_rx, readers));

    Ok(instance)
}

fn spawn_stream_reader(
    service_id: &str,
    stream: StreamKind,
    pipe: Option<impl tokio::io::AsyncRead + Unpin + Send + 'static>,
    hub: &Arc<LogHub>,
) -> JoinHandle<()> {
    let Some(pipe) = pipe else {
        warn!(service = %service_id, ?stream, "no pipe for stream; output will be lost");
        return tokio::spawn(async {});
    };

    let hub = Arc::clone(hub);
    let service_id = service_id.to_string();
    tokio::spawn(async move {
        let reader = BufReader::new(pipe);
        let mut lines = reader.lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => hub.append(LogEntry::now(stream, line)),
                Ok(None) => break,
                Err(e) => {
                    // Typically invalid UTF-8 in the output; capture for
                    // this stream ends here, the other stream and the
                    // process itself are unaffected.
                    warn!(service = %service_id, ?stream, error = %e, "stream read failed; capture stopped");
                    break;
                }
            }
        }
        debug!(service = %service_id, ?stream, "stream reader ended");
    })
}

/// Wait (bounded) for the reader tasks to finish so the ring holds every
/// buffered line before the terminal status goes out.
///
/// Readers that are still alive at the deadline (an orphaned descendant
/// holding the pipe's write end open) are aborted: once the terminal status
/// is published this instance must not append into the ring again, or a
/// later instance's fresh buffer would pick up stale lines.
async fn drain_readers(readers: Vec<JoinHandle<()>>) {
    let deadline = tokio::time::Instant::now() + OUTPUT_DRAIN;
    for mut handle in readers {
        if tokio::time::timeout_at(deadline, &mut handle).await.is_err() {
            handle.abort();
        }
    }
}

/// Owns the `Child` exclusively: confirms the running transition, reaps the
/// exit, and applies the terminal transition.
async fn monitor(
    instance: Arc<Instance>,
    mut child: Child,
    mut force_rx: oneshot::Receiver<()>,
    readers: Vec<JoinHandle<()>>,
) {
    // Spawn came back with a live pid, so the process is executing; unless a
    // stop raced us there first, we are now running.
    {
        let mut st = instance.lock_state();
        if st.status == ServiceStatus::Starting {
            st.status = ServiceStatus::Running;
            st.publish(&instance.service_id, &instance.events);
        }
    }

    tokio::select! {
        status_res = child.wait() => {
            drain_readers(readers).await;

            let mut st = instance.lock_state();
            let was_stopping = st.status == ServiceStatus::Stopping;
            st.pid = None;
            st.force_kill = None;

            match status_res {
                // Exit during `stopping` is the confirmation we asked for,
                // whatever the code; the tree died in response to our signal.
                Ok(_) if was_stopping => {
                    st.status = ServiceStatus::Stopped;
                    info!(service = %instance.service_id, "service stopped");
                }
                Ok(status) if status.success() => {
                    st.status = ServiceStatus::Stopped;
                    info!(service = %instance.service_id, "service exited cleanly");
                }
                Ok(status) => {
                    st.status = ServiceStatus::Error;
                    st.last_error = Some(exit_description(status));
                    warn!(
                        service = %instance.service_id,
                        error = %st.last_error.as_deref().unwrap_or_default(),
                        "service exited abnormally"
                    );
                }
                Err(e) => {
                    st.status = ServiceStatus::Error;
                    st.last_error = Some(format!("wait failed: {e}"));
                    warn!(service = %instance.service_id, error = %e, "failed to reap service process");
                }
            }

            st.publish(&instance.service_id, &instance.events);
        }

        _ = &mut force_rx => {
            // Escalation path: the group SIGKILL (on Unix) should already
            // have landed; killing the direct child covers the rest and
            // reaps it.
            match child.kill().await {
                Ok(()) => {
                    drain_readers(readers).await;

                    let mut st = instance.lock_state();
                    st.pid = None;
                    st.force_kill = None;
                    st.status = ServiceStatus::Stopped;
                    info!(service = %instance.service_id, "service force-killed");
                    st.publish(&instance.service_id, &instance.events);
                }
                Err(e) => {
                    // Not reaped, so not `Stopped`: leave the status at
                    // `Stopping` and let the stop path time out waiting for
                    // a terminal state and report the termination failure.
                    warn!(service = %instance.service_id, error = %e, "force kill of child failed");
                    drain_readers(readers).await;
                }
            }
        }
    }
}

fn exit_description(status: std::process::ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exited with code {code}"),
        None => {
            #[cfg(unix)]
            {
                use std::os::unix::process::ExitStatusExt;
                if let Some(sig) = status.signal() {
                    return format!("terminated by signal {sig}");
                }
            }
            "terminated without exit code".to_string()
        }
    }
}

impl Instance {
    fn lock_state(&self) -> std::sync::MutexGuard<'_, InstanceState> {
        self.state.lock().expect("instance state lock poisoned")
    }

    pub fn status(&self) -> ServiceStatus {
        self.lock_state().status
    }

    /// Live fields for `ServiceSummary`.
    pub fn snapshot(&self) -> (ServiceStatus, Option<u32>, SystemTime, Option<String>) {
        let st = self.lock_state();
        (st.status, st.pid, st.started_at, st.last_error.clone())
    }

    /// Mark the instance `Stopping` and hand back the pgid to signal.
    ///
    /// Rejected with `AlreadyStopping` / `NotRunning` when another caller's
    /// stop is in flight or the instance is already terminal.
    fn begin_stop(&self) -> Result<i32> {
        let mut st = self.lock_state();
        match st.status {
            ServiceStatus::Starting | ServiceStatus::Running => {
                let pgid = st.pgid.ok_or_else(|| ProcwatchError::TerminationFailure {
                    service: self.service_id.clone(),
                    reason: "no process group recorded".to_string(),
                })?;
                st.status = ServiceStatus::Stopping;
                st.publish(&self.service_id, &self.events);
                Ok(pgid)
            }
            ServiceStatus::Stopping => {
                Err(ProcwatchError::AlreadyStopping(self.service_id.clone()))
            }
            ServiceStatus::Stopped | ServiceStatus::Error => {
                Err(ProcwatchError::NotRunning(self.service_id.clone()))
            }
        }
    }

    /// Wait until the instance reaches `Stopped`/`Error`, bounded by
    /// `timeout`. Returns false on timeout.
    pub async fn wait_terminal(&self, timeout: Duration) -> bool {
        let mut rx = self.status_rx.clone();
        matches!(
            tokio::time::timeout(timeout, rx.wait_for(|s| s.is_terminal())).await,
            Ok(Ok(_))
        )
    }

    fn request_force_kill(&self) {
        if let Some(tx) = self.lock_state().force_kill.take() {
            let _ = tx.send(());
        }
    }

    fn mark_termination_failure(&self, reason: &str) {
        let mut st = self.lock_state();
        st.status = ServiceStatus::Error;
        st.pid = None;
        st.last_error = Some(reason.to_string());
        st.publish(&self.service_id, &self.events);
    }
}

/// Stop a running instance: graceful signal to the whole tree, bounded wait,
/// then SIGKILL escalation against the same tree.
///
/// Blocks the caller until the tree is confirmed terminated (worst case:
/// grace period + kill-confirmation window). Callers must treat `stop` as
/// having that latency, not as instantaneous.
pub async fn stop_instance(
    instance: &Arc<Instance>,
    grace_period: Duration,
    kill_confirm: Duration,
) -> Result<()> {
    let pgid = instance.begin_stop()?;

    info!(service = %instance.service_id, pgid, "stopping service (graceful)");
    if let Err(e) = kill::terminate_tree(pgid) {
        warn!(service = %instance.service_id, error = %e, "graceful signal failed");
    }

    if instance.wait_terminal(grace_period).await {
        return Ok(());
    }

    warn!(
        service = %instance.service_id,
        grace_secs = grace_period.as_secs_f64(),
        "grace period elapsed; escalating to SIGKILL"
    );
    let kill_err = kill::kill_tree(pgid).err();
    instance.request_force_kill();

    if instance.wait_terminal(kill_confirm).await {
        return Ok(());
    }

    let reason = match kill_err {
        Some(e) => format!("forceful kill failed: {e}"),
        None => "process tree did not terminate after SIGKILL".to_string(),
    };
    instance.mark_termination_failure(&reason);
    Err(ProcwatchError::TerminationFailure {
        service: instance.service_id.clone(),
        reason,
    })
}
