//! Viewer sidecar launch, once per process.
//!
//! The sidecar renders the agent's view and serves it on a fixed loopback
//! address. It offers no readiness signal, so after a successful launch the
//! launcher arms a settle timer that opens the [`ReadinessGate`] for the
//! session that requested it.
//!
//! Launch state is process-wide. Sessions come and go; the sidecar is
//! started once. A failed launch resets the state so the next session can
//! try again.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::{LookoutError, Result};
use crate::gate::{ReadinessGate, SessionToken};
use crate::session::SessionId;

/// Loopback address the sidecar binds to.
pub const VIEWER_BIND: SocketAddr = SocketAddr::new(
    std::net::IpAddr::V4(Ipv4Addr::LOCALHOST),
    3001,
);

/// Default wait between launch and opening the gate.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(1500);

// ── Types ───────────────────────────────────────────────────────────

/// Process-wide sidecar state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ViewerLaunchState {
    NotStarted = 0,
    Starting = 1,
    Ready = 2,
}

impl ViewerLaunchState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::NotStarted,
            1 => Self::Starting,
            _ => Self::Ready,
        }
    }
}

/// Camera mode of the rendered view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewMode {
    #[default]
    ThirdPerson,
    FirstPerson,
}

impl ViewMode {
    pub fn is_first_person(self) -> bool {
        self == Self::FirstPerson
    }
}

/// How the sidecar should serve the view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerOptions {
    pub bind: SocketAddr,
    pub view_mode: ViewMode,
}

impl Default for ViewerOptions {
    fn default() -> Self {
        Self {
            bind: VIEWER_BIND,
            view_mode: ViewMode::default(),
        }
    }
}

/// The session a launch is performed for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: SessionId,
    pub token: SessionToken,
    pub username: String,
    pub host: String,
    pub port: u16,
}

/// Result of [`ViewerLauncher::ensure_started`].
#[derive(Debug)]
pub enum LaunchOutcome {
    /// The sidecar was launched for this session.
    Launched,
    /// A launch already happened or is in progress; only a settle timer was
    /// armed for this session.
    AlreadyStarted,
    /// The launch failed; state is back to `NotStarted`.
    Failed(LookoutError),
}

// ── Sidecar ─────────────────────────────────────────────────────────

/// The external rendering process.
#[async_trait]
pub trait Sidecar: Send + Sync + 'static {
    /// Start serving the view of `session` as described by `options`.
    ///
    /// # Errors
    ///
    /// Returns [`LookoutError::ViewerLaunch`] if the sidecar could not start.
    async fn launch(&self, session: &SessionInfo, options: &ViewerOptions) -> Result<()>;

    /// Whether the launched sidecar is still running. Checked when the
    /// settle delay elapses.
    async fn is_alive(&self) -> bool {
        true
    }
}

/// Runs the sidecar as a child process.
///
/// The child receives its configuration through the environment:
/// `VIEWER_HOST`, `VIEWER_PORT`, `VIEWER_FIRST_PERSON`, `MC_USERNAME`,
/// `MC_HOST` and `MC_PORT`. It is killed when the `ProcessSidecar` drops.
#[derive(Debug)]
pub struct ProcessSidecar {
    program: String,
    args: Vec<String>,
    child: Mutex<Option<Child>>,
}

impl ProcessSidecar {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            child: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// OS process id of the running sidecar, if any.
    pub async fn pid(&self) -> Option<u32> {
        self.child.lock().await.as_ref().and_then(Child::id)
    }
}

#[async_trait]
impl Sidecar for ProcessSidecar {
    async fn launch(&self, session: &SessionInfo, options: &ViewerOptions) -> Result<()> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .env("VIEWER_HOST", options.bind.ip().to_string())
            .env("VIEWER_PORT", options.bind.port().to_string())
            .env(
                "VIEWER_FIRST_PERSON",
                options.view_mode.is_first_person().to_string(),
            )
            .env("MC_USERNAME", &session.username)
            .env("MC_HOST", &session.host)
            .env("MC_PORT", session.port.to_string())
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| LookoutError::ViewerLaunch(format!("{}: {e}", self.program)))?;

        if let Some(status) = child.try_wait()? {
            return Err(LookoutError::ViewerLaunch(format!(
                "{} exited immediately with {status}",
                self.program
            )));
        }

        debug!(pid = ?child.id(), program = %self.program, "viewer sidecar spawned");
        *self.child.lock().await = Some(child);
        Ok(())
    }

    async fn is_alive(&self) -> bool {
        let mut child = self.child.lock().await;
        match child.as_mut().map(Child::try_wait) {
            Some(Ok(None)) => true,
            Some(Ok(Some(status))) => {
                warn!(program = %self.program, %status, "viewer sidecar exited");
                *child = None;
                false
            }
            Some(Err(e)) => {
                warn!(program = %self.program, "viewer sidecar status unknown: {e}");
                false
            }
            None => false,
        }
    }
}

// ── Launcher ────────────────────────────────────────────────────────

/// Starts the sidecar at most once and arms the readiness gate.
pub struct ViewerLauncher {
    state: AtomicU8,
    sidecar: Arc<dyn Sidecar>,
    gate: Arc<ReadinessGate>,
    options: ViewerOptions,
    settle_delay: Duration,
}

impl ViewerLauncher {
    pub fn new(sidecar: Arc<dyn Sidecar>, gate: Arc<ReadinessGate>, options: ViewerOptions) -> Self {
        Self {
            state: AtomicU8::new(ViewerLaunchState::NotStarted as u8),
            sidecar,
            gate,
            options,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }

    #[must_use]
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn state(&self) -> ViewerLaunchState {
        ViewerLaunchState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn options(&self) -> &ViewerOptions {
        &self.options
    }

    /// Launch the sidecar unless a launch already happened.
    ///
    /// Either way, on success a settle timer is armed for `session.token`;
    /// the gate opens when it fires if that session is still the active one.
    pub async fn ensure_started(self: &Arc<Self>, session: &SessionInfo) -> LaunchOutcome {
        let claimed = self.state.compare_exchange(
            ViewerLaunchState::NotStarted as u8,
            ViewerLaunchState::Starting as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        if claimed.is_err() {
            debug!(token = %session.token, "viewer already started; skipping launch");
            self.arm_settle(session.token);
            return LaunchOutcome::AlreadyStarted;
        }

        info!(
            bind = %self.options.bind,
            first_person = self.options.view_mode.is_first_person(),
            "starting viewer"
        );

        match self.sidecar.launch(session, &self.options).await {
            Ok(()) => {
                self.arm_settle(session.token);
                LaunchOutcome::Launched
            }
            Err(e) => {
                self.state
                    .store(ViewerLaunchState::NotStarted as u8, Ordering::Release);
                error!("viewer failed to start: {e}");
                LaunchOutcome::Failed(e)
            }
        }
    }

    /// Arm a timer that marks the sidecar ready and opens the gate for
    /// `token`. Timers are never cancelled; the gate ignores stale tokens.
    ///
    /// A sidecar found dead when the timer fires resets the state to
    /// `NotStarted` and leaves the gate closed, so the next session
    /// launches again.
    fn arm_settle(self: &Arc<Self>, token: SessionToken) {
        let launcher = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(launcher.settle_delay).await;
            if !launcher.sidecar.is_alive().await {
                launcher
                    .state
                    .store(ViewerLaunchState::NotStarted as u8, Ordering::Release);
                error!(%token, "viewer exited before becoming ready");
                return;
            }
            let _ = launcher.state.compare_exchange(
                ViewerLaunchState::Starting as u8,
                ViewerLaunchState::Ready as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
            launcher.gate.open_for(token);
        });
    }
}

impl std::fmt::Debug for ViewerLauncher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewerLauncher")
            .field("state", &self.state())
            .field("options", &self.options)
            .field("settle_delay", &self.settle_delay)
            .finish()
    }
}
