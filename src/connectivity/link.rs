//! Network association collaborators

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Network credentials
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub ssid: String,
    pub password: String,
}

impl Credentials {
    pub fn new(ssid: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            ssid: ssid.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("ssid", &self.ssid)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A network interface the uplink can associate
#[async_trait]
pub trait NetworkLink: Send {
    fn name(&self) -> &'static str;

    /// Ask the platform to start associating. Returns once the request is
    /// issued; completion is observed through `is_associated`.
    async fn begin_association(&mut self, credentials: &Credentials) -> Result<()>;

    /// Live association status. Must return promptly.
    async fn is_associated(&mut self) -> bool;
}

/// Wi-Fi link managed through NetworkManager
///
/// Status comes from the kernel's `operstate` for the interface. Association
/// requests go to `nmcli`, which runs in the background while the caller
/// polls status.
pub struct WifiLink {
    interface: String,
    sysfs_root: PathBuf,
    program: String,
    pending: Option<Child>,
}

impl WifiLink {
    pub fn new(interface: impl Into<String>, sysfs_root: impl Into<PathBuf>) -> Self {
        Self {
            interface: interface.into(),
            sysfs_root: sysfs_root.into(),
            program: "nmcli".into(),
            pending: None,
        }
    }

    /// Use a different association command in place of `nmcli`
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn operstate_path(&self) -> PathBuf {
        self.sysfs_root.join(&self.interface).join("operstate")
    }

    /// Reap or cancel a previous association request
    fn settle_pending(&mut self) {
        let Some(mut child) = self.pending.take() else {
            return;
        };
        match child.try_wait() {
            Ok(Some(status)) if !status.success() => {
                warn!("[{}] Previous association request exited with {}", self.interface, status);
            }
            Ok(Some(_)) => {}
            Ok(None) => {
                debug!("[{}] Cancelling stale association request", self.interface);
                if let Err(e) = child.start_kill() {
                    warn!("[{}] Failed to cancel association request: {}", self.interface, e);
                }
            }
            Err(e) => warn!("[{}] Failed to poll association request: {}", self.interface, e),
        }
    }
}

#[async_trait]
impl NetworkLink for WifiLink {
    fn name(&self) -> &'static str {
        "Wi-Fi"
    }

    async fn begin_association(&mut self, credentials: &Credentials) -> Result<()> {
        if credentials.ssid.is_empty() {
            return Err(anyhow!("no SSID configured"));
        }
        self.settle_pending();

        let child = Command::new(&self.program)
            .args(["device", "wifi", "connect", credentials.ssid.as_str()])
            .args(["password", credentials.password.as_str()])
            .args(["ifname", self.interface.as_str()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to run {}", self.program))?;

        debug!("[{}] Association requested for {:?}", self.interface, credentials.ssid);
        self.pending = Some(child);
        Ok(())
    }

    async fn is_associated(&mut self) -> bool {
        match tokio::fs::read_to_string(self.operstate_path()).await {
            Ok(state) => state.trim() == "up",
            Err(e) => {
                debug!("[{}] operstate unavailable: {}", self.interface, e);
                false
            }
        }
    }
}
