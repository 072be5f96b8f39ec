use russh::keys::PublicKey;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// How the relay decides whether to trust a remote host key.
#[derive(Debug, Clone)]
pub enum HostKeyPolicy {
    /// Development only: skip verification entirely.
    AcceptAny,
    /// Compare against a known_hosts file (`None` = `~/.ssh/known_hosts`).
    KnownHosts(Option<PathBuf>),
}

/// russh client handler for one outbound relay connection.
pub struct RelayClientHandler {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
    banners: mpsc::Sender<String>,
}

impl RelayClientHandler {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        policy: HostKeyPolicy,
        banners: mpsc::Sender<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            policy,
            banners,
        }
    }
}

impl russh::client::Handler for RelayClientHandler {
    type Error = russh::Error;

    async fn check_server_key(&mut self, server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        let known = match &self.policy {
            HostKeyPolicy::AcceptAny => {
                debug!(host = %self.host, "Host key accepted without verification");
                return Ok(true);
            }
            HostKeyPolicy::KnownHosts(Some(path)) => {
                russh::keys::check_known_hosts_path(&self.host, self.port, server_public_key, path)
            }
            HostKeyPolicy::KnownHosts(None) => {
                russh::keys::check_known_hosts(&self.host, self.port, server_public_key)
            }
        };
        match known {
            Ok(true) => Ok(true),
            Ok(false) => {
                warn!(host = %self.host, port = self.port, "Host key not in known_hosts, rejected");
                Ok(false)
            }
            Err(e) => {
                warn!(host = %self.host, port = self.port, error = %e, "Host key check failed, rejected");
                Ok(false)
            }
        }
    }

    async fn auth_banner(
        &mut self,
        banner: &str,
        _session: &mut russh::client::Session,
    ) -> Result<(), Self::Error> {
        debug!(host = %self.host, "SSH banner received");
        if self.banners.try_send(banner.to_string()).is_err() {
            debug!(host = %self.host, "Banner dropped");
        }
        Ok(())
    }
}
