use super::bridge::Frame;
use super::credentials::AuthStrategy;
use super::error::{banner_notice, established_notice, keyboard_interactive_notice};
use super::RelayError;
use crate::ssh::keys::decode_private_key;
use crate::ssh::{HostKeyPolicy, RelayClientHandler};
use russh::client::{self, AuthResult, KeyboardInteractiveAuthResponse};
use russh::keys::PrivateKeyWithHashAlg;
use russh::{ChannelMsg, Disconnect, MethodKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

const AUTH_METHODS_FAILED: &str = "All configured authentication methods failed";

/// Everything the establisher needs besides the credential.
#[derive(Debug, Clone)]
pub struct EstablishRequest {
    pub session_id: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub host_key_policy: HostKeyPolicy,
    pub keepalive_interval: Option<Duration>,
    pub term: String,
    pub cols: u32,
    pub rows: u32,
}

/// An authenticated connection with an open PTY shell channel.
pub struct RemoteShell {
    pub handle: client::Handle<RelayClientHandler>,
    pub channel: russh::Channel<client::Msg>,
    /// Output that arrived before the shell request was confirmed.
    pub early_output: Vec<u8>,
}

impl RemoteShell {
    /// End the channel and the outbound connection.
    pub async fn shutdown(self) {
        let _ = self.channel.eof().await;
        let _ = self.channel.close().await;
        let _ = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await;
    }
}

/// Connect, authenticate and open an interactive shell.
///
/// Goes through CONNECTING (TCP + key exchange + host key check), READY
/// (authenticated; the success notice goes out here) and SHELL_OPEN (PTY and
/// shell confirmed). Any error is terminal for the session.
pub async fn establish(
    req: &EstablishRequest,
    strategy: &AuthStrategy,
    notices: &mpsc::Sender<Frame>,
) -> Result<RemoteShell, RelayError> {
    let config = client::Config {
        keepalive_interval: req.keepalive_interval,
        keepalive_max: 3,
        ..Default::default()
    };

    let (banner_tx, mut banner_rx) = mpsc::channel(4);
    let handler = RelayClientHandler::new(
        req.host.clone(),
        req.port,
        req.host_key_policy.clone(),
        banner_tx,
    );

    debug!(session_id = %req.session_id, host = %req.host, port = req.port, "Connecting");
    // russh 0.50's client Config has no `nodelay`; set it on the socket and
    // hand it to `connect_stream` (which is what `client::connect` does).
    let connected = async {
        let socket = tokio::net::TcpStream::connect((req.host.as_str(), req.port))
            .await
            .map_err(russh::Error::from)?;
        socket.set_nodelay(true).map_err(russh::Error::from)?;
        client::connect_stream(Arc::new(config), socket, handler).await
    };
    let mut handle = connected
        .await
        .map_err(|e| match e {
            russh::Error::UnknownKey => RelayError::HostKeyRejected(req.host.clone()),
            other => RelayError::Connect(other.to_string()),
        })?;

    let auth = authenticate(&mut handle, &req.username, strategy, notices).await;
    while let Ok(banner) = banner_rx.try_recv() {
        let _ = notices.send(Frame::Text(banner_notice(&banner))).await;
    }
    if let Err(e) = auth {
        let _ = handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await;
        return Err(e);
    }

    info!(
        session_id = %req.session_id,
        host = %req.host,
        user = %req.username,
        "SSH connection established"
    );
    let _ = notices.send(Frame::Text(established_notice())).await;

    match open_shell(&mut handle, req).await {
        Ok((channel, early_output)) => Ok(RemoteShell {
            handle,
            channel,
            early_output,
        }),
        Err(e) => {
            let _ = handle
                .disconnect(Disconnect::ByApplication, "", "en")
                .await;
            Err(e)
        }
    }
}

async fn authenticate(
    handle: &mut client::Handle<RelayClientHandler>,
    username: &str,
    strategy: &AuthStrategy,
    notices: &mpsc::Sender<Frame>,
) -> Result<(), RelayError> {
    match strategy {
        AuthStrategy::Password(password) => {
            let result = handle
                .authenticate_password(username, password.as_str())
                .await?;
            match result {
                AuthResult::Success => Ok(()),
                AuthResult::Failure {
                    remaining_methods, ..
                } if remaining_methods.contains(&MethodKind::KeyboardInteractive) => {
                    keyboard_interactive_once(handle, username, notices).await
                }
                AuthResult::Failure { .. } => {
                    Err(RelayError::AuthRejected(AUTH_METHODS_FAILED.to_string()))
                }
            }
        }
        AuthStrategy::PrivateKey { pem, passphrase } => {
            let key = decode_private_key(pem, passphrase.as_ref().map(|p| p.as_str()))
                .map_err(|e| RelayError::AuthRejected(format!("{:#}", e)))?;
            let hash_alg = handle
                .best_supported_rsa_hash()
                .await
                .unwrap_or(None)
                .flatten();
            let result = handle
                .authenticate_publickey(
                    username,
                    PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg),
                )
                .await?;
            if result.success() {
                Ok(())
            } else {
                Err(RelayError::AuthRejected(AUTH_METHODS_FAILED.to_string()))
            }
        }
    }
}

/// One keyboard-interactive round answered with empty responses. Any
/// further prompt is treated as a rejection.
async fn keyboard_interactive_once(
    handle: &mut client::Handle<RelayClientHandler>,
    username: &str,
    notices: &mpsc::Sender<Frame>,
) -> Result<(), RelayError> {
    let response = handle
        .authenticate_keyboard_interactive_start(username, None::<String>)
        .await?;
    let response = match response {
        KeyboardInteractiveAuthResponse::InfoRequest { prompts, .. } => {
            let _ = notices
                .send(Frame::Text(keyboard_interactive_notice()))
                .await;
            handle
                .authenticate_keyboard_interactive_respond(vec![String::new(); prompts.len()])
                .await?
        }
        other => other,
    };
    match response {
        KeyboardInteractiveAuthResponse::Success => Ok(()),
        _ => Err(RelayError::AuthRejected(AUTH_METHODS_FAILED.to_string())),
    }
}

async fn open_shell(
    handle: &mut client::Handle<RelayClientHandler>,
    req: &EstablishRequest,
) -> Result<(russh::Channel<client::Msg>, Vec<u8>), RelayError> {
    let shell_err = |e: russh::Error| RelayError::Shell(e.to_string());

    let mut channel = handle.channel_open_session().await.map_err(shell_err)?;
    channel
        .request_pty(true, &req.term, req.cols, req.rows, 0, 0, &[])
        .await
        .map_err(shell_err)?;
    channel.request_shell(true).await.map_err(shell_err)?;

    // Replies arrive in request order: PTY first, then shell
    let mut confirmed = 0;
    let mut early_output = Vec::new();
    while confirmed < 2 {
        match channel.wait().await {
            Some(ChannelMsg::Success) => confirmed += 1,
            Some(ChannelMsg::Failure) => {
                let what = if confirmed == 0 { "pty" } else { "shell" };
                return Err(RelayError::Shell(format!("{} request rejected", what)));
            }
            Some(ChannelMsg::Data { data }) | Some(ChannelMsg::ExtendedData { data, .. }) => {
                early_output.extend_from_slice(&data);
            }
            Some(ChannelMsg::Close) | Some(ChannelMsg::Eof) | None => {
                return Err(RelayError::Shell(
                    "channel closed before shell opened".to_string(),
                ));
            }
            Some(_) => {}
        }
    }
    Ok((channel, early_output))
}
