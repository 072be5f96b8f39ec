use webssh_relay::config::types::AppConfig;
use webssh_relay::context::AppContext;
use webssh_relay::server::{self, ShutdownOutcome};

use futures_util::{SinkExt, StreamExt};
use russh::keys::{PrivateKey, PublicKey};
use russh::server::{Auth, Msg, Session};
use russh::{Channel, ChannelId, CryptoVec, MethodKind, MethodSet};
use std::borrow::Cow;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::time::{sleep, timeout, Duration};
use tokio_tungstenite::tungstenite::Message;

pub type WsClient =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

pub const TEST_USER: &str = "testuser";
pub const TEST_PASSWORD: &str = "secret";

/// Get an OS-assigned free port
pub async fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Holds references to a running echo SSH server
pub struct TestSshServer {
    pub port: u16,
    pub _task: tokio::task::JoinHandle<()>,
}

/// Holds references to a running relay
pub struct TestRelay {
    pub port: u16,
    pub ctx: Arc<AppContext>,
    pub task: tokio::task::JoinHandle<anyhow::Result<ShutdownOutcome>>,
}

impl TestRelay {
    pub fn ws_url(&self, query: &str) -> String {
        format!("ws://127.0.0.1:{}/ws?{}", self.port, query)
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }
}

/// How the test SSH server behaves beyond plain echo.
#[derive(Clone, Default)]
pub struct SshBehavior {
    /// Enables public key auth for this key.
    pub authorized_key: Option<PublicKey>,
    /// Answer the shell request with a channel failure.
    pub refuse_shell: bool,
    /// Refuse passwords, offer keyboard-interactive, then refuse that too
    /// after one prompt round.
    pub keyboard_interactive: bool,
    /// Userauth banner sent before authentication completes.
    pub banner: Option<String>,
    /// Bytes written to the channel as soon as the shell opens.
    pub greeting: Option<Vec<u8>>,
}

/// SSH server that accepts `testuser`/`secret` (and optionally one public key)
/// and echoes every byte written to its shell. Writing `exit` closes the shell.
struct EchoServer {
    behavior: SshBehavior,
}

impl russh::server::Server for EchoServer {
    type Handler = EchoHandler;

    fn new_client(&mut self, _peer_addr: Option<std::net::SocketAddr>) -> EchoHandler {
        EchoHandler {
            behavior: self.behavior.clone(),
        }
    }
}

struct EchoHandler {
    behavior: SshBehavior,
}

fn reject() -> Auth {
    Auth::Reject {
        proceed_with_methods: Some(MethodSet::from(
            [MethodKind::Password, MethodKind::PublicKey].as_slice(),
        )),
    }
}

impl russh::server::Handler for EchoHandler {
    type Error = anyhow::Error;

    async fn authentication_banner(&mut self) -> Result<Option<String>, Self::Error> {
        Ok(self.behavior.banner.clone())
    }

    async fn auth_password(&mut self, user: &str, password: &str) -> Result<Auth, Self::Error> {
        if self.behavior.keyboard_interactive {
            return Ok(Auth::Reject {
                proceed_with_methods: Some(MethodSet::from(
                    [MethodKind::KeyboardInteractive].as_slice(),
                )),
            });
        }
        if user == TEST_USER && password == TEST_PASSWORD {
            Ok(Auth::Accept)
        } else {
            Ok(reject())
        }
    }

    async fn auth_keyboard_interactive<'a>(
        &'a mut self,
        _user: &str,
        _submethods: &str,
        response: Option<russh::server::Response<'a>>,
    ) -> Result<Auth, Self::Error> {
        match response {
            None => Ok(Auth::Partial {
                name: Cow::Borrowed(""),
                instructions: Cow::Borrowed(""),
                prompts: Cow::Owned(vec![(Cow::Borrowed("Verification code: "), false)]),
            }),
            Some(_) => Ok(Auth::Reject {
                proceed_with_methods: None,
            }),
        }
    }

    async fn auth_publickey(
        &mut self,
        user: &str,
        public_key: &PublicKey,
    ) -> Result<Auth, Self::Error> {
        match &self.behavior.authorized_key {
            Some(key) if user == TEST_USER && key.key_data() == public_key.key_data() => {
                Ok(Auth::Accept)
            }
            _ => Ok(reject()),
        }
    }

    async fn channel_open_session(
        &mut self,
        _channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }

    async fn pty_request(
        &mut self,
        channel: ChannelId,
        _term: &str,
        _col_width: u32,
        _row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _modes: &[(russh::Pty, u32)],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let _ = session.channel_success(channel);
        Ok(())
    }

    async fn shell_request(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        if self.behavior.refuse_shell {
            let _ = session.channel_failure(channel);
            return Ok(());
        }
        let _ = session.channel_success(channel);
        if let Some(greeting) = &self.behavior.greeting {
            let _ = session.data(channel, CryptoVec::from_slice(greeting));
        }
        Ok(())
    }

    async fn data(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        if data.starts_with(b"exit") {
            let _ = session.exit_status_request(channel, 0);
            let _ = session.eof(channel);
            let _ = session.close(channel);
            return Ok(());
        }
        let _ = session.data(channel, CryptoVec::from_slice(data));
        Ok(())
    }
}

/// Start the echo SSH server. `authorized_key` enables public key auth.
pub async fn start_echo_ssh(authorized_key: Option<PublicKey>) -> TestSshServer {
    start_ssh(SshBehavior {
        authorized_key,
        ..Default::default()
    })
    .await
}

pub async fn start_ssh(behavior: SshBehavior) -> TestSshServer {
    let port = free_port().await;
    let addr = format!("127.0.0.1:{port}");

    let key_pair =
        PrivateKey::random(&mut rand::rngs::OsRng, russh::keys::Algorithm::Ed25519).unwrap();
    let mut ssh_config = russh::server::Config::default();
    ssh_config.keys.push(key_pair);
    ssh_config.server_id = russh::SshId::Standard("SSH-2.0-relay_e2e_test".to_string());
    ssh_config.auth_rejection_time = Duration::from_millis(100);
    ssh_config.auth_rejection_time_initial = Some(Duration::from_millis(0));
    let ssh_config = Arc::new(ssh_config);

    let task = tokio::spawn(async move {
        use russh::server::Server as _;
        let mut server = EchoServer { behavior };
        let _ = server.run_on_address(ssh_config, &addr as &str).await;
    });

    wait_for_port(port).await;
    TestSshServer { port, _task: task }
}

/// A TCP server that accepts connections and never speaks.
pub async fn start_silent_server() -> (u16, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let task = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    (port, task)
}

async fn wait_for_port(port: u16) {
    for _ in 0..50 {
        if tokio::net::TcpStream::connect(format!("127.0.0.1:{port}"))
            .await
            .is_ok()
        {
            break;
        }
        sleep(Duration::from_millis(50)).await;
    }
}

/// Relay config pointed at a local SSH port. The key path does not exist
/// unless the test creates it.
pub fn relay_config(ssh_port: u16, key_path: PathBuf) -> AppConfig {
    let mut config = AppConfig::default();
    config.server.listen = "127.0.0.1:0".to_string();
    config.server.shutdown_timeout = 2;
    config.relay.ssh_port = ssh_port;
    config.relay.accept_any_host_key = true;
    config.relay.private_key_path = key_path;
    config.relay.establish_timeout = 5;
    config.relay.report_interval = 0;
    config.relay.keepalive_interval = 0;
    config
}

/// Start the relay on a pre-bound listener (avoids TOCTOU port races).
pub async fn start_relay(config: AppConfig) -> TestRelay {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let ctx = Arc::new(AppContext::new(config));
    let task = tokio::spawn(server::serve(ctx.clone(), listener));
    wait_for_port(port).await;
    TestRelay { port, ctx, task }
}

pub async fn ws_connect(url: &str) -> WsClient {
    let (ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    ws
}

pub async fn ws_send(ws: &mut WsClient, text: &str) {
    ws.send(Message::Text(text.into())).await.unwrap();
}

/// Read frames until the accumulated text contains `needle`, the socket
/// closes or `wait` elapses. Returns everything read.
pub async fn read_until(ws: &mut WsClient, needle: &str, wait: Duration) -> String {
    let mut acc = String::new();
    let _ = timeout(wait, async {
        while let Some(Ok(msg)) = ws.next().await {
            match msg {
                Message::Text(t) => acc.push_str(t.as_str()),
                Message::Binary(b) => acc.push_str(&String::from_utf8_lossy(&b)),
                Message::Close(_) => break,
                _ => continue,
            }
            if acc.contains(needle) {
                break;
            }
        }
    })
    .await;
    acc
}

pub async fn ws_send_bytes(ws: &mut WsClient, bytes: &[u8]) {
    ws.send(Message::Binary(bytes.to_vec().into())).await.unwrap();
}

/// Collect the raw payload of text and binary frames until `len` bytes
/// have arrived, the socket closes or `wait` elapses.
pub async fn read_bytes(ws: &mut WsClient, len: usize, wait: Duration) -> Vec<u8> {
    let mut acc = Vec::new();
    let _ = timeout(wait, async {
        while acc.len() < len {
            match ws.next().await {
                Some(Ok(Message::Text(t))) => acc.extend_from_slice(t.as_bytes()),
                Some(Ok(Message::Binary(b))) => acc.extend_from_slice(&b),
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    acc
}

/// Read until the relay closes the socket. Returns the text frames seen
/// and whether the close happened inside `wait`.
pub async fn read_to_close(ws: &mut WsClient, wait: Duration) -> (Vec<String>, bool) {
    let mut frames = Vec::new();
    let closed = timeout(wait, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(t))) => frames.push(t.as_str().to_string()),
                Some(Ok(Message::Binary(b))) => {
                    frames.push(String::from_utf8_lossy(&b).into_owned())
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await
    .is_ok();
    (frames, closed)
}

/// Poll until the registry is empty or `wait` elapses.
pub async fn wait_registry_empty(ctx: &AppContext, wait: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + wait;
    while tokio::time::Instant::now() < deadline {
        if ctx.registry.is_empty() {
            return true;
        }
        sleep(Duration::from_millis(50)).await;
    }
    ctx.registry.is_empty()
}
