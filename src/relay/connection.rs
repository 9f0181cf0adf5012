//! Connection - drives one relay session.
//!
//! Each connection runs in its own Tokio task:
//!
//! ```text
//! TcpStream / TlsStream
//!        │
//!   Framed<RelayCodec>        (binary frames in, command lines out)
//!        │
//!   tokio::select!
//!    ├── inbound frame → SessionMachine::classify → Mirror::apply_* → events
//!    └── client command → SessionMachine / outbound request
//! ```
//!
//! The codec, session machine and mirror are all built fresh for every
//! connection; no framing or correlation state survives a reconnect.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig as TlsClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tokio_util::codec::Framed;
use tracing::{debug, info, instrument, warn};
use weerelay_proto::{
    Command, Message, RelayCodec, Request, ResponseKind, Routing, SessionAction, SessionMachine,
};

use crate::config::RelayConfig;
use crate::error::{ClientError, ClientResult};
use crate::event::RelayEvent;
use crate::relay::ClientCommand;
use crate::state::Mirror;

/// A relay transport stream: plain TCP or client TLS.
pub(crate) enum RelayStream {
    /// Plain TCP stream.
    Tcp(TcpStream),
    /// Client-side TLS stream (boxed for size).
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl tokio::io::AsyncRead for RelayStream {
    fn poll_read(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(inner) => std::pin::Pin::new(inner).poll_read(cx, buf),
            Self::Tls(inner) => std::pin::Pin::new(inner).poll_read(cx, buf),
        }
    }
}

impl tokio::io::AsyncWrite for RelayStream {
    fn poll_write(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        match self.get_mut() {
            Self::Tcp(inner) => std::pin::Pin::new(inner).poll_write(cx, buf),
            Self::Tls(inner) => std::pin::Pin::new(inner).poll_write(cx, buf),
        }
    }

    fn poll_flush(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(inner) => std::pin::Pin::new(inner).poll_flush(cx),
            Self::Tls(inner) => std::pin::Pin::new(inner).poll_flush(cx),
        }
    }

    fn poll_shutdown(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(inner) => std::pin::Pin::new(inner).poll_shutdown(cx),
            Self::Tls(inner) => std::pin::Pin::new(inner).poll_shutdown(cx),
        }
    }
}

/// Open the transport for a configuration: TCP connect, then the TLS
/// handshake when enabled.
pub(crate) async fn connect_transport(config: &RelayConfig) -> ClientResult<RelayStream> {
    let stream = TcpStream::connect(config.address()).await?;
    if let Err(e) = enable_keepalive(&stream) {
        warn!("failed to enable TCP keepalive: {}", e);
    }

    if !config.tls {
        return Ok(RelayStream::Tcp(stream));
    }

    let mut roots = RootCertStore::empty();
    let native = rustls_native_certs::load_native_certs();
    for error in &native.errors {
        warn!("native root certificate error: {}", error);
    }
    for cert in native.certs {
        if let Err(e) = roots.add(cert) {
            warn!("skipping unusable root certificate: {}", e);
        }
    }
    let tls_config = TlsClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let server_name = ServerName::try_from(config.host.clone())
        .map_err(|e| ClientError::Tls(format!("invalid server name {:?}: {e}", config.host)))?;
    let connector = TlsConnector::from(Arc::new(tls_config));
    let tls = connector.connect(server_name, stream).await?;
    Ok(RelayStream::Tls(Box::new(tls)))
}

fn enable_keepalive(stream: &TcpStream) -> std::io::Result<()> {
    use socket2::{SockRef, TcpKeepalive};
    use std::time::Duration;

    let sock = SockRef::from(stream);
    let keepalive = TcpKeepalive::new()
        .with_time(Duration::from_secs(120))
        .with_interval(Duration::from_secs(30));

    sock.set_tcp_keepalive(&keepalive)
}

/// One relay session over an established transport.
pub(crate) struct Connection {
    config: RelayConfig,
    machine: SessionMachine,
    mirror: Arc<RwLock<Mirror>>,
    events: mpsc::UnboundedSender<RelayEvent>,
    commands: mpsc::UnboundedReceiver<ClientCommand>,
}

impl Connection {
    pub(crate) fn new(
        config: RelayConfig,
        mirror: Arc<RwLock<Mirror>>,
        events: mpsc::UnboundedSender<RelayEvent>,
        commands: mpsc::UnboundedReceiver<ClientCommand>,
    ) -> Connection {
        let machine = SessionMachine::new(config.session_config());
        Connection {
            config,
            machine,
            mirror,
            events,
            commands,
        }
    }

    /// Run the session until disconnect or failure.
    ///
    /// Always ends with a [`RelayEvent::Disconnected`] carrying the reason;
    /// errors are additionally logged with their stable code. Failures are
    /// consumed here - the task itself completes normally.
    #[instrument(skip_all, fields(host = %self.config.host, port = self.config.port), name = "relay")]
    pub(crate) async fn run(mut self, stream: RelayStream) -> anyhow::Result<()> {
        let result = self.drive(stream).await;
        // The failure path skips the graceful quit but still passes
        // through Closing before the machine resets.
        let _ = self.machine.begin_close();
        self.machine.transport_closed();

        let reason = match &result {
            Ok(()) => {
                info!("session closed");
                "disconnect requested".to_string()
            }
            Err(e) => {
                warn!(code = e.error_code(), error = %e, "session ended");
                e.to_string()
            }
        };
        let _ = self.events.send(RelayEvent::Disconnected { reason });
        Ok(())
    }

    async fn drive(&mut self, stream: RelayStream) -> ClientResult<()> {
        self.machine.connect_started();
        let mut framed = Framed::new(stream, RelayCodec::new());

        // Handshake: send init, then advance optimistically - the relay
        // never acknowledges it.
        let actions = self.machine.transport_ready();
        self.send_actions(&mut framed, actions).await?;
        self.machine.init_sent();

        // Subscriptions.
        let actions = self.machine.begin_sync();
        self.send_actions(&mut framed, actions).await?;
        let _ = self.events.send(RelayEvent::Connected);

        loop {
            tokio::select! {
                frame = framed.next() => match frame {
                    Some(Ok(message)) => {
                        self.handle_message(&mut framed, message).await?;
                    }
                    Some(Err(e)) => return Err(e.into()),
                    // A close right after init is how the relay rejects a
                    // password; there is no structured auth error.
                    None => return Err(ClientError::ClosedByServer),
                },
                command = self.commands.recv() => match command {
                    Some(ClientCommand::Disconnect) | None => {
                        let actions = self.machine.begin_close();
                        if let Err(e) = self.send_actions(&mut framed, actions).await {
                            debug!(error = %e, "quit not delivered");
                        }
                        return Ok(());
                    }
                    Some(command) => {
                        let actions = self.command_actions(command);
                        self.send_actions(&mut framed, actions).await?;
                    }
                },
            }
        }
    }

    async fn handle_message(
        &mut self,
        framed: &mut Framed<RelayStream, RelayCodec>,
        message: Message,
    ) -> ClientResult<()> {
        // Server upgrade flow: pause the sync, resubscribe when done.
        match message.id() {
            Some("_upgrade") => {
                info!("server upgrade started, desyncing");
                let actions = self.machine.desync_all();
                self.send_actions(framed, actions).await?;
            }
            Some("_upgrade_ended") => {
                info!("server upgrade ended, resyncing");
                let actions = self.machine.begin_sync();
                self.send_actions(framed, actions).await?;
            }
            _ => {}
        }

        let events = self.apply_message(&message)?;
        for event in events {
            let _ = self.events.send(event);
        }
        Ok(())
    }

    /// Route one message through the machine and apply it to the mirror.
    fn apply_message(&mut self, message: &Message) -> ClientResult<Vec<RelayEvent>> {
        let span = crate::telemetry::spans::apply(message.id());
        span.in_scope(|| {
            let mut mirror = self.mirror.write();
            match self.machine.classify(message) {
                Routing::Response(ResponseKind::BufferList) => mirror.apply_buffer_list(message),
                Routing::Response(ResponseKind::HistoryLines { buffer }) => {
                    mirror.apply_history_lines(message, buffer)
                }
                Routing::Response(ResponseKind::Nicklist) => mirror.apply_nicklist(message),
                Routing::Response(ResponseKind::Info) => mirror.apply_info(message),
                Routing::Push => mirror.apply_push(message),
            }
        })
    }

    fn command_actions(&mut self, command: ClientCommand) -> Vec<SessionAction> {
        match command {
            ClientCommand::Input { buffer, data } => {
                vec![SessionAction::Send(Box::new(Request::new(
                    Command::Input { buffer, data },
                )))]
            }
            ClientCommand::FetchHistory { buffer, lines } => {
                self.machine.request_history(buffer, lines)
            }
            ClientCommand::FetchInfo { name } => self.machine.request_info(&name),
            ClientCommand::Sync { buffers } => {
                vec![SessionAction::Send(Box::new(Request::new(Command::Sync {
                    buffers,
                })))]
            }
            ClientCommand::Desync { buffers } => {
                vec![SessionAction::Send(Box::new(Request::new(
                    Command::Desync { buffers },
                )))]
            }
            // Handled in the select loop.
            ClientCommand::Disconnect => vec![],
        }
    }

    async fn send_actions(
        &mut self,
        framed: &mut Framed<RelayStream, RelayCodec>,
        actions: Vec<SessionAction>,
    ) -> ClientResult<()> {
        for action in actions {
            let SessionAction::Send(request) = action;
            match request.command {
                // Never log credentials.
                Command::Init { .. } => debug!("sending init"),
                _ => debug!(command = %request, "sending"),
            }
            framed.send(*request).await?;
        }
        Ok(())
    }
}
