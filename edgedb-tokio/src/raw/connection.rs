use std::collections::HashMap;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;

use edgedb_dsn::Config;
use edgedb_errors::{AuthenticationError, ClientConnectionClosedError, ClientConnectionError};
use edgedb_errors::{ClientConnectionEosError, ClientConnectionTimeoutError, ClientEncodingError};
use edgedb_errors::{Error, ErrorKind, PasswordRequired, ProtocolEncodingError};
use edgedb_errors::ProtocolOutOfOrderError;
use edgedb_protocol::client_message::{ClientHandshake, ClientMessage};
use edgedb_protocol::client_message::{SaslInitialResponse, SaslResponse};
use edgedb_protocol::codec::CodecCache;
use edgedb_protocol::encoding::{Input, Output};
use edgedb_protocol::features::{ProtocolVersion, PROTO_MAJOR, PROTO_MINOR};
use edgedb_protocol::server_message::{Authentication, MessageSeverity, ServerMessage};
use edgedb_protocol::server_message::TransactionState;

use crate::cache::QueryCache;
use crate::raw::framer::{FrameStatus, Framer, MAX_FRAME_SIZE};
use crate::raw::{Connection, Guard, Mode, Stream, DEFAULT_READ_TIMEOUT};
use crate::scram::{ClientTransaction, ScramError, SCRAM_METHOD};
use crate::tls;

impl Connection {
    /// Opens, authenticates and readies a connection, trying the config's
    /// endpoints in order.
    pub async fn connect(
        config: &Config,
        codec_cache: Arc<CodecCache>,
        query_cache: Arc<QueryCache>,
    ) -> Result<Connection, Error> {
        if config.addresses.is_empty() {
            return Err(ClientConnectionError::with_message("no endpoints"));
        }
        let mut last_error = None;
        for (host, port) in &config.addresses {
            match Connection::connect_addr(config, host, *port, &codec_cache, &query_cache).await
            {
                Ok(connection) => return Ok(connection),
                Err(e) => {
                    log::debug!("connection to {host}:{port} failed: {e:#}");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.expect("at least one endpoint was tried"))
    }

    async fn connect_addr(
        config: &Config,
        host: &str,
        port: u16,
        codec_cache: &Arc<CodecCache>,
        query_cache: &Arc<QueryCache>,
    ) -> Result<Connection, Error> {
        let tls_config = tls::client_config(config)?;
        let connector = TlsConnector::from(Arc::new(tls_config));
        let server_name = config.tls_server_name.as_deref().unwrap_or(host);
        let server_name = rustls_pki_types::ServerName::try_from(server_name.to_string())
            .map_err(ClientConnectionError::with_source)?;

        let tcp = timeout(config.connect_timeout, TcpStream::connect((host.to_string(), port)))
            .await
            .map_err(|_| {
                ClientConnectionTimeoutError::with_message(format!(
                    "connection to {host}:{port} timed out"
                ))
            })?
            .map_err(ClientConnectionError::with_source)?;
        tcp.set_nodelay(true)
            .map_err(ClientConnectionError::with_source)?;
        let stream = timeout(config.connect_timeout, connector.connect(server_name, tcp))
            .await
            .map_err(|_| {
                ClientConnectionTimeoutError::with_message(format!(
                    "TLS handshake with {host}:{port} timed out"
                ))
            })?
            .map_err(ClientConnectionError::with_source)?;

        Connection::establish(
            Box::new(stream),
            config.clone(),
            codec_cache.clone(),
            query_cache.clone(),
        )
        .await
    }

    /// Runs the protocol handshake and authentication over an already
    /// connected stream.
    pub(crate) async fn establish(
        stream: Box<dyn Stream>,
        config: Config,
        codec_cache: Arc<CodecCache>,
        query_cache: Arc<QueryCache>,
    ) -> Result<Connection, Error> {
        let mut connection = Connection {
            stream,
            framer: Framer::new(),
            proto: ProtocolVersion::current(),
            mode: Mode::Normal,
            transaction_state: TransactionState::NotInTransaction,
            server_key_data: None,
            server_params: HashMap::new(),
            read_timeout: DEFAULT_READ_TIMEOUT,
            config,
            codec_cache,
            query_cache,
        };
        connection.handshake().await?;
        Ok(connection)
    }

    async fn handshake(&mut self) -> Result<(), Error> {
        let mut params = HashMap::new();
        params.insert(String::from("user"), self.config.user.clone());
        params.insert(String::from("database"), self.config.database.clone());
        self.send_messages(&[ClientMessage::ClientHandshake(ClientHandshake {
            major_ver: PROTO_MAJOR,
            minor_ver: PROTO_MINOR,
            params,
            extensions: HashMap::new(),
        })])
        .await?;

        loop {
            let msg = self.message().await?;
            match msg {
                ServerMessage::ServerHandshake(handshake) => {
                    let proto =
                        ProtocolVersion::new(handshake.major_ver, handshake.minor_ver);
                    if !proto.supported() {
                        self.mode = Mode::Dirty;
                        return Err(ClientConnectionError::with_message(format!(
                            "server requested unsupported protocol version {}.{}",
                            handshake.major_ver, handshake.minor_ver,
                        )));
                    }
                    self.proto = proto;
                    // wait for the next message without resending
                }
                ServerMessage::Authentication(Authentication::Ok) => break,
                ServerMessage::Authentication(Authentication::Sasl { methods }) => {
                    if !methods.iter().any(|method| method == SCRAM_METHOD) {
                        self.mode = Mode::Dirty;
                        return Err(AuthenticationError::with_message(format!(
                            "the server requested one of {methods:?}, \
                             but only {SCRAM_METHOD} is supported"
                        )));
                    }
                    let user = self.config.user.clone();
                    let Some(password) = self.config.password.clone() else {
                        self.mode = Mode::Dirty;
                        return Err(PasswordRequired::with_message(
                            "the server requested a password, but none was configured",
                        ));
                    };
                    self.scram(&user, &password).await?;
                    break;
                }
                ServerMessage::ErrorResponse(err) => {
                    self.mode = Mode::Dirty;
                    return Err(err.into());
                }
                msg => {
                    self.mode = Mode::Dirty;
                    return Err(ProtocolOutOfOrderError::with_message(format!(
                        "unsolicited message {msg:?}"
                    )));
                }
            }
        }
        self.wait_ready().await
    }

    async fn scram(&mut self, user: &str, password: &str) -> Result<(), Error> {
        let auth_error = |e: ScramError| {
            AuthenticationError::with_source(e)
        };

        let mut transaction = ClientTransaction::new(user, password);
        let first = transaction.client_first().map_err(auth_error)?;
        self.send_messages(&[ClientMessage::AuthenticationSaslInitialResponse(
            SaslInitialResponse {
                method: SCRAM_METHOD.into(),
                data: first.into(),
            },
        )])
        .await?;

        loop {
            let msg = self.message().await?;
            match msg {
                ServerMessage::Authentication(Authentication::SaslContinue { data }) => {
                    let data = std::str::from_utf8(&data)
                        .map_err(ProtocolEncodingError::with_source)?;
                    let response = transaction.server_first(data).map_err(auth_error)?;
                    self.send_messages(&[ClientMessage::AuthenticationSaslResponse(
                        SaslResponse {
                            data: response.into(),
                        },
                    )])
                    .await?;
                }
                ServerMessage::Authentication(Authentication::SaslFinal { data }) => {
                    let data = std::str::from_utf8(&data)
                        .map_err(ProtocolEncodingError::with_source)?;
                    transaction.server_final(data).map_err(auth_error)?;
                }
                ServerMessage::Authentication(Authentication::Ok) => return Ok(()),
                ServerMessage::ErrorResponse(err) => {
                    self.mode = Mode::Dirty;
                    return Err(err.into());
                }
                msg => {
                    self.mode = Mode::Dirty;
                    return Err(ProtocolOutOfOrderError::with_message(format!(
                        "unsolicited message {msg:?}"
                    )));
                }
            }
        }
    }

    /// Consumes key data and parameter reports until the server announces
    /// readiness for the next command.
    async fn wait_ready(&mut self) -> Result<(), Error> {
        loop {
            let msg = self.message().await?;
            match msg {
                ServerMessage::ServerKeyData(key_data) => {
                    self.server_key_data = Some(key_data.data);
                }
                ServerMessage::ParameterStatus(status) => {
                    self.server_params.insert(status.name, status.value);
                }
                ServerMessage::ReadyForCommand(ready) => {
                    self.transaction_state = ready.transaction_state;
                    return Ok(());
                }
                ServerMessage::ErrorResponse(err) => {
                    self.mode = Mode::Dirty;
                    return Err(err.into());
                }
                msg => {
                    self.mode = Mode::Dirty;
                    return Err(ProtocolOutOfOrderError::with_message(format!(
                        "unsolicited message {msg:?}"
                    )));
                }
            }
        }
    }

    pub(crate) fn begin_request(&mut self) -> Result<Guard, Error> {
        match self.mode {
            Mode::Normal => {
                self.mode = Mode::Dirty;
                Ok(Guard)
            }
            Mode::Dirty => Err(edgedb_errors::ClientInconsistentError::build()),
            Mode::Terminated => Err(ClientConnectionClosedError::build()),
        }
    }

    pub(crate) fn end_request(&mut self, _guard: Guard) {
        self.mode = Mode::Normal;
    }

    pub(crate) async fn expect_ready(&mut self, guard: Guard) -> Result<(), Error> {
        loop {
            let msg = self.message().await?;
            match msg {
                ServerMessage::ReadyForCommand(ready) => {
                    self.transaction_state = ready.transaction_state;
                    self.end_request(guard);
                    return Ok(());
                }
                ServerMessage::ParameterStatus(status) => {
                    self.server_params.insert(status.name, status.value);
                }
                ServerMessage::ServerKeyData(key_data) => {
                    self.server_key_data = Some(key_data.data);
                }
                _ => {}
            }
        }
    }

    pub(crate) async fn expect_ready_or_eos(&mut self, guard: Guard) -> Result<(), Error> {
        match self.expect_ready(guard).await {
            Ok(()) => Ok(()),
            Err(e) if e.is::<ClientConnectionEosError>() => {
                debug_assert!(!self.is_consistent());
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Receives one message, transparently forwarding server log frames to
    /// the `log` facade so callers never observe them.
    pub(crate) async fn message(&mut self) -> Result<ServerMessage, Error> {
        loop {
            let frame = loop {
                match self.framer.poll_frame().inspect_err(|_| {
                    self.mode = Mode::Dirty;
                })? {
                    FrameStatus::Ready(size) => break self.framer.take_frame(size),
                    FrameStatus::NeedsRead(deficit) => {
                        self.read_at_least(deficit.min(MAX_FRAME_SIZE)).await?;
                    }
                }
            };
            let msg = ServerMessage::decode(&mut Input::new(self.proto.clone(), frame))
                .map_err(|e| {
                    self.mode = Mode::Dirty;
                    ProtocolEncodingError::with_source(e)
                })?;
            if let ServerMessage::LogMessage(log_msg) = msg {
                match log_msg.severity {
                    MessageSeverity::Debug => log::debug!("server: {}", log_msg.text),
                    MessageSeverity::Info => log::info!("server: {}", log_msg.text),
                    _ => log::warn!("server: {}", log_msg.text),
                }
                continue;
            }
            return Ok(msg);
        }
    }

    async fn read_at_least(&mut self, deficit: usize) -> Result<(), Error> {
        self.framer.buf_mut().reserve(deficit);
        let read = timeout(self.read_timeout, self.stream.read_buf(self.framer.buf_mut()))
            .await
            .map_err(|_| {
                self.mode = Mode::Dirty;
                ClientConnectionTimeoutError::with_message(format!(
                    "no message received within {:?}",
                    self.read_timeout
                ))
            })?
            .map_err(|e| {
                self.mode = Mode::Dirty;
                ClientConnectionError::with_source(e)
            })?;
        if read == 0 {
            self.mode = Mode::Dirty;
            return Err(ClientConnectionEosError::with_message(
                "end of stream while reading message",
            ));
        }
        Ok(())
    }

    /// Encodes all messages into one buffer and performs a single write, so
    /// a multi-frame request can not interleave mid-sequence.
    pub(crate) async fn send_messages(&mut self, messages: &[ClientMessage]) -> Result<(), Error> {
        let mut buf = BytesMut::new();
        let mut out = Output::new(&self.proto, &mut buf);
        for message in messages {
            message
                .encode(&mut out)
                .map_err(ClientEncodingError::with_source)?;
        }
        self.stream
            .write_all(&buf)
            .await
            .map_err(|e| {
                self.mode = Mode::Dirty;
                ClientConnectionError::with_source(e)
            })?;
        self.stream.flush().await.map_err(|e| {
            self.mode = Mode::Dirty;
            ClientConnectionError::with_source(e)
        })?;
        Ok(())
    }

    /// Sends `Terminate` and closes the socket unconditionally; any reply
    /// is ignored.
    pub async fn terminate(mut self) {
        self.mode = Mode::Terminated;
        let _ = self.send_messages(&[ClientMessage::Terminate]).await;
        let _ = self.stream.shutdown().await;
    }
}
