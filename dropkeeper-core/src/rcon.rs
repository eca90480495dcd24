//! Remote console client for game servers speaking the Source RCON protocol.
//!
//! Every command uses a fresh session:
//! `Idle -> Connecting -> Authenticated -> CommandSent -> ResponseReceived -> Closed`,
//! or `Failed -> Closed` as soon as a step goes wrong. There is no timeout
//! and no retry here; callers decide how long to wait and whether to try again.

use crate::config::ServerConfig;
use crate::error::{DropkeeperError, Result};
use bytes::{Buf, BufMut, BytesMut};
use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

pub const SERVERDATA_AUTH: i32 = 3;
pub const SERVERDATA_AUTH_RESPONSE: i32 = 2;
pub const SERVERDATA_EXECCOMMAND: i32 = 2;
pub const SERVERDATA_RESPONSE_VALUE: i32 = 0;

/// id + type
const HEADER_LEN: usize = 8;
const MIN_PACKET_LEN: i32 = HEADER_LEN as i32 + 2;
const MAX_PACKET_LEN: i32 = 64 * 1024;
/// Packets skipped while waiting for the one that answers our request.
const MAX_STRAY_PACKETS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub id: i32,
    pub kind: i32,
    pub body: String,
}

impl Packet {
    pub fn new(id: i32, kind: i32, body: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            body: body.into(),
        }
    }

    /// Size prefix, id, type, body, two NUL terminators; all little-endian.
    pub fn encode(&self) -> BytesMut {
        let body = self.body.as_bytes();
        let size = HEADER_LEN + body.len() + 2;

        let mut buf = BytesMut::with_capacity(4 + size);
        buf.put_i32_le(size as i32);
        buf.put_i32_le(self.id);
        buf.put_i32_le(self.kind);
        buf.put_slice(body);
        buf.put_u8(0);
        buf.put_u8(0);
        buf
    }

    /// Decode everything after the size prefix.
    pub fn decode(mut payload: &[u8]) -> Result<Self> {
        if payload.len() < MIN_PACKET_LEN as usize {
            return Err(DropkeeperError::Parse(format!(
                "RCON packet too short: {} bytes",
                payload.len()
            )));
        }

        let id = payload.get_i32_le();
        let kind = payload.get_i32_le();
        let end = payload.iter().rposition(|b| *b != 0).map_or(0, |p| p + 1);
        let body = String::from_utf8_lossy(&payload[..end]).into_owned();

        Ok(Self { id, kind, body })
    }
}

pub async fn write_packet<W>(writer: &mut W, packet: &Packet) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&packet.encode()).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_packet<R>(reader: &mut R) -> Result<Packet>
where
    R: AsyncRead + Unpin,
{
    let size = reader.read_i32_le().await?;
    if !(MIN_PACKET_LEN..=MAX_PACKET_LEN).contains(&size) {
        return Err(DropkeeperError::Parse(format!("RCON packet size out of range: {}", size)));
    }

    let mut payload = vec![0u8; size as usize];
    reader.read_exact(&mut payload).await?;
    Packet::decode(&payload)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Authenticated,
    CommandSent,
    ResponseReceived,
    Failed,
    Closed,
}

/// One short-lived remote console conversation.
pub struct RconSession {
    address: String,
    state: SessionState,
    stream: Option<TcpStream>,
    next_id: i32,
    pending_id: Option<i32>,
}

impl RconSession {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            state: SessionState::Idle,
            stream: None,
            next_id: 1,
            pending_id: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn allocate_id(&mut self) -> i32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);
        id
    }

    fn expect(&self, expected: SessionState) -> Result<()> {
        if self.state != expected {
            return Err(DropkeeperError::Validation(format!(
                "remote console session for {} is {:?}, expected {:?}",
                self.address, self.state, expected
            )));
        }
        Ok(())
    }

    fn fail(&mut self, error: DropkeeperError) -> DropkeeperError {
        tracing::warn!(address = %self.address, state = ?self.state, error = %error, "Remote console session failed");
        self.state = SessionState::Failed;
        self.stream = None;
        error
    }

    fn unreachable(&self, error: impl fmt::Display) -> DropkeeperError {
        DropkeeperError::RconConnection(format!("{}: {}", self.address, error))
    }

    fn stream(&mut self) -> Result<&mut TcpStream> {
        let address = self.address.clone();
        self.stream
            .as_mut()
            .ok_or_else(|| DropkeeperError::RconConnection(format!("{}: not connected", address)))
    }

    pub async fn connect(&mut self) -> Result<()> {
        self.expect(SessionState::Idle)?;
        self.state = SessionState::Connecting;

        match TcpStream::connect(&self.address).await {
            Ok(stream) => {
                tracing::debug!(address = %self.address, "Remote console connected");
                self.stream = Some(stream);
                Ok(())
            }
            Err(e) => {
                let error = self.unreachable(e);
                Err(self.fail(error))
            }
        }
    }

    pub async fn authenticate(&mut self, password: &str) -> Result<()> {
        self.expect(SessionState::Connecting)?;
        let id = self.allocate_id();

        let outcome = match self.stream() {
            Ok(stream) => exchange_auth(stream, id, password).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(true) => {
                self.state = SessionState::Authenticated;
                Ok(())
            }
            Ok(false) => {
                let error = DropkeeperError::RconAuth(self.address.clone());
                Err(self.fail(error))
            }
            Err(e) => {
                let error = self.unreachable(e);
                Err(self.fail(error))
            }
        }
    }

    pub async fn send(&mut self, command: &str) -> Result<()> {
        self.expect(SessionState::Authenticated)?;
        let id = self.allocate_id();
        let packet = Packet::new(id, SERVERDATA_EXECCOMMAND, command);

        let outcome = match self.stream() {
            Ok(stream) => write_packet(stream, &packet).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                self.pending_id = Some(id);
                self.state = SessionState::CommandSent;
                Ok(())
            }
            Err(e) => {
                let error = self.unreachable(e);
                Err(self.fail(error))
            }
        }
    }

    pub async fn receive(&mut self) -> Result<String> {
        self.expect(SessionState::CommandSent)?;
        let id = self.pending_id.take().unwrap_or_default();

        let outcome = match self.stream() {
            Ok(stream) => await_response(stream, id).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(body) => {
                self.state = SessionState::ResponseReceived;
                Ok(body)
            }
            Err(e) => {
                let error = self.unreachable(e);
                Err(self.fail(error))
            }
        }
    }

    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
        self.state = SessionState::Closed;
    }
}

/// Returns whether the server accepted the password.
async fn exchange_auth(stream: &mut TcpStream, id: i32, password: &str) -> Result<bool> {
    write_packet(stream, &Packet::new(id, SERVERDATA_AUTH, password)).await?;

    // Source servers send an empty RESPONSE_VALUE ahead of the auth response.
    for _ in 0..MAX_STRAY_PACKETS {
        let packet = read_packet(stream).await?;
        if packet.kind == SERVERDATA_AUTH_RESPONSE {
            return Ok(packet.id == id);
        }
    }
    Err(DropkeeperError::Parse("no auth response received".to_string()))
}

async fn await_response(stream: &mut TcpStream, id: i32) -> Result<String> {
    for _ in 0..MAX_STRAY_PACKETS {
        let packet = read_packet(stream).await?;
        if packet.id == id && packet.kind == SERVERDATA_RESPONSE_VALUE {
            return Ok(packet.body);
        }
        tracing::debug!(id = packet.id, kind = packet.kind, "Skipping unrelated RCON packet");
    }
    Err(DropkeeperError::Parse("no command response received".to_string()))
}

/// Connection details for one managed game server.
#[derive(Clone)]
pub struct RconClient {
    name: String,
    host: String,
    port: u16,
    password: String,
}

impl fmt::Debug for RconClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RconClient")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

impl RconClient {
    pub fn new(
        name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        password: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            password: password.into(),
        }
    }

    pub fn from_server(server: &ServerConfig) -> Self {
        Self::new(&server.name, &server.host, server.port, &server.password)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Open a session, run one command, close. Errors are returned.
    pub async fn execute(&self, command: &str) -> Result<String> {
        let mut session = RconSession::new(self.address());
        let result = run_session(&mut session, &self.password, command).await;
        session.close().await;

        match &result {
            Ok(_) => tracing::info!(server = %self.name, command, "Remote console command completed"),
            Err(e) => tracing::warn!(server = %self.name, command, error = %e, "Remote console command failed"),
        }
        result
    }

    /// Like [`execute`](Self::execute), with failures rendered as text.
    pub async fn send_command(&self, command: &str) -> String {
        match self.execute(command).await {
            Ok(response) => response,
            Err(e) => failure_text(&self.name, &e),
        }
    }
}

async fn run_session(session: &mut RconSession, password: &str, command: &str) -> Result<String> {
    session.connect().await?;
    session.authenticate(password).await?;
    session.send(command).await?;
    session.receive().await
}

pub fn failure_text(server: &str, error: &DropkeeperError) -> String {
    format!("Failed to run command on {}: {}", server, error)
}
