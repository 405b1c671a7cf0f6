use std::fmt;
use std::time::Duration;

use crossterm::event::{KeyEvent, KeyEventKind};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::client::input::{self, InputMode};
use crate::client::transcript::{PendingInput, Transcript};
use crate::config::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_RESUME_GRACE};
use crate::protocol::{self, ClientFrame, Inbound, ServerFrame};
use crate::session::{Session, SessionError, SessionManager, TerminalOptions};
use crate::transport::{TerminalSocket, TransportEvent};

const UNKNOWN_POD: &str = "Unknown Pod";
const UNKNOWN_CONTAINER: &str = "Unknown Container";
const PLACEHOLDER: &str = "No session. Attach a terminal to begin.";
const CURSOR_GLYPH: char = '█';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    CreatingSession,
    Connecting,
    Connected,
    Closed,
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Idle => "idle",
            ConnectionState::CreatingSession => "creating session",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Closed => "closed",
            ConnectionState::Failed => "failed",
        })
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{0}")]
    Session(#[from] SessionError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("stdout is not an interactive terminal")]
    NotInteractive,
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub mode: InputMode,
    pub connect_timeout: Duration,
    pub resume_grace: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            mode: InputMode::Cooked,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            resume_grace: DEFAULT_RESUME_GRACE,
        }
    }
}

/// The terminal client proper: one session, at most one open transport, an
/// append-only transcript, and the pending-input overlay. Every mutation
/// happens on the task driving this value; transport events arrive through
/// a channel in delivery order.
pub struct TerminalClient {
    manager: SessionManager,
    options: ClientOptions,
    state: ConnectionState,
    session: Option<Session>,
    socket: Option<TerminalSocket>,
    events: Option<mpsc::UnboundedReceiver<TransportEvent>>,
    transcript: Transcript,
    pending: PendingInput,
    focused: bool,
    blink_on: bool,
}

impl TerminalClient {
    pub fn new(manager: SessionManager, options: ClientOptions) -> Self {
        Self {
            manager,
            options,
            state: ConnectionState::Idle,
            session: None,
            socket: None,
            events: None,
            transcript: Transcript::default(),
            pending: PendingInput::default(),
            focused: false,
            blink_on: true,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn transcript_text(&self) -> &str {
        self.transcript.text()
    }

    pub fn pending_text(&self) -> &str {
        self.pending.as_str()
    }

    pub fn mode(&self) -> InputMode {
        self.options.mode
    }

    /// Request a fresh session and connect to it. Creation failure is the
    /// one blocking error: it leaves the client Failed and is surfaced to
    /// the caller instead of the transcript. Connection failures after a
    /// successful creation land in the transcript.
    pub async fn attach(
        &mut self,
        target: &str,
        namespace: &str,
        options: &TerminalOptions,
    ) -> Result<(), ClientError> {
        self.state = ConnectionState::CreatingSession;
        let session = match self.manager.create(target, namespace, options).await {
            Ok(session) => session,
            Err(err) => {
                self.state = ConnectionState::Failed;
                return Err(err.into());
            }
        };
        let session_id = session.id().to_string();
        self.session = Some(session);
        self.open_transport(&session_id).await;
        Ok(())
    }

    /// Connect to a session whose id is already known, e.g. from a
    /// persisted link. The fixed grace delay gives the console time to
    /// finish wiring the session up; it softens a startup race, it does
    /// not close it.
    pub async fn resume(&mut self, session_id: &str) {
        info!(
            target: "gangway::client",
            session_id,
            grace_ms = self.options.resume_grace.as_millis() as u64,
            "resuming session"
        );
        tokio::time::sleep(self.options.resume_grace).await;
        self.session = Some(Session::from_id(session_id));
        self.open_transport(session_id).await;
    }

    /// One open transport per client: any previous socket is closed before
    /// a new connection is attempted. The timeout keeps a handshake that
    /// never completes from leaving the client stuck in Connecting.
    async fn open_transport(&mut self, session_id: &str) {
        if let Some(previous) = self.socket.take() {
            previous.close();
        }
        self.events = None;
        self.state = ConnectionState::Connecting;

        let url = match self.manager.config().terminal_url(session_id) {
            Ok(url) => url,
            Err(err) => {
                self.transcript
                    .append(&format!("\n=== connection error: {err} ===\n"));
                self.state = ConnectionState::Failed;
                return;
            }
        };

        match tokio::time::timeout(self.options.connect_timeout, TerminalSocket::connect(&url))
            .await
        {
            Ok(Ok((socket, events))) => {
                self.socket = Some(socket);
                self.events = Some(events);
                self.on_open(session_id);
            }
            Ok(Err(err)) => {
                warn!(target: "gangway::client", error = %err, "terminal connection failed");
                self.transcript
                    .append(&format!("\n=== connection error: {err} ===\n"));
                self.state = ConnectionState::Failed;
            }
            Err(_) => {
                warn!(target: "gangway::client", "terminal connection timed out");
                self.transcript.append(&format!(
                    "\n=== connection timed out after {}s ===\n",
                    self.options.connect_timeout.as_secs()
                ));
                self.state = ConnectionState::Failed;
            }
        }
    }

    fn on_open(&mut self, session_id: &str) {
        self.state = ConnectionState::Connected;
        self.focused = true;
        let short: String = session_id.chars().take(8).collect();
        self.transcript
            .append(&format!("\n=== terminal attached: {short} ===\n"));
    }

    /// Hand the transport event receiver to the driving loop. The client
    /// keeps the sending half through the socket handle.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<TransportEvent>> {
        self.events.take()
    }

    /// Receive and apply the next transport event. Returns false once the
    /// transport is gone. Intended for callers that keep the receiver
    /// inside the client rather than taking it.
    pub async fn pump(&mut self) -> bool {
        let Some(events) = self.events.as_mut() else {
            return false;
        };
        match events.recv().await {
            Some(event) => {
                self.process_event(event);
                true
            }
            None => {
                self.events = None;
                false
            }
        }
    }

    pub fn process_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Frame(payload) => self.on_payload(&payload),
            TransportEvent::Error(message) => {
                let message = if message.is_empty() {
                    "connection failed".to_string()
                } else {
                    message
                };
                self.transcript
                    .append(&format!("\n=== connection error: {message} ===\n"));
                // State is left to the close event that follows.
            }
            TransportEvent::Closed(code) => {
                match code {
                    Some(code) => self
                        .transcript
                        .append(&format!("\n=== connection closed (code {code}) ===\n")),
                    None => self.transcript.append("\n=== connection closed ===\n"),
                }
                self.socket = None;
                self.session = None;
                self.pending.clear();
                self.focused = false;
                if !matches!(self.state, ConnectionState::Failed) {
                    self.state = ConnectionState::Closed;
                }
            }
        }
    }

    /// No inbound payload is ever dropped: known frames are dispatched,
    /// unknown-but-JSON is shown serialized, everything else verbatim.
    fn on_payload(&mut self, payload: &str) {
        match protocol::decode(payload) {
            Inbound::Frame(frame) => self.on_frame(frame),
            Inbound::Unknown(value) => {
                debug!(target: "gangway::client", %value, "unrecognised frame type");
                self.transcript.append(&value.to_string());
                self.transcript.append("\n");
            }
            Inbound::Raw(text) => {
                self.transcript.append(&text);
                self.transcript.append("\n");
            }
        }
    }

    fn on_frame(&mut self, frame: ServerFrame) {
        match frame {
            ServerFrame::Connected {
                pod_name,
                container_name,
            } => {
                let pod = pod_name.as_deref().unwrap_or(UNKNOWN_POD);
                let container = container_name.as_deref().unwrap_or(UNKNOWN_CONTAINER);
                self.transcript
                    .append(&format!("\n=== connected: {pod} ({container}) ===\n"));
            }
            ServerFrame::Output { data } | ServerFrame::Stdout { data } => {
                self.transcript.append(&data);
            }
            // Kept apart from stdout so error output can pick up its own
            // styling later; rendered identically for now.
            ServerFrame::ErrorOutput { data } | ServerFrame::Stderr { data } => {
                self.transcript.append(&data);
            }
            ServerFrame::Error { message } => {
                self.transcript.append(&format!("\nERROR: {message}\n"));
            }
        }
    }

    /// Route one key press through the encoder and run its effects. Keys
    /// are only interpreted while connected and focused.
    pub fn handle_key(&mut self, key: &KeyEvent) {
        if !matches!(self.state, ConnectionState::Connected) || !self.focused {
            return;
        }
        if matches!(key.kind, KeyEventKind::Release) {
            return;
        }
        let Some(effect) = input::encode(self.options.mode, key, self.pending.as_str()) else {
            return;
        };
        self.pending.apply(effect.buffer);
        if let Some(echo) = effect.echo {
            self.transcript.append(echo);
        }
        if let Some(frame) = effect.frame {
            self.send_input(frame);
        }
    }

    /// Write one input frame to the transport. A safe no-op while not
    /// connected: nothing is queued and nothing fails.
    fn send_input(&mut self, data: String) {
        if !matches!(self.state, ConnectionState::Connected) {
            return;
        }
        let Some(socket) = self.socket.as_ref() else {
            return;
        };
        if let Err(err) = socket.send(&ClientFrame::Input { data }) {
            warn!(target: "gangway::client", error = %err, "failed to encode input frame");
        }
    }

    /// Explicitly close the transport. Idempotent: a second call, or a call
    /// after the transport closed itself, changes nothing.
    pub fn disconnect(&mut self) {
        if let Some(socket) = self.socket.take() {
            socket.close();
        }
        self.events = None;
        self.session = None;
        self.pending.clear();
        self.focused = false;
        if !matches!(
            self.state,
            ConnectionState::Closed | ConnectionState::Failed
        ) {
            self.state = ConnectionState::Closed;
        }
    }

    /// A click inside the terminal surface restores focus so keystrokes
    /// keep routing to the encoder. Only meaningful while connected.
    pub fn focus_click(&mut self) {
        if matches!(self.state, ConnectionState::Connected) {
            self.focused = true;
        }
    }

    pub fn toggle_blink(&mut self) {
        self.blink_on = !self.blink_on;
    }

    /// The rendered text: transcript plus the unsent overlay and a cursor
    /// glyph while connected, the bare transcript (or a placeholder prompt)
    /// otherwise.
    pub fn view(&self) -> String {
        if matches!(self.state, ConnectionState::Connected) {
            let mut out = String::with_capacity(
                self.transcript.text().len() + self.pending.as_str().len() + 4,
            );
            out.push_str(self.transcript.text());
            out.push_str(self.pending.as_str());
            if self.blink_on {
                out.push(CURSOR_GLYPH);
            }
            out
        } else if self.transcript.is_empty() {
            PLACEHOLDER.to_string()
        } else {
            self.transcript.text().to_string()
        }
    }

    pub fn status_line(&self) -> String {
        let mut status = format!(" {}", self.state);
        if let Some(session) = &self.session {
            status.push_str(" | session ");
            status.push_str(&session.short_id());
        }
        status.push_str(match self.options.mode {
            InputMode::Cooked => " | cooked",
            InputMode::Raw => " | raw",
        });
        status.push_str(match self.state {
            ConnectionState::Closed | ConnectionState::Failed => " | press q to exit",
            _ => " | ctrl-q detaches",
        });
        status
    }
}
