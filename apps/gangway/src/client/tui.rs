use std::io::{self, IsTerminal};
use std::time::Duration;

use crossterm::event::{
    DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers, MouseEventKind,
};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Modifier, Style};
use ratatui::text::Text;
use ratatui::widgets::Paragraph;
use tokio::sync::mpsc;
use tracing::debug;

use crate::client::terminal::{ClientError, ConnectionState, TerminalClient};
use crate::session::TerminalOptions;
use crate::transport::TransportEvent;

const BLINK_INTERVAL: Duration = Duration::from_millis(500);

/// How the interactive view obtains its session.
pub enum Launch {
    Create {
        target: String,
        namespace: String,
        options: TerminalOptions,
    },
    Resume {
        session_id: String,
    },
}

/// Run the interactive terminal view until the user detaches. The client is
/// disconnected exactly once on every exit path, including errors.
pub async fn run(mut client: TerminalClient, launch: Launch) -> Result<(), ClientError> {
    if !io::stdout().is_terminal() {
        return Err(ClientError::NotInteractive);
    }
    let mut guard = TuiGuard::enter()?;
    let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;

    let result = drive(&mut client, &mut terminal, &mut guard, launch).await;

    client.disconnect();
    drop(guard);
    result
}

async fn drive(
    client: &mut TerminalClient,
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    guard: &mut TuiGuard,
    launch: Launch,
) -> Result<(), ClientError> {
    draw(terminal, client)?;

    match launch {
        Launch::Create {
            target,
            namespace,
            options,
        } => client.attach(&target, &namespace, &options).await?,
        Launch::Resume { session_id } => client.resume(&session_id).await,
    }

    let mut input = spawn_input_reader();
    let mut events = client.take_events();
    let mut blink = tokio::time::interval(BLINK_INTERVAL);

    loop {
        guard.sync_mouse_capture(client.state())?;
        draw(terminal, client)?;

        tokio::select! {
            event = next_transport_event(&mut events) => match event {
                Some(event) => client.process_event(event),
                None => events = None,
            },
            maybe = input.recv() => {
                let Some(event) = maybe else { break };
                match event {
                    Event::Key(key) if is_detach(&key) => break,
                    Event::Key(key) if is_quit_after_end(client.state(), &key) => break,
                    Event::Key(key) => client.handle_key(&key),
                    Event::Mouse(mouse) if matches!(mouse.kind, MouseEventKind::Down(_)) => {
                        client.focus_click();
                    }
                    // A resize redraws on the next pass; everything else is
                    // consumed so it cannot leak to the host shell.
                    _ => {}
                }
            },
            _ = blink.tick() => client.toggle_blink(),
        }
    }

    debug!(target: "gangway::client", "interactive loop stopped");
    Ok(())
}

async fn next_transport_event(
    events: &mut Option<mpsc::UnboundedReceiver<TransportEvent>>,
) -> Option<TransportEvent> {
    match events.as_mut() {
        Some(receiver) => receiver.recv().await,
        None => futures_util::future::pending().await,
    }
}

/// Ctrl-Q is the one local key never forwarded to the remote shell.
fn is_detach(key: &KeyEvent) -> bool {
    key.kind != KeyEventKind::Release
        && key.modifiers.contains(KeyModifiers::CONTROL)
        && matches!(key.code, KeyCode::Char('q'))
}

fn is_quit_after_end(state: ConnectionState, key: &KeyEvent) -> bool {
    matches!(state, ConnectionState::Closed | ConnectionState::Failed)
        && key.kind != KeyEventKind::Release
        && matches!(key.code, KeyCode::Char('q'))
}

/// Keystrokes are read on a dedicated thread; `event::read` blocks, and the
/// select loop must stay free to service the transport.
fn spawn_input_reader() -> mpsc::UnboundedReceiver<Event> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        loop {
            match crossterm::event::read() {
                Ok(event) => {
                    if tx.send(event).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });
    rx
}

fn draw(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    client: &TerminalClient,
) -> io::Result<()> {
    terminal.draw(|frame| {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(1), Constraint::Length(1)])
            .split(frame.area());

        let body = client.view();
        let width = chunks[0].width.max(1) as usize;
        let height = chunks[0].height as usize;
        // Pinned to the newest content: lay the tail of the view out into
        // display rows and keep the last screenful.
        let window = tail_lines(&body, height.saturating_mul(4).max(1));
        let mut rows = layout_rows(window, width);
        if rows.len() > height {
            rows.drain(..rows.len() - height);
        }
        frame.render_widget(Paragraph::new(Text::raw(rows.join("\n"))), chunks[0]);

        frame.render_widget(
            Paragraph::new(client.status_line())
                .style(Style::default().add_modifier(Modifier::REVERSED)),
            chunks[1],
        );
    })?;
    Ok(())
}

/// Last `max_lines` newline-delimited lines of `text`.
fn tail_lines(text: &str, max_lines: usize) -> &str {
    let mut seen = 0;
    for (idx, _) in text.rmatch_indices('\n') {
        seen += 1;
        if seen == max_lines {
            return &text[idx + 1..];
        }
    }
    text
}

/// Split text into display rows of at most `width` characters, breaking on
/// newlines first.
fn layout_rows(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut rows = Vec::new();
    for line in text.split('\n') {
        if line.is_empty() {
            rows.push(String::new());
            continue;
        }
        let chars: Vec<char> = line.chars().collect();
        for chunk in chars.chunks(width) {
            rows.push(chunk.iter().collect());
        }
    }
    rows
}

/// Raw mode, alternate screen, and mouse capture are restored on drop so a
/// panic cannot leave the host terminal unusable.
struct TuiGuard {
    mouse_captured: bool,
}

impl TuiGuard {
    fn enter() -> io::Result<Self> {
        enable_raw_mode()?;
        execute!(io::stdout(), EnterAlternateScreen)?;
        Ok(Self {
            mouse_captured: false,
        })
    }

    /// The click listener is scoped exactly to the connected state: capture
    /// is enabled on entering Connected and disabled on leaving it.
    fn sync_mouse_capture(&mut self, state: ConnectionState) -> io::Result<()> {
        let want = matches!(state, ConnectionState::Connected);
        if want && !self.mouse_captured {
            execute!(io::stdout(), EnableMouseCapture)?;
            self.mouse_captured = true;
        } else if !want && self.mouse_captured {
            execute!(io::stdout(), DisableMouseCapture)?;
            self.mouse_captured = false;
        }
        Ok(())
    }
}

impl Drop for TuiGuard {
    fn drop(&mut self) {
        if self.mouse_captured {
            let _ = execute!(io::stdout(), DisableMouseCapture);
        }
        let _ = execute!(io::stdout(), LeaveAlternateScreen, crossterm::cursor::Show);
        let _ = disable_raw_mode();
    }
}
