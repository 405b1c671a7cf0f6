use std::fmt;

use clap::ValueEnum;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// How keystrokes reach the remote shell.
///
/// Cooked buffers ordinary characters locally and submits the whole line on
/// Enter, while navigation and control keys still go out immediately. Raw
/// streams every key as it is pressed. Cooked is the default; raw is what a
/// full-screen remote program (an editor, a pager) needs.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Cooked,
    Raw,
}

impl fmt::Display for InputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InputMode::Cooked => "cooked",
            InputMode::Raw => "raw",
        })
    }
}

/// Mutation the pending input buffer should apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferOp {
    Retain,
    Push(char),
    Pop,
    Clear,
}

/// The full effect of one key press: a buffer mutation, an optional wire
/// frame, and an optional locally echoed fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputEffect {
    pub buffer: BufferOp,
    pub frame: Option<String>,
    pub echo: Option<&'static str>,
}

impl InputEffect {
    fn frame(data: impl Into<String>) -> Self {
        Self {
            buffer: BufferOp::Retain,
            frame: Some(data.into()),
            echo: None,
        }
    }

    fn buffered(buffer: BufferOp) -> Self {
        Self {
            buffer,
            frame: None,
            echo: None,
        }
    }
}

const CURSOR_UP: &str = "\x1b[A";
const CURSOR_DOWN: &str = "\x1b[B";
const CURSOR_RIGHT: &str = "\x1b[C";
const CURSOR_LEFT: &str = "\x1b[D";
const END_OF_TEXT: &str = "\x03";
const END_OF_TRANSMISSION: &str = "\x04";

/// Translate one key press into its effect, given the current pending
/// buffer. Pure: the caller owns the buffer and the transport. `None` means
/// the key is consumed with no effect at all.
pub fn encode(mode: InputMode, key: &KeyEvent, pending: &str) -> Option<InputEffect> {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            // Interrupt clears the half-typed line; cooked mode echoes the
            // conventional ^C marker since the remote never saw the line.
            KeyCode::Char('c') => Some(InputEffect {
                buffer: BufferOp::Clear,
                frame: Some(END_OF_TEXT.into()),
                echo: matches!(mode, InputMode::Cooked).then_some("^C\n"),
            }),
            KeyCode::Char('d') => Some(InputEffect::frame(END_OF_TRANSMISSION)),
            _ => None,
        };
    }

    match (mode, key.code) {
        // Navigation keys bypass the buffer in both modes.
        (_, KeyCode::Up) => Some(InputEffect::frame(CURSOR_UP)),
        (_, KeyCode::Down) => Some(InputEffect::frame(CURSOR_DOWN)),
        (_, KeyCode::Right) => Some(InputEffect::frame(CURSOR_RIGHT)),
        (_, KeyCode::Left) => Some(InputEffect::frame(CURSOR_LEFT)),
        (_, KeyCode::Tab) => Some(InputEffect::frame("\t")),

        (InputMode::Cooked, KeyCode::Enter) => {
            let mut line = String::with_capacity(pending.len() + 1);
            line.push_str(pending);
            line.push('\n');
            Some(InputEffect {
                buffer: BufferOp::Clear,
                frame: Some(line),
                echo: None,
            })
        }
        (InputMode::Cooked, KeyCode::Backspace) => Some(InputEffect::buffered(BufferOp::Pop)),
        (InputMode::Cooked, KeyCode::Char(ch)) if is_plain(key.modifiers) => {
            Some(InputEffect::buffered(BufferOp::Push(ch)))
        }

        (InputMode::Raw, KeyCode::Enter) => Some(InputEffect::frame("\n")),
        (InputMode::Raw, KeyCode::Backspace) => Some(InputEffect::frame("\x7f")),
        (InputMode::Raw, KeyCode::Char(ch)) if is_plain(key.modifiers) => {
            Some(InputEffect::frame(ch.to_string()))
        }

        _ => None,
    }
}

/// Shift alone still produces a printable character; anything else is a
/// chord this client does not forward.
fn is_plain(modifiers: KeyModifiers) -> bool {
    modifiers.difference(KeyModifiers::SHIFT).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(ch: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(ch), KeyModifiers::CONTROL)
    }

    /// Drive a sequence of keys through the encoder the way the client
    /// does, collecting emitted frames.
    fn run(mode: InputMode, keys: &[KeyEvent]) -> (String, Vec<String>) {
        let mut pending = String::new();
        let mut frames = Vec::new();
        for key in keys {
            let Some(effect) = encode(mode, key, &pending) else {
                continue;
            };
            match effect.buffer {
                BufferOp::Retain => {}
                BufferOp::Push(ch) => pending.push(ch),
                BufferOp::Pop => {
                    pending.pop();
                }
                BufferOp::Clear => pending.clear(),
            }
            if let Some(frame) = effect.frame {
                frames.push(frame);
            }
        }
        (pending, frames)
    }

    #[test]
    fn plain_characters_accumulate_without_sending() {
        let keys: Vec<KeyEvent> = "hello world".chars().map(|c| key(KeyCode::Char(c))).collect();
        let (pending, frames) = run(InputMode::Cooked, &keys);
        assert_eq!(pending, "hello world");
        assert!(frames.is_empty());
    }

    #[test]
    fn enter_submits_the_buffered_line_once() {
        let mut keys: Vec<KeyEvent> = "ls -la".chars().map(|c| key(KeyCode::Char(c))).collect();
        keys.push(key(KeyCode::Enter));
        let (pending, frames) = run(InputMode::Cooked, &keys);
        assert_eq!(frames, vec!["ls -la\n".to_string()]);
        assert_eq!(pending, "");
    }

    #[test]
    fn enter_on_an_empty_buffer_sends_a_bare_newline() {
        let effect = encode(InputMode::Cooked, &key(KeyCode::Enter), "").unwrap();
        assert_eq!(effect.frame.as_deref(), Some("\n"));
        assert_eq!(effect.buffer, BufferOp::Clear);
    }

    #[test]
    fn backspace_edits_the_buffer_only() {
        let keys = [
            key(KeyCode::Char('a')),
            key(KeyCode::Char('b')),
            key(KeyCode::Backspace),
        ];
        let (pending, frames) = run(InputMode::Cooked, &keys);
        assert_eq!(pending, "a");
        assert!(frames.is_empty());
    }

    #[test]
    fn arrows_and_tab_send_immediately_leaving_the_buffer_alone() {
        let keys = [
            key(KeyCode::Char('x')),
            key(KeyCode::Up),
            key(KeyCode::Down),
            key(KeyCode::Right),
            key(KeyCode::Left),
            key(KeyCode::Tab),
        ];
        let (pending, frames) = run(InputMode::Cooked, &keys);
        assert_eq!(pending, "x");
        assert_eq!(frames, vec!["\x1b[A", "\x1b[B", "\x1b[C", "\x1b[D", "\t"]);
    }

    #[test]
    fn ctrl_c_interrupts_echoes_and_clears() {
        let effect = encode(InputMode::Cooked, &ctrl('c'), "foo").unwrap();
        assert_eq!(effect.frame.as_deref(), Some("\x03"));
        assert_eq!(effect.echo, Some("^C\n"));
        assert_eq!(effect.buffer, BufferOp::Clear);

        // Never suppressed, even with nothing typed.
        let effect = encode(InputMode::Cooked, &ctrl('c'), "").unwrap();
        assert_eq!(effect.frame.as_deref(), Some("\x03"));
    }

    #[test]
    fn ctrl_d_sends_eof_and_keeps_the_buffer() {
        let effect = encode(InputMode::Cooked, &ctrl('d'), "partial").unwrap();
        assert_eq!(effect.frame.as_deref(), Some("\x04"));
        assert_eq!(effect.buffer, BufferOp::Retain);
    }

    #[test]
    fn shifted_characters_are_still_printable() {
        let upper = KeyEvent::new(KeyCode::Char('A'), KeyModifiers::SHIFT);
        let effect = encode(InputMode::Cooked, &upper, "").unwrap();
        assert_eq!(effect.buffer, BufferOp::Push('A'));
    }

    #[test]
    fn chords_and_function_keys_are_ignored() {
        let alt = KeyEvent::new(KeyCode::Char('a'), KeyModifiers::ALT);
        assert_eq!(encode(InputMode::Cooked, &alt, ""), None);
        assert_eq!(encode(InputMode::Cooked, &key(KeyCode::Esc), ""), None);
        assert_eq!(encode(InputMode::Cooked, &key(KeyCode::F(5)), ""), None);
        assert_eq!(encode(InputMode::Cooked, &ctrl('z'), ""), None);
    }

    #[test]
    fn raw_mode_streams_every_key() {
        let keys = [
            key(KeyCode::Char('v')),
            key(KeyCode::Char('i')),
            key(KeyCode::Enter),
            key(KeyCode::Backspace),
        ];
        let (pending, frames) = run(InputMode::Raw, &keys);
        assert_eq!(pending, "");
        assert_eq!(frames, vec!["v", "i", "\n", "\x7f"]);
    }

    #[test]
    fn raw_mode_interrupt_skips_the_local_echo() {
        let effect = encode(InputMode::Raw, &ctrl('c'), "").unwrap();
        assert_eq!(effect.frame.as_deref(), Some("\x03"));
        assert_eq!(effect.echo, None);
    }
}
