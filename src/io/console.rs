use std::io::{self, Write};
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{self, SetSize, SetTitle};
use log::debug;

/// Host terminal as seen by the DOS console services.
///
/// Characters are raw bytes; no code page translation happens here.
pub trait Console {
    /// Blocks until a key with an ASCII meaning is pressed.
    fn read_char(&mut self) -> io::Result<u8>;

    /// A pending key, if one is available right now.
    fn poll_char(&mut self) -> io::Result<Option<u8>>;

    fn write_char(&mut self, byte: u8) -> io::Result<()>;

    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        for &byte in bytes {
            self.write_char(byte)?;
        }
        Ok(())
    }

    /// `(columns, rows)`
    fn window_size(&self) -> io::Result<(u16, u16)>;

    fn set_window_size(&mut self, columns: u16, rows: u16) -> io::Result<()>;

    fn title(&self) -> &str;

    fn set_title(&mut self, title: &str) -> io::Result<()>;
}

/// Restores cooked mode when dropped.
struct RawMode;

impl RawMode {
    fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(RawMode)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

/// The process's own terminal, driven through crossterm.
pub struct TerminalConsole {
    title: String,
}

impl TerminalConsole {
    pub fn new() -> Self {
        Self {
            title: String::new(),
        }
    }

    fn next_key(timeout: Option<Duration>) -> io::Result<Option<u8>> {
        let _raw = RawMode::enable()?;
        loop {
            if let Some(timeout) = timeout {
                if !event::poll(timeout)? {
                    return Ok(None);
                }
            }
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                if let Some(byte) = key_to_ascii(&key) {
                    return Ok(Some(byte));
                }
                debug!("Ignoring key without an ASCII code: {:?}", key.code);
            }
        }
    }
}

impl Default for TerminalConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl Console for TerminalConsole {
    fn read_char(&mut self) -> io::Result<u8> {
        loop {
            if let Some(byte) = Self::next_key(None)? {
                return Ok(byte);
            }
        }
    }

    fn poll_char(&mut self) -> io::Result<Option<u8>> {
        Self::next_key(Some(Duration::ZERO))
    }

    fn write_char(&mut self, byte: u8) -> io::Result<()> {
        self.write_bytes(&[byte])
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        stdout.write_all(bytes)?;
        stdout.flush()
    }

    fn window_size(&self) -> io::Result<(u16, u16)> {
        terminal::size()
    }

    fn set_window_size(&mut self, columns: u16, rows: u16) -> io::Result<()> {
        execute!(io::stdout(), SetSize(columns, rows))
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn set_title(&mut self, title: &str) -> io::Result<()> {
        execute!(io::stdout(), SetTitle(title))?;
        self.title = title.to_string();
        Ok(())
    }
}

/// ASCII code DOS would report for a key press. Ctrl+letter gives 01h-1Ah.
fn key_to_ascii(key: &KeyEvent) -> Option<u8> {
    match key.code {
        KeyCode::Char(c) if key.modifiers.contains(KeyModifiers::CONTROL) && c.is_ascii_alphabetic() => {
            Some(c.to_ascii_uppercase() as u8 - b'@')
        }
        KeyCode::Char(c) if c.is_ascii() => Some(c as u8),
        KeyCode::Enter => Some(0x0D),
        KeyCode::Backspace => Some(0x08),
        KeyCode::Tab => Some(0x09),
        KeyCode::Esc => Some(0x1B),
        _ => None,
    }
}
