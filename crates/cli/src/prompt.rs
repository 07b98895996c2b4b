use std::io::{BufRead, Stderr, Write};

use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    queue,
    style::Print,
    terminal::{self, ClearType},
};

use crate::error::{AppError, Result};

/// What a key press does to a hidden input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edit {
    Submit,
    Abort,
    Pushed,
    Popped,
    Ignored,
}

fn apply_key(secret: &mut String, key: &KeyEvent) -> Edit {
    let control = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Enter => Edit::Submit,
        KeyCode::Esc => Edit::Abort,
        KeyCode::Char('c' | 'd') if control => Edit::Abort,
        KeyCode::Char(ch) if !control => {
            secret.push(ch);
            Edit::Pushed
        }
        KeyCode::Backspace if secret.pop().is_some() => Edit::Popped,
        _ => Edit::Ignored,
    }
}

/// Stderr in raw mode for the lifetime of the value.
struct HiddenLine {
    out: Stderr,
}

impl HiddenLine {
    fn open(label: &str) -> Result<Self> {
        terminal::enable_raw_mode()?;
        let mut line = Self {
            out: std::io::stderr(),
        };
        queue!(
            line.out,
            cursor::MoveToColumn(0),
            terminal::Clear(ClearType::CurrentLine),
            Print(label)
        )?;
        line.out.flush()?;
        Ok(line)
    }

    fn echo(&mut self, edit: Edit) -> Result<()> {
        match edit {
            Edit::Pushed => queue!(self.out, Print("*"))?,
            Edit::Popped => {
                queue!(self.out, cursor::MoveLeft(1), Print(" "), cursor::MoveLeft(1))?
            }
            Edit::Submit | Edit::Abort => queue!(self.out, Print("\r\n"))?,
            Edit::Ignored => return Ok(()),
        }
        self.out.flush()?;
        Ok(())
    }
}

impl Drop for HiddenLine {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

/// Reads a password, echoing `*` per character.
pub fn password(label: &str) -> Result<String> {
    let mut line = HiddenLine::open(label)?;
    let mut secret = String::new();
    loop {
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind == KeyEventKind::Release {
            continue;
        }
        let edit = apply_key(&mut secret, &key);
        line.echo(edit)?;
        match edit {
            Edit::Submit => return Ok(secret),
            Edit::Abort => return Err(AppError::Terminal("password entry cancelled".to_string())),
            _ => {}
        }
    }
}

/// Asks a yes/no question on stderr. Anything but `y`/`yes` is a no.
pub fn confirm(question: &str) -> Result<bool> {
    let mut out = std::io::stderr();
    write!(out, "{question} [y/N] ")?;
    out.flush()?;

    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    ))
}
