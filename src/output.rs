use std::io::{self, Write};
use std::sync::Mutex;

use crossterm::ExecutableCommand;
use crossterm::cursor::MoveToColumn;
use crossterm::terminal::{Clear, ClearType};
use serde::Serialize;

use crate::app::{CacheStatus, PreloadOutcome};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::update::UpdateCheck;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_preload(result: &PreloadOutcome) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_status(result: &CacheStatus) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_check(result: &UpdateCheck) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value)
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Single-line terminal progress bar, rewritten in place per event. Stage
/// labels mirror the in-app loading screen.
pub struct ConsoleProgress {
    stderr: Mutex<io::Stderr>,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self {
            stderr: Mutex::new(io::stderr()),
        }
    }

    fn label(event: &ProgressEvent) -> &'static str {
        match event {
            ProgressEvent::Image { .. } => "Caricamento immagini",
            ProgressEvent::Audio { .. } => "Caricamento audio guida vocale",
            ProgressEvent::FixedClip { .. } => "Caricamento audio Beppe",
            ProgressEvent::Nutrition { .. } => "Caricamento piano nutrizionale",
        }
    }

    fn render(&self, event: &ProgressEvent) -> io::Result<()> {
        let (loaded, total) = event.counts();
        let mut stderr = self
            .stderr
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "stderr lock poisoned"))?;
        stderr.execute(MoveToColumn(0))?;
        stderr.execute(Clear(ClearType::UntilNewLine))?;
        write!(
            stderr,
            "{}: {loaded}/{total} ({:.0}%)",
            Self::label(event),
            event.percentage()
        )?;
        if loaded >= total {
            writeln!(stderr)?;
        }
        stderr.flush()
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for ConsoleProgress {
    fn event(&self, event: ProgressEvent) {
        // Progress is cosmetic, a broken terminal must not abort a preload.
        let _ = self.render(&event);
    }
}

/// Line-per-event reporter for non-interactive runs and logs.
pub struct PlainProgress;

impl ProgressSink for PlainProgress {
    fn event(&self, event: ProgressEvent) {
        let (loaded, total) = event.counts();
        if loaded == total {
            eprintln!("{}: {loaded}/{total}", ConsoleProgress::label(&event));
        }
    }
}
