//! Local key input → key names for the control channel.
//!
//! Accepts X keysym names directly (`Up`, `Return`) as well as Linux
//! input event names (`KEY_UP`, `key_enter`), which are translated.

use std::io::BufRead;

use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Buffer between the reader thread and the control channel.
pub const KEY_QUEUE_DEPTH: usize = 16;

/// Input event names whose keysym is not just the lowercased suffix.
const KEYSYM_ALIASES: &[(&str, &str)] = &[
    ("up", "Up"),
    ("left", "Left"),
    ("right", "Right"),
    ("down", "Down"),
    ("enter", "Return"),
    ("f1", "F1"),
    ("f2", "F2"),
    ("f3", "F3"),
    ("f4", "F4"),
    ("backspace", "BackSpace"),
];

/// Translate one line of input into a key name, `None` for blank lines.
pub fn key_name(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    let event_name = input
        .get(..4)
        .filter(|prefix| prefix.eq_ignore_ascii_case("KEY_"))
        .map(|_| &input[4..]);

    match event_name {
        Some(suffix) if !suffix.is_empty() => {
            let suffix = suffix.to_ascii_lowercase();
            let name = KEYSYM_ALIASES
                .iter()
                .find(|(event, _)| *event == suffix)
                .map(|(_, keysym)| keysym.to_string())
                .unwrap_or(suffix);
            Some(name)
        }
        _ => Some(input.to_string()),
    }
}

/// Forward every key name read from `reader` until it ends or the control
/// channel stops listening. Blocks; run it on its own thread.
pub fn forward_keys<R: BufRead>(reader: R, keys: mpsc::Sender<String>) {
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("input: read failed: {e}");
                return;
            }
        };
        let Some(name) = key_name(&line) else {
            continue;
        };
        if keys.blocking_send(name).is_err() {
            debug!("input: control channel gone");
            return;
        }
    }
    debug!("input: end of input");
}

/// Read key names from stdin on a plain thread, which a pending read
/// never keeps alive past runtime shutdown.
pub fn spawn_stdin_keys() -> std::io::Result<mpsc::Receiver<String>> {
    let (tx, rx) = mpsc::channel(KEY_QUEUE_DEPTH);
    std::thread::Builder::new()
        .name("vdrfe-keys".into())
        .spawn(move || forward_keys(std::io::stdin().lock(), tx))?;
    Ok(rx)
}

// ── Tests ────────────────────────────────────────────────────────
