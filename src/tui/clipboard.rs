use anyhow::{anyhow, Context, Result};
use std::sync::mpsc as std_mpsc;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::warn;

/// Some Linux clipboard managers only read the selection while its owner is alive.
const HOLD_SELECTION_FOR: Duration = Duration::from_secs(2);

static CLIPBOARD_SENDER: OnceLock<std_mpsc::Sender<String>> = OnceLock::new();

/// Start the clipboard thread on first use. Copies are applied one at a
/// time, each holding the selection for a short while.
fn clipboard_sender() -> Result<&'static std_mpsc::Sender<String>> {
    if let Some(sender) = CLIPBOARD_SENDER.get() {
        return Ok(sender);
    }

    let (tx, rx) = std_mpsc::channel::<String>();
    std::thread::Builder::new()
        .name("clipboard".into())
        .spawn(move || {
            for text in rx {
                match arboard::Clipboard::new() {
                    Ok(mut clipboard) => match clipboard.set_text(text) {
                        Ok(()) => std::thread::sleep(HOLD_SELECTION_FOR),
                        Err(e) => warn!("Setting clipboard text failed: {}", e),
                    },
                    Err(e) => warn!("Clipboard unavailable: {}", e),
                }
            }
        })
        .context("spawn clipboard thread")?;

    Ok(CLIPBOARD_SENDER.get_or_init(|| tx))
}

/// Queue `text` for the clipboard and return without waiting.
pub fn copy_to_clipboard(text: &str) -> Result<()> {
    clipboard_sender()?
        .send(text.to_string())
        .map_err(|_| anyhow!("Clipboard thread has stopped"))
}
