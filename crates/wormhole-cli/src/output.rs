//! Terminal output and file placement

use std::path::{Path, PathBuf};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc::UnboundedReceiver;
use wormhole_core::{StatusEvent, TransferStatus};

/// Name used when the sender's filename has nothing usable left
const FALLBACK_FILENAME: &str = "download";

/// Reduce a remote filename to its final path component.
pub fn sanitize_filename(name: &str) -> String {
    let last = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    match last {
        "" | "." | ".." => FALLBACK_FILENAME.to_string(),
        other => other.to_string(),
    }
}

/// First path in `dir` named `filename`, or `stem (n).ext` if taken.
pub fn unique_path(dir: &Path, filename: &str) -> PathBuf {
    let candidate = dir.join(filename);
    if !candidate.exists() {
        return candidate;
    }

    let name = Path::new(filename);
    let stem = name
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.to_string());
    let extension = name
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    (1u32..)
        .map(|n| dir.join(format!("{} ({}){}", stem, n, extension)))
        .find(|path| !path.exists())
        .unwrap_or(candidate)
}

/// MIME type for an outgoing file: by extension, then by content sniffing.
pub fn mime_for_path(path: &Path, data: &[u8]) -> String {
    let by_extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .and_then(|e| {
            let mime = match e.as_str() {
                "txt" | "log" => "text/plain",
                "md" => "text/markdown",
                "csv" => "text/csv",
                "html" | "htm" => "text/html",
                "css" => "text/css",
                "js" => "text/javascript",
                "json" => "application/json",
                "xml" => "application/xml",
                "svg" => "image/svg+xml",
                _ => return None,
            };
            Some(mime.to_string())
        });

    by_extension
        .or_else(|| infer::get(data).map(|kind| kind.mime_type().to_string()))
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

/// Human-readable byte count
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn byte_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::with_template(
        "[{elapsed_precise}] {bar:40.cyan/blue} {bytes:>9}/{total_bytes:9} {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("##-");
    pb.set_style(style);
    pb
}

/// Drive a spinner or progress bar from status events until the sender side
/// of the channel closes.
///
/// Returns the last terminal event seen, which carries the file for a
/// successful receive or the message for a failed one.
pub async fn report(mut rx: UnboundedReceiver<StatusEvent>) -> Option<StatusEvent> {
    let mut bar: Option<ProgressBar> = None;
    let mut terminal = None;

    while let Some(event) = rx.recv().await {
        match event.status {
            TransferStatus::Progress => {
                if let Some(progress) = event.progress {
                    let pb = bar.get_or_insert_with(|| byte_bar(progress.total));
                    pb.set_length(progress.total);
                    pb.set_position(progress.loaded);
                }
            }
            TransferStatus::Downloading => {
                if let Some(pb) = bar.take() {
                    pb.finish_and_clear();
                }
                let total = event.metadata.as_ref().map(|m| m.size).unwrap_or(0);
                let pb = byte_bar(total);
                pb.set_message(event.message.clone());
                bar = Some(pb);
            }
            status if status.is_terminal() => {
                if let Some(pb) = bar.take() {
                    pb.finish_and_clear();
                }
                terminal = Some(event);
            }
            _ => {
                match &bar {
                    Some(pb) => pb.set_message(event.message.clone()),
                    None => bar = Some(spinner(&event.message)),
                }
                // Sent is the hand-off point; the caller prints the code
                if event.status == TransferStatus::Sent {
                    if let Some(pb) = bar.take() {
                        pb.finish_and_clear();
                    }
                }
            }
        }
    }

    if let Some(pb) = bar.take() {
        pb.finish_and_clear();
    }
    terminal
}
