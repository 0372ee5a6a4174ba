//! `serialagent logs` — tail the detached instance's log file.
//!
//! Foreground runs (`serve` without `--detach`) only ever log to stderr, so
//! this only has something to show for a previously `--detach`ed instance.

use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::time::Duration;

/// Print the last `lines` lines of `log_path`. If `follow`, keep polling the
/// file for new content (like `tail -f`) until interrupted with Ctrl+C.
pub fn run(log_path: &Path, lines: usize, follow: bool) -> anyhow::Result<()> {
    if !log_path.exists() {
        println!("No log file at {} yet.", log_path.display());
        return Ok(());
    }

    let content = std::fs::read_to_string(log_path)
        .map_err(|e| anyhow::anyhow!("reading {}: {e}", log_path.display()))?;
    let tail = tail_lines(&content, lines);
    for line in &tail {
        println!("{line}");
    }

    if follow {
        let mut offset = content.len() as u64;
        loop {
            std::thread::sleep(Duration::from_millis(500));
            let mut file = std::fs::File::open(log_path)?;
            let len = file.metadata()?.len();
            if len < offset {
                // File was truncated/rotated; start over from the beginning.
                offset = 0;
            }
            if len > offset {
                file.seek(SeekFrom::Start(offset))?;
                let mut buf = String::new();
                file.read_to_string(&mut buf)?;
                print!("{buf}");
                offset = len;
            }
        }
    }

    Ok(())
}

/// Return the last `n` non-empty trailing lines of `text`, in order.
fn tail_lines(text: &str, n: usize) -> Vec<&str> {
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(n);
    all[start..].to_vec()
}
