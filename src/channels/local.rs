use super::{ENQUEUE_TIMEOUT_MS, Message};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;

/// Local line-oriented ingest: one message per line, CR/LF trimmed, empties
/// dropped. The enqueue wait is bounded so a wedged agent can only cost each
/// line 100ms, never block the reader.
pub async fn run_ingest<R>(reader: R, input_tx: mpsc::Sender<Message>) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim_matches(['\r', '\n', ' ', '\t']);
        if trimmed.is_empty() {
            continue;
        }
        match input_tx
            .send_timeout(
                Message::local(trimmed),
                Duration::from_millis(ENQUEUE_TIMEOUT_MS),
            )
            .await
        {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(_)) => {
                tracing::warn!("Input queue full, dropping local line");
            }
            Err(SendTimeoutError::Closed(_)) => return Ok(()),
        }
    }
    Ok(())
}

/// Local egress: write each reply as one LF-terminated line.
pub async fn run_egress<W>(mut writer: W, mut rx: mpsc::Receiver<String>) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(text) = rx.recv().await {
        writer.write_all(text.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    Ok(())
}
