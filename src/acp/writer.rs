//! ACP writer task.
//!
//! Serialises outbound JSON values to single-line JSON and writes each one,
//! `\n`-terminated, to the agent's stdin. All writes for one agent go
//! through this task, so calls, notifications and permission replies never
//! interleave mid-line.

use serde_json::Value;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{AppError, Result};

/// Encode `value` as one NDJSON line.
///
/// # Errors
///
/// Returns [`AppError::Acp`] if serialisation fails.
pub fn encode_line(value: &Value) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec(value)
        .map_err(|e| AppError::Acp(format!("failed to serialise outbound message: {e}")))?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Write loop over the agent's stdin.
///
/// Exits when `cancel` fires or every sender is dropped. Dropping the sink
/// on exit closes the agent's stdin.
///
/// # Errors
///
/// Returns [`AppError::Acp`]`("write failed: …")` when the agent's stdin is
/// gone. The caller is expected to tear the transport down.
pub async fn run_writer<W>(
    label: String,
    mut stdin: W,
    mut msg_rx: mpsc::Receiver<Value>,
    cancel: CancellationToken,
) -> Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(channel_key = %label, "acp writer: cancellation received, stopping");
                break;
            }

            msg = msg_rx.recv() => {
                let Some(value) = msg else {
                    debug!(channel_key = %label, "acp writer: message channel closed, stopping");
                    break;
                };

                let bytes = encode_line(&value)?;
                let written = async {
                    stdin.write_all(&bytes).await?;
                    stdin.flush().await
                }
                .await;

                if let Err(e) = written {
                    warn!(channel_key = %label, error = %e, "acp writer: write to stdin failed");
                    return Err(AppError::Acp(format!("write failed: {e}")));
                }
            }
        }
    }

    Ok(())
}
