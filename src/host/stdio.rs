//! Stdin/stdout JSON bridge for the host command channel.
//!
//! Reads newline-delimited JSON `CommandEnvelope` messages, dispatches them
//! through the `HostCommandServer` router, and writes `ResponseEnvelope`
//! and `EventEnvelope` messages as newline-delimited JSON.
//!
//! Stdout is exclusively reserved for the JSON protocol; all diagnostic
//! output (tracing, logs) must be routed to stderr.

use crate::config::CalminderConfig;
use crate::engine::SystemClock;
use crate::error::{EngineError, Result};
use crate::host::channel::{HostCommandClient, command_channel_with_events};
use crate::host::contract::{CommandEnvelope, CommandName, EventEnvelope, ResponseEnvelope};
use crate::host::engines::spawn_engines;
use crate::sync::SourceSyncer;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::{Mutex, broadcast};

/// Spawn both engines and serve them over stdin/stdout until stdin closes
/// or a `host.shutdown` command is received.
pub async fn run_stdio_bridge(config: CalminderConfig, syncer: Arc<dyn SourceSyncer>) -> Result<()> {
    run_bridge(
        config,
        syncer,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await
}

/// Run the JSON bridge over arbitrary line-oriented streams.
///
/// The router and an event forwarder run as their own tasks while this
/// task reads commands; responses and events share one locked writer so
/// lines never interleave.
///
/// The bridge exits when the reader finishes. Dropping the client and the
/// engine handles lets the server and engine tasks exit on their own.
pub async fn run_bridge<R, W>(
    config: CalminderConfig,
    syncer: Arc<dyn SourceSyncer>,
    input: R,
    output: W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (event_tx, _event_rx) = broadcast::channel(config.host.event_capacity.max(1));
    let handles = spawn_engines(&config, syncer, Arc::new(SystemClock), event_tx.clone());

    if config.host.autostart {
        handles.reminders.start().await?;
        handles.sync.start().await?;
        tracing::info!("engines autostarted");
    }

    let (client, server) =
        command_channel_with_events(config.host.request_capacity, event_tx, handles);
    let writer = Arc::new(Mutex::new(BufWriter::new(output)));

    let server_handle = tokio::spawn(server.run());

    let event_handle = tokio::spawn(forward_events(
        client.subscribe_events(),
        Arc::clone(&writer),
    ));

    let reader_result = run_reader(client, input, Arc::clone(&writer)).await;

    event_handle.abort();
    let _ = event_handle.await;
    let _ = server_handle.await;

    reader_result
}

/// Copy broadcast events to the output until it fails or the stream closes.
async fn forward_events<W>(
    mut events: broadcast::Receiver<EventEnvelope>,
    writer: Arc<Mutex<BufWriter<W>>>,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let envelope = match events.recv().await {
            Ok(envelope) => envelope,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "host event stream lagged; events dropped");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        let json = match serde_json::to_string(&envelope) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, event = %envelope.event, "unencodable event skipped");
                continue;
            }
        };
        let mut w = writer.lock().await;
        if let Err(e) = write_line(&mut *w, &json).await {
            tracing::warn!(error = %e, "event output closed; forwarder exiting");
            break;
        }
    }
}

/// Read line-by-line, dispatch each command, and write responses.
async fn run_reader<R, W>(
    client: HostCommandClient,
    mut reader: R,
    writer: Arc<Mutex<BufWriter<W>>>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader
            .read_line(&mut line)
            .await
            .map_err(|e| EngineError::Channel(format!("failed to read command stream: {e}")))?;

        if bytes_read == 0 {
            tracing::info!("command stream closed (EOF); shutting down bridge");
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let envelope: CommandEnvelope = match serde_json::from_str(trimmed) {
            Ok(env) => env,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    raw_line = %trimmed,
                    "failed to parse command envelope"
                );
                let error_response = ResponseEnvelope::error(
                    "parse-error",
                    format!("failed to parse command envelope: {e}"),
                );
                write_response(&writer, &error_response).await?;
                continue;
            }
        };

        let request_id = envelope.request_id.clone();
        let is_shutdown = envelope.command == CommandName::HostShutdown;

        let response = match client.send(envelope).await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::error!(error = %e, "host command dispatch failed");
                ResponseEnvelope::error(request_id, format!("dispatch failed: {e}"))
            }
        };
        write_response(&writer, &response).await?;

        if is_shutdown {
            tracing::info!("host.shutdown received; shutting down bridge");
            break;
        }
    }

    Ok(())
}

async fn write_response<W: AsyncWrite + Unpin>(
    writer: &Mutex<BufWriter<W>>,
    response: &ResponseEnvelope,
) -> Result<()> {
    let json = serde_json::to_string(response)
        .map_err(|e| EngineError::Contract(format!("failed to serialize response envelope: {e}")))?;
    let mut w = writer.lock().await;
    write_line(&mut *w, &json).await
}

/// Write a single JSON line and flush.
async fn write_line<W: AsyncWrite + Unpin>(writer: &mut BufWriter<W>, json: &str) -> Result<()> {
    writer
        .write_all(json.as_bytes())
        .await
        .map_err(|e| EngineError::Channel(format!("failed to write output: {e}")))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| EngineError::Channel(format!("failed to write newline: {e}")))?;
    writer
        .flush()
        .await
        .map_err(|e| EngineError::Channel(format!("failed to flush output: {e}")))?;
    Ok(())
}
