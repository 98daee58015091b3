//! Agent TCP Server
//!
//! One task per accepted connection. A connection carries one request and
//! one response, except `subscribe` which streams events until the peer or
//! the agent goes away.

use crate::codec::{read_frame, write_frame, DEFAULT_MAX_FRAME_BYTES};
use crate::handler::{AgentHandler, Reply};
use crate::types::ErrorResponse;
use perfagent_core::application::ShutdownToken;
use perfagent_core::domain::JobEvent;
use serde_json::Value;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 9999;
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Server Configuration
#[derive(Debug, Clone)]
pub struct AgentServerConfig {
    pub host: String,
    pub port: u16,
    pub max_frame_bytes: usize,
}

impl Default for AgentServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

/// Bound agent server
pub struct AgentServer {
    listener: TcpListener,
    handler: Arc<AgentHandler>,
    max_frame_bytes: usize,
}

impl AgentServer {
    /// Bind the listening socket. Port 0 picks a free port.
    pub async fn bind(config: AgentServerConfig, handler: Arc<AgentHandler>) -> io::Result<Self> {
        let addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&addr).await?;

        info!(
            addr = %listener.local_addr()?,
            max_frame_bytes = config.max_frame_bytes,
            "Agent listening"
        );

        Ok(Self {
            listener,
            handler,
            max_frame_bytes: config.max_frame_bytes,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop. Returns once shutdown is requested.
    pub async fn run(self, mut shutdown: ShutdownToken) {
        loop {
            tokio::select! {
                _ = shutdown.wait() => {
                    info!("Agent server shutting down");
                    break;
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!(peer = %peer, "Connection accepted");
                            let handler = self.handler.clone();
                            let max_frame_bytes = self.max_frame_bytes;
                            let shutdown = shutdown.clone();
                            tokio::spawn(async move {
                                if let Err(e) =
                                    serve_connection(stream, handler, max_frame_bytes, shutdown).await
                                {
                                    debug!(peer = %peer, error = %e, "Connection ended with error");
                                }
                            });
                        }
                        Err(e) => {
                            // Transient (e.g. EMFILE); keep serving
                            error!(error = %e, "Accept failed");
                        }
                    }
                }
            }
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    handler: Arc<AgentHandler>,
    max_frame_bytes: usize,
    shutdown: ShutdownToken,
) -> Result<(), crate::ProtocolError> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let frame = match read_frame(&mut reader, max_frame_bytes).await {
        Ok(Some(frame)) => frame,
        // connect-and-close, e.g. a ping
        Ok(None) => return Ok(()),
        Err(e) => {
            warn!(error = %e, "Unreadable request");
            write_frame(&mut write_half, &ErrorResponse::from(&e)).await?;
            write_half.shutdown().await?;
            // Discard unread input so closing does not reset the connection
            // before the peer has read the error
            let _ = tokio::time::timeout(
                DRAIN_TIMEOUT,
                tokio::io::copy(&mut reader, &mut tokio::io::sink()),
            )
            .await;
            return Ok(());
        }
    };

    match handler.handle(&frame).await {
        Reply::Respond(response) => {
            write_frame(&mut write_half, &response).await?;
        }
        Reply::Stream { ack, events } => {
            stream_events(reader, &mut write_half, ack, events, shutdown).await?;
        }
    }

    write_half.shutdown().await?;
    Ok(())
}

async fn stream_events(
    mut reader: BufReader<OwnedReadHalf>,
    writer: &mut OwnedWriteHalf,
    ack: Value,
    mut events: mpsc::UnboundedReceiver<JobEvent>,
    mut shutdown: ShutdownToken,
) -> Result<(), crate::ProtocolError> {
    write_frame(writer, &ack).await?;

    let mut scratch = [0u8; 256];
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => write_frame(writer, &event).await?,
                None => break,
            },
            // anything read after subscribing is ignored; EOF ends the stream
            read = reader.read(&mut scratch) => match read {
                Ok(0) | Err(_) => {
                    debug!("Subscriber disconnected");
                    break;
                }
                Ok(_) => {}
            },
            _ = shutdown.wait() => break,
        }
    }
    Ok(())
}
