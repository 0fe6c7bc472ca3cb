//! TCP plumbing towards the graphics engine
//!
//! [`Transport`] is picked once at startup. `Null` stands in when no socket
//! should be opened at all; the session then runs in mock mode.
//!
//! An open connection is a [`Link`]: one task owns the socket, writes queued
//! commands and drains replies. Callers only ever push onto a channel, so a
//! stalled engine never blocks them.

use caspar_amcp::{format_command, TransportError, DEFAULT_WRITE_TIMEOUT_MS};
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

#[derive(Debug, Clone)]
pub enum Transport {
    Tcp(TcpTransport),
    Null,
}

#[derive(Debug, Clone)]
pub struct TcpTransport {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
    /// Longest a single command may take to reach the socket
    pub write_timeout: Duration,
}

impl TcpTransport {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Transport {
    /// Whether sockets can be opened. Scheduling is only done when they can.
    pub fn is_available(&self) -> bool {
        matches!(self, Transport::Tcp(_))
    }

    pub fn describe(&self) -> String {
        match self {
            Transport::Tcp(tcp) => format!("tcp://{}", tcp.addr()),
            Transport::Null => "mock".to_string(),
        }
    }

    pub fn write_timeout(&self) -> Duration {
        match self {
            Transport::Tcp(tcp) => tcp.write_timeout,
            Transport::Null => Duration::from_millis(DEFAULT_WRITE_TIMEOUT_MS),
        }
    }

    /// Open a connection, giving up after the configured timeout
    pub async fn open(&self) -> Result<(OwnedReadHalf, OwnedWriteHalf), TransportError> {
        let Transport::Tcp(tcp) = self else {
            return Err(TransportError::Unavailable);
        };
        let addr = tcp.addr();
        match tokio::time::timeout(tcp.connect_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => {
                stream.set_nodelay(true)?;
                Ok(stream.into_split())
            }
            Ok(Err(e)) => Err(TransportError::Io(e)),
            Err(_) => Err(TransportError::Timeout {
                addr,
                timeout_ms: tcp.connect_timeout.as_millis() as u64,
            }),
        }
    }
}

/// A live connection to the engine
pub struct Link {
    commands: mpsc::UnboundedSender<String>,
    task: JoinHandle<()>,
}

impl Link {
    /// Start the connection task.
    ///
    /// `on_close` runs when the engine hangs up, a read fails or a write
    /// misses `write_timeout`. It does not run after [`Link::close`].
    pub fn spawn<F>(
        reader: OwnedReadHalf,
        writer: OwnedWriteHalf,
        write_timeout: Duration,
        on_close: F,
    ) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (commands, queue) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_link(reader, writer, queue, write_timeout, on_close));
        Self { commands, task }
    }

    /// Queue one command. Fails only once the connection task is gone.
    pub fn send(&self, body: String) -> io::Result<()> {
        self.commands
            .send(body)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "engine link is closed"))
    }

    /// Flush what is queued, half-close the socket and stop the task.
    /// Waits at most `grace` before aborting.
    pub async fn close(self, grace: Duration) {
        let Link { commands, mut task } = self;
        drop(commands);
        if tokio::time::timeout(grace, &mut task).await.is_err() {
            debug!("Link did not drain in time, aborting");
            task.abort();
        }
    }
}

async fn run_link<F>(
    reader: OwnedReadHalf,
    mut writer: OwnedWriteHalf,
    mut queue: mpsc::UnboundedReceiver<String>,
    write_timeout: Duration,
    on_close: F,
) where
    F: Future<Output = ()>,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        tokio::select! {
            command = queue.recv() => match command {
                Some(body) => {
                    if let Err(e) = write_line(&mut writer, &body, write_timeout).await {
                        error!(error = %e, command = %body, "Failed to write to engine");
                        break;
                    }
                }
                None => {
                    if let Err(e) = writer.shutdown().await {
                        debug!(error = %e, "Socket shutdown failed");
                    }
                    return;
                }
            },
            line = lines.next_line() => match line {
                Ok(Some(line)) => log_reply(&line),
                Ok(None) => {
                    debug!("Engine closed the connection");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read from engine");
                    break;
                }
            },
        }
    }
    on_close.await;
}

async fn write_line(writer: &mut OwnedWriteHalf, body: &str, deadline: Duration) -> io::Result<()> {
    let line = format_command(body);
    let write = async {
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await
    };
    tokio::time::timeout(deadline, write).await.map_err(|_| {
        io::Error::new(
            io::ErrorKind::TimedOut,
            format!("write timed out after {}ms", deadline.as_millis()),
        )
    })?
}

/// AMCP status code at the start of a reply line, e.g. `202` in `202 CG OK`
pub fn reply_code(line: &str) -> Option<u16> {
    let code = line.get(..3)?;
    if !code.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    code.parse().ok()
}

fn log_reply(line: &str) {
    match reply_code(line) {
        Some(code) if code >= 400 => warn!(code, reply = line, "Engine rejected command"),
        _ => debug!(reply = line, "Engine reply"),
    }
}
