//! Connection session towards the graphics engine
//!
//! One [`Session`] exists per process. It owns the TCP link, the overlay
//! bookkeeping and the update scheduler. Every operation is fail-open: the
//! HTTP layer only ever sees booleans and status structs, never transport
//! errors, so the controller stays usable while the engine is unreachable.
//!
//! Visibility and the last clock value record what was *sent*, not what the
//! engine acknowledged. AMCP replies are drained and logged but not matched to
//! commands.
//!
//! The state lock is never held across socket I/O. Commands are queued on the
//! [`Link`] and written by its own task, so a stalled engine cannot hold up
//! status queries or the HTTP handlers.

use crate::clock::{format_hhmm, format_hms, Clock};
use crate::scheduler::UpdateScheduler;
use crate::transport::{Link, Transport};
use caspar_amcp::{
    ClockState, ClockUpdateResult, Command, ConnectionState, ConnectionStatus,
    ConnectionStatusDetails, Mode, Target, TransportError,
};
use std::io;
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub target: Target,
    pub auto_update: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            target: Target::default(),
            auto_update: true,
        }
    }
}

struct SessionState {
    connection: ConnectionState,
    link: Option<Link>,
    /// Bumped for every new or torn down link so stale reply readers are ignored
    generation: u64,
    auto_update_enabled: bool,
    visibility: bool,
    last_command: Option<String>,
    last_time: Option<String>,
    scheduler: UpdateScheduler,
}

struct Inner {
    transport: Transport,
    clock: Arc<dyn Clock>,
    target: Target,
    state: Mutex<SessionState>,
    connect_gate: Mutex<()>,
}

/// Cheap to clone; all clones share the same session
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

fn connection_status(connected: bool, message: impl Into<String>) -> ConnectionStatus {
    ConnectionStatus {
        connected,
        message: message.into(),
    }
}

impl Session {
    pub fn new(transport: Transport, clock: Arc<dyn Clock>, options: SessionOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                clock,
                target: options.target,
                state: Mutex::new(SessionState {
                    connection: ConnectionState::Disconnected,
                    link: None,
                    generation: 0,
                    auto_update_enabled: options.auto_update,
                    visibility: false,
                    last_command: None,
                    last_time: None,
                    scheduler: UpdateScheduler::new(),
                }),
                connect_gate: Mutex::new(()),
            }),
        }
    }

    pub async fn connect(&self) -> ConnectionStatus {
        if !self.inner.transport.is_available() {
            warn!("No transport available, running in mock mode");
            return connection_status(true, "Mock connection (no transport available)");
        }

        // one attempt at a time; the state lock is not held across the timeout
        let _gate = self.inner.connect_gate.lock().await;
        {
            let mut state = self.inner.state.lock().await;
            if state.connection == ConnectionState::Connected && state.link.is_some() {
                return connection_status(true, "Already connected");
            }
            state.connection = ConnectionState::Connecting;
        }

        let addr = self.inner.transport.describe();
        let opened = self.inner.transport.open().await;
        let mut state = self.inner.state.lock().await;
        let (reader, writer) = match opened {
            Ok(halves) => halves,
            Err(e) => {
                state.connection = ConnectionState::Disconnected;
                state.link = None;
                return match &e {
                    TransportError::Timeout { .. } => {
                        warn!(addr = %addr, error = %e, "Connection timeout");
                        connection_status(false, "Connection timeout")
                    }
                    TransportError::Io(io) => {
                        error!(addr = %addr, error = %io, "Socket error");
                        connection_status(false, format!("Connection error: {io}"))
                    }
                    other => {
                        error!(addr = %addr, error = %other, "Socket error");
                        connection_status(false, format!("Connection error: {other}"))
                    }
                };
            }
        };

        state.generation += 1;
        state.link = Some(Link::spawn(
            reader,
            writer,
            self.inner.transport.write_timeout(),
            Self::link_closed(Arc::downgrade(&self.inner), state.generation),
        ));
        state.connection = ConnectionState::Connected;
        info!(addr = %addr, "Connected to CasparCG");

        let add_template = Command::AddTemplate.render(&self.inner.target);
        let template_added = match Self::write_locked(&mut state, add_template) {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "Failed to add template");
                false
            }
        };

        if state.auto_update_enabled {
            self.arm_locked(&mut state);
        }

        if template_added {
            connection_status(true, "Connected and template added")
        } else {
            connection_status(true, "Connected but failed to add template")
        }
    }

    /// Fire-and-forget. Always `true`; failures are only logged.
    pub async fn send_command(&self, text: &str) -> bool {
        let mut state = self.inner.state.lock().await;
        self.send_locked(&mut state, text.to_string())
    }

    pub async fn update_clock(&self) -> ClockUpdateResult {
        let mut state = self.inner.state.lock().await;
        self.update_clock_locked(&mut state)
    }

    pub async fn toggle_overlay(&self, visible: bool) -> bool {
        let mut state = self.inner.state.lock().await;
        if state.visibility == visible {
            debug!(visible, "Overlay already in requested state");
            return true;
        }
        let body = Command::Overlay { visible }.render(&self.inner.target);
        let success = self.send_locked(&mut state, body);
        state.visibility = visible;
        success
    }

    pub async fn set_auto_update(&self, enabled: bool) -> bool {
        let mut state = self.inner.state.lock().await;
        state.auto_update_enabled = enabled;
        if enabled && self.inner.transport.is_available() {
            self.arm_locked(&mut state);
        } else {
            state.scheduler.disarm();
        }
        info!(enabled, "Auto-update setting changed");
        true
    }

    /// Hide the overlay and drop the link. A no-op without a transport.
    ///
    /// The hide command is flushed before the socket closes, bounded by the
    /// transport's write timeout.
    pub async fn close_connection(&self) {
        if !self.inner.transport.is_available() {
            return;
        }
        let link = {
            let mut state = self.inner.state.lock().await;
            state.scheduler.disarm();
            if state.link.is_none() {
                state.connection = ConnectionState::Disconnected;
                return;
            }

            let hide = Command::Overlay { visible: false }.render(&self.inner.target);
            self.send_locked(&mut state, hide);
            state.visibility = false;

            state.generation += 1;
            state.connection = ConnectionState::Disconnected;
            state.link.take()
        };
        if let Some(link) = link {
            link.close(self.inner.transport.write_timeout()).await;
        }
        info!("Connection closed");
    }

    pub async fn shutdown(&self) {
        info!("Shutting down...");
        self.close_connection().await;
    }

    pub async fn status(&self) -> ConnectionStatusDetails {
        let state = self.inner.state.lock().await;
        ConnectionStatusDetails {
            is_connected: state.connection == ConnectionState::Connected,
            current_time: state.last_time.clone(),
            is_visible: state.visibility,
            auto_update_enabled: state.auto_update_enabled,
            last_command: state.last_command.clone(),
            next_update_time: state.scheduler.next_update_at().map(|at| format_hms(&at)),
            mode: self.mode_of(&state),
        }
    }

    pub async fn state(&self) -> ClockState {
        let state = self.inner.state.lock().await;
        ClockState {
            is_connected: state.connection == ConnectionState::Connected,
            current_time: state.last_time.clone(),
            is_visible: state.visibility,
        }
    }

    fn mode_of(&self, state: &SessionState) -> Mode {
        if self.inner.transport.is_available() && state.connection == ConnectionState::Connected {
            Mode::Real
        } else {
            Mode::Mock
        }
    }

    fn update_clock_locked(&self, state: &mut SessionState) -> ClockUpdateResult {
        let time = format_hhmm(&self.inner.clock.now());
        state.last_time = Some(time.clone());
        let body = Command::UpdateClock { time: time.clone() }.render(&self.inner.target);
        let success = self.send_locked(state, body);
        // an update always reveals the overlay
        state.visibility = true;
        info!(time = %time, "Clock updated");
        ClockUpdateResult { success, time }
    }

    fn send_locked(&self, state: &mut SessionState, body: String) -> bool {
        if !self.inner.transport.is_available() {
            debug!(command = %body, "Mock mode, command not sent");
            state.last_command = Some(body);
            return true;
        }
        if state.connection != ConnectionState::Connected {
            warn!(command = %body, "Not connected to CasparCG");
            state.last_command = Some(body);
            return true;
        }
        info!(command = %body, "Sending command");
        if let Err(e) = Self::write_locked(state, body) {
            error!(error = %e, "Failed to send command");
        }
        true
    }

    fn write_locked(state: &mut SessionState, body: String) -> io::Result<()> {
        let result = match state.link.as_ref() {
            Some(link) => link.send(body.clone()),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "no open link")),
        };
        state.last_command = Some(body);
        result
    }

    fn arm_locked(&self, state: &mut SessionState) {
        let weak = Arc::downgrade(&self.inner);
        state
            .scheduler
            .arm(Arc::clone(&self.inner.clock), move || {
                let weak = weak.clone();
                async move {
                    match weak.upgrade() {
                        Some(inner) => {
                            let session = Session { inner };
                            session.run_scheduled_update().await
                        }
                        None => false,
                    }
                }
            });
    }

    async fn run_scheduled_update(&self) -> bool {
        let mut state = self.inner.state.lock().await;
        if !state.auto_update_enabled {
            return false;
        }
        self.update_clock_locked(&mut state);
        true
    }

    async fn link_closed(inner: Weak<Inner>, generation: u64) {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        let mut state = inner.state.lock().await;
        if state.generation != generation {
            return;
        }
        state.link = None;
        state.connection = ConnectionState::Disconnected;
        info!("Link to engine lost");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::transport::{test_support, TcpTransport};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    const EOF: &str = "<eof>";

    /// Minimal engine: records every received line and answers `202 CG OK`
    struct FakeEngine {
        port: u16,
        lines: mpsc::UnboundedReceiver<String>,
        accepted: Arc<AtomicUsize>,
    }

    impl FakeEngine {
        async fn start() -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let port = listener.local_addr().unwrap().port();
            let (tx, lines) = mpsc::unbounded_channel();
            let accepted = Arc::new(AtomicUsize::new(0));
            let counter = Arc::clone(&accepted);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        let (read, mut write) = stream.into_split();
                        let mut reader = BufReader::new(read);
                        loop {
                            let mut line = String::new();
                            match reader.read_line(&mut line).await {
                                Ok(0) | Err(_) => {
                                    let _ = tx.send(EOF.to_string());
                                    break;
                                }
                                Ok(_) => {
                                    let _ = tx.send(line);
                                    let _ = write.write_all(b"202 CG OK\r\n").await;
                                }
                            }
                        }
                    });
                }
            });
            Self {
                port,
                lines,
                accepted,
            }
        }

        async fn next_line(&mut self) -> String {
            tokio::time::timeout(Duration::from_secs(2), self.lines.recv())
                .await
                .expect("engine received nothing")
                .expect("engine channel closed")
        }

        fn accepted(&self) -> usize {
            self.accepted.load(Ordering::SeqCst)
        }
    }

    fn tcp(port: u16) -> Transport {
        tcp_with_timeouts(port, Duration::from_secs(5), Duration::from_secs(5))
    }

    fn tcp_with_timeouts(port: u16, connect: Duration, write: Duration) -> Transport {
        Transport::Tcp(TcpTransport {
            host: "127.0.0.1".to_string(),
            port,
            connect_timeout: connect,
            write_timeout: write,
        })
    }

    fn session(transport: Transport, auto_update: bool) -> Session {
        Session::new(
            transport,
            Arc::new(FixedClock::at(14, 30, 0, 0)),
            SessionOptions {
                target: Target::default(),
                auto_update,
            },
        )
    }

    #[tokio::test]
    async fn mock_session_end_to_end() {
        let session = session(Transport::Null, true);

        let connected = session.connect().await;
        assert!(connected.connected);
        assert!(connected.message.starts_with("Mock connection"));

        let update = session.update_clock().await;
        assert_eq!(
            update,
            ClockUpdateResult {
                success: true,
                time: "14:30".to_string()
            }
        );
        assert!(session.state().await.is_visible);

        assert!(session.toggle_overlay(false).await);
        let status = session.status().await;
        assert!(!status.is_visible);
        assert!(!status.is_connected);
        assert_eq!(status.mode, Mode::Mock);
        assert_eq!(status.current_time.as_deref(), Some("14:30"));
        assert_eq!(
            status.last_command.as_deref(),
            Some(r#"CG 1 INVOKE 1 "leftTab('off')""#)
        );
    }

    #[tokio::test]
    async fn toggle_to_current_visibility_sends_nothing() {
        let session = session(Transport::Null, false);

        assert!(session.toggle_overlay(false).await);
        assert_eq!(session.status().await.last_command, None);

        assert!(session.toggle_overlay(true).await);
        assert!(session.send_command("INFO").await);
        assert!(session.toggle_overlay(true).await);
        assert_eq!(session.status().await.last_command.as_deref(), Some("INFO"));
    }

    #[tokio::test]
    async fn send_command_fails_open_when_disconnected() {
        let engine = FakeEngine::start().await;
        let session = session(tcp(engine.port), false);

        assert!(session.send_command("PING").await);
        let status = session.status().await;
        assert_eq!(status.last_command.as_deref(), Some("PING"));
        assert_eq!(status.mode, Mode::Mock);
        assert_eq!(engine.accepted(), 0);
    }

    #[tokio::test]
    async fn connect_adds_template_and_forwards_commands() {
        let mut engine = FakeEngine::start().await;
        let session = session(tcp(engine.port), false);

        let connected = session.connect().await;
        assert_eq!(
            connected,
            connection_status(true, "Connected and template added")
        );
        assert_eq!(engine.next_line().await, "CG 1 ADD 1 main/MAIN 1\r\n");

        let update = session.update_clock().await;
        assert!(update.success);
        assert_eq!(
            engine.next_line().await,
            "CG 1 INVOKE 1 \"leftTab('on', 'BBC NEWS 14:30')\"\r\n"
        );

        assert!(session.toggle_overlay(false).await);
        assert_eq!(
            engine.next_line().await,
            "CG 1 INVOKE 1 \"leftTab('off')\"\r\n"
        );

        let status = session.status().await;
        assert!(status.is_connected);
        assert_eq!(status.mode, Mode::Real);
        assert!(!status.is_visible);
    }

    #[tokio::test]
    async fn second_connect_reuses_the_link() {
        let mut engine = FakeEngine::start().await;
        let session = session(tcp(engine.port), false);

        assert!(session.connect().await.connected);
        engine.next_line().await;

        let again = session.connect().await;
        assert_eq!(again, connection_status(true, "Already connected"));
        assert_eq!(engine.accepted(), 1);
    }

    #[tokio::test]
    async fn refused_connect_reports_error_and_stays_disconnected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let session = session(tcp(port), true);

        let result = session.connect().await;
        assert!(!result.connected);
        assert!(result.message.starts_with("Connection error: "));

        let status = session.status().await;
        assert!(!status.is_connected);
        assert_eq!(status.next_update_time, None);
        assert_eq!(status.mode, Mode::Mock);
    }

    #[tokio::test]
    async fn unanswered_connect_times_out_and_stays_disconnected() {
        let engine = test_support::backlogged().await;
        let session = session(
            tcp_with_timeouts(engine.port, Duration::from_millis(200), Duration::from_secs(5)),
            true,
        );

        let result = session.connect().await;
        assert_eq!(result, connection_status(false, "Connection timeout"));

        let status = session.status().await;
        assert!(!status.is_connected);
        assert_eq!(status.next_update_time, None);
        assert_eq!(status.mode, Mode::Mock);
    }

    #[tokio::test]
    async fn stalled_engine_does_not_block_other_operations() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        // accepts, then never reads
        let held = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            std::future::pending::<()>().await;
        });

        let session = session(
            tcp_with_timeouts(port, Duration::from_secs(5), Duration::from_millis(300)),
            false,
        );
        assert!(session.connect().await.connected);

        let big = "X".repeat(64 * 1024 * 1024);
        let sent = tokio::time::timeout(Duration::from_secs(1), session.send_command(&big))
            .await
            .expect("send_command blocked on the socket");
        assert!(sent);

        let status = tokio::time::timeout(Duration::from_secs(1), session.status())
            .await
            .expect("status blocked behind a stalled write");
        assert_eq!(status.last_command.as_deref().map(str::len), Some(big.len()));
        assert!(
            tokio::time::timeout(Duration::from_secs(1), session.toggle_overlay(true))
                .await
                .expect("toggle blocked behind a stalled write")
        );

        // the write deadline drops the link
        tokio::time::timeout(Duration::from_secs(3), async {
            while session.status().await.is_connected {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("stalled link was never dropped");

        tokio::time::timeout(Duration::from_secs(1), session.close_connection())
            .await
            .expect("close blocked");
        held.abort();
    }

    #[tokio::test]
    async fn connect_arms_scheduler_when_auto_update_enabled() {
        let mut engine = FakeEngine::start().await;
        let session = session(tcp(engine.port), true);

        session.connect().await;
        engine.next_line().await;
        let status = session.status().await;
        assert_eq!(status.next_update_time.as_deref(), Some("14:31:00"));
    }

    #[tokio::test]
    async fn auto_update_toggles_the_schedule() {
        let engine = FakeEngine::start().await;
        let session = session(tcp(engine.port), false);
        assert_eq!(session.status().await.next_update_time, None);

        for _ in 0..3 {
            assert!(session.set_auto_update(true).await);
        }
        let status = session.status().await;
        assert!(status.auto_update_enabled);
        assert_eq!(status.next_update_time.as_deref(), Some("14:31:00"));

        assert!(session.set_auto_update(false).await);
        let status = session.status().await;
        assert!(!status.auto_update_enabled);
        assert_eq!(status.next_update_time, None);
    }

    #[tokio::test]
    async fn auto_update_is_never_scheduled_without_transport() {
        let session = session(Transport::Null, false);
        assert!(session.set_auto_update(true).await);
        let status = session.status().await;
        assert!(status.auto_update_enabled);
        assert_eq!(status.next_update_time, None);
    }

    #[tokio::test]
    async fn close_hides_overlay_and_drops_link() {
        let mut engine = FakeEngine::start().await;
        let session = session(tcp(engine.port), true);

        session.connect().await;
        engine.next_line().await;
        session.update_clock().await;
        engine.next_line().await;

        session.close_connection().await;
        assert_eq!(
            engine.next_line().await,
            "CG 1 INVOKE 1 \"leftTab('off')\"\r\n"
        );
        assert_eq!(engine.next_line().await, EOF);

        let status = session.status().await;
        assert!(!status.is_connected);
        assert!(!status.is_visible);
        assert_eq!(status.next_update_time, None);

        // closing twice is harmless
        session.close_connection().await;
    }

    #[tokio::test]
    async fn engine_hangup_resets_the_session() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut reader = BufReader::new(stream);
            let mut line = String::new();
            let _ = reader.read_line(&mut line).await;
        });

        let session = session(tcp(port), false);
        assert!(session.connect().await.connected);

        tokio::time::timeout(Duration::from_secs(2), async {
            while session.status().await.is_connected {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("session never noticed the hangup");

        // reconnecting is the caller's job; commands keep failing open meanwhile
        assert!(session.send_command("INFO").await);
        assert_eq!(session.status().await.mode, Mode::Mock);
    }
}
