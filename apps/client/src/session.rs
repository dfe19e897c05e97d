use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use hookrelay_common::{
    Delivery, DeliveryResult, RelayError, Result, basic_auth,
    constants::{CLEAN_CLOSE_CODES, NORMAL_CLOSURE_CODE},
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        self, Message as WsMessage,
        client::IntoClientRequest,
        error::ProtocolError,
        http::{HeaderValue, StatusCode, header::AUTHORIZATION},
        protocol::{CloseFrame, frame::coding::CloseCode},
    },
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{config::SessionConfig, console::Console, forwarder::Forwarder};

type WebSocket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;
type WsWriter = SplitSink<WebSocket, WsMessage>;
type WsReader = SplitStream<WebSocket>;

/// Lifecycle of a relay session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Connected,
    Relaying,
    ShuttingDown,
    Closed,
}

/// One connection to the relay server and its read-dispatch-write loop
///
/// The session is cheap to clone; clones share the same connection, so a
/// clone handed to another task can call [`Session::stop`] while the loop runs.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: SessionConfig,
    forwarder: Forwarder,
    state: Mutex<SessionState>,
    shutdown: CancellationToken,
    /// Write half; its lock is the teardown critical section
    writer: Mutex<Option<WsWriter>>,
    /// Read half, handed to the relay loop on start
    reader: Mutex<Option<WsReader>>,
}

impl Session {
    /// Create a session that stops when `shutdown` is cancelled
    pub fn new(
        config: SessionConfig,
        console: Console,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let forwarder = Forwarder::new(config.request_timeout, console)?;

        Ok(Self {
            inner: Arc::new(SessionInner {
                config,
                forwarder,
                state: Mutex::new(SessionState::Idle),
                shutdown,
                writer: Mutex::new(None),
                reader: Mutex::new(None),
            }),
        })
    }

    /// Token that ends the relay loop at its next iteration when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    pub async fn state(&self) -> SessionState {
        *self.inner.state.lock().await
    }

    /// Open the connection, authenticating with the project ID and CLI secret
    pub async fn connect(&self, project_id: &str, cli_secret: &str) -> Result<()> {
        {
            let mut state = self.inner.state.lock().await;
            if *state != SessionState::Idle {
                return Err(RelayError::InvalidState(format!(
                    "cannot connect while {:?}",
                    *state
                )));
            }
            *state = SessionState::Connecting;
        }

        let mut ws_stream = match self.establish_connection(project_id, cli_secret).await {
            Ok(ws_stream) => ws_stream,
            Err(e) => {
                self.leave_connecting(SessionState::Idle).await;
                return Err(e);
            }
        };

        // Same critical section as stop(), so a concurrent stop is seen here or sees us
        let mut writer = self.inner.writer.lock().await;
        if self.inner.shutdown.is_cancelled() {
            drop(writer);
            debug!("Session stopped while connecting, closing new connection");

            if let Err(e) = ignore_closed(ws_stream.close(Some(normal_closure())).await) {
                debug!("Failed to close connection: {}", e);
            }
            return Err(RelayError::ConnectionClosed);
        }

        let (write, read) = ws_stream.split();
        *writer = Some(write);
        *self.inner.reader.lock().await = Some(read);
        self.leave_connecting(SessionState::Connected).await;
        drop(writer);

        info!("Connected to {}", self.inner.config.tunnel_address);
        Ok(())
    }

    /// Leave `Connecting` unless stop() already moved the session on
    async fn leave_connecting(&self, next: SessionState) {
        let mut state = self.inner.state.lock().await;
        if *state == SessionState::Connecting {
            *state = next;
        }
    }

    async fn establish_connection(&self, project_id: &str, cli_secret: &str) -> Result<WebSocket> {
        debug!("Connecting to {}", self.inner.config.tunnel_address);

        let mut request = self
            .inner
            .config
            .tunnel_address
            .as_str()
            .into_client_request()
            .map_err(|e| RelayError::ConnectionFailed(format!("Invalid URL: {}", e)))?;

        request.headers_mut().insert(
            AUTHORIZATION,
            HeaderValue::from_str(&basic_auth(project_id, cli_secret))
                .map_err(|e| RelayError::ConnectionFailed(format!("Invalid credentials: {}", e)))?,
        );

        let (ws_stream, _) = connect_async(request).await.map_err(connect_error)?;
        Ok(ws_stream)
    }

    /// Relay deliveries to `local_address` until the connection ends
    ///
    /// Returns `Ok(())` when shut down through [`Session::stop`] or the
    /// shutdown token, and [`RelayError::ConnectionClosed`] when the server
    /// closed the connection normally. The connection is always torn down
    /// before this returns.
    pub async fn start(&self, local_address: &str) -> Result<()> {
        let reader = {
            let mut state = self.inner.state.lock().await;
            if *state != SessionState::Connected {
                return Err(RelayError::InvalidState(format!(
                    "cannot start while {:?}",
                    *state
                )));
            }
            let reader = self.inner.reader.lock().await.take();
            *state = SessionState::Relaying;
            reader
        };

        let result = match reader {
            Some(mut reader) => {
                if self.inner.config.handle_signals {
                    tokio::spawn(watch_signals(self.clone()));
                }

                info!(
                    "Relaying webhook requests to {} (timeout {:?})",
                    local_address,
                    self.inner.forwarder.timeout()
                );
                self.relay(&mut reader, local_address).await
            }
            // stop() raced us between connect and start
            None => Ok(()),
        };

        match (result, self.stop().await) {
            (Err(e), Err(stop_err)) => {
                warn!("Failed to close connection after error: {}", stop_err);
                Err(e)
            }
            (Ok(()), Err(stop_err)) => Err(stop_err),
            (result, Ok(())) => result,
        }
    }

    async fn relay(&self, reader: &mut WsReader, local_address: &str) -> Result<()> {
        loop {
            let message = tokio::select! {
                biased;
                _ = self.inner.shutdown.cancelled() => {
                    debug!("Shutdown requested, leaving relay loop");
                    return Ok(());
                }
                message = reader.next() => message,
            };

            let processed = match message {
                Some(Ok(WsMessage::Text(text))) => {
                    self.process_frame(text.as_str().as_bytes(), local_address).await
                }
                Some(Ok(WsMessage::Binary(data))) => self.process_frame(&data, local_address).await,
                Some(Ok(WsMessage::Close(frame))) => return Err(close_error(frame)),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(read_error(e)),
                None => return Err(RelayError::ConnectionClosed),
            };

            match processed {
                // stop() took the connection while we were forwarding
                Err(RelayError::ConnectionClosed) if self.inner.shutdown.is_cancelled() => {
                    warn!("Session stopped before the result could be sent");
                    return Ok(());
                }
                processed => processed?,
            }
        }
    }

    async fn process_frame(&self, payload: &[u8], local_address: &str) -> Result<()> {
        let delivery: Delivery = serde_json::from_slice(payload).map_err(|e| {
            debug!("Failed to decode delivery: {}", e);
            RelayError::InvalidPayload(String::from_utf8_lossy(payload).into_owned())
        })?;

        debug!("Received delivery {} for {}", delivery.id, delivery.path);

        match self.inner.forwarder.forward(&delivery, local_address).await {
            Ok(result) => self.send(&result).await,
            Err(e) => {
                error!("Failed to forward delivery {}: {}", delivery.id, e);
                self.send(&DeliveryResult::internal_error(&delivery.id, e.to_string()))
                    .await?;
                Err(e)
            }
        }
    }

    async fn send(&self, result: &DeliveryResult) -> Result<()> {
        let json = serde_json::to_string(result)?;

        let mut writer = self.inner.writer.lock().await;
        let write = writer.as_mut().ok_or(RelayError::ConnectionClosed)?;

        write
            .send(WsMessage::Text(json.into()))
            .await
            .map_err(|e| RelayError::WriteFailure(e.to_string()))?;

        debug!("Sent result {} (status {})", result.id, result.status);
        Ok(())
    }

    /// Close the connection; safe to call repeatedly and from several tasks
    pub async fn stop(&self) -> Result<()> {
        let mut writer = self.inner.writer.lock().await;

        self.inner.shutdown.cancel();
        self.inner.reader.lock().await.take();

        let Some(mut write) = writer.take() else {
            self.set_state(SessionState::Closed).await;
            return Ok(());
        };

        self.set_state(SessionState::ShuttingDown).await;
        debug!("Sending close frame");

        let sent = ignore_closed(write.send(WsMessage::Close(Some(normal_closure()))).await);
        let closed = ignore_closed(write.close().await);

        self.set_state(SessionState::Closed).await;

        sent.and(closed)
            .map_err(|e| RelayError::WriteFailure(format!("Failed to close connection: {}", e)))
    }

    async fn set_state(&self, new_state: SessionState) {
        *self.inner.state.lock().await = new_state;
    }
}

fn normal_closure() -> CloseFrame {
    CloseFrame {
        code: CloseCode::from(NORMAL_CLOSURE_CODE),
        reason: "".into(),
    }
}

/// Map a rejected upgrade to the typed authentication errors
fn connect_error(err: tungstenite::Error) -> RelayError {
    match err {
        tungstenite::Error::Http(response) => match response.status() {
            StatusCode::UNAUTHORIZED => RelayError::Unauthorized,
            StatusCode::CONFLICT => RelayError::SessionConflict,
            StatusCode::INTERNAL_SERVER_ERROR => RelayError::ServerInternal,
            status => RelayError::ConnectionFailed(format!("HTTP error: {}", status)),
        },
        e => RelayError::ConnectionFailed(e.to_string()),
    }
}

fn close_error(frame: Option<CloseFrame>) -> RelayError {
    match frame {
        Some(frame) if !CLEAN_CLOSE_CODES.contains(&u16::from(frame.code)) => {
            RelayError::ReadFailure(format!(
                "connection closed with code {} ({})",
                u16::from(frame.code),
                frame.reason.as_str()
            ))
        }
        _ => {
            info!("Server closed connection");
            RelayError::ConnectionClosed
        }
    }
}

fn read_error(err: tungstenite::Error) -> RelayError {
    match err {
        tungstenite::Error::ConnectionClosed
        | tungstenite::Error::AlreadyClosed
        | tungstenite::Error::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
            RelayError::ConnectionClosed
        }
        e => RelayError::ReadFailure(e.to_string()),
    }
}

/// The peer already went away; nothing left to close
fn ignore_closed(result: tungstenite::Result<()>) -> tungstenite::Result<()> {
    match result {
        Err(
            tungstenite::Error::ConnectionClosed
            | tungstenite::Error::AlreadyClosed
            | tungstenite::Error::Protocol(ProtocolError::SendAfterClosing),
        ) => Ok(()),
        result => result,
    }
}

/// Stop the session on SIGINT/SIGTERM; exits quietly once the session is shut down
async fn watch_signals(session: Session) {
    let shutdown = session.shutdown_token();

    tokio::select! {
        _ = shutdown.cancelled() => return,
        signal = termination_signal() => {
            info!("Received {}, shutting down gracefully...", signal);
        }
    }

    if let Err(e) = session.stop().await {
        error!("Failed to gracefully stop the tunnel: {}", e);
    }
}

#[cfg(unix)]
async fn termination_signal() -> &'static str {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => tokio::select! {
            _ = ctrl_c() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
        },
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {}", e);
            ctrl_c().await;
            "SIGINT"
        }
    }
}

#[cfg(not(unix))]
async fn termination_signal() -> &'static str {
    ctrl_c().await;
    "Ctrl-C"
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockRelay, Step};
    use hookrelay_common::decode_basic_auth;
    use std::time::Duration;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    fn session(relay: &MockRelay) -> Session {
        let config = SessionConfig::new(relay.address.clone())
            .with_request_timeout(Duration::from_secs(2))
            .with_signal_handling(false);
        Session::new(config, Console::plain(), CancellationToken::new()).unwrap()
    }

    async fn local_service(status: u16, body: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&server)
            .await;
        server
    }

    fn parse(result: &str) -> DeliveryResult {
        serde_json::from_str(result).unwrap()
    }

    #[tokio::test]
    async fn test_connect_sends_basic_auth() {
        let relay = MockRelay::start(vec![]).await;
        let session = session(&relay);

        session.connect("pro-1", "secret").await.unwrap();
        assert_eq!(session.state().await, SessionState::Connected);

        session.stop().await.unwrap();
        assert_eq!(session.state().await, SessionState::Closed);

        let transcript = relay.finish().await;
        let (id, secret) = decode_basic_auth(transcript.authorization.as_deref().unwrap()).unwrap();
        assert_eq!(id, "pro-1");
        assert_eq!(secret, "secret");
        assert_eq!(transcript.close_frames, 1);
    }

    #[tokio::test]
    async fn test_connect_maps_rejections() {
        for status in [401, 409, 500, 403] {
            let relay = MockRelay::rejecting(status).await;
            let session = session(&relay);

            let err = session.connect("pro-1", "wrong").await.unwrap_err();
            match status {
                401 => assert!(matches!(err, RelayError::Unauthorized)),
                409 => assert!(matches!(err, RelayError::SessionConflict)),
                500 => assert!(matches!(err, RelayError::ServerInternal)),
                _ => assert!(matches!(err, RelayError::ConnectionFailed(_))),
            }
            assert_eq!(session.state().await, SessionState::Idle);

            relay.finish().await;
        }
    }

    #[tokio::test]
    async fn test_connect_unreachable_server() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = format!("ws://{}", listener.local_addr().unwrap());
        drop(listener);

        let config = SessionConfig::new(address).with_signal_handling(false);
        let session = Session::new(config, Console::plain(), CancellationToken::new()).unwrap();

        let err = session.connect("pro-1", "secret").await.unwrap_err();
        assert!(matches!(err, RelayError::ConnectionFailed(_)));
        assert_eq!(session.state().await, SessionState::Idle);
    }

    #[tokio::test]
    async fn test_start_requires_connect() {
        let relay = MockRelay::start(vec![]).await;
        let session = session(&relay);

        let err = session.start("http://127.0.0.1:1").await.unwrap_err();
        assert!(matches!(err, RelayError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_relay_round_trip() {
        let local = local_service(200, "ok").await;
        let relay = MockRelay::start(vec![
            Step::Send(r#"{"id":"abc","path":"/hook","body":"payload"}"#.to_string()),
            Step::ExpectResult,
            Step::Close(1000),
        ])
        .await;
        let session = session(&relay);

        session.connect("pro-1", "secret").await.unwrap();
        let err = session.start(&local.uri()).await.unwrap_err();
        assert!(matches!(err, RelayError::ConnectionClosed));
        assert_eq!(session.state().await, SessionState::Closed);

        let transcript = relay.finish().await;
        assert_eq!(transcript.results.len(), 1);

        let result = parse(&transcript.results[0]);
        assert_eq!(result.id, "abc");
        assert_eq!(result.status, 200);
        assert_eq!(result.body, "ok");
    }

    #[tokio::test]
    async fn test_results_follow_delivery_order() {
        let local = local_service(201, "created").await;
        let relay = MockRelay::start(vec![
            Step::Send(r#"{"id":"first","path":"/hook","body":""}"#.to_string()),
            Step::Send(r#"{"id":"second","path":"/hook","body":""}"#.to_string()),
            Step::ExpectResult,
            Step::ExpectResult,
            Step::Close(1001),
        ])
        .await;
        let session = session(&relay);

        session.connect("pro-1", "secret").await.unwrap();
        let err = session.start(&local.uri()).await.unwrap_err();
        assert!(matches!(err, RelayError::ConnectionClosed));

        let transcript = relay.finish().await;
        let ids: Vec<_> = transcript.results.iter().map(|r| parse(r).id).collect();
        assert_eq!(ids, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_local_timeout_reported_as_504() {
        let local = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&local)
            .await;

        let relay = MockRelay::start(vec![
            Step::Send(r#"{"id":"slow","path":"/hook","body":"payload"}"#.to_string()),
            Step::ExpectResult,
            Step::Close(1000),
        ])
        .await;
        let config = SessionConfig::new(relay.address.clone())
            .with_request_timeout(Duration::from_millis(200))
            .with_signal_handling(false);
        let session = Session::new(config, Console::plain(), CancellationToken::new()).unwrap();

        session.connect("pro-1", "secret").await.unwrap();
        let err = session.start(&local.uri()).await.unwrap_err();
        assert!(matches!(err, RelayError::ConnectionClosed));

        let transcript = relay.finish().await;
        let result = parse(&transcript.results[0]);
        assert_eq!(result.id, "slow");
        assert_eq!(result.status, 504);
        assert!(result.body.contains("timed out"));
    }

    #[tokio::test]
    async fn test_malformed_frame_is_fatal_and_unanswered() {
        let relay = MockRelay::start(vec![Step::Send("not json".to_string())]).await;
        let session = session(&relay);

        session.connect("pro-1", "secret").await.unwrap();
        let err = session.start("http://127.0.0.1:1").await.unwrap_err();
        assert!(matches!(err, RelayError::InvalidPayload(ref payload) if payload == "not json"));

        let transcript = relay.finish().await;
        assert!(transcript.results.is_empty());
        assert_eq!(transcript.close_frames, 1);
    }

    #[tokio::test]
    async fn test_forward_failure_reports_500_then_fails() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let local_address = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let relay = MockRelay::start(vec![
            Step::Send(r#"{"id":"abc","path":"/hook","body":"payload"}"#.to_string()),
            Step::ExpectResult,
        ])
        .await;
        let session = session(&relay);

        session.connect("pro-1", "secret").await.unwrap();
        let err = session.start(&local_address).await.unwrap_err();
        assert!(matches!(err, RelayError::LocalService(_)));

        let transcript = relay.finish().await;
        assert_eq!(transcript.results.len(), 1);
        let result = parse(&transcript.results[0]);
        assert_eq!(result.id, "abc");
        assert_eq!(result.status, 500);
        assert!(!result.body.is_empty());
    }

    #[tokio::test]
    async fn test_write_failure_is_fatal() {
        let local = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("late")
                    .set_delay(Duration::from_millis(400)),
            )
            .mount(&local)
            .await;

        let relay = MockRelay::start(vec![Step::Send(
            r#"{"id":"unsent","path":"/hook","body":""}"#.to_string(),
        )])
        .await;
        let session = session(&relay);
        session.connect("pro-1", "secret").await.unwrap();

        let relay_session = session.clone();
        let local_address = local.uri();
        let running = tokio::spawn(async move { relay_session.start(&local_address).await });

        // Close the write half under the running loop so the result cannot be sent
        tokio::time::sleep(Duration::from_millis(150)).await;
        if let Some(write) = session.inner.writer.lock().await.as_mut() {
            let _ = write.close().await;
        }

        let err = running.await.unwrap().unwrap_err();
        assert!(matches!(err, RelayError::WriteFailure(_)));
        assert_eq!(session.state().await, SessionState::Closed);

        let transcript = relay.finish().await;
        assert!(transcript.results.is_empty());
    }

    #[tokio::test]
    async fn test_dropped_connection_ends_relay_with_error() {
        let local = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(300)))
            .mount(&local)
            .await;

        let relay = MockRelay::start(vec![
            Step::Send(r#"{"id":"orphan","path":"/hook","body":""}"#.to_string()),
            Step::Disconnect,
        ])
        .await;
        let session = session(&relay);
        session.connect("pro-1", "secret").await.unwrap();

        let err = session.start(&local.uri()).await.unwrap_err();
        assert!(matches!(
            err,
            RelayError::WriteFailure(_) | RelayError::ReadFailure(_) | RelayError::ConnectionClosed
        ));
        assert_eq!(session.state().await, SessionState::Closed);

        relay.finish().await;
    }

    #[tokio::test]
    async fn test_stop_while_connecting_keeps_session_closed() {
        let relay = MockRelay::slow_handshake(Duration::from_millis(300), vec![]).await;
        let session = session(&relay);

        let connecting = session.clone();
        let connect = tokio::spawn(async move { connecting.connect("pro-1", "secret").await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(session.state().await, SessionState::Connecting);
        session.stop().await.unwrap();
        assert_eq!(session.state().await, SessionState::Closed);

        let err = connect.await.unwrap().unwrap_err();
        assert!(matches!(err, RelayError::ConnectionClosed));
        assert_eq!(session.state().await, SessionState::Closed);

        let err = session.start("http://127.0.0.1:1").await.unwrap_err();
        assert!(matches!(err, RelayError::InvalidState(_)));

        let transcript = relay.finish().await;
        assert_eq!(transcript.close_frames, 1);
    }

    #[tokio::test]
    async fn test_unexpected_close_code_is_read_failure() {
        let relay = MockRelay::start(vec![Step::Close(4000)]).await;
        let session = session(&relay);

        session.connect("pro-1", "secret").await.unwrap();
        let err = session.start("http://127.0.0.1:1").await.unwrap_err();
        assert!(matches!(err, RelayError::ReadFailure(_)));

        relay.finish().await;
    }

    #[tokio::test]
    async fn test_stop_twice_closes_once() {
        let relay = MockRelay::start(vec![]).await;
        let session = session(&relay);
        session.connect("pro-1", "secret").await.unwrap();

        let (first, second) = tokio::join!(session.stop(), session.stop());
        assert!(first.is_ok());
        assert!(second.is_ok());
        assert!(session.stop().await.is_ok());

        let transcript = relay.finish().await;
        assert_eq!(transcript.close_frames, 1);
    }

    #[tokio::test]
    async fn test_cancellation_ends_loop_cleanly() {
        let relay = MockRelay::start(vec![]).await;
        let session = session(&relay);
        session.connect("pro-1", "secret").await.unwrap();

        let token = session.shutdown_token();
        let relay_session = session.clone();
        let running = tokio::spawn(async move { relay_session.start("http://127.0.0.1:1").await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();

        let result = running.await.unwrap();
        assert!(result.is_ok());
        assert_eq!(session.state().await, SessionState::Closed);

        let transcript = relay.finish().await;
        assert_eq!(transcript.close_frames, 1);
    }

    #[tokio::test]
    async fn test_cancellation_waits_for_inflight_forward() {
        let local = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("late")
                    .set_delay(Duration::from_millis(400)),
            )
            .mount(&local)
            .await;

        let relay = MockRelay::start(vec![
            Step::Send(r#"{"id":"inflight","path":"/hook","body":""}"#.to_string()),
            Step::ExpectResult,
        ])
        .await;
        let session = session(&relay);
        session.connect("pro-1", "secret").await.unwrap();

        let token = session.shutdown_token();
        let relay_session = session.clone();
        let local_address = local.uri();
        let running = tokio::spawn(async move { relay_session.start(&local_address).await });

        tokio::time::sleep(Duration::from_millis(150)).await;
        token.cancel();

        assert!(running.await.unwrap().is_ok());

        let transcript = relay.finish().await;
        assert_eq!(transcript.results.len(), 1);
        assert_eq!(parse(&transcript.results[0]).body, "late");
    }

    #[tokio::test]
    async fn test_stop_during_forward_exits_cleanly() {
        let local = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(400)))
            .mount(&local)
            .await;

        let relay = MockRelay::start(vec![Step::Send(
            r#"{"id":"inflight","path":"/hook","body":""}"#.to_string(),
        )])
        .await;
        let session = session(&relay);
        session.connect("pro-1", "secret").await.unwrap();

        let relay_session = session.clone();
        let local_address = local.uri();
        let running = tokio::spawn(async move { relay_session.start(&local_address).await });

        tokio::time::sleep(Duration::from_millis(150)).await;
        session.stop().await.unwrap();

        assert!(running.await.unwrap().is_ok());

        let transcript = relay.finish().await;
        assert!(transcript.results.is_empty());
        assert_eq!(transcript.close_frames, 1);
    }

    #[tokio::test]
    async fn test_connect_after_stop_is_rejected() {
        let relay = MockRelay::start(vec![]).await;
        let session = session(&relay);
        session.connect("pro-1", "secret").await.unwrap();
        session.stop().await.unwrap();

        let err = session.connect("pro-1", "secret").await.unwrap_err();
        assert!(matches!(err, RelayError::InvalidState(_)));

        relay.finish().await;
    }

    #[test]
    fn test_close_codes() {
        let frame = |code: u16| {
            Some(CloseFrame {
                code: CloseCode::from(code),
                reason: "".into(),
            })
        };

        assert!(matches!(close_error(None), RelayError::ConnectionClosed));
        assert!(matches!(close_error(frame(1000)), RelayError::ConnectionClosed));
        assert!(matches!(close_error(frame(1001)), RelayError::ConnectionClosed));
        assert!(matches!(close_error(frame(1006)), RelayError::ConnectionClosed));
        assert!(matches!(close_error(frame(1008)), RelayError::ReadFailure(_)));
        assert!(matches!(close_error(frame(4000)), RelayError::ReadFailure(_)));
    }

    #[test]
    fn test_read_errors() {
        assert!(matches!(
            read_error(tungstenite::Error::ConnectionClosed),
            RelayError::ConnectionClosed
        ));
        assert!(matches!(
            read_error(tungstenite::Error::Protocol(
                ProtocolError::ResetWithoutClosingHandshake
            )),
            RelayError::ConnectionClosed
        ));
        assert!(matches!(
            read_error(tungstenite::Error::Io(std::io::Error::other("boom"))),
            RelayError::ReadFailure(_)
        ));
    }
}
