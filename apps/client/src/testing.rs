//! In-process relay server for session tests

use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_tungstenite::{
    accept_hdr_async,
    tungstenite::{
        Message as WsMessage,
        handshake::server::{ErrorResponse, Request, Response},
        http::{StatusCode, header::AUTHORIZATION},
        protocol::{CloseFrame, frame::coding::CloseCode},
    },
};

/// What the relay server does, in order
#[derive(Debug, Clone)]
pub(crate) enum Step {
    /// Send a text frame to the client
    Send(String),
    /// Wait for the next text frame from the client
    ExpectResult,
    /// Send a close frame with the given code
    Close(u16),
    /// Drop the TCP connection without a closing handshake
    Disconnect,
}

/// Everything the relay server observed
#[derive(Debug, Default)]
pub(crate) struct Transcript {
    pub authorization: Option<String>,
    pub results: Vec<String>,
    pub close_frames: usize,
}

pub(crate) struct MockRelay {
    pub address: String,
    handle: JoinHandle<Transcript>,
}

impl MockRelay {
    /// Accept one client and run the steps, then drain until the client leaves
    pub async fn start(steps: Vec<Step>) -> Self {
        Self::spawn(None, Duration::ZERO, steps).await
    }

    /// Refuse the upgrade with the given HTTP status
    pub async fn rejecting(status: u16) -> Self {
        Self::spawn(Some(status), Duration::ZERO, Vec::new()).await
    }

    /// Hold the upgrade request for `delay` before accepting it
    pub async fn slow_handshake(delay: Duration, steps: Vec<Step>) -> Self {
        Self::spawn(None, delay, steps).await
    }

    async fn spawn(reject_with: Option<u16>, handshake_delay: Duration, steps: Vec<Step>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = format!("ws://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let mut transcript = Transcript::default();
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(handshake_delay).await;

            let callback = |request: &Request, response: Response| {
                transcript.authorization = request
                    .headers()
                    .get(AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);

                match reject_with {
                    Some(status) => {
                        let mut rejection = ErrorResponse::new(Some("rejected".to_string()));
                        *rejection.status_mut() = StatusCode::from_u16(status).unwrap();
                        Err(rejection)
                    }
                    None => Ok(response),
                }
            };

            let accepted = accept_hdr_async(stream, callback).await;
            let Ok(mut ws) = accepted else {
                return transcript;
            };

            for step in steps {
                match step {
                    Step::Send(text) => ws.send(WsMessage::text(text)).await.unwrap(),
                    Step::ExpectResult => loop {
                        match ws.next().await {
                            Some(Ok(WsMessage::Text(text))) => {
                                transcript.results.push(text.as_str().to_string());
                                break;
                            }
                            Some(Ok(WsMessage::Close(_))) => {
                                transcript.close_frames += 1;
                                return transcript;
                            }
                            Some(Ok(_)) => continue,
                            _ => return transcript,
                        }
                    },
                    Step::Close(code) => {
                        let frame = CloseFrame {
                            code: CloseCode::from(code),
                            reason: "".into(),
                        };
                        let _ = ws.send(WsMessage::Close(Some(frame))).await;
                    }
                    Step::Disconnect => return transcript,
                }
            }

            while let Some(Ok(message)) = ws.next().await {
                match message {
                    WsMessage::Text(text) => transcript.results.push(text.as_str().to_string()),
                    WsMessage::Close(_) => transcript.close_frames += 1,
                    _ => {}
                }
            }

            transcript
        });

        Self { address, handle }
    }

    /// Wait for the client to go away and return what was seen
    pub async fn finish(self) -> Transcript {
        self.handle.await.unwrap()
    }
}
