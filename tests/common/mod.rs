//! In-process realtime server for integration tests.
//!
//! Speaks the `{event, data}` JSON envelope over WebSocket, reports every
//! accepted connection (with its `companyId`) and every inbound frame, and
//! echoes `test-message` back as `test-response`.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use realtime_notify::models::event::{Frame, TEST_MESSAGE, TEST_RESPONSE};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

pub const WAIT: Duration = Duration::from_secs(5);

enum Outbound {
    Frame(Frame),
    Close,
}

pub struct Connection {
    pub company_id: String,
    to_client: mpsc::UnboundedSender<Outbound>,
}

impl Connection {
    pub fn push(&self, frame: Frame) {
        let _ = self.to_client.send(Outbound::Frame(frame));
    }

    /// Drop the connection from the server side.
    pub fn close(self) {
        let _ = self.to_client.send(Outbound::Close);
    }
}

pub struct TestServer {
    pub url: String,
    connections: mpsc::UnboundedReceiver<Connection>,
    received: mpsc::UnboundedReceiver<(String, Frame)>,
}

impl TestServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (conn_tx, connections) = mpsc::unbounded_channel();
        let (recv_tx, received) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let conn_tx = conn_tx.clone();
                let recv_tx = recv_tx.clone();
                tokio::spawn(serve(stream, conn_tx, recv_tx));
            }
        });

        Self {
            url: format!("ws://{}/realtime", addr),
            connections,
            received,
        }
    }

    pub async fn next_connection(&mut self) -> Connection {
        tokio::time::timeout(WAIT, self.connections.recv())
            .await
            .expect("timed out waiting for a connection")
            .expect("server stopped")
    }

    /// `None` if no connection arrives within `within`.
    pub async fn try_next_connection(&mut self, within: Duration) -> Option<Connection> {
        tokio::time::timeout(within, self.connections.recv())
            .await
            .ok()
            .flatten()
    }

    pub async fn next_frame(&mut self) -> (String, Frame) {
        tokio::time::timeout(WAIT, self.received.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("server stopped")
    }
}

async fn serve(
    stream: tokio::net::TcpStream,
    conn_tx: mpsc::UnboundedSender<Connection>,
    recv_tx: mpsc::UnboundedSender<(String, Frame)>,
) {
    let query = Arc::new(Mutex::new(String::new()));
    let captured = query.clone();
    let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        *captured.lock().unwrap() = req.uri().query().unwrap_or_default().to_string();
        Ok(resp)
    };

    let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
        return;
    };

    let company_id = url::form_urlencoded::parse(query.lock().unwrap().as_bytes())
        .find(|(k, _)| k == "companyId")
        .map(|(_, v)| v.into_owned())
        .unwrap_or_default();

    let (to_client, mut outbound) = mpsc::unbounded_channel();
    let _ = conn_tx.send(Connection {
        company_id: company_id.clone(),
        to_client,
    });

    let (mut sink, mut stream) = ws.split();
    loop {
        tokio::select! {
            Some(out) = outbound.recv() => match out {
                Outbound::Frame(frame) => {
                    let text = frame.encode().unwrap();
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Outbound::Close => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let Ok(frame) = Frame::decode(&text) else { continue };
                    if frame.event == TEST_MESSAGE {
                        let echo = Frame::new(TEST_RESPONSE, frame.data.clone());
                        let _ = sink.send(Message::Text(echo.encode().unwrap())).await;
                    }
                    let _ = recv_tx.send((company_id.clone(), frame));
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }
}

/// A port nothing is listening on.
pub async fn dead_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("ws://{}/realtime", addr)
}
