//! WebSocket channel to the game server, run on its own thread.
//!
//! The game loop never blocks on the socket: inbound frames arrive as [`NetworkEvent`]s on
//! `NetworkHandle::rx`, outbound frames are queued with [`NetworkHandle::send`].

use crate::protocol::ClientMessage;
use std::io::ErrorKind;
use std::net::TcpStream;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

/// How long a socket read may block before the thread checks for outbound frames.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: tungstenite::Error,
    },
    #[error("connection closed")]
    Closed,
}

/// What the network thread reports back to the game loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    Connected,
    /// One text frame from the server.
    Message(String),
    /// The connection is gone; no further events follow.
    Disconnected(String),
}

pub struct NetworkHandle {
    /// Game loop reads events from here
    pub rx: mpsc::Receiver<NetworkEvent>,
    tx: mpsc::Sender<String>,
}

impl NetworkHandle {
    pub fn send(&self, message: &ClientMessage) -> Result<(), ChannelError> {
        let text = message.to_string();
        debug!(%text, "sending");
        self.tx.send(text).map_err(|_| ChannelError::Closed)
    }

    /// Everything received since the last call, without blocking.
    pub fn poll(&self) -> Vec<NetworkEvent> {
        self.rx.try_iter().collect()
    }
}

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

/// Opens the WebSocket (blocking until the handshake completes) and hands it to a new thread.
pub fn connect(url: &str) -> Result<NetworkHandle, ChannelError> {
    let (mut socket, _response) = tungstenite::connect(url).map_err(|source| ChannelError::Connect {
        url: url.to_string(),
        source,
    })?;
    if let MaybeTlsStream::Plain(stream) = socket.get_mut() {
        if let Err(e) = stream.set_read_timeout(Some(POLL_INTERVAL)) {
            warn!(error = %e, "could not set read timeout");
        }
    }
    info!(url, "connected");

    let (event_tx, event_rx) = mpsc::channel::<NetworkEvent>();
    let (out_tx, out_rx) = mpsc::channel::<String>();
    // Receiver is still alive here, so this cannot fail.
    let _ = event_tx.send(NetworkEvent::Connected);

    thread::spawn(move || run(socket, &event_tx, &out_rx));

    Ok(NetworkHandle {
        rx: event_rx,
        tx: out_tx,
    })
}

fn run(mut socket: Socket, events: &mpsc::Sender<NetworkEvent>, outgoing: &mpsc::Receiver<String>) {
    loop {
        loop {
            match outgoing.try_recv() {
                Ok(text) => {
                    if let Err(e) = socket.send(Message::Text(text)) {
                        disconnect(events, &e.to_string());
                        return;
                    }
                }
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => {
                    debug!("handle dropped, closing socket");
                    let _ = socket.close(None);
                    let _ = socket.flush();
                    return;
                }
            }
        }

        match socket.read() {
            Ok(Message::Text(text)) => {
                if events.send(NetworkEvent::Message(text)).is_err() {
                    return;
                }
            }
            Ok(Message::Close(frame)) => {
                let _ = socket.flush();
                let reason = frame.map_or_else(|| "closed by server".to_string(), |f| f.reason.to_string());
                disconnect(events, &reason);
                return;
            }
            Ok(Message::Binary(data)) => debug!(len = data.len(), "ignoring binary frame"),
            Ok(_) => {}
            Err(tungstenite::Error::Io(e)) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(e) => {
                disconnect(events, &e.to_string());
                return;
            }
        }
    }
}

fn disconnect(events: &mpsc::Sender<NetworkEvent>, reason: &str) {
    warn!(reason, "disconnected");
    let _ = events.send(NetworkEvent::Disconnected(reason.to_string()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_connect_refused_is_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let result = connect(&format!("ws://{addr}"));
        assert!(matches!(result, Err(ChannelError::Connect { .. })));
    }

    #[test]
    fn test_frames_flow_both_ways() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut ws = tungstenite::accept(stream).unwrap();
            let first = ws.read().unwrap();
            ws.send(Message::Text("PIECE 3".into())).unwrap();
            ws.close(None).unwrap();
            while ws.read().is_ok() {}
            first
        });

        let handle = connect(&format!("ws://{addr}")).unwrap();
        handle.send(&ClientMessage::RequestPiece).unwrap();
        let mut events = Vec::new();
        while let Ok(event) = handle.rx.recv_timeout(Duration::from_secs(5)) {
            let done = matches!(event, NetworkEvent::Disconnected(_));
            events.push(event);
            if done {
                break;
            }
        }

        assert_eq!(server.join().unwrap(), Message::Text("PIECE".into()));
        assert_eq!(events.first(), Some(&NetworkEvent::Connected));
        assert!(events.contains(&NetworkEvent::Message("PIECE 3".into())));
        assert!(matches!(events.last(), Some(NetworkEvent::Disconnected(_))));
    }
}
