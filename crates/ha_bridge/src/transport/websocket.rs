use futures_util::SinkExt;
use futures_util::StreamExt;
use reqwest::Url;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;
use tracing::info;

use super::Connector;
use super::Transport;
use super::TransportEvent;
use super::TransportHandle;

type EventSender = mpsc::UnboundedSender<TransportEvent>;

/// Real transport implementation using tokio-tungstenite
#[derive(Debug, Default, Clone)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for WebSocketConnector {
    fn open(&self, url: &Url) -> TransportHandle {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = oneshot::channel();

        tokio::spawn(run_socket(url.to_string(), event_tx, close_rx));

        TransportHandle {
            transport: Box::new(WebSocketTransport {
                close_tx: Some(close_tx),
            }),
            events: event_rx,
        }
    }
}

/// Close side of a socket task. Dropping it closes the socket as well.
struct WebSocketTransport {
    close_tx: Option<oneshot::Sender<()>>,
}

impl Transport for WebSocketTransport {
    fn close(&mut self) {
        if let Some(tx) = self.close_tx.take() {
            // Task already gone if the receiver was dropped
            let _ = tx.send(());
        }
    }
}

/// Background task owning one WebSocket connection.
///
/// Always finishes by reporting `Closed`, whether the socket failed to open,
/// the peer went away, or a close was requested.
async fn run_socket(url: String, events: EventSender, mut close_rx: oneshot::Receiver<()>) {
    debug!("Opening WebSocket to {}", url);

    let connected = tokio::select! {
        result = connect_async(url.as_str()) => result,
        _ = &mut close_rx => {
            let _ = events.send(TransportEvent::Closed);
            return;
        }
    };

    let (mut write, mut read) = match connected {
        Ok((stream, _)) => stream.split(),
        Err(e) => {
            let _ = events.send(TransportEvent::Error(e.to_string()));
            let _ = events.send(TransportEvent::Closed);
            return;
        }
    };

    info!("WebSocket connected to {}", url);
    let _ = events.send(TransportEvent::Opened);

    loop {
        tokio::select! {
            _ = &mut close_rx => {
                let _ = write.send(Message::Close(None)).await;
                break;
            }
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if events.send(TransportEvent::Message(text)).is_err() {
                        // Nobody is listening anymore
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    let _ = events.send(TransportEvent::Error(e.to_string()));
                    break;
                }
            }
        }
    }

    debug!("WebSocket to {} closed", url);
    let _ = events.send(TransportEvent::Closed);
}
