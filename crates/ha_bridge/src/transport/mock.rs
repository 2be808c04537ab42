//! Mock transport for testing

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use reqwest::Url;
use tokio::sync::Notify;
use tokio::sync::mpsc;

use super::Connector;
use super::Transport;
use super::TransportEvent;
use super::TransportHandle;

/// Records every transport it creates and lets tests fire their events.
#[derive(Default)]
pub struct MockConnector {
    opened: Mutex<Vec<MockTransportControl>>,
    notify: Notify,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of transports created so far
    pub fn open_count(&self) -> usize {
        self.opened.lock().unwrap().len()
    }

    /// Control for the `index`-th transport created
    pub fn transport(&self, index: usize) -> MockTransportControl {
        self.opened.lock().unwrap()[index].clone()
    }

    /// Wait until at least `count` transports have been created.
    pub async fn wait_for_open(&self, count: usize) -> MockTransportControl {
        loop {
            let notified = self.notify.notified();
            if self.open_count() >= count {
                return self.transport(count - 1);
            }
            notified.await;
        }
    }
}

impl Connector for MockConnector {
    fn open(&self, url: &Url) -> TransportHandle {
        let (events_tx, events) = mpsc::unbounded_channel();
        let closes = Arc::new(AtomicUsize::new(0));

        self.opened.lock().unwrap().push(MockTransportControl {
            url: url.to_string(),
            events: events_tx,
            closes: closes.clone(),
        });
        self.notify.notify_waiters();

        TransportHandle {
            transport: Box::new(MockTransport { closes }),
            events,
        }
    }
}

/// Counts close requests. Unlike a real socket it never reports `Closed`
/// on its own; tests fire that explicitly.
struct MockTransport {
    closes: Arc<AtomicUsize>,
}

impl Transport for MockTransport {
    fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Test-side handle for one mock transport.
#[derive(Clone)]
pub struct MockTransportControl {
    pub url: String,
    events: mpsc::UnboundedSender<TransportEvent>,
    closes: Arc<AtomicUsize>,
}

impl MockTransportControl {
    pub fn open(&self) {
        let _ = self.events.send(TransportEvent::Opened);
    }

    pub fn message(&self, text: &str) {
        let _ = self.events.send(TransportEvent::Message(text.to_string()));
    }

    pub fn error(&self, message: &str) {
        let _ = self.events.send(TransportEvent::Error(message.to_string()));
    }

    pub fn closed(&self) {
        let _ = self.events.send(TransportEvent::Closed);
    }

    /// Number of times the bridge called `close()` on this transport
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}
