//! Client transport abstraction
//!
//! Socket callbacks are turned into [`TransportEvent`]s that the connection
//! manager drains once per frame, so no transport code ever runs inside the
//! simulation.

use futures::{SinkExt, StreamExt};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::debug;

/// Something that happened on the socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Text(String),
    /// Closed cleanly (`None`) or by an error
    Closed(Option<String>),
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport is not open")]
    NotOpen,
    #[error("transport task has stopped")]
    TaskGone,
}

/// A message-framed duplex connection
pub trait Transport {
    /// Begin opening a connection; the outcome arrives as an event.
    fn open(&mut self, url: &str);
    fn send(&mut self, text: String) -> Result<(), TransportError>;
    /// Tear the connection down without emitting further events.
    fn close(&mut self);
    fn poll_event(&mut self) -> Option<TransportEvent>;
}

/// WebSocket transport backed by one tokio task per connection
pub struct WsTransport {
    runtime: Handle,
    events_rx: mpsc::UnboundedReceiver<TransportEvent>,
    outbound: Option<mpsc::UnboundedSender<String>>,
    task: Option<JoinHandle<()>>,
}

impl WsTransport {
    pub fn new(runtime: Handle) -> Self {
        let (_, events_rx) = mpsc::unbounded_channel();
        Self {
            runtime,
            events_rx,
            outbound: None,
            task: None,
        }
    }
}

impl Transport for WsTransport {
    fn open(&mut self, url: &str) {
        self.close();

        // A fresh event channel per connection: anything a previous task
        // left behind is dropped with the old receiver.
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        self.events_rx = events_rx;
        self.outbound = Some(outbound_tx);
        self.task = Some(
            self.runtime
                .spawn(run_connection(url.to_string(), events_tx, outbound_rx)),
        );
    }

    fn send(&mut self, text: String) -> Result<(), TransportError> {
        let outbound = self.outbound.as_ref().ok_or(TransportError::NotOpen)?;
        outbound.send(text).map_err(|_| TransportError::TaskGone)
    }

    fn close(&mut self) {
        self.outbound = None;
        if let Some(task) = self.task.take() {
            task.abort();
        }
        let (_, events_rx) = mpsc::unbounded_channel();
        self.events_rx = events_rx;
    }

    fn poll_event(&mut self) -> Option<TransportEvent> {
        self.events_rx.try_recv().ok()
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run_connection(
    url: String,
    events: mpsc::UnboundedSender<TransportEvent>,
    mut outbound: mpsc::UnboundedReceiver<String>,
) {
    let socket = match connect_async(url.as_str()).await {
        Ok((socket, _)) => socket,
        Err(e) => {
            let _ = events.send(TransportEvent::Closed(Some(e.to_string())));
            return;
        }
    };
    let _ = events.send(TransportEvent::Opened);

    let (mut sink, mut stream) = socket.split();
    let reason = loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(text) => {
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        break Some(e.to_string());
                    }
                }
                None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break None;
                }
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(TransportEvent::Text(text));
                }
                Some(Ok(Message::Close(_))) | None => break None,
                Some(Ok(other)) => debug!(kind = ?other, "Ignoring non-text frame"),
                Some(Err(e)) => break Some(e.to_string()),
            },
        }
    };

    let _ = events.send(TransportEvent::Closed(reason));
}

#[cfg(test)]
pub(crate) mod mock {
    use std::collections::VecDeque;

    use super::{Transport, TransportError, TransportEvent};

    /// Scripted transport: tests push events and inspect what was sent.
    #[derive(Debug, Default)]
    pub(crate) struct MockTransport {
        pub opens: u32,
        pub closes: u32,
        pub sent: Vec<String>,
        pub events: VecDeque<TransportEvent>,
    }

    impl Transport for MockTransport {
        fn open(&mut self, _url: &str) {
            self.opens += 1;
        }

        fn send(&mut self, text: String) -> Result<(), TransportError> {
            self.sent.push(text);
            Ok(())
        }

        fn close(&mut self) {
            self.closes += 1;
        }

        fn poll_event(&mut self) -> Option<TransportEvent> {
            self.events.pop_front()
        }
    }
}
