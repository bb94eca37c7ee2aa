//! Transport adapter
//!
//! One outbound text channel to the desktop host. The adapter owns nothing
//! of the engine: it reports through a single callback sink handed in at
//! open, and close detaches that sink before the socket goes down, so a
//! closed channel can never fire late events.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;

/// Events a channel reports upward.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Channel is open and writable
    Opened,
    /// Channel went down, with the close code/reason when one was supplied
    Closed { code: Option<u16>, reason: String },
    /// Channel-level failure; a close follows
    Errored { message: String },
    /// One inbound text frame
    Message { text: String },
}

/// Callback sink for transport events.
pub type EventSink = Box<dyn Fn(TransportEvent) + Send + Sync>;

/// Opens channels to the host. The engine keeps at most one alive.
pub trait Connector: Send + Sync {
    fn open(&self, address: &str, sink: EventSink) -> Box<dyn Channel>;
}

/// A live (or still opening) text channel.
pub trait Channel: Send {
    /// Queues one outbound text frame. Returns false without raising when
    /// the channel is not open.
    fn send(&self, text: String) -> bool;

    /// Detaches the event sink, then closes with `code`/`reason`. No events
    /// fire after this returns.
    fn close(&self, code: u16, reason: &str);

    fn is_open(&self) -> bool;
}

enum WsCommand {
    Send(String),
    Close { code: u16, reason: String },
}

/// WebSocket connector backed by tokio-tungstenite.
#[derive(Debug, Default, Clone)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn open(&self, address: &str, sink: EventSink) -> Box<dyn Channel> {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(false));
        let detached = Arc::new(AtomicBool::new(false));

        tokio::spawn(ws_task(
            address.to_string(),
            sink,
            command_rx,
            open.clone(),
            detached.clone(),
        ));

        Box::new(WsChannel {
            command_tx,
            open,
            detached,
        })
    }
}

struct WsChannel {
    command_tx: mpsc::UnboundedSender<WsCommand>,
    open: Arc<AtomicBool>,
    detached: Arc<AtomicBool>,
}

impl Channel for WsChannel {
    fn send(&self, text: String) -> bool {
        if !self.is_open() {
            return false;
        }
        self.command_tx.send(WsCommand::Send(text)).is_ok()
    }

    fn close(&self, code: u16, reason: &str) {
        self.detached.store(true, Ordering::Release);
        self.open.store(false, Ordering::Release);
        let _ = self.command_tx.send(WsCommand::Close {
            code,
            reason: reason.to_string(),
        });
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && !self.detached.load(Ordering::Acquire)
    }
}

async fn ws_task(
    address: String,
    sink: EventSink,
    mut commands: mpsc::UnboundedReceiver<WsCommand>,
    open: Arc<AtomicBool>,
    detached: Arc<AtomicBool>,
) {
    let emit = |event: TransportEvent| {
        if !detached.load(Ordering::Acquire) {
            (sink)(event);
        }
    };

    if let Err(e) = url::Url::parse(&address) {
        tracing::warn!(%address, error = %e, "invalid endpoint address");
        emit(TransportEvent::Errored {
            message: format!("invalid address: {e}"),
        });
        emit(TransportEvent::Closed {
            code: None,
            reason: "invalid address".to_string(),
        });
        return;
    }

    let stream = match connect_async(address.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            tracing::debug!(%address, error = %e, "connect failed");
            emit(TransportEvent::Errored {
                message: e.to_string(),
            });
            emit(TransportEvent::Closed {
                code: None,
                reason: "connect failed".to_string(),
            });
            return;
        }
    };

    open.store(true, Ordering::Release);
    tracing::debug!(%address, "channel open");
    emit(TransportEvent::Opened);

    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(WsCommand::Send(text)) => {
                    if let Err(e) = write.send(WsMessage::Text(text)).await {
                        open.store(false, Ordering::Release);
                        emit(TransportEvent::Errored { message: e.to_string() });
                        emit(TransportEvent::Closed {
                            code: None,
                            reason: "send failed".to_string(),
                        });
                        break;
                    }
                }
                Some(WsCommand::Close { code, reason }) => {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.into(),
                    };
                    let _ = write.send(WsMessage::Close(Some(frame))).await;
                    open.store(false, Ordering::Release);
                    break;
                }
                // channel handle dropped; shut the socket down quietly
                None => {
                    let _ = write.send(WsMessage::Close(None)).await;
                    open.store(false, Ordering::Release);
                    break;
                }
            },
            frame = read.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    emit(TransportEvent::Message { text });
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    open.store(false, Ordering::Release);
                    let (code, reason) = match frame {
                        Some(f) => (Some(u16::from(f.code)), f.reason.to_string()),
                        None => (None, String::new()),
                    };
                    emit(TransportEvent::Closed { code, reason });
                    break;
                }
                // binary/ping/pong frames are not part of the protocol
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    open.store(false, Ordering::Release);
                    emit(TransportEvent::Errored { message: e.to_string() });
                    emit(TransportEvent::Closed {
                        code: None,
                        reason: "socket error".to_string(),
                    });
                    break;
                }
                None => {
                    open.store(false, Ordering::Release);
                    emit(TransportEvent::Closed {
                        code: None,
                        reason: "stream ended".to_string(),
                    });
                    break;
                }
            },
        }
    }
}
