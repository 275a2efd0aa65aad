//! Named-event front-end
//!
//! `EventEmitter` fans every delivered frame out to the listeners registered
//! for its event name (`"depth"` or `"video"`) and to async subscribers
//! through a `tokio::sync::broadcast` channel per stream.
//!
//! ```ignore
//! let session = EventedSession::open(&driver, 0, 16)?;
//! session.on("depth", |frame: &Frame| println!("{} bytes", frame.len()))?;
//! session.start_depth()?;
//! session.resume()?;
//! ```

use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use kinect_driver::{Driver, Frame, StreamKind};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::trace;

use crate::error::{SessionError, SessionResult};
use crate::session::DeviceSession;
use crate::sink::FrameSink;

/// Handle for removing a listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&Frame) + Send + Sync>;

struct Registration {
    id: ListenerId,
    once: bool,
    listener: Listener,
}

/// Resolve an event name ("depth" / "video")
pub fn parse_event(event: &str) -> SessionResult<StreamKind> {
    StreamKind::ALL
        .into_iter()
        .find(|kind| kind.name() == event)
        .ok_or_else(|| SessionError::InvalidArgument(format!("Unknown event: {}", event)))
}

/// Frame event emitter
pub struct EventEmitter {
    listeners: [Mutex<Vec<Registration>>; 2],
    channels: [broadcast::Sender<Frame>; 2],
    next_id: AtomicU64,
}

impl EventEmitter {
    /// Create an emitter whose subscribers buffer up to `capacity` frames
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            listeners: [Mutex::new(Vec::new()), Mutex::new(Vec::new())],
            channels: [
                broadcast::channel(capacity).0,
                broadcast::channel(capacity).0,
            ],
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a listener for a named event
    pub fn on<F>(&self, event: &str, listener: F) -> SessionResult<ListenerId>
    where
        F: Fn(&Frame) + Send + Sync + 'static,
    {
        Ok(self.register(parse_event(event)?, false, Arc::new(listener)))
    }

    /// Register a listener that is removed after its first frame
    pub fn once<F>(&self, event: &str, listener: F) -> SessionResult<ListenerId>
    where
        F: Fn(&Frame) + Send + Sync + 'static,
    {
        Ok(self.register(parse_event(event)?, true, Arc::new(listener)))
    }

    pub fn on_stream<F>(&self, kind: StreamKind, listener: F) -> ListenerId
    where
        F: Fn(&Frame) + Send + Sync + 'static,
    {
        self.register(kind, false, Arc::new(listener))
    }

    /// Remove one listener; returns whether it was registered
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.iter().any(|slot| {
            let mut listeners = slot.lock();
            let before = listeners.len();
            listeners.retain(|r| r.id != id);
            listeners.len() != before
        })
    }

    pub fn remove_all_listeners(&self, kind: StreamKind) {
        self.listeners[kind.slot()].lock().clear();
    }

    pub fn listener_count(&self, kind: StreamKind) -> usize {
        self.listeners[kind.slot()].lock().len()
    }

    /// Receive frames of `kind` asynchronously
    ///
    /// Receivers that fall more than the channel capacity behind observe
    /// `RecvError::Lagged` and skip ahead.
    pub fn subscribe(&self, kind: StreamKind) -> broadcast::Receiver<Frame> {
        self.channels[kind.slot()].subscribe()
    }

    /// Deliver a frame to every listener of its stream, then to subscribers
    pub fn emit(&self, frame: &Frame) {
        let kind = frame.kind();
        let listeners: Vec<Listener> = {
            let mut slot = self.listeners[kind.slot()].lock();
            let current = slot.iter().map(|r| Arc::clone(&r.listener)).collect();
            slot.retain(|r| !r.once);
            current
        };

        for listener in &listeners {
            listener(frame);
        }

        // No subscribers is not an error
        if self.channels[kind.slot()].send(frame.clone()).is_err() {
            trace!(stream = %kind, "No subscribers");
        }
    }

    fn register(&self, kind: StreamKind, once: bool, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners[kind.slot()].lock().push(Registration { id, once, listener });
        id
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(16)
    }
}

impl FrameSink for EventEmitter {
    fn on_frame(&self, frame: &Frame) {
        self.emit(frame);
    }
}

/// A session whose frames are emitted as named events
pub struct EventedSession {
    session: DeviceSession,
    emitter: Arc<EventEmitter>,
}

impl EventedSession {
    /// Open a device and route both streams through a fresh emitter
    pub fn open(driver: &dyn Driver, index: usize, capacity: usize) -> SessionResult<Self> {
        let session = DeviceSession::open(driver, index)?;
        let emitter = Arc::new(EventEmitter::new(capacity));
        for kind in StreamKind::ALL {
            session.set_callback(kind, emitter.clone())?;
        }
        Ok(Self { session, emitter })
    }

    pub fn emitter(&self) -> &Arc<EventEmitter> {
        &self.emitter
    }

    pub fn on<F>(&self, event: &str, listener: F) -> SessionResult<ListenerId>
    where
        F: Fn(&Frame) + Send + Sync + 'static,
    {
        self.emitter.on(event, listener)
    }

    pub fn subscribe(&self, kind: StreamKind) -> broadcast::Receiver<Frame> {
        self.emitter.subscribe(kind)
    }

    pub fn into_inner(self) -> DeviceSession {
        self.session
    }
}

impl Deref for EventedSession {
    type Target = DeviceSession;

    fn deref(&self) -> &DeviceSession {
        &self.session
    }
}
