//! Frame dispatch from the driver's acquisition thread to the session's sinks
//!
//! ```text
//! [driver acquisition thread]  -- FrameCallback --> mpsc (bounded)
//!                                                      |
//!                                           [session dispatch thread]
//!                                                      |
//!                                   FrameSink (callback or EventEmitter)
//! ```
//!
//! Every frame is tagged with its stream's generation when the driver
//! produces it. Pausing, resuming, stopping and starting bump the
//! generation, so frames queued before the change are dropped instead of
//! being replayed. Each started stream also gets its own forwarder with a
//! liveness flag, so a frame the driver was still producing when the stream
//! was stopped cannot slip into a restarted stream.
//!
//! The queue holds at most `FRAME_QUEUE_DEPTH` frames. When a sink falls
//! behind, newly produced frames are dropped, so a slow sink sees frames at
//! most that many frame intervals old.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use kinect_driver::{Frame, FrameCallback, LedOption, StreamKind};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};

use crate::sink::SharedSink;

/// Frames buffered between the driver and the sinks of one session
pub const FRAME_QUEUE_DEPTH: usize = 4;

/// Observable session state
#[derive(Debug, Clone)]
pub(crate) struct SessionState {
    pub open: bool,
    /// Event processing suspended; sessions open paused
    pub paused: bool,
    pub streaming: [bool; 2],
    pub led: Option<LedOption>,
    pub tilt: Option<f64>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            open: true,
            paused: true,
            streaming: [false; 2],
            led: None,
            tilt: None,
        }
    }
}

/// State shared between the session handle and its dispatch thread
///
/// Lock order: `delivery`, then `state`, then `sinks`.
pub(crate) struct SessionCore {
    pub index: usize,
    pub state: Mutex<SessionState>,
    pub sinks: Mutex<[Option<SharedSink>; 2]>,
    /// Held for the whole of each sink invocation
    pub delivery: Mutex<()>,
    generations: [Arc<AtomicU64>; 2],
    /// Liveness of the forwarder currently installed per stream
    forwarders: Mutex<[Arc<AtomicBool>; 2]>,
}

impl SessionCore {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            state: Mutex::new(SessionState::default()),
            sinks: Mutex::new([None, None]),
            delivery: Mutex::new(()),
            generations: [Arc::new(AtomicU64::new(0)), Arc::new(AtomicU64::new(0))],
            forwarders: Mutex::new([
                Arc::new(AtomicBool::new(false)),
                Arc::new(AtomicBool::new(false)),
            ]),
        }
    }

    /// Disable the forwarder of `kind`; it sends nothing from now on
    pub fn retire_forwarder(&self, kind: StreamKind) {
        self.forwarders.lock()[kind.slot()].store(false, Ordering::SeqCst);
    }

    /// Invalidate frames of `kind` that are already queued
    pub fn bump_generation(&self, kind: StreamKind) {
        self.generations[kind.slot()].fetch_add(1, Ordering::SeqCst);
    }

    /// Deliver one frame if the session still wants it
    fn deliver(&self, generation: u64, frame: &Frame) {
        let kind = frame.kind();
        let _delivery = self.delivery.lock();

        if generation != self.generations[kind.slot()].load(Ordering::SeqCst) {
            trace!(index = self.index, stream = %kind, "Dropping stale frame");
            return;
        }

        let sink = {
            let state = self.state.lock();
            if !state.open || state.paused || !state.streaming[kind.slot()] {
                return;
            }
            self.sinks.lock()[kind.slot()].clone()
        };
        let Some(sink) = sink else {
            return;
        };

        if !frame.has_expected_size() {
            warn!(
                index = self.index,
                stream = %kind,
                "Dropping frame of {} bytes, expected {}",
                frame.len(),
                kind.mode().bytes()
            );
            return;
        }

        // A failing callback is the caller's problem; keep the stream alive
        if panic::catch_unwind(AssertUnwindSafe(|| sink.on_frame(frame))).is_err() {
            error!(
                index = self.index,
                stream = %kind,
                sequence = frame.sequence(),
                "Frame callback panicked"
            );
        }
    }
}

pub(crate) enum DispatchMessage {
    Frame { generation: u64, frame: Frame },
    Shutdown,
}

/// Owns the dispatch thread of one session
pub(crate) struct Dispatcher {
    tx: mpsc::Sender<DispatchMessage>,
    stopping: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
    thread_id: ThreadId,
}

impl Dispatcher {
    pub fn spawn(core: Arc<SessionCore>) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel(FRAME_QUEUE_DEPTH);
        let stopping = Arc::new(AtomicBool::new(false));
        let loop_stopping = Arc::clone(&stopping);
        let handle = thread::Builder::new()
            .name(format!("kinect-{}-dispatch", core.index))
            .spawn(move || run_dispatch_loop(core, rx, loop_stopping))?;

        Ok(Self {
            tx,
            stopping,
            thread_id: handle.thread().id(),
            thread: Mutex::new(Some(handle)),
        })
    }

    /// Whether the caller is running inside a sink invocation
    pub fn is_current_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Driver callback forwarding frames of `kind` into the queue
    ///
    /// Replaces (and retires) the previous forwarder of that stream.
    pub fn forwarder(&self, core: &SessionCore, kind: StreamKind) -> FrameCallback {
        let tx = self.tx.clone();
        let generation = Arc::clone(&core.generations[kind.slot()]);
        let index = core.index;
        let live = Arc::new(AtomicBool::new(true));
        let previous = std::mem::replace(
            &mut core.forwarders.lock()[kind.slot()],
            Arc::clone(&live),
        );
        previous.store(false, Ordering::SeqCst);

        Arc::new(move |frame: Frame| {
            // Generation first: a retire after this check also bumps it
            let generation = generation.load(Ordering::SeqCst);
            if !live.load(Ordering::SeqCst) {
                return;
            }
            match tx.try_send(DispatchMessage::Frame { generation, frame }) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    trace!(index, stream = %kind, "Frame queue full, dropping frame");
                }
                // Dispatcher already shut down
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        })
    }

    /// Stop the dispatch thread, waiting for it unless called from it
    pub fn shutdown(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        // With a full queue the loop stops once it has drained
        let _ = self.tx.try_send(DispatchMessage::Shutdown);
        let Some(handle) = self.thread.lock().take() else {
            return;
        };
        if self.is_current_thread() {
            return;
        }
        if handle.join().is_err() {
            error!("Dispatch thread panicked");
        }
    }
}

fn run_dispatch_loop(
    core: Arc<SessionCore>,
    mut rx: mpsc::Receiver<DispatchMessage>,
    stopping: Arc<AtomicBool>,
) {
    debug!(index = core.index, "Dispatch thread started");

    while let Some(message) = rx.blocking_recv() {
        match message {
            DispatchMessage::Frame { generation, frame } => core.deliver(generation, &frame),
            DispatchMessage::Shutdown => break,
        }
        if stopping.load(Ordering::SeqCst) && rx.is_empty() {
            break;
        }
    }

    debug!(index = core.index, "Dispatch thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn depth_frame(sequence: u64) -> Frame {
        Frame::new(
            StreamKind::Depth,
            sequence,
            0,
            vec![0u8; StreamKind::Depth.mode().bytes()],
        )
    }

    fn counting_core() -> (SessionCore, Arc<AtomicUsize>) {
        let core = SessionCore::new(0);
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        core.sinks.lock()[0] = Some(Arc::new(move |_: &Frame| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));
        {
            let mut state = core.state.lock();
            state.paused = false;
            state.streaming[0] = true;
        }
        (core, count)
    }

    #[test]
    fn test_deliver_current_generation() {
        let (core, count) = counting_core();
        core.deliver(0, &depth_frame(0));
        core.deliver(0, &depth_frame(1));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_stale_generation_dropped() {
        let (core, count) = counting_core();
        core.bump_generation(StreamKind::Depth);
        core.deliver(0, &depth_frame(0));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        core.deliver(1, &depth_frame(1));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_paused_or_stopped_dropped() {
        let (core, count) = counting_core();
        core.state.lock().paused = true;
        core.deliver(0, &depth_frame(0));
        core.state.lock().paused = false;
        core.state.lock().streaming[0] = false;
        core.deliver(0, &depth_frame(1));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_wrong_size_dropped() {
        let (core, count) = counting_core();
        core.deliver(0, &Frame::new(StreamKind::Depth, 0, 0, vec![0u8; 16]));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_only_live_forwarder_sends() {
        let (core, count) = counting_core();
        let core = Arc::new(core);
        let dispatcher = Dispatcher::spawn(Arc::clone(&core)).unwrap();
        let first = dispatcher.forwarder(&core, StreamKind::Depth);
        let second = dispatcher.forwarder(&core, StreamKind::Depth);

        first(depth_frame(0));
        second(depth_frame(1));
        core.retire_forwarder(StreamKind::Depth);
        second(depth_frame(2));

        // Queued frames are handled before the shutdown message
        dispatcher.shutdown();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_slow_sink_drops_instead_of_queueing() {
        let core = Arc::new(SessionCore::new(0));
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&delivered);
        core.sinks.lock()[0] = Some(Arc::new(move |frame: &Frame| {
            thread::sleep(std::time::Duration::from_millis(20));
            seen.lock().push(frame.sequence());
        }));
        {
            let mut state = core.state.lock();
            state.paused = false;
            state.streaming[0] = true;
        }

        let dispatcher = Dispatcher::spawn(Arc::clone(&core)).unwrap();
        let forward = dispatcher.forwarder(&core, StreamKind::Depth);
        let frame = depth_frame(0);
        for sequence in 0..50 {
            forward(Frame::new(StreamKind::Depth, sequence, 0, frame.data().to_vec()));
        }
        // Let the sink drain what was queued
        thread::sleep(std::time::Duration::from_millis(300));
        dispatcher.shutdown();

        // One frame in the sink plus a full queue; everything else dropped
        let delivered = delivered.lock();
        assert!(!delivered.is_empty());
        assert!(delivered.len() <= FRAME_QUEUE_DEPTH + 1);
        assert!(delivered.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_panicking_sink_survives() {
        let core = SessionCore::new(0);
        core.sinks.lock()[0] = Some(Arc::new(|_: &Frame| panic!("callback failure")));
        {
            let mut state = core.state.lock();
            state.paused = false;
            state.streaming[0] = true;
        }
        core.deliver(0, &depth_frame(0));
        // The delivery lock was released on unwind
        assert!(core.delivery.try_lock().is_some());
    }
}
