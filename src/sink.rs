//! Frame sinks: the interface both front-ends plug into

use std::sync::Arc;

use kinect_driver::Frame;

/// Receiver of delivered frames
///
/// The frame is only borrowed for the duration of the call; copy the payload
/// (`frame.to_vec()`) or clone the `Frame` to keep it.
pub trait FrameSink: Send + Sync {
    fn on_frame(&self, frame: &Frame);
}

/// Plain closures are sinks
impl<F> FrameSink for F
where
    F: Fn(&Frame) + Send + Sync,
{
    fn on_frame(&self, frame: &Frame) {
        self(frame)
    }
}

/// Type alias for a shared sink
pub type SharedSink = Arc<dyn FrameSink>;
