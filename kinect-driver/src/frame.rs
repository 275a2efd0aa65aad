//! Frame payloads pushed by the acquisition thread

use std::ops::Deref;
use std::sync::Arc;

use crate::types::StreamKind;

/// One depth map or color image
///
/// The payload is shared, so cloning a frame never copies pixel data.
#[derive(Debug, Clone)]
pub struct Frame {
    kind: StreamKind,
    sequence: u64,
    timestamp: u32,
    data: Arc<[u8]>,
}

impl Frame {
    pub fn new(
        kind: StreamKind,
        sequence: u64,
        timestamp: u32,
        data: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            kind,
            sequence,
            timestamp,
            data: data.into(),
        }
    }

    /// Stream this frame belongs to
    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    /// Per-stream counter, starting at 0 when the stream starts
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Driver timestamp (milliseconds since the device was opened, wrapping)
    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Whether the payload matches the stream's mode size
    pub fn has_expected_size(&self) -> bool {
        self.data.len() == self.kind.mode().bytes()
    }
}

impl Deref for Frame {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

/// Callback a backend invokes for each produced frame
pub type FrameCallback = Arc<dyn Fn(Frame) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_shares_payload() {
        let frame = Frame::new(StreamKind::Depth, 3, 100, vec![1u8, 2, 3]);
        let copy = frame.clone();
        assert_eq!(copy.data().as_ptr(), frame.data().as_ptr());
        assert_eq!(copy.len(), 3);
        assert_eq!(copy.sequence(), 3);
        assert!(!copy.has_expected_size());
    }
}
