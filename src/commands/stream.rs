//! Frame streaming command.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use kinect::{BoxedDriver, EventedSession, Frame, StreamKind};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};

use super::{setup_interrupt_handler, CommandResult};

pub struct StreamOptions {
    pub depth: bool,
    pub video: bool,
    /// Frames per stream before stopping
    pub frames: Option<u64>,
    pub seconds: Option<f64>,
    /// Broadcast buffer per subscriber
    pub capacity: usize,
}

impl StreamOptions {
    /// Requested streams; depth when none was named
    fn kinds(&self) -> Vec<StreamKind> {
        let kinds: Vec<StreamKind> = StreamKind::ALL
            .into_iter()
            .filter(|kind| match kind {
                StreamKind::Depth => self.depth,
                StreamKind::Video => self.video,
            })
            .collect();
        if kinds.is_empty() {
            vec![StreamKind::Depth]
        } else {
            kinds
        }
    }

    /// `--seconds` as a duration; negative, NaN and infinite values are rejected
    fn time_limit(&self) -> anyhow::Result<Option<Duration>> {
        self.seconds
            .map(|s| {
                Duration::try_from_secs_f64(s)
                    .map_err(|e| anyhow::anyhow!("invalid --seconds {}: {}", s, e))
            })
            .transpose()
    }
}

/// Stream frames until the frame limit, the time limit or Ctrl-C
pub async fn run(driver: BoxedDriver, index: usize, options: StreamOptions) -> CommandResult {
    let kinds = options.kinds();
    let time_limit = options.time_limit()?;
    let session = EventedSession::open(driver.as_ref(), index, options.capacity)?;

    let mut readers = Vec::new();
    for &kind in &kinds {
        let count = Arc::new(AtomicU64::new(0));
        let rx = session.subscribe(kind);
        let task = tokio::spawn(read_frames(rx, kind, options.frames, Arc::clone(&count)));
        readers.push((kind, count, task));
        session.start_stream(kind)?;
    }
    session.resume()?;

    let running = setup_interrupt_handler();
    // Limits beyond what Instant can represent mean no limit
    let deadline = time_limit.and_then(|limit| Instant::now().checked_add(limit));
    info!(index, "Streaming. Press Ctrl+C to stop.");

    loop {
        if !running.load(Ordering::SeqCst) {
            info!("Interrupted");
            break;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
        if readers.iter().all(|(_, _, task)| task.is_finished()) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    session.close()?;

    for (kind, count, task) in readers {
        task.abort();
        let count = count.load(Ordering::SeqCst);
        println!(
            "{}: {} frame(s) of {} bytes",
            kind,
            count,
            kind.mode().bytes()
        );
    }
    Ok(())
}

async fn read_frames(
    mut rx: broadcast::Receiver<Frame>,
    kind: StreamKind,
    limit: Option<u64>,
    count: Arc<AtomicU64>,
) {
    loop {
        match rx.recv().await {
            Ok(frame) => {
                let seen = count.fetch_add(1, Ordering::SeqCst) + 1;
                println!(
                    "{} #{:<5} ts={:<8} {} bytes",
                    kind,
                    frame.sequence(),
                    frame.timestamp(),
                    frame.len()
                );
                if limit.is_some_and(|limit| seen >= limit) {
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(stream = %kind, "Reader lagged, skipped {} frame(s)", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(seconds: Option<f64>) -> StreamOptions {
        StreamOptions {
            depth: false,
            video: true,
            frames: None,
            seconds,
            capacity: 4,
        }
    }

    #[test]
    fn test_time_limit() {
        assert_eq!(options(None).time_limit().unwrap(), None);
        assert_eq!(
            options(Some(1.5)).time_limit().unwrap(),
            Some(Duration::from_millis(1500))
        );
        for bad in [f64::INFINITY, f64::NAN, -1.0] {
            assert!(options(Some(bad)).time_limit().is_err());
        }
    }

    #[test]
    fn test_default_stream_is_depth() {
        let mut opts = options(None);
        assert_eq!(opts.kinds(), vec![StreamKind::Video]);
        opts.video = false;
        assert_eq!(opts.kinds(), vec![StreamKind::Depth]);
    }
}
