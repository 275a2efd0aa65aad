//! Session lifecycle and frame delivery against the virtual backend

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use kinect::{
    Arg, DeviceSession, Frame, LedOption, MonitorConfig, MonitorDriver, ScriptSession,
    SessionError, StreamKind, VirtualConfig, VirtualDriver, FRAME_QUEUE_DEPTH,
};

const TIMEOUT: Duration = Duration::from_secs(5);

fn fast_driver() -> VirtualDriver {
    VirtualDriver::new(
        VirtualConfig::default()
            .with_device_count(2)
            .with_frame_interval(Duration::from_millis(2)),
    )
}

/// Session streaming `kind` into a channel of (sequence, length)
fn streaming_session(
    driver: &VirtualDriver,
    kind: StreamKind,
) -> (DeviceSession, mpsc::Receiver<(u64, usize)>) {
    let session = DeviceSession::open(driver, 0).unwrap();
    let (tx, rx) = mpsc::channel();
    session.start_stream(kind).unwrap();
    session
        .set_callback(
            kind,
            Arc::new(move |frame: &Frame| {
                let _ = tx.send((frame.sequence(), frame.len()));
            }),
        )
        .unwrap();
    session.resume().unwrap();
    (session, rx)
}

#[test]
fn open_then_close() {
    let driver = fast_driver();
    let session = DeviceSession::open(&driver, 0).unwrap();
    assert_eq!(session.index(), 0);
    assert!(session.is_open());
    session.close().unwrap();
    assert!(!session.is_open());
}

#[test]
fn open_missing_device() {
    let driver = fast_driver();
    assert!(matches!(
        DeviceSession::open(&driver, 100),
        Err(SessionError::DeviceNotFound(_))
    ));
}

#[test]
fn close_twice() {
    let driver = fast_driver();
    let session = DeviceSession::open(&driver, 0).unwrap();
    session.close().unwrap();
    assert!(matches!(session.close(), Err(SessionError::InvalidState(_))));
}

#[test]
fn open_index_twice() {
    let driver = fast_driver();
    let first = DeviceSession::open(&driver, 0).unwrap();
    assert!(matches!(
        DeviceSession::open(&driver, 0),
        Err(SessionError::InvalidState(_))
    ));
    let other = DeviceSession::open(&driver, 1).unwrap();

    first.close().unwrap();
    let again = DeviceSession::open(&driver, 0).unwrap();
    again.close().unwrap();
    other.close().unwrap();
}

#[test]
fn led_arguments() {
    let driver = fast_driver();
    let script = ScriptSession::open(&driver, 0).unwrap();

    assert!(matches!(
        script.call("setLedOption", &[]),
        Err(SessionError::InvalidArgument(_))
    ));
    assert!(matches!(
        script.call("setLedOption", &["pink".into()]),
        Err(SessionError::InvalidArgument(_))
    ));
    script
        .call("setLedOption", &["blink-red-yellow".into()])
        .unwrap();
    assert_eq!(script.session().led(), Some(LedOption::BlinkRedYellow));
}

#[test]
fn led_typed() {
    let driver = fast_driver();
    let session = DeviceSession::open(&driver, 0).unwrap();
    let option: LedOption = "blink-red-yellow".parse().unwrap();
    session.set_led_option(option).unwrap();
    assert_eq!(session.led(), Some(LedOption::BlinkRedYellow));
    assert!("pink".parse::<LedOption>().is_err());
}

#[test]
fn tilt_arguments() {
    let driver = fast_driver();
    let script = ScriptSession::open(&driver, 0).unwrap();

    let bad: [Vec<Arg>; 4] = [
        vec![],
        vec![Arg::Number(5.0), Arg::Number(6.0)],
        vec!["up".into()],
        vec![Arg::Null],
    ];
    for args in bad {
        assert!(matches!(
            script.call("setTilt", &args),
            Err(SessionError::InvalidArgument(_))
        ));
    }

    script.call("setTilt", &[Arg::Number(-10.0)]).unwrap();
    assert_eq!(script.session().tilt(), Some(-10.0));
    assert!(matches!(
        script.call("tilt", &[Arg::Number(45.0)]),
        Err(SessionError::InvalidArgument(_))
    ));
}

#[test]
fn depth_frames_in_order() {
    // Slow enough that the bounded queue never overruns
    let driver = VirtualDriver::new(
        VirtualConfig::default().with_frame_interval(Duration::from_millis(10)),
    );
    let (session, rx) = streaming_session(&driver, StreamKind::Depth);

    let frames: Vec<(u64, usize)> = (0..10).map(|_| rx.recv_timeout(TIMEOUT).unwrap()).collect();
    session.close().unwrap();

    assert!(frames.iter().all(|&(_, len)| len == 614_400));
    for pair in frames.windows(2) {
        assert_eq!(pair[1].0, pair[0].0 + 1);
    }
}

#[test]
fn video_frame_size() {
    let driver = fast_driver();
    let (session, rx) = streaming_session(&driver, StreamKind::Video);
    let (_, len) = rx.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(len, 921_600);
    session.close().unwrap();
}

#[test]
fn no_frames_before_resume() {
    let driver = fast_driver();
    let session = DeviceSession::open(&driver, 0).unwrap();
    let (tx, rx) = mpsc::channel();
    session.start_depth().unwrap();
    session
        .set_depth_callback(move |frame: &Frame| {
            let _ = tx.send(frame.sequence());
        })
        .unwrap();

    assert!(session.is_paused());
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

    session.resume().unwrap();
    assert!(rx.recv_timeout(TIMEOUT).is_ok());
    session.close().unwrap();
}

#[test]
fn unset_stops_delivery() {
    let driver = fast_driver();
    let (session, rx) = streaming_session(&driver, StreamKind::Depth);
    for _ in 0..3 {
        rx.recv_timeout(TIMEOUT).unwrap();
    }

    session.unset_depth_callback().unwrap();
    assert!(!session.has_callback(StreamKind::Depth));
    // Whatever was sent before unset returned is already in the channel
    while rx.try_recv().is_ok() {}
    thread::sleep(Duration::from_millis(50));
    assert!(rx.try_recv().is_err());
    assert!(session.is_streaming(StreamKind::Depth));
    session.close().unwrap();
}

#[test]
fn replacing_callback() {
    let driver = fast_driver();
    let (session, old_rx) = streaming_session(&driver, StreamKind::Depth);
    old_rx.recv_timeout(TIMEOUT).unwrap();

    let (tx, rx) = mpsc::channel();
    session
        .set_depth_callback(move |frame: &Frame| {
            let _ = tx.send(frame.sequence());
        })
        .unwrap();
    while old_rx.try_recv().is_ok() {}

    rx.recv_timeout(TIMEOUT).unwrap();
    thread::sleep(Duration::from_millis(20));
    assert!(old_rx.try_recv().is_err());
    session.close().unwrap();
}

#[test]
fn pause_then_resume_does_not_replay() {
    let driver = fast_driver();
    let (session, rx) = streaming_session(&driver, StreamKind::Depth);
    for _ in 0..3 {
        rx.recv_timeout(TIMEOUT).unwrap();
    }

    session.pause().unwrap();
    session.pause().unwrap();
    let mut last = 0;
    while let Ok((sequence, _)) = rx.try_recv() {
        last = sequence;
    }
    thread::sleep(Duration::from_millis(50));
    assert!(rx.try_recv().is_err());

    session.resume().unwrap();
    let (next, _) = rx.recv_timeout(TIMEOUT).unwrap();
    assert!(next > last);
    session.close().unwrap();
}

#[test]
fn stop_then_restart() {
    let driver = fast_driver();
    let (session, rx) = streaming_session(&driver, StreamKind::Depth);
    rx.recv_timeout(TIMEOUT).unwrap();

    session.stop_depth().unwrap();
    while rx.try_recv().is_ok() {}
    thread::sleep(Duration::from_millis(30));
    assert!(rx.try_recv().is_err());

    session.start_depth().unwrap();
    // Sequences restart with the stream
    let (sequence, _) = rx.recv_timeout(TIMEOUT).unwrap();
    assert!(sequence < 5);
    session.close().unwrap();
}

#[test]
fn close_from_callback() {
    let driver = fast_driver();
    let session = Arc::new(DeviceSession::open(&driver, 0).unwrap());
    let calls = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = mpsc::channel();

    let weak = Arc::downgrade(&session);
    let counter = Arc::clone(&calls);
    session.start_depth().unwrap();
    session
        .set_depth_callback(move |_: &Frame| {
            counter.fetch_add(1, Ordering::SeqCst);
            if let Some(session) = weak.upgrade() {
                let _ = tx.send(session.close().is_ok());
            }
        })
        .unwrap();
    session.resume().unwrap();

    assert!(rx.recv_timeout(TIMEOUT).unwrap());
    thread::sleep(Duration::from_millis(30));
    assert!(!session.is_open());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!driver.is_open(0));
}

#[test]
fn close_waits_for_running_callback() {
    let driver = fast_driver();
    let session = DeviceSession::open(&driver, 0).unwrap();
    let started = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicBool::new(false));
    let (tx, rx) = mpsc::channel();

    let calls = Arc::clone(&started);
    let done = Arc::clone(&finished);
    session.start_depth().unwrap();
    session
        .set_depth_callback(move |_: &Frame| {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                let _ = tx.send(());
                thread::sleep(Duration::from_millis(200));
                done.store(true, Ordering::SeqCst);
            }
        })
        .unwrap();
    session.resume().unwrap();

    rx.recv_timeout(TIMEOUT).unwrap();
    session.close().unwrap();
    assert!(finished.load(Ordering::SeqCst));

    let after_close = started.load(Ordering::SeqCst);
    assert_eq!(after_close, 1);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(started.load(Ordering::SeqCst), after_close);
}

#[test]
fn slow_callback_sees_recent_frames() {
    let driver = VirtualDriver::new(
        VirtualConfig::default().with_frame_interval(Duration::from_millis(1)),
    );
    let start = Instant::now();
    let session = DeviceSession::open(&driver, 0).unwrap();
    let (tx, rx) = mpsc::channel();
    session.start_depth().unwrap();
    session
        .set_depth_callback(move |frame: &Frame| {
            let now = start.elapsed().as_millis() as u64;
            let age = now.saturating_sub(u64::from(frame.timestamp()));
            let _ = tx.send((frame.sequence(), age));
            thread::sleep(Duration::from_millis(20));
        })
        .unwrap();
    session.resume().unwrap();

    let frames: Vec<(u64, u64)> = (0..40).map(|_| rx.recv_timeout(TIMEOUT).unwrap()).collect();
    session.close().unwrap();

    // A backlog would age every delivery by another 20ms sleep
    let bound = (FRAME_QUEUE_DEPTH as u64 + 2) * 20 + 150;
    let oldest = frames.iter().map(|&(_, age)| age).max().unwrap();
    assert!(oldest < bound, "frame delivered {}ms after capture", oldest);
    // Dropping happened: sequences skip ahead
    assert!(frames.last().unwrap().0 > 40);
}

#[test]
fn panicking_callback_keeps_stream() {
    let driver = fast_driver();
    let session = DeviceSession::open(&driver, 0).unwrap();
    let (tx, rx) = mpsc::channel();
    session.start_depth().unwrap();
    session
        .set_depth_callback(move |frame: &Frame| {
            if frame.sequence() == 0 {
                panic!("first frame rejected");
            }
            let _ = tx.send(frame.sequence());
        })
        .unwrap();
    session.resume().unwrap();

    assert!(rx.recv_timeout(TIMEOUT).unwrap() >= 1);
    session.close().unwrap();
}

#[test]
fn drop_closes_session() {
    let driver = fast_driver();
    {
        let (_session, rx) = streaming_session(&driver, StreamKind::Video);
        rx.recv_timeout(TIMEOUT).unwrap();
    }
    assert!(!driver.is_open(0));
}

#[test]
fn monitored_driver() {
    let driver = MonitorDriver::wrap(Arc::new(fast_driver()), MonitorConfig::default());
    let session = DeviceSession::open(driver.as_ref(), 0).unwrap();
    assert_eq!(session.info().tilt_range.max, 27.0);
    session.set_tilt(27.0).unwrap();
    session.set_led_option(LedOption::Off).unwrap();
    assert!(matches!(
        DeviceSession::open(driver.as_ref(), 0),
        Err(SessionError::InvalidState(_))
    ));
    session.close().unwrap();
    assert_eq!(kinect::device_count(driver.as_ref()).unwrap(), 2);
}
