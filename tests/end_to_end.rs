use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use via_bridge::{
    Advance, ExchangeConfig, Frame, NativeBridge, PixelFormat, Rendezvous, Shutdown, SubmitError,
};

fn rendezvous(timeout_ms: u64) -> Rendezvous {
    let config = ExchangeConfig {
        timeout_ms,
        ..ExchangeConfig::default()
    };
    Rendezvous::new(&config, Shutdown::new())
}

#[tokio::test(start_paused = true)]
async fn single_pixel_round_trip_then_timeout() {
    let rendezvous = rendezvous(100);
    let frame = Frame::from_pixels(1, 1, PixelFormat::Rgb24, vec![10, 20, 30]).unwrap();
    rendezvous.frames().send_frame(frame);

    let frame = rendezvous.next_frame().await.frame().unwrap();
    assert_eq!((frame.width(), frame.height()), (1, 1));
    assert_eq!(&frame.data[..], &[10, 20, 30]);

    let start = Instant::now();
    assert!(matches!(rendezvous.next_frame().await, Advance::TimedOut));
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(100), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(200), "{elapsed:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn push_unblocks_submit_promptly() {
    let rendezvous = rendezvous(1000);
    let results = rendezvous.results().clone();
    let frame = Frame::from_pixels(1, 1, PixelFormat::Rgb24, vec![1, 2, 3]).unwrap();

    let submitter = tokio::spawn(async move {
        let result = results.submit(frame).await;
        (result, Instant::now())
    });

    assert!(rendezvous.next_frame().await.is_ready());
    assert!(rendezvous.results().is_waiting());

    let pushed = Instant::now();
    assert!(rendezvous.results().push_result("ok".into()));
    let (result, returned) = submitter.await.unwrap();

    assert_eq!(result, Ok("ok".to_string()));
    assert!(returned.duration_since(pushed) < Duration::from_millis(50));
    assert!(!rendezvous.results().is_waiting());
}

#[tokio::test(start_paused = true)]
async fn results_pair_with_their_frames() {
    let rendezvous = rendezvous(100);
    let results = rendezvous.results().clone();

    let producer = tokio::spawn(async move {
        let mut answers = Vec::new();
        for i in 0..5u8 {
            let frame = Frame::from_pixels(1, 1, PixelFormat::Rgb24, vec![i; 3])
                .unwrap()
                .with_sequence(i as u64);
            answers.push(results.submit(frame).await.unwrap());
        }
        answers
    });

    for _ in 0..5 {
        let frame = loop {
            if let Some(frame) = rendezvous.next_frame().await.frame() {
                break frame;
            }
        };
        assert!(rendezvous.results().push_result(format!("r{}", frame.data[0])));
    }

    assert_eq!(producer.await.unwrap(), vec!["r0", "r1", "r2", "r3", "r4"]);
}

#[tokio::test(start_paused = true)]
async fn shutdown_releases_both_sides() {
    let rendezvous = rendezvous(10_000);
    let results = rendezvous.results().clone();
    let frame = Frame::from_pixels(1, 1, PixelFormat::Rgb24, vec![0; 3]).unwrap();
    let submitter = tokio::spawn(async move { results.submit(frame).await });

    assert!(rendezvous.next_frame().await.is_ready());
    rendezvous.shutdown().trigger();

    assert_eq!(submitter.await.unwrap(), Err(SubmitError::Cancelled));
    assert!(matches!(rendezvous.next_frame().await, Advance::Cancelled));
}

#[test]
fn host_process_drives_the_consumer_side() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap();
    let rendezvous = rendezvous(500);
    let (actions, executed) = flume::unbounded();
    let bridge = NativeBridge::new(rendezvous.clone(), Arc::new(actions), runtime.handle().clone());

    let results = rendezvous.results().clone();
    let submitter = runtime.spawn(async move {
        let frame = Frame::from_pixels(2, 1, PixelFormat::Rgb24, vec![1, 2, 3, 4, 5, 6]).unwrap();
        results.submit(frame).await
    });

    assert_eq!(bridge.move_next_frame(), 0);
    assert_eq!(bridge.get_metadata(), (2, 1));
    let mut pixels = vec![0; 6];
    assert_eq!(bridge.get_frame(&mut pixels), Ok(6));
    assert_eq!(pixels, vec![1, 2, 3, 4, 5, 6]);

    bridge.execute("accept");
    assert!(bridge.push_result("good part"));

    assert_eq!(runtime.block_on(submitter).unwrap(), Ok("good part".to_string()));
    assert_eq!(executed.recv().unwrap(), "accept");
}
