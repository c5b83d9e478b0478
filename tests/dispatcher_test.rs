//! Integration tests for per-stream decoding and routing.

mod common;

use assert_matches::assert_matches;
use bytes::Bytes;
use common::*;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use warp_player::config::ProtocolConfig;
use warp_player::dispatcher::Dispatcher;
use warp_player::{Error, InitId, InitRegistry, RecvStream, TrackBuffer, TrackKind};

struct Fixture {
    sink: Arc<MockSink>,
    registry: Arc<InitRegistry>,
    video: Arc<TrackBuffer>,
    dispatcher: Dispatcher,
    cancel: CancellationToken,
}

fn fixture() -> Fixture {
    let sink = MockSink::new();
    let registry = Arc::new(InitRegistry::new());
    let audio = Arc::new(TrackBuffer::new(TrackKind::Audio, sink.clone()));
    let video = Arc::new(TrackBuffer::new(TrackKind::Video, sink.clone()));
    let cancel = CancellationToken::new();
    let dispatcher = Dispatcher::new(
        registry.clone(),
        audio,
        video.clone(),
        ProtocolConfig::default(),
        cancel.clone(),
    );

    Fixture {
        sink,
        registry,
        video,
        dispatcher,
        cancel,
    }
}

fn two_fragment_segment() -> Vec<u8> {
    let (moof1, mdat1) = video_fragment(1, 0, &[frame(true, 1, 100), frame(false, 2, 50)]);
    let (moof2, mdat2) = video_fragment(2, 80, &[frame(false, 3, 70), frame(false, 4, 30)]);
    segment_stream(2, 0, &[moof1, mdat1, moof2, mdat2])
}

// ---------------------------------------------------------------------------
// Single streams
// ---------------------------------------------------------------------------

#[tokio::test]
async fn init_then_segment() {
    let f = fixture();

    f.dispatcher
        .handle_stream(stream(init_stream(2, &video_init())))
        .await
        .unwrap();
    assert!(f.registry.get(InitId(2)).unwrap().get().is_some());

    f.dispatcher
        .handle_stream(stream(two_fragment_segment()))
        .await
        .unwrap();

    assert_eq!(f.sink.initializations(), vec![TrackKind::Video]);
    assert_eq!(
        f.sink.appended(TrackKind::Video),
        vec![0.0, 0.04, 0.08, 0.12]
    );
    assert!(f.sink.appended(TrackKind::Audio).is_empty());
}

#[tokio::test]
async fn audio_init_routes_to_audio_track() {
    let f = fixture();

    f.dispatcher
        .handle_stream(stream(init_stream(1, &audio_init())))
        .await
        .unwrap();

    let (moof, mdat) = audio_fragment(1, 0, &[frame(true, 5, 16)]);
    f.dispatcher
        .handle_stream(stream(segment_stream(1, 0, &[moof, mdat])))
        .await
        .unwrap();

    assert_eq!(f.sink.appended(TrackKind::Audio).len(), 1);
    assert!(f.sink.appended(TrackKind::Video).is_empty());
}

#[tokio::test]
async fn empty_stream_is_ignored() {
    let f = fixture();
    f.dispatcher.handle_stream(stream(Vec::new())).await.unwrap();
    assert!(f.registry.is_empty());
}

#[tokio::test]
async fn atoms_split_across_reads_are_reassembled() {
    let data = two_fragment_segment();
    let mut runs: Vec<Vec<Bytes>> = Vec::new();

    let read_sizes: [&[usize]; 5] = [&[usize::MAX], &[1], &[3, 7], &[13, 1, 64], &[4096]];
    for sizes in read_sizes {
        let f = fixture();
        f.dispatcher
            .handle_stream(chunked(&init_stream(2, &video_init()), &[5, 11]))
            .await
            .unwrap();
        f.dispatcher
            .handle_stream(chunked(&data, sizes))
            .await
            .unwrap();

        let payloads = f.sink.payloads(TrackKind::Video);
        assert_eq!(payloads.len(), 4, "read sizes {:?}", sizes);
        runs.push(payloads);
    }

    assert!(runs.iter().all(|run| run == &runs[0]));
    assert_eq!(&runs[0][0][..], &[1u8; 100][..]);
    assert_eq!(&runs[0][3][..], &[4u8; 30][..]);
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn truncated_atom_is_framing_error() {
    let f = fixture();
    f.dispatcher
        .handle_stream(stream(init_stream(2, &video_init())))
        .await
        .unwrap();

    let mut data = two_fragment_segment();
    data.truncate(data.len() - 10);

    assert_matches!(
        f.dispatcher.handle_stream(stream(data)).await,
        Err(Error::Framing(_))
    );

    // The first fragment still made it, and the segment was finished so the
    // track is not stuck.
    assert_eq!(f.sink.appended(TrackKind::Video), vec![0.0, 0.04]);
    assert_eq!(f.video.segment_count(), 0);
}

#[tokio::test]
async fn bad_frame_is_framing_error() {
    let f = fixture();
    let mut data = init_stream(2, &video_init());
    data[4..8].copy_from_slice(b"nope");

    assert_matches!(
        f.dispatcher.handle_stream(stream(data)).await,
        Err(Error::Framing(_))
    );
    assert!(f.registry.is_empty());
}

#[tokio::test]
async fn incomplete_init_fails_waiting_segments() {
    let f = fixture();

    let waiting = {
        let dispatcher = f.dispatcher.clone();
        tokio::spawn(async move {
            dispatcher
                .handle_stream(stream(two_fragment_segment()))
                .await
        })
    };
    tokio::task::yield_now().await;

    let init = video_init();
    assert_matches!(
        f.dispatcher
            .handle_stream(stream(init_stream(2, &init[..init.len() / 2])))
            .await,
        Err(Error::Framing(_))
    );

    assert_matches!(waiting.await.unwrap(), Err(Error::Parse(_)));
    assert!(f.sink.appended(TrackKind::Video).is_empty());
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[tokio::test]
async fn segment_before_init_waits_for_it() {
    let f = fixture();
    let (tx, rx) = mpsc::channel::<RecvStream>(8);

    let run = {
        let dispatcher = f.dispatcher.clone();
        tokio::spawn(async move { dispatcher.run(rx).await })
    };

    tx.send(stream(two_fragment_segment())).await.unwrap();
    tokio::task::yield_now().await;
    tx.send(chunked(&init_stream(2, &video_init()), &[17])).await.unwrap();
    drop(tx);

    run.await.unwrap().unwrap();

    // Both references resolved to the same assembler.
    assert_eq!(f.registry.len(), 1);
    assert_eq!(f.sink.appended(TrackKind::Video).len(), 4);
}

#[tokio::test]
async fn failed_stream_does_not_affect_others() {
    let f = fixture();
    let (tx, rx) = mpsc::channel::<RecvStream>(8);

    let run = {
        let dispatcher = f.dispatcher.clone();
        tokio::spawn(async move { dispatcher.run(rx).await })
    };

    let mut garbage = init_stream(9, &video_init());
    garbage[..4].copy_from_slice(&3u32.to_be_bytes());

    tx.send(stream(garbage)).await.unwrap();
    tx.send(stream(init_stream(2, &video_init()))).await.unwrap();
    tx.send(stream(two_fragment_segment())).await.unwrap();
    drop(tx);

    run.await.unwrap().unwrap();
    assert_eq!(f.sink.appended(TrackKind::Video).len(), 4);
}

#[tokio::test]
async fn interleaved_segments_flush_in_arrival_order() {
    let f = fixture();
    f.dispatcher
        .handle_stream(stream(init_stream(2, &video_init())))
        .await
        .unwrap();

    let (moof1, mdat1) = video_fragment(1, 0, &[frame(true, 1, 64)]);
    let (moof2, mdat2) = video_fragment(2, 40, &[frame(true, 2, 64)]);
    let split = mdat1.len();
    let first = segment_stream(2, 0, &[moof1, mdat1]);
    let second = segment_stream(2, 40, &[moof2, mdat2]);

    // The first segment is registered, but its mdat is held back.
    let (mut writer, reader) = tokio::io::duplex(64 * 1024);
    let first_task = {
        let dispatcher = f.dispatcher.clone();
        tokio::spawn(async move { dispatcher.handle_stream(reader).await })
    };
    writer
        .write_all(&first[..first.len() - split])
        .await
        .unwrap();
    while f.video.segment_count() == 0 {
        tokio::task::yield_now().await;
    }

    // The second segment arrives in full while the first is still open.
    f.dispatcher.handle_stream(stream(second)).await.unwrap();
    assert!(f.sink.appended(TrackKind::Video).is_empty());

    writer
        .write_all(&first[first.len() - split..])
        .await
        .unwrap();
    drop(writer);
    first_task.await.unwrap().unwrap();

    assert_eq!(f.sink.appended(TrackKind::Video), vec![0.0, 0.04]);
}

#[tokio::test]
async fn segments_queued_before_init_keep_arrival_order() {
    let f = fixture();
    let (tx, rx) = mpsc::channel::<RecvStream>(8);

    let run = {
        let dispatcher = f.dispatcher.clone();
        tokio::spawn(async move { dispatcher.run(rx).await })
    };

    let count = 24u64;
    for n in 0..count {
        let (moof, mdat) = video_fragment(1, n * 40, &[frame(true, n as u8, 8)]);
        tx.send(stream(segment_stream(2, n * 40, &[moof, mdat])))
            .await
            .unwrap();
        tokio::task::yield_now().await;
    }
    tx.send(stream(init_stream(2, &video_init()))).await.unwrap();
    drop(tx);

    run.await.unwrap().unwrap();

    let expected: Vec<f64> = (0..count).map(|n| (n * 40) as f64 / 1000.0).collect();
    assert_eq!(f.sink.appended(TrackKind::Video), expected);
    assert_eq!(f.sink.initializations(), vec![TrackKind::Video]);
}

#[tokio::test]
async fn sink_failure_stays_out_of_other_streams() {
    let f = fixture();
    f.dispatcher
        .handle_stream(stream(init_stream(2, &video_init())))
        .await
        .unwrap();

    // The first segment completes while the sink is refusing appends.
    f.sink.set_accepting(false);
    let (moof, mdat) = video_fragment(1, 0, &[frame(true, 1, 16)]);
    f.dispatcher
        .handle_stream(stream(segment_stream(2, 0, &[moof, mdat])))
        .await
        .unwrap();
    assert_eq!(f.video.pending_len(), 1);

    // Its leftover sample fails during the second stream's flush.
    f.sink.set_accepting(true);
    f.sink.reject_append_at(0.0);
    let (moof, mdat) = video_fragment(2, 40, &[frame(true, 2, 16), frame(false, 3, 16)]);
    f.dispatcher
        .handle_stream(stream(segment_stream(2, 40, &[moof, mdat])))
        .await
        .unwrap();

    assert_eq!(f.sink.appended(TrackKind::Video), vec![0.04, 0.08]);
    assert_eq!(f.video.pending_len(), 0);
}

#[tokio::test]
async fn cancellation_stops_waiting_streams() {
    let f = fixture();
    let (tx, rx) = mpsc::channel::<RecvStream>(8);

    let run = {
        let dispatcher = f.dispatcher.clone();
        tokio::spawn(async move { dispatcher.run(rx).await })
    };

    // Waits forever for init 2.
    tx.send(stream(two_fragment_segment())).await.unwrap();
    tokio::task::yield_now().await;

    f.dispatcher.shutdown();
    f.registry.close();
    run.await.unwrap().unwrap();

    assert!(f.cancel.is_cancelled());
    assert!(f.sink.appended(TrackKind::Video).is_empty());
}
