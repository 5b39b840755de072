mod common;

use bridge::{Action, BridgeError, Command, FunctionId, ProtocolViolation, Session};
use common::{ManualPeer, PeerOptions, SimulatedPeer, fast_poll, open, sample_params};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tempfile::tempdir;

fn connect(path: &Path) -> Session {
    let cancel = Arc::new(AtomicBool::new(false));
    let segment = open(path, &cancel);
    Session::builder(sample_params())
        .poll(fast_poll())
        .cancel(cancel)
        .establish(segment)
        .unwrap()
}

#[test]
fn test_call_waits_for_peer_to_clear_slot() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("call.shm");
    let peer = SimulatedPeer::spawn(
        &path,
        PeerOptions {
            function_delay: Duration::from_millis(30),
            ..PeerOptions::default()
        },
    );
    let mut session = connect(&path);

    let start = Instant::now();
    session
        .call(
            Command::RotatePlayerTo {
                x: 0.0,
                y: 90.0,
                z: 0.0,
            },
            true,
        )
        .unwrap();

    // Returning means the peer already zeroed the function id.
    assert!(start.elapsed() >= Duration::from_millis(30));
    assert_eq!(session.pending_call().unwrap(), None);

    drop(session);
    let report = peer.finish();
    assert_eq!(report.calls, vec![(4, [0.0, 90.0, 0.0])]);
}

/// Moving the player with `wait` chains a chunk rebuild, as the simulator
/// expects before the next render.
#[test]
fn test_move_player_rebuilds_chunks() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("move.shm");
    let peer = SimulatedPeer::spawn(&path, PeerOptions::default());
    let mut session = connect(&path);

    session.move_player(10.0, 1.5, -2.0, true).unwrap();

    let pose = session.pose().unwrap();
    assert_eq!(pose.position(), [10.0, 1.5, -2.0]);

    drop(session);
    let report = peer.finish();
    let ids: Vec<u32> = report.calls.iter().map(|(id, _)| *id).collect();
    assert_eq!(
        ids,
        vec![
            FunctionId::MovePlayerTo.as_u32(),
            FunctionId::RebuildChunks.as_u32()
        ]
    );
    assert_eq!(report.calls[0].1, [10.0, 1.5, -2.0]);
}

/// A second call while one is outstanding is rejected, and nothing of the
/// second call reaches the segment.
#[test]
fn test_outstanding_call_rejects_new_call() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("busy.shm");
    let peer = SimulatedPeer::spawn(
        &path,
        PeerOptions {
            complete_functions: false,
            ..PeerOptions::default()
        },
    );
    let mut session = connect(&path);

    session.promote_chunk(7, false).unwrap();
    assert_eq!(
        session.pending_call().unwrap(),
        Some(FunctionId::PromoteChunk)
    );

    let err = session.rotate_player(1.0, 2.0, 3.0, false).unwrap_err();
    match err {
        BridgeError::ProtocolViolation(ProtocolViolation::CallOutstanding {
            pending,
            requested,
        }) => {
            assert_eq!(pending, 6);
            assert_eq!(requested, FunctionId::RotatePlayerTo);
        }
        other => panic!("Expected CallOutstanding, got {:?}", other),
    }

    // Give the peer time to notice any overwrite.
    std::thread::sleep(Duration::from_millis(20));
    drop(session);
    let report = peer.finish();
    assert_eq!(report.calls, vec![(6, [7.0, 0.0, 0.0])]);
}

#[test]
fn test_step_sequences_are_gapless_from_one() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("steps.shm");
    let peer = SimulatedPeer::spawn(&path, PeerOptions::default());
    let mut session = connect(&path);

    let start_index = session.update_index().unwrap();
    let mut last = start_index;
    for i in 0..5 {
        let index = session.step(Action::new(1, 0, 0, 0)).unwrap();
        assert_ne!(index, last, "step {} returned before a tick", i);
        last = index;
    }

    assert_eq!(session.next_sequence(), 6);
    assert_eq!(last.wrapping_sub(start_index), 5);

    drop(session);
    let report = peer.finish();
    assert_eq!(report.sequences, vec![1, 2, 3, 4, 5]);
    assert_eq!(report.last_controls, [1, 0, 0, 0]);
}

#[test]
fn test_blank_ticks_and_telemetry_read_back() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ticks.shm");
    let peer = SimulatedPeer::spawn(&path, PeerOptions::default());
    let mut session = connect(&path);

    session.run_blank_ticks(3).unwrap();
    session.step(Action::new(0, 0, 0, 1)).unwrap();

    let header = session.global_header().unwrap();
    assert_eq!(header.camera_count, 2);
    assert_eq!(header.update_index, 4);
    assert_eq!(header.active_collisions().collect::<Vec<_>>(), vec![3]);
    assert_eq!(session.collisions().unwrap()[3], 1);
    assert_eq!(session.peer_log().unwrap(), "peer online");

    drop(session);
    let report = peer.finish();
    assert_eq!(report.sequences, vec![1, 2, 3, 4]);
    assert_eq!(report.last_controls, [0, 0, 0, 1]);
}

#[test]
fn test_cancellation_abandons_completion_wait() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cancel.shm");
    let _peer = SimulatedPeer::spawn(
        &path,
        PeerOptions {
            complete_functions: false,
            ..PeerOptions::default()
        },
    );
    let mut session = connect(&path);

    let flag = session.cancel_flag();
    let canceller = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(30));
        flag.store(true, Ordering::Relaxed);
    });

    let err = session.force_camera_read().unwrap_err();
    canceller.join().unwrap();

    assert!(matches!(err, BridgeError::Cancelled));
    // Abandoning the wait leaves the peer's slot alone.
    assert_eq!(
        session.pending_call().unwrap(),
        Some(FunctionId::ForceCameraRead)
    );
}

#[test]
fn test_dead_peer_ends_step_wait() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("gone.shm");
    let _peer = SimulatedPeer::spawn(
        &path,
        PeerOptions {
            tick_on_action: false,
            ..PeerOptions::default()
        },
    );
    let mut session = connect(&path);

    let liveness = Arc::new(ManualPeer::default());
    session.attach_peer(liveness.clone());
    liveness.kill();

    let err = session.step(Action::BLANK).unwrap_err();
    assert!(matches!(err, BridgeError::PeerGone));
    assert_eq!(session.next_sequence(), 2, "the action itself was written");
}

#[test]
fn test_close_is_idempotent() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("close.shm");
    let _peer = SimulatedPeer::spawn(&path, PeerOptions::default());
    let mut session = connect(&path);

    session.close();
    session.close();

    assert!(session.is_closed());
    assert!(matches!(session.update_index(), Err(BridgeError::Closed)));
    assert!(matches!(
        session.call(Command::RebuildChunks, false),
        Err(BridgeError::Closed)
    ));
    assert!(session.frame(bridge::CameraRole::Color).is_none());
    assert_eq!(session.frames().count(), 0);
}
