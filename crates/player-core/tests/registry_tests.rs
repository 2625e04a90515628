//! Integration tests for the session registry.
//!
//! Concurrent access, capacity, Room Service notifications, logout and
//! shutdown.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use player_core::errors::PlayerError;
use player_core::pipeline::PipelineEventKind;
use player_core::types::SessionState;
use player_test_utils::*;
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::Instant;

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_starts_of_distinct_streams() {
    let player = TestPlayer::new(ConnectBehavior::accept());
    let ids: Vec<String> = (0..32).map(|_| random_stream_id()).collect();

    let tasks: Vec<_> = ids
        .iter()
        .cloned()
        .map(|id| {
            let manager = player.manager.clone();
            tokio::spawn(async move { manager.start_playing_stream(&id, None, None).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(player.manager.status().await.unwrap().session_count, ids.len());
    for id in &ids {
        let info = player.manager.session_info(id).await.unwrap();
        assert_eq!(info.stream_id.as_str(), id);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_starts_of_same_stream_create_one_session() {
    let player = TestPlayer::new(ConnectBehavior::accept());

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let manager = player.manager.clone();
            tokio::spawn(async move { manager.start_playing_stream(STREAM_A, None, None).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(player.manager.status().await.unwrap().session_count, 1);
    assert_eq!(player.pipeline.connect_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_start_stop_keeps_registry_consistent() {
    let player = TestPlayer::new(ConnectBehavior::accept());
    let ids: Vec<String> = (0..8).map(|i| format!("stream-{i}")).collect();

    let mut tasks = Vec::new();
    for round in 0..10 {
        for id in &ids {
            let manager = player.manager.clone();
            let id = id.clone();
            tasks.push(tokio::spawn(async move {
                if round % 2 == 0 {
                    manager.start_playing_stream(&id, None, None).await
                } else {
                    manager.stop_playing_stream(&id).await
                }
            }));
        }
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    // Every registered session is reachable and nothing else is
    let status = player.manager.status().await.unwrap();
    let mut live = HashSet::new();
    for id in &ids {
        if player.manager.session_info(id).await.is_ok() {
            live.insert(id.clone());
        }
    }
    assert_eq!(status.session_count, live.len());

    for id in &ids {
        player.manager.stop_playing_stream(id).await.unwrap();
    }
    assert_eq!(player.manager.status().await.unwrap().session_count, 0);
}

// ============================================================================
// Capacity
// ============================================================================

#[tokio::test]
async fn test_capacity_exceeded_leaves_registry_unchanged() {
    let config = player_core::config::Config {
        max_sessions: 2,
        ..deterministic_config()
    };
    let player = TestPlayer::with_config(config, ConnectBehavior::accept(), Vec::new());

    player.manager.start_playing_stream(STREAM_A, None, None).await.unwrap();
    player.manager.start_playing_stream(STREAM_B, None, None).await.unwrap();
    let err = player
        .manager
        .start_playing_stream(UNKNOWN_STREAM, None, None)
        .await
        .unwrap_err();

    assert!(matches!(err, PlayerError::CapacityExceeded { limit: 2 }));
    assert!(err.is_validation());
    assert_eq!(player.manager.status().await.unwrap().session_count, 2);

    player.manager.stop_playing_stream(STREAM_A).await.unwrap();
    player
        .manager
        .start_playing_stream(UNKNOWN_STREAM, None, None)
        .await
        .unwrap();
}

// ============================================================================
// Room Service notifications
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_stream_removed_interrupts_and_stream_added_retries_now() {
    let player = TestPlayer::new(ConnectBehavior::accept());
    let mut recorder = player.recorder();
    let manager = &player.manager;

    manager.start_playing_stream(STREAM_A, None, None).await.unwrap();
    recorder.wait_for(STREAM_A, SessionState::Playing).await;

    manager.stream_removed(STREAM_A).await.unwrap();
    recorder.wait_for(STREAM_A, SessionState::Interrupted).await;
    recorder.wait_for(STREAM_A, SessionState::Reconnecting).await;

    let before = Instant::now();
    manager.stream_added(STREAM_A).await.unwrap();
    recorder.wait_for(STREAM_A, SessionState::Playing).await;
    assert!(Instant::now() - before < Duration::from_secs(1));
    assert_eq!(player.pipeline.connect_count(), 2);
}

#[tokio::test]
async fn test_notifications_for_unknown_streams_ignored() {
    let player = TestPlayer::new(ConnectBehavior::accept());

    player.manager.stream_added(UNKNOWN_STREAM).await.unwrap();
    player.manager.stream_removed(UNKNOWN_STREAM).await.unwrap();

    assert_eq!(player.manager.status().await.unwrap().session_count, 0);
    assert_eq!(player.pipeline.connect_count(), 0);
}

// ============================================================================
// Logout & shutdown
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_logout_stops_everything_and_clears_keys() {
    let player = TestPlayer::new(ConnectBehavior::accept());
    let mut recorder = player.recorder();
    let manager = &player.manager;

    manager
        .set_play_stream_decryption_key(STREAM_A, test_key(16))
        .await
        .unwrap();
    manager.mute_play_stream_audio(UNKNOWN_STREAM, true).await.unwrap();
    manager.start_playing_stream(STREAM_A, None, None).await.unwrap();
    manager.start_playing_stream(STREAM_B, None, None).await.unwrap();

    manager.logout().await.unwrap();
    recorder.wait_for(STREAM_A, SessionState::Stopped).await;
    recorder.wait_for(STREAM_B, SessionState::Stopped).await;

    let status = manager.status().await.unwrap();
    assert_eq!(status.session_count, 0);
    assert_eq!(status.pending_preferences, 0);

    manager.start_playing_stream(STREAM_A, None, None).await.unwrap();
    assert_eq!(manager.session_info(STREAM_A).await.unwrap().key_version, 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_rejects_new_sessions() {
    let player = TestPlayer::new(ConnectBehavior::accept());
    let mut recorder = player.recorder();

    player.manager.start_playing_stream(STREAM_A, None, None).await.unwrap();
    player.manager.shutdown(Duration::from_secs(5)).await.unwrap();
    recorder.wait_for(STREAM_A, SessionState::Stopped).await;

    assert!(player.manager.is_cancelled());
    assert!(matches!(
        player.manager.start_playing_stream(STREAM_B, None, None).await,
        Err(PlayerError::ShuttingDown)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_requests_after_shutdown_report_shutting_down() {
    let player = TestPlayer::new(ConnectBehavior::accept());
    let manager = &player.manager;

    manager.shutdown(Duration::from_secs(5)).await.unwrap();

    let err = manager
        .set_play_stream_decryption_key(STREAM_A, test_key(16))
        .await
        .unwrap_err();
    assert!(matches!(err, PlayerError::ShuttingDown), "got {err:?}");
    assert!(matches!(
        manager.mute_play_stream_audio(STREAM_A, true).await,
        Err(PlayerError::ShuttingDown)
    ));
    assert!(matches!(
        manager.stream_added(STREAM_A).await,
        Err(PlayerError::ShuttingDown)
    ));
    assert!(matches!(
        manager.status().await,
        Err(PlayerError::ShuttingDown)
    ));
    assert!(player
        .pipeline
        .commands()
        .iter()
        .all(|c| !matches!(c, PipelineCommand::SetKey { .. })));

    // A second shutdown is a no-op
    manager.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_busy_session_does_not_stall_registry() {
    let player = TestPlayer::new(ConnectBehavior::accept());
    let mut recorder = player.recorder();

    player.manager.start_playing_stream(STREAM_A, None, None).await.unwrap();
    recorder.wait_for(STREAM_A, SessionState::Playing).await;

    // Session A parks inside a pipeline call and stops draining its mailbox
    player.pipeline.set_command_delay(Duration::from_secs(3600));
    let manager = player.manager.clone();
    let parked =
        tokio::spawn(async move { manager.set_play_volume(Some(STREAM_A), 50).await });
    while !player
        .pipeline
        .commands_for(STREAM_A)
        .iter()
        .any(|c| matches!(c, PipelineCommand::SetVolume { .. }))
    {
        tokio::task::yield_now().await;
    }

    let flood = async {
        for _ in 0..2000 {
            player
                .pipeline
                .emit(STREAM_A, PipelineEventKind::FrameDecoded)
                .await;
        }
        player.manager.start_playing_stream(STREAM_B, None, None).await.unwrap();
        recorder.wait_for(STREAM_B, SessionState::Playing).await;
    };
    tokio::time::timeout(Duration::from_secs(10), flood)
        .await
        .expect("registry stalled behind a full session mailbox");

    let status = player.manager.status().await.unwrap();
    assert_eq!(status.session_count, 2);
    assert!(status.events_dropped > 0);

    parked.abort();
}
