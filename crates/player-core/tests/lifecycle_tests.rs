//! Integration tests for session lifecycle.
//!
//! Covers start, stop, the stop/start reset, repeated starts and
//! cancellation of in-flight connects.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use player_core::errors::PlayerError;
use player_core::layer::VideoLayer;
use player_core::types::{Canvas, SessionState, ViewMode};
use player_test_utils::*;

#[tokio::test(start_paused = true)]
async fn test_start_reaches_playing() {
    let player = TestPlayer::new(ConnectBehavior::accept());
    let mut recorder = player.recorder();

    player
        .manager
        .start_playing_stream(STREAM_A, Some(Canvas::new("view-1")), None)
        .await
        .unwrap();
    recorder.wait_for(STREAM_A, SessionState::Playing).await;

    assert_eq!(
        recorder.states(STREAM_A),
        vec![SessionState::Connecting, SessionState::Playing]
    );
    match player.pipeline.last_connect(STREAM_A).unwrap() {
        PipelineCommand::Connect {
            attempt,
            volume,
            canvas,
            ..
        } => {
            assert_eq!(attempt, 0);
            assert_eq!(volume, 100);
            assert_eq!(canvas, Some(Canvas::new("view-1")));
        }
        other => panic!("unexpected command {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_stop_then_start_resets_session_settings() {
    let player = TestPlayer::new(ConnectBehavior::accept());
    let mut recorder = player.recorder();
    let manager = &player.manager;

    manager
        .set_play_stream_decryption_key(STREAM_A, test_key(16))
        .await
        .unwrap();
    manager.start_playing_stream(STREAM_A, None, None).await.unwrap();
    recorder.wait_for(STREAM_A, SessionState::Playing).await;

    manager.set_play_volume(Some(STREAM_A), 150).await.unwrap();
    manager.mute_play_stream_audio(STREAM_A, true).await.unwrap();
    manager.mute_play_stream_video(STREAM_A, true).await.unwrap();
    manager
        .set_play_stream_video_layer(STREAM_A, VideoLayer::Standard)
        .await
        .unwrap();

    manager.stop_playing_stream(STREAM_A).await.unwrap();
    recorder.wait_for(STREAM_A, SessionState::Stopped).await;

    manager.start_playing_stream(STREAM_A, None, None).await.unwrap();
    recorder.wait_for(STREAM_A, SessionState::Playing).await;

    let info = manager.session_info(STREAM_A).await.unwrap();
    assert_eq!(info.volume, 100);
    assert!(!info.audio_muted);
    assert!(!info.video_muted);
    assert_eq!(info.requested_layer, VideoLayer::Auto);
    assert_eq!(info.key_version, 0);

    match player.pipeline.last_connect(STREAM_A).unwrap() {
        PipelineCommand::Connect {
            volume,
            audio_muted,
            video_muted,
            layer,
            key_len,
            ..
        } => {
            assert_eq!(volume, 100);
            assert!(!audio_muted);
            assert!(!video_muted);
            assert_eq!(layer, VideoLayer::Auto);
            assert_eq!(key_len, None);
        }
        other => panic!("unexpected command {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_stop_without_session_discards_pending_preferences() {
    let player = TestPlayer::new(ConnectBehavior::accept());
    let mut recorder = player.recorder();
    let manager = &player.manager;

    manager.mute_play_stream_audio(STREAM_A, true).await.unwrap();
    manager
        .set_play_stream_video_layer(STREAM_A, VideoLayer::Base)
        .await
        .unwrap();
    assert_eq!(manager.status().await.unwrap().pending_preferences, 1);

    manager.stop_playing_stream(STREAM_A).await.unwrap();
    assert_eq!(manager.status().await.unwrap().pending_preferences, 0);

    manager.start_playing_stream(STREAM_A, None, None).await.unwrap();
    recorder.wait_for(STREAM_A, SessionState::Playing).await;

    let info = manager.session_info(STREAM_A).await.unwrap();
    assert!(!info.audio_muted);
    assert_eq!(info.requested_layer, VideoLayer::Auto);
    match player.pipeline.last_connect(STREAM_A).unwrap() {
        PipelineCommand::Connect {
            audio_muted, layer, ..
        } => {
            assert!(!audio_muted);
            assert_eq!(layer, VideoLayer::Auto);
        }
        other => panic!("unexpected command {other:?}"),
    }

    // Preferences for streams that never start do not accumulate
    for _ in 0..50 {
        let id = random_stream_id();
        manager.mute_play_stream_video(&id, true).await.unwrap();
        manager.stop_playing_stream(&id).await.unwrap();
    }
    assert_eq!(manager.status().await.unwrap().pending_preferences, 0);
}

#[tokio::test(start_paused = true)]
async fn test_stop_twice_is_noop() {
    let player = TestPlayer::new(ConnectBehavior::accept());
    let mut recorder = player.recorder();

    player.manager.start_playing_stream(STREAM_A, None, None).await.unwrap();
    recorder.wait_for(STREAM_A, SessionState::Playing).await;

    player.manager.stop_playing_stream(STREAM_A).await.unwrap();
    player.manager.stop_playing_stream(STREAM_A).await.unwrap();
    player.manager.stop_playing_stream(UNKNOWN_STREAM).await.unwrap();

    recorder.drain();
    let stopped = recorder
        .states(STREAM_A)
        .into_iter()
        .filter(|s| *s == SessionState::Stopped)
        .count();
    assert_eq!(stopped, 1);
    assert!(recorder.states(UNKNOWN_STREAM).is_empty());

    let disconnects = player
        .pipeline
        .commands_for(STREAM_A)
        .into_iter()
        .filter(|c| matches!(c, PipelineCommand::Disconnect(_)))
        .count();
    assert_eq!(disconnects, 1);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_start_rebinds_canvas_without_reconnecting() {
    let player = TestPlayer::new(ConnectBehavior::accept());
    let mut recorder = player.recorder();
    let manager = &player.manager;

    manager
        .start_playing_stream(STREAM_A, Some(Canvas::new("view-1")), None)
        .await
        .unwrap();
    recorder.wait_for(STREAM_A, SessionState::Playing).await;
    manager.set_play_volume(Some(STREAM_A), 60).await.unwrap();

    let canvas = Canvas::new("view-2").with_view_mode(ViewMode::AspectFill);
    manager
        .start_playing_stream(STREAM_A, Some(canvas.clone()), None)
        .await
        .unwrap();

    assert_eq!(player.pipeline.connect_count(), 1);
    assert!(player.pipeline.commands_for(STREAM_A).contains(
        &PipelineCommand::RebindCanvas {
            stream_id: common::types::StreamId::parse(STREAM_A).unwrap(),
            canvas: Some(canvas.clone()),
        }
    ));

    let info = manager.session_info(STREAM_A).await.unwrap();
    assert_eq!(info.state, SessionState::Playing);
    assert_eq!(info.volume, 60);
    assert_eq!(info.canvas, Some(canvas));
    assert_eq!(
        recorder.drain().iter().filter(|u| u.state == SessionState::Connecting).count(),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_stop_while_connecting_cancels_attempt() {
    let player = TestPlayer::new(ConnectBehavior::Silent);
    let mut recorder = player.recorder();

    player.manager.start_playing_stream(STREAM_A, None, None).await.unwrap();
    recorder.wait_for(STREAM_A, SessionState::Connecting).await;

    player.manager.stop_playing_stream(STREAM_A).await.unwrap();
    recorder.wait_for(STREAM_A, SessionState::Stopped).await;

    // No timer survives the session
    tokio::time::sleep(std::time::Duration::from_secs(120)).await;
    assert_eq!(player.pipeline.connect_count(), 1);
    recorder.drain();
    assert_eq!(
        recorder.states(STREAM_A),
        vec![SessionState::Connecting, SessionState::Stopped]
    );
}

#[tokio::test(start_paused = true)]
async fn test_stop_while_reconnecting_cancels_retries() {
    let player = TestPlayer::new(ConnectBehavior::fail("refused"));
    let mut recorder = player.recorder();

    player.manager.start_playing_stream(STREAM_A, None, None).await.unwrap();
    recorder.wait_for(STREAM_A, SessionState::Reconnecting).await;

    player.manager.stop_playing_stream(STREAM_A).await.unwrap();
    let attempts = player.pipeline.connect_count();

    tokio::time::sleep(std::time::Duration::from_secs(600)).await;
    assert_eq!(player.pipeline.connect_count(), attempts);
}

#[tokio::test]
async fn test_invalid_stream_ids_rejected_without_state_change() {
    let player = TestPlayer::new(ConnectBehavior::accept());
    let manager = &player.manager;
    let too_long = "a".repeat(257);

    for bad in ["", "has space", "slash/id", too_long.as_str()] {
        let err = manager.start_playing_stream(bad, None, None).await.unwrap_err();
        assert!(matches!(err, PlayerError::InvalidStreamId(_)), "{bad:?}");
        assert!(err.is_validation());
    }
    assert!(matches!(
        manager.stop_playing_stream("bad id").await,
        Err(PlayerError::InvalidStreamId(_))
    ));

    assert_eq!(manager.status().await.unwrap().session_count, 0);
    assert_eq!(player.pipeline.connect_count(), 0);
}
