//! Integration tests for the scrim-room lobby service
//!
//! These tests drive the public API end to end:
//! - Complete lobby and match lifecycles with rating settlement
//! - Concurrent requests racing for the same lobby slot
//! - Close, kick and confirm rules
//! - Team balancing ties
//! - Chat commands through the gateway handler

mod fixtures;

use fixtures::{create_test_system, equal_players, rated_player, user};
use futures::future::join_all;
use rand::rngs::StdRng;
use rand::SeedableRng;
use scrim_room::amqp::{CommandHandler, InboundCommand, MessageHandler};
use scrim_room::balance::Balancer;
use scrim_room::error::as_matchmaking_error;
use scrim_room::lobby::{CloseReason, LeaveOutcome, Location};
use scrim_room::rating::TrueSkillModel;
use scrim_room::types::{MatchFormat, Outcome, PlayerRating};
use scrim_room::MatchmakingError;
use std::collections::HashSet;
use std::sync::Arc;

fn error_kind(error: &anyhow::Error) -> &MatchmakingError {
    match as_matchmaking_error(error) {
        Some(error) => error,
        None => panic!("unexpected error: {:#}", error),
    }
}

#[tokio::test]
async fn test_complete_two_team_lifecycle() {
    let system = create_test_system().await;
    let coordinator = &system.coordinator;

    // Step 1: open a 2v2 lobby and fill it
    let lobby = coordinator.create_lobby(&user("a"), "2v2").await.unwrap();
    assert_eq!(lobby.id, 1);
    for id in ["b", "c", "d"] {
        coordinator.join_lobby(&user(id)).await.unwrap();
    }

    // Step 2: start it
    let started = coordinator.start_lobby(&user("a")).await.unwrap();
    assert_eq!(started.lobby.close_reason, Some(CloseReason::Started));
    assert_eq!(started.game.partition.team_count(), 2);
    for team in started.game.partition.teams() {
        assert_eq!(team.players.len(), 2);
    }

    // Step 3: players are locked into the match until it is confirmed
    assert!(matches!(
        coordinator.locate(&user("c")).await.unwrap(),
        Location::InMatch(_)
    ));
    coordinator.create_lobby(&user("e"), "1v1").await.unwrap();
    let error = coordinator.join_lobby(&user("b")).await.unwrap_err();
    assert!(matches!(
        error_kind(&error),
        MatchmakingError::PlayerInActiveMatch { match_id: 1, .. }
    ));

    // Step 4: confirm and check settlement
    let winners: Vec<String> = started.game.partition.teams()[0]
        .players
        .iter()
        .map(|p| p.id.clone())
        .collect();
    let confirmed = coordinator
        .confirm_match(&user(&winners[0]), Outcome::Team(0))
        .await
        .unwrap();
    assert_eq!(confirmed.changes.len(), 4);

    for change in &confirmed.changes {
        let (_, scores) = coordinator.player_stats(&change.player_id).await.unwrap();
        assert_eq!(scores.len(), 1);
        let score = &scores[0];
        assert_eq!(score.format_id, "2v2");
        assert_eq!(score.rating, change.new_rating);
        assert!(score.rating.uncertainty < change.old_rating.uncertainty);

        if winners.contains(&change.player_id) {
            assert_eq!((score.win, score.lose, score.draw), (1, 0, 0));
            assert!(change.new_rating.rating > change.old_rating.rating);
        } else {
            assert_eq!((score.win, score.lose, score.draw), (0, 1, 0));
            assert!(change.new_rating.rating < change.old_rating.rating);
        }
    }

    // Step 5: the match is over and players are free again
    let game = coordinator.match_info(1).await.unwrap();
    assert!(!game.is_open());
    assert_eq!(game.outcome, Some(Outcome::Team(0)));
    coordinator.join_lobby(&user("b")).await.unwrap();

    let snapshot = system.store.snapshot().await;
    assert_eq!(snapshot.games, 1);
    assert_eq!(snapshot.open_games, 0);
    assert_eq!(snapshot.open_lobbies, 1);

    let lobby_metrics = system.metrics.lobby();
    assert_eq!(
        lobby_metrics
            .lobbies_created_total
            .with_label_values(&["2v2"])
            .get(),
        1
    );
    assert_eq!(lobby_metrics.players_joined_total.get(), 4);
}

#[tokio::test]
async fn test_next_match_uses_settled_ratings() {
    let system = create_test_system().await;
    let coordinator = &system.coordinator;

    coordinator.create_lobby(&user("a"), "1v1").await.unwrap();
    coordinator.join_lobby(&user("b")).await.unwrap();
    coordinator.start_lobby(&user("a")).await.unwrap();
    let confirmed = coordinator
        .confirm_match(&user("b"), Outcome::Draw)
        .await
        .unwrap();

    let lobby = coordinator.create_lobby(&user("a"), "1v1").await.unwrap();
    let after = confirmed
        .changes
        .iter()
        .find(|change| change.player_id == "a")
        .unwrap();
    assert_eq!(lobby.players[0].rating, after.new_rating);
    assert_eq!(lobby.players[0].games, 1);

    // Ratings are kept per format
    coordinator.close_lobby(&user("a")).await.unwrap();
    let lobby = coordinator.create_lobby(&user("a"), "2v2").await.unwrap();
    assert_eq!(lobby.players[0].rating, PlayerRating::default());
}

#[tokio::test]
async fn test_concurrent_joins_for_last_slot() {
    let system = create_test_system().await;
    let coordinator = system.coordinator.clone();

    coordinator.create_lobby(&user("a"), "2v2").await.unwrap();
    coordinator.join_lobby(&user("b")).await.unwrap();
    coordinator.join_lobby(&user("c")).await.unwrap();

    let attempts = ["d", "e", "f"].into_iter().map(|id| {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.join_lobby(&user(id)).await })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|handle| handle.unwrap())
        .collect();

    let joined = results.iter().filter(|result| result.is_ok()).count();
    assert_eq!(joined, 1);
    for result in results.iter().filter_map(|result| result.as_ref().err()) {
        assert!(matches!(
            error_kind(result),
            MatchmakingError::LobbyFull { current: 4, max: 4 }
        ));
    }

    match coordinator.locate(&user("a")).await.unwrap() {
        Location::InLobby(lobby) => assert_eq!(lobby.population(), 4),
        other => panic!("unexpected location: {:?}", other),
    }
}

#[tokio::test]
async fn test_concurrent_creates_open_one_lobby() {
    let system = create_test_system().await;

    let attempts = ["a", "b", "c", "d"].into_iter().map(|id| {
        let coordinator = system.coordinator.clone();
        tokio::spawn(async move { coordinator.create_lobby(&user(id), "ffa").await })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|handle| handle.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 1);
    assert_eq!(system.store.snapshot().await.open_lobbies, 1);
}

#[tokio::test]
async fn test_close_rules() {
    let system = create_test_system().await;
    let coordinator = &system.coordinator;

    coordinator.create_lobby(&user("a"), "2v2").await.unwrap();
    coordinator.join_lobby(&user("b")).await.unwrap();

    // A regular player can't close a fresh lobby
    let error = coordinator.close_lobby(&user("b")).await.unwrap_err();
    assert!(matches!(
        error_kind(&error),
        MatchmakingError::CloseNotPermitted { .. }
    ));

    // Activity resets the inactivity window
    system.clock.advance(chrono::Duration::seconds(45));
    coordinator.join_lobby(&user("c")).await.unwrap();
    system.clock.advance(chrono::Duration::seconds(45));
    assert!(coordinator.close_lobby(&user("b")).await.is_err());

    // Anyone may close once it has been idle long enough
    system.clock.advance(chrono::Duration::seconds(20));
    let closed = coordinator.close_lobby(&user("b")).await.unwrap();
    assert_eq!(closed.close_reason, Some(CloseReason::Inactive));

    // Moderators can close immediately
    coordinator.create_lobby(&user("a"), "2v2").await.unwrap();
    let closed = coordinator.close_lobby(&user("mod")).await.unwrap();
    assert_eq!(closed.close_reason, Some(CloseReason::ClosedByModerator));

    // The creator leaving closes the lobby
    coordinator.create_lobby(&user("a"), "2v2").await.unwrap();
    coordinator.join_lobby(&user("b")).await.unwrap();
    match coordinator.leave_lobby(&user("a")).await.unwrap() {
        LeaveOutcome::Closed(lobby) => {
            assert_eq!(lobby.close_reason, Some(CloseReason::CreatorLeft))
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    let error = coordinator.join_lobby(&user("c")).await.unwrap_err();
    assert!(matches!(error_kind(&error), MatchmakingError::NoActiveLobby));
}

#[tokio::test]
async fn test_kick_and_disable() {
    let system = create_test_system().await;
    let coordinator = &system.coordinator;

    coordinator.create_lobby(&user("a"), "2v2").await.unwrap();
    coordinator.join_lobby(&user("b")).await.unwrap();

    let error = coordinator.kick_player(&user("c"), "b").await.unwrap_err();
    assert!(matches!(
        error_kind(&error),
        MatchmakingError::PermissionDenied { .. }
    ));
    let error = coordinator.kick_player(&user("mod"), "a").await.unwrap_err();
    assert!(matches!(error_kind(&error), MatchmakingError::CannotKickCreator));

    let lobby = coordinator.kick_player(&user("mod"), "b").await.unwrap();
    assert!(!lobby.contains("b"));

    coordinator.set_disabled(&user("root"), "b", true).await.unwrap();
    let error = coordinator.join_lobby(&user("b")).await.unwrap_err();
    assert!(matches!(
        error_kind(&error),
        MatchmakingError::PlayerDisabled { .. }
    ));

    // Only admins toggle the flag
    let error = coordinator
        .set_disabled(&user("mod"), "b", false)
        .await
        .unwrap_err();
    assert!(matches!(
        error_kind(&error),
        MatchmakingError::PermissionDenied { .. }
    ));

    coordinator.set_disabled(&user("root"), "b", false).await.unwrap();
    coordinator.join_lobby(&user("b")).await.unwrap();
}

#[tokio::test]
async fn test_confirm_rules() {
    let system = create_test_system().await;
    let coordinator = &system.coordinator;

    coordinator.create_lobby(&user("a"), "ffa").await.unwrap();

    // Starting needs a full lobby
    coordinator.join_lobby(&user("b")).await.unwrap();
    coordinator.join_lobby(&user("c")).await.unwrap();
    let error = coordinator.start_lobby(&user("a")).await.unwrap_err();
    assert!(matches!(
        error_kind(&error),
        MatchmakingError::InsufficientPlayers {
            current: 3,
            required: 4
        }
    ));

    coordinator.join_lobby(&user("d")).await.unwrap();
    let started = coordinator.start_lobby(&user("a")).await.unwrap();
    assert_eq!(started.game.partition.team_count(), 4);

    // Outsiders have nothing to confirm
    let error = coordinator
        .confirm_match(&user("z"), Outcome::Draw)
        .await
        .unwrap_err();
    assert!(matches!(
        error_kind(&error),
        MatchmakingError::NotInActiveMatch { .. }
    ));

    // Team numbers are checked against the match
    let error = coordinator
        .confirm_match(&user("b"), Outcome::Team(4))
        .await
        .unwrap_err();
    assert!(matches!(
        error_kind(&error),
        MatchmakingError::InvalidOutcome { .. }
    ));
    assert!(coordinator.match_info(started.game.id).await.unwrap().is_open());

    // First valid report wins
    let confirmed = coordinator
        .confirm_match(&user("c"), Outcome::Team(2))
        .await
        .unwrap();
    assert_eq!(confirmed.game.closed_by.as_deref(), Some("c"));
    let error = coordinator
        .confirm_match(&user("a"), Outcome::Team(0))
        .await
        .unwrap_err();
    assert!(matches!(
        error_kind(&error),
        MatchmakingError::NotInActiveMatch { .. }
    ));

    let (_, scores) = coordinator.player_stats("c").await.unwrap();
    assert_eq!(scores[0].win, 1);
    let (_, scores) = coordinator.player_stats("a").await.unwrap();
    assert_eq!(scores[0].lose, 1);
}

#[tokio::test]
async fn test_storage_outage_leaves_state_untouched() {
    let system = create_test_system().await;
    let coordinator = &system.coordinator;

    coordinator.create_lobby(&user("a"), "1v1").await.unwrap();
    system.store.set_available(false);

    let error = coordinator.join_lobby(&user("b")).await.unwrap_err();
    assert!(matches!(
        error_kind(&error),
        MatchmakingError::StorageUnavailable { .. }
    ));

    system.store.set_available(true);
    match coordinator.locate(&user("b")).await.unwrap() {
        Location::Idle(Some(lobby)) => assert_eq!(lobby.population(), 1),
        other => panic!("unexpected location: {:?}", other),
    }
}

#[test]
fn test_equal_ratings_tie_across_all_splits() {
    let balancer = Balancer::new(Arc::new(TrueSkillModel::default()));
    let format = MatchFormat::new("2v2", 2, 4, 4);
    let players = equal_players(4);

    let mut seen = HashSet::new();
    for seed in 0..64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let partition = balancer.balance(&players, &format, &mut rng).unwrap();
        seen.insert(partition.canonical_key());
    }

    assert_eq!(seen.len(), 3);
}

#[test]
fn test_balance_pairs_strong_with_weak() {
    let balancer = Balancer::new(Arc::new(TrueSkillModel::default()));
    let format = MatchFormat::new("2v2", 2, 4, 4);
    let players = vec![
        rated_player("ace", 40.0, 2.0),
        rated_player("pro", 35.0, 2.0),
        rated_player("mid", 20.0, 2.0),
        rated_player("new", 10.0, 2.0),
    ];

    let mut rng = StdRng::seed_from_u64(1);
    let partition = balancer.balance(&players, &format, &mut rng).unwrap();
    assert_eq!(partition.team_of("ace"), partition.team_of("new"));
    assert_eq!(partition.team_of("pro"), partition.team_of("mid"));
}

#[tokio::test]
async fn test_chat_commands_through_handler() {
    let system = create_test_system().await;
    let handler = CommandHandler::new(system.dispatcher.clone(), system.publisher.clone());

    let say = |user_id: &str, content: &str| InboundCommand {
        user_id: user_id.to_string(),
        user_name: format!("{}-name", user_id),
        channel_id: "scrims".to_string(),
        content: content.to_string(),
    };

    handler.handle_command(say("a", "!create 1v1")).await.unwrap();
    handler.handle_command(say("b", "gl hf")).await.unwrap();
    handler.handle_command(say("b", "!JOIN")).await.unwrap();
    handler.handle_command(say("a", "!start")).await.unwrap();
    handler.handle_command(say("b", "!confirm 2")).await.unwrap();
    handler.handle_command(say("a", "!info #1")).await.unwrap();

    let replies = system.publisher.replies();
    assert_eq!(replies.len(), 5);
    assert!(replies.iter().all(|reply| reply.channel_id == "scrims"));
    assert_eq!(replies[1].user_id, "b");
    assert_eq!(replies[0].routing_key(), "reply.scrims");

    let texts = system.publisher.texts();
    assert!(texts[0].starts_with("a-name opened a 1v1 lobby"));
    assert!(texts[1].contains("The lobby is full"));
    assert!(texts[2].starts_with("Match 1 (1v1, season 0)"));
    assert!(texts[3].contains("Result: Team 2 won (confirmed by b)"));
    assert!(texts[4].contains("Result: Team 2 won"));
}

#[tokio::test]
async fn test_admin_spoof_through_dispatcher() {
    let system = create_test_system().await;
    let dispatcher = &system.dispatcher;

    dispatcher.handle(&user("a"), "!create 2v2").await.unwrap();

    let reply = dispatcher
        .handle(&user("mod"), "!spoof <@a> close")
        .await
        .unwrap();
    assert_eq!(reply, "Permission denied: spoof requires admin");

    let reply = dispatcher
        .handle(&user("root"), "!spoof <@a> !close")
        .await
        .unwrap();
    assert_eq!(reply, "Lobby 1 was closed by a-name.");
}
