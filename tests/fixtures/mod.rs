//! Test fixtures shared by the integration tests

use scrim_room::amqp::publisher::MockReplyPublisher;
use scrim_room::command::{CommandParser, Dispatcher};
use scrim_room::config::LobbyConfig;
use scrim_room::lobby::LifecycleCoordinator;
use scrim_room::metrics::MetricsCollector;
use scrim_room::rating::TrueSkillModel;
use scrim_room::store::InMemoryStore;
use scrim_room::types::{Identity, MatchFormat, Player, PlayerRating};
use scrim_room::utils::ManualClock;
use std::sync::Arc;

/// Everything a test needs to drive the service without a broker
pub struct TestSystem {
    pub coordinator: Arc<LifecycleCoordinator>,
    pub dispatcher: Arc<Dispatcher>,
    pub store: InMemoryStore,
    pub clock: Arc<ManualClock>,
    pub metrics: Arc<MetricsCollector>,
    pub publisher: Arc<MockReplyPublisher>,
}

/// Formats registered by [`create_test_system`]
pub fn test_formats() -> Vec<MatchFormat> {
    vec![
        MatchFormat::new("1v1", 1, 2, 2),
        MatchFormat::new("2v2", 2, 4, 4),
        MatchFormat::new("5v5", 5, 10, 10),
        MatchFormat::new("ffa", 1, 3, 4),
    ]
}

/// Build a seeded system with `root` as admin and `mod` as moderator
pub async fn create_test_system() -> TestSystem {
    let store = InMemoryStore::new();
    let clock = Arc::new(ManualClock::default());
    let metrics = Arc::new(MetricsCollector::new().unwrap());
    let config = LobbyConfig {
        rng_seed: Some(7),
        ..Default::default()
    };

    let coordinator = Arc::new(LifecycleCoordinator::new(
        Arc::new(store.clone()),
        Arc::new(TrueSkillModel::default()),
        clock.clone(),
        metrics.clone(),
        &config,
    ));
    coordinator
        .bootstrap(
            &test_formats(),
            &["root".to_string()],
            &["mod".to_string()],
        )
        .await
        .unwrap();

    let dispatcher = Arc::new(Dispatcher::new(
        coordinator.clone(),
        CommandParser::default(),
        metrics.clone(),
    ));

    TestSystem {
        coordinator,
        dispatcher,
        store,
        clock,
        metrics,
        publisher: Arc::new(MockReplyPublisher::new()),
    }
}

/// Identity whose display name is derived from the id
pub fn user(id: &str) -> Identity {
    Identity::new(id, format!("{}-name", id))
}

/// Player snapshot with the given mean and uncertainty
pub fn rated_player(id: &str, rating: f64, uncertainty: f64) -> Player {
    Player::new(
        id,
        PlayerRating {
            rating,
            uncertainty,
        },
        0,
    )
}

/// Pool of players sharing the default rating
pub fn equal_players(count: usize) -> Vec<Player> {
    (0..count)
        .map(|i| Player::new(format!("p{}", i), PlayerRating::default(), 0))
        .collect()
}
