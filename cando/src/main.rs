//! Can Do lottery demo.
//!
//! Walks one event through its lifecycle against an in-memory event store:
//! an organizer creates the event, entrants join after scanning its QR
//! code, the organizer draws, and the drawn entrants answer.
//!
//! # Usage
//!
//! ```bash
//! LOTTERY_RNG_SEED=42 RUST_LOG=cando=debug cargo run --bin cando-demo
//! ```

use cando::aggregates::{EventAction, EventEnvironment, EventReducer, EventState};
use cando::config::Config;
use cando::directory::{Directory, Session};
use cando::metrics::register_lottery_metrics;
use cando::notification::{Audience, LogNotifier};
use cando::qr;
use cando::rng::SharedRng;
use cando::types::{EventDetails, GeoPoint, User, UserId};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use waitlist_core::environment::SystemClock;
use waitlist_core::event_store::EventStore;
use waitlist_runtime::Store;
use waitlist_runtime::metrics::register_metrics;
use waitlist_testing::InMemoryEventStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    register_metrics();
    register_lottery_metrics();

    info!(
        rng_seed = ?config.lottery.rng_seed,
        default_capacity = ?config.lottery.default_waitlist_capacity,
        max_retries = config.store.max_retries,
        "Configuration loaded"
    );

    // Organizer and facility
    let mut directory = Directory::new();
    let organizer = UserId::new("organizer-1");
    directory.register_user(User::new(organizer.clone(), "Olive", "olive@example.com"))?;
    directory.create_facility(&organizer, "Community Pool", "1 Main St")?;
    let session = Session::new(organizer.clone());
    let facility = session.require_organizer(&directory)?.id.clone();

    let now = Utc::now();
    let details = EventDetails {
        name: "Beginner swim lessons".to_string(),
        description: "Ten weekly lessons, six spots".to_string(),
        registration_opens: now - Duration::hours(1),
        registration_closes: now + Duration::days(7),
        starts_at: now + Duration::days(14),
        ends_at: now + Duration::days(84),
        waitlist_capacity: None,
        geolocation_required: true,
    };
    let event_id = directory.add_event(&facility, details.clone())?;
    let payload = qr::encode(&event_id);
    info!(%event_id, %payload, "Event catalogued");

    // Event aggregate
    let event_store = Arc::new(InMemoryEventStore::new());
    let env = EventEnvironment::new(
        Arc::new(SystemClock),
        Arc::clone(&event_store) as Arc<dyn EventStore>,
        Arc::new(LogNotifier),
        SharedRng::from_seed_or_entropy(config.lottery.rng_seed),
    )
    .with_default_capacity(config.lottery.default_waitlist_capacity)
    .with_preferences(directory.preferences());
    let store = Store::with_config(
        EventState::new(),
        EventReducer::new(),
        env,
        config.store_config(),
    );

    store
        .send(EventAction::CreateEvent {
            event_id: event_id.clone(),
            facility,
            details,
        })
        .await?
        .wait()
        .await;

    // Entrants scan the QR code and join
    for n in 1..=8_u8 {
        let user = UserId::new(format!("entrant-{n}"));
        directory.register_user(User::new(user.clone(), format!("Entrant {n}"), format!("e{n}@example.com")))?;
        let location = GeoPoint::new(53.54 + f64::from(n) * 0.001, -113.49);
        directory.set_location(&user, location)?;

        let scanned = qr::decode(&payload)?;
        store
            .send(EventAction::JoinWaitlist {
                user: user.clone(),
                location: Some(location),
            })
            .await?
            .wait()
            .await;

        if store.state(|s| s.status_of(&user).is_some()).await {
            directory.record_joined(&user, &scanned)?;
        }
    }

    // Organizer draws
    session.require_manager(&directory, &event_id)?;
    store
        .send(EventAction::DrawEntrants { count: 3 })
        .await?
        .wait()
        .await;

    let selected = store.state(|s| s.pool.selected().to_vec()).await;
    info!(selected = ?selected, "Draw complete");

    // One entrant turns off organizer messages before the reminder
    directory.set_notifications_enabled(&UserId::new("entrant-8"), false)?;
    store
        .send(EventAction::NotifyEntrants {
            audience: Audience::Waiting,
            title: "Stay tuned".to_string(),
            message: "Another draw follows if spots open up".to_string(),
        })
        .await?
        .wait()
        .await;

    // First drawn entrant declines, the rest accept
    for (index, user) in selected.iter().enumerate() {
        let answer = if index == 0 {
            EventAction::DeclineInvitation { user: user.clone() }
        } else {
            EventAction::AcceptInvitation { user: user.clone() }
        };
        store.send(answer).await?.wait().await;
    }
    for user in store.state(|s| s.pool.enrolled().to_vec()).await {
        directory.record_enrolled(&user, &event_id)?;
    }

    // Redraw for the declined spot
    store
        .send(EventAction::DrawEntrants { count: 1 })
        .await?
        .wait()
        .await;

    let (waiting, drawn, enrolled, cancelled, last_error) = store
        .state(|s| {
            (
                s.pool.waiting().len(),
                s.pool.selected().len(),
                s.pool.enrolled().len(),
                s.pool.cancelled().len(),
                s.last_error.clone(),
            )
        })
        .await;
    info!(waiting, selected = drawn, enrolled, cancelled, "Final pool");
    if let Some(error) = last_error {
        warn!(%error, "Last error");
    }

    // Rebuild from the event store
    let history = event_store
        .load_events(event_id.stream_id(), None)
        .await?;
    let rebuilt = EventState::replay(&history)?;
    let live = store.state(|s| s.pool.clone()).await;
    info!(
        events = history.len(),
        consistent = rebuilt.pool == live,
        "Replayed event stream"
    );

    store.shutdown(store.config().shutdown_timeout).await?;
    info!("Shutdown complete");
    Ok(())
}
