//! End-to-end tests: the event reducer running in a `Store` against the
//! in-memory event store and a recording notifier.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use cando::aggregates::{EventAction, EventEnvironment, EventReducer, EventState, STALLED_MESSAGE};
use cando::directory::{Directory, Session};
use cando::notification::{
    Audience, NOT_SELECTED_MESSAGE, NotificationKind, NotificationPreferences, Notifier,
    RecordingNotifier, SELECTED_MESSAGE, SELECTION_TITLE,
};
use cando::rng::SharedRng;
use cando::types::{EntrantStatus, EventDetails, EventId, FacilityId, User, UserId};
use chrono::Duration as ChronoDuration;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use waitlist_core::environment::Clock;
use waitlist_core::event_store::EventStore;
use waitlist_runtime::{RetryPolicy, Store, StoreConfig};
use waitlist_testing::{InMemoryEventStore, test_clock};

type LotteryStore = Store<EventState, EventAction, EventEnvironment, EventReducer>;

struct Harness {
    store: LotteryStore,
    event_store: Arc<InMemoryEventStore>,
    notifier: Arc<RecordingNotifier>,
    preferences: NotificationPreferences,
}

fn event_id() -> EventId {
    EventId::new("swim")
}

fn details() -> EventDetails {
    let now = test_clock().now();
    EventDetails {
        name: "Swim lessons".to_string(),
        description: "Beginner group".to_string(),
        registration_opens: now - ChronoDuration::days(1),
        registration_closes: now + ChronoDuration::days(6),
        starts_at: now + ChronoDuration::days(10),
        ends_at: now + ChronoDuration::days(11),
        waitlist_capacity: None,
        geolocation_required: false,
    }
}

fn harness(retry_policy: RetryPolicy) -> Harness {
    harness_with(retry_policy, NotificationPreferences::new())
}

fn harness_with(retry_policy: RetryPolicy, preferences: NotificationPreferences) -> Harness {
    let event_store = Arc::new(InMemoryEventStore::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let env = EventEnvironment::new(
        Arc::new(test_clock()),
        Arc::clone(&event_store) as Arc<dyn EventStore>,
        Arc::clone(&notifier) as Arc<dyn Notifier>,
        SharedRng::seeded(11),
    )
    .with_preferences(preferences.clone());
    let config = StoreConfig::default().with_retry_policy(retry_policy);
    Harness {
        store: Store::with_config(EventState::new(), EventReducer::new(), env, config),
        event_store,
        notifier,
        preferences,
    }
}

fn fast_retries() -> RetryPolicy {
    RetryPolicy::builder()
        .max_retries(3)
        .initial_delay(Duration::from_millis(1))
        .max_delay(Duration::from_millis(5))
        .build()
}

async fn send(store: &LotteryStore, action: EventAction) {
    let mut handle = store.send(action).await.unwrap();
    handle
        .wait_with_timeout(Duration::from_secs(5))
        .await
        .expect("effects should finish");
}

fn join(id: &str) -> EventAction {
    EventAction::JoinWaitlist {
        user: UserId::new(id),
        location: None,
    }
}

async fn stored_history(h: &Harness) -> EventState {
    let history = h
        .event_store
        .load_events(event_id().stream_id(), None)
        .await
        .unwrap();
    EventState::replay(&history).unwrap()
}

async fn create_with_entrants(store: &LotteryStore, entrants: &[&str]) {
    send(
        store,
        EventAction::CreateEvent {
            event_id: event_id(),
            facility: FacilityId::new("pool"),
            details: details(),
        },
    )
    .await;
    for entrant in entrants {
        send(
            store,
            EventAction::JoinWaitlist {
                user: UserId::new(*entrant),
                location: None,
            },
        )
        .await;
    }
}

#[tokio::test]
async fn draw_persists_and_notifies_both_groups() {
    let h = harness(fast_retries());
    create_with_entrants(&h.store, &["a", "b", "c"]).await;

    send(&h.store, EventAction::DrawEntrants { count: 2 }).await;

    let (selected, waiting, notifications) = h
        .store
        .state(|s| {
            (
                s.pool.selected().to_vec(),
                s.pool.waiting().to_vec(),
                s.notifications.len(),
            )
        })
        .await;
    assert_eq!(selected.len(), 2);
    assert_eq!(waiting.len(), 1);
    assert_eq!(notifications, 2);

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|n| n.title == SELECTION_TITLE));
    assert_eq!(sent[0].kind, NotificationKind::Selected);
    assert_eq!(sent[0].content, SELECTED_MESSAGE);
    assert_eq!(sent[0].recipients, selected);
    assert_eq!(sent[1].kind, NotificationKind::NotSelected);
    assert_eq!(sent[1].content, NOT_SELECTED_MESSAGE);
    assert_eq!(sent[1].recipients, waiting);

    assert_eq!(
        h.event_store.event_types(&event_id().stream_id()),
        vec![
            "EventCreated.v1",
            "EntrantJoined.v1",
            "EntrantJoined.v1",
            "EntrantJoined.v1",
            "EntrantsDrawn.v1",
        ]
    );
}

#[tokio::test]
async fn replay_matches_live_state() {
    let h = harness(fast_retries());
    create_with_entrants(&h.store, &["a", "b", "c", "d"]).await;
    send(&h.store, EventAction::DrawEntrants { count: 2 }).await;

    let selected = h.store.state(|s| s.pool.selected().to_vec()).await;
    send(&h.store, EventAction::AcceptInvitation { user: selected[0].clone() }).await;
    send(&h.store, EventAction::DeclineInvitation { user: selected[1].clone() }).await;
    send(&h.store, EventAction::DrawEntrants { count: 1 }).await;

    let history = h
        .event_store
        .load_events(event_id().stream_id(), None)
        .await
        .unwrap();
    let rebuilt = EventState::replay(&history).unwrap();
    let live = h.store.state(|s| s.pool.clone()).await;

    assert_eq!(rebuilt.pool, live);
    assert_eq!(rebuilt.draws, 2);
    assert_eq!(live.enrolled(), &[selected[0].clone()]);
    assert_eq!(live.cancelled(), &[selected[1].clone()]);
    assert_eq!(live.selected().len(), 1);
    assert_eq!(live.waiting().len(), 1);
}

#[tokio::test]
async fn repeated_draws_empty_the_waiting_list_without_repeats() {
    let h = harness(fast_retries());
    let entrants = ["a", "b", "c", "d", "e"];
    create_with_entrants(&h.store, &entrants).await;

    for _ in 0..5 {
        send(&h.store, EventAction::DrawEntrants { count: 1 }).await;
    }
    send(&h.store, EventAction::DrawEntrants { count: 1 }).await;

    let (selected, last_error) = h
        .store
        .state(|s| (s.pool.selected().to_vec(), s.last_error.clone()))
        .await;
    let unique: HashSet<_> = selected.iter().collect();
    assert_eq!(unique.len(), entrants.len());
    assert_eq!(
        last_error.as_deref(),
        Some("Invalid argument: Cannot draw more users than are in waitlist")
    );
}

#[tokio::test]
async fn transient_store_failures_are_retried() {
    let h = harness(fast_retries());
    create_with_entrants(&h.store, &[]).await;

    h.event_store.fail_next_appends(2);
    send(
        &h.store,
        EventAction::JoinWaitlist {
            user: UserId::new("a"),
            location: None,
        },
    )
    .await;

    assert_eq!(h.event_store.event_count(&event_id().stream_id()), 2);
    assert!(h.store.state(|s| s.last_error.is_none()).await);
}

#[tokio::test]
async fn exhausted_retries_feed_back_persist_failed() {
    let h = harness(RetryPolicy::none());
    create_with_entrants(&h.store, &[]).await;

    h.event_store.fail_next_appends(1);
    send(
        &h.store,
        EventAction::JoinWaitlist {
            user: UserId::new("a"),
            location: None,
        },
    )
    .await;

    let (status, last_error) = h
        .store
        .state(|s| (s.status_of(&UserId::new("a")), s.last_error.clone()))
        .await;
    assert_eq!(status, Some(EntrantStatus::Waiting));
    assert_eq!(last_error.as_deref(), Some("Database error: injected failure"));
    assert_eq!(h.event_store.event_count(&event_id().stream_id()), 1);
    assert!(h.store.state(|s| s.persist_stalled && !s.is_settled()).await);
}

#[tokio::test]
async fn pipelined_commands_survive_a_retried_append() {
    let retries = RetryPolicy::builder()
        .max_retries(3)
        .initial_delay(Duration::from_millis(50))
        .max_delay(Duration::from_millis(100))
        .build();
    let h = harness(retries);
    create_with_entrants(&h.store, &[]).await;

    h.event_store.fail_next_appends(1);
    let mut handles = Vec::new();
    for action in [join("a"), join("b"), EventAction::DrawEntrants { count: 2 }] {
        handles.push(h.store.send(action).await.unwrap());
    }
    for mut handle in handles {
        handle
            .wait_with_timeout(Duration::from_secs(5))
            .await
            .expect("effects should finish");
    }

    assert_eq!(
        h.event_store.event_types(&event_id().stream_id()),
        vec![
            "EventCreated.v1",
            "EntrantJoined.v1",
            "EntrantJoined.v1",
            "EntrantsDrawn.v1",
        ]
    );
    let (live, settled, last_error) = h
        .store
        .state(|s| (s.pool.clone(), s.is_settled(), s.last_error.clone()))
        .await;
    assert!(settled);
    assert!(last_error.is_none());
    let rebuilt = stored_history(&h).await;
    assert_eq!(rebuilt.pool, live);
    assert_eq!(rebuilt.draws, 1);
    assert_eq!(live.selected().len(), 2);
    assert_eq!(h.notifier.sent().len(), 1);
}

#[tokio::test]
async fn stalled_event_recovers_after_retry_persist() {
    let h = harness(RetryPolicy::none());
    create_with_entrants(&h.store, &["a"]).await;

    h.event_store.fail_next_appends(1);
    send(&h.store, join("b")).await;
    send(&h.store, EventAction::DrawEntrants { count: 2 }).await;

    let (selected, last_error) = h
        .store
        .state(|s| (s.pool.selected().len(), s.last_error.clone()))
        .await;
    assert_eq!(selected, 0);
    assert_eq!(last_error.as_deref(), Some(STALLED_MESSAGE));
    assert!(h.notifier.sent().is_empty());

    send(&h.store, EventAction::RetryPersist).await;
    assert_eq!(h.event_store.event_count(&event_id().stream_id()), 3);
    send(&h.store, EventAction::DrawEntrants { count: 2 }).await;

    let live = h.store.state(|s| s.pool.clone()).await;
    assert_eq!(live.selected().len(), 2);
    assert_eq!(stored_history(&h).await.pool, live);
    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, NotificationKind::Selected);
}

#[tokio::test]
async fn failed_delivery_is_recorded() {
    let h = harness(fast_retries());
    create_with_entrants(&h.store, &["a", "b"]).await;

    h.notifier.fail_next(1);
    send(
        &h.store,
        EventAction::NotifyEntrants {
            audience: Audience::Waiting,
            title: "Reminder".to_string(),
            message: "Draw is tomorrow".to_string(),
        },
    )
    .await;

    let last_error = h.store.state(|s| s.last_error.clone()).await;
    assert_eq!(
        last_error.as_deref(),
        Some("Notification delivery failed: injected failure")
    );
    assert!(h.notifier.sent().is_empty());

    send(
        &h.store,
        EventAction::NotifyEntrants {
            audience: Audience::Waiting,
            title: "Reminder".to_string(),
            message: "Draw is tomorrow".to_string(),
        },
    )
    .await;
    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, NotificationKind::Message);
    assert_eq!(sent[0].recipients.len(), 2);
}

#[tokio::test]
async fn opted_out_entrant_misses_organizer_messages() {
    let h = harness(fast_retries());
    create_with_entrants(&h.store, &["a", "b"]).await;
    h.preferences.set_enabled(&UserId::new("a"), false);

    send(
        &h.store,
        EventAction::NotifyEntrants {
            audience: Audience::Waiting,
            title: "Reminder".to_string(),
            message: "Draw is tomorrow".to_string(),
        },
    )
    .await;
    send(&h.store, EventAction::DrawEntrants { count: 1 }).await;

    let to_a = h.notifier.received_by(&UserId::new("a"));
    assert_eq!(to_a.len(), 1);
    assert_ne!(to_a[0].kind, NotificationKind::Message);
    let to_b = h.notifier.received_by(&UserId::new("b"));
    assert_eq!(to_b.len(), 2);
    assert_eq!(to_b[0].kind, NotificationKind::Message);
    assert_eq!(to_b[0].recipients, vec![UserId::new("b")]);
}

#[tokio::test]
async fn deleted_user_is_removed_from_joined_waitlists() {
    let mut directory = Directory::new();
    let mut admin = User::new(UserId::new("admin"), "Ada", "ada@example.com");
    admin.is_admin = true;
    directory.register_user(admin).unwrap();
    let organizer = UserId::new("organizer");
    directory
        .register_user(User::new(organizer.clone(), "Olive", "olive@example.com"))
        .unwrap();
    let facility = directory.create_facility(&organizer, "Pool", "1 Main St").unwrap();
    let catalogued = directory.add_event(&facility, details()).unwrap();
    let entrant = UserId::new("a");
    directory
        .register_user(User::new(entrant.clone(), "Avery", "avery@example.com"))
        .unwrap();

    let h = harness_with(fast_retries(), directory.preferences());
    create_with_entrants(&h.store, &["a", "b"]).await;
    directory.record_joined(&entrant, &catalogued).unwrap();

    let removal = directory
        .remove_user(&Session::new(UserId::new("admin")), &entrant)
        .unwrap();
    assert_eq!(removal.user.events_joined, vec![catalogued.clone()]);
    for _ in &removal.user.events_joined {
        send(&h.store, EventAction::RemoveEntrant { user: removal.user.id.clone() }).await;
    }

    let waiting = h.store.state(|s| s.pool.waiting().to_vec()).await;
    assert_eq!(waiting, vec![UserId::new("b")]);
    assert!(directory.user(&entrant).is_none());
    assert_eq!(stored_history(&h).await.pool.waiting(), &[UserId::new("b")]);
}

#[tokio::test]
async fn concurrent_joins_are_serialized() {
    let h = harness(fast_retries());
    create_with_entrants(&h.store, &[]).await;

    let mut tasks = Vec::new();
    for n in 0..20 {
        let store = h.store.clone();
        tasks.push(tokio::spawn(async move {
            send(
                &store,
                EventAction::JoinWaitlist {
                    user: UserId::new(format!("u{n}")),
                    location: None,
                },
            )
            .await;
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(h.store.state(|s| s.pool.waiting().len()).await, 20);
    assert_eq!(h.event_store.event_count(&event_id().stream_id()), 21);
}
