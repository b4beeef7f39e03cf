//! Synchronous, injectable publish/subscribe bus for narrative and state
//! signals.
//!
//! The bus lives in the [`World`] as a resource. Handlers receive `&mut World`
//! so each module can reach its own resources and publish follow-up events
//! while the outer dispatch is still running; nested publishes complete before
//! the outer one moves on to its next subscriber.

use std::fmt;
use std::sync::Arc;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::clock::FrameClock;

/// Upper bound on nested publishes before dispatch refuses to recurse further.
pub const MAX_DISPATCH_DEPTH: u32 = 16;

/// Signals exchanged between the insanity core and its collaborators.
#[derive(Event, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GameEvent {
    FlashbackStarted,
    FlashbackEnded,
    RemedyUsed,
    DeathSequenceStarted { duration_secs: f32 },
    DeathSequenceCancelled,
    PlayerDied,
    InsanityChanged { level: f32 },
}

impl GameEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameEvent::FlashbackStarted => "flashback_started",
            GameEvent::FlashbackEnded => "flashback_ended",
            GameEvent::RemedyUsed => "remedy_used",
            GameEvent::DeathSequenceStarted { .. } => "death_sequence_started",
            GameEvent::DeathSequenceCancelled => "death_sequence_cancelled",
            GameEvent::PlayerDied => "player_died",
            GameEvent::InsanityChanged { .. } => "insanity_changed",
        }
    }
}

impl fmt::Display for GameEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameEvent::DeathSequenceStarted { duration_secs } => {
                write!(f, "{}({duration_secs})", self.as_str())
            }
            GameEvent::InsanityChanged { level } => write!(f, "{}({level})", self.as_str()),
            _ => f.write_str(self.as_str()),
        }
    }
}

pub type EventHandler = Arc<dyn Fn(&mut World, &GameEvent) + Send + Sync>;

/// Handle returned by [`EventBus::subscribe`]; pass it back to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Resource, Default)]
pub struct EventBus {
    subscribers: Vec<(SubscriptionId, EventHandler)>,
    next_id: u64,
    depth: u32,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field(
                "subscribers",
                &self.subscribers.iter().map(|(id, _)| *id).collect::<Vec<_>>(),
            )
            .field("depth", &self.depth)
            .finish()
    }
}

impl EventBus {
    /// Register a handler. Handlers fire in registration order.
    pub fn subscribe<F>(&mut self, handler: F) -> SubscriptionId
    where
        F: Fn(&mut World, &GameEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.subscribers.push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler. Returns `false` when the id was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(existing, _)| *existing != id);
        self.subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_subscribed(&self, id: SubscriptionId) -> bool {
        self.subscribers.iter().any(|(existing, _)| *existing == id)
    }

    fn handlers(&self) -> Vec<EventHandler> {
        self.subscribers
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect()
    }
}

/// Deliver `event` to every current subscriber before returning.
///
/// The subscriber list is captured when dispatch starts, so handlers added or
/// removed mid-dispatch take effect from the next publish.
pub fn publish(world: &mut World, event: GameEvent) {
    let handlers = {
        let Some(mut bus) = world.get_resource_mut::<EventBus>() else {
            tracing::trace!(
                target: "echoes::events",
                event = %event,
                "event.dropped=no_bus"
            );
            return;
        };
        if bus.depth >= MAX_DISPATCH_DEPTH {
            tracing::error!(
                target: "echoes::events",
                event = %event,
                depth = bus.depth,
                "event.dropped=dispatch_depth"
            );
            return;
        }
        bus.depth += 1;
        bus.handlers()
    };

    tracing::trace!(target: "echoes::events", event = %event, "event.published");

    if let Some(mut mirror) = world.get_resource_mut::<Events<GameEvent>>() {
        mirror.send(event);
    }

    for handler in handlers.iter() {
        handler(world, &event);
    }

    if let Some(mut bus) = world.get_resource_mut::<EventBus>() {
        bus.depth = bus.depth.saturating_sub(1);
    }
}

pub fn publish_all(world: &mut World, events: impl IntoIterator<Item = GameEvent>) {
    for event in events {
        publish(world, event);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct JournalEntry {
    pub frame: u64,
    pub elapsed: f64,
    pub event: GameEvent,
}

/// Chronological record of every event seen on the bus.
#[derive(Resource, Debug, Default, Clone)]
pub struct EventJournal {
    entries: Vec<JournalEntry>,
}

impl EventJournal {
    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    pub fn events(&self) -> impl Iterator<Item = &GameEvent> + '_ {
        self.entries.iter().map(|entry| &entry.event)
    }

    pub fn count(&self, predicate: impl Fn(&GameEvent) -> bool) -> usize {
        self.events().filter(|event| predicate(event)).count()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn record(&mut self, entry: JournalEntry) {
        self.entries.push(entry);
    }
}

/// Subscribe an [`EventJournal`] recorder, inserting the journal if needed.
pub fn attach_event_journal(world: &mut World) -> SubscriptionId {
    world.init_resource::<EventJournal>();
    world
        .get_resource_or_insert_with(EventBus::default)
        .subscribe(|world, event| {
            let clock = world
                .get_resource::<FrameClock>()
                .copied()
                .unwrap_or_default();
            if let Some(mut journal) = world.get_resource_mut::<EventJournal>() {
                journal.record(JournalEntry {
                    frame: clock.frame(),
                    elapsed: clock.elapsed(),
                    event: *event,
                });
            }
        })
}
