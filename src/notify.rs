//! Live-update fan-out for registration writes.
//!
//! The write path only sees [`Publisher`]; how events reach clients (here,
//! Server-Sent Events over a tokio broadcast channel) stays behind it.
//! Publishing never blocks and never fails the caller.

use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Extension;
use futures::stream::{self, Stream, StreamExt};
use std::convert::Infallible;
use std::future::Future;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;

use crate::models::Registration;
use crate::AppState;

pub const CREATED: &str = "registration:created";
pub const UPDATED: &str = "registration:updated";

#[derive(Debug, Clone, PartialEq)]
pub enum RegistrationEvent {
    Created(Registration),
    Updated(Registration),
}

impl RegistrationEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RegistrationEvent::Created(_) => CREATED,
            RegistrationEvent::Updated(_) => UPDATED,
        }
    }

    pub fn record(&self) -> &Registration {
        match self {
            RegistrationEvent::Created(r) | RegistrationEvent::Updated(r) => r,
        }
    }
}

pub trait Publisher: Send + Sync {
    fn publish(&self, event: RegistrationEvent);
}

pub struct BroadcastBus {
    sender: broadcast::Sender<RegistrationEvent>,
    closed: watch::Sender<bool>,
}

impl BroadcastBus {
    pub fn new(buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer.max(1));
        let (closed, _) = watch::channel(false);
        Self { sender, closed }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistrationEvent> {
        self.sender.subscribe()
    }

    /// Ends every open push stream so graceful shutdown is not held up by
    /// long-lived subscribers.
    pub fn close(&self) {
        self.closed.send_replace(true);
    }

    pub fn closed(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut closed = self.closed.subscribe();
        async move {
            loop {
                let done = *closed.borrow_and_update();
                if done || closed.changed().await.is_err() {
                    return;
                }
            }
        }
    }
}

impl Publisher for BroadcastBus {
    fn publish(&self, event: RegistrationEvent) {
        let name = event.name();
        match self.sender.send(event) {
            Ok(receivers) => log::debug!("{} delivered to {} subscriber(s)", name, receivers),
            Err(_) => log::debug!("{} dropped, no subscribers", name),
        }
    }
}

fn to_sse(event: &RegistrationEvent) -> Option<Event> {
    match Event::default().event(event.name()).json_data(event.record()) {
        Ok(sse) => Some(sse),
        Err(err) => {
            log::error!("could not encode {}: {}", event.name(), err);
            None
        }
    }
}

/// Follows the bus until it closes. Lagging subscribers skip what they missed.
pub fn event_stream(
    receiver: broadcast::Receiver<RegistrationEvent>,
) -> impl Stream<Item = Event> + Send + 'static {
    stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if let Some(sse) = to_sse(&event) {
                        return Some((sse, receiver));
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    log::warn!("push subscriber lagged, skipped {} event(s)", missed);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
}

pub async fn subscribe(
    Extension(state): Extension<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.bus.subscribe();
    let hello = stream::once(async { Event::default().comment("connected") });
    let events = hello
        .chain(event_stream(receiver))
        .take_until(state.bus.closed())
        .map(Ok);
    Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewRegistration;
    use uuid::Uuid;

    fn record() -> Registration {
        NewRegistration {
            first_name: Some("Ada".to_string()),
            last_name: Some("Byron".to_string()),
            email: Some("ada@example.com".to_string()),
            ..Default::default()
        }
        .into_registration(Uuid::new_v4())
        .unwrap()
    }

    #[test]
    fn publish_without_subscribers_is_silent() {
        let bus = BroadcastBus::new(4);
        bus.publish(RegistrationEvent::Created(record()));
    }

    #[tokio::test]
    async fn every_subscriber_gets_the_event() {
        let bus = BroadcastBus::new(4);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        let reg = record();
        bus.publish(RegistrationEvent::Updated(reg.clone()));

        assert_eq!(a.recv().await.unwrap(), RegistrationEvent::Updated(reg.clone()));
        assert_eq!(b.recv().await.unwrap().record().id, reg.id);
    }

    #[tokio::test]
    async fn late_subscriber_misses_earlier_events() {
        let bus = BroadcastBus::new(4);
        let _early = bus.subscribe();
        bus.publish(RegistrationEvent::Created(record()));
        let mut late = bus.subscribe();
        assert!(late.try_recv().is_err());
    }

    #[tokio::test]
    async fn close_resolves_pending_waiters() {
        let bus = BroadcastBus::new(4);
        let waiter = tokio::spawn(bus.closed());
        bus.close();
        waiter.await.unwrap();
        // already closed
        bus.closed().await;
    }

    #[tokio::test]
    async fn lagging_subscriber_keeps_receiving() {
        let bus = BroadcastBus::new(1);
        let receiver = bus.subscribe();
        bus.publish(RegistrationEvent::Created(record()));
        bus.publish(RegistrationEvent::Created(record()));
        drop(bus);

        let events: Vec<Event> = event_stream(receiver).collect().await;
        assert_eq!(events.len(), 1);
    }
}
