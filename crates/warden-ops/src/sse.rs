//! The `/ops/events` SSE stream.
//!
//! Each source IP gets a bounded number of concurrent streams (429
//! beyond the cap). A stream opens with a `connected` hello, forwards
//! sanitized bus events tagged by channel, and flushes a final
//! `connected: false` when the control plane shuts down.

use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::stream::Stream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use warden_events::{EventReceiver, WardenEvent, sanitize_payload};

use crate::auth::require_read;
use crate::read::error_response;
use crate::state::{OpsState, SharedState};

/// Releases one connection slot when the stream drops.
struct ConnectionSlot {
    state: SharedState,
    ip: IpAddr,
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        if let Some(mut count) = self.state.sse_connections.get_mut(&self.ip) {
            *count = count.saturating_sub(1);
        }
        debug!(ip = %self.ip, "sse connection closed");
    }
}

enum Phase {
    Hello,
    Streaming,
    Done,
}

struct StreamState {
    phase: Phase,
    receiver: EventReceiver,
    shutdown: CancellationToken,
    _slot: ConnectionSlot,
}

fn hello_event(connected: bool) -> Event {
    Event::default()
        .event("connected")
        .data(format!("{{\"connected\":{connected}}}"))
}

fn bus_event(event: &WardenEvent) -> Event {
    let payload = serde_json::to_value(event)
        .map(sanitize_payload)
        .unwrap_or_else(|_| serde_json::json!({}));
    Event::default().event(event.channel()).data(payload.to_string())
}

fn event_stream(state: StreamState) -> impl Stream<Item = Result<Event, Infallible>> {
    futures::stream::unfold(state, |mut s| async move {
        match s.phase {
            Phase::Hello => {
                s.phase = Phase::Streaming;
                Some((Ok(hello_event(true)), s))
            },
            Phase::Streaming => {
                tokio::select! {
                    () = s.shutdown.cancelled() => {
                        s.phase = Phase::Done;
                        Some((Ok(hello_event(false)), s))
                    },
                    event = s.receiver.recv() => match event {
                        Some(event) => Some((Ok(bus_event(&event)), s)),
                        None => {
                            s.phase = Phase::Done;
                            Some((Ok(hello_event(false)), s))
                        },
                    },
                }
            },
            Phase::Done => None,
        }
    })
}

/// `GET /ops/events`.
pub async fn events(
    State(state): State<SharedState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    if let Err(denied) = require_read(&state.settings, &headers) {
        return denied;
    }

    let ip = addr.ip();
    if !try_acquire(&state, ip) {
        return error_response(StatusCode::TOO_MANY_REQUESTS, "SSE_CONNECTION_CAP");
    }
    debug!(ip = %ip, "sse connection opened");

    let stream_state = StreamState {
        phase: Phase::Hello,
        receiver: state.events.subscribe(),
        shutdown: state.shutdown.clone(),
        _slot: ConnectionSlot {
            state: Arc::clone(&state),
            ip,
        },
    };
    Sse::new(event_stream(stream_state))
        .keep_alive(KeepAlive::default())
        .into_response()
}

/// Reserve a connection slot for the source IP; `false` at the cap.
fn try_acquire(state: &Arc<OpsState>, ip: IpAddr) -> bool {
    let mut count = state.sse_connections.entry(ip).or_insert(0);
    if *count >= state.settings.sse_connection_cap {
        return false;
    }
    *count += 1;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use warden_config::HttpSettings;
    use warden_config::LimitsSettings;
    use warden_events::EventBus;
    use warden_governance::Governance;
    use warden_limits::LimitsEngine;
    use warden_memory::MemoryService;
    use warden_policy::ApproverMap;
    use warden_protocol::Verifier;
    use warden_store::GovStore;

    fn shared_state(cap: usize) -> SharedState {
        let store = Arc::new(GovStore::in_memory());
        let events = EventBus::new();
        let limits = LimitsEngine::new(
            Arc::clone(&store),
            LimitsSettings {
                enabled: true,
                ext_calls_enabled: true,
                rate_overrides: std::collections::HashMap::new(),
                quota_overrides: std::collections::HashMap::new(),
                breaker: warden_config::BreakerSettings::default(),
            },
            events.clone(),
        );
        Arc::new(OpsState {
            governance: Arc::new(Governance::new(
                Arc::clone(&store),
                ApproverMap::default(),
                false,
            )),
            memory: Arc::new(MemoryService::new(
                Arc::clone(&store),
                limits.clone(),
                None,
            )),
            limits,
            verifier: Verifier::new(Arc::clone(&store), Duration::from_secs(60)),
            store,
            events,
            settings: HttpSettings {
                bind_addr: "127.0.0.1:0".into(),
                read_secret: "read".into(),
                write_secret_current: "write".into(),
                write_secret_previous: None,
                sse_connection_cap: cap,
            },
            sse_connections: dashmap::DashMap::new(),
            shutdown: CancellationToken::new(),
        })
    }

    #[tokio::test]
    async fn test_connection_cap_counts_per_ip() {
        let state = shared_state(2);
        let ip: IpAddr = "203.0.113.7".parse().unwrap();
        let other: IpAddr = "203.0.113.8".parse().unwrap();

        assert!(try_acquire(&state, ip));
        assert!(try_acquire(&state, ip));
        assert!(!try_acquire(&state, ip));
        // A different source is unaffected.
        assert!(try_acquire(&state, other));
    }

    #[tokio::test]
    async fn test_slot_released_on_drop() {
        let state = shared_state(1);
        let ip: IpAddr = "203.0.113.7".parse().unwrap();

        assert!(try_acquire(&state, ip));
        drop(ConnectionSlot {
            state: Arc::clone(&state),
            ip,
        });
        assert!(try_acquire(&state, ip));
    }

    #[tokio::test]
    async fn test_stream_hello_events_goodbye() {
        use futures::StreamExt;

        let state = shared_state(3);
        let ip: IpAddr = "203.0.113.7".parse().unwrap();
        assert!(try_acquire(&state, ip));

        let stream_state = StreamState {
            phase: Phase::Hello,
            receiver: state.events.subscribe(),
            shutdown: state.shutdown.clone(),
            _slot: ConnectionSlot {
                state: Arc::clone(&state),
                ip,
            },
        };
        let mut stream = Box::pin(event_stream(stream_state));

        // Hello first.
        let hello = stream.next().await.unwrap().unwrap();
        assert!(format!("{hello:?}").contains("connected"));

        // A published event flows through.
        state.events.publish(WardenEvent::BreakerState {
            metadata: warden_events::EventMetadata::new("test"),
            provider: "github".into(),
            state: warden_core::BreakerState::Open,
            fail_count: 3,
        });
        let event = stream.next().await.unwrap().unwrap();
        assert!(format!("{event:?}").contains("breaker:state"));

        // Shutdown flushes the goodbye and ends the stream.
        state.shutdown.cancel();
        let goodbye = stream.next().await.unwrap().unwrap();
        assert!(format!("{goodbye:?}").contains("connected"));
        assert!(stream.next().await.is_none());
    }
}
