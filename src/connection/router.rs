// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Dispatch of a single parsed client message against one connection (spec
//! §4.6)
//!
//! Grounded in `nostr-relay-builder/src/local/internal.rs`'s per-tag match
//! arms (`EVENT`/`REQ`/`COUNT`/`CLOSE`), generalized with the AUTH and
//! NEG-OPEN/NEG-MSG/NEG-CLOSE arms that crate leaves as unimplemented stubs.

use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::Limits;
use crate::connection::{Connection, RateLimiterResponse};
use crate::event::{reason, validate_auth_event, validate_created_at, validate_event, Event, Filter};
use crate::message::{ClientMessage, RelayMessage};
use crate::reconcile::ReconciliationSession;
use crate::store::Store;

use super::Subscription;

/// Parse and dispatch one inbound text frame (spec §4.6, steps 1-3).
///
/// Step 1 (message-length enforcement) happens at the transport layer, which
/// knows the frame's byte length before it reaches here.
pub async fn handle_frame(
    conn: &Arc<Connection>,
    store: &Arc<Store>,
    registry: &Arc<crate::broadcast::Registry>,
    limits: &Limits,
    text: &str,
) {
    let message = match ClientMessage::from_json(text) {
        Ok(message) => message,
        Err(reason) => {
            warn!(%reason, "dropping malformed client message");
            return;
        }
    };

    match message {
        ClientMessage::Event(event) => handle_event(conn, store, registry, limits, event).await,
        ClientMessage::Req { sub_id, filters } => handle_req(conn, store, limits, sub_id, filters),
        ClientMessage::Count { sub_id, filters } => handle_count(conn, store, sub_id, filters),
        ClientMessage::Auth(event) => handle_auth(conn, event),
        ClientMessage::Close { sub_id } => handle_close(conn, sub_id),
        ClientMessage::NegOpen {
            sub_id,
            filter,
            initial_message,
        } => handle_neg_open(conn, store, limits, sub_id, filter, initial_message),
        ClientMessage::NegMsg { sub_id, message } => handle_neg_msg(conn, sub_id, message),
        ClientMessage::NegClose { sub_id } => handle_neg_close(conn, sub_id),
    }
}

async fn handle_event(
    conn: &Arc<Connection>,
    store: &Arc<Store>,
    registry: &Arc<crate::broadcast::Registry>,
    limits: &Limits,
    event: Event,
) {
    let id_hex = event.id.to_hex();

    if matches!(conn.check_rate_limit(limits.events_per_minute), RateLimiterResponse::Limited) {
        conn.send(
            RelayMessage::Ok {
                event_id: id_hex,
                accepted: false,
                message: format!("{}: rate limit exceeded", reason::ERROR),
            }
            .to_json(),
        );
        return;
    }

    if !event.is_ephemeral() {
        match store.contains_id(&event.id) {
            Ok(true) => {
                conn.send(
                    RelayMessage::Ok {
                        event_id: id_hex,
                        accepted: true,
                        message: format!("{}: already have this event", reason::DUPLICATE),
                    }
                    .to_json(),
                );
                return;
            }
            Ok(false) => {}
            Err(err) => warn!(%err, "contains_id failed, continuing without the fast path"),
        }
    }

    if let Err(message) = validate_event(&event, limits.min_pow_difficulty, limits.max_tags) {
        conn.send(
            RelayMessage::Ok {
                event_id: id_hex,
                accepted: false,
                message,
            }
            .to_json(),
        );
        return;
    }

    if let Some(expiration) = event
        .tag_values("expiration")
        .next()
        .and_then(|v| v.parse::<i64>().ok())
    {
        if expiration < now_secs() {
            conn.send(
                RelayMessage::Ok {
                    event_id: id_hex,
                    accepted: false,
                    message: format!("{}: event has expired", reason::ERROR),
                }
                .to_json(),
            );
            return;
        }
    }

    if let Err(message) =
        validate_created_at(event.created_at, limits.created_at_lower_limit, limits.created_at_upper_limit)
    {
        conn.send(
            RelayMessage::Ok {
                event_id: id_hex,
                accepted: false,
                message,
            }
            .to_json(),
        );
        return;
    }

    if event.tags.iter().any(|t| t.name() == Some("-")) {
        match conn.authenticated_pubkey() {
            None => {
                conn.send(
                    RelayMessage::Ok {
                        event_id: id_hex,
                        accepted: false,
                        message: format!(
                            "{}: this event may only be published by its author",
                            reason::AUTH_REQUIRED
                        ),
                    }
                    .to_json(),
                );
                conn.send(RelayMessage::Auth { challenge: &conn.challenge() }.to_json());
                return;
            }
            Some(pubkey) if pubkey != event.pubkey => {
                conn.send(
                    RelayMessage::Ok {
                        event_id: id_hex,
                        accepted: false,
                        message: format!(
                            "{}: protected event may only be published by its author",
                            reason::RESTRICTED
                        ),
                    }
                    .to_json(),
                );
                return;
            }
            _ => {}
        }
    }

    if !event.is_ephemeral() {
        if let Err(err) = store.save_event(&event) {
            warn!(%err, "save_event failed");
            conn.send(
                RelayMessage::Ok {
                    event_id: id_hex,
                    accepted: false,
                    message: format!("{}: storage failure", reason::ERROR),
                }
                .to_json(),
            );
            return;
        }
    }

    conn.send(
        RelayMessage::Ok {
            event_id: id_hex,
            accepted: true,
            message: String::new(),
        }
        .to_json(),
    );

    if event.kind == crate::event::Kind::EVENT_DELETION {
        let event_ids: Vec<String> = event.tag_values("e").map(str::to_string).collect();
        let addresses: Vec<String> = event.tag_values("a").map(str::to_string).collect();
        if let Err(err) = store.delete_events(&event.pubkey, &event_ids, &addresses, event.created_at) {
            warn!(%err, "delete_events failed");
        }
    }

    crate::broadcast::deliver(registry, &event);
}

fn handle_req(conn: &Arc<Connection>, store: &Arc<Store>, limits: &Limits, sub_id: String, filters: Vec<Filter>) {
    if filters.len() > limits.max_filters {
        conn.send(
            RelayMessage::Closed {
                sub_id: &sub_id,
                message: format!("{}: too many filters", reason::ERROR),
            }
            .to_json(),
        );
        return;
    }

    let already_open = conn.subscriptions.lock().unwrap().contains_key(&sub_id);
    if !already_open && conn.subscriptions.lock().unwrap().len() >= limits.max_subscriptions {
        conn.send(
            RelayMessage::Closed {
                sub_id: &sub_id,
                message: format!("{}: max subscriptions reached", reason::ERROR),
            }
            .to_json(),
        );
        return;
    }

    if let Some(old) = conn.subscriptions.lock().unwrap().remove(&sub_id) {
        old.cancel.cancel();
    }

    let subscription = Arc::new(Subscription::new(filters.clone(), &sub_id));
    conn.subscriptions
        .lock()
        .unwrap()
        .insert(sub_id.clone(), subscription.clone());

    let conn = conn.clone();
    let store = store.clone();
    let cancel = subscription.cancel.clone();
    tokio::spawn(async move {
        stream_historical(conn, store, filters, sub_id, cancel).await;
    });
}

/// Stream historical matches for a freshly opened subscription, one filter
/// at a time, until exhausted or cancelled (spec §4.6 "REQ"). Runs as its own
/// spawned task, so a concurrent `broadcast::deliver` can interleave EVENT
/// frames for this subscription before EOSE; spec §5 tolerates this
/// (duplicates on the border are permissible, omission is not).
///
/// Each filter's cursor runs on a blocking thread (the store's rusqlite
/// connection is synchronous); hydrated events cross back over a channel so
/// the cancellation token can still be polled between sends from async
/// context.
async fn stream_historical(
    conn: Arc<Connection>,
    store: Arc<Store>,
    filters: Vec<Filter>,
    sub_id: String,
    cancel: CancellationToken,
) {
    let mut seen = HashSet::new();

    for filter in filters {
        if cancel.is_cancelled() {
            return;
        }

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Event>();
        let blocking_store = store.clone();
        let blocking_cancel = cancel.clone();
        let handle = tokio::task::spawn_blocking(move || {
            let cursor = match blocking_store.query_events(&filter) {
                Ok(cursor) => cursor,
                Err(err) => {
                    warn!(%err, "query_events failed");
                    return;
                }
            };
            for item in cursor {
                if blocking_cancel.is_cancelled() {
                    break;
                }
                match item {
                    Ok(event) => {
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        warn!(%err, "hydration failed mid-stream");
                        break;
                    }
                }
            }
        });

        while let Some(event) = rx.recv().await {
            if cancel.is_cancelled() {
                let _ = handle.await;
                return;
            }
            if seen.insert(event.id) {
                conn.send(RelayMessage::Event { sub_id: &sub_id, event: &event }.to_json());
            }
        }
        let _ = handle.await;
    }

    if !cancel.is_cancelled() {
        conn.send(RelayMessage::Eose { sub_id: &sub_id }.to_json());
    }
}

fn handle_count(conn: &Arc<Connection>, store: &Arc<Store>, sub_id: String, filters: Vec<Filter>) {
    match store.count_events(&filters) {
        Ok(count) => conn.send(RelayMessage::Count { sub_id: &sub_id, count }.to_json()),
        Err(err) => {
            warn!(%err, "count_events failed");
            conn.send(
                RelayMessage::Closed {
                    sub_id: &sub_id,
                    message: format!("{}: storage failure", reason::ERROR),
                }
                .to_json(),
            );
        }
    }
}

fn handle_auth(conn: &Arc<Connection>, event: Event) {
    let id_hex = event.id.to_hex();
    let challenge = conn.challenge();
    match validate_auth_event(&event, &challenge, &conn.relay_url) {
        Ok(()) => {
            conn.set_authenticated_pubkey(event.pubkey);
            conn.send(
                RelayMessage::Ok {
                    event_id: id_hex,
                    accepted: true,
                    message: String::new(),
                }
                .to_json(),
            );
        }
        Err(message) => conn.send(
            RelayMessage::Ok {
                event_id: id_hex,
                accepted: false,
                message,
            }
            .to_json(),
        ),
    }
}

fn handle_close(conn: &Arc<Connection>, sub_id: String) {
    if let Some(subscription) = conn.subscriptions.lock().unwrap().remove(&sub_id) {
        subscription.cancel.cancel();
    }
}

fn handle_neg_open(
    conn: &Arc<Connection>,
    store: &Arc<Store>,
    limits: &Limits,
    sub_id: String,
    filter: Filter,
    initial_message: String,
) {
    let mut capped = filter;
    capped.limit = Some(capped.capped_limit(limits.max_limit));

    let snapshot = match store.query_events_for_sync(&capped) {
        Ok(snapshot) => snapshot,
        Err(err) => {
            conn.send(neg_err(&sub_id, &err.to_string()));
            return;
        }
    };

    if let Some(old) = conn.reconciliations.lock().unwrap().remove(&sub_id) {
        old.cancel.cancel();
    }

    let mut session = match ReconciliationSession::open(&snapshot) {
        Ok(session) => session,
        Err(err) => {
            conn.send(neg_err(&sub_id, &err.to_string()));
            return;
        }
    };

    match session.reconcile(&initial_message) {
        Ok(step) => {
            if let Some(next) = step.next_message {
                conn.send(RelayMessage::NegMsg { sub_id: &sub_id, message: next }.to_json());
            }
            conn.reconciliations.lock().unwrap().insert(sub_id, session);
        }
        Err(err) => conn.send(neg_err(&sub_id, &err.to_string())),
    }
}

fn handle_neg_msg(conn: &Arc<Connection>, sub_id: String, message: String) {
    let mut sessions = conn.reconciliations.lock().unwrap();
    let Some(session) = sessions.get_mut(&sub_id) else {
        conn.send(
            RelayMessage::NegErr {
                sub_id: &sub_id,
                message: "closed: subscription not found".to_string(),
            }
            .to_json(),
        );
        return;
    };

    match session.reconcile(&message) {
        Ok(step) => match step.next_message {
            Some(next) => conn.send(RelayMessage::NegMsg { sub_id: &sub_id, message: next }.to_json()),
            None => conn.send(RelayMessage::NegMsg { sub_id: &sub_id, message: String::new() }.to_json()),
        },
        Err(err) => conn.send(neg_err(&sub_id, &err.to_string())),
    }
}

fn handle_neg_close(conn: &Arc<Connection>, sub_id: String) {
    if let Some(session) = conn.reconciliations.lock().unwrap().remove(&sub_id) {
        session.cancel.cancel();
    }
}

fn neg_err(sub_id: &str, message: &str) -> String {
    RelayMessage::NegErr {
        sub_id,
        message: format!("{}: {}", reason::ERROR, message),
    }
    .to_json()
}

fn now_secs() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::Registry;
    use crate::connection::ConnectionId;
    use crate::event::{Kind, PublicKey, Signature, Tag};
    use secp256k1::{Keypair, Message as Secp256k1Message, Secp256k1};

    fn store() -> Arc<Store> {
        let pool = crate::store::open_pool(":memory:").unwrap();
        Arc::new(Store::new(pool, 500))
    }

    fn connection() -> (Arc<Connection>, tokio::sync::mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let conn = Arc::new(Connection::new(ConnectionId::next(), tx, "ws://test".into(), 0));
        (conn, rx)
    }

    fn signed_event(kp: &Keypair, kind: u64, tags: Vec<Tag>, created_at: i64) -> Event {
        let secp = Secp256k1::new();
        let (xonly, _parity) = kp.x_only_public_key();
        let pubkey = PublicKey::from_byte_array(xonly.serialize());
        let kind = Kind::new(kind);
        let id = crate::event::EventId::new(&pubkey, created_at, kind, &tags, "hi");
        let msg = Secp256k1Message::from_digest(*id.as_bytes());
        let sig = secp.sign_schnorr(&msg, kp);
        Event {
            id,
            pubkey,
            created_at,
            kind,
            tags,
            content: "hi".to_string(),
            sig: Signature::from_hex(sig.to_string()).unwrap(),
        }
    }

    fn limits() -> Limits {
        Limits::default()
    }

    fn recv_all(rx: &mut tokio::sync::mpsc::UnboundedReceiver<String>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            out.push(frame);
        }
        out
    }

    #[tokio::test]
    async fn event_is_accepted_and_broadcastable() {
        let store = store();
        let registry = Arc::new(Registry::new());
        let (conn, mut rx) = connection();
        let secp = Secp256k1::new();
        let kp = Keypair::new(&secp, &mut rand::thread_rng());
        let event = signed_event(&kp, 1, vec![], now_secs());

        handle_event(&conn, &store, &registry, &limits(), event.clone()).await;

        let frames = recv_all(&mut rx);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].starts_with(&format!("[\"OK\",\"{}\",true", event.id.to_hex())));
        assert!(store.contains_id(&event.id).unwrap());
    }

    #[tokio::test]
    async fn duplicate_event_short_circuits_without_reverifying() {
        let store = store();
        let registry = Arc::new(Registry::new());
        let (conn, mut rx) = connection();
        let secp = Secp256k1::new();
        let kp = Keypair::new(&secp, &mut rand::thread_rng());
        let event = signed_event(&kp, 1, vec![], now_secs());

        handle_event(&conn, &store, &registry, &limits(), event.clone()).await;
        recv_all(&mut rx);
        handle_event(&conn, &store, &registry, &limits(), event.clone()).await;

        let frames = recv_all(&mut rx);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].contains("duplicate"));
    }

    #[tokio::test]
    async fn bad_signature_is_rejected() {
        let store = store();
        let registry = Arc::new(Registry::new());
        let (conn, mut rx) = connection();
        let secp = Secp256k1::new();
        let kp = Keypair::new(&secp, &mut rand::thread_rng());
        let mut event = signed_event(&kp, 1, vec![], now_secs());
        event.content = "tampered".to_string();

        handle_event(&conn, &store, &registry, &limits(), event.clone()).await;

        let frames = recv_all(&mut rx);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].contains("false"));
        assert!(frames[0].contains("invalid"));
        assert!(!store.contains_id(&event.id).unwrap());
    }

    #[tokio::test]
    async fn expired_event_is_rejected() {
        let store = store();
        let registry = Arc::new(Registry::new());
        let (conn, mut rx) = connection();
        let secp = Secp256k1::new();
        let kp = Keypair::new(&secp, &mut rand::thread_rng());
        let tags = vec![Tag::new(vec!["expiration".to_string(), "1".to_string()])];
        let event = signed_event(&kp, 1, tags, now_secs());

        handle_event(&conn, &store, &registry, &limits(), event.clone()).await;

        let frames = recv_all(&mut rx);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].contains("expired"));
        assert!(!store.contains_id(&event.id).unwrap());
    }

    #[tokio::test]
    async fn protected_event_requires_auth_first() {
        let store = store();
        let registry = Arc::new(Registry::new());
        let (conn, mut rx) = connection();
        let secp = Secp256k1::new();
        let kp = Keypair::new(&secp, &mut rand::thread_rng());
        let tags = vec![Tag::new(vec!["-".to_string()])];
        let event = signed_event(&kp, 1, tags, now_secs());

        handle_event(&conn, &store, &registry, &limits(), event.clone()).await;

        let frames = recv_all(&mut rx);
        assert_eq!(frames.len(), 2);
        assert!(frames[0].contains("auth-required"));
        assert!(frames[1].starts_with("[\"AUTH\""));
        assert!(!store.contains_id(&event.id).unwrap());
    }

    #[tokio::test]
    async fn protected_event_rejects_other_authors() {
        let store = store();
        let registry = Arc::new(Registry::new());
        let (conn, mut rx) = connection();
        let secp = Secp256k1::new();
        let kp = Keypair::new(&secp, &mut rand::thread_rng());
        let other_kp = Keypair::new(&secp, &mut rand::thread_rng());
        let (xonly, _) = other_kp.x_only_public_key();
        conn.set_authenticated_pubkey(PublicKey::from_byte_array(xonly.serialize()));

        let tags = vec![Tag::new(vec!["-".to_string()])];
        let event = signed_event(&kp, 1, tags, now_secs());

        handle_event(&conn, &store, &registry, &limits(), event.clone()).await;

        let frames = recv_all(&mut rx);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].contains("restricted"));
    }

    #[tokio::test]
    async fn deletion_event_removes_target() {
        let store = store();
        let registry = Arc::new(Registry::new());
        let (conn, mut rx) = connection();
        let secp = Secp256k1::new();
        let kp = Keypair::new(&secp, &mut rand::thread_rng());

        let target = signed_event(&kp, 1, vec![], now_secs());
        handle_event(&conn, &store, &registry, &limits(), target.clone()).await;
        recv_all(&mut rx);

        let deletion_tags = vec![Tag::new(vec!["e".to_string(), target.id.to_hex()])];
        let deletion = signed_event(&kp, 5, deletion_tags, now_secs());
        handle_event(&conn, &store, &registry, &limits(), deletion).await;

        assert!(!store.contains_id(&target.id).unwrap());
    }

    #[tokio::test]
    async fn req_rejects_new_subscription_at_cap() {
        let store = store();
        let (conn, mut rx) = connection();
        let mut limits = limits();
        limits.max_subscriptions = 1;

        handle_req(&conn, &store, &limits, "a".to_string(), vec![Filter::default()]);
        handle_req(&conn, &store, &limits, "b".to_string(), vec![Filter::default()]);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert_eq!(conn.subscriptions.lock().unwrap().len(), 1);
        assert!(conn.subscriptions.lock().unwrap().contains_key("a"));
        let frames = recv_all(&mut rx);
        assert!(frames.iter().any(|f| f.contains("max subscriptions")));
    }

    #[tokio::test]
    async fn req_allows_replacing_same_id_at_cap() {
        let store = store();
        let (conn, mut rx) = connection();
        let mut limits = limits();
        limits.max_subscriptions = 1;

        handle_req(&conn, &store, &limits, "a".to_string(), vec![Filter::default()]);
        handle_req(&conn, &store, &limits, "a".to_string(), vec![Filter::default()]);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert_eq!(conn.subscriptions.lock().unwrap().len(), 1);
        let frames = recv_all(&mut rx);
        assert!(!frames.iter().any(|f| f.contains("max subscriptions")));
    }

    #[test]
    fn req_rejects_too_many_filters() {
        let store = store();
        let (conn, mut rx) = connection();
        let mut limits = limits();
        limits.max_filters = 1;

        handle_req(
            &conn,
            &store,
            &limits,
            "a".to_string(),
            vec![Filter::default(), Filter::default()],
        );

        assert!(conn.subscriptions.lock().unwrap().is_empty());
        let frames = recv_all(&mut rx);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].starts_with("[\"CLOSED\""));
    }

    #[test]
    fn count_replies_with_event_count() {
        let store = store();
        let (conn, mut rx) = connection();

        handle_count(&conn, &store, "c".to_string(), vec![Filter::default()]);

        let frames = recv_all(&mut rx);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].starts_with("[\"COUNT\",\"c\""));
    }

    #[test]
    fn auth_accepts_matching_challenge_and_relay() {
        let (conn, mut rx) = connection();
        let secp = Secp256k1::new();
        let kp = Keypair::new(&secp, &mut rand::thread_rng());
        let challenge = conn.challenge();
        let tags = vec![
            Tag::new(vec!["challenge".to_string(), challenge]),
            Tag::new(vec!["relay".to_string(), conn.relay_url.clone()]),
        ];
        let event = signed_event(&kp, 22242, tags, now_secs());

        handle_auth(&conn, event.clone());

        assert_eq!(conn.authenticated_pubkey(), Some(event.pubkey));
        let frames = recv_all(&mut rx);
        assert!(frames[0].contains("true"));
    }

    #[test]
    fn auth_rejects_wrong_challenge() {
        let (conn, mut rx) = connection();
        let secp = Secp256k1::new();
        let kp = Keypair::new(&secp, &mut rand::thread_rng());
        let tags = vec![
            Tag::new(vec!["challenge".to_string(), "wrong".to_string()]),
            Tag::new(vec!["relay".to_string(), conn.relay_url.clone()]),
        ];
        let event = signed_event(&kp, 22242, tags, now_secs());

        handle_auth(&conn, event);

        assert!(conn.authenticated_pubkey().is_none());
        let frames = recv_all(&mut rx);
        assert!(frames[0].contains("false"));
    }

    #[tokio::test]
    async fn close_cancels_subscription() {
        let store = store();
        let (conn, _rx) = connection();
        handle_req(&conn, &store, &limits(), "a".to_string(), vec![Filter::default()]);
        let sub = conn.subscriptions.lock().unwrap().get("a").unwrap().clone();

        handle_close(&conn, "a".to_string());

        assert!(sub.cancel.is_cancelled());
        assert!(conn.subscriptions.lock().unwrap().is_empty());
    }

    #[test]
    fn neg_msg_on_unknown_subscription_reports_closed() {
        let (conn, mut rx) = connection();

        handle_neg_msg(&conn, "missing".to_string(), "00".to_string());

        let frames = recv_all(&mut rx);
        assert_eq!(frames.len(), 1);
        assert_eq!(
            frames[0],
            r#"["NEG-ERR","missing","closed: subscription not found"]"#
        );
    }

    #[test]
    fn neg_open_then_close_tears_down_session() {
        let store = store();
        let (conn, mut rx) = connection();

        handle_neg_open(
            &conn,
            &store,
            &limits(),
            "n".to_string(),
            Filter::default(),
            String::new(),
        );

        assert!(conn.reconciliations.lock().unwrap().contains_key("n"));
        let frames = recv_all(&mut rx);
        assert!(frames.is_empty() || frames.iter().all(|f| f.starts_with("[\"NEG-MSG\"")));

        handle_neg_close(&conn, "n".to_string());
        assert!(conn.reconciliations.lock().unwrap().is_empty());
    }
}
