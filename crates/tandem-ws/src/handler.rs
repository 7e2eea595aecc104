use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tandem_core::registry::ConnectionHandle;
use tandem_core::AppState;
use tandem_models::gateway::{ClientEvent, ServerEvent};
use tandem_models::{RoomId, UserId};
use tandem_util::validation::validate_message_content;
use tokio::sync::mpsc;

use crate::session::Session;

/// Close code sent to a connection displaced by a newer login.
const CLOSE_SUPERSEDED: u16 = 4000;

enum Flow {
    Continue,
    Close,
}

pub async fn handle_connection(
    socket: WebSocket,
    state: AppState,
    auth_user: UserId,
    typing_limiter: crate::TypingLimiter,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ServerEvent>();
    let mut session: Option<Session> = None;

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let event = match serde_json::from_str::<ClientEvent>(&text) {
                            Ok(event) => event,
                            Err(err) => {
                                let _ = event_tx.send(ServerEvent::Error {
                                    context: "parse".into(),
                                    message: err.to_string(),
                                });
                                continue;
                            }
                        };
                        if matches!(event, ClientEvent::TypingStart { .. } | ClientEvent::TypingStop { .. })
                            && typing_limiter.check_key(&auth_user.0).is_err()
                        {
                            tracing::debug!(%auth_user, "typing rate limited (silent drop)");
                            continue;
                        }
                        match dispatch_client_event(&state, auth_user, &mut session, &event_tx, event).await {
                            Flow::Continue => {}
                            Flow::Close => break,
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        tracing::debug!(%auth_user, "websocket receive error: {err}");
                        break;
                    }
                }
            }
            outbound = event_rx.recv() => {
                let Some(event) = outbound else { break };
                let superseded = matches!(event, ServerEvent::Superseded);
                let payload = match serde_json::to_string(&event) {
                    Ok(payload) => payload,
                    Err(err) => {
                        tracing::warn!("failed to serialize gateway event: {err}");
                        continue;
                    }
                };
                if ws_tx.send(Message::Text(payload.into())).await.is_err() {
                    break;
                }
                if superseded {
                    let _ = ws_tx
                        .send(Message::Close(Some(CloseFrame {
                            code: CLOSE_SUPERSEDED,
                            reason: "superseded".into(),
                        })))
                        .await;
                    break;
                }
            }
        }
    }

    // Unregister and drop all memberships in one synchronous sweep, no await
    // between the two maps. A superseded connection no longer owns the
    // registry entry and must leave the replacement's state alone.
    if let Some(session) = session {
        if state.registry.unregister(session.user_id, session.conn_id) {
            state.rooms.leave_all(session.user_id);
            tracing::info!(user_id = %session.user_id, "gateway connection closed");
        }
    }
}

fn reject(event_tx: &mpsc::UnboundedSender<ServerEvent>, context: &str, message: impl Into<String>) {
    let _ = event_tx.send(ServerEvent::Error {
        context: context.into(),
        message: message.into(),
    });
}

/// True when the caller's active pairing authorizes the given room.
async fn authorized_room(state: &AppState, user_id: UserId, room_id: RoomId) -> Result<bool, ()> {
    match state.directory.active_pairing(user_id).await {
        Ok(pairing) => Ok(pairing.is_some_and(|p| p.room_id == room_id)),
        Err(err) => {
            tracing::warn!(%user_id, "pairing lookup failed: {err}");
            Err(())
        }
    }
}

/// One inbound gateway event. Socket-free so session flows are testable by
/// driving events straight through it.
async fn dispatch_client_event(
    state: &AppState,
    auth_user: UserId,
    session: &mut Option<Session>,
    event_tx: &mpsc::UnboundedSender<ServerEvent>,
    event: ClientEvent,
) -> Flow {
    match event {
        ClientEvent::Login {
            user_id,
            user_name,
            is_reconnection,
        } => {
            if user_id != auth_user {
                reject(event_tx, "login", "user id does not match the token subject");
                return Flow::Continue;
            }
            let handle = ConnectionHandle::new(user_name.clone(), event_tx.clone());
            let conn_id = handle.conn_id;
            if let Some(old) = state.registry.register(user_id, handle) {
                if !old.sender.same_channel(event_tx) {
                    old.send(ServerEvent::Superseded);
                }
            }
            *session = Some(Session::new(user_id, user_name, conn_id));
            tracing::info!(%user_id, is_reconnection, "gateway login");
        }
        ClientEvent::JoinRoom {
            room_id,
            user_id,
            is_reconnection,
        } => {
            let Some(session) = session.as_ref() else {
                reject(event_tx, "joinRoom", "not logged in");
                return Flow::Continue;
            };
            if user_id != session.user_id {
                reject(event_tx, "joinRoom", "user id does not match this session");
                return Flow::Continue;
            }
            match authorized_room(state, user_id, room_id).await {
                Ok(true) => {}
                Ok(false) => {
                    reject(event_tx, "joinRoom", "no active pairing for this room");
                    return Flow::Continue;
                }
                Err(()) => {
                    reject(event_tx, "joinRoom", "pairing lookup failed");
                    return Flow::Continue;
                }
            }
            state.rooms.join(room_id, user_id);
            let verb = if is_reconnection { "reconnected" } else { "logged in" };
            state
                .router
                .broadcast_alarm(room_id, user_id, format!("{} {verb}", session.user_name));
            if is_reconnection {
                let _ = event_tx.send(ServerEvent::ReconnectComplete { room_id });
            }
        }
        ClientEvent::RequestMissed {
            room_id,
            user_id,
            last_seen,
        } => {
            let Some(session) = session.as_ref() else {
                reject(event_tx, "requestMissed", "not logged in");
                return Flow::Continue;
            };
            if user_id != session.user_id {
                reject(event_tx, "requestMissed", "user id does not match this session");
                return Flow::Continue;
            }
            match authorized_room(state, user_id, room_id).await {
                Ok(true) => {
                    if let Err(err) = state.router.replay_missed(room_id, user_id, last_seen).await {
                        tracing::warn!(%user_id, %room_id, "replay failed: {err}");
                        reject(event_tx, "requestMissed", "replay failed");
                    }
                }
                Ok(false) => reject(event_tx, "requestMissed", "no active pairing for this room"),
                Err(()) => reject(event_tx, "requestMissed", "pairing lookup failed"),
            }
        }
        ClientEvent::SendMessage {
            room_id,
            sender_id,
            content,
            kind,
            attachments,
        } => {
            let Some(session) = session.as_ref() else {
                reject(event_tx, "sendMessage", "not logged in");
                return Flow::Continue;
            };
            if sender_id != session.user_id {
                reject(event_tx, "sendMessage", "sender id does not match this session");
                return Flow::Continue;
            }
            if let Err(err) = validate_message_content(&content) {
                reject(event_tx, "sendMessage", err.to_string());
                return Flow::Continue;
            }
            match authorized_room(state, sender_id, room_id).await {
                Ok(true) => {}
                Ok(false) => {
                    reject(event_tx, "sendMessage", "no active pairing for this room");
                    return Flow::Continue;
                }
                Err(()) => {
                    reject(event_tx, "sendMessage", "pairing lookup failed");
                    return Flow::Continue;
                }
            }
            if let Err(err) = state
                .router
                .send_durable(room_id, sender_id, &content, kind, &attachments)
                .await
            {
                tracing::warn!(%sender_id, %room_id, "durable send failed: {err}");
                let _ = event_tx.send(ServerEvent::SendRejected {
                    room_id,
                    reason: "message could not be stored".into(),
                });
            }
        }
        ClientEvent::TypingStart { room_id } | ClientEvent::TypingStop { room_id } => {
            // Ephemeral; unauthorized or unjoined typing is dropped quietly.
            let Some(session) = session.as_ref() else {
                return Flow::Continue;
            };
            if !state.rooms.contains(room_id, session.user_id) {
                return Flow::Continue;
            }
            let started = matches!(event, ClientEvent::TypingStart { .. });
            state.router.broadcast_typing(room_id, session.user_id, started);
        }
        ClientEvent::Logout => return Flow::Close,
    }
    Flow::Continue
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, Utc};
    use std::sync::Arc;
    use tandem_core::error::CoreError;
    use tandem_core::router::MessageRouter;
    use tandem_core::store::MessageStore;
    use tandem_core::AppConfig;
    use tandem_models::message::{MessageKind, StoredMessage};
    use tandem_models::pairing::PairingStatus;

    const ALICE: UserId = UserId(1);
    const BOB: UserId = UserId(2);
    const ROOM: RoomId = RoomId(77);

    async fn test_state() -> AppState {
        let pool = tandem_db::create_pool("sqlite::memory:", 1).await.unwrap();
        tandem_db::run_migrations(&pool).await.unwrap();
        tandem_db::users::create_user(&pool, ALICE.0, "alice", "Alice", "x")
            .await
            .unwrap();
        tandem_db::users::create_user(&pool, BOB.0, "bob", "Bob", "x")
            .await
            .unwrap();
        tandem_db::pairings::create_pairing(&pool, ROOM.0, ALICE.0, BOB.0)
            .await
            .unwrap();
        tandem_db::pairings::resolve_pairing(&pool, ROOM.0, BOB.0, PairingStatus::Accepted)
            .await
            .unwrap()
            .unwrap();
        AppState::new(
            pool,
            AppConfig {
                jwt_secret: "test-secret".into(),
                ..Default::default()
            },
        )
    }

    struct Client {
        user: UserId,
        session: Option<Session>,
        tx: mpsc::UnboundedSender<ServerEvent>,
        rx: mpsc::UnboundedReceiver<ServerEvent>,
    }

    impl Client {
        fn new(user: UserId) -> Self {
            let (tx, rx) = mpsc::unbounded_channel();
            Self {
                user,
                session: None,
                tx,
                rx,
            }
        }

        async fn drive(&mut self, state: &AppState, event: ClientEvent) {
            dispatch_client_event(state, self.user, &mut self.session, &self.tx, event).await;
        }

        async fn login_and_join(&mut self, state: &AppState, name: &str, reconnection: bool) {
            self.drive(
                state,
                ClientEvent::Login {
                    user_id: self.user,
                    user_name: name.into(),
                    is_reconnection: reconnection,
                },
            )
            .await;
            self.drive(
                state,
                ClientEvent::JoinRoom {
                    room_id: ROOM,
                    user_id: self.user,
                    is_reconnection: reconnection,
                },
            )
            .await;
        }

        fn recv(&mut self) -> Option<ServerEvent> {
            self.rx.try_recv().ok()
        }

        /// Simulate a transport close for this client.
        fn disconnect(&mut self, state: &AppState) {
            if let Some(session) = self.session.take() {
                if state.registry.unregister(session.user_id, session.conn_id) {
                    state.rooms.leave_all(session.user_id);
                }
            }
        }
    }

    #[tokio::test]
    async fn two_member_room_send_and_receive() {
        let state = test_state().await;
        let mut alice = Client::new(ALICE);
        let mut bob = Client::new(BOB);
        alice.login_and_join(&state, "Alice", false).await;
        bob.login_and_join(&state, "Bob", false).await;

        // Alice sees Bob's login alarm.
        match alice.recv().unwrap() {
            ServerEvent::SystemAlarm { content, .. } => assert_eq!(content, "Bob logged in"),
            other => panic!("unexpected event: {other:?}"),
        }

        alice
            .drive(
                &state,
                ClientEvent::SendMessage {
                    room_id: ROOM,
                    sender_id: ALICE,
                    content: "hi".into(),
                    kind: MessageKind::Text,
                    attachments: vec![],
                },
            )
            .await;

        match bob.recv().unwrap() {
            ServerEvent::RoomMessage {
                sender, content, ..
            } => {
                assert_eq!(sender, ALICE);
                assert_eq!(content, "hi");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(alice.recv().is_none());
    }

    #[tokio::test]
    async fn login_with_foreign_user_id_is_rejected() {
        let state = test_state().await;
        let mut alice = Client::new(ALICE);
        alice
            .drive(
                &state,
                ClientEvent::Login {
                    user_id: BOB,
                    user_name: "Bob".into(),
                    is_reconnection: false,
                },
            )
            .await;
        assert!(matches!(
            alice.recv().unwrap(),
            ServerEvent::Error { context, .. } if context == "login"
        ));
        assert!(!state.registry.is_online(BOB));
    }

    #[tokio::test]
    async fn join_without_matching_pairing_is_rejected() {
        let state = test_state().await;
        let mut alice = Client::new(ALICE);
        alice
            .drive(
                &state,
                ClientEvent::Login {
                    user_id: ALICE,
                    user_name: "Alice".into(),
                    is_reconnection: false,
                },
            )
            .await;
        alice
            .drive(
                &state,
                ClientEvent::JoinRoom {
                    room_id: RoomId(999),
                    user_id: ALICE,
                    is_reconnection: false,
                },
            )
            .await;
        assert!(matches!(
            alice.recv().unwrap(),
            ServerEvent::Error { context, .. } if context == "joinRoom"
        ));
        assert!(state.rooms.members(RoomId(999)).is_empty());
    }

    #[tokio::test]
    async fn typing_start_stop_ordering_reaches_partner() {
        let state = test_state().await;
        let mut alice = Client::new(ALICE);
        let mut bob = Client::new(BOB);
        alice.login_and_join(&state, "Alice", false).await;
        bob.login_and_join(&state, "Bob", false).await;
        alice.recv(); // Bob's login alarm

        bob.drive(&state, ClientEvent::TypingStart { room_id: ROOM }).await;
        bob.drive(&state, ClientEvent::TypingStop { room_id: ROOM }).await;

        assert_eq!(
            alice.recv().unwrap(),
            ServerEvent::PartnerTyping { room_id: ROOM }
        );
        assert_eq!(
            alice.recv().unwrap(),
            ServerEvent::PartnerStopTyping { room_id: ROOM }
        );
        assert!(bob.recv().is_none());
    }

    #[tokio::test]
    async fn reconnect_replays_missed_messages_in_order() {
        let state = test_state().await;
        let mut alice = Client::new(ALICE);
        let mut bob = Client::new(BOB);
        alice.login_and_join(&state, "Alice", false).await;
        bob.login_and_join(&state, "Bob", false).await;
        alice.recv(); // Bob's login alarm

        let last_seen: DateTime<Utc> = Utc::now() - Duration::minutes(5);
        bob.disconnect(&state);
        assert!(!state.registry.is_online(BOB));
        assert!(!state.rooms.contains(ROOM, BOB));

        for content in ["first", "second"] {
            alice
                .drive(
                    &state,
                    ClientEvent::SendMessage {
                        room_id: ROOM,
                        sender_id: ALICE,
                        content: content.into(),
                        kind: MessageKind::Text,
                        attachments: vec![],
                    },
                )
                .await;
        }

        // Typing while Bob is away leaves no trace for replay.
        alice.drive(&state, ClientEvent::TypingStart { room_id: ROOM }).await;

        let mut bob = Client::new(BOB);
        bob.login_and_join(&state, "Bob", true).await;

        match alice.recv().unwrap() {
            ServerEvent::SystemAlarm { content, .. } => assert_eq!(content, "Bob reconnected"),
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(
            bob.recv().unwrap(),
            ServerEvent::ReconnectComplete { room_id: ROOM }
        );

        bob.drive(
            &state,
            ClientEvent::RequestMissed {
                room_id: ROOM,
                user_id: BOB,
                last_seen,
            },
        )
        .await;

        match bob.recv().unwrap() {
            ServerEvent::MissedMessages { room_id, events } => {
                assert_eq!(room_id, ROOM);
                let contents: Vec<&str> = events.iter().map(|e| e.content.as_str()).collect();
                assert_eq!(contents, vec!["first", "second"]);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(bob.recv().is_none());
    }

    #[tokio::test]
    async fn second_login_supersedes_the_first() {
        let state = test_state().await;
        let mut first = Client::new(ALICE);
        first.login_and_join(&state, "Alice", false).await;
        let first_conn = first.session.as_ref().unwrap().conn_id;

        let mut second = Client::new(ALICE);
        second
            .drive(
                &state,
                ClientEvent::Login {
                    user_id: ALICE,
                    user_name: "Alice".into(),
                    is_reconnection: true,
                },
            )
            .await;

        assert_eq!(first.recv().unwrap(), ServerEvent::Superseded);
        // The displaced connection's cleanup must not evict the new session.
        assert!(!state.registry.unregister(ALICE, first_conn));
        assert!(state.registry.is_online(ALICE));
    }

    struct FailStore;

    #[async_trait]
    impl MessageStore for FailStore {
        async fn append(
            &self,
            _room_id: RoomId,
            _sender_id: UserId,
            _content: &str,
            _kind: MessageKind,
            _attachments: &[String],
        ) -> Result<StoredMessage, CoreError> {
            Err(CoreError::Internal("store unavailable".into()))
        }

        async fn query_after(
            &self,
            _room_id: RoomId,
            _after: DateTime<Utc>,
        ) -> Result<Vec<StoredMessage>, CoreError> {
            Err(CoreError::Internal("store unavailable".into()))
        }
    }

    #[tokio::test]
    async fn store_failure_acks_sender_with_rejection() {
        let mut state = test_state().await;
        state.store = Arc::new(FailStore);
        state.router = Arc::new(MessageRouter::new(
            state.registry.clone(),
            state.rooms.clone(),
            state.store.clone(),
        ));

        let mut alice = Client::new(ALICE);
        let mut bob = Client::new(BOB);
        alice.login_and_join(&state, "Alice", false).await;
        bob.login_and_join(&state, "Bob", false).await;
        alice.recv(); // Bob's login alarm

        alice
            .drive(
                &state,
                ClientEvent::SendMessage {
                    room_id: ROOM,
                    sender_id: ALICE,
                    content: "hi".into(),
                    kind: MessageKind::Text,
                    attachments: vec![],
                },
            )
            .await;

        assert!(matches!(
            alice.recv().unwrap(),
            ServerEvent::SendRejected { room_id, .. } if room_id == ROOM
        ));
        assert!(bob.recv().is_none());
    }

    #[test]
    fn typing_limiter_counts_each_user_separately() {
        use governor::{Quota, RateLimiter};
        use std::num::NonZeroU32;

        let limiter: crate::TypingLimiter = Arc::new(RateLimiter::keyed(Quota::per_minute(
            NonZeroU32::new(2).unwrap(),
        )));

        assert!(limiter.check_key(&ALICE.0).is_ok());
        assert!(limiter.check_key(&ALICE.0).is_ok());
        // Alice exhausted her quota; Bob's is untouched.
        assert!(limiter.check_key(&ALICE.0).is_err());
        assert!(limiter.check_key(&BOB.0).is_ok());
    }
}
