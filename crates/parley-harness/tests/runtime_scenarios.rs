//! End-to-end scenarios: the production runtime against the simulated backend.
//!
//! Every render is checked against the standard invariant set, so a scenario
//! that completes without a driver error also proves the sync invariants held
//! throughout.

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use parley_client::{Attachment, Runtime, SelfEcho, Session, SessionConfig, SessionEvent};
use parley_core::{Contact, ConversationId, FetchResource, SyncError};
use parley_harness::{
    BackendCall, Fault, InvariantRegistry, SessionSnapshot, SimBackend, SimDriver, SimEnv,
    SimHandle,
};

const HISTORY: usize = 3;

fn backend(env: &SimEnv) -> SimBackend {
    SimBackend::new(env.clone())
        .with_contacts(vec![Contact::new("a", "Ada"), Contact::new("b", "Bob")])
        .with_history(&"a".into(), &"a".into(), HISTORY)
        .with_history(&"b".into(), &"b".into(), HISTORY)
}

/// Run the runtime alongside `script` and return the final session.
async fn simulate<F, Fut>(
    backend: &SimBackend,
    env: SimEnv,
    config: SessionConfig,
    script: F,
) -> Session<SimEnv>
where
    F: FnOnce(SimHandle) -> Fut,
    Fut: Future<Output = ()>,
{
    let (driver, handle) = SimDriver::new();
    let runtime = Runtime::new(
        Arc::new(backend.clone()),
        driver.with_invariants(InvariantRegistry::standard()),
        env,
        "me".into(),
        config,
    );

    let run = async { tokio::join!(runtime.run(), script(handle)) };
    let (result, ()) =
        tokio::time::timeout(Duration::from_secs(60), run).await.expect("simulation timed out");
    result.expect("invariant violated")
}

fn subscribed(topic: &str) -> impl FnMut(&SessionSnapshot) -> bool {
    let topic = ConversationId::new(topic);
    move |s| s.is_subscribed_to(&topic)
}

fn has_text(text: &str) -> impl FnMut(&SessionSnapshot) -> bool {
    move |s| s.messages.iter().any(|m| m.text_content.as_deref() == Some(text))
}

/// Let every spawned task and forwarder run to completion.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

#[tokio::test(start_paused = true)]
async fn selecting_loads_history_and_goes_live() {
    let env = SimEnv::with_seed(1);
    let backend = backend(&env);
    let peer = backend.clone();

    let session = simulate(&backend, env, SessionConfig::default(), |mut handle| async move {
        handle.wait_for(|s| s.contacts.len() == 2).await;

        handle.select("a");
        let loaded = handle.wait_for(subscribed("a")).await;
        assert_eq!(loaded.messages.len(), HISTORY);
        assert!(!loaded.loading);

        peer.peer_message(&"a".into(), &"a".into(), "hello");
        let live = handle.wait_for(has_text("hello")).await;
        assert_eq!(live.messages.len(), HISTORY + 1);

        handle.close();
    })
    .await;

    let ada = session.contacts().get(&"a".into()).unwrap();
    assert_eq!(ada.last_message_preview.as_deref(), Some("hello"));
    assert_eq!(backend.active_topics(), Vec::<ConversationId>::new());
}

#[tokio::test(start_paused = true)]
async fn switching_tears_down_previous_subscription_first() {
    let env = SimEnv::with_seed(2);
    let backend = backend(&env);
    let peer = backend.clone();

    let session = simulate(&backend, env, SessionConfig::default(), |mut handle| async move {
        handle.select("a");
        handle.wait_for(subscribed("a")).await;

        handle.select("b");
        handle.wait_for(subscribed("b")).await;
        assert_eq!(peer.active_topics(), vec![ConversationId::new("b")]);

        // Nobody listens on a any more.
        peer.peer_message(&"a".into(), &"a".into(), "late on a");
        peer.peer_message(&"b".into(), &"b".into(), "fresh on b");
        let snapshot = handle.wait_for(has_text("fresh on b")).await;
        assert!(snapshot.messages.iter().all(|m| m.conversation_id.as_str() == "b"));

        settle().await;
        handle.close();
    })
    .await;

    let calls = backend.calls();
    let teardown = calls.iter().position(|c| *c == BackendCall::Unsubscribe("a".into()));
    let setup = calls.iter().position(|c| *c == BackendCall::Subscribe("b".into()));
    assert!(teardown.unwrap() < setup.unwrap());

    assert_eq!(session.conversation().conversation_id(), Some(&"b".into()));
    assert_eq!(session.conversation().len(), HISTORY + 1);
}

#[tokio::test(start_paused = true)]
async fn overtaken_page_fetch_is_dropped() {
    let env = SimEnv::with_seed(3);
    let backend = backend(&env);
    backend.delay_fetch("a".into(), Duration::from_millis(500));

    let session = simulate(&backend, env, SessionConfig::default(), |mut handle| async move {
        handle.select("a");
        handle.select("b");
        handle.wait_for(subscribed("b")).await;

        // The page of a resolves well after b is live.
        tokio::time::sleep(Duration::from_secs(1)).await;
        let snapshot = handle.latest();
        assert_eq!(snapshot.loaded, Some("b".into()));
        assert!(snapshot.messages.iter().all(|m| m.conversation_id.as_str() == "b"));

        handle.close();
    })
    .await;

    assert!(backend.calls().contains(&BackendCall::FetchMessages("a".into())));
    assert!(!backend.calls().contains(&BackendCall::Subscribe("a".into())));
    assert_eq!(session.conversation().len(), HISTORY);
}

#[tokio::test(start_paused = true)]
async fn reload_keeps_messages_pushed_while_page_was_in_flight() {
    let env = SimEnv::with_seed(15);
    let backend = backend(&env);
    let control = backend.clone();

    let session = simulate(&backend, env, SessionConfig::default(), |mut handle| async move {
        handle.select("a");
        handle.wait_for(subscribed("a")).await;

        control.delay_fetch("a".into(), Duration::from_millis(500));
        handle.send(SessionEvent::Reload);
        tokio::time::sleep(Duration::from_millis(10)).await;

        control.peer_message(&"a".into(), &"a".into(), "while reloading");
        handle.wait_for(has_text("while reloading")).await;

        // The held page predates the push.
        tokio::time::sleep(Duration::from_secs(1)).await;
        let after = handle.wait_for(|s| !s.loading).await;
        assert!(has_text("while reloading")(&after));
        assert_eq!(after.messages.len(), HISTORY + 1);

        handle.close();
    })
    .await;

    assert_eq!(session.conversation().len(), HISTORY + 1);
}

#[tokio::test(start_paused = true)]
async fn send_while_switching_lands_once_with_page() {
    let env = SimEnv::with_seed(16);
    let backend = backend(&env);
    backend.delay_fetch("b".into(), Duration::from_millis(500));

    let session = simulate(&backend, env, SessionConfig::default(), |mut handle| async move {
        handle.select("a");
        handle.wait_for(subscribed("a")).await;

        handle.select("b");
        handle.compose("early");
        let live = handle.wait_for(subscribed("b")).await;

        assert!(live.pending_sends.is_empty());
        let copies =
            live.messages.iter().filter(|m| m.text_content.as_deref() == Some("early")).count();
        assert_eq!(copies, 1);
        assert_eq!(live.messages.len(), HISTORY + 1);

        handle.close();
    })
    .await;

    assert!(session.conversation().messages().iter().all(|m| !m.is_placeholder()));
    assert_eq!(backend.messages(&"b".into()).len(), HISTORY + 1);
}

#[tokio::test(start_paused = true)]
async fn send_reconciles_with_dropped_self_echo() {
    let env = SimEnv::with_seed(4);
    let backend = backend(&env);

    let session = simulate(&backend, env, SessionConfig::default(), |mut handle| async move {
        handle.select("a");
        handle.wait_for(subscribed("a")).await;

        handle.compose("hi");
        let confirmed = handle
            .wait_for(|s| s.pending_sends.is_empty() && s.messages.len() == HISTORY + 1)
            .await;
        let sent = confirmed.messages.last().unwrap();
        assert!(!sent.is_placeholder());
        assert_eq!(sent.text_content.as_deref(), Some("hi"));

        settle().await;
        handle.close();
    })
    .await;

    assert_eq!(session.conversation().len(), HISTORY + 1);
    assert_eq!(backend.messages(&"a".into()).len(), HISTORY + 1);
}

#[tokio::test(start_paused = true)]
async fn merged_self_echo_with_duplicate_delivery_leaves_one_copy() {
    let env = SimEnv::with_seed(5);
    let backend = backend(&env);
    backend.set_duplicate_delivery(true);
    let config = SessionConfig { self_echo: SelfEcho::Merge, ..SessionConfig::default() };

    let session = simulate(&backend, env, config, |mut handle| async move {
        handle.select("a");
        handle.wait_for(subscribed("a")).await;

        handle.compose("twice");
        handle.wait_for(|s| s.pending_sends.is_empty() && has_text("twice")(s)).await;

        settle().await;
        handle.close();
    })
    .await;

    let copies = session
        .conversation()
        .messages()
        .iter()
        .filter(|m| m.text_content.as_deref() == Some("twice"))
        .count();
    assert_eq!(copies, 1);
    assert!(session.conversation().messages().iter().all(|m| !m.is_placeholder()));
}

#[tokio::test(start_paused = true)]
async fn failed_send_removes_placeholder_and_notifies() {
    let env = SimEnv::with_seed(6);
    let backend = backend(&env);
    backend.inject(Fault::SendMessage);

    simulate(&backend, env, SessionConfig::default(), |mut handle| async move {
        handle.select("a");
        handle.wait_for(subscribed("a")).await;

        handle.compose("lost");
        let failed = handle
            .wait_for(|s| !s.notifications.is_empty() && s.pending_sends.is_empty())
            .await;

        assert!(matches!(failed.notifications.last(), Some(SyncError::SendFailed { .. })));
        assert_eq!(failed.messages.len(), HISTORY);
        assert!(failed.messages.iter().all(|m| !m.is_placeholder()));

        handle.close();
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn attachment_is_uploaded_before_send() {
    let env = SimEnv::with_seed(7);
    let backend = backend(&env);

    let session = simulate(&backend, env, SessionConfig::default(), |mut handle| async move {
        handle.select("a");
        handle.wait_for(subscribed("a")).await;

        handle.compose_attachment(
            Some("look"),
            Attachment::new("cat.png", Bytes::from_static(b"\x89PNG")),
        );
        handle.wait_for(|s| s.pending_sends.is_empty() && has_text("look")(s)).await;

        settle().await;
        handle.close();
    })
    .await;

    let sent = session.conversation().messages().last().unwrap();
    let url = sent.attachment_ref.as_deref().unwrap();
    let name = url.strip_prefix("sim://message-images/").unwrap();
    assert!(name.starts_with("me-"));
    assert!(name.ends_with(".png"));
    assert_eq!(backend.object(name), Some(Bytes::from_static(b"\x89PNG")));

    let calls = backend.calls();
    let upload = calls.iter().position(|c| matches!(c, BackendCall::Upload(_)));
    let send = calls.iter().position(|c| matches!(c, BackendCall::SendMessage(_)));
    assert!(upload.unwrap() < send.unwrap());
}

#[tokio::test(start_paused = true)]
async fn failed_upload_aborts_send() {
    let env = SimEnv::with_seed(8);
    let backend = backend(&env);
    backend.inject(Fault::Upload);

    simulate(&backend, env, SessionConfig::default(), |mut handle| async move {
        handle.select("a");
        handle.wait_for(subscribed("a")).await;

        handle.compose_attachment(None, Attachment::new("cat.png", Bytes::from_static(b"x")));
        let failed = handle
            .wait_for(|s| !s.notifications.is_empty() && s.pending_sends.is_empty())
            .await;

        assert!(matches!(failed.notifications.last(), Some(SyncError::UploadFailed { .. })));
        assert_eq!(failed.messages.len(), HISTORY);

        handle.close();
    })
    .await;

    assert!(!backend.calls().iter().any(|c| matches!(c, BackendCall::SendMessage(_))));
}

#[tokio::test(start_paused = true)]
async fn empty_compose_is_rejected_without_backend_call() {
    let env = SimEnv::with_seed(9);
    let backend = backend(&env);

    simulate(&backend, env, SessionConfig::default(), |mut handle| async move {
        handle.select("a");
        handle.wait_for(subscribed("a")).await;

        handle.compose("   ");
        let rejected = handle.wait_for(|s| !s.notifications.is_empty()).await;
        assert!(matches!(rejected.notifications[0], SyncError::InvalidInput { .. }));

        handle.close();
    })
    .await;

    assert!(!backend.calls().iter().any(|c| matches!(c, BackendCall::SendMessage(_))));
}

#[tokio::test(start_paused = true)]
async fn failed_reload_keeps_thread() {
    let env = SimEnv::with_seed(10);
    let backend = backend(&env);
    let control = backend.clone();

    simulate(&backend, env, SessionConfig::default(), |mut handle| async move {
        handle.select("a");
        handle.wait_for(subscribed("a")).await;

        control.inject(Fault::FetchMessages("a".into()));
        handle.send(SessionEvent::Reload);
        let failed = handle.wait_for(|s| !s.notifications.is_empty()).await;

        assert!(matches!(
            &failed.notifications[0],
            SyncError::FetchFailed { resource: FetchResource::Messages { .. }, .. }
        ));
        let after = handle.wait_for(|s| !s.loading).await;
        assert_eq!(after.messages.len(), HISTORY);
        assert!(after.is_subscribed_to(&"a".into()));

        handle.close();
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn failed_subscription_recovers_on_reload() {
    let env = SimEnv::with_seed(11);
    let backend = backend(&env);
    backend.inject(Fault::Subscribe);
    let control = backend.clone();

    simulate(&backend, env, SessionConfig::default(), |mut handle| async move {
        handle.select("a");
        let failed = handle.wait_for(|s| !s.notifications.is_empty()).await;
        assert!(matches!(failed.notifications[0], SyncError::SubscriptionFailed { .. }));
        assert_eq!(failed.messages.len(), HISTORY);

        control.heal(&Fault::Subscribe);
        handle.send(SessionEvent::Reload);
        handle.wait_for(subscribed("a")).await;

        handle.close();
    })
    .await;

    assert_eq!(backend.active_topics(), Vec::<ConversationId>::new());
}

#[tokio::test(start_paused = true)]
async fn failed_roster_is_surfaced() {
    let env = SimEnv::with_seed(12);
    let backend = backend(&env);
    backend.inject(Fault::FetchContacts);

    let session = simulate(&backend, env, SessionConfig::default(), |mut handle| async move {
        let failed = handle.wait_for(|s| !s.notifications.is_empty()).await;
        assert!(matches!(
            failed.notifications[0],
            SyncError::FetchFailed { resource: FetchResource::Roster, .. }
        ));
        assert!(failed.contacts.is_empty());

        handle.close();
    })
    .await;

    assert!(session.contacts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn search_results_reach_session() {
    let env = SimEnv::with_seed(13);
    let backend = backend(&env);

    let session = simulate(&backend, env, SessionConfig::default(), |handle| async move {
        handle.send(SessionEvent::Search { query: "bo".into() });
        settle().await;
        handle.close();
    })
    .await;

    let results = session.search_results().unwrap();
    assert_eq!(results.query, "bo");
    assert_eq!(results.contacts, vec![Contact::new("b", "Bob")]);
}

#[tokio::test(start_paused = true)]
async fn closing_frontend_signs_out() {
    let env = SimEnv::with_seed(14);
    let backend = backend(&env);

    let session = simulate(&backend, env, SessionConfig::default(), |mut handle| async move {
        handle.select("b");
        handle.wait_for(subscribed("b")).await;
        handle.close();
    })
    .await;

    assert!(backend.calls().contains(&BackendCall::Unsubscribe("b".into())));
    assert!(backend.active_topics().is_empty());
    assert_eq!(session.subscription().active_topic(), None);
}
