//! Property-based simulation: random intent scripts against the full runtime.
//!
//! Each case builds a paused-clock tokio runtime, so interleavings depend only
//! on the generated script.

use std::{sync::Arc, time::Duration};

use parley_client::{Runtime, SelfEcho, SessionConfig, SessionEvent};
use parley_core::{Contact, ConversationId, UserId};
use parley_harness::{Fault, InvariantRegistry, SimBackend, SimDriver, SimEnv};
use proptest::prelude::*;

const CONTACTS: [&str; 3] = ["a", "b", "c"];

#[derive(Debug, Clone)]
enum Step {
    Select(usize),
    Clear,
    Compose,
    Peer(usize),
    Reload,
    FailSends(bool),
    SlowFetch(usize),
    Pause(u64),
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        3 => (0..CONTACTS.len()).prop_map(Step::Select),
        1 => Just(Step::Clear),
        3 => Just(Step::Compose),
        3 => (0..CONTACTS.len()).prop_map(Step::Peer),
        1 => Just(Step::Reload),
        1 => any::<bool>().prop_map(Step::FailSends),
        1 => (0..CONTACTS.len()).prop_map(Step::SlowFetch),
        2 => (0u64..50).prop_map(Step::Pause),
    ]
}

fn run_script(seed: u64, merge: bool, steps: Vec<Step>) -> Result<(), String> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()
        .map_err(|e| e.to_string())?;

    rt.block_on(async move {
        let env = SimEnv::with_seed(seed);
        let mut backend = SimBackend::new(env.clone())
            .with_contacts(CONTACTS.iter().map(|id| Contact::new(*id, id.to_uppercase())).collect());
        for id in CONTACTS {
            backend = backend.with_history(&id.into(), &id.into(), 2);
        }
        backend.set_duplicate_delivery(seed % 2 == 0);

        let config = SessionConfig {
            self_echo: if merge { SelfEcho::Merge } else { SelfEcho::Drop },
            ..SessionConfig::default()
        };
        let (driver, handle) = SimDriver::new();
        let runtime = Runtime::new(
            Arc::new(backend.clone()),
            driver.with_invariants(InvariantRegistry::standard()),
            env,
            UserId::new("me"),
            config,
        );

        let script = async move {
            for (n, step) in steps.into_iter().enumerate() {
                match step {
                    Step::Select(i) => handle.select(CONTACTS[i]),
                    Step::Clear => handle.send(SessionEvent::ClearSelection),
                    Step::Compose => handle.compose(&format!("note {n}")),
                    Step::Peer(i) => {
                        let conversation = ConversationId::new(CONTACTS[i]);
                        backend.peer_message(&conversation, &CONTACTS[i].into(), "reply");
                    },
                    Step::Reload => handle.send(SessionEvent::Reload),
                    Step::FailSends(true) => backend.inject(Fault::SendMessage),
                    Step::FailSends(false) => backend.heal(&Fault::SendMessage),
                    Step::SlowFetch(i) => {
                        backend.delay_fetch(CONTACTS[i].into(), Duration::from_millis(20));
                    },
                    Step::Pause(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
                }
                tokio::task::yield_now().await;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
            handle.close();
        };

        let (result, ()) = tokio::join!(runtime.run(), script);
        let session = result.map_err(|e| e.to_string())?;

        if session.composer().pending_count() != 0 {
            return Err(format!("{} sends never resolved", session.composer().pending_count()));
        }
        Ok(())
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_runtime_upholds_invariants(
        seed in any::<u64>(),
        merge in any::<bool>(),
        steps in prop::collection::vec(step_strategy(), 1..40),
    ) {
        if let Err(failure) = run_script(seed, merge, steps) {
            prop_assert!(false, "{}", failure);
        }
    }
}
