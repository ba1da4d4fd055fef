//! Parley simulation binary.
//!
//! Runs the production runtime against the in-memory backend with a seeded
//! random walk of user intents and peer messages, checking every sync
//! invariant on each render.
//!
//! # Usage
//!
//! ```bash
//! # Reproducible run
//! parley-sim --seed 42 --steps 200
//!
//! # Stress the dedup path
//! parley-sim --seed 7 --duplicate-delivery --self-echo merge --log-level debug
//! ```

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use chrono::TimeDelta;
use clap::{Parser, ValueEnum};
use parley_client::{Attachment, ClientConfig, Runtime, SelfEcho, SessionConfig, SessionEvent};
use parley_core::{Contact, ContactId, UserId};
use parley_harness::{InvariantRegistry, SimBackend, SimDriver, SimEnv};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Parley sync-core simulator
#[derive(Parser, Debug)]
#[command(name = "parley-sim")]
#[command(about = "Deterministic simulation of the Parley conversation sync core")]
#[command(version)]
struct Args {
    /// Seed for the environment and the intent script
    #[arg(short, long, default_value = "0")]
    seed: u64,

    /// Local user id
    #[arg(short, long, default_value = "me")]
    user: String,

    /// Number of contacts in the roster
    #[arg(long, default_value = "3")]
    contacts: usize,

    /// Messages already persisted per conversation
    #[arg(long, default_value = "5")]
    history: usize,

    /// Number of scripted steps
    #[arg(long, default_value = "50")]
    steps: usize,

    /// Handling of self-authored push events
    #[arg(long, value_enum, default_value = "drop")]
    self_echo: EchoArg,

    /// Deliver every push event twice
    #[arg(long)]
    duplicate_delivery: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum EchoArg {
    Drop,
    Merge,
}

impl From<EchoArg> for SelfEcho {
    fn from(arg: EchoArg) -> Self {
        match arg {
            EchoArg::Drop => Self::Drop,
            EchoArg::Merge => Self::Merge,
        }
    }
}

/// Wall-clock pause letting spawned completions land between steps.
const SETTLE: Duration = Duration::from_millis(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!(seed = args.seed, steps = args.steps, "parley-sim starting");
    let (seed, steps) = (args.seed, args.steps);

    let config = ClientConfig {
        session: SessionConfig { self_echo: args.self_echo.into(), ..SessionConfig::default() },
        ..ClientConfig::default()
    };

    let env = SimEnv::with_seed(args.seed);
    let user_id = UserId::new(args.user.clone());
    let contacts: Vec<Contact> = (0..args.contacts)
        .map(|i| Contact::new(format!("contact-{i}"), format!("Contact {i}")))
        .collect();

    let mut backend = SimBackend::new(env.clone())
        .with_bucket(config.attachment_bucket.clone())
        .with_feed_buffer(config.feed_buffer)
        .with_contacts(contacts.clone());
    for contact in &contacts {
        backend =
            backend.with_history(&contact.conversation_id(), &peer_of(&contact.id), args.history);
    }
    backend.set_duplicate_delivery(args.duplicate_delivery);

    let (driver, handle) = SimDriver::new();
    let driver = driver.with_invariants(InvariantRegistry::standard());
    let runtime =
        Runtime::new(Arc::new(backend.clone()), driver, env.clone(), user_id, config.session);

    let script_backend = backend.clone();
    let script = async move {
        let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(1));
        tokio::time::sleep(SETTLE).await;

        for step in 0..steps {
            env.advance(TimeDelta::seconds(30));
            let contact =
                (!contacts.is_empty()).then(|| &contacts[rng.gen_range(0..contacts.len())]);

            match (rng.gen_range(0..6), contact) {
                (0, Some(contact)) => handle.select(contact.id.clone()),
                (1, _) => handle.compose(&format!("note {step}")),
                (2, Some(contact)) => {
                    let _ = script_backend.peer_message(
                        &contact.conversation_id(),
                        &peer_of(&contact.id),
                        &format!("reply {step}"),
                    );
                },
                (3, _) => handle.compose_attachment(
                    None,
                    Attachment::new(format!("photo-{step}.png"), Bytes::from(vec![0u8; 16])),
                ),
                (4, Some(contact)) => handle.send(SessionEvent::Search {
                    query: contact.display_name.chars().take(3).collect(),
                }),
                _ => handle.send(SessionEvent::Reload),
            }
            tokio::time::sleep(SETTLE).await;
        }

        handle.close();
    };

    let (result, ()) = tokio::join!(runtime.run(), script);
    let session = result?;

    tracing::info!(
        contacts = session.contacts().len(),
        conversation = ?session.selected_conversation().map(|c| c.to_string()),
        messages = session.conversation().len(),
        pending_sends = session.composer().pending_count(),
        backend_calls = backend.calls().len(),
        "simulation finished, all invariants held"
    );

    Ok(())
}

/// Contacts write as themselves.
fn peer_of(contact_id: &ContactId) -> UserId {
    UserId::new(contact_id.as_str())
}
