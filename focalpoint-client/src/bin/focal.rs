//! focal - watch a focalpoint peer from the command line.
//!
//! Usage: `focal <host:port> [public_key]`

use std::time::Duration;

use tracing_subscriber::EnvFilter;

use focalpoint_client::{ClientConfig, FocalClient, Notification};
use focalpoint_core::format::{is_public_key, shorten_b64, shorten_hex};
use focalpoint_core::{FocalError, FocalResult};

const POLL: Duration = Duration::from_millis(250);

#[tokio::main]
async fn main() -> FocalResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let mut config = ClientConfig::from_env();
    if let Some(peer) = args.next() {
        config = config.with_peer(peer);
    }
    let public_key = args.next();
    if let Some(key) = public_key.as_deref() {
        if !is_public_key(key) {
            return Err(FocalError::Precondition(format!("not a public key: {}", key)));
        }
    }

    let client = FocalClient::new(config);
    let Some(peer) = client.start().await? else {
        eprintln!("usage: focal <host:port> [public_key]  (or set FOCAL_PEER)");
        std::process::exit(2);
    };
    tracing::info!("Watching {}", peer);

    let mut state = client.watch_state();
    let mut notifications = client.subscribe();
    let mut last_tip = None;
    let mut last_profile = None;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *state.borrow_and_update();
                tracing::info!("Connection {:?}", current);
                if current.is_open() {
                    if let Some(key) = public_key.as_deref() {
                        client.request_profile(key)?;
                        client.request_graph(key);
                    }
                }
            }
            notification = notifications.recv() => match notification {
                Some(Notification::InvView { view_ids }) => {
                    for view_id in view_ids {
                        tracing::info!("New view {}", shorten_hex(&view_id));
                    }
                }
                Some(Notification::PushConsiderationResult(result)) => {
                    tracing::info!("Push result for {}: {:?}", shorten_hex(&result.consideration_id), result.error);
                }
                Some(Notification::PublicKeyConsiderations { public_key }) => {
                    let count = client.store().considerations_for(&public_key).map_or(0, |c| c.len());
                    println!("{}: {} recent considerations", shorten_b64(&public_key), count);
                }
                None => break,
            },
            _ = tokio::time::sleep(POLL) => {}
        }

        let tip = client.store().tip();
        if tip != last_tip {
            if let Some(tip) = &tip {
                println!("tip {} at height {}", shorten_hex(&tip.view_id), tip.header.height);
                if let Some(key) = public_key.as_deref() {
                    client.request_public_key_considerations(key)?;
                }
            }
            last_tip = tip;
        }

        if let Some(key) = public_key.as_deref() {
            let profile = client.store().profile(key);
            if profile != last_profile {
                if let Some(profile) = &profile {
                    println!(
                        "{}: ranking {:.2}%, imbalance {}",
                        shorten_b64(key),
                        profile.ranking * 100.0,
                        profile.imbalance
                    );
                }
                last_profile = profile;
            }
        }
    }

    Ok(())
}
