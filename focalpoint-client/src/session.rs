//! Background task owning the connection to the selected peer.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, sleep, Instant};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use focalpoint_core::{ConnectionEvent, ConnectionState, FocalError, FocalResult, Request};

use crate::config::ClientConfig;
use crate::connection::{self, PeerStream};
use crate::dispatch::Dispatcher;
use crate::state_machine::ConnectionStateMachine;

/// Everything the connection task needs.
pub(crate) struct SessionContext {
    pub peer: String,
    pub config: ClientConfig,
    pub state: Arc<Mutex<ConnectionStateMachine>>,
    pub dispatcher: Dispatcher,
    pub commands: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Request>>>,
    pub shutdown: watch::Receiver<bool>,
}

enum SessionEnd {
    Shutdown,
    Dropped(String),
}

/// Keep a connection to `ctx.peer` open until shutdown, reconnecting
/// after every drop.
pub(crate) async fn run(ctx: SessionContext) {
    let SessionContext {
        peer,
        config,
        state,
        dispatcher,
        commands,
        mut shutdown,
    } = ctx;
    let mut commands = commands.lock_owned().await;

    loop {
        if *shutdown.borrow() {
            break;
        }
        if state.lock().state() == ConnectionState::Closed {
            transition(&state, ConnectionEvent::Dial);
        }

        info!("Connecting to peer {}", peer);
        let connected = tokio::select! {
            result = connection::connect(&config, &peer) => result,
            _ = shutdown.changed() => break,
        };

        match connected {
            Ok(stream) => {
                transition(&state, ConnectionEvent::Connected);
                info!("Connected to peer {}", peer);
                let end = serve(
                    stream,
                    &mut commands,
                    &dispatcher,
                    config.ping_interval,
                    &mut shutdown,
                )
                .await;
                match end {
                    SessionEnd::Shutdown => break,
                    SessionEnd::Dropped(reason) => {
                        warn!("Connection to {} dropped: {}", peer, reason);
                        transition(&state, ConnectionEvent::Retry);
                    }
                }
            }
            Err(e) => {
                warn!("{}", e);
                transition(&state, ConnectionEvent::Dropped(e.to_string()));
            }
        }

        discard_queued(&mut commands);
        info!("Reconnecting to {} in {:?}", peer, config.reconnect_delay);
        tokio::select! {
            _ = sleep(config.reconnect_delay) => {}
            _ = shutdown.changed() => break,
        }
    }

    discard_queued(&mut commands);
    transition(&state, ConnectionEvent::Closed);
    info!("Connection to {} closed", peer);
}

async fn serve(
    stream: PeerStream,
    commands: &mut mpsc::UnboundedReceiver<Request>,
    dispatcher: &Dispatcher,
    ping_interval: Duration,
    shutdown: &mut watch::Receiver<bool>,
) -> SessionEnd {
    let (mut write, mut read) = stream.split();

    for request in [Request::GetPeerAddresses {}, Request::GetTipHeader {}] {
        if let Err(e) = send(&mut write, &request).await {
            return SessionEnd::Dropped(e.to_string());
        }
    }

    let mut ping = interval_at(Instant::now() + ping_interval, ping_interval);
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                let _ = write.send(Message::Close(None)).await;
                return SessionEnd::Shutdown;
            }
            Some(request) = commands.recv() => {
                if let Err(e) = send(&mut write, &request).await {
                    return SessionEnd::Dropped(e.to_string());
                }
            }
            _ = ping.tick() => {
                if let Err(e) = write.send(Message::Ping(Vec::new())).await {
                    return SessionEnd::Dropped(format!("ping failed: {}", e));
                }
            }
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    if let Some(reply) = dispatcher.handle_text(&text) {
                        if let Err(e) = send(&mut write, &reply).await {
                            return SessionEnd::Dropped(e.to_string());
                        }
                    }
                }
                Some(Ok(Message::Binary(_))) => debug!("Ignoring binary frame"),
                Some(Ok(Message::Close(frame))) => {
                    return SessionEnd::Dropped(format!("peer closed the connection ({:?})", frame));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return SessionEnd::Dropped(e.to_string()),
                None => return SessionEnd::Dropped("stream ended".to_string()),
            }
        }
    }
}

async fn send(write: &mut SplitSink<PeerStream, Message>, request: &Request) -> FocalResult<()> {
    let json = request.to_json()?;
    write
        .send(Message::Text(json))
        .await
        .map_err(|e| FocalError::Transport(format!("Write error: {}", e)))?;
    debug!("Sent {}", request.kind());
    Ok(())
}

/// Requests queued for a connection that is gone are not replayed.
fn discard_queued(commands: &mut mpsc::UnboundedReceiver<Request>) {
    let mut discarded = 0;
    while commands.try_recv().is_ok() {
        discarded += 1;
    }
    if discarded > 0 {
        debug!("Discarded {} queued requests", discarded);
    }
}

fn transition(state: &Mutex<ConnectionStateMachine>, event: ConnectionEvent) {
    if let Err(e) = state.lock().transition(event) {
        warn!("{}", e);
    }
}
