//! The session loop: a single task that owns the model and applies queued
//! events one at a time.

pub mod event;
pub mod handler;
pub mod listeners;
pub mod state;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::irc::connection::IrcConnector;
use crate::irc::SessionController;
use crate::model::{EventBus, Model};
use crate::transcript::{FileTranscriptStore, MemoryTranscriptStore, TranscriptStore};
use event::SessionEvent;
use handler::Flow;
use listeners::{AutoJoinListener, PersistenceListener};
use state::SessionState;

pub async fn run(cfg: AppConfig) -> Result<()> {
    let (event_tx, mut event_rx) = event::channel();

    let store: Arc<dyn TranscriptStore> = if cfg.storage.persist_logs {
        Arc::new(FileTranscriptStore::new(cfg.storage.logs_dir()))
    } else {
        Arc::new(MemoryTranscriptStore::new())
    };
    let bus = Arc::new(EventBus::new());
    let mut model = Model::new(Arc::clone(&bus), store);

    let accounts_dir = cfg.storage.accounts_dir();
    let loaded = model
        .load(&accounts_dir)
        .with_context(|| format!("Failed to load accounts from {}", accounts_dir.display()))?;
    info!(accounts = loaded, dir = %accounts_dir.display(), "Accounts loaded");

    bus.subscribe(Arc::new(PersistenceListener::new(event_tx.clone(), cfg.storage.persist_logs)));
    bus.subscribe(Arc::new(AutoJoinListener::new(event_tx.clone())));

    if model.is_empty() {
        let account = model.propose_next_account(cfg.account_defaults.connection_params())?;
        info!(account = %account.label(), host = %account.params.host, "Created first account");
        model.add_account(account)?;
    }

    let connector = IrcConnector::new(event_tx.clone());
    let controller = SessionController::new(model, Box::new(connector), cfg.behavior.controller_options());
    let mut state = SessionState::new(controller, accounts_dir);

    let auto_connect: Vec<_> = state
        .controller
        .model()
        .accounts()
        .filter(|a| a.auto_connect)
        .map(|a| a.id())
        .collect();
    for account in auto_connect {
        if let Err(e) = state.controller.connect(account).await {
            warn!(%account, error = %e, "Auto-connect failed");
        }
    }

    let shutdown_tx = event_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(SessionEvent::Shutdown);
        }
    });
    drop(event_tx);

    while let Some(event) = event_rx.recv().await {
        if handler::handle_event(&mut state, event).await == Flow::Quit {
            info!("Shutting down");
            break;
        }
    }

    state.shutdown();
    Ok(())
}
