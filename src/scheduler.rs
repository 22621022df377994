use crate::error::StoreError;
use crate::fetch::StatusFetcher;
use crate::models::{FetchOutcome, ServiceId, StatusLevel};
use crate::settings::PollSettings;
use crate::store::{Applied, DueService, ServiceStore};
use chrono::Utc;
use rocket::tokio::select;
use rocket::tokio::sync::mpsc;
use rocket::tokio::time::{MissedTickBehavior, interval};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Requests from the dashboard to the polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollCommand {
    RefreshAll,
    Refresh(ServiceId),
}

#[derive(Debug, Clone)]
pub struct PollerHandle {
    sender: mpsc::Sender<PollCommand>,
}

impl PollerHandle {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<PollCommand>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (PollerHandle { sender }, receiver)
    }

    pub async fn request(
        &self,
        command: PollCommand,
    ) -> Result<(), mpsc::error::SendError<PollCommand>> {
        self.sender.send(command).await
    }
}

#[derive(Debug)]
struct Completion {
    service: DueService,
    outcome: FetchOutcome,
}

/// Drives fetching: every tick, claims due services and fetches each on its
/// own task. Results come back over a channel and are applied here, one at a
/// time, followed by a save.
pub async fn run_polling_loop(
    store: Arc<ServiceStore>,
    fetcher: Arc<StatusFetcher>,
    settings: PollSettings,
    mut commands: mpsc::Receiver<PollCommand>,
) {
    info!(
        "Starting polling engine for {} services (tick: {:?}, timeout: {:?})",
        store.len(),
        settings.tick,
        settings.fetch_timeout
    );
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Completion>();
    let mut ticker = interval(settings.tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        select! {
            _ = ticker.tick() => {
                dispatch(store.claim_due(Utc::now()), &fetcher, &done_tx);
            }
            cmd = commands.recv() => {
                match cmd {
                    Some(PollCommand::RefreshAll) => {
                        info!("Manual refresh of all services requested");
                        dispatch(store.claim_all(), &fetcher, &done_tx);
                    }
                    Some(PollCommand::Refresh(id)) => match store.claim(id) {
                        Ok(Some(service)) => dispatch(vec![service], &fetcher, &done_tx),
                        Ok(None) => debug!("Refresh of {id} skipped; already in flight"),
                        Err(err) => warn!("Refresh request rejected: {err}"),
                    },
                    None => {
                        warn!("Polling command channel closed; stopping loop");
                        break;
                    }
                }
            }
            Some(completion) = done_rx.recv() => {
                if let Some(id) = apply(&store, completion) {
                    refetch(&store, id, &fetcher, &done_tx);
                }
            }
        }
    }
}

fn dispatch(
    services: Vec<DueService>,
    fetcher: &Arc<StatusFetcher>,
    done: &mpsc::UnboundedSender<Completion>,
) {
    for service in services {
        debug!("Fetching {} ({})", service.name, service.url);
        let fetcher = Arc::clone(fetcher);
        let done = done.clone();
        rocket::tokio::spawn(async move {
            let outcome = fetcher.fetch(&service.url).await;
            if done.send(Completion { service, outcome }).is_err() {
                debug!("Polling loop gone; dropping fetch result");
            }
        });
    }
}

fn refetch(
    store: &ServiceStore,
    id: ServiceId,
    fetcher: &Arc<StatusFetcher>,
    done: &mpsc::UnboundedSender<Completion>,
) {
    match store.claim(id) {
        Ok(Some(service)) => dispatch(vec![service], fetcher, done),
        Ok(None) => debug!("Refetch of {id} skipped; already in flight"),
        Err(err) => debug!("Refetch of {id} dropped: {err}"),
    }
}

/// Records a result and saves. Returns the id when the result was fetched from
/// a URL the service no longer has, so the caller can fetch it again.
fn apply(store: &ServiceStore, completion: Completion) -> Option<ServiceId> {
    let Completion { service, outcome } = completion;
    if matches!(
        outcome.level,
        StatusLevel::ConnectionError | StatusLevel::ParseError
    ) {
        warn!(
            "{} ({}) is {}: {}",
            service.name, service.url, outcome.level, outcome.parse_note
        );
    }

    match store.complete(&service, outcome.into()) {
        Ok(Applied::Recorded) => {
            if let Err(err) = store.save() {
                warn!("Failed to persist services: {err}");
            }
            None
        }
        Ok(Applied::Stale) => Some(service.id),
        Err(StoreError::NotFound(_)) => {
            debug!("{} was removed while in flight; result dropped", service.name);
            None
        }
        Err(err) => {
            warn!("Failed to apply result for {}: {err}", service.name);
            None
        }
    }
}
