//! JSON surface consumed by the dashboard.

use crate::error::StoreError;
use crate::fetch::StatusFetcher;
use crate::models::{ServiceConfig, ServiceId, ServiceSnapshot, sort_worst_first};
use crate::scheduler::{PollCommand, PollerHandle, run_polling_loop};
use crate::settings::PollSettings;
use crate::store::ServiceStore;
use chrono::{DateTime, Utc};
use rocket::fairing::AdHoc;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::serde::{Deserialize, Serialize};
use rocket::tokio::sync::mpsc;
use rocket::{Build, Rocket, State};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Serialize)]
pub struct StatusView {
    pub generated_at: DateTime<Utc>,
    pub default_refresh_interval: u32,
    pub services: Vec<ServiceSnapshot>,
}

#[derive(Debug, Deserialize)]
pub struct ServiceInput {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub refresh_interval: u32,
}

impl From<ServiceInput> for ServiceConfig {
    fn from(input: ServiceInput) -> Self {
        ServiceConfig::new(input.name, input.url, input.refresh_interval)
    }
}

#[derive(Debug, Serialize)]
pub struct Created {
    pub id: ServiceId,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

type ApiResult<T> = Result<T, (Status, Json<ApiError>)>;

fn reject(status: Status, message: impl Into<String>) -> (Status, Json<ApiError>) {
    (
        status,
        Json(ApiError {
            error: message.into(),
        }),
    )
}

impl From<StoreError> for (Status, Json<ApiError>) {
    fn from(err: StoreError) -> Self {
        let status = match err {
            StoreError::Validation(_) => Status::UnprocessableEntity,
            StoreError::IndexOutOfRange(_) | StoreError::NotFound(_) => Status::NotFound,
            StoreError::Storage(_) => Status::InternalServerError,
        };
        reject(status, err.to_string())
    }
}

fn parse_id(raw: &str) -> ApiResult<ServiceId> {
    raw.parse()
        .map_err(|_| reject(Status::NotFound, format!("unknown service {raw}")))
}

fn persist(store: &ServiceStore) {
    if let Err(err) = store.save() {
        warn!("Failed to persist services: {err}");
    }
}

async fn enqueue(poller: &PollerHandle, command: PollCommand) -> Status {
    match poller.request(command).await {
        Ok(()) => Status::Accepted,
        Err(err) => {
            error!("Failed to enqueue refresh request: {err}");
            Status::ServiceUnavailable
        }
    }
}

#[get("/api/status")]
fn status(store: &State<Arc<ServiceStore>>) -> Json<StatusView> {
    let mut services = store.list();
    sort_worst_first(&mut services);
    Json(StatusView {
        generated_at: Utc::now(),
        default_refresh_interval: store.default_interval(),
        services,
    })
}

#[get("/api/services/<id>")]
fn service(id: &str, store: &State<Arc<ServiceStore>>) -> ApiResult<Json<ServiceSnapshot>> {
    let id = parse_id(id)?;
    store
        .get(id)
        .map(Json)
        .ok_or_else(|| StoreError::NotFound(id).into())
}

#[post("/api/services", format = "json", data = "<input>")]
fn add_service(
    input: Json<ServiceInput>,
    store: &State<Arc<ServiceStore>>,
) -> ApiResult<(Status, Json<Created>)> {
    let id = store.add(input.into_inner().into())?;
    persist(store);
    Ok((Status::Created, Json(Created { id })))
}

#[put("/api/services/<id>", format = "json", data = "<input>")]
async fn update_service(
    id: &str,
    input: Json<ServiceInput>,
    store: &State<Arc<ServiceStore>>,
    poller: &State<PollerHandle>,
) -> ApiResult<Json<ServiceSnapshot>> {
    let id = parse_id(id)?;
    store.update(id, input.into_inner().into())?;
    persist(store);
    // An edit may point at a new URL; re-check right away.
    enqueue(poller, PollCommand::Refresh(id)).await;
    store
        .get(id)
        .map(Json)
        .ok_or_else(|| StoreError::NotFound(id).into())
}

#[delete("/api/services/<id>")]
fn remove_service(id: &str, store: &State<Arc<ServiceStore>>) -> ApiResult<Status> {
    let id = parse_id(id)?;
    store.remove(id)?;
    persist(store);
    Ok(Status::NoContent)
}

#[post("/api/refresh")]
async fn refresh_all(poller: &State<PollerHandle>) -> Status {
    enqueue(poller, PollCommand::RefreshAll).await
}

#[post("/api/services/<id>/refresh")]
async fn refresh_service(
    id: &str,
    store: &State<Arc<ServiceStore>>,
    poller: &State<PollerHandle>,
) -> ApiResult<Status> {
    let id = parse_id(id)?;
    if store.get(id).is_none() {
        return Err(StoreError::NotFound(id).into());
    }
    Ok(enqueue(poller, PollCommand::Refresh(id)).await)
}

pub fn routes() -> Vec<rocket::Route> {
    routes![
        status,
        service,
        add_service,
        update_service,
        remove_service,
        refresh_all,
        refresh_service
    ]
}

/// Assembles the server: routes, managed state, the polling engine started on
/// liftoff and a final save on shutdown.
pub fn build(
    store: Arc<ServiceStore>,
    fetcher: Arc<StatusFetcher>,
    settings: PollSettings,
    poller: PollerHandle,
    commands: mpsc::Receiver<PollCommand>,
) -> Rocket<Build> {
    rocket::build()
        .manage(Arc::clone(&store))
        .manage(poller)
        .mount("/", routes())
        .attach(AdHoc::on_liftoff("Polling Engine", move |_| {
            Box::pin(async move {
                rocket::tokio::spawn(run_polling_loop(store, fetcher, settings, commands));
            })
        }))
        .attach(AdHoc::on_shutdown("Persist Services", |rocket| {
            Box::pin(async move {
                if let Some(store) = rocket.state::<Arc<ServiceStore>>() {
                    info!("Saving {} services before exit", store.len());
                    persist(store);
                }
            })
        }))
}
