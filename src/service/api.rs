//! HTTP surface of the bidding core.
//!
//! The server runs on its own tokio runtime owned by [`Api`]; the service
//! loop only watches for the server's exit so a dead listener stops
//! everything else. Handlers bridge into the blocking admission path with
//! `spawn_blocking`.
//!
//! Business rejections are HTTP 200 with the recorded outcome in the body,
//! including the current floor for `below_minimum`/`conflict`, so a bidder
//! can retry immediately. Transient failures map to 5xx and are meant to be
//! retried after re-reading state.

use crate::auction::{Amount, Bid, BidderId, ItemId};
use crate::eligibility::Eligibility;
use crate::persistence::Persistence;
use crate::service::admission::{AdmissionController, ArchiveError, ListError, SubmitError};
use crate::service::session_view::SessionSnapshot;
use crate::service::LoopService;
use anyhow::{format_err, Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc};
use tokio::{runtime::Runtime, sync::oneshot};

pub struct Api {
    // dropping the runtime cancels the server task
    _runtime: Runtime,
    server_rx: oneshot::Receiver<Result<()>>,
}

impl Api {
    pub fn new<P: Persistence + 'static>(
        bind_address: SocketAddr,
        controller: Arc<AdmissionController<P>>,
    ) -> Result<Self> {
        let runtime = Runtime::new()?;

        let (tx, rx) = oneshot::channel();

        runtime.spawn(async move {
            tx.send(
                run_http_server(bind_address, controller)
                    .await
                    .context("http server failed"),
            )
            .expect("send to work");
        });

        Ok(Self {
            _runtime: runtime,
            server_rx: rx,
        })
    }
}

impl LoopService for Api {
    fn run_iteration(&mut self) -> Result<()> {
        // don't hog the cpu
        std::thread::sleep(std::time::Duration::from_millis(100));

        match self.server_rx.try_recv() {
            Ok(res) => res,
            Err(oneshot::error::TryRecvError::Empty) => Ok(()),
            Err(oneshot::error::TryRecvError::Closed) => {
                Err(format_err!("http server died without leaving a result"))
            }
        }
    }
}

async fn run_http_server<P: Persistence + 'static>(
    bind_address: SocketAddr,
    controller: Arc<AdmissionController<P>>,
) -> Result<()> {
    let app = Router::new()
        .route("/items", post(list_item::<P>))
        .route("/items/:id", get(get_state::<P>).delete(archive_item::<P>))
        .route(
            "/items/:id/bids",
            get(get_history::<P>).post(submit_bid::<P>),
        )
        .route(
            "/bidders/:id/eligibility",
            get(get_eligibility::<P>).put(put_eligibility::<P>),
        )
        .with_state(controller);

    axum::Server::try_bind(&bind_address)?
        .serve(app.into_make_service())
        .await?;

    Ok(())
}

#[derive(Debug, Deserialize)]
struct ListItemRequest {
    item: ItemId,
    starting_price: Amount,
    deadline: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct SubmitBidRequest {
    bidder: BidderId,
    amount: Amount,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
}

struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                message: self.message,
            }),
        )
            .into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}"))
    }
}

impl From<SubmitError> for ApiError {
    fn from(e: SubmitError) -> Self {
        match e {
            SubmitError::UnknownItem(_) => Self::not_found(e.to_string()),
            SubmitError::Busy(_) => Self::new(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
            SubmitError::Storage(e) => e.into(),
        }
    }
}

impl From<ListError> for ApiError {
    fn from(e: ListError) -> Self {
        match e {
            ListError::AlreadyListed(_) => Self::new(StatusCode::CONFLICT, e.to_string()),
            ListError::DeadlinePassed => Self::new(StatusCode::BAD_REQUEST, e.to_string()),
            ListError::Storage(e) => e.into(),
        }
    }
}

impl From<ArchiveError> for ApiError {
    fn from(e: ArchiveError) -> Self {
        match e {
            ArchiveError::UnknownItem(_) => Self::not_found(e.to_string()),
            ArchiveError::StillOpen(_) => Self::new(StatusCode::CONFLICT, e.to_string()),
            ArchiveError::Storage(e) => e.into(),
        }
    }
}

async fn blocking<T: Send + 'static>(
    f: impl FnOnce() -> T + Send + 'static,
) -> Result<T, ApiError> {
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::from(format_err!("blocking task failed: {e}")))
}

async fn list_item<P: Persistence + 'static>(
    State(controller): State<Arc<AdmissionController<P>>>,
    Json(request): Json<ListItemRequest>,
) -> Result<(StatusCode, Json<SessionSnapshot>), ApiError> {
    let snapshot = blocking(move || {
        controller.list_item(request.item, request.starting_price, request.deadline)
    })
    .await??;
    Ok((StatusCode::CREATED, Json(snapshot)))
}

async fn get_state<P: Persistence + 'static>(
    State(controller): State<Arc<AdmissionController<P>>>,
    Path(item): Path<ItemId>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let snapshot = blocking(move || controller.state(&item)).await??;
    snapshot
        .map(Json)
        .ok_or_else(|| ApiError::not_found("unknown item"))
}

async fn submit_bid<P: Persistence + 'static>(
    State(controller): State<Arc<AdmissionController<P>>>,
    Path(item): Path<ItemId>,
    Json(request): Json<SubmitBidRequest>,
) -> Result<Json<Bid>, ApiError> {
    let bid =
        blocking(move || controller.submit(&item, &request.bidder, request.amount)).await??;
    Ok(Json(bid))
}

async fn get_history<P: Persistence + 'static>(
    State(controller): State<Arc<AdmissionController<P>>>,
    Path(item): Path<ItemId>,
) -> Result<Json<Vec<Bid>>, ApiError> {
    let history = blocking(move || controller.history(&item)).await??;
    Ok(Json(history))
}

async fn get_eligibility<P: Persistence + 'static>(
    State(controller): State<Arc<AdmissionController<P>>>,
    Path(bidder): Path<BidderId>,
) -> Result<Json<Eligibility>, ApiError> {
    let eligibility = blocking(move || controller.eligibility(&bidder)).await??;
    Ok(Json(eligibility))
}

async fn put_eligibility<P: Persistence + 'static>(
    State(controller): State<Arc<AdmissionController<P>>>,
    Path(bidder): Path<BidderId>,
    Json(eligibility): Json<Eligibility>,
) -> Result<StatusCode, ApiError> {
    blocking(move || controller.update_eligibility(&bidder, eligibility)).await??;
    Ok(StatusCode::NO_CONTENT)
}

async fn archive_item<P: Persistence + 'static>(
    State(controller): State<Arc<AdmissionController<P>>>,
    Path(item): Path<ItemId>,
) -> Result<StatusCode, ApiError> {
    blocking(move || controller.archive(&item)).await??;
    Ok(StatusCode::NO_CONTENT)
}
