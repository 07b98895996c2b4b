//! Screenshot ingestion: preview first, persist only on explicit confirm.
//!
//! ```text
//! Idle --start_preview--> Previewing --ok--> PreviewReady --confirm--> Confirming --ok--> Idle
//!                              |                  |   ^                    |
//!                              +--err--> Idle     |   +--------err---------+
//!                                                 +--discard--> Idle
//! ```
//!
//! Confirm is only reachable through [`PendingPreview`], which exists only
//! while a preview is ready, so a commit without a preview cannot be
//! expressed.

use std::{
    future::Future,
    path::{Path, PathBuf},
};

use api_types::{
    fund::FundSummary,
    holdings::{ManualHoldings, PreviewResult},
};
use chrono::NaiveDate;
use tokio::sync::watch;

use crate::{
    api::ApiClient,
    error::{ClientError, Result},
};

/// One screenshot to upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadImage {
    file_name: String,
    bytes: Vec<u8>,
}

impl UploadImage {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("screenshot.png")
            .to_string();
        Ok(Self { file_name, bytes })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime(&self) -> &'static str {
        let ext = Path::new(&self.file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("jpg" | "jpeg") => "image/jpeg",
            Some("webp") => "image/webp",
            Some("bmp") => "image/bmp",
            _ => "image/png",
        }
    }
}

/// Screenshots plus the trading date they describe.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadBatch {
    images: Vec<UploadImage>,
    trading_date: NaiveDate,
}

impl UploadBatch {
    pub fn new(images: Vec<UploadImage>, trading_date: NaiveDate) -> Self {
        Self {
            images,
            trading_date,
        }
    }

    pub fn from_paths(paths: &[PathBuf], trading_date: NaiveDate) -> Result<Self> {
        let images = paths
            .iter()
            .map(|path| UploadImage::from_path(path))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(images, trading_date))
    }

    pub fn images(&self) -> &[UploadImage] {
        &self.images
    }

    pub fn trading_date(&self) -> NaiveDate {
        self.trading_date
    }

    pub fn validate(&self) -> Result<()> {
        if self.images.is_empty() {
            return Err(ClientError::Validation(
                "Select at least one screenshot.".to_string(),
            ));
        }
        if let Some(empty) = self.images.iter().find(|image| image.bytes.is_empty()) {
            return Err(ClientError::Validation(format!(
                "{} is empty.",
                empty.file_name
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IngestionState {
    Idle,
    Previewing,
    PreviewReady(PreviewResult),
    Confirming(PreviewResult),
}

impl IngestionState {
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Previewing | Self::Confirming(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestionAction {
    StartPreview,
    Confirm,
    Discard,
}

/// The two calls ingestion needs from the server.
pub trait HoldingsGateway: Send + Sync {
    fn preview(&self, batch: &UploadBatch)
    -> impl Future<Output = Result<PreviewResult>> + Send;

    fn commit(
        &self,
        payload: &ManualHoldings,
        overwrite: bool,
    ) -> impl Future<Output = Result<FundSummary>> + Send;
}

impl HoldingsGateway for ApiClient {
    async fn preview(&self, batch: &UploadBatch) -> Result<PreviewResult> {
        self.preview_screenshots(batch).await
    }

    async fn commit(&self, payload: &ManualHoldings, overwrite: bool) -> Result<FundSummary> {
        self.submit_holdings(payload, overwrite).await
    }
}

pub struct IngestionController<G> {
    gateway: G,
    state: IngestionState,
    commits: watch::Sender<u64>,
}

impl<G: HoldingsGateway> IngestionController<G> {
    pub fn new(gateway: G) -> Self {
        let (commits, _) = watch::channel(0);
        Self {
            gateway,
            state: IngestionState::Idle,
            commits,
        }
    }

    pub fn state(&self) -> &IngestionState {
        &self.state
    }

    pub fn preview(&self) -> Option<&PreviewResult> {
        match &self.state {
            IngestionState::PreviewReady(preview) | IngestionState::Confirming(preview) => {
                Some(preview)
            }
            _ => None,
        }
    }

    /// What the operator may do right now.
    pub fn actions(&self) -> &'static [IngestionAction] {
        match self.state {
            IngestionState::Idle => &[IngestionAction::StartPreview],
            IngestionState::PreviewReady(_) => &[
                IngestionAction::Confirm,
                IngestionAction::Discard,
                IngestionAction::StartPreview,
            ],
            IngestionState::Previewing | IngestionState::Confirming(_) => &[],
        }
    }

    /// Bumped after every successful commit. Dashboards reload on change.
    pub fn commit_signal(&self) -> watch::Receiver<u64> {
        self.commits.subscribe()
    }

    /// Uploads `batch` for recognition.
    ///
    /// An invalid batch fails before any request and leaves the state as it
    /// was. Starting from `PreviewReady` replaces the pending preview. On
    /// failure the controller is back to `Idle`.
    pub async fn start_preview(&mut self, batch: &UploadBatch) -> Result<&PreviewResult> {
        if self.state.is_busy() {
            return Err(ClientError::State("an ingestion request is already running"));
        }
        batch.validate()?;

        let mut flight = InFlight::enter(&mut self.state, IngestionState::Previewing);
        let outcome = self.gateway.preview(batch).await;
        match outcome {
            Ok(preview) => {
                tracing::info!(
                    date = %preview.date,
                    holdings = preview.holdings.len(),
                    total_assets = preview.total_assets,
                    "preview ready"
                );
                flight.settle(IngestionState::PreviewReady(preview));
            }
            Err(err) => {
                tracing::warn!("screenshot preview failed: {err}");
                flight.settle(IngestionState::Idle);
                return Err(err);
            }
        }
        drop(flight);

        match &self.state {
            IngestionState::PreviewReady(preview) => Ok(preview),
            _ => Err(ClientError::State("preview vanished after success")),
        }
    }

    /// Handle on the ready preview, if there is one.
    pub fn pending(&mut self) -> Option<PendingPreview<'_, G>> {
        matches!(self.state, IngestionState::PreviewReady(_))
            .then_some(PendingPreview { controller: self })
    }
}

/// A preview awaiting the operator's decision.
pub struct PendingPreview<'a, G> {
    controller: &'a mut IngestionController<G>,
}

impl<G: HoldingsGateway> PendingPreview<'_, G> {
    pub fn result(&self) -> Option<&PreviewResult> {
        self.controller.preview()
    }

    /// Drops the preview. Nothing is sent.
    pub fn discard(self) {
        tracing::debug!("preview discarded");
        self.controller.state = IngestionState::Idle;
    }

    /// Persists exactly the previewed holdings for the previewed date,
    /// replacing whatever the server holds for that date.
    ///
    /// On failure the preview stays pending so the operator can retry.
    pub async fn confirm(self) -> Result<FundSummary> {
        let controller = self.controller;
        let preview = match std::mem::replace(&mut controller.state, IngestionState::Idle) {
            IngestionState::PreviewReady(preview) => preview,
            other => {
                controller.state = other;
                return Err(ClientError::State("no preview to confirm"));
            }
        };
        let payload = ManualHoldings {
            date: preview.date,
            holdings: preview.holdings.clone(),
        };

        let mut flight = InFlight::enter(
            &mut controller.state,
            IngestionState::Confirming(preview),
        );
        match controller.gateway.commit(&payload, true).await {
            Ok(summary) => {
                tracing::info!(date = %summary.date, nav = summary.nav, "holdings committed");
                flight.settle(IngestionState::Idle);
                drop(flight);
                controller.commits.send_modify(|n| *n += 1);
                Ok(summary)
            }
            Err(err) => {
                tracing::warn!("holdings commit failed: {err}");
                // unsettled: rolls back to PreviewReady
                drop(flight);
                Err(err)
            }
        }
    }
}

/// Holds the controller in a busy state for the duration of one request.
///
/// If the request future is dropped before it settles, the state rolls back:
/// `Previewing` to `Idle`, `Confirming(p)` to `PreviewReady(p)`.
struct InFlight<'a> {
    state: &'a mut IngestionState,
    settled: bool,
}

impl<'a> InFlight<'a> {
    fn enter(state: &'a mut IngestionState, busy: IngestionState) -> Self {
        *state = busy;
        Self {
            state,
            settled: false,
        }
    }

    fn settle(&mut self, next: IngestionState) {
        *self.state = next;
        self.settled = true;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let rollback = match std::mem::replace(self.state, IngestionState::Idle) {
            IngestionState::Confirming(preview) => IngestionState::PreviewReady(preview),
            _ => IngestionState::Idle,
        };
        *self.state = rollback;
    }
}
