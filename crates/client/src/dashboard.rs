//! Everything the main view shows, loaded in one pass.

use api_types::{
    fund::{FundHistory, FundSummary},
    holdings::HoldingsResponse,
    investor::Investor,
};
use tokio::sync::watch;

use crate::{
    api::ApiClient,
    error::{ClientError, Result},
    staged::{SaveOutcome, StagedValueEditor},
};

pub const DEFAULT_HISTORY_LIMIT: u32 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    Admin,
    Investor,
}

/// Which sections failed during the last [`Dashboard::load`].
#[derive(Debug, Default)]
pub struct LoadReport {
    pub failures: Vec<(&'static str, ClientError)>,
}

impl LoadReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    fn record<T>(&mut self, section: &'static str, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(section, "dashboard section failed to load: {err}");
                self.failures.push((section, err));
                None
            }
        }
    }
}

pub struct Dashboard {
    api: ApiClient,
    history_limit: u32,
    summary: Option<FundSummary>,
    holdings: Option<HoldingsResponse>,
    investors: Vec<Investor>,
    history: Vec<FundHistory>,
    identity: Option<Investor>,
    cash: StagedValueEditor<f64>,
}

impl Dashboard {
    pub fn new(api: ApiClient, history_limit: u32) -> Self {
        Self {
            api,
            history_limit,
            summary: None,
            holdings: None,
            investors: Vec::new(),
            history: Vec::new(),
            identity: None,
            cash: StagedValueEditor::new(0.0),
        }
    }

    /// Fetches every section concurrently. A failing section keeps its
    /// previous content; the others still update.
    pub async fn load(&mut self) -> LoadReport {
        let api = &self.api;
        let (summary, holdings, investors, history, cash, identity) = tokio::join!(
            api.fund_nav(),
            api.holdings_today(),
            api.investors(),
            api.fund_history(self.history_limit),
            api.cash(),
            api.me(),
        );

        let mut report = LoadReport::default();
        if let Some(summary) = report.record("nav", summary) {
            self.summary = summary;
        }
        if let Some(holdings) = report.record("holdings", holdings) {
            self.holdings = holdings;
        }
        if let Some(investors) = report.record("investors", investors) {
            self.investors = investors;
        }
        if let Some(history) = report.record("history", history) {
            self.history = history;
        }
        if let Some(cash) = report.record("cash", cash) {
            self.cash.reconcile(cash.amount);
        }
        if let Some(identity) = report.record("identity", identity) {
            self.identity = Some(identity);
        }
        report
    }

    pub fn summary(&self) -> Option<&FundSummary> {
        self.summary.as_ref()
    }

    pub fn holdings(&self) -> Option<&HoldingsResponse> {
        self.holdings.as_ref()
    }

    pub fn investors(&self) -> &[Investor] {
        &self.investors
    }

    pub fn history(&self) -> &[FundHistory] {
        &self.history
    }

    pub fn identity(&self) -> Option<&Investor> {
        self.identity.as_ref()
    }

    /// `None` until the identity is known.
    pub fn privilege(&self) -> Option<Privilege> {
        self.identity.as_ref().map(|me| {
            if me.is_admin {
                Privilege::Admin
            } else {
                Privilege::Investor
            }
        })
    }

    pub fn is_admin(&self) -> bool {
        self.privilege() == Some(Privilege::Admin)
    }

    pub fn cash(&self) -> &StagedValueEditor<f64> {
        &self.cash
    }

    pub fn cash_editor_mut(&mut self) -> &mut StagedValueEditor<f64> {
        &mut self.cash
    }

    /// Saves the staged cash amount, then reloads so the derived NAV and
    /// totals converge on the server's numbers.
    pub async fn save_cash(&mut self) -> Result<SaveOutcome> {
        if !self.is_admin() {
            return Err(ClientError::Forbidden);
        }
        let api = self.api.clone();
        let outcome = self
            .cash
            .save(|amount| async move { api.update_cash(amount).await })
            .await?;
        if outcome == SaveOutcome::Saved {
            self.load().await;
        }
        Ok(outcome)
    }

    /// Sum of the investors' current values.
    pub fn investor_totals(&self) -> f64 {
        self.investors.iter().map(|i| i.current_value).sum()
    }

    /// Reloads every time `commits` ticks, until the sender goes away.
    pub async fn follow_commits(&mut self, mut commits: watch::Receiver<u64>) {
        while commits.changed().await.is_ok() {
            tracing::debug!("holdings committed elsewhere, reloading dashboard");
            self.load().await;
        }
    }
}
