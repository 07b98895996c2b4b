use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Header carrying the session token on every authenticated request.
pub const SESSION_HEADER: &str = "user-token";

pub mod auth {
    use super::*;
    use crate::investor::Investor;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct LoginRequest {
        pub identifier: String,
        pub password: String,
    }

    /// Token record issued by the server at login.
    ///
    /// The client only ever reads `token`; expiry and bookkeeping fields are
    /// kept for display and never interpreted.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct IssuedToken {
        pub id: i64,
        pub token: String,
        pub investor_id: i64,
        pub expires_at: Option<NaiveDateTime>,
        pub last_used_at: Option<NaiveDateTime>,
        pub user_agent: Option<String>,
        pub ip_address: Option<String>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct LoginResponse {
        pub investor: Investor,
        pub token: IssuedToken,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ChangePasswordRequest {
        pub old_password: String,
        pub new_password: String,
    }
}

pub mod investor {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Investor {
        pub id: i64,
        pub name: String,
        pub identifier: Option<String>,
        pub shares: f64,
        pub initial_investment: f64,
        #[serde(default)]
        pub current_value: f64,
        #[serde(default)]
        pub today_value: Option<f64>,
        #[serde(default)]
        pub is_admin: bool,
        pub created_at: Option<NaiveDateTime>,
        pub updated_at: Option<NaiveDateTime>,
    }

    impl Investor {
        /// Value of the investor's shares at the given per-share NAV.
        pub fn value_at(&self, nav: f64) -> f64 {
            self.shares * nav
        }
    }

    /// Body for `POST /investors`.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct InvestorNew {
        pub name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub identifier: Option<String>,
        pub initial_investment: f64,
        pub shares: f64,
        pub is_admin: bool,
        pub password: String,
    }

    /// Body for `PUT /investors/{id}`. Absent fields are left untouched.
    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    pub struct InvestorUpdate {
        #[serde(skip_serializing_if = "Option::is_none")]
        pub name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub identifier: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub initial_investment: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub shares: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub is_admin: Option<bool>,
    }
}

pub mod fund {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct FundSummary {
        pub date: NaiveDate,
        pub nav: f64,
        pub total_value: f64,
        pub cash: f64,
        pub change_value: Option<f64>,
        pub change_pct: Option<f64>,
    }

    /// One row of `GET /fund/history`, ordered by date.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct FundHistory {
        pub id: i64,
        pub date: NaiveDate,
        pub nav: f64,
        pub total_value: f64,
        pub change_value: Option<f64>,
        pub change_pct: Option<f64>,
        pub created_at: Option<NaiveDateTime>,
        pub updated_at: Option<NaiveDateTime>,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct CashBalance {
        pub amount: f64,
        pub created_at: Option<NaiveDateTime>,
        pub updated_at: Option<NaiveDateTime>,
    }

    /// Body for `PUT /fund/cash`.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct CashUpdate {
        pub amount: f64,
    }
}

pub mod holdings {
    use super::*;

    /// A holding that has not been persisted yet: produced by a screenshot
    /// preview and sent back verbatim on confirm.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct HoldingDraft {
        pub name: String,
        pub symbol: Option<String>,
        pub quantity: Option<f64>,
        pub cost_price: Option<f64>,
        pub market_value: f64,
    }

    /// A persisted holding row.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Holding {
        pub id: i64,
        pub name: String,
        pub symbol: Option<String>,
        pub quantity: Option<f64>,
        pub cost_price: Option<f64>,
        pub market_value: f64,
        pub weight: Option<f64>,
        pub date: Option<NaiveDate>,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct HoldingsResponse {
        pub date: NaiveDate,
        pub total_value: f64,
        pub holdings: Vec<Holding>,
    }

    /// Body for `POST /holdings/manual?overwrite=bool`.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct ManualHoldings {
        pub date: NaiveDate,
        pub holdings: Vec<HoldingDraft>,
    }

    /// Response of `POST /upload/screenshot/preview`.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct PreviewResult {
        pub date: NaiveDate,
        pub holdings_value: f64,
        pub cash: f64,
        pub total_assets: f64,
        pub nav: Option<f64>,
        pub holdings: Vec<HoldingDraft>,
    }

    impl PreviewResult {
        /// Sum of the drafted market values, independent of the server total.
        pub fn drafted_value(&self) -> f64 {
            self.holdings.iter().map(|h| h.market_value).sum()
        }

        /// NAV rendered with four decimals, or a dash when the fund has no shares.
        pub fn nav_label(&self) -> String {
            match self.nav {
                Some(nav) => format!("{nav:.4}"),
                None => "-".to_string(),
            }
        }
    }
}
