use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use api_types::{
    SESSION_HEADER,
    auth::{LoginRequest, LoginResponse},
    fund::{CashBalance, CashUpdate, FundHistory, FundSummary},
    holdings::{Holding, HoldingsResponse, ManualHoldings, PreviewResult},
    investor::Investor,
};
use chrono::NaiveDate;
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url, multipart};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    error::{ClientError, Result},
    forms::{InvestorForm, PasswordChange},
    ingestion::UploadBatch,
    navigation::{LOGIN_PATH, Navigator, RecordingNavigator},
    session::SessionStore,
    storage::Subscription,
};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(45);
pub const MAX_HISTORY_LIMIT: u32 = 365;

/// Message used when an error response carries no readable `detail`.
const UNKNOWN_ERROR: &str = "unknown error";

/// FastAPI error body.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

/// The one response hook every guarded call goes through.
///
/// A 401 clears the session and reloads the context onto the login page.
/// Only the first 401 of a burst acts; later ones are ignored until a new
/// token is stored.
pub struct AuthInterceptor {
    session: SessionStore,
    navigator: Arc<dyn Navigator>,
    clearing: Arc<AtomicBool>,
    _rearm: Subscription,
}

impl AuthInterceptor {
    fn new(session: SessionStore, navigator: Arc<dyn Navigator>) -> Self {
        let clearing = Arc::new(AtomicBool::new(false));
        let flag = clearing.clone();
        let rearm = session.subscribe(move |token| {
            if token.is_some() {
                flag.store(false, Ordering::Release);
            }
        });
        Self {
            session,
            navigator,
            clearing,
            _rearm: rearm,
        }
    }

    /// Returns `true` when `status` is an authorization failure.
    ///
    /// `sent` is the token the failed request carried. A 401 for a token
    /// that is no longer the current one changes nothing.
    fn inspect(&self, status: StatusCode, sent: Option<&str>) -> bool {
        if status != StatusCode::UNAUTHORIZED {
            return false;
        }
        if self.session.token().as_deref() != sent {
            tracing::debug!("401 for a superseded session ignored");
            return true;
        }
        if self.clearing.swap(true, Ordering::AcqRel) {
            tracing::debug!("401 ignored, session clear already in progress");
            return true;
        }
        tracing::warn!("session rejected by server, returning to login");
        if let Err(err) = self.session.clear_token() {
            tracing::error!("failed to clear rejected session: {err}");
        }
        self.navigator.reload(LOGIN_PATH);
        true
    }
}

pub struct ApiClientBuilder {
    base_url: String,
    timeout: Duration,
    navigator: Option<Arc<dyn Navigator>>,
}

impl Default for ApiClientBuilder {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000/api".to_string(),
            timeout: DEFAULT_TIMEOUT,
            navigator: None,
        }
    }
}

impl ApiClientBuilder {
    pub fn base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Context the interceptor reloads on 401. Defaults to a
    /// [`RecordingNavigator`] sitting on `/`.
    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    pub fn build(self, session: SessionStore) -> Result<ApiClient> {
        let base_url = Url::parse(&self.base_url).map_err(|err| {
            ClientError::Validation(format!("invalid base_url {}: {err}", self.base_url))
        })?;
        let http = reqwest::Client::builder().timeout(self.timeout).build()?;
        let navigator = self
            .navigator
            .unwrap_or_else(|| Arc::new(RecordingNavigator::default()));
        let interceptor = Arc::new(AuthInterceptor::new(session.clone(), navigator));
        Ok(ApiClient {
            base_url,
            http,
            session,
            interceptor,
        })
    }
}

/// Every call to the fund API goes through here.
#[derive(Clone)]
pub struct ApiClient {
    base_url: Url,
    http: reqwest::Client,
    session: SessionStore,
    interceptor: Arc<AuthInterceptor>,
}

impl ApiClient {
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::default()
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let request = self.http.request(method, self.url(path));
        match self.session.token() {
            Some(token) => request.header(SESSION_HEADER, token),
            None => request,
        }
    }

    /// Sends through the auth interceptor.
    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let request = request.build()?;
        let sent = request
            .headers()
            .get(SESSION_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let method = request.method().clone();
        let response = self.http.execute(request).await?;
        let status = response.status();
        tracing::debug!(%method, %status, path = response.url().path(), "api response");
        if status.is_success() {
            return Ok(response);
        }
        if self.interceptor.inspect(status, sent.as_deref()) {
            return Err(ClientError::Unauthorized);
        }
        Err(error_from_response(response).await)
    }

    /// Sends without the interceptor. For the auth endpoints only.
    async fn send_unguarded(&self, request: RequestBuilder) -> Result<Response> {
        let request = request.build()?;
        let method = request.method().clone();
        let response = self.http.execute(request).await?;
        let status = response.status();
        tracing::debug!(%method, %status, path = response.url().path(), "api response (unguarded)");
        if status.is_success() {
            return Ok(response);
        }
        Err(error_from_response(response).await)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let res = self.send(self.request(Method::GET, path)).await?;
        Ok(res.json::<T>().await?)
    }

    async fn send_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let res = self.send(self.request(method, path).json(body)).await?;
        Ok(res.json::<T>().await?)
    }

    // -- Session ------------------------------------------------------------

    /// Authenticates and stores the issued token.
    ///
    /// A 401 here means wrong credentials, not an expired session: it is
    /// reported as [`ClientError::InvalidCredentials`] and never redirects.
    pub async fn login(&self, identifier: &str, password: &str) -> Result<LoginResponse> {
        let identifier = identifier.trim();
        if identifier.is_empty() || password.is_empty() {
            return Err(ClientError::Validation(
                "Identifier and password are required.".to_string(),
            ));
        }
        let payload = LoginRequest {
            identifier: identifier.to_string(),
            password: password.to_string(),
        };
        let request = self.http.post(self.url("/auth/login")).json(&payload);
        let response = match self.send_unguarded(request).await {
            Ok(response) => response,
            Err(ClientError::Rejected { status, .. }) if status == StatusCode::UNAUTHORIZED => {
                return Err(ClientError::InvalidCredentials);
            }
            Err(err) => return Err(err),
        };
        let login = response.json::<LoginResponse>().await?;
        self.session.set_token(&login.token.token)?;
        tracing::info!(investor = %login.investor.name, "logged in");
        Ok(login)
    }

    /// Best-effort server logout. The local session is cleared whatever the
    /// server answers.
    pub async fn logout(&self) -> Result<()> {
        if let Some(token) = self.session.token() {
            let request = self
                .http
                .post(self.url("/auth/logout"))
                .header(SESSION_HEADER, token);
            if let Err(err) = self.send_unguarded(request).await {
                tracing::warn!("server logout failed, clearing local session anyway: {err}");
            }
        }
        self.session.clear_token()?;
        tracing::info!("logged out");
        Ok(())
    }

    pub async fn me(&self) -> Result<Investor> {
        self.get_json("/investors/me").await
    }

    pub async fn change_password(&self, form: &PasswordChange) -> Result<Investor> {
        let payload = form.validate()?;
        self.send_json(Method::PUT, "/auth/change-password", &payload)
            .await
            .map_err(|err| match err {
                ClientError::Rejected { status, message }
                    if status == StatusCode::BAD_REQUEST && message == UNKNOWN_ERROR =>
                {
                    ClientError::Rejected {
                        status,
                        message: "Wrong old password.".to_string(),
                    }
                }
                other => other,
            })
    }

    // -- Fund ---------------------------------------------------------------

    pub async fn fund_nav(&self) -> Result<Option<FundSummary>> {
        self.get_json("/fund/nav").await
    }

    pub async fn fund_history(&self, limit: u32) -> Result<Vec<FundHistory>> {
        if !(1..=MAX_HISTORY_LIMIT).contains(&limit) {
            return Err(ClientError::Validation(format!(
                "history limit must be between 1 and {MAX_HISTORY_LIMIT}"
            )));
        }
        let res = self
            .send(self.request(Method::GET, "/fund/history").query(&[("limit", limit)]))
            .await?;
        Ok(res.json().await?)
    }

    /// Recomputes the NAV from the holdings stored for `date` (today when
    /// `None`).
    pub async fn recalculate_nav(&self, date: Option<NaiveDate>) -> Result<FundSummary> {
        let mut request = self.request(Method::POST, "/fund/recalculate");
        if let Some(date) = date {
            request = request.query(&[("holdings_date", date.format("%Y-%m-%d").to_string())]);
        }
        let res = self.send(request).await?;
        Ok(res.json().await?)
    }

    pub async fn cash(&self) -> Result<CashBalance> {
        self.get_json("/fund/cash").await
    }

    pub async fn update_cash(&self, amount: f64) -> Result<CashBalance> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(ClientError::Validation(
                "Cash must be a non-negative amount.".to_string(),
            ));
        }
        self.send_json(Method::PUT, "/fund/cash", &CashUpdate { amount })
            .await
    }

    // -- Holdings -----------------------------------------------------------

    pub async fn holdings_today(&self) -> Result<Option<HoldingsResponse>> {
        self.get_json("/holdings/today").await
    }

    pub async fn holdings_by_date(&self, date: NaiveDate) -> Result<Vec<Holding>> {
        self.get_json(&format!("/holdings/by-date/{}", date.format("%Y-%m-%d")))
            .await
    }

    /// Persists a holdings snapshot. With `overwrite`, existing rows for the
    /// same date are replaced instead of rejected.
    pub async fn submit_holdings(
        &self,
        payload: &ManualHoldings,
        overwrite: bool,
    ) -> Result<FundSummary> {
        let request = self
            .request(Method::POST, "/holdings/manual")
            .query(&[("overwrite", overwrite)])
            .json(payload);
        let res = self.send(request).await?;
        Ok(res.json().await?)
    }

    /// Uploads screenshots for recognition. Nothing is persisted server-side.
    pub async fn preview_screenshots(&self, batch: &UploadBatch) -> Result<PreviewResult> {
        batch.validate()?;
        let date = batch.trading_date().format("%Y-%m-%d").to_string();
        let mut form = multipart::Form::new().text("holdings_date", date.clone());
        for image in batch.images() {
            let part = multipart::Part::bytes(image.bytes().to_vec())
                .file_name(image.file_name().to_string())
                .mime_str(image.mime())?;
            form = form.part("files", part);
        }
        let request = self
            .request(Method::POST, "/upload/screenshot/preview")
            .query(&[("holdings_date", date)])
            .multipart(form);
        let res = self.send(request).await?;
        Ok(res.json().await?)
    }

    /// Asks the server to pull holdings from the broker account.
    pub async fn refresh_from_broker(&self) -> Result<FundSummary> {
        let res = self.send(self.request(Method::POST, "/upload/tushare")).await?;
        Ok(res.json().await?)
    }

    // -- Investors ----------------------------------------------------------

    pub async fn investors(&self) -> Result<Vec<Investor>> {
        self.get_json("/investors/").await
    }

    pub async fn create_investor(&self, form: &InvestorForm) -> Result<Investor> {
        let payload = form.to_new()?;
        self.send_json(Method::POST, "/investors/", &payload).await
    }

    pub async fn update_investor(&self, id: i64, form: &InvestorForm) -> Result<Investor> {
        let payload = form.to_update()?;
        self.send_json(Method::PUT, &format!("/investors/{id}"), &payload)
            .await
    }

    pub async fn delete_investor(&self, id: i64) -> Result<()> {
        self.send(self.request(Method::DELETE, &format!("/investors/{id}")))
            .await?;
        Ok(())
    }
}

async fn error_from_response(response: Response) -> ClientError {
    let status = response.status();
    let message = match response.json::<ErrorBody>().await {
        Ok(ErrorBody {
            detail: serde_json::Value::String(detail),
        }) => detail,
        Ok(ErrorBody { detail }) => detail.to_string(),
        Err(_) => UNKNOWN_ERROR.to_string(),
    };

    match status.as_u16() {
        403 => ClientError::Forbidden,
        404 => ClientError::NotFound,
        400..=499 => ClientError::Rejected { status, message },
        _ => ClientError::Server { status, message },
    }
}
