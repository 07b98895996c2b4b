//! In-process stand-in for the fund API, served over a real socket.

#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard},
};

use axum::{
    Json, Router,
    extract::{Multipart, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post, put},
};
use serde_json::{Value, json};

pub const ADMIN_IDENTIFIER: &str = "admin";
pub const ADMIN_PASSWORD: &str = "secret";
pub const TOTAL_SHARES: f64 = 100.0;

type ApiError = (StatusCode, Json<Value>);

#[derive(Debug, Default)]
pub struct Books {
    pub tokens: HashSet<String>,
    pub issued: u64,
    pub cash: f64,
    /// Persisted holdings per date.
    pub holdings: HashMap<String, Vec<Value>>,
    /// Every manual commit as (date, holdings, overwrite).
    pub commits: Vec<(String, Vec<Value>, bool)>,
    pub preview_calls: usize,
    pub preview_dates: Vec<String>,
    pub preview_files: Vec<String>,
    pub logout_calls: usize,
    pub unauthorized: usize,
    pub cash_updates: usize,
    /// Number of upcoming cash updates answered with 500.
    pub fail_cash_updates: usize,
    /// Number of upcoming manual commits answered with 500.
    pub fail_commits: usize,
}

#[derive(Clone, Default)]
pub struct FakeApi {
    books: Arc<Mutex<Books>>,
}

impl FakeApi {
    pub fn books(&self) -> MutexGuard<'_, Books> {
        self.books.lock().unwrap()
    }

    /// Invalidates every issued token.
    pub fn revoke_all(&self) {
        self.books().tokens.clear();
    }

    /// Issues a token directly, as if another client had logged in.
    pub fn issue_token(&self) -> String {
        let mut books = self.books();
        books.issued += 1;
        let token = format!("tok-{}", books.issued);
        books.tokens.insert(token.clone());
        token
    }
}

/// Starts the fake API and returns its base url (`http://addr/api`).
pub async fn spawn() -> (String, FakeApi) {
    let api = FakeApi::default();
    let app = Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/change-password", put(change_password))
        .route("/api/investors/me", get(me))
        .route("/api/investors/", get(investors))
        .route("/api/fund/nav", get(nav))
        .route("/api/fund/history", get(history))
        .route("/api/fund/cash", get(cash).put(update_cash))
        .route("/api/holdings/today", get(holdings_today))
        .route("/api/holdings/manual", post(manual))
        .route("/api/upload/screenshot/preview", post(preview))
        .route("/api/investors/{id}", put(update_investor))
        .with_state(api.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/api"), api)
}

fn detail(status: StatusCode, message: &str) -> ApiError {
    (status, Json(json!({ "detail": message })))
}

fn authorize(books: &mut Books, headers: &HeaderMap) -> Result<(), ApiError> {
    let token = headers.get("user-token").and_then(|v| v.to_str().ok());
    match token {
        Some(token) if books.tokens.contains(token) => Ok(()),
        _ => {
            books.unauthorized += 1;
            Err(detail(StatusCode::UNAUTHORIZED, "Invalid or expired token"))
        }
    }
}

fn admin() -> Value {
    json!({
        "id": 1,
        "name": "Admin",
        "identifier": ADMIN_IDENTIFIER,
        "shares": TOTAL_SHARES,
        "initial_investment": 100.0,
        "current_value": 170.0,
        "is_admin": true,
        "created_at": "2024-01-01T00:00:00",
        "updated_at": null
    })
}

fn latest(books: &Books) -> Option<(String, f64)> {
    books
        .holdings
        .iter()
        .max_by(|a, b| a.0.cmp(b.0))
        .map(|(date, rows)| {
            let value = rows
                .iter()
                .filter_map(|row| row["market_value"].as_f64())
                .sum();
            (date.clone(), value)
        })
}

fn summary(books: &Books) -> Option<Value> {
    let (date, holdings_value) = latest(books)?;
    let total = holdings_value + books.cash;
    Some(json!({
        "date": date,
        "nav": total / TOTAL_SHARES,
        "total_value": total,
        "cash": books.cash,
        "change_value": null,
        "change_pct": null
    }))
}

async fn login(
    State(api): State<FakeApi>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    if body["identifier"] != ADMIN_IDENTIFIER || body["password"] != ADMIN_PASSWORD {
        return Err(detail(StatusCode::UNAUTHORIZED, "Invalid credentials"));
    }
    let token = api.issue_token();
    Ok(Json(json!({
        "investor": admin(),
        "token": {
            "id": 1,
            "token": token,
            "investor_id": 1,
            "expires_at": "2099-01-01T00:00:00",
            "last_used_at": null,
            "user_agent": null,
            "ip_address": null
        }
    })))
}

async fn logout(State(api): State<FakeApi>, headers: HeaderMap) -> Result<Json<Value>, ApiError> {
    let mut books = api.books();
    books.logout_calls += 1;
    let token = headers
        .get("user-token")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    if books.tokens.remove(&token) {
        Ok(Json(json!({ "message": "Logged out successfully" })))
    } else {
        Err(detail(StatusCode::BAD_REQUEST, "Invalid token"))
    }
}

async fn me(State(api): State<FakeApi>, headers: HeaderMap) -> Result<Json<Value>, ApiError> {
    authorize(&mut api.books(), &headers)?;
    Ok(Json(admin()))
}

async fn investors(State(api): State<FakeApi>, headers: HeaderMap) -> Result<Json<Value>, ApiError> {
    authorize(&mut api.books(), &headers)?;
    Ok(Json(json!([admin()])))
}

async fn update_investor(
    State(api): State<FakeApi>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    authorize(&mut api.books(), &headers)?;
    let mut investor = admin();
    if let (Some(target), Some(fields)) = (investor.as_object_mut(), body.as_object()) {
        for (key, value) in fields {
            target.insert(key.clone(), value.clone());
        }
    }
    Ok(Json(investor))
}

async fn nav(State(api): State<FakeApi>, headers: HeaderMap) -> Result<Json<Value>, ApiError> {
    let mut books = api.books();
    authorize(&mut books, &headers)?;
    Ok(Json(summary(&books).unwrap_or(Value::Null)))
}

async fn history(
    State(api): State<FakeApi>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    authorize(&mut api.books(), &headers)?;
    let limit: u32 = params
        .get("limit")
        .and_then(|l| l.parse().ok())
        .unwrap_or(0);
    if !(1..=365).contains(&limit) {
        return Err(detail(StatusCode::UNPROCESSABLE_ENTITY, "limit out of range"));
    }
    Ok(Json(json!([])))
}

async fn cash(State(api): State<FakeApi>, headers: HeaderMap) -> Result<Json<Value>, ApiError> {
    let mut books = api.books();
    authorize(&mut books, &headers)?;
    Ok(Json(json!({ "amount": books.cash, "created_at": null, "updated_at": null })))
}

async fn update_cash(
    State(api): State<FakeApi>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let mut books = api.books();
    authorize(&mut books, &headers)?;
    books.cash_updates += 1;
    if books.fail_cash_updates > 0 {
        books.fail_cash_updates -= 1;
        return Err(detail(StatusCode::INTERNAL_SERVER_ERROR, "database unavailable"));
    }
    books.cash = body["amount"].as_f64().unwrap_or_default();
    Ok(Json(json!({ "amount": books.cash, "created_at": null, "updated_at": null })))
}

async fn holdings_today(
    State(api): State<FakeApi>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let mut books = api.books();
    authorize(&mut books, &headers)?;
    let Some((date, total)) = latest(&books) else {
        return Ok(Json(Value::Null));
    };
    let rows: Vec<Value> = books.holdings[&date]
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let mut row = row.clone();
            row["id"] = json!(i + 1);
            row["weight"] = Value::Null;
            row["date"] = json!(date);
            row
        })
        .collect();
    Ok(Json(json!({ "date": date, "total_value": total, "holdings": rows })))
}

async fn manual(
    State(api): State<FakeApi>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let mut books = api.books();
    authorize(&mut books, &headers)?;
    if books.fail_commits > 0 {
        books.fail_commits -= 1;
        return Err(detail(StatusCode::INTERNAL_SERVER_ERROR, "commit failed"));
    }
    let overwrite = params.get("overwrite").is_some_and(|v| v == "true");
    let date = body["date"].as_str().unwrap_or_default().to_string();
    let rows = body["holdings"].as_array().cloned().unwrap_or_default();
    if books.holdings.contains_key(&date) && !overwrite {
        return Err(detail(
            StatusCode::BAD_REQUEST,
            "Holdings already exist for this date.",
        ));
    }
    books.commits.push((date.clone(), rows.clone(), overwrite));
    books.holdings.insert(date, rows);
    Ok(Json(summary(&books).unwrap_or(Value::Null)))
}

/// Recognition is deterministic: any upload reads as A=100, B=50.
async fn preview(
    State(api): State<FakeApi>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    authorize(&mut api.books(), &headers)?;

    let mut files = Vec::new();
    let mut form_date = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        match field.name() {
            Some("files") => files.push(field.file_name().unwrap_or_default().to_string()),
            Some("holdings_date") => form_date = field.text().await.ok(),
            _ => {}
        }
    }
    if files.is_empty() {
        return Err(detail(StatusCode::UNPROCESSABLE_ENTITY, "files required"));
    }

    let mut books = api.books();
    books.preview_calls += 1;
    let date = params
        .get("holdings_date")
        .cloned()
        .or(form_date)
        .unwrap_or_else(|| "2024-01-01".to_string());
    books.preview_dates.push(date.clone());
    books.preview_files.extend(files);

    let holdings = json!([
        { "name": "A", "symbol": null, "quantity": null, "cost_price": null, "market_value": 100.0 },
        { "name": "B", "symbol": null, "quantity": null, "cost_price": null, "market_value": 50.0 }
    ]);
    let holdings_value = 150.0;
    let total = holdings_value + books.cash;
    Ok(Json(json!({
        "date": date,
        "holdings_value": holdings_value,
        "cash": books.cash,
        "total_assets": total,
        "nav": total / TOTAL_SHARES,
        "holdings": holdings
    })))
}

/// `"no-detail"` as the old password yields a 400 without a JSON body.
async fn change_password(
    State(api): State<FakeApi>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    authorize(&mut api.books(), &headers)?;
    if body["old_password"] == "no-detail" {
        return Err((StatusCode::BAD_REQUEST, Json(Value::Null)));
    }
    if body["old_password"] != ADMIN_PASSWORD {
        return Err(detail(StatusCode::BAD_REQUEST, "Incorrect old password"));
    }
    Ok(Json(admin()))
}
