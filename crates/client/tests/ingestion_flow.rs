mod fake_api;

use std::sync::Arc;

use chrono::NaiveDate;
use turtle_client::{
    ApiClient, ClientError, Dashboard, EditorState, IngestionController, IngestionState,
    MemoryStorage, RecordingNavigator, SaveOutcome, SessionStore, UploadBatch, UploadImage,
};

use fake_api::FakeApi;

async fn admin_client() -> (ApiClient, FakeApi) {
    let (url, fake) = fake_api::spawn().await;
    let session = SessionStore::open(Arc::new(MemoryStorage::new().context())).unwrap();
    session.set_token(&fake.issue_token()).unwrap();
    let api = ApiClient::builder()
        .base_url(&url)
        .navigator(Arc::new(RecordingNavigator::default()))
        .build(session)
        .unwrap();
    (api, fake)
}

fn trading_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 5).unwrap()
}

fn screenshots() -> UploadBatch {
    UploadBatch::new(
        vec![
            UploadImage::new("broker-1.png", vec![0x89, 0x50, 0x4e, 0x47]),
            UploadImage::new("broker-2.jpg", vec![0xff, 0xd8, 0xff]),
        ],
        trading_day(),
    )
}

#[tokio::test]
async fn preview_then_confirm_persists_exactly_the_preview() {
    let (api, fake) = admin_client().await;
    fake.books().cash = 20.0;
    let mut ingestion = IngestionController::new(api);

    let preview = ingestion.start_preview(&screenshots()).await.unwrap().clone();
    assert_eq!(preview.holdings_value, 150.0);
    assert_eq!(preview.total_assets, 170.0);
    assert_eq!(preview.date, trading_day());
    assert_eq!(
        preview
            .holdings
            .iter()
            .map(|h| (h.name.as_str(), h.market_value))
            .collect::<Vec<_>>(),
        vec![("A", 100.0), ("B", 50.0)]
    );
    {
        let books = fake.books();
        assert_eq!(books.preview_dates, vec!["2024-01-05".to_string()]);
        assert_eq!(books.preview_files, vec!["broker-1.png", "broker-2.jpg"]);
        assert!(books.commits.is_empty());
        assert!(books.holdings.is_empty());
    }

    let summary = ingestion.pending().unwrap().confirm().await.unwrap();
    assert_eq!(summary.date, trading_day());
    assert_eq!(summary.total_value, 170.0);
    assert_eq!(ingestion.state(), &IngestionState::Idle);

    let books = fake.books();
    assert_eq!(books.commits.len(), 1);
    let (date, rows, overwrite) = &books.commits[0];
    assert_eq!(date, "2024-01-05");
    assert!(*overwrite);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["name"], "A");
    assert_eq!(rows[0]["market_value"], 100.0);
    assert_eq!(rows[1]["name"], "B");
    assert_eq!(rows[1]["market_value"], 50.0);
}

#[tokio::test]
async fn confirm_overwrites_an_existing_snapshot() {
    let (api, fake) = admin_client().await;
    fake.books()
        .holdings
        .insert("2024-01-05".to_string(), vec![serde_json::json!({
            "name": "OLD", "symbol": null, "quantity": null, "cost_price": null, "market_value": 1.0
        })]);
    let mut ingestion = IngestionController::new(api.clone());

    ingestion.start_preview(&screenshots()).await.unwrap();
    ingestion.pending().unwrap().confirm().await.unwrap();

    let stored = api.holdings_today().await.unwrap().unwrap();
    let names: Vec<_> = stored.holdings.iter().map(|h| h.name.as_str()).collect();
    assert_eq!(names, vec!["A", "B"]);
}

#[tokio::test]
async fn discard_issues_no_request() {
    let (api, fake) = admin_client().await;
    let mut ingestion = IngestionController::new(api);

    ingestion.start_preview(&screenshots()).await.unwrap();
    ingestion.pending().unwrap().discard();

    assert_eq!(ingestion.state(), &IngestionState::Idle);
    assert!(ingestion.pending().is_none());
    let books = fake.books();
    assert_eq!(books.preview_calls, 1);
    assert!(books.commits.is_empty());
}

#[tokio::test]
async fn failed_confirm_can_be_retried_without_reupload() {
    let (api, fake) = admin_client().await;
    fake.books().fail_commits = 1;
    let mut ingestion = IngestionController::new(api);

    ingestion.start_preview(&screenshots()).await.unwrap();
    let err = ingestion.pending().unwrap().confirm().await.unwrap_err();
    assert!(err.is_retryable());
    assert!(matches!(ingestion.state(), IngestionState::PreviewReady(_)));

    ingestion.pending().unwrap().confirm().await.unwrap();
    let books = fake.books();
    assert_eq!(books.preview_calls, 1);
    assert_eq!(books.commits.len(), 1);
}

#[tokio::test]
async fn empty_upload_never_reaches_the_server() {
    let (api, fake) = admin_client().await;
    let mut ingestion = IngestionController::new(api);

    let err = ingestion
        .start_preview(&UploadBatch::new(vec![], trading_day()))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Validation(_)));
    assert_eq!(fake.books().preview_calls, 0);
}

#[tokio::test]
async fn cash_edit_reverts_on_failure_and_converges_on_success() {
    let (api, fake) = admin_client().await;
    fake.books().cash = 20.0;
    let mut dashboard = Dashboard::new(api, 90);
    assert!(dashboard.load().await.is_complete());
    assert!(dashboard.is_admin());
    assert_eq!(dashboard.investor_totals(), 170.0);
    assert_eq!(*dashboard.cash().displayed(), 20.0);

    fake.books().fail_cash_updates = 1;
    dashboard.cash_editor_mut().input(500.0);
    assert!(dashboard.save_cash().await.is_err());
    assert_eq!(*dashboard.cash().displayed(), 20.0);
    assert_eq!(dashboard.cash().state(), EditorState::Editing);
    assert!(dashboard.cash().error().is_some());
    assert_eq!(fake.books().cash, 20.0);

    dashboard.cash_editor_mut().input(500.0);
    assert_eq!(dashboard.save_cash().await.unwrap(), SaveOutcome::Saved);
    assert_eq!(*dashboard.cash().value().committed(), 500.0);
    assert_eq!(dashboard.cash().state(), EditorState::Viewing);
    assert_eq!(fake.books().cash, 500.0);

    dashboard.load().await;
    assert_eq!(*dashboard.cash().displayed(), 500.0);
}

#[tokio::test]
async fn dashboard_reloads_after_a_commit() {
    let (api, fake) = admin_client().await;
    fake.books().cash = 20.0;
    let mut dashboard = Dashboard::new(api.clone(), 90);
    dashboard.load().await;
    assert!(dashboard.summary().is_none());

    let mut ingestion = IngestionController::new(api);
    let commits = ingestion.commit_signal();
    ingestion.start_preview(&screenshots()).await.unwrap();
    ingestion.pending().unwrap().confirm().await.unwrap();
    drop(ingestion);

    dashboard.follow_commits(commits).await;
    let summary = dashboard.summary().unwrap();
    assert_eq!(summary.total_value, 170.0);
    assert_eq!(dashboard.holdings().unwrap().holdings.len(), 2);
}
