//! Client side of the fund dashboard: session handling, route guarding,
//! the authenticated API client and the two edit workflows (screenshot
//! ingestion and staged values).

pub mod api;
pub mod dashboard;
pub mod error;
pub mod forms;
pub mod guard;
pub mod ingestion;
pub mod navigation;
pub mod session;
pub mod staged;
pub mod storage;

pub use api::{ApiClient, ApiClientBuilder};
pub use dashboard::{Dashboard, LoadReport, Privilege};
pub use error::{ClientError, Result};
pub use guard::RouteGuard;
pub use ingestion::{
    HoldingsGateway, IngestionController, IngestionState, PendingPreview, UploadBatch,
    UploadImage,
};
pub use navigation::{Navigator, RecordingNavigator};
pub use session::SessionStore;
pub use staged::{EditorState, SaveOutcome, StagedValue, StagedValueEditor};
pub use storage::{FileStorage, FileWatcher, MemoryStorage, StorageEvents, TokenStorage};
