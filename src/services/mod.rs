pub mod catalog_service;
pub mod download_service;
pub mod library_service;
pub mod manifest_service;
pub mod process_service;
pub mod profile_service;
pub mod settings_service;

pub use catalog_service::{CatalogRemote, CatalogService, DelFruitClient};
pub use download_service::DownloadService;
pub use library_service::LibraryService;
pub use manifest_service::ManifestService;
pub use process_service::ProcessService;
pub use profile_service::ProfileService;
pub use settings_service::SettingsService;
