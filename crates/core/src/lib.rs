pub mod config;
pub mod config_loader;
pub mod error;
pub mod record;
pub mod traits;

pub use config::{AppConfig, CoordinatorConfig, FreshnessConfig, ProviderConfig, StorageConfig};
pub use config_loader::ConfigLoader;
pub use error::{FetchError, StorageError};
pub use record::{format_canonical_date, parse_canonical_date, DailyRecord, Dataset};
pub use traits::{FetchClient, PersistenceGateway, WriteReceipt};
