//! Infrastructure layer: network transport, HTML extraction, persistence
//! and the external enrichment API, plus configuration and logging.

pub mod config;
pub mod feature_client;
pub mod http_client;
pub mod logging;
pub mod parsing;
pub mod parsing_error;
pub mod record_store;
pub mod transport;

pub use config::{AppConfig, ConfigError, ConfigManager};
pub use feature_client::FeatureClient;
pub use http_client::{HttpClient, RetryPolicy};
pub use logging::{get_log_directory, init_logging_with_config};
pub use parsing::{
    DetailParser, ListingParser, ParsingConfig, ParsingError, ParsingResult, RecordExtractor,
    parse_duration,
};
pub use record_store::{RecordStore, SqliteRecordStore};
pub use transport::{PageSource, fetch_many, fetch_stream};
