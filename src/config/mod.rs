pub mod app_config;
pub mod run_config;

pub use app_config::{AppConfig, HistoryConfig, load_config, setup_resolver};
pub use run_config::RunConfig;
