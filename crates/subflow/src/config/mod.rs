pub mod loader;
pub mod schema;

pub use loader::{load_config, load_config_from_str};
pub use schema::{
    default_worker_count, is_valid_language_code, language_code, Config, ConcurrencySetting, TranslationService,
    MAX_WORKERS,
};
