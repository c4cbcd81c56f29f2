//! Configuration loading: `clinic.{toml,yaml,yml,json}` with `${ENV}` substitution.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{
        clear_config_dir, config_dir, discover_and_load, find_or_default_config_path,
        load_config, save_config, set_config_dir,
    },
    schema::{
        AuthConfig, ChatConfig, ClinicConfig, CorsConfig, DatabaseConfig, ServerConfig,
        UploadsConfig,
    },
};
