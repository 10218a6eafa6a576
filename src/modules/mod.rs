pub mod config;
pub mod logger;

pub use config::{get_data_dir, load_app_config};
pub use logger::init_logger;
