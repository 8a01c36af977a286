pub mod app;
pub mod config;
pub mod db;
pub mod digest;
pub mod error;
pub mod feed;
pub mod models;
pub mod publish;
pub mod util;

pub use app::App;
pub use config::Config;
pub use error::{AppError, Result};
