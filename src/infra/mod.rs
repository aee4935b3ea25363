mod config;
mod mongo;
mod routes;

pub use config::AppConfig;
pub use mongo::*;
pub use routes::*;
