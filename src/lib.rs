pub mod config;
pub mod cron;
pub mod error;
pub mod observability;
pub mod openai;
pub mod server;
pub mod stream;
pub mod transport;
pub mod util;
