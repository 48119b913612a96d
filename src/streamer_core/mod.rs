pub mod error_handler;
pub mod ws_client;

pub use error_handler::ExponentialBackoff;
pub use ws_client::{AccountStreamer, ConnectionState, StreamError};
