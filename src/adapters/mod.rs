// Adapters layer: concrete implementations for the remote API and the export filesystem.

pub mod http;
pub mod storage;

pub use http::RedashClient;
pub use storage::LocalStorage;
