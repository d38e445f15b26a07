//! Authenticated request pipeline

pub mod client;
pub mod refresh;
pub mod request;
pub mod transport;

pub use client::ApiClient;
pub use refresh::REFRESH_PATH;
pub use request::{ApiRequest, RequestOptions};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
