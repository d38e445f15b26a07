//! Domain facades over the request pipeline

pub mod auth;
pub mod jobs;
pub mod messaging;
pub mod profiles;
pub mod quotes;
pub mod types;

pub use auth::AuthApi;
pub use jobs::JobsApi;
pub use messaging::MessagingApi;
pub use profiles::ProfilesApi;
pub use quotes::QuotesApi;
