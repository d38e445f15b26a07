pub mod credentials;
pub mod storage;

pub use credentials::{AuthEvent, CredentialState, CredentialStore, REFRESH_TOKEN_KEY};
pub use storage::{KeyringSecretStore, MemorySecretStore, SecretStore};
