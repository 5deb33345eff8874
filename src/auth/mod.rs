/// Client-credentials token exchange against Microsoft identity.
pub mod credentials;
/// Access tokens and the per-run token provider.
pub mod token;

pub use credentials::ClientCredentials;
pub use token::{AccessToken, TokenProvider};
