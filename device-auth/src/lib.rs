//! OAuth 2.0 Device Authorization Grant for Google APIs.
//!
//! Devices that cannot host a browser redirect (headless boxes, consoles, CI runners) authorize
//! by showing the user a short code and a verification URL. The user completes the flow on
//! another device while this crate polls the token endpoint at the interval the server asked
//! for, until the user approves, denies, or the code expires.
//!
//! # Flow
//!
//! 1. [`DeviceAuthClient::request_codes`] obtains a [`DeviceCodePair`].
//! 2. The caller shows the pair to the user (its [`Display`](std::fmt::Display) impl contains
//!    both the verification URL and the user code).
//! 3. [`DeviceAuthClient::wait_for_token`] polls until a [`TokenSet`] is issued.
//! 4. [`DeviceAuthClient::validate_token`] checks audience and scope against the token-info
//!    endpoint.
//! 5. The token is wrapped in a [`Credential`] and persisted through a [`TokenStore`]. Later
//!    runs use [`DeviceAuthClient::try_load_stored_credential`], which refreshes expired
//!    credentials transparently.
//!
//! ```rust,no_run
//! use device_auth::{ClientSecrets, Credential, DeviceAuthClient};
//!
//! # async fn example() -> Result<(), device_auth::AuthError> {
//! let secrets = ClientSecrets::new("client-id", "client-secret");
//! let client = DeviceAuthClient::new(secrets, reqwest::Client::new());
//! let scopes = ["https://www.googleapis.com/auth/youtube.upload"];
//!
//! let codes = client.request_codes(&scopes).await?;
//! eprintln!("{codes}");
//! let token = client.wait_for_token(&codes).await?;
//! assert!(client.validate_token(&token, client.client_id(), &scopes).await?);
//! let credential = Credential::new(token);
//! # let _ = credential;
//! # Ok(())
//! # }
//! ```

mod client;
mod credential;
mod error;
mod store;
mod types;

pub use client::{ClientSecrets, DEVICE_GRANT_TYPE, DeviceAuthClient, Endpoints};
pub use credential::Credential;
pub use error::{AuthError, Operation};
pub use store::{JsonFileTokenStore, MemoryTokenStore, StoreError, TokenStore};
pub use types::{
    DEFAULT_POLLING_INTERVAL_SECS, DeviceCodePair, ErrorResponse, TokenInfo, TokenSet,
};
