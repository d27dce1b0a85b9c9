// =============================================================================
// GOOGLE WORKSPACE MODULE
// =============================================================================
//
// Drive and Docs access for the assistant's tools. This lives in the infra
// layer because it is all external I/O; the core layer only sees the tools
// registered by `register_google_tools`.
//
// **Authentication Options:**
// 1. **OAuth refresh token** (recommended): the assistant acts on the Drive
//    of the user who granted consent.
// 2. **Service Account**: only sees files shared with the service account
//    email.

pub mod auth;
pub mod docs_client;
pub mod drive_client;
pub mod google_api;
pub mod google_tools;

pub use auth::{AccessTokenSource, RefreshTokenAuth, ServiceAccountAuth};
pub use docs_client::DocsClient;
pub use drive_client::DriveClient;
pub use google_api::{GoogleApi, GoogleError};
pub use google_tools::register_google_tools;
