//! Authentication module
//!
//! Azure AD sign-in with the session kept in a signed cookie.
//!
//! ## Structure
//!
//! - `jwt`: Session token claims and the HS256 codec
//! - `session`: `SessionAccessor` seam and the client-facing `Session`
//! - `callbacks`: JWT/session callbacks and API token upkeep
//! - `api_token`: Refresh-token exchange for the backend API scope
//! - `extractors`: Axum extractors for the caller's token
//! - `helpers`: Cookie, client and JWT payload helpers
//! - `handlers`: HTTP handlers for the `/api/auth` endpoints
//!
//! ## Authentication Flow
//!
//! 1. User visits `/api/auth/signin` → redirect to Azure AD
//! 2. Azure AD authenticates → redirect to `/api/auth/callback/azure-ad`
//! 3. Code exchanged for tokens → API token fetched → session cookie set
//! 4. Proxied `/api/*` calls read the cookie and refresh the API token when it expires
//! 5. `/api/auth/signout` clears the cookie

pub mod api_token;
pub mod callbacks;
pub mod extractors;
pub mod handlers;
pub mod helpers;
pub mod jwt;
pub mod session;

use std::sync::Arc;

use api_token::ApiTokenSource;
use jwt::SessionCodec;

// Re-export handlers for convenient routing
pub use handlers::{
    callback_handler, dummy_auth_handler, session_handler, signin_handler, signout_handler,
};

pub use session::{Session, SessionAccessor, REFRESH_ACCESS_TOKEN_ERROR};

/// Everything the real (non-dummy) auth mode needs at request time.
#[derive(Clone)]
pub struct AuthContext {
    pub codec: Arc<SessionCodec>,
    pub api_tokens: Arc<dyn ApiTokenSource>,
}
