//! Authenticated proxying of `/api/*` calls to the backend API.
//!
//! - `route`: `BackendRoute` handler factory
//! - `body`: inbound body extraction
//! - `fetcher`: outbound HTTP call
//! - `response`: response post-processing
//! - `error`: `HandlerError` and its JSON shape

pub mod body;
pub mod error;
pub mod fetcher;
pub mod method;
pub mod response;
pub mod route;

pub use body::{default_body_provider, BodyProvider, ExtractBody, NoBody};
pub use error::HandlerError;
pub use fetcher::{FetchRequest, Fetcher, ReqwestFetcher};
pub use method::HttpMethod;
pub use response::{DefaultHandler, ResponseHandler};
pub use route::{BackendRoute, EffectiveStrategies};
