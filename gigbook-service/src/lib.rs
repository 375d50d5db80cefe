//! # gigbook-service
//!
//! Response shaping for the gigbook booking marketplace API. List endpoints
//! (venues, gigs, artists, bookings) share one pipeline: filter by a search
//! term, order by a whitelisted field, then cut out a page. Around it sit the
//! HTTP concerns every endpoint needs.
//!
//! ## Features
//!
//! - **Shaping**: search, sort and pagination driven by query parameters, with
//!   result metadata echoed in `X-*` response headers
//! - **Compression**: gzip for large responses and gzip-encoded request bodies,
//!   with size limits and cooperative cancellation
//! - **Middleware**: bearer authentication, per-client rate limiting and a
//!   response cache behind small traits
//! - **Activity feed**: typed booking, message and payment entries merged into
//!   one timeline
//! - **Realtime**: topic subscriptions for live updates
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use axum::{extract::Query, middleware, routing::get, Router};
//! use gigbook_service::prelude::*;
//!
//! # #[derive(Clone, serde::Serialize)] struct Venue;
//! # impl Record for Venue { fn field(&self, _: &str) -> Option<FieldValue> { None } }
//! # async fn load_venues() -> Vec<Venue> { Vec::new() }
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load()?;
//!     init_tracing(&config)?;
//!
//!     let shaper = Arc::new(ResponseShaper::for_resource(&config, "venues")?);
//!     let compressor = Arc::new(Compressor::from_config(&config.compression));
//!
//!     let app: Router = Router::new()
//!         .route(
//!             "/venues",
//!             get(move |Query(query): Query<ListQuery>| {
//!                 let shaper = Arc::clone(&shaper);
//!                 async move { shaper.shape(load_venues().await, &query) }
//!             }),
//!         )
//!         .layer(middleware::from_fn_with_state(compressor, compression_middleware));
//!
//!     let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.service.port)).await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

pub mod activity;
pub mod cache;
pub mod compression;
pub mod config;
pub mod error;
pub mod middleware;
pub mod observability;
pub mod pagination;
pub mod query;
pub mod realtime;
pub mod record;
pub mod search;
pub mod shaping;
pub mod sort;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{
        CompressionConfig, Config, PaginationConfig, RateLimitConfig, ResourceConfig,
        SearchConfig, ServiceConfig,
    };
    pub use crate::error::{Error, ErrorResponse, Result};

    pub use crate::record::{FieldValue, Record};
    pub use crate::query::ListQuery;
    pub use crate::pagination::{PageMeta, PagedSource, PageResult, PageSpec, Paginator};
    pub use crate::search::{SearchSpec, Searcher};
    pub use crate::sort::{SortDirection, SortSpec, Sorter};
    pub use crate::shaping::{ResponseShaper, ShapePlan, ShapedResponse};

    pub use crate::cache::{
        cache_middleware, CachedResponse, CachedRoutes, MemoryCache, ResponseCache,
    };
    pub use crate::compression::{
        accepts_gzip, compression_middleware, CompressionPolicy, Compressor,
    };
    pub use crate::middleware::{
        auth_middleware, rate_limit_middleware, Admission, Authenticator, GovernorRateLimiter,
        Principal, RateLimiter, StaticTokenAuthenticator,
    };

    pub use crate::activity::{
        Activity, ActivityFeed, BookingActivity, BookingStatus, MessageActivity, PaymentActivity,
        PaymentStatus,
    };
    pub use crate::realtime::{Event, RealtimeHub, Subscription, SubscriptionId};

    pub use crate::observability::init_tracing;
}
