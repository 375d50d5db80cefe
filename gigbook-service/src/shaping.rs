//! Search, sort and paginate a list endpoint's results in one step
//!
//! A [`ResponseShaper`] is built once per resource at startup and shared by
//! that resource's handlers. For each request it resolves the [`ListQuery`]
//! into a [`ShapePlan`], filters, orders and pages the items, and returns a
//! [`ShapedResponse`] that renders the JSON body together with the
//! `X-Page*` and `X-Search-*` headers.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use axum::{extract::{Query, State}, routing::get, Router};
//! use gigbook_service::prelude::*;
//!
//! async fn list_venues(
//!     State(shaper): State<Arc<ResponseShaper>>,
//!     Query(query): Query<ListQuery>,
//! ) -> Result<ShapedResponse<serde_json::Value>> {
//!     let venues = load_venues().await?;
//!     Ok(shaper.shape(venues, &query))
//! }
//!
//! let shaper = Arc::new(ResponseShaper::for_resource(&config, "venues")?);
//! let app = Router::new().route("/venues", get(list_venues)).with_state(shaper);
//! ```

use std::future::Future;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::pagination::{PageResult, PageSpec, Paginator};
use crate::query::ListQuery;
use crate::record::Record;
use crate::search::{SearchSpec, Searcher};
use crate::sort::{SortSpec, Sorter};

/// Everything resolved from one request's query parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapePlan {
    /// Search to apply, if any
    pub search: Option<SearchSpec>,
    /// Ordering
    pub sort: SortSpec,
    /// Page to return
    pub page: PageSpec,
}

/// Composes the search, sort and pagination helpers for one resource
#[derive(Debug, Clone)]
pub struct ResponseShaper {
    sorter: Sorter,
    searcher: Searcher,
    paginator: Paginator,
}

impl ResponseShaper {
    pub fn new(sorter: Sorter, searcher: Searcher, paginator: Paginator) -> Self {
        Self {
            sorter,
            searcher,
            paginator,
        }
    }

    /// Build the shaper for a resource listed under `[resources.<name>]`
    pub fn for_resource(config: &Config, name: &str) -> Result<Self> {
        let resource = config.resource(name).ok_or_else(|| {
            Error::Internal(format!("No resource configuration for '{}'", name))
        })?;

        Ok(Self::new(
            Sorter::from_config(resource),
            Searcher::from_config(&config.search, &resource.search_fields),
            Paginator::from_config(&config.pagination),
        ))
    }

    pub fn sorter(&self) -> &Sorter {
        &self.sorter
    }

    pub fn searcher(&self) -> &Searcher {
        &self.searcher
    }

    pub fn paginator(&self) -> &Paginator {
        &self.paginator
    }

    /// Resolve a request's query parameters
    pub fn plan(&self, query: &ListQuery) -> ShapePlan {
        ShapePlan {
            search: self.searcher.resolve(
                query.q.as_deref(),
                query.fields.as_deref(),
                query.case_sensitive.as_deref(),
            ),
            sort: self
                .sorter
                .resolve(query.sort.as_deref(), query.direction.as_deref()),
            page: self
                .paginator
                .resolve(query.page.as_deref(), query.limit.as_deref()),
        }
    }

    /// Search, then sort, then paginate an in-memory collection
    pub fn shape<T: Record>(&self, items: Vec<T>, query: &ListQuery) -> ShapedResponse<T> {
        let plan = self.plan(query);
        let items = self.searcher.apply(items, plan.search.as_ref());
        let items = self.sorter.apply(items, &plan.sort);
        let page = self.paginator.apply(items, plan.page);

        tracing::debug!(
            sort = %plan.sort.field,
            direction = %plan.sort.direction,
            searched = plan.search.is_some(),
            page = page.meta.page,
            total = page.meta.total,
            "Shaped list response"
        );

        ShapedResponse {
            page,
            search: plan.search,
            sort: plan.sort,
        }
    }

    /// Like [`shape`](Self::shape), with the items loaded by an async fetch
    ///
    /// `fetch` is awaited exactly once. Its error is returned unchanged.
    pub async fn shape_deferred<T, E, F, Fut>(
        &self,
        fetch: F,
        query: &ListQuery,
    ) -> std::result::Result<ShapedResponse<T>, E>
    where
        T: Record,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Vec<T>, E>>,
    {
        let plan = self.plan(query);
        let page = self
            .paginator
            .apply_deferred(
                || async {
                    let items = fetch().await?;
                    let items = self.searcher.apply(items, plan.search.as_ref());
                    Ok::<_, E>(self.sorter.apply(items, &plan.sort))
                },
                plan.page,
            )
            .await?;

        Ok(ShapedResponse {
            page,
            search: plan.search,
            sort: plan.sort,
        })
    }
}

/// A shaped page ready to be returned from a handler
#[derive(Debug, Clone)]
pub struct ShapedResponse<T> {
    /// The page and its metadata
    pub page: PageResult<T>,
    /// The search that was applied, if any
    pub search: Option<SearchSpec>,
    /// The ordering that was applied
    pub sort: SortSpec,
}

impl<T> ShapedResponse<T> {
    /// Transform the items, e.g. into a public DTO, keeping the metadata
    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> ShapedResponse<U> {
        ShapedResponse {
            page: self.page.map(f),
            search: self.search,
            sort: self.sort,
        }
    }
}

impl<T: Serialize> IntoResponse for ShapedResponse<T> {
    fn into_response(self) -> Response {
        let mut response = (StatusCode::OK, Json(&self.page)).into_response();
        let headers = response.headers_mut();
        self.page.meta.write_headers(headers);
        if let Some(search) = &self.search {
            search.write_headers(headers);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResourceConfig;
    use crate::pagination::{X_HAS_NEXT, X_PAGE, X_TOTAL, X_TOTAL_PAGES};
    use crate::search::{X_SEARCH_FIELDS, X_SEARCH_QUERY};
    use crate::sort::SortDirection;
    use axum::{
        body::{to_bytes, Body},
        extract::{Query, State},
        http::Request,
        routing::get,
        Router,
    };
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn config() -> Config {
        let mut config = Config::default();
        config.resources.insert(
            "venues".to_string(),
            ResourceConfig {
                sort_fields: vec!["name".into(), "price".into(), "capacity".into()],
                default_sort: "name".into(),
                default_direction: SortDirection::Asc,
                search_fields: vec!["name".into(), "city".into()],
            },
        );
        config
    }

    fn shaper() -> ResponseShaper {
        ResponseShaper::for_resource(&config(), "venues").unwrap()
    }

    fn venues() -> Vec<Value> {
        vec![
            json!({"name": "Studio A", "city": "Berlin", "price": 120}),
            json!({"name": "Hall B", "city": "Leipzig", "price": 300}),
            json!({"name": "Studio C", "city": "Hamburg", "price": null}),
            json!({"name": "Stage D", "city": "Berlin", "price": 80}),
            json!({"name": "Loft E", "city": "Stuttgart", "price": 150}),
        ]
    }

    fn names(items: &[Value]) -> Vec<&str> {
        items.iter().map(|i| i["name"].as_str().unwrap()).collect()
    }

    #[test]
    fn test_unknown_resource() {
        let err = ResponseShaper::for_resource(&config(), "invoices").unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[test]
    fn test_search_then_sort_then_paginate() {
        let query = ListQuery::new()
            .with_search("st")
            .with_sort("price")
            .with_direction("desc")
            .with_limit("2");

        let shaped = shaper().shape(venues(), &query);

        // "st" hits Studio A, Studio C, Stage D by name and Loft E by city
        assert_eq!(shaped.page.meta.total, 4);
        assert_eq!(shaped.page.meta.total_pages, 2);
        assert_eq!(names(&shaped.page.data), vec!["Loft E", "Studio A"]);

        let second = shaper().shape(venues(), &query.clone().with_page("2"));
        assert_eq!(names(&second.page.data), vec!["Stage D", "Studio C"]);
        assert!(!second.page.meta.has_next);
    }

    #[test]
    fn test_defaults_without_parameters() {
        let shaped = shaper().shape(venues(), &ListQuery::new());
        assert!(shaped.search.is_none());
        assert_eq!(shaped.sort.field, "name");
        assert_eq!(shaped.page.meta.limit, 20);
        assert_eq!(
            names(&shaped.page.data),
            vec!["Hall B", "Loft E", "Stage D", "Studio A", "Studio C"]
        );
    }

    #[test]
    fn test_garbage_parameters_degrade() {
        let query = ListQuery::new()
            .with_page("zero")
            .with_limit("9999")
            .with_sort("password")
            .with_direction("up")
            .with_search("x");
        let plan = shaper().plan(&query);
        assert_eq!(plan.page, PageSpec { page: 1, limit: 100 });
        assert_eq!(plan.sort.field, "name");
        assert_eq!(plan.sort.direction, SortDirection::Asc);
        assert!(plan.search.is_none());
    }

    #[tokio::test]
    async fn test_shape_deferred_fetches_once() {
        let calls = AtomicUsize::new(0);
        let query = ListQuery::new().with_search("berlin").with_fields(["city"]);

        let shaped = shaper()
            .shape_deferred(
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, std::io::Error>(venues())
                },
                &query,
            )
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(names(&shaped.page.data), vec!["Stage D", "Studio A"]);
    }

    #[tokio::test]
    async fn test_shape_deferred_propagates_error() {
        let result = shaper()
            .shape_deferred(
                || async { Err::<Vec<Value>, _>("store unavailable") },
                &ListQuery::new(),
            )
            .await;
        assert_eq!(result.unwrap_err(), "store unavailable");
    }

    #[test]
    fn test_map_keeps_metadata() {
        let shaped = shaper()
            .shape(venues(), &ListQuery::new().with_limit("1"))
            .map(|v| v["name"].as_str().unwrap_or_default().to_uppercase());
        assert_eq!(shaped.page.data, vec!["HALL B".to_string()]);
        assert_eq!(shaped.page.meta.total, 5);
    }

    async fn list_venues(
        State(shaper): State<Arc<ResponseShaper>>,
        Query(query): Query<ListQuery>,
    ) -> ShapedResponse<Value> {
        shaper.shape(venues(), &query)
    }

    #[tokio::test]
    async fn test_handler_renders_body_and_headers() {
        let app = Router::new()
            .route("/venues", get(list_venues))
            .with_state(Arc::new(shaper()));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/venues?q=st&fields=name&sort=price&direction=desc&limit=2&page=abc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[X_PAGE], "1");
        assert_eq!(headers[X_TOTAL], "3");
        assert_eq!(headers[X_TOTAL_PAGES], "2");
        assert_eq!(headers[X_HAS_NEXT], "true");
        assert_eq!(headers[X_SEARCH_QUERY], "st");
        assert_eq!(headers[X_SEARCH_FIELDS], "name");

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["data"][0]["name"], "Studio A");
        assert_eq!(body["data"][1]["name"], "Stage D");
        assert_eq!(body["meta"]["totalPages"], 2);
        assert_eq!(body["meta"]["hasPrevious"], false);
    }
}
