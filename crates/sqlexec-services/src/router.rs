//! Route dispatch for JSON request bodies

use serde::de::DeserializeOwned;
use serde_json::Value as Json;

use crate::error::ServiceError;
use crate::handler::SqlExecutorService;
use crate::lifecycle::RequestGuard;
use crate::request::{ModifyRequest, QueryRequest};
use crate::response::ErrorResponse;

/// Read route
pub const QUERY_ROUTE: &str = "/sql_executor/query";
/// Write route
pub const MODIFY_ROUTE: &str = "/sql_executor/modify";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Query,
    Modify,
}

impl Route {
    /// Match a route path, ignoring case and a trailing slash
    pub fn parse(path: &str) -> Result<Self, ServiceError> {
        let normalized = path.trim().trim_end_matches('/');
        if normalized.eq_ignore_ascii_case(QUERY_ROUTE) {
            Ok(Route::Query)
        } else if normalized.eq_ignore_ascii_case(MODIFY_ROUTE) {
            Ok(Route::Modify)
        } else {
            Err(ServiceError::UnknownRoute(path.to_string()))
        }
    }
}

/// Decodes request bodies and hands them to the service
#[derive(Clone)]
pub struct Router {
    service: SqlExecutorService,
}

impl Router {
    pub fn new(service: SqlExecutorService) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &SqlExecutorService {
        &self.service
    }

    /// Handle one request and produce its JSON response
    pub async fn dispatch(&self, route: &str, body: Json) -> Json {
        self.route(route, body, None).await
    }

    /// Like [`Self::dispatch`], for a request whose guard was taken when it was accepted
    pub async fn dispatch_guarded(&self, guard: RequestGuard, route: &str, body: Json) -> Json {
        self.route(route, body, Some(guard)).await
    }

    async fn route(&self, route: &str, body: Json, guard: Option<RequestGuard>) -> Json {
        let route = match Route::parse(route) {
            Ok(route) => route,
            Err(e) => {
                tracing::warn!(route, "unknown route");
                return to_json(&ErrorResponse::parameter_error(e.to_string()).with_detail("route", route));
            }
        };

        match route {
            Route::Query => match (decode::<QueryRequest>(body), guard) {
                (Ok(request), Some(guard)) => to_json(&self.service.query_guarded(guard, request).await),
                (Ok(request), None) => to_json(&self.service.query(request).await),
                (Err(e), _) => to_json(&e),
            },
            Route::Modify => match (decode::<ModifyRequest>(body), guard) {
                (Ok(request), Some(guard)) => to_json(&self.service.modify_guarded(guard, request).await),
                (Ok(request), None) => to_json(&self.service.modify(request).await),
                (Err(e), _) => to_json(&e),
            },
        }
    }
}

fn decode<T: DeserializeOwned>(body: Json) -> Result<T, ErrorResponse> {
    serde_json::from_value(body).map_err(|e| {
        let error = ServiceError::InvalidRequest(e.to_string());
        tracing::warn!(error = %error, "failed to decode request body");
        ErrorResponse::parameter_error(error.to_string())
    })
}

fn to_json<T: serde::Serialize>(response: &T) -> Json {
    serde_json::to_value(response).unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to encode response");
        serde_json::json!({
            "code": crate::StatusCode::ParameterError,
            "err_msg": format!("failed to encode response: {}", e),
        })
    })
}
