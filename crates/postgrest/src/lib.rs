//! PostgREST table client for the ClassVibes data service
//!
//! This crate wraps the `/rest/v1/{table}` endpoint of a Supabase project,
//! allowing rows to be queried, filtered, inserted, updated and deleted.
//!
//! # Features
//!
//! - Query API (`select`, `insert`, `update`, `delete`)
//! - Filtering (`eq`, `like`, `in_list`, `or`)
//! - Embedded resources (`include`)
//! - Ordering and limits
//! - Conflict-aware inserts (`on_conflict`, `ignore_duplicates`)

use log::debug;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use url::Url;

/// Postgres error code for `unique_violation`.
pub const UNIQUE_VIOLATION: &str = "23505";

/// Error body returned by PostgREST
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PostgrestApiErrorDetails {
    pub code: Option<String>,
    pub message: Option<String>,
    pub details: Option<String>,
    pub hint: Option<String>,
}

impl fmt::Display for PostgrestApiErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(code) = &self.code {
            parts.push(format!("Code: {}", code));
        }
        if let Some(message) = &self.message {
            parts.push(format!("Message: {}", message));
        }
        if let Some(details) = &self.details {
            parts.push(format!("Details: {}", details));
        }
        if let Some(hint) = &self.hint {
            parts.push(format!("Hint: {}", hint));
        }
        write!(f, "{}", parts.join(", "))
    }
}

#[derive(Error, Debug)]
pub enum PostgrestError {
    #[error("API error: {details} (Status: {status})")]
    ApiError {
        details: PostgrestApiErrorDetails,
        status: StatusCode,
    },

    #[error("API error (unparsed): {message} (Status: {status})")]
    UnparsedApiError { message: String, status: StatusCode },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

impl PostgrestError {
    /// Build an error from a non-success response body.
    fn from_body(status: StatusCode, body: String) -> Self {
        match serde_json::from_str::<PostgrestApiErrorDetails>(&body) {
            Ok(details) => PostgrestError::ApiError { details, status },
            Err(_) => PostgrestError::UnparsedApiError {
                message: body,
                status,
            },
        }
    }

    /// Whether the remote rejected the write because of a unique constraint.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            PostgrestError::ApiError { details, status } => {
                details.code.as_deref() == Some(UNIQUE_VIOLATION)
                    || (details.code.is_none() && *status == StatusCode::CONFLICT)
            }
            PostgrestError::UnparsedApiError { status, .. } => *status == StatusCode::CONFLICT,
            _ => false,
        }
    }

    /// Whether a unique violation names the given constraint or column.
    ///
    /// Postgres reports `duplicate key value violates unique constraint "usuario_email_key"`
    /// with `Key (email)=(...) already exists.` in the details.
    pub fn violates(&self, needle: &str) -> bool {
        if !self.is_unique_violation() {
            return false;
        }
        match self {
            PostgrestError::ApiError { details, .. } => {
                let in_message = details
                    .message
                    .as_deref()
                    .map_or(false, |m| m.contains(needle));
                let in_details = details
                    .details
                    .as_deref()
                    .map_or(false, |d| d.contains(&format!("({})", needle)));
                in_message || in_details
            }
            PostgrestError::UnparsedApiError { message, .. } => message.contains(needle),
            _ => false,
        }
    }

    /// The raw message reported by the service, if any.
    pub fn message(&self) -> String {
        match self {
            PostgrestError::ApiError { details, .. } => details
                .message
                .clone()
                .unwrap_or_else(|| details.to_string()),
            PostgrestError::UnparsedApiError { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Client for a single table or view.
///
/// Builder methods consume and return `self`; one client instance describes one request.
#[derive(Debug, Clone)]
pub struct PostgrestClient {
    base_url: String,
    table: String,
    http_client: Client,
    headers: HeaderMap,
    query_params: Vec<(String, String)>,
    ignore_duplicates: bool,
}

impl PostgrestClient {
    /// Create a client for `table` on the project at `base_url`.
    pub fn new(base_url: &str, api_key: &str, table: &str, http_client: Client) -> Self {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(api_key) {
            headers.insert("apikey", value);
        }
        // the anon key is also the bearer token
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", api_key)) {
            headers.insert(reqwest::header::AUTHORIZATION, value);
        }
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            table: table.to_string(),
            http_client,
            headers,
            query_params: Vec::new(),
            ignore_duplicates: false,
        }
    }

    /// Name of the target table.
    pub fn table(&self) -> &str {
        &self.table
    }

    fn set_param(&mut self, key: &str, value: String) {
        self.query_params.retain(|(k, _)| k != key);
        self.query_params.push((key.to_string(), value));
    }

    fn push_filter(mut self, column: &str, filter: String) -> Self {
        self.query_params.push((column.to_string(), filter));
        self
    }

    fn current_select(&self) -> String {
        self.query_params
            .iter()
            .find(|(k, _)| k == "select")
            .map(|(_, v)| v.clone())
            .unwrap_or_else(|| "*".to_string())
    }

    /// Columns to return
    pub fn select(mut self, columns: &str) -> Self {
        self.set_param("select", columns.to_string());
        self
    }

    /// Embed rows of a related table, e.g. `include("cursos", None)` gives `*,cursos(*)`.
    pub fn include(mut self, foreign_table: &str, columns: Option<&str>) -> Self {
        let select = format!(
            "{},{}({})",
            self.current_select(),
            foreign_table,
            columns.unwrap_or("*")
        );
        self.set_param("select", select);
        self
    }

    pub fn eq(self, column: &str, value: &str) -> Self {
        self.push_filter(column, format!("eq.{}", value))
    }

    /// LIKE filter, `*` is the wildcard
    pub fn like(self, column: &str, pattern: &str) -> Self {
        self.push_filter(column, format!("like.{}", pattern))
    }

    /// IN filter
    pub fn in_list<T: ToString>(self, column: &str, values: &[T]) -> Self {
        let value_list: Vec<String> = values.iter().map(ToString::to_string).collect();
        self.push_filter(column, format!("in.({})", value_list.join(",")))
    }

    /// OR of several filters, e.g. `or("username.eq.ana,nombre.eq.ana")`
    pub fn or(mut self, filters: &str) -> Self {
        self.set_param("or", format!("({})", filters));
        self
    }

    pub fn order(mut self, column: &str, order: SortOrder) -> Self {
        let direction = match order {
            SortOrder::Ascending => "asc",
            SortOrder::Descending => "desc",
        };
        self.set_param("order", format!("{}.{}", column, direction));
        self
    }

    pub fn limit(mut self, count: i32) -> Self {
        self.set_param("limit", count.to_string());
        self
    }

    /// Columns of the unique constraint an insert may collide with.
    pub fn on_conflict(mut self, columns: &str) -> Self {
        self.set_param("on_conflict", columns.to_string());
        self
    }

    /// Silently skip rows that collide with an existing one instead of failing.
    pub fn ignore_duplicates(mut self) -> Self {
        self.ignore_duplicates = true;
        self
    }

    fn build_url(&self) -> Result<String, PostgrestError> {
        let mut url = Url::parse(&format!("{}/rest/v1/{}", self.base_url, self.table))?;

        if !self.query_params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.query_params {
                pairs.append_pair(key, value);
            }
        }

        Ok(url.to_string())
    }

    fn write_headers(&self) -> HeaderMap {
        let mut headers = self.headers.clone();
        let prefer = if self.ignore_duplicates {
            "return=representation,resolution=ignore-duplicates"
        } else {
            "return=representation"
        };
        headers.insert(
            HeaderName::from_static("prefer"),
            HeaderValue::from_static(prefer),
        );
        headers
    }

    /// Fetch the matching rows
    pub async fn execute<T: for<'de> Deserialize<'de>>(&self) -> Result<Vec<T>, PostgrestError> {
        let url = self.build_url()?;
        debug!("GET {}", url);

        let response = self
            .http_client
            .get(&url)
            .headers(self.headers.clone())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            return Err(PostgrestError::from_body(status, error_text));
        }

        response
            .json::<Vec<T>>()
            .await
            .map_err(|e| PostgrestError::DeserializationError(e.to_string()))
    }

    /// Fetch at most one row; `None` when nothing matched.
    pub async fn execute_one<T: for<'de> Deserialize<'de>>(
        self,
    ) -> Result<Option<T>, PostgrestError> {
        let rows = self.limit(1).execute::<T>().await?;
        Ok(rows.into_iter().next())
    }

    /// Insert one row or an array of rows; returns the inserted representation.
    pub async fn insert<T: Serialize>(&self, values: T) -> Result<Value, PostgrestError> {
        let url = self.build_url()?;
        debug!("POST {}", url);

        let response = self
            .http_client
            .post(&url)
            .headers(self.write_headers())
            .json(&values)
            .send()
            .await?;

        read_body(response).await
    }

    /// Update the matching rows; returns the updated representation.
    pub async fn update<T: Serialize>(&self, values: T) -> Result<Value, PostgrestError> {
        let url = self.build_url()?;
        debug!("PATCH {}", url);

        let response = self
            .http_client
            .patch(&url)
            .headers(self.write_headers())
            .json(&values)
            .send()
            .await?;

        read_body(response).await
    }

    /// Delete the matching rows; returns the deleted representation.
    pub async fn delete(&self) -> Result<Value, PostgrestError> {
        let url = self.build_url()?;
        debug!("DELETE {}", url);

        let response = self
            .http_client
            .delete(&url)
            .headers(self.write_headers())
            .send()
            .await?;

        read_body(response).await
    }
}

/// Number of rows in a write representation (`Null` for an empty body).
pub fn affected_rows(value: &Value) -> usize {
    match value {
        Value::Array(rows) => rows.len(),
        Value::Null => 0,
        _ => 1,
    }
}

// 204 No Content and empty bodies map to Null
async fn read_body(response: Response) -> Result<Value, PostgrestError> {
    let status = response.status();

    if status.is_success() {
        let body_text = response.text().await.map_err(|e| {
            PostgrestError::DeserializationError(format!("Failed to read response body: {}", e))
        })?;

        if body_text.trim().is_empty() {
            Ok(Value::Null)
        } else {
            serde_json::from_str::<Value>(&body_text)
                .map_err(|e| PostgrestError::DeserializationError(e.to_string()))
        }
    } else {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read error response".to_string());
        Err(PostgrestError::from_body(status, error_text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, table: &str) -> PostgrestClient {
        PostgrestClient::new(&server.uri(), "fake-key", table, reqwest::Client::new())
    }

    #[tokio::test]
    async fn test_select() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/cursos"))
            .and(query_param("select", "*"))
            .and(header("apikey", "fake-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "idcurso": 1, "nombre": "Algebra" },
                { "idcurso": 2, "nombre": "Historia" }
            ])))
            .mount(&mock_server)
            .await;

        let result = client(&mock_server, "cursos")
            .select("*")
            .execute::<Value>()
            .await;

        assert!(result.is_ok());
        let data = result.unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(
            data.first()
                .and_then(|v: &Value| v.get("nombre"))
                .and_then(Value::as_str),
            Some("Algebra")
        );
    }

    #[tokio::test]
    async fn test_filters_and_order() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/profesores"))
            .and(query_param("idprofesor", "in.(3,7)"))
            .and(query_param("order", "idprofesor.asc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "idprofesor": 3 },
                { "idprofesor": 7 }
            ])))
            .mount(&mock_server)
            .await;

        let data = client(&mock_server, "profesores")
            .select("idprofesor")
            .in_list("idprofesor", &[3, 7])
            .order("idprofesor", SortOrder::Ascending)
            .execute::<Value>()
            .await
            .unwrap();

        assert_eq!(data.len(), 2);
    }

    #[tokio::test]
    async fn test_or_and_include() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/usuario"))
            .and(query_param("or", "(username.eq.ana,nombre.eq.ana)"))
            .and(query_param(
                "select",
                "*,usuario_perfil(perfiles(id,nombre))",
            ))
            .and(query_param("limit", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": 4, "usuario_perfil": [ { "perfiles": { "id": 1, "nombre": "admin" } } ] }
            ])))
            .mount(&mock_server)
            .await;

        let row = client(&mock_server, "usuario")
            .select("*")
            .include("usuario_perfil", Some("perfiles(id,nombre)"))
            .or("username.eq.ana,nombre.eq.ana")
            .execute_one::<Value>()
            .await
            .unwrap();

        assert_eq!(row.and_then(|r| r["id"].as_i64()), Some(4));
    }

    #[tokio::test]
    async fn test_execute_one_empty() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/usuario"))
            .and(query_param("email", "eq.nadie@example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&mock_server)
            .await;

        let row = client(&mock_server, "usuario")
            .select("id")
            .eq("email", "nadie@example.com")
            .execute_one::<Value>()
            .await
            .unwrap();

        assert!(row.is_none());
    }

    #[tokio::test]
    async fn test_insert_with_conflict_target() {
        let mock_server = MockServer::start().await;
        let row = json!({ "idcurso": 2, "idalumno": 9 });

        Mock::given(method("POST"))
            .and(path("/rest/v1/usuario_cursos"))
            .and(query_param("on_conflict", "idcurso,idalumno"))
            .and(body_json(&row))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let result = client(&mock_server, "usuario_cursos")
            .on_conflict("idcurso,idalumno")
            .ignore_duplicates()
            .insert(&row)
            .await
            .unwrap();

        assert_eq!(affected_rows(&result), 0);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PATCH"))
            .and(path("/rest/v1/cursos"))
            .and(query_param("idcurso", "eq.5"))
            .and(query_param("idprofesor", "eq.2"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([{ "idcurso": 5, "precio": 10.0 }])),
            )
            .mount(&mock_server)
            .await;

        Mock::given(method("DELETE"))
            .and(path("/rest/v1/cursos"))
            .and(query_param("idcurso", "eq.5"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&mock_server)
            .await;

        let updated = client(&mock_server, "cursos")
            .eq("idcurso", "5")
            .eq("idprofesor", "2")
            .update(json!({ "precio": 10.0 }))
            .await
            .unwrap();
        assert_eq!(affected_rows(&updated), 1);

        let deleted = client(&mock_server, "cursos")
            .eq("idcurso", "5")
            .delete()
            .await
            .unwrap();
        assert_eq!(deleted, Value::Null);
        assert_eq!(affected_rows(&deleted), 0);
    }

    #[tokio::test]
    async fn test_unique_violation_is_detected() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/rest/v1/usuario"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "code": "23505",
                "message": "duplicate key value violates unique constraint \"usuario_email_key\"",
                "details": "Key (email)=(ana@example.com) already exists.",
                "hint": null
            })))
            .mount(&mock_server)
            .await;

        let err = client(&mock_server, "usuario")
            .insert(json!({ "email": "ana@example.com" }))
            .await
            .unwrap_err();

        assert!(err.is_unique_violation());
        assert!(err.violates("email"));
        assert!(!err.violates("username"));
        assert!(err.message().contains("usuario_email_key"));
    }

    #[tokio::test]
    async fn test_unparsed_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/resenas"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
            .mount(&mock_server)
            .await;

        let err = client(&mock_server, "resenas")
            .execute::<Value>()
            .await
            .unwrap_err();

        match &err {
            PostgrestError::UnparsedApiError { message, status } => {
                assert_eq!(message, "upstream exploded");
                assert_eq!(*status, StatusCode::INTERNAL_SERVER_ERROR);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(!err.is_unique_violation());
    }
}
