use reqwest::blocking::{Client, RequestBuilder, Response};

use crate::error::{Result, SyncError};
use crate::settings::Credentials;
use crate::store::{is_identifier, Filter, Row, TableStore};

/// Hosted store reached through its PostgREST endpoint
/// (`<url>/rest/v1/<table>?column=eq.value`).
pub struct RestStore {
    client: Client,
    base_url: String,
    api_key: String,
}

impl RestStore {
    pub fn new(credentials: &Credentials) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            base_url: credentials.url.trim_end_matches('/').to_string(),
            api_key: credentials.service_key.clone(),
        })
    }

    fn endpoint(&self, table: &str) -> Result<String> {
        if !is_identifier(table) {
            return Err(SyncError::Store(format!("invalid table name: {table:?}")));
        }
        Ok(format!("{}/rest/v1/{table}", self.base_url))
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
    }

    fn with_filters(request: RequestBuilder, filters: &[Filter]) -> Result<RequestBuilder> {
        let mut params = Vec::with_capacity(filters.len());
        for f in filters {
            if !is_identifier(&f.column) {
                return Err(SyncError::Store(format!("invalid column name: {:?}", f.column)));
            }
            params.push((f.column.clone(), format!("eq.{}", f.value_text())));
        }
        Ok(request.query(&params))
    }
}

fn check(table: &str, resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().unwrap_or_default();
    Err(SyncError::Store(format!("{table}: HTTP {status}: {body}")))
}

impl TableStore for RestStore {
    fn select(&self, table: &str, filters: &[Filter]) -> Result<Vec<Row>> {
        let request = self
            .authed(self.client.get(self.endpoint(table)?))
            .query(&[("select", "*")]);
        let resp = Self::with_filters(request, filters)?.send()?;
        Ok(check(table, resp)?.json::<Vec<Row>>()?)
    }

    fn insert(&self, table: &str, rows: &[Row]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        let resp = self
            .authed(self.client.post(self.endpoint(table)?))
            .header("Prefer", "return=minimal")
            .json(rows)
            .send()?;
        check(table, resp)?;
        Ok(rows.len())
    }

    fn delete(&self, table: &str, filters: &[Filter]) -> Result<usize> {
        if filters.is_empty() {
            return Err(SyncError::Store(format!("refusing unscoped delete on {table}")));
        }
        let request = self
            .authed(self.client.delete(self.endpoint(table)?))
            .header("Prefer", "return=representation");
        let resp = Self::with_filters(request, filters)?.send()?;
        let deleted = check(table, resp)?.json::<Vec<Row>>()?;
        Ok(deleted.len())
    }
}
