//! HTTP client for the remote CRUD service.
//!
//! Endpoints are table-scoped: `GET/POST {base}/tables/{table}` and
//! `PATCH/DELETE {base}/tables/{table}/{id}`. Filters, order, and limit
//! travel as query parameters; the session token as a bearer header.

use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use url::Url;

use super::types::SelectOptions;
use super::RemoteStore;
use crate::config::RemoteConfig;

/// Remote store client over reqwest.
#[derive(Clone)]
pub struct HttpRemoteStore {
  http: reqwest::Client,
  base_url: Url,
  token: Option<String>,
}

impl HttpRemoteStore {
  pub fn new(config: &RemoteConfig) -> Result<Self> {
    let mut base_url = Url::parse(&config.base_url)
      .map_err(|e| eyre!("Invalid remote base URL {}: {}", config.base_url, e))?;

    // Url::join treats a path without a trailing slash as a file
    if !base_url.path().ends_with('/') {
      base_url.set_path(&format!("{}/", base_url.path()));
    }

    Ok(Self {
      http: reqwest::Client::new(),
      base_url,
      token: config.token(),
    })
  }

  fn table_url(&self, table: &str, id: Option<&str>) -> Result<Url> {
    let mut path = format!("tables/{}", table);
    if let Some(id) = id {
      path.push('/');
      path.push_str(id);
    }
    self
      .base_url
      .join(&path)
      .map_err(|e| eyre!("Invalid table path {}: {}", path, e))
  }

  fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
    let builder = self.http.request(method, url);
    match &self.token {
      Some(token) => builder.bearer_auth(token),
      None => builder,
    }
  }
}

#[async_trait::async_trait]
impl RemoteStore for HttpRemoteStore {
  async fn select(&self, table: &str, options: &SelectOptions) -> Result<Vec<Value>> {
    let mut url = self.table_url(table, None)?;

    {
      let mut query = url.query_pairs_mut();
      for filter in &options.filters {
        // Serialize non-string values compactly: active=true, id=5
        let value = match &filter.value {
          Value::String(s) => s.clone(),
          other => other.to_string(),
        };
        query.append_pair("filter", &format!("{}:{}", filter.column, value));
      }
      if let Some(order) = &options.order {
        let direction = if order.descending { "desc" } else { "asc" };
        query.append_pair("order", &format!("{}.{}", order.column, direction));
      }
      if let Some(limit) = options.limit {
        query.append_pair("limit", &limit.to_string());
      }
    }

    let response = self
      .request(reqwest::Method::GET, url)
      .send()
      .await
      .map_err(|e| eyre!("Failed to query table {}: {}", table, e))?
      .error_for_status()
      .map_err(|e| eyre!("Query on table {} rejected: {}", table, e))?;

    response
      .json::<Vec<Value>>()
      .await
      .map_err(|e| eyre!("Failed to parse rows from table {}: {}", table, e))
  }

  async fn insert(&self, table: &str, row: Value) -> Result<Value> {
    let url = self.table_url(table, None)?;

    let response = self
      .request(reqwest::Method::POST, url)
      .json(&row)
      .send()
      .await
      .map_err(|e| eyre!("Failed to insert into table {}: {}", table, e))?
      .error_for_status()
      .map_err(|e| eyre!("Insert into table {} rejected: {}", table, e))?;

    response
      .json::<Value>()
      .await
      .map_err(|e| eyre!("Failed to parse inserted row from table {}: {}", table, e))
  }

  async fn update(&self, table: &str, id: &str, patch: Value) -> Result<Value> {
    let url = self.table_url(table, Some(id))?;

    let response = self
      .request(reqwest::Method::PATCH, url)
      .json(&patch)
      .send()
      .await
      .map_err(|e| eyre!("Failed to update {} in table {}: {}", id, table, e))?
      .error_for_status()
      .map_err(|e| eyre!("Update of {} in table {} rejected: {}", id, table, e))?;

    response
      .json::<Value>()
      .await
      .map_err(|e| eyre!("Failed to parse updated row {} from table {}: {}", id, table, e))
  }

  async fn delete(&self, table: &str, id: &str) -> Result<()> {
    let url = self.table_url(table, Some(id))?;

    self
      .request(reqwest::Method::DELETE, url)
      .send()
      .await
      .map_err(|e| eyre!("Failed to delete {} from table {}: {}", id, table, e))?
      .error_for_status()
      .map_err(|e| eyre!("Delete of {} from table {} rejected: {}", id, table, e))?;

    Ok(())
  }
}
