//! Query option types for the remote store boundary.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Equality filter: rows where `column` equals `value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
  pub column: String,
  pub value: Value,
}

/// Order specification for a select.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
  pub column: String,
  pub descending: bool,
}

/// Options for a read: filters, order, limit, and a cache-bypass flag.
///
/// `force_refresh` is consulted by the sync façade only and never reaches
/// the wire or the cache key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectOptions {
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub filters: Vec<Filter>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub order: Option<Order>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub limit: Option<u32>,
  #[serde(skip)]
  pub force_refresh: bool,
}

impl SelectOptions {
  pub fn new() -> Self {
    Self::default()
  }

  /// Add an equality filter.
  pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
    self.filters.push(Filter {
      column: column.to_string(),
      value: value.into(),
    });
    self
  }

  /// Order results by a column.
  pub fn order_by(mut self, column: &str, descending: bool) -> Self {
    self.order = Some(Order {
      column: column.to_string(),
      descending,
    });
    self
  }

  /// Limit the number of returned rows.
  pub fn limit(mut self, limit: u32) -> Self {
    self.limit = Some(limit);
    self
  }

  /// Bypass any live cache entry for this read.
  pub fn refresh(mut self) -> Self {
    self.force_refresh = true;
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_force_refresh_not_serialized() {
    let plain = SelectOptions::new().eq("category", "sports").limit(5);
    let refreshed = plain.clone().refresh();

    assert_eq!(
      serde_json::to_value(&plain).unwrap(),
      serde_json::to_value(&refreshed).unwrap()
    );
  }

  #[test]
  fn test_builder() {
    let options = SelectOptions::new()
      .eq("active", true)
      .order_by("name", false)
      .limit(20);

    assert_eq!(options.filters.len(), 1);
    assert_eq!(options.filters[0].value, json!(true));
    assert_eq!(options.order.as_ref().unwrap().column, "name");
    assert_eq!(options.limit, Some(20));
  }
}
