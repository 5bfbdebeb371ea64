//! Structured query building.
//!
//! Filters accumulate fluently and are conjoined. The wire shape depends on
//! the filter count: exactly one predicate goes out as a bare field filter,
//! two or more are wrapped in a composite AND node. Some server versions
//! reject a single-element composite, so the distinction is load-bearing.

use serde_json::Value as Json;

use crate::client::FirestoreClient;
use crate::codec;
use crate::error::{FirestoreError, FirestoreResult};
use crate::types::{
    CollectionSelector, CompositeFilter, Document, FieldFilter, FieldReference, Filter,
    StructuredQuery, Value,
};

/// Comparison operators supported by the query surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Equal,
    LessThan,
    GreaterThan,
    LessThanOrEqual,
    GreaterThanOrEqual,
}

impl FilterOp {
    /// Parse an operator as it arrives from a request body. Accepts both the
    /// shorthand comparison symbols and the wire spellings.
    pub fn parse(s: &str) -> FirestoreResult<Self> {
        match s {
            "==" | "EQUAL" => Ok(Self::Equal),
            "<" | "LESS_THAN" => Ok(Self::LessThan),
            ">" | "GREATER_THAN" => Ok(Self::GreaterThan),
            "<=" | "LESS_THAN_OR_EQUAL" => Ok(Self::LessThanOrEqual),
            ">=" | "GREATER_THAN_OR_EQUAL" => Ok(Self::GreaterThanOrEqual),
            other => Err(FirestoreError::validation(format!(
                "unsupported operator: {}",
                other
            ))),
        }
    }

    pub const fn wire_name(&self) -> &'static str {
        match self {
            Self::Equal => "EQUAL",
            Self::LessThan => "LESS_THAN",
            Self::GreaterThan => "GREATER_THAN",
            Self::LessThanOrEqual => "LESS_THAN_OR_EQUAL",
            Self::GreaterThanOrEqual => "GREATER_THAN_OR_EQUAL",
        }
    }
}

/// Fluent query accumulator over one collection.
#[derive(Clone)]
pub struct QueryBuilder {
    client: FirestoreClient,
    collection: String,
    filters: Vec<(String, FilterOp, Value)>,
    limit: Option<i32>,
}

impl FirestoreClient {
    /// Start a query over a collection.
    pub fn query(&self, collection: impl Into<String>) -> QueryBuilder {
        QueryBuilder {
            client: self.clone(),
            collection: collection.into(),
            filters: Vec::new(),
            limit: None,
        }
    }
}

impl QueryBuilder {
    /// Add a predicate on a field. Multiple predicates are ANDed.
    pub fn filter(mut self, field: impl Into<String>, op: FilterOp, value: &Json) -> Self {
        self.filters.push((field.into(), op, codec::encode(value)));
        self
    }

    /// Cap the number of returned documents.
    pub fn limit(mut self, limit: i32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Translate the accumulated state into the wire query.
    pub fn build(&self) -> FirestoreResult<StructuredQuery> {
        if self.collection.is_empty() {
            return Err(FirestoreError::validation("collection name is empty"));
        }
        for (field, _, _) in &self.filters {
            if field.is_empty() {
                return Err(FirestoreError::validation("filter field path is empty"));
            }
        }
        if let Some(limit) = self.limit {
            if limit <= 0 {
                return Err(FirestoreError::validation(format!(
                    "limit must be positive, got {}",
                    limit
                )));
            }
        }

        Ok(StructuredQuery {
            from: vec![CollectionSelector {
                collection_id: self.collection.clone(),
                all_descendants: None,
            }],
            filter: build_filter(&self.filters),
            limit: self.limit,
        })
    }

    /// Execute and return the matching documents, in server order.
    pub async fn fetch(self) -> FirestoreResult<Vec<Document>> {
        let query = self.build()?;
        self.client.run_query(query).await
    }
}

fn build_filter(filters: &[(String, FilterOp, Value)]) -> Option<Filter> {
    match filters {
        [] => None,
        [single] => Some(field_filter(single)),
        many => Some(Filter {
            composite_filter: Some(CompositeFilter {
                op: "AND".to_string(),
                filters: many.iter().map(field_filter).collect(),
            }),
            field_filter: None,
        }),
    }
}

fn field_filter((field, op, value): &(String, FilterOp, Value)) -> Filter {
    Filter {
        composite_filter: None,
        field_filter: Some(FieldFilter {
            field: FieldReference {
                field_path: field.clone(),
            },
            op: op.wire_name().to_string(),
            value: value.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::FirestoreConfig;
    use crate::test_support::SequencedTokenProvider;
    use serde_json::json;
    use std::sync::Arc;

    fn test_client() -> FirestoreClient {
        FirestoreClient::with_token_provider(
            FirestoreConfig::new("test-project"),
            Arc::new(SequencedTokenProvider::new(3600)),
        )
        .unwrap()
    }

    #[test]
    fn test_operator_parsing() {
        assert_eq!(FilterOp::parse("==").unwrap(), FilterOp::Equal);
        assert_eq!(FilterOp::parse(">=").unwrap(), FilterOp::GreaterThanOrEqual);
        assert_eq!(FilterOp::parse("LESS_THAN").unwrap(), FilterOp::LessThan);
        assert!(matches!(
            FilterOp::parse("array-contains"),
            Err(FirestoreError::Validation(_))
        ));
    }

    #[test]
    fn test_single_filter_is_bare() {
        let query = test_client()
            .query("payments")
            .filter("status", FilterOp::Equal, &json!("pending"))
            .build()
            .unwrap();

        let wire = serde_json::to_value(&query).unwrap();
        let filter = &wire["where"];
        assert!(filter.get("fieldFilter").is_some());
        assert!(filter.get("compositeFilter").is_none());
        assert_eq!(filter["fieldFilter"]["op"], "EQUAL");
        assert_eq!(
            filter["fieldFilter"]["value"],
            json!({"stringValue": "pending"})
        );
    }

    #[test]
    fn test_multiple_filters_compose_under_and() {
        let query = test_client()
            .query("payments")
            .filter("status", FilterOp::Equal, &json!("pending"))
            .filter("amount", FilterOp::GreaterThan, &json!(100))
            .build()
            .unwrap();

        let wire = serde_json::to_value(&query).unwrap();
        let composite = &wire["where"]["compositeFilter"];
        assert_eq!(composite["op"], "AND");
        assert_eq!(composite["filters"].as_array().unwrap().len(), 2);
        assert!(wire["where"].get("fieldFilter").is_none());
        assert_eq!(
            composite["filters"][1]["fieldFilter"]["value"],
            json!({"integerValue": "100"})
        );
    }

    #[test]
    fn test_no_filters_omit_where() {
        let query = test_client().query("payments").build().unwrap();
        let wire = serde_json::to_value(&query).unwrap();
        assert!(wire.get("where").is_none());
    }

    #[test]
    fn test_limit_is_carried() {
        let query = test_client().query("payments").limit(25).build().unwrap();
        assert_eq!(query.limit, Some(25));
    }

    #[test]
    fn test_nonpositive_limit_is_rejected() {
        let result = test_client().query("payments").limit(0).build();
        assert!(matches!(result, Err(FirestoreError::Validation(_))));
    }

    #[test]
    fn test_empty_field_path_is_rejected() {
        let result = test_client()
            .query("payments")
            .filter("", FilterOp::Equal, &json!(1))
            .build();
        assert!(matches!(result, Err(FirestoreError::Validation(_))));
    }
}
