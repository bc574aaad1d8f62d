//! Query descriptor building and pagination utilities
//!
//! Combines the parsed filter predicate with sort, pagination, and projection
//! parameters into one bounded [`QueryDescriptor`] — the only shape handed to
//! a store driver for a read.
//!
//! # Example
//! ```rust,ignore
//! // GET /users?age__gte=18&sort=-age,name&page=2&limit=10&fields=name,age
//! let descriptor = builder.build(&params)?;
//! // descriptor.skip == 10, descriptor.limit == 10
//! // descriptor.sort == [("age", Desc), ("name", Asc)]
//! ```

use crate::core::error::{CorralError, CorralResult};
use crate::core::filter::{FilterLimits, FilterParser, FilterPredicate, RESERVED_PREFIX};
use crate::core::schema::SchemaAdapter;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

/// Sort direction for one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// The complete bundle of predicate, sort, pagination, and projection for
/// one read. `skip`/`limit` are always present; `limit` is already clamped.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDescriptor {
    pub predicate: FilterPredicate,
    /// Ordered field → direction pairs; empty means store order.
    pub sort: Vec<(String, SortOrder)>,
    pub skip: usize,
    pub limit: usize,
    /// Field names to include; `None` returns all fields.
    pub projection: Option<Vec<String>>,
}

impl QueryDescriptor {
    /// Page number this descriptor corresponds to (1-based).
    pub fn page(&self) -> usize {
        self.skip / self.limit.max(1) + 1
    }

    /// Apply the projection to one document; `id` always survives. Without
    /// a projection the document passes through unchanged.
    pub fn project(&self, doc: &Value) -> Value {
        let Some(projection) = &self.projection else {
            return doc.clone();
        };
        let Some(obj) = doc.as_object() else {
            return doc.clone();
        };
        let mut out = serde_json::Map::new();
        if let Some(id) = obj.get("id") {
            out.insert("id".to_string(), id.clone());
        }
        for field in projection {
            if let Some(value) = obj.get(field) {
                out.insert(field.clone(), value.clone());
            }
        }
        Value::Object(out)
    }
}

/// Pagination metadata attached to list responses
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PaginationMeta {
    /// Current page number (starts at 1)
    pub page: usize,

    /// Number of items per page
    pub limit: usize,

    /// Total number of items (after filters)
    pub total: usize,

    /// Total number of pages
    #[serde(rename = "totalPages")]
    pub total_pages: usize,
}

impl PaginationMeta {
    /// Create pagination metadata from calculation
    pub fn new(page: usize, limit: usize, total: usize) -> Self {
        // Ensure limit is at least 1 to avoid division by zero
        let limit = limit.max(1);
        let total_pages = if total == 0 { 0 } else { total.div_ceil(limit) };
        Self {
            page,
            limit,
            total,
            total_pages,
        }
    }
}

/// Query builder bound to one collection's configuration.
pub struct QueryBuilder<'a> {
    schema: Option<&'a dyn SchemaAdapter>,
    allowed_filter_fields: Option<&'a [String]>,
    allowed_sort_fields: Option<&'a [String]>,
    /// Applied only when no `sort` parameter is present.
    default_sort: Option<&'a str>,
    filter_limits: FilterLimits,
    default_limit: usize,
    max_limit: usize,
}

impl<'a> QueryBuilder<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        schema: Option<&'a dyn SchemaAdapter>,
        allowed_filter_fields: Option<&'a [String]>,
        allowed_sort_fields: Option<&'a [String]>,
        default_sort: Option<&'a str>,
        filter_limits: FilterLimits,
        default_limit: usize,
        max_limit: usize,
    ) -> Self {
        Self {
            schema,
            allowed_filter_fields,
            allowed_sort_fields,
            default_sort,
            filter_limits,
            default_limit,
            max_limit,
        }
    }

    /// Build a complete descriptor from raw query parameters.
    pub fn build(&self, params: &IndexMap<String, String>) -> CorralResult<QueryDescriptor> {
        let parser = FilterParser::new(self.schema, self.allowed_filter_fields, self.filter_limits);
        let predicate = parser.parse(params)?;

        let sort_expr = match params.get("sort").map(String::as_str) {
            Some(expr) if !expr.is_empty() => Some(expr),
            _ => self.default_sort,
        };
        let sort = match sort_expr {
            Some(expr) => self.parse_sort(expr)?,
            None => Vec::new(),
        };

        let (skip, limit) = self.parse_pagination(params);
        let projection = self.parse_projection(params.get("fields").map(String::as_str))?;

        Ok(QueryDescriptor {
            predicate,
            sort,
            skip,
            limit,
            projection,
        })
    }

    /// Parse `sort=-age,name`. Later duplicates refine ordering but do not
    /// remove earlier entries.
    fn parse_sort(&self, expr: &str) -> CorralResult<Vec<(String, SortOrder)>> {
        let mut sort = Vec::new();
        for entry in expr.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let (field, order) = match entry.strip_prefix('-') {
                Some(field) => (field, SortOrder::Desc),
                None => (entry, SortOrder::Asc),
            };
            if field.starts_with(RESERVED_PREFIX) {
                return Err(CorralError::bad_request(
                    "RESERVED_FIELD_PREFIX",
                    format!("sort field '{}' uses the reserved '$' prefix", field),
                ));
            }
            if !self.sortable(field) {
                return Err(CorralError::bad_request(
                    "INVALID_SORT_FIELD",
                    format!("field '{}' is not sortable", field),
                ));
            }
            sort.push((field.to_string(), order));
        }
        Ok(sort)
    }

    fn sortable(&self, field: &str) -> bool {
        match self.allowed_sort_fields {
            Some(list) => list.iter().any(|f| f == field),
            None => match self.schema {
                Some(schema) => schema.fields().iter().any(|f| f == field),
                None => true,
            },
        }
    }

    /// Lenient pagination: bad input resets to defaults, oversized limits
    /// clamp down. Never a validation error.
    fn parse_pagination(&self, params: &IndexMap<String, String>) -> (usize, usize) {
        let page = params
            .get("page")
            .and_then(|raw| raw.parse::<i64>().ok())
            .filter(|p| *p > 0)
            .unwrap_or(1) as usize;

        let limit = params
            .get("limit")
            .and_then(|raw| raw.parse::<i64>().ok())
            .filter(|l| *l > 0)
            .map(|l| (l as usize).min(self.max_limit))
            .unwrap_or(self.default_limit);

        // Saturate rather than overflow: absurd page numbers are lenient
        // input like everything else here, yielding an empty page.
        (page.saturating_sub(1).saturating_mul(limit), limit)
    }

    fn parse_projection(&self, fields: Option<&str>) -> CorralResult<Option<Vec<String>>> {
        let Some(fields) = fields else {
            return Ok(None);
        };
        let mut projection = Vec::new();
        for entry in fields.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            if entry.starts_with(RESERVED_PREFIX) {
                return Err(CorralError::bad_request(
                    "RESERVED_FIELD_PREFIX",
                    format!("projection field '{}' uses the reserved '$' prefix", entry),
                ));
            }
            let known = match self.allowed_filter_fields {
                Some(list) => list.iter().any(|f| f == entry),
                None => match self.schema {
                    Some(schema) => schema.fields().iter().any(|f| f == entry),
                    None => true,
                },
            };
            if !known {
                return Err(CorralError::bad_request(
                    "INVALID_PROJECTION_FIELD",
                    format!("field '{}' cannot be projected", entry),
                ));
            }
            projection.push(entry.to_string());
        }
        // Empty set means "all fields", not "no fields".
        Ok(if projection.is_empty() {
            None
        } else {
            Some(projection)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{FieldDef, FieldType, StaticSchema};

    fn schema() -> StaticSchema {
        StaticSchema::new()
            .field("name", FieldDef::required(FieldType::String))
            .field("age", FieldDef::optional(FieldType::Number))
            .field("created_at", FieldDef::optional(FieldType::Date))
    }

    fn params(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn builder(schema: &StaticSchema) -> QueryBuilder<'_> {
        QueryBuilder::new(
            Some(schema),
            None,
            None,
            None,
            FilterLimits::default(),
            20,
            100,
        )
    }

    #[test]
    fn test_defaults() {
        let schema = schema();
        let descriptor = builder(&schema).build(&params(&[])).unwrap();
        assert!(descriptor.predicate.is_empty());
        assert!(descriptor.sort.is_empty());
        assert_eq!(descriptor.skip, 0);
        assert_eq!(descriptor.limit, 20);
        assert!(descriptor.projection.is_none());
        assert_eq!(descriptor.page(), 1);
    }

    #[test]
    fn test_sort_parsing() {
        let schema = schema();
        let descriptor = builder(&schema)
            .build(&params(&[("sort", "-age, name")]))
            .unwrap();
        assert_eq!(
            descriptor.sort,
            vec![
                ("age".to_string(), SortOrder::Desc),
                ("name".to_string(), SortOrder::Asc),
            ]
        );
    }

    #[test]
    fn test_sort_duplicates_kept() {
        let schema = schema();
        let descriptor = builder(&schema)
            .build(&params(&[("sort", "age,-age")]))
            .unwrap();
        assert_eq!(descriptor.sort.len(), 2);
    }

    #[test]
    fn test_sort_whitelist() {
        let schema = schema();
        let allowed_sort = vec!["age".to_string()];
        let builder = QueryBuilder::new(
            Some(&schema),
            None,
            Some(&allowed_sort),
            None,
            FilterLimits::default(),
            20,
            100,
        );
        assert!(builder.build(&params(&[("sort", "age")])).is_ok());
        let err = builder.build(&params(&[("sort", "name")])).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_SORT_FIELD");
    }

    #[test]
    fn test_sort_reserved_prefix_rejected_despite_whitelist() {
        let schema = schema();
        let descriptor = builder(&schema).build(&params(&[("sort", "$natural")]));
        assert_eq!(
            descriptor.unwrap_err().error_code(),
            "RESERVED_FIELD_PREFIX"
        );
    }

    #[test]
    fn test_default_sort_applies_only_without_param() {
        let schema = schema();
        let builder = QueryBuilder::new(
            Some(&schema),
            None,
            None,
            Some("-created_at"),
            FilterLimits::default(),
            20,
            100,
        );

        let descriptor = builder.build(&params(&[])).unwrap();
        assert_eq!(
            descriptor.sort,
            vec![("created_at".to_string(), SortOrder::Desc)]
        );

        let descriptor = builder.build(&params(&[("sort", "age")])).unwrap();
        assert_eq!(descriptor.sort, vec![("age".to_string(), SortOrder::Asc)]);
    }

    #[test]
    fn test_pagination_skip_calculation() {
        let schema = schema();
        let descriptor = builder(&schema)
            .build(&params(&[("page", "3"), ("limit", "10")]))
            .unwrap();
        assert_eq!(descriptor.skip, 20);
        assert_eq!(descriptor.limit, 10);
        assert_eq!(descriptor.page(), 3);
    }

    #[test]
    fn test_pagination_clamp_not_error() {
        let schema = schema();
        let descriptor = builder(&schema)
            .build(&params(&[("limit", "1000")]))
            .unwrap();
        assert_eq!(descriptor.limit, 100);
    }

    #[test]
    fn test_pagination_lenient_on_garbage() {
        let schema = schema();
        let descriptor = builder(&schema)
            .build(&params(&[("page", "minus-two"), ("limit", "-5")]))
            .unwrap();
        assert_eq!(descriptor.skip, 0);
        assert_eq!(descriptor.limit, 20);
    }

    #[test]
    fn test_pagination_huge_page_saturates() {
        let schema = schema();
        let descriptor = builder(&schema)
            .build(&params(&[("page", "9223372036854775807"), ("limit", "20")]))
            .unwrap();
        // skip caps out instead of overflowing; the page is just empty.
        assert_eq!(descriptor.skip, usize::MAX);
        assert_eq!(descriptor.limit, 20);
    }

    #[test]
    fn test_projection_parsing() {
        let schema = schema();
        let descriptor = builder(&schema)
            .build(&params(&[("fields", " name , age ")]))
            .unwrap();
        assert_eq!(
            descriptor.projection,
            Some(vec!["name".to_string(), "age".to_string()])
        );
    }

    #[test]
    fn test_projection_rejections() {
        let schema = schema();
        let err = builder(&schema)
            .build(&params(&[("fields", "$where")]))
            .unwrap_err();
        assert_eq!(err.error_code(), "RESERVED_FIELD_PREFIX");

        let err = builder(&schema)
            .build(&params(&[("fields", "secret")]))
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_PROJECTION_FIELD");
    }

    #[test]
    fn test_projection_empty_means_all_fields() {
        let schema = schema();
        let descriptor = builder(&schema).build(&params(&[("fields", " , ")])).unwrap();
        assert!(descriptor.projection.is_none());
    }

    #[test]
    fn test_pagination_meta() {
        let meta = PaginationMeta::new(1, 20, 145);
        assert_eq!(meta.total, 145);
        assert_eq!(meta.total_pages, 8);

        let empty = PaginationMeta::new(1, 20, 0);
        assert_eq!(empty.total_pages, 0);
    }

    #[test]
    fn test_pagination_meta_wire_shape() {
        let json = serde_json::to_value(PaginationMeta::new(2, 10, 35)).unwrap();
        assert_eq!(json["page"], 2);
        assert_eq!(json["limit"], 10);
        assert_eq!(json["total"], 35);
        assert_eq!(json["totalPages"], 4);
    }
}
