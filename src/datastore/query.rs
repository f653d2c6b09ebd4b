//! Collection query parameters: `filter[field]`, `sort`, `page[limit]`, `page[offset]`, `fields[model]`.

use crate::error::AppError;

pub const DEFAULT_LIMIT: u32 = 100;
pub const MAX_LIMIT: u32 = 1000;

/// `filter[field]=value`. Stores decide the match: case-insensitive substring for analyzed
/// text fields, equality otherwise.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ListQuery {
    pub filters: Vec<FieldFilter>,
    pub sort: Vec<SortKey>,
    pub fields: Option<Vec<String>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl ListQuery {
    /// Parse query string pairs. Unknown parameters are ignored.
    pub fn from_params<I, K, V>(params: I) -> Result<Self, AppError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut q = ListQuery::default();
        for (k, v) in params {
            let (k, v) = (k.as_ref(), v.as_ref());
            if let Some(field) = bracketed(k, "filter") {
                q.filters.push(FieldFilter {
                    field: field.to_string(),
                    value: v.to_string(),
                });
            } else if bracketed(k, "fields").is_some() {
                let fields = v
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect();
                q.fields = Some(fields);
            } else if k == "sort" {
                for part in v.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                    let (descending, field) = match part.strip_prefix('-') {
                        Some(f) => (true, f),
                        None => (false, part.strip_prefix('+').unwrap_or(part)),
                    };
                    q.sort.push(SortKey {
                        field: field.to_string(),
                        descending,
                    });
                }
            } else if k == "page[limit]" {
                q.limit = Some(parse_page(k, v)?);
            } else if k == "page[offset]" {
                q.offset = Some(parse_page(k, v)?);
            }
        }
        Ok(q)
    }

    pub fn effective_limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT)
    }

    pub fn effective_offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }
}

fn bracketed<'a>(key: &'a str, prefix: &str) -> Option<&'a str> {
    key.strip_prefix(prefix)?
        .strip_prefix('[')?
        .strip_suffix(']')
        .filter(|inner| !inner.is_empty())
}

fn parse_page(key: &str, value: &str) -> Result<u32, AppError> {
    value
        .parse()
        .map_err(|_| AppError::BadRequest(format!("{} must be a non-negative integer", key)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_filters_sort_and_paging() {
        let q = ListQuery::from_params([
            ("filter[name]", "ada"),
            ("sort", "-experience,name"),
            ("page[limit]", "5"),
            ("page[offset]", "10"),
            ("fields[profileStats]", "experience, profileCount"),
        ])
        .unwrap();
        assert_eq!(q.filters.len(), 1);
        assert_eq!(q.filters[0].field, "name");
        assert_eq!(
            q.sort,
            vec![
                SortKey { field: "experience".into(), descending: true },
                SortKey { field: "name".into(), descending: false },
            ]
        );
        assert_eq!(q.effective_limit(), 5);
        assert_eq!(q.effective_offset(), 10);
        assert_eq!(q.fields.unwrap(), vec!["experience", "profileCount"]);
    }

    #[test]
    fn limit_is_capped() {
        let q = ListQuery::from_params([("page[limit]", "50000")]).unwrap();
        assert_eq!(q.effective_limit(), MAX_LIMIT);
        assert_eq!(ListQuery::default().effective_limit(), DEFAULT_LIMIT);
    }

    #[test]
    fn bad_page_value_is_rejected() {
        let err = ListQuery::from_params([("page[limit]", "-1")]).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn unknown_params_are_ignored() {
        let q = ListQuery::from_params([("include", "x"), ("filter[]", "y")]).unwrap();
        assert_eq!(q, ListQuery::default());
    }
}
