//! Translation of flat `table_column` sort keys into nested ordering specs.

use serde_json::{Map, Value};
use service_core::error::AppError;

/// Sort direction understood by the storage layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// A single ordering request: a field path and the value paired with it.
///
/// `customer_name = "asc"` becomes the path `["customer", "name"]` with the
/// value `"asc"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    path: Vec<String>,
    value: String,
}

impl SortSpec {
    /// Field path, outermost segment first.
    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Path segments joined with `.`, as used in error messages.
    pub fn dotted_path(&self) -> String {
        self.path.join(".")
    }

    /// Render as a nested object, e.g. `{"state":{"city":{"zip":"90210"}}}`.
    pub fn to_nested(&self) -> Value {
        self.path
            .iter()
            .rev()
            .fold(Value::String(self.value.clone()), |inner, segment| {
                let mut wrapper = Map::new();
                wrapper.insert(segment.clone(), inner);
                Value::Object(wrapper)
            })
    }

    /// Interpret the value as a direction (`asc` / `desc`, any case).
    pub fn direction(&self) -> Result<SortDirection, AppError> {
        match self.value.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            other => Err(AppError::BadRequest(anyhow::anyhow!(
                "Invalid sort direction '{}': expected 'asc' or 'desc'",
                other
            ))),
        }
    }
}

/// Build a [`SortSpec`] from the first `(key, value)` pair of `flat`.
///
/// Only the first pair is consulted; any others are ignored. The key is
/// split on `_`: the last segment is the innermost field, the preceding
/// segments nest around it. Returns `None` when `flat` is empty, meaning no
/// explicit ordering was requested.
pub fn parse_sort<I, K, V>(flat: I) -> Option<SortSpec>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<String>,
{
    let (key, value) = flat.into_iter().next()?;
    Some(SortSpec {
        path: key.as_ref().split('_').map(str::to_string).collect(),
        value: value.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_input_means_no_ordering() {
        let flat: Vec<(String, String)> = vec![];
        assert_eq!(parse_sort(flat), None);
    }

    #[test]
    fn key_without_underscore_is_a_plain_field() {
        let spec = parse_sort([("city", "Reno")]).unwrap();
        assert_eq!(spec.to_nested(), json!({"city": "Reno"}));
    }

    #[test]
    fn one_underscore_nests_once() {
        let spec = parse_sort([("customer_name", "Gojo")]).unwrap();
        assert_eq!(spec.to_nested(), json!({"customer": {"name": "Gojo"}}));
        assert_eq!(spec.dotted_path(), "customer.name");
    }

    #[test]
    fn every_underscore_adds_a_level() {
        let spec = parse_sort([("state_city_zip", "90210")]).unwrap();
        assert_eq!(
            spec.to_nested(),
            json!({"state": {"city": {"zip": "90210"}}})
        );
    }

    #[test]
    fn only_the_first_pair_is_used() {
        let spec = parse_sort([("dueDate", "desc"), ("name", "asc")]).unwrap();
        assert_eq!(spec.path(), ["dueDate".to_string()]);
        assert_eq!(spec.value(), "desc");
    }

    #[test]
    fn option_pair_is_accepted() {
        let requested = Some(("status".to_string(), "DESC".to_string()));
        let spec = parse_sort(requested).unwrap();
        assert_eq!(spec.direction().unwrap(), SortDirection::Desc);
        assert!(parse_sort(None::<(String, String)>).is_none());
    }

    #[test]
    fn unknown_direction_is_rejected() {
        let spec = parse_sort([("name", "sideways")]).unwrap();
        assert!(matches!(spec.direction(), Err(AppError::BadRequest(_))));
    }
}
