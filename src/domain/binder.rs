//! Payload-to-argument binding shared by `call` and `open`.
//!
//! [`ParameterBinder`] walks an ordered [`DataSpec`] list, looks each field
//! up in the payload by id, enforces nullability and coerces the value to
//! the declared type. Method calls consume the ordered result directly;
//! navigation folds it into a key-addressed [`Bundle`].

use std::collections::BTreeMap;

use super::service::DataSpec;
use super::value::{BoundValue, FromBound};
use super::Payload;
use crate::error::BusError;

/// Stateless binder applying the single coercion contract.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParameterBinder;

impl ParameterBinder {
    /// Binds every field of `specs`, in order.
    ///
    /// A missing payload behaves like a payload where every field is
    /// absent. Null values of nullable fields yield `None`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Binding`] naming the field id and key when a
    /// required field is absent or null, or when a value cannot be
    /// coerced to its declared type.
    pub fn bind(
        specs: &[DataSpec],
        payload: Option<&Payload>,
    ) -> Result<Vec<Option<BoundValue>>, BusError> {
        specs
            .iter()
            .map(|spec| Self::bind_one(spec, payload))
            .collect()
    }

    /// Binds `specs` into a bundle keyed by each field's binding key.
    /// Null nullable fields are left out.
    ///
    /// # Errors
    ///
    /// Same as [`ParameterBinder::bind`].
    pub fn bundle(specs: &[DataSpec], payload: Option<&Payload>) -> Result<Bundle, BusError> {
        let values = Self::bind(specs, payload)?;
        let entries = specs
            .iter()
            .zip(values)
            .filter_map(|(spec, value)| value.map(|v| (spec.key.clone(), v)))
            .collect();
        Ok(Bundle(entries))
    }

    /// Returns the first field that cannot be satisfied without a payload.
    #[must_use]
    pub fn first_required(specs: &[DataSpec]) -> Option<&DataSpec> {
        specs.iter().find(|spec| !spec.nullable)
    }

    fn bind_one(
        spec: &DataSpec,
        payload: Option<&Payload>,
    ) -> Result<Option<BoundValue>, BusError> {
        match payload.and_then(|p| p.get(&spec.id)) {
            None if spec.nullable => Ok(None),
            None => Err(BusError::Binding(format!(
                "field id `{}` (key `{}`) is required but missing or null",
                spec.id, spec.key
            ))),
            Some(value) => spec.value_type.coerce(value).map(Some).map_err(|e| {
                BusError::Binding(format!("field id `{}` (key `{}`): {e}", spec.id, spec.key))
            }),
        }
    }
}

/// Key-addressed values built for a navigation request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bundle(BTreeMap<String, BoundValue>);

impl Bundle {
    /// Returns the value under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&BoundValue> {
        self.0.get(key)
    }

    /// Reads and converts the value under `key`.
    ///
    /// # Errors
    ///
    /// Returns a description of the mismatch if the key is absent or holds
    /// another type.
    pub fn get_as<T: FromBound>(&self, key: &str) -> Result<T, String> {
        T::from_bound(self.0.get(key))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the bundle has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &BoundValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::value::ValueType;
    use serde_json::Value;

    fn spec(id: &str, key: &str, value_type: ValueType, nullable: bool) -> DataSpec {
        DataSpec {
            id: id.to_string(),
            key: key.to_string(),
            value_type,
            nullable,
        }
    }

    fn login_specs() -> Vec<DataSpec> {
        vec![
            spec("a", "userId", ValueType::String, false),
            spec("b", "loginType", ValueType::Integer, false),
            spec("c", "remember", ValueType::Boolean, true),
        ]
    }

    #[test]
    fn binds_in_declaration_order() {
        let payload = Payload::new().with("b", 2).with("a", "u1");
        let Ok(values) = ParameterBinder::bind(&login_specs(), Some(&payload)) else {
            panic!("payload satisfies every required field");
        };
        assert_eq!(
            values,
            vec![
                Some(BoundValue::String("u1".to_string())),
                Some(BoundValue::Integer(2)),
                None
            ]
        );
    }

    #[test]
    fn missing_required_field_names_id_and_key() {
        let payload = Payload::new().with("a", "u1");
        let Err(err) = ParameterBinder::bind(&login_specs(), Some(&payload)) else {
            panic!("field b is required");
        };
        let msg = err.to_string();
        assert!(matches!(err, BusError::Binding(_)));
        assert!(msg.contains("`b`"));
        assert!(msg.contains("loginType"));
    }

    #[test]
    fn explicit_null_is_treated_as_missing() {
        let payload = Payload::new().with("a", Value::Null).with("b", 1);
        assert!(ParameterBinder::bind(&login_specs(), Some(&payload)).is_err());
    }

    #[test]
    fn coercion_failure_is_a_binding_error() {
        let payload = Payload::new().with("a", "u1").with("b", "two");
        let Err(err) = ParameterBinder::bind(&login_specs(), Some(&payload)) else {
            panic!("\"two\" is not an integer");
        };
        assert!(matches!(err, BusError::Binding(_)));
    }

    #[test]
    fn bundle_is_keyed_by_binding_key_and_skips_nulls() {
        let payload = Payload::new().with("a", "u1").with("b", 3);
        let Ok(bundle) = ParameterBinder::bundle(&login_specs(), Some(&payload)) else {
            panic!("bundle should build");
        };
        assert_eq!(bundle.len(), 2);
        assert_eq!(bundle.get_as::<String>("userId").ok(), Some("u1".to_string()));
        assert_eq!(bundle.get_as::<i32>("loginType").ok(), Some(3));
        assert!(bundle.get("remember").is_none());
    }

    #[test]
    fn no_payload_only_satisfies_nullable_fields() {
        let optional = vec![spec("c", "remember", ValueType::Boolean, true)];
        let Ok(bundle) = ParameterBinder::bundle(&optional, None) else {
            panic!("nullable-only specs accept no payload");
        };
        assert!(bundle.is_empty());
        assert!(ParameterBinder::first_required(&optional).is_none());

        let specs = login_specs();
        let Some(required) = ParameterBinder::first_required(&specs) else {
            panic!("login specs have required fields");
        };
        assert_eq!(required.id, "a");
        assert!(ParameterBinder::bind(&specs, None).is_err());
    }
}
