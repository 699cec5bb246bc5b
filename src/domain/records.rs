//! Parsed declarative records consumed by [`super::ServiceRegistry`].
//!
//! An external loader turns a markup source into this tree:
//! `service(url, target)` → `method(id, name)` → `data(id, key, type,
//! nullable)`, and `service` → `page(id, requestCode?)` → `bundle(...)`.
//! Required attributes are optional here so that their absence surfaces as
//! a configuration error at load time rather than a parse failure.

use serde::{Deserialize, Serialize};

/// A declared service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    /// Service url (required).
    pub url: Option<String>,
    /// Name of the target type in the catalog (required).
    #[serde(alias = "class")]
    pub target: Option<String>,
    /// Declared methods.
    #[serde(default, rename = "method", alias = "methods")]
    pub methods: Vec<MethodRecord>,
    /// Declared pages.
    #[serde(default, rename = "page", alias = "pages")]
    pub pages: Vec<PageRecord>,
}

/// A declared method.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodRecord {
    /// Method id (required).
    pub id: Option<String>,
    /// Target operation name (required).
    pub name: Option<String>,
    /// Argument fields.
    #[serde(default)]
    pub data: Vec<FieldRecord>,
}

/// A declared page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecord {
    /// Page id (required).
    pub id: Option<String>,
    /// Request code for result-returning navigation.
    #[serde(default, rename = "requestCode", alias = "request_code")]
    pub request_code: Option<i32>,
    /// Bundle fields.
    #[serde(default)]
    pub bundle: Vec<FieldRecord>,
}

/// A declared `data` or `bundle` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRecord {
    /// Payload lookup key (required).
    pub id: Option<String>,
    /// Binding key (required).
    pub key: Option<String>,
    /// Declared type name (required).
    #[serde(rename = "type")]
    pub value_type: Option<String>,
    /// Whether the field may be absent or null. Defaults to `true`.
    #[serde(default = "default_nullable", alias = "isNull")]
    pub nullable: bool,
}

impl Default for FieldRecord {
    fn default() -> Self {
        Self {
            id: None,
            key: None,
            value_type: None,
            nullable: default_nullable(),
        }
    }
}

const fn default_nullable() -> bool {
    true
}

impl ServiceRecord {
    /// Creates a service record with url and target set.
    #[must_use]
    pub fn new(url: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            target: Some(target.into()),
            ..Self::default()
        }
    }

    /// Builder-style method append.
    #[must_use]
    pub fn method(mut self, method: MethodRecord) -> Self {
        self.methods.push(method);
        self
    }

    /// Builder-style page append.
    #[must_use]
    pub fn page(mut self, page: PageRecord) -> Self {
        self.pages.push(page);
        self
    }
}

impl MethodRecord {
    /// Creates a method record with id and name set.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: Some(name.into()),
            data: Vec::new(),
        }
    }

    /// Builder-style field append.
    #[must_use]
    pub fn data(mut self, field: FieldRecord) -> Self {
        self.data.push(field);
        self
    }
}

impl PageRecord {
    /// Creates a page record with an id and optional request code.
    #[must_use]
    pub fn new(id: impl Into<String>, request_code: Option<i32>) -> Self {
        Self {
            id: Some(id.into()),
            request_code,
            bundle: Vec::new(),
        }
    }

    /// Builder-style field append.
    #[must_use]
    pub fn bundle(mut self, field: FieldRecord) -> Self {
        self.bundle.push(field);
        self
    }
}

impl FieldRecord {
    /// Creates a fully specified field record.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        key: impl Into<String>,
        value_type: impl Into<String>,
        nullable: bool,
    ) -> Self {
        Self {
            id: Some(id.into()),
            key: Some(key.into()),
            value_type: Some(value_type.into()),
            nullable,
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_nested_json_tree() {
        let json = r#"[{
            "url": "login",
            "class": "Plug",
            "method": [{
                "id": "m1",
                "name": "startLogin",
                "data": [
                    {"id": "a", "key": "userId", "type": "String", "isNull": false},
                    {"id": "b", "key": "loginType", "type": "int"}
                ]
            }],
            "page": [{"id": "home", "requestCode": 3, "bundle": []}]
        }]"#;
        let Ok(records) = serde_json::from_str::<Vec<ServiceRecord>>(json) else {
            panic!("valid record json");
        };
        let Some(service) = records.first() else {
            panic!("one service");
        };
        assert_eq!(service.target.as_deref(), Some("Plug"));
        let Some(method) = service.methods.first() else {
            panic!("one method");
        };
        assert_eq!(method.data.len(), 2);
        assert_eq!(method.data.first().map(|d| d.nullable), Some(false));
        assert_eq!(method.data.get(1).map(|d| d.nullable), Some(true));
        assert_eq!(service.pages.first().and_then(|p| p.request_code), Some(3));
    }

    #[test]
    fn builders_match_deserialized_form() {
        let built = ServiceRecord::new("login", "Plug").method(
            MethodRecord::new("m1", "startLogin")
                .data(FieldRecord::new("a", "userId", "String", false)),
        );
        let json = r#"{"url":"login","target":"Plug","methods":[{"id":"m1","name":"startLogin",
            "data":[{"id":"a","key":"userId","type":"String","nullable":false}]}]}"#;
        let Ok(parsed) = serde_json::from_str::<ServiceRecord>(json) else {
            panic!("valid record json");
        };
        assert_eq!(built, parsed);
    }
}
