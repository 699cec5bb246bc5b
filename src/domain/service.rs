//! Declarative routing tree: services, methods, pages and data fields.
//!
//! A [`Service`] maps a url to a [`TargetType`] and owns the [`MethodSpec`]s
//! and [`PageSpec`]s reachable under it. The tree is built once by
//! [`super::ServiceRegistry::load`] and is read-only afterwards; the only
//! interior state is the per-method call plan, computed on first call.

use std::fmt;
use std::sync::{Arc, OnceLock};

use super::target::{CallPlan, TargetType, plan_call};
use super::value::ValueType;
use crate::error::BusError;

/// One typed field of a method's argument list or a page's bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSpec {
    /// Payload lookup key.
    pub id: String,
    /// Binding name matched against the target's declared slot.
    pub key: String,
    /// Declared type the payload value is coerced to.
    pub value_type: ValueType,
    /// Whether an absent or null payload value is acceptable.
    pub nullable: bool,
}

/// An invocable operation declared under a service.
pub struct MethodSpec {
    /// Identifier unique within the owning service.
    pub id: String,
    /// Name of the target operation to invoke.
    pub name: String,
    /// Ordered argument fields.
    pub data: Vec<DataSpec>,
    plan: OnceLock<Result<Arc<CallPlan>, String>>,
}

impl MethodSpec {
    /// Creates a method spec with no resolved plan.
    #[must_use]
    pub fn new(id: String, name: String, data: Vec<DataSpec>) -> Self {
        Self {
            id,
            name,
            data,
            plan: OnceLock::new(),
        }
    }

    /// Returns the call plan against `target`, resolving it on first use.
    ///
    /// The outcome, success or failure, is computed once and reused for
    /// every later call.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Binding`] if no operation on `target` or its
    /// ancestors matches the declared data list exactly.
    pub fn plan(&self, target: &TargetType) -> Result<Arc<CallPlan>, BusError> {
        let cached = self
            .plan
            .get_or_init(|| plan_call(target, &self.name, &self.data).map(Arc::new));
        match cached {
            Ok(plan) => Ok(Arc::clone(plan)),
            Err(message) => Err(BusError::Binding(message.clone())),
        }
    }
}

impl fmt::Debug for MethodSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodSpec")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("data", &self.data)
            .field("planned", &self.plan.get().is_some())
            .finish()
    }
}

/// A navigable destination declared under a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSpec {
    /// Identifier unique within the owning service.
    pub id: String,
    /// Request code for result-returning navigation; only values `> 0`
    /// count as set.
    pub request_code: Option<i32>,
    /// Ordered bundle fields.
    pub bundle: Vec<DataSpec>,
}

impl PageSpec {
    /// Returns the request code if it asks for a result.
    #[must_use]
    pub fn result_request_code(&self) -> Option<i32> {
        self.request_code.filter(|code| *code > 0)
    }
}

/// A url-addressed capability with its target type and declared entries.
#[derive(Debug)]
pub struct Service {
    /// Unique url (matched case-insensitively).
    pub url: String,
    /// Type whose operations back the methods, or which is the
    /// navigation destination for the pages.
    pub target: Arc<TargetType>,
    /// Declared methods.
    pub methods: Vec<MethodSpec>,
    /// Declared pages.
    pub pages: Vec<PageSpec>,
}

impl Service {
    /// Finds a method by id (case-insensitive).
    #[must_use]
    pub fn find_method_by_id(&self, id: &str) -> Option<&MethodSpec> {
        self.methods.iter().find(|m| m.id.eq_ignore_ascii_case(id))
    }

    /// Finds a page by id (case-insensitive).
    #[must_use]
    pub fn find_page_by_id(&self, id: &str) -> Option<&PageSpec> {
        self.pages.iter().find(|p| p.id.eq_ignore_ascii_case(id))
    }
}

/// A parsed `"<service-url>/<id>"` address.
///
/// The split happens at the last `/`, so service urls may themselves
/// contain slashes (`"app://user/login/m1"` → `"app://user/login"`, `"m1"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Route {
    /// Service component.
    pub service: String,
    /// Method or page component.
    pub id: String,
}

impl Route {
    /// Builds a route from its parts.
    #[must_use]
    pub fn new(service: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            id: id.into(),
        }
    }

    /// Parses a textual url.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Resolution`] if either component is empty.
    pub fn parse(url: &str) -> Result<Self, BusError> {
        match url.rsplit_once('/') {
            Some((service, id)) if !service.is_empty() && !id.is_empty() => {
                Ok(Self::new(service, id))
            }
            _ => Err(BusError::Resolution(format!(
                "url `{url}` is not of the form <service>/<id>"
            ))),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service, self.id)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn route_splits_at_last_slash() {
        let Ok(route) = Route::parse("app://user/login/m1") else {
            panic!("valid url");
        };
        assert_eq!(route.service, "app://user/login");
        assert_eq!(route.id, "m1");
        assert_eq!(route.to_string(), "app://user/login/m1");
    }

    #[test]
    fn route_rejects_missing_components() {
        for url in ["login", "login/", "/m1", ""] {
            let Err(err) = Route::parse(url) else {
                panic!("`{url}` should not parse");
            };
            assert!(matches!(err, BusError::Resolution(_)));
        }
    }

    #[test]
    fn request_code_counts_only_when_positive() {
        let mut page = PageSpec {
            id: "p".to_string(),
            request_code: Some(0),
            bundle: Vec::new(),
        };
        assert_eq!(page.result_request_code(), None);
        page.request_code = Some(7);
        assert_eq!(page.result_request_code(), Some(7));
        page.request_code = None;
        assert_eq!(page.result_request_code(), None);
    }

    #[test]
    fn lookups_ignore_case() {
        let service = Service {
            url: "login".to_string(),
            target: Arc::new(TargetType::new("Plug")),
            methods: vec![MethodSpec::new("M1".to_string(), "go".to_string(), Vec::new())],
            pages: vec![PageSpec {
                id: "Home".to_string(),
                request_code: None,
                bundle: Vec::new(),
            }],
        };
        assert!(service.find_method_by_id("m1").is_some());
        assert!(service.find_page_by_id("HOME").is_some());
        assert!(service.find_method_by_id("m2").is_none());
    }
}
