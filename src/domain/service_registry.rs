//! Write-once store of declared services.
//!
//! [`ServiceRegistry::load`] consumes parsed [`ServiceRecord`]s, validates
//! them against a [`TargetCatalog`] and builds the [`Service`] tree. After
//! loading the registry is immutable and shared without locking.
//!
//! # Validation
//!
//! - Required attributes: service url and target, method id and name,
//!   page id, field id, key and type.
//! - Uniqueness: service url (case-insensitive), method id and page id
//!   within a service (case-insensitive), field id and key within one
//!   method or page.
//! - The target type must exist in the catalog; a service declaring
//!   methods must use a service-host type exposing an operation with each
//!   method's name.
//! - Re-declaring an identical service, method or page is skipped.

use std::sync::Arc;

use super::records::{FieldRecord, MethodRecord, PageRecord, ServiceRecord};
use super::service::{DataSpec, MethodSpec, PageSpec, Route, Service};
use super::target::{TargetCatalog, TargetType};
use super::value::ValueType;
use crate::error::BusError;

/// Immutable url-to-service lookup built at load time.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: Vec<Service>,
    declared: Vec<ServiceRecord>,
}

impl ServiceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from parsed records.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Config`] on the first record that violates a
    /// required-attribute, uniqueness or target rule; nothing is loaded.
    pub fn load<I>(records: I, catalog: &TargetCatalog) -> Result<Self, BusError>
    where
        I: IntoIterator<Item = ServiceRecord>,
    {
        let mut registry = Self::new();
        for record in records {
            registry.add(record, catalog)?;
        }
        tracing::debug!(
            services = registry.services.len(),
            urls = ?registry.services.iter().map(|s| s.url.as_str()).collect::<Vec<_>>(),
            "service registry loaded"
        );
        Ok(registry)
    }

    fn add(&mut self, record: ServiceRecord, catalog: &TargetCatalog) -> Result<(), BusError> {
        if self.declared.contains(&record) {
            tracing::debug!(url = ?record.url, "identical service re-declared, skipping");
            return Ok(());
        }

        let url = required(record.url.as_deref(), || format!("service {record:?} has no url"))?;
        if self.find_service_by_url(url).is_some() {
            return Err(BusError::Config(format!(
                "service url `{url}` is already registered"
            )));
        }
        let target_name = required(record.target.as_deref(), || {
            format!("service `{url}` has no target type")
        })?;
        let target = catalog.get(target_name).ok_or_else(|| {
            BusError::Config(format!(
                "service `{url}` names unknown target type `{target_name}`"
            ))
        })?;

        let methods = build_methods(url, target, &record.methods)?;
        let pages = build_pages(url, &record.pages)?;

        self.services.push(Service {
            url: url.to_string(),
            target: Arc::clone(target),
            methods,
            pages,
        });
        self.declared.push(record);
        Ok(())
    }

    /// Finds a service by url (case-insensitive).
    #[must_use]
    pub fn find_service_by_url(&self, url: &str) -> Option<&Service> {
        self.services.iter().find(|s| s.url.eq_ignore_ascii_case(url))
    }

    /// Finds a method of `service` by id (case-insensitive).
    #[must_use]
    pub fn find_method_by_id<'a>(&self, service: &'a Service, id: &str) -> Option<&'a MethodSpec> {
        service.find_method_by_id(id)
    }

    /// Finds a page of `service` by id (case-insensitive).
    #[must_use]
    pub fn find_page_by_id<'a>(&self, service: &'a Service, id: &str) -> Option<&'a PageSpec> {
        service.find_page_by_id(id)
    }

    /// Resolves a route to its service and method.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Resolution`] if either the service or the method
    /// is not declared.
    pub fn resolve_method(&self, route: &Route) -> Result<(&Service, &MethodSpec), BusError> {
        let service = self.resolve_service(route)?;
        let method = service.find_method_by_id(&route.id).ok_or_else(|| {
            BusError::Resolution(format!(
                "no method `{}` in service `{}`",
                route.id, service.url
            ))
        })?;
        Ok((service, method))
    }

    /// Resolves a route to its service and page.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Resolution`] if either the service or the page
    /// is not declared.
    pub fn resolve_page(&self, route: &Route) -> Result<(&Service, &PageSpec), BusError> {
        let service = self.resolve_service(route)?;
        let page = service.find_page_by_id(&route.id).ok_or_else(|| {
            BusError::Resolution(format!(
                "no page `{}` in service `{}`",
                route.id, service.url
            ))
        })?;
        Ok((service, page))
    }

    fn resolve_service(&self, route: &Route) -> Result<&Service, BusError> {
        self.find_service_by_url(&route.service).ok_or_else(|| {
            BusError::Resolution(format!("no service registered for url `{}`", route.service))
        })
    }

    /// Number of loaded services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Returns `true` if no service is loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Iterates loaded services in declaration order.
    pub fn services(&self) -> impl Iterator<Item = &Service> {
        self.services.iter()
    }
}

fn required<'a>(
    value: Option<&'a str>,
    describe: impl FnOnce() -> String,
) -> Result<&'a str, BusError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| BusError::Config(describe()))
}

fn build_methods(
    url: &str,
    target: &TargetType,
    records: &[MethodRecord],
) -> Result<Vec<MethodSpec>, BusError> {
    if !records.is_empty() && !target.is_service_host() {
        return Err(BusError::Config(format!(
            "service `{url}` declares methods but target `{}` is not a service host",
            target.name()
        )));
    }

    let mut seen: Vec<&MethodRecord> = Vec::with_capacity(records.len());
    let mut methods: Vec<MethodSpec> = Vec::with_capacity(records.len());
    for record in records {
        if seen.contains(&record) {
            continue;
        }
        let id = required(record.id.as_deref(), || {
            format!("method {record:?} in service `{url}` has no id")
        })?;
        let name = required(record.name.as_deref(), || {
            format!("method `{id}` in service `{url}` has no name")
        })?;
        if !target.has_operation(name) {
            return Err(BusError::Config(format!(
                "method `{id}`: target `{}` has no invocable operation `{name}`",
                target.name()
            )));
        }
        if methods.iter().any(|m| m.id.eq_ignore_ascii_case(id)) {
            return Err(BusError::Config(format!(
                "method id `{id}` already registered in service `{url}`"
            )));
        }
        let data = build_fields(&format!("{url}/{id}"), &record.data)?;
        methods.push(MethodSpec::new(id.to_string(), name.to_string(), data));
        seen.push(record);
    }
    Ok(methods)
}

fn build_pages(url: &str, records: &[PageRecord]) -> Result<Vec<PageSpec>, BusError> {
    let mut seen: Vec<&PageRecord> = Vec::with_capacity(records.len());
    let mut pages: Vec<PageSpec> = Vec::with_capacity(records.len());
    for record in records {
        if seen.contains(&record) {
            continue;
        }
        let id = required(record.id.as_deref(), || {
            format!("page {record:?} in service `{url}` has no id")
        })?;
        if pages.iter().any(|p| p.id.eq_ignore_ascii_case(id)) {
            return Err(BusError::Config(format!(
                "page id `{id}` already registered in service `{url}`"
            )));
        }
        let bundle = build_fields(&format!("{url}/{id}"), &record.bundle)?;
        pages.push(PageSpec {
            id: id.to_string(),
            request_code: record.request_code,
            bundle,
        });
        seen.push(record);
    }
    Ok(pages)
}

fn build_fields(owner: &str, records: &[FieldRecord]) -> Result<Vec<DataSpec>, BusError> {
    let mut fields: Vec<DataSpec> = Vec::with_capacity(records.len());
    for record in records {
        let id = required(record.id.as_deref(), || format!("field in `{owner}` has no id"))?;
        let key = required(record.key.as_deref(), || {
            format!("field `{id}` in `{owner}` has no key")
        })?;
        let type_name = required(record.value_type.as_deref(), || {
            format!("field `{id}` in `{owner}` has no type")
        })?;
        if fields
            .iter()
            .any(|f| f.id == id || f.key.eq_ignore_ascii_case(key))
        {
            return Err(BusError::Config(format!(
                "field id `{id}` or key `{key}` already registered in `{owner}`"
            )));
        }
        fields.push(DataSpec {
            id: id.to_string(),
            key: key.to_string(),
            value_type: ValueType::from_declared(type_name),
            nullable: record.nullable,
        });
    }
    Ok(fields)
}
