//! Name-to-id lookups for the search schema.
//!
//! Resource types, search parameters, compartment types, systems and
//! quantity codes are stored as small integer ids. The model is shared
//! read-only by concurrent searches.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::error::{QueryError, SearchError, StorageResult};

/// Read-only lookups the query generator needs.
pub trait SearchModel: Send + Sync {
    /// Id of a resource type by name.
    fn resource_type_id(&self, resource_type: &str) -> Option<i16>;

    /// Name of a resource type by id.
    fn resource_type_name(&self, resource_type_id: i16) -> Option<String>;

    /// Id of a search parameter by canonical URL.
    fn search_param_id(&self, url: &str) -> Option<i16>;

    /// Id of a compartment type by name.
    fn compartment_type_id(&self, compartment_type: &str) -> Option<u8>;

    /// Id of a system, if it has been seen.
    fn system_id(&self, system: &str) -> Option<i32>;

    /// Id of a quantity code, if it has been seen.
    fn quantity_code_id(&self, code: &str) -> Option<i32>;
}

/// Looks up a resource type id, failing for unknown types.
pub(crate) fn require_resource_type_id(
    model: &dyn SearchModel,
    resource_type: &str,
) -> StorageResult<i16> {
    model.resource_type_id(resource_type).ok_or_else(|| {
        SearchError::UnknownResourceType {
            resource_type: resource_type.to_string(),
        }
        .into()
    })
}

/// Looks up a search parameter id, failing for unregistered parameters.
pub(crate) fn require_search_param_id(model: &dyn SearchModel, url: &str) -> StorageResult<i16> {
    model.search_param_id(url).ok_or_else(|| {
        QueryError::UnknownSearchParameter {
            url: url.to_string(),
        }
        .into()
    })
}

#[derive(Debug, Default)]
struct ModelTables {
    resource_types: HashMap<String, i16>,
    resource_type_names: HashMap<i16, String>,
    search_params: HashMap<String, i16>,
    compartment_types: HashMap<String, u8>,
    systems: HashMap<String, i32>,
    quantity_codes: HashMap<String, i32>,
}

/// A [`SearchModel`] held in memory.
///
/// Typically loaded once from the schema's lookup tables at startup; systems
/// and quantity codes may be added as new values are written.
#[derive(Debug, Default)]
pub struct InMemorySearchModel {
    tables: RwLock<ModelTables>,
}

impl InMemorySearchModel {
    /// Creates an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a resource type.
    pub fn add_resource_type(&self, name: impl Into<String>, id: i16) {
        let name = name.into();
        let mut tables = self.tables.write();
        tables.resource_type_names.insert(id, name.clone());
        tables.resource_types.insert(name, id);
    }

    /// Registers a search parameter by URL.
    pub fn add_search_param(&self, url: impl Into<String>, id: i16) {
        self.tables.write().search_params.insert(url.into(), id);
    }

    /// Registers a compartment type.
    pub fn add_compartment_type(&self, name: impl Into<String>, id: u8) {
        self.tables.write().compartment_types.insert(name.into(), id);
    }

    /// Registers a system.
    pub fn add_system(&self, system: impl Into<String>, id: i32) {
        self.tables.write().systems.insert(system.into(), id);
    }

    /// Registers a quantity code.
    pub fn add_quantity_code(&self, code: impl Into<String>, id: i32) {
        self.tables.write().quantity_codes.insert(code.into(), id);
    }
}

impl SearchModel for InMemorySearchModel {
    fn resource_type_id(&self, resource_type: &str) -> Option<i16> {
        self.tables.read().resource_types.get(resource_type).copied()
    }

    fn resource_type_name(&self, resource_type_id: i16) -> Option<String> {
        self.tables
            .read()
            .resource_type_names
            .get(&resource_type_id)
            .cloned()
    }

    fn search_param_id(&self, url: &str) -> Option<i16> {
        self.tables.read().search_params.get(url).copied()
    }

    fn compartment_type_id(&self, compartment_type: &str) -> Option<u8> {
        self.tables
            .read()
            .compartment_types
            .get(compartment_type)
            .copied()
    }

    fn system_id(&self, system: &str) -> Option<i32> {
        self.tables.read().systems.get(system).copied()
    }

    fn quantity_code_id(&self, code: &str) -> Option<i32> {
        self.tables.read().quantity_codes.get(code).copied()
    }
}
