//! Offline discovery from a document export
//!
//! An export is a JSON object keyed by keyspace, each holding an object of
//! document key to document body:
//!
//! ```json
//! {"test": {"customer1": {"type": "Customer", "Name": "John Doe"}}}
//! ```
//!
//! [`DumpStore`] answers the statements the discoverer issues (namespace and
//! keyspace listing, distinct discriminator values, sampling) from the export,
//! so `docql-server discover` can build and persist a schema without a live
//! store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use docql_discover::discoverer::{
    keyspaces_query, sample_query, type_values_query, IDENTITY_KEY, NAMESPACES_QUERY, TYPE_KEY,
};
use docql_discover::{DiscoveryConfig, DiscoveryError, Discoverer, TypeNameMap, DEFAULT_NAMESPACE};
use docql_ir::{Discriminator, DocObject, DocValue, DocumentStore, StoreError};
use thiserror::Error;
use tracing::{info, trace};

use crate::catalog::{CatalogError, SchemaCatalog};

#[derive(Debug, Error)]
pub enum DumpError {
    #[error("Failed to read export {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid export JSON in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid export: keyspace {0} must map document keys to bodies")]
    Shape(String),

    #[error("Discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Document store over an in-memory export, answering discovery statements
pub struct DumpStore {
    namespace: String,
    responses: HashMap<String, Vec<DocObject>>,
}

impl DumpStore {
    pub fn load<P: AsRef<Path>>(
        path: P,
        config: &DiscoveryConfig,
        type_names: &TypeNameMap,
    ) -> Result<Self, DumpError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let contents = std::fs::read_to_string(path).map_err(|source| DumpError::Io {
            path: display.clone(),
            source,
        })?;
        let export: DocObject = serde_json::from_str(&contents).map_err(|source| DumpError::Json {
            path: display,
            source,
        })?;
        Self::from_export(&export, config, type_names)
    }

    pub fn from_export(
        export: &DocObject,
        config: &DiscoveryConfig,
        type_names: &TypeNameMap,
    ) -> Result<Self, DumpError> {
        let namespace = DEFAULT_NAMESPACE;
        let mut responses = HashMap::new();
        responses.insert(
            NAMESPACES_QUERY.to_string(),
            vec![DocObject::new().with("name", namespace)],
        );

        let mut keyspaces = Vec::new();
        for (keyspace, documents) in export.iter() {
            let documents = documents
                .as_object()
                .ok_or_else(|| DumpError::Shape(keyspace.to_string()))?;
            keyspaces.push(
                DocObject::new()
                    .with("name", keyspace)
                    .with("namespace_id", namespace),
            );

            responses.insert(
                sample_query(namespace, keyspace, None, config.sample_size),
                sample_rows(keyspace, documents, None, config.sample_size),
            );

            let Some(attribute) = type_names.get(keyspace) else {
                continue;
            };
            let mut values: Vec<&DocValue> = Vec::new();
            for (_, body) in documents.iter() {
                if let Some(value) = body.as_object().and_then(|b| b.get(attribute)) {
                    if !values.contains(&value) {
                        values.push(value);
                    }
                }
            }
            responses.insert(
                type_values_query(attribute, namespace, keyspace),
                values
                    .iter()
                    .map(|v| DocObject::new().with(TYPE_KEY, (*v).clone()))
                    .collect(),
            );
            for value in values.iter().filter_map(|v| v.as_str()) {
                let discriminator = Discriminator {
                    attribute: attribute.to_string(),
                    value: value.to_string(),
                };
                responses.insert(
                    sample_query(namespace, keyspace, Some(&discriminator), config.sample_size),
                    sample_rows(keyspace, documents, Some(&discriminator), config.sample_size),
                );
            }
        }
        responses.insert(keyspaces_query(namespace), keyspaces);

        Ok(Self {
            namespace: namespace.to_string(),
            responses,
        })
    }
}

fn sample_rows(
    keyspace: &str,
    documents: &DocObject,
    discriminator: Option<&Discriminator>,
    limit: usize,
) -> Vec<DocObject> {
    documents
        .iter()
        .filter(|(_, body)| match discriminator {
            Some(d) => {
                body.as_object()
                    .and_then(|b| b.get(&d.attribute))
                    .and_then(DocValue::as_str)
                    == Some(d.value.as_str())
            }
            None => true,
        })
        .take(limit)
        .map(|(id, body)| {
            DocObject::new()
                .with(IDENTITY_KEY, id)
                .with(keyspace, body.clone())
        })
        .collect()
}

impl DocumentStore for DumpStore {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn execute_query(&self, n1ql: &str) -> Result<Vec<DocObject>, StoreError> {
        match self.responses.get(n1ql) {
            Some(rows) => Ok(rows.clone()),
            None => {
                trace!(query = %n1ql, "Statement not answerable from export");
                Ok(Vec::new())
            }
        }
    }
}

/// Discover a schema from the export at `dump` and persist it at `schema_path`
pub fn discover_export(
    dump: &Path,
    config: &DiscoveryConfig,
    schema_path: impl Into<PathBuf>,
) -> Result<SchemaCatalog, DumpError> {
    let type_names = config.type_names();
    let store = DumpStore::load(dump, config, &type_names)?;
    let schema = Discoverer::new(&store, config, &type_names).discover()?;

    let catalog = SchemaCatalog::new(schema_path, schema);
    catalog.save()?;
    info!(
        export = %dump.display(),
        schema = %catalog.path().display(),
        tables = catalog.schema().tables().len(),
        "Saved discovered schema"
    );
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn export(value: serde_json::Value) -> DocObject {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_partitioned_export() {
        let config = DiscoveryConfig {
            sample_size: 100,
            type_name_list: Some("test:type".to_string()),
        };
        let type_names = config.type_names();
        let store = DumpStore::from_export(
            &export(json!({"test": {
                "customer": {"type": "Customer", "Name": "John Doe"},
                "order": {"type": "Oder", "Items": [{"ItemID": 89123}]}
            }})),
            &config,
            &type_names,
        )
        .unwrap();

        let schema = Discoverer::new(&store, &config, &type_names).discover().unwrap();
        let names: Vec<_> = schema.tables().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Customer", "Oder", "Oder_Items"]);
        assert!(schema.table("Customer").unwrap().column("Items").is_none());
    }

    #[test]
    fn test_sample_size_limits_rows() {
        let config = DiscoveryConfig {
            sample_size: 1,
            type_name_list: None,
        };
        let store = DumpStore::from_export(
            &export(json!({"test": {"a": {"x": 1}, "b": {"y": 2}}})),
            &config,
            &TypeNameMap::empty(),
        )
        .unwrap();
        let rows = store
            .execute_query(&sample_query(DEFAULT_NAMESPACE, "test", None, 1))
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get(IDENTITY_KEY), Some(&DocValue::from("a")));
    }

    #[test]
    fn test_keyspace_must_be_object() {
        let err = DumpStore::from_export(
            &export(json!({"test": [1, 2]})),
            &DiscoveryConfig::default(),
            &TypeNameMap::empty(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, DumpError::Shape(ref ks) if ks == "test"));
    }

    #[test]
    fn test_discover_export_saves_schema() {
        let dir = tempfile::tempdir().unwrap();
        let dump = dir.path().join("export.json");
        let schema_path = dir.path().join("schema.json");
        std::fs::write(
            &dump,
            r#"{"test": {"k1": {"Name": "John Doe", "SavedAddresses": ["123 Main St."]}}}"#,
        )
        .unwrap();

        let catalog = discover_export(&dump, &DiscoveryConfig::default(), &schema_path).unwrap();
        assert!(catalog.schema().table("test_SavedAddresses").is_some());

        let reloaded = SchemaCatalog::load(&schema_path).unwrap();
        assert_eq!(reloaded.schema(), catalog.schema());
    }
}
