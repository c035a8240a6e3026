//! Schema discovery
//!
//! Samples each keyspace, walks every sampled document, and grows a
//! normalized relational schema from what it sees. Nested objects flatten into
//! their owning table under prefixed column names; every array level becomes
//! a child table with an identity foreign key and a position column.

use docql_ir::{
    quote_identifier, Column, ColumnRole, DataType, Discriminator, DocObject, DocValue,
    DocumentStore, LogicalTable, Schema, SourcePath, DOCUMENT_ID,
};
use tracing::{debug, info, trace, warn};

use crate::config::DiscoveryConfig;
use crate::infer::{infer_type, widen};
use crate::typename::TypeNameMap;
use crate::DiscoveryError;

pub const DEFAULT_NAMESPACE: &str = "default";

/// Row key carrying the sampled document's identity
pub const IDENTITY_KEY: &str = "PK";

/// Row key carrying a distinct discriminator value
pub const TYPE_KEY: &str = "$type";

pub const NAMESPACES_QUERY: &str = "SELECT name FROM system:namespaces";

pub fn keyspaces_query(namespace: &str) -> String {
    format!(
        "SELECT name, namespace_id FROM system:keyspaces WHERE namespace_id = {}",
        quote_string(namespace)
    )
}

pub fn type_values_query(attribute: &str, namespace: &str, keyspace: &str) -> String {
    format!(
        "SELECT DISTINCT {} AS {} FROM {}:{}",
        quote_identifier(attribute),
        quote_identifier(TYPE_KEY),
        quote_identifier(namespace),
        quote_identifier(keyspace)
    )
}

pub fn sample_query(
    namespace: &str,
    keyspace: &str,
    discriminator: Option<&Discriminator>,
    sample_size: usize,
) -> String {
    let ks = quote_identifier(keyspace);
    let mut query = format!(
        "SELECT META({ks}).id AS {}, {ks} FROM {}:{ks}",
        quote_identifier(IDENTITY_KEY),
        quote_identifier(namespace),
    );
    if let Some(d) = discriminator {
        query.push_str(&format!(
            " WHERE {} = {}",
            quote_identifier(&d.attribute),
            quote_string(&d.value)
        ));
    }
    query.push_str(&format!(" LIMIT {}", sample_size));
    query
}

fn quote_string(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub struct Discoverer<'a, S: DocumentStore> {
    store: S,
    config: &'a DiscoveryConfig,
    type_names: &'a TypeNameMap,
}

impl<'a, S: DocumentStore> Discoverer<'a, S> {
    pub fn new(store: S, config: &'a DiscoveryConfig, type_names: &'a TypeNameMap) -> Self {
        Self {
            store,
            config,
            type_names,
        }
    }

    /// Discover every keyspace of the store's namespace, in listing order
    pub fn discover(&self) -> Result<Schema, DiscoveryError> {
        self.config.validate()?;
        let namespace = self.resolve_namespace()?;
        let keyspaces = self.list_keyspaces(&namespace)?;
        info!(namespace = %namespace, keyspaces = keyspaces.len(), "Starting schema discovery");

        let mut schema = Schema::new();
        for keyspace in &keyspaces {
            self.discover_into(&mut schema, &keyspaces, &namespace, keyspace)?;
        }
        schema.register_procedures();

        info!(tables = schema.tables().len(), "Schema discovery complete");
        Ok(schema)
    }

    /// Discover a single keyspace
    pub fn discover_keyspace(&self, keyspace: &str) -> Result<Schema, DiscoveryError> {
        self.config.validate()?;
        let namespace = self.resolve_namespace()?;
        let mut schema = Schema::new();
        self.discover_into(&mut schema, &[keyspace.to_string()], &namespace, keyspace)?;
        schema.register_procedures();
        Ok(schema)
    }

    fn resolve_namespace(&self) -> Result<String, DiscoveryError> {
        let wanted = self.store.namespace();
        let rows = self.store.execute_query(NAMESPACES_QUERY)?;
        let listed = rows
            .iter()
            .any(|row| row.get("name").and_then(DocValue::as_str) == Some(wanted));
        if listed {
            Ok(wanted.to_string())
        } else {
            debug!(namespace = %wanted, fallback = DEFAULT_NAMESPACE, "Namespace not listed, using default");
            Ok(DEFAULT_NAMESPACE.to_string())
        }
    }

    fn list_keyspaces(&self, namespace: &str) -> Result<Vec<String>, DiscoveryError> {
        let rows = self.store.execute_query(&keyspaces_query(namespace))?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get("name").and_then(DocValue::as_str))
            .map(str::to_string)
            .collect())
    }

    fn discover_into(
        &self,
        schema: &mut Schema,
        keyspaces: &[String],
        namespace: &str,
        keyspace: &str,
    ) -> Result<(), DiscoveryError> {
        let candidates = self.candidate_tables(schema, keyspaces, namespace, keyspace)?;

        for (table_name, discriminator) in candidates {
            let query = sample_query(
                namespace,
                keyspace,
                discriminator.as_ref(),
                self.config.sample_size,
            );
            trace!(query = %query, "Sampling documents");
            let rows = self.store.execute_query(&query)?;

            for row in &rows {
                let id = row
                    .get(IDENTITY_KEY)
                    .and_then(DocValue::as_str)
                    .unwrap_or_default();
                let Some(body) = row.get(keyspace).and_then(DocValue::as_object) else {
                    warn!(keyspace = %keyspace, document = %id, "Sampled row has no object body, skipping");
                    continue;
                };

                if !schema.contains(&table_name) {
                    let mut table = LogicalTable::top(table_name.clone(), keyspace);
                    table.discriminator = discriminator.clone();
                    schema.add_table(table);
                    debug!(table = %table_name, keyspace = %keyspace, "Created table");
                }

                let mut scan = Scan { schema: &mut *schema, document: id };
                scan.object(&table_name, &SourcePath::root(keyspace), None, body);
            }
        }
        Ok(())
    }

    /// Tables a keyspace maps to, with the filter that selects each one's
    /// documents
    fn candidate_tables(
        &self,
        schema: &Schema,
        keyspaces: &[String],
        namespace: &str,
        keyspace: &str,
    ) -> Result<Vec<(String, Option<Discriminator>)>, DiscoveryError> {
        let single = vec![(keyspace.to_string(), None)];
        let Some(attribute) = self.type_names.get(keyspace) else {
            return Ok(single);
        };

        let query = type_values_query(attribute, namespace, keyspace);
        trace!(query = %query, "Listing discriminator values");
        let rows = self.store.execute_query(&query)?;

        let mut values: Vec<&str> = Vec::new();
        for value in rows.iter().filter_map(|r| r.get(TYPE_KEY).and_then(DocValue::as_str)) {
            if !values.contains(&value) {
                values.push(value);
            }
        }
        if values.len() <= 1 {
            debug!(keyspace = %keyspace, values = values.len(), "Not partitioning keyspace");
            return Ok(single);
        }

        Ok(values
            .into_iter()
            .map(|value| {
                let claimed_elsewhere = schema
                    .table(value)
                    .is_some_and(|t| t.keyspace() != keyspace);
                let name = if claimed_elsewhere || keyspaces.iter().any(|k| k == value) {
                    format!("{}_{}", keyspace, value)
                } else {
                    value.to_string()
                };
                let discriminator = Discriminator {
                    attribute: attribute.to_string(),
                    value: value.to_string(),
                };
                (name, Some(discriminator))
            })
            .collect())
    }
}

/// One document's walk over the schema
struct Scan<'s> {
    schema: &'s mut Schema,
    document: &'s str,
}

impl Scan<'_> {
    fn object(&mut self, table: &str, base: &SourcePath, prefix: Option<&str>, obj: &DocObject) {
        for (key, value) in obj.iter() {
            let name = match prefix {
                Some(p) => format!("{}_{}", p, key),
                None => key.to_string(),
            };
            if self.is_reserved(table, &name) {
                debug!(table = %table, column = %name, document = %self.document, "Key collides with reserved column, skipping");
                continue;
            }

            let path = base.key(key);
            let absorbed = self.has_column(table, &name);
            match value {
                DocValue::Object(nested) if !absorbed => {
                    self.object(table, &path, Some(&name), nested);
                }
                DocValue::Array(items) if !absorbed => {
                    if items.is_empty() {
                        trace!(table = %table, key = %key, "Empty array, no child table");
                        continue;
                    }
                    let child = format!("{}_{}", table, name);
                    let source = path.array();
                    self.ensure_array_table(&child, &source, table);
                    self.array(&child, &source, items, 1);
                }
                other => self.observe(table, &name, &path, infer_type(other)),
            }
        }
    }

    /// Walk the elements of an array table at `depth` array dimensions.
    ///
    /// Structure found in earlier elements is kept. A scalar element of a
    /// table that already has field columns or deeper tables adds the
    /// whole-element column as `Object` next to them.
    fn array(&mut self, table: &str, source: &SourcePath, items: &[DocValue], depth: usize) {
        for item in items {
            let whole = self.has_column(table, table);
            let structured = self.has_element_structure(table);
            match item {
                DocValue::Object(obj) if !whole || structured => {
                    self.object(table, source, None, obj)
                }
                DocValue::Array(inner) if !whole || structured => {
                    if inner.is_empty() {
                        continue;
                    }
                    let child = format!("{}_dim{}", table, depth + 1);
                    let child_source = source.array();
                    self.ensure_array_table(&child, &child_source, table);
                    self.array(&child, &child_source, inner, depth + 1);
                }
                DocValue::Null if structured => {}
                other => {
                    let observed = if structured {
                        debug!(table = %table, document = %self.document, "Array elements changed shape, adding opaque element column");
                        DataType::Object
                    } else {
                        infer_type(other)
                    };
                    self.observe(table, table, source, observed);
                }
            }
        }
    }

    /// Whether earlier elements of `table` were expanded into field columns
    /// or deeper array tables
    fn has_element_structure(&self, table: &str) -> bool {
        let fields = self
            .schema
            .table(table)
            .is_some_and(|t| t.value_columns().any(|c| c.name != table));
        fields || self.schema.children(table).next().is_some()
    }

    fn ensure_array_table(&mut self, name: &str, source: &SourcePath, parent: &str) {
        if self.schema.contains(name) {
            return;
        }
        let Some(parent_table) = self.schema.table(parent) else {
            return;
        };
        let table = LogicalTable::array(name, source.clone(), parent_table);
        self.schema.add_table(table);
        debug!(table = %name, parent = %parent, source = %source, "Created array table");
    }

    /// Record a value's type on a column, creating or widening it
    fn observe(&mut self, table: &str, name: &str, source: &SourcePath, observed: DataType) {
        let Some(t) = self.schema.table_mut(table) else {
            return;
        };
        match t.column_mut(name) {
            Some(column) => {
                let widened = widen(column.data_type, observed);
                if widened != column.data_type {
                    debug!(
                        table = %table,
                        column = %name,
                        from = %column.data_type,
                        to = %widened,
                        "Widened column type"
                    );
                    column.data_type = widened;
                }
            }
            None => t.columns.push(Column::value(name, source.clone(), observed)),
        }
    }

    fn has_column(&self, table: &str, name: &str) -> bool {
        self.schema
            .table(table)
            .is_some_and(|t| t.column(name).is_some())
    }

    fn is_reserved(&self, table: &str, name: &str) -> bool {
        if name == DOCUMENT_ID {
            return true;
        }
        self.schema.table(table).is_some_and(|t| {
            t.column(name)
                .is_some_and(|c| c.role != ColumnRole::Value)
        })
    }
}
