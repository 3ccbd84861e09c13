//! Tantivy schema of the terminology index.
//!
//! Every searchable field is a raw keyword field: values are indexed
//! verbatim, so search terms are folded and split before they reach the
//! index. `key` and `sort_key` are fast u64 columns read by collectors.

use std::collections::BTreeMap;

use tantivy::schema::{
    Field, FieldType, Schema, Value, FAST, INDEXED, STORED, STRING,
};
use tantivy::TantivyDocument;

use super::Document;
use crate::error::{IndexError, IndexResult};

/// Index field names.
pub mod fields {
    /// Document key; the concept id, or the code system key.
    pub const KEY: &str = "key";
    /// Ranking key, ascending.
    pub const SORT_KEY: &str = "sort_key";
    /// Document type: [`CONCEPT`](crate::codec::CONCEPT) or [`CODE_SYSTEM`](crate::codec::CODE_SYSTEM).
    pub const TYPE: &str = "type";
    /// Concept id.
    pub const ID: &str = "id";
    /// `true` or `false`.
    pub const ACTIVE: &str = "active";
    /// `YYYYMMDD`.
    pub const EFFECTIVE_TIME: &str = "effective_time";
    /// Module id.
    pub const MODULE: &str = "module";
    /// `primitive` or `defined`.
    pub const DEFINITION_STATUS: &str = "definition_status";
    /// Direct parent ids.
    pub const PARENTS: &str = "parents";
    /// Transitive ancestor ids.
    pub const ANCESTORS: &str = "ancestors";
    /// Direct child ids.
    pub const CHILDREN: &str = "children";
    /// Reference set ids.
    pub const MEMBERS: &str = "members";
    /// Folded search tokens of every description.
    pub const TERM: &str = "term";
    /// `<typeId>=<targetId>` for every relationship with a concept target.
    pub const ATTRIBUTES: &str = "attributes";
    /// Attribute type ids with at least one concept target.
    pub const ATTRIBUTE_TYPES: &str = "attribute_types";
    /// Stored relationship blob.
    pub const RELATIONSHIPS: &str = "relationships";
    /// Stored description entries.
    pub const DESCRIPTIONS: &str = "descriptions";
    /// Stored mapping entries.
    pub const MAPPINGS: &str = "mappings";
    /// Code system version date.
    pub const VERSION_DATE: &str = "version_date";
    /// Names of the searchable fields a document has values for.
    pub const PRESENT: &str = "present";
}

/// Searchable fields that are also returned with the document.
const INDEXED_STORED: [&str; 13] = [
    fields::TYPE,
    fields::ID,
    fields::ACTIVE,
    fields::EFFECTIVE_TIME,
    fields::MODULE,
    fields::DEFINITION_STATUS,
    fields::PARENTS,
    fields::ANCESTORS,
    fields::CHILDREN,
    fields::MEMBERS,
    fields::ATTRIBUTES,
    fields::VERSION_DATE,
    fields::ATTRIBUTE_TYPES,
];

/// Searchable fields that are never read back.
const INDEXED_ONLY: [&str; 2] = [fields::TERM, fields::PRESENT];

/// Retrieval-only fields.
const STORED_ONLY: [&str; 3] = [fields::RELATIONSHIPS, fields::DESCRIPTIONS, fields::MAPPINGS];

/// Builds the index schema.
pub fn build_schema() -> Schema {
    let mut builder = Schema::builder();
    builder.add_u64_field(fields::KEY, INDEXED | STORED | FAST);
    builder.add_u64_field(fields::SORT_KEY, STORED | FAST);
    for name in INDEXED_STORED {
        builder.add_text_field(name, STRING | STORED);
    }
    for name in INDEXED_ONLY {
        builder.add_text_field(name, STRING);
    }
    for name in STORED_ONLY {
        builder.add_text_field(name, STORED);
    }
    builder.build()
}

/// Schema with cached handles of the fields the store touches directly.
#[derive(Debug, Clone)]
pub struct IndexSchema {
    pub schema: Schema,
    pub key: Field,
    pub sort_key: Field,
    pub present: Field,
}

impl IndexSchema {
    /// Builds the schema and resolves its fixed fields.
    pub fn new() -> IndexResult<Self> {
        let schema = build_schema();
        Ok(Self {
            key: schema.get_field(fields::KEY)?,
            sort_key: schema.get_field(fields::SORT_KEY)?,
            present: schema.get_field(fields::PRESENT)?,
            schema,
        })
    }

    /// Resolves a text field by name.
    pub fn text_field(&self, name: &str) -> IndexResult<Field> {
        let field = self
            .schema
            .get_field(name)
            .map_err(|_| IndexError::invalid_format(format!("unknown index field '{}'", name)))?;
        match self.schema.get_field_entry(field).field_type() {
            FieldType::Str(_) => Ok(field),
            _ => Err(IndexError::invalid_format(format!("'{}' is not a text field", name))),
        }
    }

    fn is_indexed(&self, field: Field) -> bool {
        self.schema.get_field_entry(field).is_indexed()
    }

    /// Converts a document for the writer.
    ///
    /// Searchable values must go to indexed fields; every indexed field with
    /// values is also recorded under [`fields::PRESENT`].
    pub fn to_tantivy(&self, doc: &Document) -> IndexResult<TantivyDocument> {
        let mut out = TantivyDocument::new();
        out.add_u64(self.key, doc.key);
        out.add_u64(self.sort_key, doc.sort_key);
        for (name, values) in &doc.indexed {
            let field = self.text_field(name)?;
            if !self.is_indexed(field) {
                return Err(IndexError::invalid_format(format!(
                    "field '{}' is not searchable",
                    name
                )));
            }
            if !values.is_empty() {
                out.add_text(self.present, name);
            }
            for value in values {
                out.add_text(field, value);
            }
        }
        for (name, values) in &doc.stored {
            let field = self.text_field(name)?;
            for value in values {
                out.add_text(field, value);
            }
        }
        Ok(out)
    }

    /// Rebuilds a document from its stored fields.
    pub fn from_tantivy(&self, stored: &TantivyDocument) -> IndexResult<Document> {
        let key = stored
            .get_first(self.key)
            .and_then(|v| v.as_u64())
            .ok_or_else(|| IndexError::invalid_format("stored document has no key"))?;
        let mut doc = Document::new(key);
        doc.sort_key = stored
            .get_first(self.sort_key)
            .and_then(|v| v.as_u64())
            .unwrap_or(0);

        for (field, entry) in self.schema.fields() {
            if !entry.is_stored() || !matches!(entry.field_type(), FieldType::Str(_)) {
                continue;
            }
            let values: Vec<String> = stored
                .get_all(field)
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
            if values.is_empty() {
                continue;
            }
            let target: &mut BTreeMap<String, Vec<String>> = if entry.is_indexed() {
                &mut doc.indexed
            } else {
                &mut doc.stored
            };
            target.insert(entry.name().to_string(), values);
        }
        Ok(doc)
    }
}
