//! RF2 release file parsing.
//!
//! RF2 files are UTF-8, tab-delimited, with one header row. Only `Snapshot`
//! files are read. Rows are parsed into typed records through the
//! [`Record`] trait; every failure carries the file name and line number.

use std::io::BufRead;
use std::marker::PhantomData;

use crate::error::{IndexError, IndexResult};
use crate::model::RelationshipValue;
use crate::SctId;

// =============================================================================
// File classification
// =============================================================================

/// The kind of content an RF2 file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    /// `sct2_Concept_Snapshot`
    Concept,
    /// `sct2_Description_Snapshot`
    Description,
    /// `sct2_Relationship_Snapshot` (inferred)
    Relationship,
    /// `sct2_RelationshipConcreteValues_Snapshot`
    ConcreteRelationship,
    /// Any `der2_*Refset*_Snapshot`
    Refset,
}

/// Classifies a release entry by file name. Non-snapshot files and files
/// the importer does not read (stated relationships, text definitions,
/// OWL axioms) yield `None`.
pub fn classify(entry: &str) -> Option<FileKind> {
    let name = entry.rsplit(['/', '\\']).next().unwrap_or(entry);
    if !name.ends_with(".txt") || !name.contains("Snapshot") {
        return None;
    }
    if name.starts_with("sct2_Concept_") {
        Some(FileKind::Concept)
    } else if name.starts_with("sct2_Description_") {
        Some(FileKind::Description)
    } else if name.starts_with("sct2_RelationshipConcreteValues_") {
        Some(FileKind::ConcreteRelationship)
    } else if name.starts_with("sct2_Relationship_") {
        Some(FileKind::Relationship)
    } else if name.starts_with("der2_") && name.contains("Refset") && !name.contains("OWL") {
        Some(FileKind::Refset)
    } else {
        None
    }
}

// =============================================================================
// Row reader
// =============================================================================

/// One data row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    /// 1-based line number in the file (the header is line 1).
    pub line: usize,
    /// Column values.
    pub fields: Vec<String>,
}

/// Reads tab-delimited rows after the header, checking column counts.
pub struct RowReader<R> {
    file: String,
    lines: std::io::Lines<R>,
    header: Vec<String>,
    line: usize,
}

impl<R: BufRead> RowReader<R> {
    /// Reads the header row.
    pub fn new(file: impl Into<String>, reader: R) -> IndexResult<Self> {
        let file = file.into();
        let mut lines = reader.lines();
        let header = match lines.next() {
            Some(line) => line.map_err(|e| IndexError::io(&file, e))?,
            None => {
                return Err(IndexError::MalformedRow {
                    file,
                    line: 1,
                    message: "missing header row".into(),
                })
            }
        };
        let header = header
            .trim_end_matches('\r')
            .trim_start_matches('\u{feff}')
            .split('\t')
            .map(str::to_string)
            .collect();
        Ok(Self {
            file,
            lines,
            header,
            line: 1,
        })
    }

    /// Column names.
    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// File name used in error messages.
    pub fn file(&self) -> &str {
        &self.file
    }

    /// Converts this reader into a typed record iterator.
    pub fn records<T: Record>(self) -> IndexResult<Records<R, T>> {
        let layout = T::layout(&self.header).map_err(|message| IndexError::MalformedRow {
            file: self.file.clone(),
            line: 1,
            message,
        })?;
        Ok(Records {
            rows: self,
            layout,
            _record: PhantomData,
        })
    }
}

impl<R: BufRead> Iterator for RowReader<R> {
    type Item = IndexResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.lines.next()?;
            self.line += 1;
            let line = match line {
                Ok(line) => line,
                Err(e) => return Some(Err(IndexError::io(&self.file, e))),
            };
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            let fields: Vec<String> = line.split('\t').map(str::to_string).collect();
            if fields.len() != self.header.len() {
                return Some(Err(IndexError::MalformedRow {
                    file: self.file.clone(),
                    line: self.line,
                    message: format!(
                        "expected {} columns, found {}",
                        self.header.len(),
                        fields.len()
                    ),
                }));
            }
            return Some(Ok(Row {
                line: self.line,
                fields,
            }));
        }
    }
}

// =============================================================================
// Typed records
// =============================================================================

/// A row type that can be parsed from an RF2 file.
pub trait Record: Sized {
    /// Column layout derived from the header.
    type Layout;

    /// Validates the header and derives the layout.
    fn layout(header: &[String]) -> Result<Self::Layout, String>;

    /// Parses one row's fields.
    fn parse(layout: &Self::Layout, fields: &[String]) -> Result<Self, String>;
}

/// Typed iterator over an RF2 file.
pub struct Records<R, T: Record> {
    rows: RowReader<R>,
    layout: T::Layout,
    _record: PhantomData<T>,
}

impl<R: BufRead, T: Record> Iterator for Records<R, T> {
    type Item = IndexResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = match self.rows.next()? {
            Ok(row) => row,
            Err(e) => return Some(Err(e)),
        };
        Some(
            T::parse(&self.layout, &row.fields).map_err(|message| IndexError::MalformedRow {
                file: self.rows.file.clone(),
                line: row.line,
                message,
            }),
        )
    }
}

fn expect_columns(header: &[String], expected: &[&str]) -> Result<(), String> {
    let matches = header.len() == expected.len()
        && header
            .iter()
            .zip(expected)
            .all(|(actual, expected)| actual.eq_ignore_ascii_case(expected));
    if matches {
        Ok(())
    } else {
        Err(format!(
            "unexpected header '{}', expected '{}'",
            header.join("\t"),
            expected.join("\t")
        ))
    }
}

fn parse_id(value: &str, column: &str) -> Result<SctId, String> {
    value
        .parse()
        .map_err(|_| format!("invalid {} '{}'", column, value))
}

fn parse_active(value: &str) -> Result<bool, String> {
    match value {
        "1" => Ok(true),
        "0" => Ok(false),
        other => Err(format!("invalid active flag '{}'", other)),
    }
}

fn parse_effective_time(value: &str) -> Result<u32, String> {
    if value.len() != 8 {
        return Err(format!("invalid effectiveTime '{}'", value));
    }
    value
        .parse()
        .map_err(|_| format!("invalid effectiveTime '{}'", value))
}

/// `sct2_Concept` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConceptRow {
    pub id: SctId,
    pub effective_time: u32,
    pub active: bool,
    pub module_id: SctId,
    pub definition_status_id: SctId,
}

impl Record for ConceptRow {
    type Layout = ();

    fn layout(header: &[String]) -> Result<(), String> {
        expect_columns(
            header,
            &["id", "effectiveTime", "active", "moduleId", "definitionStatusId"],
        )
    }

    fn parse(_: &(), f: &[String]) -> Result<Self, String> {
        Ok(Self {
            id: parse_id(&f[0], "id")?,
            effective_time: parse_effective_time(&f[1])?,
            active: parse_active(&f[2])?,
            module_id: parse_id(&f[3], "moduleId")?,
            definition_status_id: parse_id(&f[4], "definitionStatusId")?,
        })
    }
}

/// `sct2_Description` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptionRow {
    pub id: SctId,
    pub active: bool,
    pub concept_id: SctId,
    pub language: String,
    pub type_id: SctId,
    pub term: String,
}

impl Record for DescriptionRow {
    type Layout = ();

    fn layout(header: &[String]) -> Result<(), String> {
        expect_columns(
            header,
            &[
                "id",
                "effectiveTime",
                "active",
                "moduleId",
                "conceptId",
                "languageCode",
                "typeId",
                "term",
                "caseSignificanceId",
            ],
        )
    }

    fn parse(_: &(), f: &[String]) -> Result<Self, String> {
        Ok(Self {
            id: parse_id(&f[0], "id")?,
            active: parse_active(&f[2])?,
            concept_id: parse_id(&f[4], "conceptId")?,
            language: f[5].clone(),
            type_id: parse_id(&f[6], "typeId")?,
            term: f[7].clone(),
        })
    }
}

/// Row from either relationship file; concrete rows carry a literal value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipRow {
    pub id: SctId,
    pub active: bool,
    pub source_id: SctId,
    pub value: RelationshipValue,
    pub group: u32,
    pub type_id: SctId,
    pub characteristic_type_id: SctId,
}

/// Whether column 5 holds a destination id or a concrete value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipLayout {
    Destination,
    Concrete,
}

impl Record for RelationshipRow {
    type Layout = RelationshipLayout;

    fn layout(header: &[String]) -> Result<RelationshipLayout, String> {
        let mut columns = [
            "id",
            "effectiveTime",
            "active",
            "moduleId",
            "sourceId",
            "destinationId",
            "relationshipGroup",
            "typeId",
            "characteristicTypeId",
            "modifierId",
        ];
        if expect_columns(header, &columns).is_ok() {
            return Ok(RelationshipLayout::Destination);
        }
        columns[5] = "value";
        expect_columns(header, &columns).map(|_| RelationshipLayout::Concrete)
    }

    fn parse(layout: &RelationshipLayout, f: &[String]) -> Result<Self, String> {
        let value = match layout {
            RelationshipLayout::Destination => {
                RelationshipValue::Target(parse_id(&f[5], "destinationId")?)
            }
            RelationshipLayout::Concrete => {
                if f[5].is_empty() {
                    return Err("empty concrete value".into());
                }
                RelationshipValue::Literal(f[5].clone())
            }
        };
        Ok(Self {
            id: parse_id(&f[0], "id")?,
            active: parse_active(&f[2])?,
            source_id: parse_id(&f[4], "sourceId")?,
            value,
            group: f[6]
                .parse()
                .map_err(|_| format!("invalid relationshipGroup '{}'", f[6]))?,
            type_id: parse_id(&f[7], "typeId")?,
            characteristic_type_id: parse_id(&f[8], "characteristicTypeId")?,
        })
    }
}

/// Extra columns of a reference set row, by refset pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefsetColumns {
    /// Simple membership, no extra columns.
    Member,
    /// Language refset.
    Language { acceptability_id: SctId },
    /// Simple map.
    SimpleMap { map_target: String },
    /// Association.
    Association { target_component_id: SctId },
    /// Complex or extended map.
    ComplexMap {
        map_group: u32,
        map_priority: u32,
        map_rule: String,
        map_advice: String,
        map_target: String,
        correlation_id: Option<SctId>,
        map_category_id: Option<SctId>,
    },
    /// Any other pattern; only membership is recorded.
    Other,
}

/// Reference set pattern detected from the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefsetShape {
    Member,
    Language,
    SimpleMap,
    Association,
    ComplexMap { with_category: bool },
    Other,
}

impl RefsetShape {
    fn from_extra(extra: &[String]) -> Self {
        let names: Vec<String> = extra.iter().map(|c| c.to_ascii_lowercase()).collect();
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        match names.as_slice() {
            [] => RefsetShape::Member,
            ["acceptabilityid"] => RefsetShape::Language,
            ["maptarget"] => RefsetShape::SimpleMap,
            ["targetcomponentid"] => RefsetShape::Association,
            ["mapgroup", "mappriority", "maprule", "mapadvice", "maptarget", "correlationid"] => {
                RefsetShape::ComplexMap {
                    with_category: false,
                }
            }
            ["mapgroup", "mappriority", "maprule", "mapadvice", "maptarget", "correlationid", "mapcategoryid"] => {
                RefsetShape::ComplexMap {
                    with_category: true,
                }
            }
            _ => RefsetShape::Other,
        }
    }
}

/// `der2_*Refset*` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefsetRow {
    pub id: String,
    pub active: bool,
    pub refset_id: SctId,
    pub referenced_component_id: SctId,
    pub columns: RefsetColumns,
}

const REFSET_COMMON: [&str; 6] = [
    "id",
    "effectiveTime",
    "active",
    "moduleId",
    "refsetId",
    "referencedComponentId",
];

impl Record for RefsetRow {
    type Layout = RefsetShape;

    fn layout(header: &[String]) -> Result<RefsetShape, String> {
        if header.len() < REFSET_COMMON.len() {
            return Err(format!("refset header has only {} columns", header.len()));
        }
        let (common, extra) = header.split_at(REFSET_COMMON.len());
        expect_columns(common, &REFSET_COMMON)?;
        Ok(RefsetShape::from_extra(extra))
    }

    fn parse(shape: &RefsetShape, f: &[String]) -> Result<Self, String> {
        let optional_id = |value: &str, column: &str| -> Result<Option<SctId>, String> {
            if value.is_empty() {
                Ok(None)
            } else {
                parse_id(value, column).map(Some)
            }
        };
        let columns = match shape {
            RefsetShape::Member => RefsetColumns::Member,
            RefsetShape::Language => RefsetColumns::Language {
                acceptability_id: parse_id(&f[6], "acceptabilityId")?,
            },
            RefsetShape::SimpleMap => RefsetColumns::SimpleMap {
                map_target: f[6].clone(),
            },
            RefsetShape::Association => RefsetColumns::Association {
                target_component_id: parse_id(&f[6], "targetComponentId")?,
            },
            RefsetShape::ComplexMap { with_category } => RefsetColumns::ComplexMap {
                map_group: f[6]
                    .parse()
                    .map_err(|_| format!("invalid mapGroup '{}'", f[6]))?,
                map_priority: f[7]
                    .parse()
                    .map_err(|_| format!("invalid mapPriority '{}'", f[7]))?,
                map_rule: f[8].clone(),
                map_advice: f[9].clone(),
                map_target: f[10].clone(),
                correlation_id: optional_id(&f[11], "correlationId")?,
                map_category_id: if *with_category {
                    optional_id(&f[12], "mapCategoryId")?
                } else {
                    None
                },
            },
            RefsetShape::Other => RefsetColumns::Other,
        };
        Ok(Self {
            id: f[0].clone(),
            active: parse_active(&f[2])?,
            refset_id: parse_id(&f[4], "refsetId")?,
            referenced_component_id: parse_id(&f[5], "referencedComponentId")?,
            columns,
        })
    }
}
