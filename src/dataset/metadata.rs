//! HAM10000 metadata table.
//!
//! Only the `image_id` and `dx` columns are read; any other column is ignored.
//! Rows are numbered from 1 starting at the first data row. Each `image_id`
//! may appear only once.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dataset::labels::LesionClass;
use crate::utils::error::{DermError, Result};

const IMAGE_ID_COLUMN: &str = "image_id";
const LABEL_COLUMN: &str = "dx";

/// One labeled entry of the metadata table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub image_id: String,
    pub label: LesionClass,
}

/// Parsed metadata table, in file order
#[derive(Debug, Clone, Default)]
pub struct MetadataTable {
    records: Vec<MetadataRecord>,
}

impl MetadataTable {
    /// Read and validate a CSV file
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| {
            DermError::Dataset(format!("cannot open metadata '{}': {}", path.display(), e))
        })?;
        let table = Self::from_reader(file)?;
        debug!("Read {} metadata rows from {:?}", table.len(), path);
        Ok(table)
    }

    /// Parse CSV from any reader. The whole table is validated before returning.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = csv_reader.headers()?.clone();
        let column = |name: &str| -> Result<usize> {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| DermError::MalformedMetadata {
                    row: 0,
                    reason: format!("missing '{}' column", name),
                })
        };
        let id_col = column(IMAGE_ID_COLUMN)?;
        let dx_col = column(LABEL_COLUMN)?;

        let mut records = Vec::new();
        let mut first_seen: HashMap<String, usize> = HashMap::new();
        for (i, row) in csv_reader.records().enumerate() {
            let row_number = i + 1;
            let row = row.map_err(|e| DermError::MalformedMetadata {
                row: row_number,
                reason: e.to_string(),
            })?;

            let field = |col: usize, name: &str| -> Result<String> {
                match row.get(col) {
                    Some(value) if !value.is_empty() => Ok(value.to_string()),
                    _ => Err(DermError::MalformedMetadata {
                        row: row_number,
                        reason: format!("missing or empty '{}'", name),
                    }),
                }
            };

            let image_id = field(id_col, IMAGE_ID_COLUMN)?;
            if let Some(first) = first_seen.get(&image_id) {
                return Err(DermError::MalformedMetadata {
                    row: row_number,
                    reason: format!("duplicate image_id '{}' (first seen at row {})", image_id, first),
                });
            }
            first_seen.insert(image_id.clone(), row_number);
            let code = field(dx_col, LABEL_COLUMN)?;
            let label = LesionClass::from_code(&code, &format!("metadata row {}", row_number))?;

            records.push(MetadataRecord { image_id, label });
        }

        Ok(Self { records })
    }

    pub fn from_records(records: Vec<MetadataRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[MetadataRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
