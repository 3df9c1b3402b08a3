//! Parquet encoding and decoding of the profile roster.
//!
//! Every column is a nullable UTF-8 string. Encoding is deterministic: the
//! same records always produce the same bytes.
//!
//! Decoding accepts any string layout the query engine may hand back
//! (`Utf8`, `LargeUtf8`, `Utf8View`) and treats a missing column as all
//! nulls, so rosters written before a column existed still load.

use std::io::Cursor;
use std::sync::Arc;

use arrow::array::{Array as _, ArrayRef, StringArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::file::properties::WriterProperties;
use parquet::format::KeyValue;

use crate::error::{ProfileError, Result};
use crate::record::{ProfileField, ProfileRecord};

/// Returns the Arrow schema of the roster.
#[must_use]
pub fn profile_schema() -> SchemaRef {
    Arc::new(Schema::new(
        ProfileField::ALL
            .iter()
            .map(|field| Field::new(field.name(), DataType::Utf8, true))
            .collect::<Vec<_>>(),
    ))
}

fn writer_properties() -> WriterProperties {
    let created_by = KeyValue {
        key: "created_by".to_string(),
        value: Some("roster-profiles".to_string()),
    };
    WriterProperties::builder()
        .set_key_value_metadata(Some(vec![created_by]))
        .build()
}

/// Row-at-a-time encoder.
///
/// Rows are appended and the file is produced by [`ProfileEncoder::finish`],
/// which consumes the encoder.
#[derive(Debug, Default)]
pub struct ProfileEncoder {
    rows: Vec<ProfileRecord>,
}

impl ProfileEncoder {
    /// Creates an empty encoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one record.
    pub fn append(&mut self, record: &ProfileRecord) {
        self.rows.push(record.clone());
    }

    /// Appends one row given as `(column name, value)` pairs.
    ///
    /// Columns not mentioned are null.
    ///
    /// # Errors
    ///
    /// Returns `ProfileError::SchemaMismatch` on an unknown column name; the
    /// row is not appended.
    pub fn append_fields<I, K>(&mut self, fields: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, Option<String>)>,
        K: AsRef<str>,
    {
        let mut record = ProfileRecord::default();
        for (name, value) in fields {
            let field: ProfileField = name.as_ref().parse()?;
            record.set(field, value);
        }
        self.rows.push(record);
        Ok(())
    }

    /// Returns the number of appended rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns whether no rows were appended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Finalizes the file.
    ///
    /// # Errors
    ///
    /// Returns `ProfileError::Encode` if the Parquet write fails.
    pub fn finish(self) -> Result<Bytes> {
        encode(&self.rows)
    }
}

/// Encodes records into a Parquet file.
///
/// # Errors
///
/// Returns `ProfileError::Encode` if the record batch cannot be built or the
/// Parquet write fails.
pub fn encode(records: &[ProfileRecord]) -> Result<Bytes> {
    let schema = profile_schema();
    let columns: Vec<ArrayRef> = ProfileField::ALL
        .iter()
        .map(|field| {
            Arc::new(StringArray::from(
                records.iter().map(|r| r.get(*field)).collect::<Vec<_>>(),
            )) as ArrayRef
        })
        .collect();
    let batch = RecordBatch::try_new(schema.clone(), columns)
        .map_err(|e| ProfileError::encode(format!("record batch build failed: {e}")))?;

    let mut cursor = Cursor::new(Vec::<u8>::new());
    let mut writer = ArrowWriter::try_new(&mut cursor, schema, Some(writer_properties()))
        .map_err(|e| ProfileError::encode(format!("parquet writer init failed: {e}")))?;
    if batch.num_rows() > 0 {
        writer
            .write(&batch)
            .map_err(|e| ProfileError::encode(format!("parquet write failed: {e}")))?;
    }
    writer
        .close()
        .map_err(|e| ProfileError::encode(format!("parquet close failed: {e}")))?;
    Ok(Bytes::from(cursor.into_inner()))
}

/// Decodes a Parquet file into records, in file order.
///
/// # Errors
///
/// Returns `ProfileError::Decode` if the bytes are not a Parquet file or a
/// profile column has a non-string type.
pub fn decode(bytes: &Bytes) -> Result<Vec<ProfileRecord>> {
    decode_batches(&read_batches(bytes)?)
}

/// Decodes record batches (from a file or a query) into records.
///
/// # Errors
///
/// Returns `ProfileError::Decode` if a profile column has a non-string type.
pub fn decode_batches(batches: &[RecordBatch]) -> Result<Vec<ProfileRecord>> {
    let mut out = Vec::with_capacity(batches.iter().map(RecordBatch::num_rows).sum());
    for batch in batches {
        let columns = ProfileField::ALL
            .iter()
            .map(|field| string_column(batch, *field).map(|col| (*field, col)))
            .collect::<Result<Vec<_>>>()?;

        for row in 0..batch.num_rows() {
            let mut record = ProfileRecord::default();
            for (field, column) in &columns {
                if let Some(col) = column {
                    if !col.is_null(row) {
                        record.set(*field, Some(col.value(row).to_string()));
                    }
                }
            }
            out.push(record);
        }
    }
    Ok(out)
}

fn read_batches(bytes: &Bytes) -> Result<Vec<RecordBatch>> {
    let reader = ParquetRecordBatchReaderBuilder::try_new(bytes.clone())
        .map_err(|e| ProfileError::decode(format!("parquet reader init failed: {e}")))?
        .build()
        .map_err(|e| ProfileError::decode(format!("parquet reader build failed: {e}")))?;

    let mut batches = Vec::new();
    for batch in reader {
        let batch =
            batch.map_err(|e| ProfileError::decode(format!("parquet read batch failed: {e}")))?;
        batches.push(batch);
    }
    Ok(batches)
}

fn string_column(batch: &RecordBatch, field: ProfileField) -> Result<Option<StringArray>> {
    let Some(column) = batch.column_by_name(field.name()) else {
        return Ok(None);
    };

    match column.data_type() {
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View | DataType::Null => {
            let utf8 = cast(column, &DataType::Utf8).map_err(|e| {
                ProfileError::decode(format!("column '{}' cast failed: {e}", field.name()))
            })?;
            utf8.as_any()
                .downcast_ref::<StringArray>()
                .cloned()
                .map(Some)
                .ok_or_else(|| {
                    ProfileError::decode(format!("column '{}' is not StringArray", field.name()))
                })
        }
        other => Err(ProfileError::decode(format!(
            "column '{}' has type {other}, expected a string type",
            field.name()
        ))),
    }
}
