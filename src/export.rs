use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use serde_json::{Map, Value};
use tracing::info;

use crate::catalog::CatalogVariant;
use crate::db::CatalogEntry;
use crate::error::ExportError;

#[derive(Debug)]
pub struct ExportSummary {
    pub records: usize,
    pub json_path: PathBuf,
    pub csv_path: PathBuf,
}

/// Consumes the full catalog at the end of a run.
pub trait ExportSink {
    fn export(
        &self,
        variant: &CatalogVariant,
        entries: &[CatalogEntry],
    ) -> Result<ExportSummary, ExportError>;
}

/// Writes `<table>.json` and `<table>.csv` into one directory.
pub struct FileSink {
    pub dir: PathBuf,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FileSink { dir: dir.into() }
    }
}

impl ExportSink for FileSink {
    fn export(
        &self,
        variant: &CatalogVariant,
        entries: &[CatalogEntry],
    ) -> Result<ExportSummary, ExportError> {
        std::fs::create_dir_all(&self.dir)?;
        let json_path = self.dir.join(format!("{}.json", variant.table));
        let csv_path = self.dir.join(format!("{}.csv", variant.table));

        write_json(&json_path, variant, entries)?;
        write_csv(&csv_path, variant, entries)?;

        info!(
            records = entries.len(),
            json = %json_path.display(),
            csv = %csv_path.display(),
            "exported catalog"
        );
        Ok(ExportSummary {
            records: entries.len(),
            json_path,
            csv_path,
        })
    }
}

/// Flat JSON object with keys in column order; unknowns are `null`.
pub fn entry_to_json(variant: &CatalogVariant, entry: &CatalogEntry) -> Value {
    let mut obj = Map::new();
    obj.insert("name".into(), Value::from(entry.name.clone()));
    for (field, tag) in variant.tags.iter().zip(&entry.tags) {
        obj.insert(field.column.into(), Value::from(tag.clone()));
    }
    for (column, rating) in variant.rating_columns.iter().zip(&entry.ratings) {
        obj.insert((*column).into(), Value::from(*rating));
    }
    obj.insert("average_rating".into(), Value::from(entry.average_rating));
    Value::Object(obj)
}

fn write_json(
    path: &Path,
    variant: &CatalogVariant,
    entries: &[CatalogEntry],
) -> Result<(), ExportError> {
    let rows: Vec<Value> = entries.iter().map(|e| entry_to_json(variant, e)).collect();
    let mut out = BufWriter::new(File::create(path)?);
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut ser = Serializer::with_formatter(&mut out, formatter);
    rows.serialize(&mut ser)?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}

fn write_csv(
    path: &Path,
    variant: &CatalogVariant,
    entries: &[CatalogEntry],
) -> Result<(), ExportError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(variant.columns())?;
    for entry in entries {
        writer.write_record(csv_row(entry))?;
    }
    writer.flush()?;
    Ok(())
}

fn csv_row(entry: &CatalogEntry) -> Vec<String> {
    let mut row = Vec::with_capacity(entry.tags.len() + entry.ratings.len() + 2);
    row.push(entry.name.clone());
    row.extend(entry.tags.iter().map(|t| t.clone().unwrap_or_default()));
    row.extend(entry.ratings.iter().map(|r| format_rating(*r)));
    row.push(format_rating(entry.average_rating));
    row
}

/// Ratings keep their decimal point (`3.0`, not `3`).
fn format_rating(value: Option<f64>) -> String {
    value.map(|v| format!("{:?}", v)).unwrap_or_default()
}
