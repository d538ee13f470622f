// src/panel/codec.rs

use anyhow::{anyhow, Context, Result};
use arrow::{
    array::{Array, ArrayRef, Float64Array, Int32Array, StringArray},
    compute::cast,
    csv::{reader::Format, ReaderBuilder, WriterBuilder},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::{
    collections::BTreeSet,
    fs::File,
    io::{BufWriter, Seek, SeekFrom},
    path::Path,
    sync::Arc,
};
use tracing::debug;

use super::{CellKey, IndicatorPanel};

pub const REGION_COLUMN: &str = "region";
pub const YEAR_COLUMN: &str = "year";

/// Tidy-wide layout: `region`, `year`, then one Float64 column per indicator
/// in sorted order. A (region, year) row exists when any indicator has a cell
/// there; indicators without a cell in that row are written as null.
pub fn to_record_batch(panel: &IndicatorPanel) -> Result<RecordBatch> {
    let indicators: Vec<&str> = panel.indicators().into_iter().collect();
    let rows: BTreeSet<(&str, i32)> = panel
        .iter()
        .map(|(k, _)| (k.region.as_str(), k.year))
        .collect();

    let mut fields = vec![
        Field::new(REGION_COLUMN, DataType::Utf8, false),
        Field::new(YEAR_COLUMN, DataType::Int32, false),
    ];
    fields.extend(
        indicators
            .iter()
            .map(|code| Field::new(*code, DataType::Float64, true)),
    );
    let schema = Arc::new(Schema::new(fields));

    let regions = StringArray::from_iter_values(rows.iter().map(|(r, _)| *r));
    let years = Int32Array::from_iter_values(rows.iter().map(|(_, y)| *y));
    let mut columns: Vec<ArrayRef> = vec![Arc::new(regions), Arc::new(years)];
    for code in &indicators {
        let values: Float64Array = rows
            .iter()
            .map(|(r, y)| panel.get(r, *y, code))
            .collect();
        columns.push(Arc::new(values));
    }

    RecordBatch::try_new(schema, columns).context("building panel record batch")
}

/// Inverse of [`to_record_batch`]. Every indicator column yields a cell for
/// every row, nulls becoming explicit gaps.
pub fn from_record_batch(batch: &RecordBatch) -> Result<IndicatorPanel> {
    let schema = batch.schema();
    let region_idx = schema
        .index_of(REGION_COLUMN)
        .map_err(|_| anyhow!("panel batch has no `{}` column", REGION_COLUMN))?;
    let year_idx = schema
        .index_of(YEAR_COLUMN)
        .map_err(|_| anyhow!("panel batch has no `{}` column", YEAR_COLUMN))?;

    let regions = cast(batch.column(region_idx), &DataType::Utf8)?;
    let regions = regions
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| anyhow!("`{}` column is not text", REGION_COLUMN))?;
    let years = cast(batch.column(year_idx), &DataType::Int32)?;
    let years = years
        .as_any()
        .downcast_ref::<Int32Array>()
        .ok_or_else(|| anyhow!("`{}` column is not integral", YEAR_COLUMN))?;

    let mut panel = IndicatorPanel::new();
    for (idx, field) in schema.fields().iter().enumerate() {
        if idx == region_idx || idx == year_idx {
            continue;
        }
        let values = cast(batch.column(idx), &DataType::Float64)
            .with_context(|| format!("indicator column `{}` is not numeric", field.name()))?;
        let values = values
            .as_any()
            .downcast_ref::<Float64Array>()
            .ok_or_else(|| anyhow!("indicator column `{}` is not numeric", field.name()))?;

        for row in 0..batch.num_rows() {
            if regions.is_null(row) || years.is_null(row) {
                continue;
            }
            let value = if values.is_null(row) {
                None
            } else {
                Some(values.value(row))
            };
            panel.insert(
                CellKey::new(regions.value(row), years.value(row), field.name().as_str()),
                value,
            );
        }
    }
    Ok(panel)
}

/// Encode a panel as an in-memory Parquet file.
pub fn to_parquet_bytes(panel: &IndicatorPanel) -> Result<Vec<u8>> {
    let batch = to_record_batch(panel)?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();

    let mut buf = Vec::new();
    {
        let mut writer = ArrowWriter::try_new(&mut buf, batch.schema(), Some(props))
            .context("creating Arrow writer for panel")?;
        writer.write(&batch).context("writing panel batch")?;
        writer.close().context("closing panel writer")?;
    }
    debug!(bytes = buf.len(), cells = panel.len(), "encoded panel");
    Ok(buf)
}

/// Decode a panel previously written by [`to_parquet_bytes`].
pub fn from_parquet_bytes(data: Vec<u8>) -> Result<IndicatorPanel> {
    let mut reader = ParquetRecordBatchReaderBuilder::try_new(Bytes::from(data))
        .context("opening panel parquet")?
        .with_batch_size(1024)
        .build()
        .context("building panel batch reader")?;

    let mut panel = IndicatorPanel::new();
    while let Some(batch) = reader
        .next()
        .transpose()
        .context("reading panel record batch")?
    {
        for (key, value) in from_record_batch(&batch)? {
            panel.insert(key, value);
        }
    }
    Ok(panel)
}

/// Read a headered CSV with `text_columns` as Utf8, `int_columns` as Int32
/// and everything else as Float64.
pub fn read_typed_csv(
    path: &Path,
    text_columns: &[&str],
    int_columns: &[&str],
) -> Result<Vec<RecordBatch>> {
    let mut file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let format = Format::default().with_header(true);
    let (inferred, _) = format
        .infer_schema(&mut file, Some(100))
        .with_context(|| format!("reading header of {}", path.display()))?;
    file.seek(SeekFrom::Start(0))?;

    let fields: Vec<Field> = inferred
        .fields()
        .iter()
        .map(|f| {
            let name = f.name().as_str();
            let ty = if text_columns.contains(&name) {
                DataType::Utf8
            } else if int_columns.contains(&name) {
                DataType::Int32
            } else {
                DataType::Float64
            };
            Field::new(name, ty, true)
        })
        .collect();

    let reader = ReaderBuilder::new(Arc::new(Schema::new(fields)))
        .with_format(format)
        .build(file)
        .with_context(|| format!("building CSV reader for {}", path.display()))?;

    reader
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("parsing {}", path.display()))
}

/// Load a tidy-wide panel CSV.
pub fn read_csv(path: &Path) -> Result<IndicatorPanel> {
    let mut panel = IndicatorPanel::new();
    for batch in read_typed_csv(path, &[REGION_COLUMN], &[YEAR_COLUMN])? {
        for (key, value) in from_record_batch(&batch)? {
            panel.insert(key, value);
        }
    }
    Ok(panel)
}

/// Write a panel as tidy-wide CSV.
pub fn write_csv(panel: &IndicatorPanel, path: &Path) -> Result<()> {
    let batch = to_record_batch(panel)?;
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = WriterBuilder::new()
        .with_header(true)
        .build(BufWriter::new(file));
    writer
        .write(&batch)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn sample() -> IndicatorPanel {
        IndicatorPanel::from_rows(vec![
            ("RS", 2020, "SP.POP.TOTL", Some(6_800_000.0)),
            ("RS", 2021, "SP.POP.TOTL", None),
            ("XK", 2020, "SP.POP.TOTL", Some(100_000.0)),
            ("RS", 2020, "NY.GDP.MKTP.CD", Some(5.3e10)),
        ])
    }

    #[test]
    fn record_batch_is_wide_and_sorted() -> Result<()> {
        let batch = to_record_batch(&sample())?;
        let names: Vec<String> = batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        assert_eq!(names, vec!["region", "year", "NY.GDP.MKTP.CD", "SP.POP.TOTL"]);
        // (RS,2020), (RS,2021), (XK,2020)
        assert_eq!(batch.num_rows(), 3);
        Ok(())
    }

    #[test]
    fn parquet_bytes_keep_values_and_gaps() -> Result<()> {
        let bytes = to_parquet_bytes(&sample())?;
        let back = from_parquet_bytes(bytes)?;
        assert_eq!(back.get("RS", 2020, "SP.POP.TOTL"), Some(6_800_000.0));
        assert!(back.contains("RS", 2021, "SP.POP.TOTL"));
        assert_eq!(back.get("RS", 2021, "SP.POP.TOTL"), None);
        // wide layout materialises the missing GDP cells as explicit gaps
        assert!(back.contains("XK", 2020, "NY.GDP.MKTP.CD"));
        assert_eq!(back.get("XK", 2020, "NY.GDP.MKTP.CD"), None);
        Ok(())
    }

    #[test]
    fn csv_reader_accepts_integer_looking_values() -> Result<()> {
        let mut tmp = NamedTempFile::new()?;
        writeln!(tmp, "region,year,SP.POP.TOTL")?;
        writeln!(tmp, "RS,2020,6800000")?;
        writeln!(tmp, "NA,2020,")?;
        tmp.flush()?;

        let panel = read_csv(tmp.path())?;
        assert_eq!(panel.get("RS", 2020, "SP.POP.TOTL"), Some(6_800_000.0));
        // Namibia's code must not be read as a null marker
        assert!(panel.contains("NA", 2020, "SP.POP.TOTL"));
        assert_eq!(panel.get("NA", 2020, "SP.POP.TOTL"), None);
        Ok(())
    }
}
