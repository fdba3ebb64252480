//! Columnar trip input
//!
//! Reads the six mapped columns of a Parquet file into [`RawTripRecord`]s.
//! Other columns are never decoded.

use arrow::array::{Array, ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, TimeUnit};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ProjectionMask;
use std::fs::File;
use std::path::Path;
use tracing::info;

use crate::config::ColumnMapping;
use crate::error::{IngestError, IngestResult};
use crate::record::{EpochUnit, RawTimestamp, RawTripRecord};

/// Decode every row of `path`
pub fn read_parquet(path: impl AsRef<Path>, columns: &ColumnMapping) -> IngestResult<Vec<RawTripRecord>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| IngestError::Read(format!("{}: {}", path.display(), e)))?;

    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let wanted = [
        &columns.pickup_datetime,
        &columns.dropoff_datetime,
        &columns.pickup_zone,
        &columns.dropoff_zone,
        &columns.trip_distance,
        &columns.fare_amount,
    ];

    let schema = builder.schema().clone();
    let mut roots = Vec::with_capacity(wanted.len());
    for name in wanted {
        let (index, _) = schema
            .column_with_name(name)
            .ok_or_else(|| IngestError::Read(format!("{}: missing column '{}'", path.display(), name)))?;
        roots.push(index);
    }
    let mask = ProjectionMask::roots(builder.parquet_schema(), roots);

    let reader = builder.with_projection(mask).build()?;
    let mut records = Vec::new();
    for batch in reader {
        records.extend(records_from_batch(&batch?, columns)?);
    }

    info!("Read {} trip record(s) from {}", records.len(), path.display());
    Ok(records)
}

/// Convert one Arrow batch; column types are normalized with `cast`
pub fn records_from_batch(batch: &RecordBatch, columns: &ColumnMapping) -> IngestResult<Vec<RawTripRecord>> {
    let pickup_dt = timestamps(&columns.pickup_datetime, column(batch, &columns.pickup_datetime)?)?;
    let dropoff_dt = timestamps(&columns.dropoff_datetime, column(batch, &columns.dropoff_datetime)?)?;
    let pickup_zone = integers(column(batch, &columns.pickup_zone)?)?;
    let dropoff_zone = integers(column(batch, &columns.dropoff_zone)?)?;
    let distance = floats(column(batch, &columns.trip_distance)?)?;
    let fare = floats(column(batch, &columns.fare_amount)?)?;

    let mut records = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        records.push(RawTripRecord {
            pickup_datetime: pickup_dt[row].clone(),
            dropoff_datetime: dropoff_dt[row].clone(),
            pickup_zone: pickup_zone[row],
            dropoff_zone: dropoff_zone[row],
            trip_distance: distance[row],
            fare_amount: fare[row],
        });
    }
    Ok(records)
}

fn column<'a>(batch: &'a RecordBatch, name: &str) -> IngestResult<&'a ArrayRef> {
    batch
        .column_by_name(name)
        .ok_or_else(|| IngestError::Read(format!("missing column '{}'", name)))
}

fn integers(array: &ArrayRef) -> IngestResult<Vec<Option<i64>>> {
    let cast_array = cast(array, &DataType::Int64)?;
    let values = downcast::<Int64Array>(&cast_array)?;
    Ok(values.iter().collect())
}

fn floats(array: &ArrayRef) -> IngestResult<Vec<Option<f64>>> {
    let cast_array = cast(array, &DataType::Float64)?;
    let values = downcast::<Float64Array>(&cast_array)?;
    Ok(values.iter().collect())
}

/// Timezone labels under which epoch values already are wall-clock time
const UTC_LABELS: [&str; 4] = ["UTC", "Etc/UTC", "+00:00", "Z"];

/// Timestamps are naive wall-clock times. A column pinned to a non-UTC zone
/// would need conversion, so it is refused instead of staged in UTC.
fn timestamps(name: &str, array: &ArrayRef) -> IngestResult<Vec<Option<RawTimestamp>>> {
    let unit = match array.data_type() {
        DataType::Timestamp(_, Some(tz)) if !UTC_LABELS.contains(&tz.as_ref()) => {
            return Err(IngestError::Read(format!(
                "column '{}' is zoned to {}; expected naive or UTC timestamps",
                name, tz
            )));
        }
        DataType::Timestamp(unit, _) => match unit {
            TimeUnit::Second => EpochUnit::Seconds,
            TimeUnit::Millisecond => EpochUnit::Millis,
            TimeUnit::Microsecond => EpochUnit::Micros,
            TimeUnit::Nanosecond => EpochUnit::Nanos,
        },
        DataType::Utf8 | DataType::LargeUtf8 => {
            let cast_array = cast(array, &DataType::Utf8)?;
            let values = downcast::<StringArray>(&cast_array)?;
            return Ok(values
                .iter()
                .map(|v| v.map(|s| RawTimestamp::Text(s.to_string())))
                .collect());
        }
        other => {
            return Err(IngestError::Read(format!(
                "unsupported timestamp column type {}",
                other
            )))
        }
    };

    let cast_array = cast(array, &DataType::Int64)?;
    let values = downcast::<Int64Array>(&cast_array)?;
    Ok(values
        .iter()
        .map(|v| v.map(|value| RawTimestamp::Epoch { value, unit }))
        .collect())
}

fn downcast<T: Array + 'static>(array: &ArrayRef) -> IngestResult<&T> {
    array
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| IngestError::Read(format!("unexpected array type {}", array.data_type())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int32Array, TimestampMicrosecondArray};
    use arrow::datatypes::{Field, Schema};
    use parquet::arrow::ArrowWriter;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn taxi_batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("VendorID", DataType::Int32, true),
            Field::new("tpep_pickup_datetime", DataType::Timestamp(TimeUnit::Microsecond, None), true),
            Field::new("tpep_dropoff_datetime", DataType::Timestamp(TimeUnit::Microsecond, None), true),
            Field::new("trip_distance", DataType::Float64, true),
            Field::new("PULocationID", DataType::Int32, true),
            Field::new("DOLocationID", DataType::Int32, true),
            Field::new("fare_amount", DataType::Float64, true),
        ]));
        let arrays: Vec<ArrayRef> = vec![
            Arc::new(Int32Array::from(vec![Some(1), Some(2)])),
            Arc::new(TimestampMicrosecondArray::from(vec![Some(1_704_442_530_750_000), None])),
            Arc::new(TimestampMicrosecondArray::from(vec![Some(1_704_443_462_000_000), Some(0)])),
            Arc::new(Float64Array::from(vec![Some(1.2), Some(0.0)])),
            Arc::new(Int32Array::from(vec![Some(3), None])),
            Arc::new(Int32Array::from(vec![Some(18), Some(20)])),
            Arc::new(Float64Array::from(vec![Some(9.0), Some(3.0)])),
        ];
        RecordBatch::try_new(schema, arrays).unwrap()
    }

    #[test]
    fn test_batch_conversion() {
        let records = records_from_batch(&taxi_batch(), &ColumnMapping::default()).unwrap();
        assert_eq!(records.len(), 2);

        assert_eq!(
            records[0].pickup_datetime,
            Some(RawTimestamp::Epoch { value: 1_704_442_530_750_000, unit: EpochUnit::Micros })
        );
        assert_eq!(records[0].pickup_zone, Some(3));
        assert_eq!(records[0].dropoff_zone, Some(18));
        assert_eq!(records[0].trip_distance, Some(1.2));
        assert_eq!(records[0].fare_amount, Some(9.0));

        assert_eq!(records[1].pickup_datetime, None);
        assert_eq!(records[1].pickup_zone, None);
    }

    #[test]
    fn test_string_timestamps() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("pu", DataType::Utf8, true),
            Field::new("do", DataType::Utf8, true),
            Field::new("a", DataType::Int64, true),
            Field::new("b", DataType::Int64, true),
            Field::new("d", DataType::Float32, true),
            Field::new("f", DataType::Float64, true),
        ]));
        let arrays: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(vec![Some("2024-01-05 08:15:30")])),
            Arc::new(StringArray::from(vec![None::<&str>])),
            Arc::new(Int64Array::from(vec![Some(3)])),
            Arc::new(Int64Array::from(vec![Some(18)])),
            Arc::new(arrow::array::Float32Array::from(vec![Some(1.5f32)])),
            Arc::new(Float64Array::from(vec![Some(9.0)])),
        ];
        let batch = RecordBatch::try_new(schema, arrays).unwrap();
        let mapping = ColumnMapping {
            pickup_datetime: "pu".to_string(),
            dropoff_datetime: "do".to_string(),
            pickup_zone: "a".to_string(),
            dropoff_zone: "b".to_string(),
            trip_distance: "d".to_string(),
            fare_amount: "f".to_string(),
        };

        let records = records_from_batch(&batch, &mapping).unwrap();
        assert_eq!(
            records[0].pickup_datetime,
            Some(RawTimestamp::Text("2024-01-05 08:15:30".to_string()))
        );
        assert_eq!(records[0].dropoff_datetime, None);
        assert_eq!(records[0].trip_distance, Some(1.5));
    }

    fn zoned_batch(tz: &str) -> RecordBatch {
        let zoned = DataType::Timestamp(TimeUnit::Microsecond, Some(tz.into()));
        let schema = Arc::new(Schema::new(vec![
            Field::new("tpep_pickup_datetime", zoned.clone(), true),
            Field::new("tpep_dropoff_datetime", zoned, true),
            Field::new("trip_distance", DataType::Float64, true),
            Field::new("PULocationID", DataType::Int32, true),
            Field::new("DOLocationID", DataType::Int32, true),
            Field::new("fare_amount", DataType::Float64, true),
        ]));
        let arrays: Vec<ArrayRef> = vec![
            Arc::new(TimestampMicrosecondArray::from(vec![Some(1_704_442_530_000_000)]).with_timezone(tz)),
            Arc::new(TimestampMicrosecondArray::from(vec![Some(1_704_443_462_000_000)]).with_timezone(tz)),
            Arc::new(Float64Array::from(vec![Some(1.2)])),
            Arc::new(Int32Array::from(vec![Some(3)])),
            Arc::new(Int32Array::from(vec![Some(18)])),
            Arc::new(Float64Array::from(vec![Some(9.0)])),
        ];
        RecordBatch::try_new(schema, arrays).unwrap()
    }

    #[test]
    fn test_zoned_timestamps_are_refused() {
        let err = records_from_batch(&zoned_batch("America/New_York"), &ColumnMapping::default()).unwrap_err();
        match err {
            IngestError::Read(msg) => {
                assert!(msg.contains("tpep_pickup_datetime"), "{msg}");
                assert!(msg.contains("America/New_York"), "{msg}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_utc_timestamps_are_accepted() {
        let records = records_from_batch(&zoned_batch("UTC"), &ColumnMapping::default()).unwrap();
        assert_eq!(
            records[0].pickup_datetime,
            Some(RawTimestamp::Epoch { value: 1_704_442_530_000_000, unit: EpochUnit::Micros })
        );
    }

    #[test]
    fn test_read_parquet_file_ignores_extra_columns() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("yellow_tripdata.parquet");
        let batch = taxi_batch();
        let file = File::create(&path).unwrap();
        let mut writer = ArrowWriter::try_new(file, batch.schema(), None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let records = read_parquet(&path, &ColumnMapping::default()).unwrap();
        assert_eq!(records, records_from_batch(&batch, &ColumnMapping::default()).unwrap());
    }

    #[test]
    fn test_missing_column_is_a_read_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("trips.parquet");
        let batch = taxi_batch();
        let file = File::create(&path).unwrap();
        let mut writer = ArrowWriter::try_new(file, batch.schema(), None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let mapping = ColumnMapping {
            fare_amount: "total_amount".to_string(),
            ..Default::default()
        };
        let err = read_parquet(&path, &mapping).unwrap_err();
        assert!(matches!(err, IngestError::Read(ref msg) if msg.contains("total_amount")));
    }
}
