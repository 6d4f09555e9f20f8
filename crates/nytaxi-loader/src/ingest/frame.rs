//! In-memory table decoded from a Parquet or CSV download
//!
//! Each column gets one PostgreSQL type. Parquet columns take it from the file
//! schema; CSV columns infer it from their values.

use bytes::Bytes;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use parquet::basic::{ConvertedType, LogicalType, TimeUnit, Type as PhysicalType};
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::record::Field;
use parquet::schema::types::ColumnDescriptor;
use std::collections::HashSet;

use super::IngestError;

/// Strings read as NULL from CSV, following the usual dataframe defaults
const CSV_NULL_MARKERS: &[&str] = &[
    "", "#N/A", "#NA", "-NaN", "-nan", "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan",
    "null",
];

/// Days from 0001-01-01 to 1970-01-01
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

const NANOS_PER_SEC: i64 = 1_000_000_000;

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Boolean,
    BigInt,
    Double,
    Text,
    Date,
    Timestamp,
}

impl SqlType {
    pub fn ddl(self) -> &'static str {
        match self {
            SqlType::Boolean => "BOOLEAN",
            SqlType::BigInt => "BIGINT",
            SqlType::Double => "DOUBLE PRECISION",
            SqlType::Text => "TEXT",
            SqlType::Date => "DATE",
            SqlType::Timestamp => "TIMESTAMP",
        }
    }

    fn of(cell: &Cell) -> Option<SqlType> {
        match cell {
            Cell::Null => None,
            Cell::Bool(_) => Some(SqlType::Boolean),
            Cell::Int(_) => Some(SqlType::BigInt),
            Cell::Float(_) => Some(SqlType::Double),
            Cell::Text(_) => Some(SqlType::Text),
            Cell::Date(_) => Some(SqlType::Date),
            Cell::Timestamp(_) => Some(SqlType::Timestamp),
        }
    }

    /// Narrowest type holding both; integers widen to floats, anything else
    /// mixed becomes text.
    fn unify(self, other: SqlType) -> SqlType {
        match (self, other) {
            (a, b) if a == b => a,
            (SqlType::BigInt, SqlType::Double) | (SqlType::Double, SqlType::BigInt) => SqlType::Double,
            _ => SqlType::Text,
        }
    }

    fn for_parquet_column(column: &ColumnDescriptor) -> SqlType {
        match column.logical_type() {
            Some(LogicalType::Timestamp { .. }) => return SqlType::Timestamp,
            Some(LogicalType::Date) => return SqlType::Date,
            Some(LogicalType::Decimal { .. }) => return SqlType::Text,
            _ => {},
        }

        match column.converted_type() {
            ConvertedType::TIMESTAMP_MILLIS | ConvertedType::TIMESTAMP_MICROS => {
                return SqlType::Timestamp
            },
            ConvertedType::DATE => return SqlType::Date,
            ConvertedType::DECIMAL => return SqlType::Text,
            _ => {},
        }

        match column.physical_type() {
            PhysicalType::BOOLEAN => SqlType::Boolean,
            PhysicalType::INT32 | PhysicalType::INT64 => SqlType::BigInt,
            PhysicalType::INT96 => SqlType::Timestamp,
            PhysicalType::FLOAT | PhysicalType::DOUBLE => SqlType::Double,
            _ => SqlType::Text,
        }
    }
}

/// Whether the row reader can decode this column. It panics on the
/// combinations left out here (TIME_*, INTERVAL and the like).
fn readable_parquet_column(column: &ColumnDescriptor) -> bool {
    use ConvertedType as C;

    let converted = column.converted_type();
    match column.physical_type() {
        PhysicalType::BOOLEAN | PhysicalType::INT96 | PhysicalType::FLOAT | PhysicalType::DOUBLE => {
            true
        },
        PhysicalType::INT32 => matches!(
            converted,
            C::NONE | C::INT_8 | C::INT_16 | C::INT_32 | C::UINT_8 | C::UINT_16 | C::UINT_32
                | C::DATE | C::DECIMAL
        ),
        PhysicalType::INT64 => matches!(
            converted,
            C::NONE | C::INT_64 | C::UINT_64 | C::TIMESTAMP_MILLIS | C::TIMESTAMP_MICROS | C::DECIMAL
        ),
        PhysicalType::BYTE_ARRAY => {
            matches!(converted, C::NONE | C::UTF8 | C::ENUM | C::JSON | C::BSON | C::DECIMAL)
        },
        PhysicalType::FIXED_LEN_BYTE_ARRAY => matches!(converted, C::NONE | C::DECIMAL),
    }
}

/// Nanoseconds per tick of an INT64 timestamp column. The row reader only
/// converts timestamps that carry a converted type, so NANOS (and units
/// written without one) arrive as plain integers.
fn timestamp_tick_nanos(column: &ColumnDescriptor) -> Option<i64> {
    if column.physical_type() != PhysicalType::INT64 {
        return None;
    }
    match column.logical_type() {
        Some(LogicalType::Timestamp { unit, .. }) => Some(match unit {
            TimeUnit::MILLIS(_) => 1_000_000,
            TimeUnit::MICROS(_) => 1_000,
            TimeUnit::NANOS(_) => 1,
        }),
        _ => None,
    }
}

impl Cell {
    /// Parse one CSV field: null marker, integer, float, boolean, else text.
    pub fn parse_csv(raw: &str) -> Cell {
        if CSV_NULL_MARKERS.contains(&raw) {
            return Cell::Null;
        }
        if let Ok(v) = raw.parse::<i64>() {
            return Cell::Int(v);
        }
        if let Ok(v) = raw.parse::<f64>() {
            return Cell::Float(v);
        }
        if raw.eq_ignore_ascii_case("true") {
            return Cell::Bool(true);
        }
        if raw.eq_ignore_ascii_case("false") {
            return Cell::Bool(false);
        }
        Cell::Text(raw.to_string())
    }

    fn from_field(field: &Field) -> Cell {
        match field {
            Field::Null => Cell::Null,
            Field::Bool(v) => Cell::Bool(*v),
            Field::Byte(v) => Cell::Int(i64::from(*v)),
            Field::Short(v) => Cell::Int(i64::from(*v)),
            Field::Int(v) => Cell::Int(i64::from(*v)),
            Field::Long(v) => Cell::Int(*v),
            Field::UByte(v) => Cell::Int(i64::from(*v)),
            Field::UShort(v) => Cell::Int(i64::from(*v)),
            Field::UInt(v) => Cell::Int(i64::from(*v)),
            Field::ULong(v) => i64::try_from(*v).map(Cell::Int).unwrap_or(Cell::Float(*v as f64)),
            Field::Float(v) => Cell::Float(f64::from(*v)),
            Field::Double(v) => Cell::Float(*v),
            Field::Str(v) => Cell::Text(v.clone()),
            Field::Date(days) => days
                .checked_add(UNIX_EPOCH_DAYS_FROM_CE)
                .and_then(NaiveDate::from_num_days_from_ce_opt)
                .map_or(Cell::Null, Cell::Date),
            Field::TimestampMillis(ms) => Cell::from_ticks(*ms, 1_000_000),
            Field::TimestampMicros(us) => Cell::from_ticks(*us, 1_000),
            other => Cell::Text(other.to_string()),
        }
    }

    /// Timestamp from a count of `tick_nanos`-long ticks since the epoch
    fn from_ticks(ticks: i64, tick_nanos: i64) -> Cell {
        let per_sec = NANOS_PER_SEC / tick_nanos;
        let secs = ticks.div_euclid(per_sec);
        u32::try_from(ticks.rem_euclid(per_sec) * tick_nanos)
            .ok()
            .and_then(|nanos| DateTime::from_timestamp(secs, nanos))
            .map_or(Cell::Null, |dt| Cell::Timestamp(dt.naive_utc()))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Cell::Bool(v) => Some(*v),
            Cell::Int(v) => Some(*v != 0),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Cell::Int(v) => Some(*v),
            Cell::Bool(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Float(v) => Some(*v),
            Cell::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<String> {
        match self {
            Cell::Null => None,
            Cell::Bool(v) => Some(v.to_string()),
            Cell::Int(v) => Some(v.to_string()),
            Cell::Float(v) => Some(v.to_string()),
            Cell::Text(v) => Some(v.clone()),
            Cell::Date(v) => Some(v.to_string()),
            Cell::Timestamp(v) => Some(v.to_string()),
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Cell::Date(v) => Some(*v),
            Cell::Timestamp(v) => Some(v.date()),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Cell::Timestamp(v) => Some(*v),
            Cell::Date(v) => v.and_hms_opt(0, 0, 0),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub sql_type: SqlType,
}

#[derive(Debug, Clone, Default)]
pub struct Frame {
    columns: Vec<Column>,
    rows: Vec<Vec<Cell>>,
}

impl Frame {
    /// Build a frame, checking names and row widths.
    ///
    /// `types[i]`, when given, fixes column `i`'s type; otherwise it is
    /// inferred from the non-null values (all-null columns become text).
    pub fn new(
        names: Vec<String>,
        rows: Vec<Vec<Cell>>,
        types: &[Option<SqlType>],
        format: &'static str,
    ) -> Result<Self, IngestError> {
        let mut seen = HashSet::new();
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(IngestError::decode(format, format!("duplicate column '{}'", name)));
            }
        }

        if let Some((index, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != names.len()) {
            return Err(IngestError::decode(
                format,
                format!("row {} has {} fields, expected {}", index, row.len(), names.len()),
            ));
        }

        let columns = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| {
                let sql_type = types.get(i).copied().flatten().unwrap_or_else(|| {
                    rows.iter()
                        .filter_map(|row| SqlType::of(&row[i]))
                        .reduce(SqlType::unify)
                        .unwrap_or(SqlType::Text)
                });
                Column { name, sql_type }
            })
            .collect();

        Ok(Self { columns, rows })
    }

    pub fn from_csv(data: &[u8]) -> Result<Self, IngestError> {
        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(data);

        let names = reader
            .headers()
            .map_err(|e| IngestError::decode("csv", e.to_string()))?
            .iter()
            .map(str::to_string)
            .collect::<Vec<_>>();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| IngestError::decode("csv", e.to_string()))?;
            rows.push(record.iter().map(Cell::parse_csv).collect());
        }

        Self::new(names, rows, &[], "csv")
    }

    pub fn from_parquet(data: Bytes) -> Result<Self, IngestError> {
        let decode = |e: parquet::errors::ParquetError| IngestError::decode("parquet", e.to_string());

        let reader = SerializedFileReader::new(data).map_err(decode)?;
        let metadata = reader.metadata().file_metadata();

        let columns = metadata.schema_descr().columns();
        if let Some(column) = columns.iter().find(|c| !readable_parquet_column(c)) {
            return Err(IngestError::decode(
                "parquet",
                format!(
                    "column '{}' has unsupported type {} ({})",
                    column.name(),
                    column.physical_type(),
                    column.converted_type()
                ),
            ));
        }

        let names: Vec<String> = columns.iter().map(|c| c.name().to_string()).collect();
        let types: Vec<Option<SqlType>> =
            columns.iter().map(|c| Some(SqlType::for_parquet_column(c))).collect();
        let ticks: Vec<Option<i64>> = columns.iter().map(|c| timestamp_tick_nanos(c)).collect();

        let mut rows = Vec::with_capacity(usize::try_from(metadata.num_rows()).unwrap_or(0));
        for row in reader.get_row_iter(None).map_err(decode)? {
            let row = row.map_err(decode)?;
            let cells = row.get_column_iter().enumerate().map(|(i, (_, field))| {
                match (Cell::from_field(field), ticks.get(i).copied().flatten()) {
                    (Cell::Int(raw), Some(tick_nanos)) => Cell::from_ticks(raw, tick_nanos),
                    (cell, _) => cell,
                }
            });
            rows.push(cells.collect());
        }

        Self::new(names, rows, &types, "parquet")
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use parquet::data_type::{ByteArray, ByteArrayType, DataType, DoubleType, Int32Type, Int64Type};
    use parquet::file::properties::WriterProperties;
    use parquet::file::writer::SerializedFileWriter;
    use parquet::schema::parser::parse_message_type;
    use std::sync::Arc;

    const ZONES_CSV: &str = "\"LocationID\",\"Borough\",\"Zone\",\"service_zone\"\n\
        1,\"EWR\",\"Newark Airport\",\"EWR\"\n\
        2,\"Queens\",\"Jamaica Bay\",\"Boro Zone\"\n\
        264,\"Unknown\",\"N/A\",\"N/A\"\n";

    #[test]
    fn test_parse_csv_cells() {
        assert_eq!(Cell::parse_csv("42"), Cell::Int(42));
        assert_eq!(Cell::parse_csv("4.5"), Cell::Float(4.5));
        assert_eq!(Cell::parse_csv("TRUE"), Cell::Bool(true));
        assert_eq!(Cell::parse_csv("N/A"), Cell::Null);
        assert_eq!(Cell::parse_csv(""), Cell::Null);
        assert_eq!(Cell::parse_csv("Boro Zone"), Cell::Text("Boro Zone".into()));
    }

    #[test]
    fn test_zone_lookup_csv() {
        let frame = Frame::from_csv(ZONES_CSV.as_bytes()).unwrap();

        let columns: Vec<_> = frame.columns().iter().map(|c| (c.name.as_str(), c.sql_type)).collect();
        assert_eq!(
            columns,
            [
                ("LocationID", SqlType::BigInt),
                ("Borough", SqlType::Text),
                ("Zone", SqlType::Text),
                ("service_zone", SqlType::Text),
            ]
        );
        assert_eq!(frame.len(), 3);
        assert!(frame.rows()[2][3].is_null());
    }

    #[test]
    fn test_mixed_numeric_column_widens() {
        let frame = Frame::from_csv(b"fare\n1\n2.5\n\n".as_slice()).unwrap();
        assert_eq!(frame.columns()[0].sql_type, SqlType::Double);
        assert_eq!(frame.rows()[0][0].as_f64(), Some(1.0));
    }

    #[test]
    fn test_all_null_column_is_text() {
        let frame = Frame::from_csv(b"a,b\n1,\n2,NA\n".as_slice()).unwrap();
        assert_eq!(frame.columns()[1].sql_type, SqlType::Text);
    }

    #[test]
    fn test_ragged_csv_rejected() {
        let err = Frame::from_csv(b"a,b\n1,2\n3\n".as_slice()).unwrap_err();
        assert!(matches!(err, IngestError::Decode { format: "csv", .. }));
    }

    #[test]
    fn test_duplicate_columns_rejected() {
        let err = Frame::new(vec!["a".into(), "a".into()], vec![], &[], "csv").unwrap_err();
        assert!(err.to_string().contains("duplicate column"));
    }

    #[test]
    fn test_timestamp_conversion() {
        let cell = Cell::from_field(&Field::TimestampMicros(1_735_689_600_000_001));
        assert_eq!(cell.as_text().unwrap(), "2025-01-01 00:00:00.000001");

        let before_epoch = Cell::from_field(&Field::TimestampMillis(-1));
        assert_eq!(before_epoch.as_text().unwrap(), "1969-12-31 23:59:59.999");

        let date = Cell::from_field(&Field::Date(0));
        assert_eq!(date.as_date(), NaiveDate::from_ymd_opt(1970, 1, 1));
    }

    fn trips_parquet() -> Bytes {
        let schema = Arc::new(
            parse_message_type(
                "message trips {
                    REQUIRED INT64 VendorID;
                    OPTIONAL BYTE_ARRAY store_and_fwd_flag (UTF8);
                    OPTIONAL DOUBLE fare_amount;
                }",
            )
            .unwrap(),
        );
        let props = Arc::new(WriterProperties::builder().build());
        let mut buffer = Vec::new();
        let mut writer = SerializedFileWriter::new(&mut buffer, schema, props).unwrap();

        let mut row_group = writer.next_row_group().unwrap();

        let mut column = row_group.next_column().unwrap().unwrap();
        column.typed::<Int64Type>().write_batch(&[2, 1], None, None).unwrap();
        column.close().unwrap();

        let mut column = row_group.next_column().unwrap().unwrap();
        column
            .typed::<ByteArrayType>()
            .write_batch(&[ByteArray::from("N")], Some(&[1, 0]), None)
            .unwrap();
        column.close().unwrap();

        let mut column = row_group.next_column().unwrap().unwrap();
        column
            .typed::<DoubleType>()
            .write_batch(&[], Some(&[0, 0]), None)
            .unwrap();
        column.close().unwrap();

        row_group.close().unwrap();
        writer.close().unwrap();

        Bytes::from(buffer)
    }

    #[test]
    fn test_parquet_types_come_from_schema() {
        let frame = Frame::from_parquet(trips_parquet()).unwrap();

        let types: Vec<_> = frame.columns().iter().map(|c| c.sql_type).collect();
        assert_eq!(types, [SqlType::BigInt, SqlType::Text, SqlType::Double]);
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.rows()[0][0], Cell::Int(2));
        assert_eq!(frame.rows()[0][1], Cell::Text("N".into()));
        assert!(frame.rows()[1][1].is_null());
        assert!(frame.rows()[0][2].is_null());
    }

    fn single_column_parquet<T: DataType>(message: &str, values: &[T::T]) -> Bytes {
        let schema = Arc::new(parse_message_type(message).unwrap());
        let props = Arc::new(WriterProperties::builder().build());
        let mut buffer = Vec::new();
        let mut writer = SerializedFileWriter::new(&mut buffer, schema, props).unwrap();

        let mut row_group = writer.next_row_group().unwrap();
        let mut column = row_group.next_column().unwrap().unwrap();
        column.typed::<T>().write_batch(values, None, None).unwrap();
        column.close().unwrap();
        row_group.close().unwrap();
        writer.close().unwrap();

        Bytes::from(buffer)
    }

    #[test]
    fn test_nanosecond_timestamps_are_converted() {
        let data = single_column_parquet::<Int64Type>(
            "message trips { REQUIRED INT64 lpep_pickup_datetime (TIMESTAMP(NANOS,false)); }",
            &[1_735_689_600_000_000_001, -1],
        );

        let frame = Frame::from_parquet(data).unwrap();

        assert_eq!(frame.columns()[0].sql_type, SqlType::Timestamp);
        let first = frame.rows()[0][0].as_timestamp().unwrap();
        assert_eq!(first.to_string(), "2025-01-01 00:00:00.000000001");
        let second = frame.rows()[1][0].as_timestamp().unwrap();
        assert_eq!(second.to_string(), "1969-12-31 23:59:59.999999999");
    }

    #[test]
    fn test_microsecond_timestamps_are_converted() {
        let data = single_column_parquet::<Int64Type>(
            "message trips { REQUIRED INT64 lpep_dropoff_datetime (TIMESTAMP(MICROS,false)); }",
            &[1_735_689_600_000_001],
        );

        let frame = Frame::from_parquet(data).unwrap();

        let cell = frame.rows()[0][0].as_timestamp().unwrap();
        assert_eq!(cell.to_string(), "2025-01-01 00:00:00.000001");
    }

    #[test]
    fn test_unreadable_column_type_rejected() {
        let data = single_column_parquet::<Int32Type>(
            "message trips { REQUIRED INT32 pickup_time (TIME(MILLIS,false)); }",
            &[3_600_000],
        );

        let err = Frame::from_parquet(data).unwrap_err();

        assert!(matches!(err, IngestError::Decode { format: "parquet", .. }));
        assert!(err.to_string().contains("pickup_time"));
    }

    #[test]
    fn test_garbage_is_not_parquet() {
        let err = Frame::from_parquet(Bytes::from_static(b"<html>Not Found</html>")).unwrap_err();
        assert!(matches!(err, IngestError::Decode { format: "parquet", .. }));
    }
}
