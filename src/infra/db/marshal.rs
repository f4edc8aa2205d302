//! Conversion between SQLite rows and snapshot scalars.

use sqlx::{
    Column, Decode, Encode, Row, Sqlite, Type, TypeInfo, ValueRef,
    encode::IsNull,
    error::BoxDynError,
    sqlite::{SqliteArgumentValue, SqliteRow, SqliteTypeInfo, SqliteValueRef},
};

use crate::domain::snapshots::{DynamicRow, Scalar, SnapshotError};

/// Read every column of `row`, in driver order, into a [`DynamicRow`].
///
/// The storage class of each value decides the scalar variant, so a REAL stored in a column
/// declared `TEXT` still comes back as a number.
pub fn row_to_dynamic(row: &SqliteRow) -> Result<DynamicRow, SnapshotError> {
    let mut dynamic = DynamicRow::with_capacity(row.columns().len());

    for (index, column) in row.columns().iter().enumerate() {
        let scalar = read_scalar(row, index).map_err(|err| {
            SnapshotError::deserialization(format!(
                "column `{}` could not be read: {err}",
                column.name()
            ))
        })?;
        dynamic.insert(column.name(), scalar)?;
    }

    Ok(dynamic)
}

fn read_scalar(row: &SqliteRow, index: usize) -> Result<Scalar, sqlx::Error> {
    match row.try_get::<Scalar, _>(index)? {
        Scalar::Real(value) if !value.is_finite() => Ok(Scalar::Null),
        scalar => Ok(scalar),
    }
}

impl Type<Sqlite> for Scalar {
    fn type_info() -> SqliteTypeInfo {
        <String as Type<Sqlite>>::type_info()
    }

    fn compatible(_ty: &SqliteTypeInfo) -> bool {
        true
    }
}

impl<'q> Encode<'q, Sqlite> for Scalar {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<SqliteArgumentValue<'q>>,
    ) -> Result<IsNull, BoxDynError> {
        match self {
            Scalar::Null => Ok(IsNull::Yes),
            Scalar::Integer(value) => <i64 as Encode<'q, Sqlite>>::encode_by_ref(value, buf),
            Scalar::Real(value) => <f64 as Encode<'q, Sqlite>>::encode_by_ref(value, buf),
            Scalar::Text(value) => <String as Encode<'q, Sqlite>>::encode_by_ref(value, buf),
        }
    }

    fn produces(&self) -> Option<SqliteTypeInfo> {
        match self {
            Scalar::Null => None,
            Scalar::Integer(_) => Some(<i64 as Type<Sqlite>>::type_info()),
            Scalar::Real(_) => Some(<f64 as Type<Sqlite>>::type_info()),
            Scalar::Text(_) => Some(<String as Type<Sqlite>>::type_info()),
        }
    }
}

impl<'r> Decode<'r, Sqlite> for Scalar {
    fn decode(value: SqliteValueRef<'r>) -> Result<Self, BoxDynError> {
        if value.is_null() {
            return Ok(Scalar::Null);
        }
        let storage = value.type_info().name().to_ascii_uppercase();
        let scalar = match storage.as_str() {
            "INTEGER" | "INT" | "INT8" | "BIGINT" | "BOOLEAN" => {
                Scalar::Integer(<i64 as Decode<Sqlite>>::decode(value)?)
            }
            "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => {
                Scalar::Real(<f64 as Decode<Sqlite>>::decode(value)?)
            }
            "BLOB" => {
                let bytes = <Vec<u8> as Decode<Sqlite>>::decode(value)?;
                Scalar::Text(String::from_utf8_lossy(&bytes).into_owned())
            }
            _ => Scalar::Text(<String as Decode<Sqlite>>::decode(value)?),
        };
        Ok(scalar)
    }
}
