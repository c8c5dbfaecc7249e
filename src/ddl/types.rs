//! Declared field type to storage type mapping.

use crate::schema::FieldType;
use std::fmt;

/// Physical column types the schema compiler emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageType {
    Uuid,
    Text,
    TextArray,
    Numeric,
    Boolean,
    Date,
    TimestampTz,
    Jsonb,
}

impl StorageType {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Uuid => "UUID",
            Self::Text => "TEXT",
            Self::TextArray => "TEXT[]",
            Self::Numeric => "NUMERIC",
            Self::Boolean => "BOOLEAN",
            Self::Date => "DATE",
            Self::TimestampTz => "TIMESTAMP WITH TIME ZONE",
            Self::Jsonb => "JSONB",
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Storage type used for any declared type outside the mapping table.
pub const FALLBACK_TYPE: StorageType = StorageType::Text;

/// Map a declared field type to its storage type. `None` means the type is
/// not in the table; callers decide between the fallback and an error.
pub fn lookup_field_type(typ: &FieldType) -> Option<StorageType> {
    let mapped = match typ {
        FieldType::Text | FieldType::Email | FieldType::Url | FieldType::File => StorageType::Text,
        FieldType::Select => StorageType::Text,
        FieldType::MultiSelect => StorageType::TextArray,
        FieldType::Number => StorageType::Numeric,
        FieldType::Boolean => StorageType::Boolean,
        FieldType::Date => StorageType::Date,
        FieldType::DateTime => StorageType::TimestampTz,
        FieldType::Json => StorageType::Jsonb,
        FieldType::Other(_) => return None,
    };
    Some(mapped)
}

/// Map a declared field type, falling back to text for unknown types.
pub fn map_field_type(typ: &FieldType) -> StorageType {
    lookup_field_type(typ).unwrap_or(FALLBACK_TYPE)
}
