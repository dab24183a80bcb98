//! Record shapes for both schema versions and the mapping between them

use std::fmt;
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::Serialize;

use crate::error::{MigrateError, Result};

/// Schema version of a store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SchemaVersion {
    /// Memos v0.21.0, the store being migrated from
    Legacy,
    /// Memos v0.17.1, the store being migrated to
    Current,
}

impl SchemaVersion {
    pub fn tag(&self) -> &'static str {
        match self {
            SchemaVersion::Legacy => "v0210",
            SchemaVersion::Current => "v0171",
        }
    }
}

impl FromStr for SchemaVersion {
    type Err = MigrateError;

    fn from_str(tag: &str) -> Result<Self> {
        match tag {
            "v0210" | "legacy" => Ok(SchemaVersion::Legacy),
            "v0171" | "current" => Ok(SchemaVersion::Current),
            other => Err(MigrateError::UnsupportedSchema(other.to_string())),
        }
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RowStatus {
    Normal,
    Archived,
}

impl RowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RowStatus::Normal => "NORMAL",
            RowStatus::Archived => "ARCHIVED",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "NORMAL" => Some(RowStatus::Normal),
            "ARCHIVED" => Some(RowStatus::Archived),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Visibility {
    Public,
    Protected,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "PUBLIC",
            Visibility::Protected => "PROTECTED",
            Visibility::Private => "PRIVATE",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "PUBLIC" => Some(Visibility::Public),
            "PROTECTED" => Some(Visibility::Protected),
            "PRIVATE" => Some(Visibility::Private),
            _ => None,
        }
    }
}

macro_rules! sql_text_enum {
    ($ty:ty, $column:literal) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(self.as_str().into())
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let text = value.as_str()?;
                <$ty>::parse(text).ok_or_else(|| {
                    FromSqlError::Other(format!("unknown {} '{}'", $column, text).into())
                })
            }
        }
    };
}

sql_text_enum!(RowStatus, "row_status");
sql_text_enum!(Visibility, "visibility");

/// A memo; the id is shared by both schema versions
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Note {
    pub id: i64,
    pub creator_id: i64,
    pub created_ts: i64,
    pub updated_ts: i64,
    pub content: String,
    pub row_status: RowStatus,
    pub visibility: Visibility,
}

/// Where a legacy resource keeps its bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    /// Bytes live in the `blob` column
    Database,
    /// `reference` is a path on the server's disk
    Local,
    /// `reference` is an object-store URL
    S3,
    /// `reference` is an arbitrary external link
    External,
}

impl StorageType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "" | "DATABASE" | "RESOURCE_STORAGE_TYPE_UNSPECIFIED" => Some(StorageType::Database),
            "LOCAL" => Some(StorageType::Local),
            "S3" => Some(StorageType::S3),
            "EXTERNAL" => Some(StorageType::External),
            _ => None,
        }
    }
}

/// Resource row as stored by v0.21.0
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyResource {
    pub id: i64,
    pub memo_id: i64,
    pub creator_id: i64,
    pub created_ts: i64,
    pub updated_ts: i64,
    pub filename: String,
    pub blob: Option<Vec<u8>>,
    pub resource_type: String,
    pub size: i64,
    pub storage_type: String,
    pub reference: String,
}

/// Resource row as stored by v0.17.1
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentResource {
    /// Row id, `None` until the row has been inserted
    pub id: Option<i64>,
    pub memo_id: i64,
    pub creator_id: i64,
    pub created_ts: i64,
    pub updated_ts: i64,
    pub filename: String,
    pub blob: Option<Vec<u8>>,
    pub external_link: String,
    pub resource_type: String,
    pub size: i64,
    pub internal_path: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resource {
    Legacy(LegacyResource),
    Current(CurrentResource),
}

impl Resource {
    pub fn memo_id(&self) -> i64 {
        match self {
            Resource::Legacy(r) => r.memo_id,
            Resource::Current(r) => r.memo_id,
        }
    }

    pub fn version(&self) -> SchemaVersion {
        match self {
            Resource::Legacy(_) => SchemaVersion::Legacy,
            Resource::Current(_) => SchemaVersion::Current,
        }
    }
}

impl LegacyResource {
    /// Remap into the v0.17.1 shape.
    ///
    /// DATABASE keeps the blob, LOCAL moves `reference` to `internal_path`,
    /// S3 and EXTERNAL move it to `external_link`.
    pub fn to_current(&self) -> Result<CurrentResource> {
        let storage = StorageType::parse(&self.storage_type).ok_or_else(|| {
            MigrateError::UnknownStorageType {
                id: self.memo_id,
                storage_type: self.storage_type.clone(),
            }
        })?;

        let (external_link, internal_path) = match storage {
            StorageType::Database => (String::new(), String::new()),
            StorageType::Local => (String::new(), self.reference.clone()),
            StorageType::S3 | StorageType::External => (self.reference.clone(), String::new()),
        };

        Ok(CurrentResource {
            id: None,
            memo_id: self.memo_id,
            creator_id: self.creator_id,
            created_ts: self.created_ts,
            updated_ts: self.updated_ts,
            filename: self.filename.clone(),
            blob: self.blob.clone(),
            external_link,
            resource_type: self.resource_type.clone(),
            size: self.size,
            internal_path,
        })
    }
}
