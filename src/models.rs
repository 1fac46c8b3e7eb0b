//! Data models for the live object graph.
//!
//! These structs match the row shapes the memory server sends. Rows arrive
//! as positional JSON arrays and are converted into named structs through
//! `#[serde(from = ...)]` so the rest of the crate never indexes tuples.

use serde::{Deserialize, Serialize};

/// Game build identifier.
///
/// Selects which hard-coded address table the server uses for globals.
/// Includes `Unknown` variant for forward-compatibility with new builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Version {
    GMSJ01,
    GMSE01,
    GMSP01,
    GMSJ0A,
    /// Forward-compatible fallback for unknown builds
    #[serde(other)]
    Unknown,
}

impl Version {
    /// Get the build identifier string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Version::GMSJ01 => "GMSJ01",
            Version::GMSE01 => "GMSE01",
            Version::GMSP01 => "GMSP01",
            Version::GMSJ0A => "GMSJ0A",
            Version::Unknown => "Unknown",
        }
    }

    /// Human-readable region of the build.
    pub fn region(&self) -> &'static str {
        match self {
            Version::GMSJ01 => "JP 1.0",
            Version::GMSE01 => "NA",
            Version::GMSP01 => "PAL",
            Version::GMSJ0A => "JP 1.1",
            Version::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire row `[addr, type, name, count]`.
type ManagerRow = (u32, String, String, i64);

/// A long-lived top-level object owning zero or more managees.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "ManagerRow")]
pub struct Manager {
    pub addr: u32,
    /// Runtime type name resolved from the object's vtable
    pub type_name: String,
    pub name: String,
    /// Number of owned managees; `None` when the server could not read it
    pub count: Option<u32>,
}

impl From<ManagerRow> for Manager {
    fn from((addr, type_name, name, count): ManagerRow) -> Self {
        Self {
            addr,
            type_name,
            name,
            count: u32::try_from(count).ok(),
        }
    }
}

impl Manager {
    /// Row label, e.g. `"Map Obj Manager (12)"`.
    pub fn label(&self) -> String {
        match self.count {
            Some(count) => format!("{} ({})", self.name, count),
            None => format!("{} (?)", self.name),
        }
    }
}

/// Wire row `[addr, type, name]`.
type ManageeRow = (u32, Option<String>, String);

/// An object reachable from, and owned by, a [`Manager`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "ManageeRow")]
pub struct Managee {
    pub addr: u32,
    /// Runtime type name; `None` when the vtable pointer is unreadable
    pub type_name: Option<String>,
    pub name: String,
    /// Position within the owning manager's list
    pub index: Option<usize>,
}

impl From<ManageeRow> for Managee {
    fn from((addr, type_name, name): ManageeRow) -> Self {
        Self {
            addr,
            type_name,
            name,
            index: None,
        }
    }
}

impl Managee {
    /// Row label, e.g. `"3: (Goomba)"`.
    pub fn label(&self) -> String {
        match self.index {
            Some(i) => format!("{}: ({})", i, self.name),
            None => format!("({})", self.name),
        }
    }
}

/// Wire row `[offset, name, notes, type, class]`.
type FieldRow = (String, String, String, String, String);

/// Metadata for one member of a runtime type.
///
/// Field lists are ordered as declared; values returned by a typed `read`
/// are positionally aligned to this order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "FieldRow")]
pub struct FieldDescriptor {
    /// Offset path as rendered by the server (e.g. `"0x10"` or `"0x4->0x8"`)
    pub offset: String,
    pub name: String,
    pub notes: String,
    /// Declared type of the field
    pub type_name: String,
    /// Class that declares the field
    pub declaring_class: String,
}

impl From<FieldRow> for FieldDescriptor {
    fn from((offset, name, notes, type_name, declaring_class): FieldRow) -> Self {
        Self {
            offset,
            name,
            notes,
            type_name,
            declaring_class,
        }
    }
}

/// Result of a `read` request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ReadValue {
    /// A primitive type or raw hex dump.
    Single(String),
    /// One entry per field of a class type, in declaration order.
    /// Individual fields are `None` when their pointer chain is unreadable.
    Fields(Vec<Option<String>>),
}

impl ReadValue {
    /// Normalize into one entry per field.
    pub fn into_values(self) -> Vec<Option<String>> {
        match self {
            ReadValue::Single(value) => vec![Some(value)],
            ReadValue::Fields(values) => values,
        }
    }
}

/// Format an address the way the inspector displays it (upper-case hex).
pub fn format_addr(addr: u32) -> String {
    format!("{:X}", addr)
}
