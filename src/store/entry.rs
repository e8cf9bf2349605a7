// On-disk-shaped record kept by a replica for one key.
//
// `to_wire`/`from_wire` mirror the original's `Entry::convertToString`
// delimited format (grounded on `original_source/mp2/MP2Node.cpp`), but use
// a non-printable field separator instead of the original's comma: a
// value containing a comma would otherwise corrupt the encoding (see
// DESIGN.md).

use crate::common::{ClusterError, ReplicaRole, Result};

const FIELD_SEP: char = '\u{1f}';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub value: String,
    pub timestamp: i64,
    pub role: ReplicaRole,
}

impl Entry {
    pub fn new(value: String, timestamp: i64, role: ReplicaRole) -> Self {
        Self { value, timestamp, role }
    }

    pub fn to_wire(&self) -> String {
        format!("{}{FIELD_SEP}{}{FIELD_SEP}{}", self.value, self.timestamp, self.role.offset())
    }

    pub fn from_wire(s: &str) -> Result<Self> {
        let mut parts = s.split(FIELD_SEP);
        let value = parts
            .next()
            .ok_or_else(|| ClusterError::Storage("missing value field".into()))?
            .to_string();
        let timestamp = parts
            .next()
            .ok_or_else(|| ClusterError::Storage("missing timestamp field".into()))?
            .parse::<i64>()
            .map_err(|e| ClusterError::Storage(format!("bad timestamp: {e}")))?;
        let offset = parts
            .next()
            .ok_or_else(|| ClusterError::Storage("missing role field".into()))?
            .parse::<usize>()
            .map_err(|e| ClusterError::Storage(format!("bad role: {e}")))?;
        let role = ReplicaRole::from_offset(offset)
            .ok_or_else(|| ClusterError::Storage(format!("invalid role offset {offset}")))?;
        if parts.next().is_some() {
            return Err(ClusterError::Storage("trailing fields in entry wire format".into()));
        }
        Ok(Self { value, timestamp, role })
    }
}
