//! Logical-to-physical field mapping.
//!
//! Queries address events through dotted OCSF-style names; the SQL backend
//! stores them in flattened columns. Any logical name used in a query should
//! appear in [`FIELD_MAPPINGS`]. Names that do not are passed through
//! unchanged, so new columns can be queried before the table is updated.

use serde_json::{Map, Value};

/// Logical field name to physical column, in canonical order.
///
/// When several logical names share a column, the first entry wins for the
/// reverse direction.
pub const FIELD_MAPPINGS: &[(&str, &str)] = &[
    // Envelope
    ("time", "time"),
    ("tenant_id", "tenant_id"),
    ("message", "message"),
    ("severity", "severity"),
    ("severity_id", "severity_id"),
    ("status", "status"),
    ("status_id", "status_id"),
    ("disposition", "disposition"),
    // Classification
    ("class_uid", "class_uid"),
    ("class_name", "class_name"),
    ("category_uid", "category_uid"),
    ("category_name", "category_name"),
    ("activity_id", "activity_id"),
    ("activity_name", "activity_name"),
    ("type_uid", "type_uid"),
    // Metadata
    ("metadata.uid", "metadata_uid"),
    ("metadata.version", "metadata_version"),
    ("metadata.product.name", "metadata_product_name"),
    ("metadata.product.vendor_name", "metadata_product_vendor_name"),
    // Actor
    ("user.name", "actor_user_name"),
    ("user.uid", "actor_user_uid"),
    ("user.domain", "actor_user_domain"),
    ("actor.user.name", "actor_user_name"),
    ("actor.user.uid", "actor_user_uid"),
    ("actor.process.name", "actor_process_name"),
    // Endpoints
    ("src_endpoint.ip", "src_endpoint_ip"),
    ("src_endpoint.port", "src_endpoint_port"),
    ("src_endpoint.hostname", "src_endpoint_hostname"),
    ("dst_endpoint.ip", "dst_endpoint_ip"),
    ("dst_endpoint.port", "dst_endpoint_port"),
    ("dst_endpoint.hostname", "dst_endpoint_hostname"),
    ("device.hostname", "device_hostname"),
    ("device.ip", "device_ip"),
    ("device.os.name", "device_os_name"),
    // Network
    ("connection_info.protocol_name", "connection_info_protocol_name"),
    ("connection_info.direction", "connection_info_direction"),
    ("traffic.bytes_in", "traffic_bytes_in"),
    ("traffic.bytes_out", "traffic_bytes_out"),
    ("http_request.url.hostname", "http_request_url_hostname"),
    ("http_request.http_method", "http_request_http_method"),
    ("http_request.user_agent", "http_request_user_agent"),
    // Process and file
    ("process.name", "process_name"),
    ("process.pid", "process_pid"),
    ("process.cmd_line", "process_cmd_line"),
    ("file.name", "file_name"),
    ("file.path", "file_path"),
    ("file.hash", "file_hash_sha256"),
    // Findings
    ("finding.title", "finding_title"),
    ("finding.uid", "finding_uid"),
    ("malware.name", "malware_name"),
];

/// Resolves a logical field name to its physical column.
///
/// Unmapped names are returned unchanged.
#[must_use]
pub fn column_for(field: &str) -> &str {
    FIELD_MAPPINGS
        .iter()
        .find(|(logical, _)| *logical == field)
        .map_or(field, |(_, column)| column)
}

/// Returns true if the logical name has an explicit mapping.
#[must_use]
pub fn is_mapped(field: &str) -> bool {
    FIELD_MAPPINGS.iter().any(|(logical, _)| *logical == field)
}

/// Resolves a physical column back to its canonical logical name.
///
/// Unknown columns are returned unchanged.
#[must_use]
pub fn logical_for(column: &str) -> &str {
    FIELD_MAPPINGS
        .iter()
        .find(|(_, physical)| *physical == column)
        .map_or(column, |(logical, _)| logical)
}

/// Rebuilds a nested record from a row keyed by physical columns.
///
/// `src_endpoint_ip` becomes `{"src_endpoint": {"ip": ...}}` so SQL rows have
/// the same shape as the records the in-memory backend serves.
#[must_use]
pub fn nest_columns(row: Map<String, Value>) -> Map<String, Value> {
    let mut record = Map::new();
    for (column, value) in row {
        insert_dotted(&mut record, logical_for(&column), value);
    }
    record
}

/// Inserts a value at a dotted path, creating intermediate objects.
///
/// If an intermediate key already holds a non-object value the full dotted
/// name is used as a flat key instead.
pub fn insert_dotted(record: &mut Map<String, Value>, path: &str, value: Value) {
    let mut segments: Vec<&str> = path.split('.').collect();
    let Some(leaf) = segments.pop() else {
        return;
    };

    if has_scalar_prefix(record, &segments) {
        record.insert(path.to_string(), value);
        return;
    }

    let mut current = record;
    for segment in segments {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        let Value::Object(inner) = entry else {
            return;
        };
        current = inner;
    }
    current.insert(leaf.to_string(), value);
}

fn has_scalar_prefix(record: &Map<String, Value>, segments: &[&str]) -> bool {
    let mut current = record;
    for segment in segments {
        match current.get(*segment) {
            Some(Value::Object(inner)) => current = inner,
            Some(_) => return true,
            None => return false,
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mapped_fields_resolve() {
        assert_eq!(column_for("user.name"), "actor_user_name");
        assert_eq!(column_for("src_endpoint.ip"), "src_endpoint_ip");
        assert_eq!(column_for("severity"), "severity");
        assert!(is_mapped("file.hash"));
    }

    #[test]
    fn test_unmapped_fields_pass_through() {
        assert_eq!(column_for("custom.score"), "custom.score");
        assert!(!is_mapped("custom.score"));
    }

    #[test]
    fn test_reverse_mapping_uses_canonical_name() {
        assert_eq!(logical_for("actor_user_name"), "user.name");
        assert_eq!(logical_for("unknown_column"), "unknown_column");
    }

    #[test]
    fn test_every_logical_name_is_unique() {
        let mut names: Vec<&str> = FIELD_MAPPINGS.iter().map(|(l, _)| *l).collect();
        names.sort_unstable();
        let before = names.len();
        names.dedup();
        assert_eq!(before, names.len());
    }

    #[test]
    fn test_nest_columns() {
        let row = json!({
            "severity": "high",
            "src_endpoint_ip": "10.0.0.1",
            "src_endpoint_port": 443,
            "actor_user_name": "alice"
        });
        let Value::Object(row) = row else { unreachable!() };

        let record = nest_columns(row);
        assert_eq!(
            Value::Object(record),
            json!({
                "severity": "high",
                "src_endpoint": {"ip": "10.0.0.1", "port": 443},
                "user": {"name": "alice"}
            })
        );
    }

    #[test]
    fn test_insert_dotted_conflict_falls_back_to_flat_key() {
        let mut record = Map::new();
        record.insert("user".to_string(), json!("root"));
        insert_dotted(&mut record, "user.name", json!("alice"));
        assert_eq!(record.get("user.name"), Some(&json!("alice")));
        assert_eq!(record.get("user"), Some(&json!("root")));
    }
}
