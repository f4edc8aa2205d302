//! Non-conformance reports.

use super::TableDescriptor;

pub const DESCRIPTOR: TableDescriptor = TableDescriptor {
    entity_type: "ncr",
    table: "ncrs",
    key: "id",
    columns: &[
        "id",
        "title",
        "description",
        "ipn",
        "serial_number",
        "defect_type",
        "severity",
        "status",
        "root_cause",
        "corrective_action",
        "created_at",
        "resolved_at",
    ],
    child: None,
};
