//! Fielded devices, keyed by serial number rather than a surrogate id.

use super::TableDescriptor;

pub const DESCRIPTOR: TableDescriptor = TableDescriptor {
    entity_type: "device",
    table: "devices",
    key: "serial_number",
    columns: &[
        "serial_number",
        "ipn",
        "firmware_version",
        "customer",
        "location",
        "status",
        "install_date",
        "last_seen",
        "notes",
        "created_at",
    ],
    child: None,
};
