use super::TableDescriptor;

pub const DESCRIPTOR: TableDescriptor = TableDescriptor {
    entity_type: "rma",
    table: "rmas",
    key: "id",
    columns: &[
        "id",
        "serial_number",
        "customer",
        "reason",
        "status",
        "defect_description",
        "resolution",
        "created_at",
        "received_at",
        "resolved_at",
    ],
    child: None,
};
