use super::TableDescriptor;

pub const DESCRIPTOR: TableDescriptor = TableDescriptor {
    entity_type: "workorder",
    table: "work_orders",
    key: "id",
    columns: &[
        "id",
        "assembly_ipn",
        "qty",
        "status",
        "priority",
        "notes",
        "created_at",
        "started_at",
        "completed_at",
    ],
    child: None,
};
