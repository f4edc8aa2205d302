use super::TableDescriptor;

pub const DESCRIPTOR: TableDescriptor = TableDescriptor {
    entity_type: "vendor",
    table: "vendors",
    key: "id",
    columns: &[
        "id",
        "name",
        "website",
        "contact_name",
        "contact_email",
        "contact_phone",
        "notes",
        "status",
        "lead_time_days",
        "created_at",
    ],
    child: None,
};
