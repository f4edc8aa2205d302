//! Engineering change orders.

use super::TableDescriptor;

pub const DESCRIPTOR: TableDescriptor = TableDescriptor {
    entity_type: "eco",
    table: "ecos",
    key: "id",
    columns: &[
        "id",
        "title",
        "description",
        "status",
        "priority",
        "affected_ipns",
        "created_by",
        "created_at",
        "updated_at",
        "approved_at",
        "approved_by",
    ],
    child: None,
};
