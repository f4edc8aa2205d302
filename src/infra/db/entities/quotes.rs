//! Customer quotes and their priced lines.

use crate::domain::snapshots::LINES_KEY;

use super::{ChildTable, TableDescriptor};

pub const DESCRIPTOR: TableDescriptor = TableDescriptor {
    entity_type: "quote",
    table: "quotes",
    key: "id",
    columns: &[
        "id",
        "customer",
        "status",
        "notes",
        "created_at",
        "valid_until",
        "accepted_at",
    ],
    child: Some(ChildTable {
        table: "quote_lines",
        foreign_key: "quote_id",
        key: "id",
        columns: &[
            "id",
            "quote_id",
            "ipn",
            "description",
            "qty",
            "unit_price",
            "notes",
        ],
        reserved_key: LINES_KEY,
    }),
};
