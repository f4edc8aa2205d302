//! Purchase orders. Lines are restored with their original ids so receipts that reference them
//! stay valid.

use crate::domain::snapshots::LINES_KEY;

use super::{ChildTable, TableDescriptor};

pub const DESCRIPTOR: TableDescriptor = TableDescriptor {
    entity_type: "po",
    table: "purchase_orders",
    key: "id",
    columns: &[
        "id",
        "vendor_id",
        "status",
        "notes",
        "created_at",
        "expected_date",
        "received_at",
    ],
    child: Some(ChildTable {
        table: "po_lines",
        foreign_key: "po_id",
        key: "id",
        columns: &[
            "id",
            "po_id",
            "ipn",
            "mpn",
            "manufacturer",
            "qty_ordered",
            "qty_received",
            "unit_price",
            "notes",
        ],
        reserved_key: LINES_KEY,
    }),
};
