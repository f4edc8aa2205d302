//! Stock levels per internal part number.

use super::TableDescriptor;

pub const DESCRIPTOR: TableDescriptor = TableDescriptor {
    entity_type: "inventory",
    table: "inventory",
    key: "ipn",
    columns: &[
        "ipn",
        "qty_on_hand",
        "qty_reserved",
        "location",
        "reorder_point",
        "reorder_qty",
        "description",
        "mpn",
        "updated_at",
    ],
    child: None,
};
