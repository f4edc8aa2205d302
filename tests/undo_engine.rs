mod common;

use common::{
    alice, bob, execute, fetch_children, fetch_row, harness, harness_with,
    harness_with_registry, undo_log_count,
};
use serde_json::Value;
use snapback::application::undo::{NotFound, UndoError, UndoOptions};
use snapback::domain::snapshots::{LINES_KEY, Scalar};
use snapback::domain::types::{ConflictPolicy, UndoAction};
use snapback::infra::db::entities::{
    ChildTable, EntityRegistry, TableDescriptor, TableSnapshotter,
};
use std::sync::Arc;
use time::Duration;

struct Case {
    entity_type: &'static str,
    table: &'static str,
    key: &'static str,
    id: &'static str,
    child: Option<(&'static str, &'static str)>,
}

const CASES: &[Case] = &[
    Case { entity_type: "eco", table: "ecos", key: "id", id: "ECO-1", child: None },
    Case { entity_type: "workorder", table: "work_orders", key: "id", id: "WO-1", child: None },
    Case { entity_type: "ncr", table: "ncrs", key: "id", id: "NCR-1", child: None },
    Case { entity_type: "device", table: "devices", key: "serial_number", id: "SN-001", child: None },
    Case { entity_type: "inventory", table: "inventory", key: "ipn", id: "IPN-100", child: None },
    Case { entity_type: "rma", table: "rmas", key: "id", id: "RMA-1", child: None },
    Case { entity_type: "vendor", table: "vendors", key: "id", id: "V-1", child: None },
    Case {
        entity_type: "quote",
        table: "quotes",
        key: "id",
        id: "Q-1",
        child: Some(("quote_lines", "quote_id")),
    },
    Case {
        entity_type: "po",
        table: "purchase_orders",
        key: "id",
        id: "PO-1",
        child: Some(("po_lines", "po_id")),
    },
];

#[tokio::test]
async fn every_entity_type_round_trips_through_delete() {
    let h = harness().await;

    for case in CASES {
        let before = fetch_row(&h.pool, case.table, case.key, case.id)
            .await
            .expect("fixture row");
        let children_before = match case.child {
            Some((table, fk)) => fetch_children(&h.pool, table, fk, case.id).await,
            None => Vec::new(),
        };

        let entry = h
            .service
            .create_entry(&alice(), UndoAction::Delete, case.entity_type, case.id)
            .await
            .unwrap_or_else(|err| panic!("capture {}: {err}", case.entity_type));

        execute(
            &h.pool,
            &format!(
                "DELETE FROM {} WHERE {} = '{}'",
                case.table, case.key, case.id
            ),
        )
        .await;
        assert!(fetch_row(&h.pool, case.table, case.key, case.id).await.is_none());

        let restored = h.service.perform_undo(&alice(), entry.id).await.unwrap();
        assert_eq!(restored.entity_type, case.entity_type);
        assert_eq!(restored.entity_id, case.id);
        assert_eq!(restored.action, UndoAction::Delete);

        let after = fetch_row(&h.pool, case.table, case.key, case.id)
            .await
            .expect("restored row");
        assert_eq!(after, before, "{} differs after restore", case.entity_type);

        if let Some((table, fk)) = case.child {
            let children_after = fetch_children(&h.pool, table, fk, case.id).await;
            assert_eq!(children_after, children_before, "{} lines differ", case.entity_type);
        }
    }

    assert_eq!(undo_log_count(&h.pool).await, 0);
}

#[tokio::test]
async fn purchase_order_lines_keep_ids_and_quantities() {
    let h = harness().await;

    let entry = h
        .service
        .create_entry(&alice(), UndoAction::Delete, "po", "PO-1")
        .await
        .unwrap();

    let document = entry.snapshot.decode().unwrap();
    let lines = document.children(LINES_KEY).expect("lines captured");
    assert_eq!(lines.len(), 2);

    execute(&h.pool, "DELETE FROM purchase_orders WHERE id = 'PO-1'").await;
    assert!(fetch_children(&h.pool, "po_lines", "po_id", "PO-1").await.is_empty());

    h.service.perform_undo(&alice(), entry.id).await.unwrap();

    let lines = fetch_children(&h.pool, "po_lines", "po_id", "PO-1").await;
    let summary: Vec<(Scalar, Scalar)> = lines
        .iter()
        .map(|line| (line.value_or_null("id"), line.value_or_null("qty_ordered")))
        .collect();
    assert_eq!(
        summary,
        [
            (Scalar::Integer(1), Scalar::Real(5.0)),
            (Scalar::Integer(2), Scalar::Real(10.0)),
        ]
    );
}

#[tokio::test]
async fn restoring_the_same_snapshot_twice_is_idempotent() {
    let h = harness().await;
    let registry = EntityRegistry::standard().unwrap();

    let mut conn = h.pool.acquire().await.unwrap();
    let document = registry.capture(&mut *conn, "quote", "Q-1").await.unwrap();
    registry.restore(&mut *conn, "quote", &document).await.unwrap();
    registry.restore(&mut *conn, "quote", &document).await.unwrap();
    drop(conn);

    let lines = fetch_children(&h.pool, "quote_lines", "quote_id", "Q-1").await;
    assert_eq!(lines.len(), 2);
    let quote = fetch_row(&h.pool, "quotes", "id", "Q-1").await.unwrap();
    assert_eq!(quote.value_or_null("notes"), Scalar::from("initial quote"));
}

#[tokio::test]
async fn entries_are_private_to_their_owner() {
    let h = harness().await;

    let entry = h
        .service
        .create_entry(&alice(), UndoAction::Delete, "vendor", "V-1")
        .await
        .unwrap();

    assert!(h.service.list_entries(&bob(), None).await.unwrap().is_empty());
    let err = h.service.perform_undo(&bob(), entry.id).await.unwrap_err();
    assert!(matches!(err, UndoError::NotFound(NotFound::Entry)));

    let listed = h.service.list_entries(&alice(), None).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, entry.id);
}

#[tokio::test]
async fn expired_entries_are_hidden_until_reaped() {
    let h = harness().await;

    let entry = h
        .service
        .create_entry(&alice(), UndoAction::Update, "rma", "RMA-1")
        .await
        .unwrap();
    assert_eq!(entry.expires_at - entry.created_at, Duration::hours(24));

    h.clock.advance(Duration::hours(24));

    assert!(h.service.list_entries(&alice(), None).await.unwrap().is_empty());
    let err = h.service.perform_undo(&alice(), entry.id).await.unwrap_err();
    assert_eq!(err.to_string(), "undo entry not found or expired");
    assert_eq!(undo_log_count(&h.pool).await, 1);

    assert_eq!(h.service.purge_expired().await.unwrap(), 1);
    assert_eq!(undo_log_count(&h.pool).await, 0);
}

#[tokio::test]
async fn an_entry_can_be_used_once() {
    let h = harness().await;

    let entry = h
        .service
        .create_entry(&alice(), UndoAction::Delete, "device", "SN-001")
        .await
        .unwrap();
    execute(&h.pool, "DELETE FROM devices WHERE serial_number = 'SN-001'").await;

    h.service.perform_undo(&alice(), entry.id).await.unwrap();
    let err = h.service.perform_undo(&alice(), entry.id).await.unwrap_err();
    assert!(matches!(err, UndoError::NotFound(NotFound::Entry)));
    assert!(fetch_row(&h.pool, "devices", "serial_number", "SN-001").await.is_some());
}

#[tokio::test]
async fn unsupported_types_and_missing_entities_store_nothing() {
    let h = harness().await;

    let err = h
        .service
        .create_entry(&alice(), UndoAction::Delete, "invoice", "INV-1")
        .await
        .unwrap_err();
    assert!(matches!(err, UndoError::UnsupportedEntityType { entity_type } if entity_type == "invoice"));

    let err = h
        .service
        .create_entry(&alice(), UndoAction::Delete, "po", "PO-404")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        UndoError::NotFound(NotFound::Entity { entity_type, entity_id })
            if entity_type == "po" && entity_id == "PO-404"
    ));

    assert_eq!(undo_log_count(&h.pool).await, 0);
}

#[tokio::test]
async fn status_change_is_reverted() {
    let h = harness().await;

    let entry = h
        .service
        .create_entry(&alice(), UndoAction::StatusChange, "ncr", "NCR-1")
        .await
        .unwrap();
    execute(
        &h.pool,
        "UPDATE ncrs SET status = 'closed', resolved_at = '2026-03-09 10:00:00' WHERE id = 'NCR-1'",
    )
    .await;

    h.service.perform_undo(&alice(), entry.id).await.unwrap();

    let ncr = fetch_row(&h.pool, "ncrs", "id", "NCR-1").await.unwrap();
    assert_eq!(ncr.value_or_null("status"), Scalar::from("open"));
    assert_eq!(ncr.value_or_null("resolved_at"), Scalar::Null);
}

#[tokio::test]
async fn last_write_wins_overwrites_intervening_edits() {
    let h = harness().await;

    let entry = h
        .service
        .create_entry(&alice(), UndoAction::Update, "quote", "Q-1")
        .await
        .unwrap();

    execute(
        &h.pool,
        "UPDATE quotes SET notes = 'revised', status = 'sent' WHERE id = 'Q-1';
         UPDATE quote_lines SET qty = 1 WHERE id = 1;
         INSERT INTO quote_lines (id, quote_id, ipn, qty, unit_price) VALUES (3, 'Q-1', 'IPN-300', 4, 9.5);",
    )
    .await;

    h.service.perform_undo(&alice(), entry.id).await.unwrap();

    let quote = fetch_row(&h.pool, "quotes", "id", "Q-1").await.unwrap();
    assert_eq!(quote.value_or_null("notes"), Scalar::from("initial quote"));
    assert_eq!(quote.value_or_null("status"), Scalar::from("draft"));

    let lines = fetch_children(&h.pool, "quote_lines", "quote_id", "Q-1").await;
    let ids: Vec<Scalar> = lines.iter().map(|line| line.value_or_null("id")).collect();
    assert_eq!(ids, [Scalar::Integer(1), Scalar::Integer(2)]);
    assert_eq!(lines[0].value_or_null("qty"), Scalar::Real(100.0));
}

#[tokio::test]
async fn reject_newer_refuses_stale_restores() {
    let h = harness_with(UndoOptions {
        conflict_policy: ConflictPolicy::RejectNewer,
        ..UndoOptions::default()
    })
    .await;

    let older = h
        .service
        .create_entry(&alice(), UndoAction::Update, "vendor", "V-1")
        .await
        .unwrap();
    execute(&h.pool, "UPDATE vendors SET notes = 'first edit' WHERE id = 'V-1'").await;
    h.clock.advance(Duration::seconds(5));
    let newer = h
        .service
        .create_entry(&alice(), UndoAction::Update, "vendor", "V-1")
        .await
        .unwrap();
    execute(&h.pool, "UPDATE vendors SET notes = 'second edit' WHERE id = 'V-1'").await;

    let err = h.service.perform_undo(&alice(), older.id).await.unwrap_err();
    assert!(matches!(err, UndoError::Conflict { .. }));
    assert_eq!(undo_log_count(&h.pool).await, 2);
    let vendor = fetch_row(&h.pool, "vendors", "id", "V-1").await.unwrap();
    assert_eq!(vendor.value_or_null("notes"), Scalar::from("second edit"));

    h.service.perform_undo(&alice(), newer.id).await.unwrap();
    let vendor = fetch_row(&h.pool, "vendors", "id", "V-1").await.unwrap();
    assert_eq!(vendor.value_or_null("notes"), Scalar::from("first edit"));

    h.service.perform_undo(&alice(), older.id).await.unwrap();
    let vendor = fetch_row(&h.pool, "vendors", "id", "V-1").await.unwrap();
    assert_eq!(vendor.value_or_null("notes"), Scalar::Null);
}

#[tokio::test]
async fn snapshots_keep_numeric_types() {
    let h = harness().await;
    execute(
        &h.pool,
        "INSERT INTO devices (serial_number, ipn, status, notes) VALUES ('SN-BLOB', 'IPN-100', 'active', X'68656C6C6F')",
    )
    .await;

    let inventory = h
        .service
        .create_entry(&alice(), UndoAction::Update, "inventory", "IPN-100")
        .await
        .unwrap();
    let raw: Value = serde_json::from_str(inventory.snapshot.as_str()).unwrap();
    assert!(raw["qty_on_hand"].is_f64());
    assert_eq!(raw["qty_on_hand"].as_f64(), Some(10.0));
    assert_eq!(raw["mpn"], Value::from("10"));
    assert!(inventory.snapshot.as_str().contains("\"qty_on_hand\":10.0"));

    let vendor = h
        .service
        .create_entry(&alice(), UndoAction::Update, "vendor", "V-1")
        .await
        .unwrap();
    let raw: Value = serde_json::from_str(vendor.snapshot.as_str()).unwrap();
    assert!(raw["lead_time_days"].is_i64());
    assert!(raw["notes"].is_null());

    let device = h
        .service
        .create_entry(&alice(), UndoAction::Update, "device", "SN-BLOB")
        .await
        .unwrap();
    let raw: Value = serde_json::from_str(device.snapshot.as_str()).unwrap();
    assert_eq!(raw["notes"], Value::from("hello"));

    execute(&h.pool, "UPDATE inventory SET qty_on_hand = 0 WHERE ipn = 'IPN-100'").await;
    h.service.perform_undo(&alice(), inventory.id).await.unwrap();

    let typed: f64 =
        sqlx::query_scalar("SELECT qty_on_hand FROM inventory WHERE ipn = 'IPN-100'")
            .fetch_one(&h.pool)
            .await
            .unwrap();
    assert_eq!(typed, 10.0);
    let storage: String =
        sqlx::query_scalar("SELECT typeof(qty_on_hand) FROM inventory WHERE ipn = 'IPN-100'")
            .fetch_one(&h.pool)
            .await
            .unwrap();
    assert_eq!(storage, "real");
}

const LEGACY_PARTS: TableDescriptor = TableDescriptor {
    entity_type: "legacy_part",
    table: "legacy_parts",
    key: "part_no",
    columns: &["part_no", "note"],
    child: None,
};

#[tokio::test]
async fn ambiguous_keys_are_reported() {
    let mut registry = EntityRegistry::standard().unwrap();
    registry
        .register(Arc::new(TableSnapshotter::new(LEGACY_PARTS)))
        .unwrap();
    let h = harness_with_registry(registry, UndoOptions::default()).await;

    execute(
        &h.pool,
        "CREATE TABLE legacy_parts (part_no TEXT, note TEXT);
         INSERT INTO legacy_parts VALUES ('P-1', 'a'), ('P-1', 'b');",
    )
    .await;

    let err = h
        .service
        .create_entry(&alice(), UndoAction::Delete, "legacy_part", "P-1")
        .await
        .unwrap_err();
    assert!(matches!(err, UndoError::MultipleRows { .. }));
    assert_eq!(undo_log_count(&h.pool).await, 0);
}

#[tokio::test]
async fn failed_restore_rolls_back_and_keeps_the_entry() {
    let h = harness().await;

    let entry = h
        .service
        .create_entry(&alice(), UndoAction::Delete, "po", "PO-1")
        .await
        .unwrap();
    execute(
        &h.pool,
        "DELETE FROM purchase_orders WHERE id = 'PO-1'; DROP TABLE po_lines;",
    )
    .await;

    let err = h.service.perform_undo(&alice(), entry.id).await.unwrap_err();
    assert!(matches!(err, UndoError::Persistence(_)));

    assert!(fetch_row(&h.pool, "purchase_orders", "id", "PO-1").await.is_none());
    let listed = h.service.list_entries(&alice(), None).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, entry.id);
}

#[tokio::test]
async fn corrupt_snapshots_fail_restore_but_still_list() {
    let h = harness().await;

    let entry = h
        .service
        .create_entry(&alice(), UndoAction::Delete, "eco", "ECO-1")
        .await
        .unwrap();
    execute(&h.pool, "UPDATE undo_log SET snapshot = '{\"id\": true}'").await;

    let listed = h.service.list_entries(&alice(), None).await.unwrap();
    assert_eq!(listed.len(), 1);

    let err = h.service.perform_undo(&alice(), entry.id).await.unwrap_err();
    assert!(matches!(err, UndoError::Deserialization { .. }));
    assert_eq!(undo_log_count(&h.pool).await, 1);
}

#[tokio::test]
async fn listing_is_newest_first_and_limited() {
    let h = harness().await;

    let mut created = Vec::new();
    for (entity_type, id) in [("eco", "ECO-1"), ("workorder", "WO-1"), ("ncr", "NCR-1")] {
        let entry = h
            .service
            .create_entry(&alice(), UndoAction::Update, entity_type, id)
            .await
            .unwrap();
        created.push(entry.id);
        h.clock.advance(Duration::milliseconds(10));
    }

    let listed = h.service.list_entries(&alice(), Some(2)).await.unwrap();
    let ids: Vec<_> = listed.iter().map(|entry| entry.id).collect();
    assert_eq!(ids, [created[2], created[1]]);

    let all = h.service.list_entries(&alice(), Some(0)).await.unwrap();
    assert_eq!(all.len(), 3);
}

#[tokio::test]
async fn snapshots_without_lines_leave_children_alone() {
    let h = harness().await;

    let entry = h
        .service
        .create_entry(&alice(), UndoAction::StatusChange, "po", "PO-1")
        .await
        .unwrap();
    execute(
        &h.pool,
        r#"UPDATE undo_log SET snapshot = '{"id":"PO-1","vendor_id":"V-1","status":"closed"}';
           UPDATE purchase_orders SET status = 'sent' WHERE id = 'PO-1';"#,
    )
    .await;

    h.service.perform_undo(&alice(), entry.id).await.unwrap();

    let po = fetch_row(&h.pool, "purchase_orders", "id", "PO-1").await.unwrap();
    assert_eq!(po.value_or_null("status"), Scalar::from("closed"));
    let lines = fetch_children(&h.pool, "po_lines", "po_id", "PO-1").await;
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[1].value_or_null("qty_ordered"), Scalar::Real(10.0));
}

#[tokio::test]
async fn snapshots_missing_their_key_are_not_restored() {
    let h = harness().await;

    let entry = h
        .service
        .create_entry(&alice(), UndoAction::StatusChange, "po", "PO-1")
        .await
        .unwrap();
    execute(
        &h.pool,
        r#"UPDATE undo_log SET snapshot = '{"vendor_id":"V-1","status":"closed"}';"#,
    )
    .await;

    let err = h.service.perform_undo(&alice(), entry.id).await.unwrap_err();
    assert!(matches!(err, UndoError::Deserialization { .. }));

    assert_eq!(undo_log_count(&h.pool).await, 1);
    let po = fetch_row(&h.pool, "purchase_orders", "id", "PO-1").await.unwrap();
    assert_eq!(po.value_or_null("status"), Scalar::from("draft"));
}

#[tokio::test]
async fn conflict_message_does_not_reveal_other_entries() {
    let h = harness_with(UndoOptions {
        conflict_policy: ConflictPolicy::RejectNewer,
        ..UndoOptions::default()
    })
    .await;

    let mine = h
        .service
        .create_entry(&alice(), UndoAction::Update, "vendor", "V-1")
        .await
        .unwrap();
    h.clock.advance(Duration::seconds(1));
    h.service
        .create_entry(&bob(), UndoAction::Update, "vendor", "V-1")
        .await
        .unwrap();

    let err = h.service.perform_undo(&alice(), mine.id).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "restore rejected: vendor `V-1` was modified after this entry was recorded"
    );
}

const KITS: TableDescriptor = TableDescriptor {
    entity_type: "kit",
    table: "kits",
    key: "id",
    columns: &["id", "name"],
    child: Some(ChildTable {
        table: "kit_parts",
        foreign_key: "kit_id",
        key: "id",
        columns: &["id", "kit_id", "part"],
        reserved_key: LINES_KEY,
    }),
};

async fn kit_part_count(pool: &sqlx::SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM kit_parts WHERE kit_id = 7")
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn children_are_matched_on_the_stored_parent_key() {
    let mut registry = EntityRegistry::standard().unwrap();
    registry.register(Arc::new(TableSnapshotter::new(KITS))).unwrap();
    let h = harness_with_registry(registry, UndoOptions::default()).await;

    // `kit_id` has no declared type, so a TEXT '7' never equals the INTEGER 7 stored there.
    execute(
        &h.pool,
        "CREATE TABLE kits (id INTEGER PRIMARY KEY, name TEXT);
         CREATE TABLE kit_parts (id INTEGER PRIMARY KEY, kit_id, part TEXT);
         INSERT INTO kits VALUES (7, 'starter');
         INSERT INTO kit_parts VALUES (1, 7, 'bolt'), (2, 7, 'nut');",
    )
    .await;

    let entry = h
        .service
        .create_entry(&alice(), UndoAction::Delete, "kit", "7")
        .await
        .unwrap();
    let document = entry.snapshot.decode().unwrap();
    assert_eq!(document.children(LINES_KEY).map(<[_]>::len), Some(2));

    execute(&h.pool, "DELETE FROM kit_parts; DELETE FROM kits;").await;
    assert_eq!(kit_part_count(&h.pool).await, 0);

    h.service.perform_undo(&alice(), entry.id).await.unwrap();
    assert_eq!(kit_part_count(&h.pool).await, 2);
}
