use chrono::NaiveDate;
use retort_core::db::open_db;
use retort_core::{
    fields, Column, ColumnType, DbError, Engine, EngineOptions, Manager, Model, OrmError, Table,
    Value,
};
use rust_decimal::Decimal;

struct Invoice;

impl Model for Invoice {
    fn table() -> Option<Table> {
        Some(
            Table::new("file_invoice")
                .column(Column::primary_key("id"))
                .column(Column::new("number", ColumnType::String(20)).not_null())
                .column(Column::new("total", ColumnType::Numeric))
                .column(Column::new("paid", ColumnType::Boolean).default_value(false))
                .column(Column::new("issued_at", ColumnType::DateTime))
                .column(Column::new("attachment", ColumnType::Binary)),
        )
    }
}

#[test]
fn file_engine_persists_across_engines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("invoices.sqlite3");
    let issued_at = NaiveDate::from_ymd_opt(2010, 10, 10)
        .unwrap()
        .and_hms_opt(8, 30, 0)
        .unwrap();

    let writer = Manager::<Invoice>::new(Engine::sqlite(&path)).unwrap();
    writer.create_table().unwrap();
    writer.ensure_table_ready().unwrap();
    writer
        .create(fields! {
            "number" => "INV-1",
            "total" => "19.9",
            "issued_at" => issued_at,
            "attachment" => vec![0_u8, 159, 146, 150],
        })
        .unwrap();

    let uri = format!("sqlite://{}", path.display());
    let reader = Manager::<Invoice>::new(Engine::from_uri(&uri).unwrap()).unwrap();
    let invoice = reader
        .find_one_by(&fields! { "number" => "INV-1" })
        .unwrap()
        .unwrap();

    assert_eq!(invoice.get("total"), Some(&Value::Decimal(Decimal::new(1990, 2))));
    assert_eq!(invoice.get("paid"), Some(&Value::Boolean(false)));
    assert_eq!(invoice.get("issued_at"), Some(&Value::Timestamp(issued_at)));
    assert_eq!(
        invoice.get("attachment"),
        Some(&Value::Blob(vec![0, 159, 146, 150]))
    );

    let dict = invoice.to_dict().unwrap();
    assert_eq!(dict["total"], Value::from("19.90"));
    assert_eq!(dict["issued_at"], Value::from("2010-10-10T08:30:00"));

    let conn = open_db(&path, &EngineOptions::default()).unwrap();
    let stored: String = conn
        .query_row("SELECT total FROM file_invoice", [], |row| row.get(0))
        .unwrap();
    assert_eq!(stored, "19.90");
}

#[test]
fn timestamp_filters_match_stored_text() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::sqlite(dir.path().join("filters.sqlite3"));
    let invoices = Manager::<Invoice>::new(engine).unwrap();
    invoices.create_table().unwrap();

    let day = NaiveDate::from_ymd_opt(2024, 2, 29)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    invoices
        .create(fields! { "number" => "INV-2", "issued_at" => "2024-02-29" })
        .unwrap();

    let found = invoices
        .find_by(&fields! { "issued_at" => day })
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].get("issued_at"), Some(&Value::Timestamp(day)));
}

#[test]
fn not_null_violations_propagate_as_backend_errors() {
    let dir = tempfile::tempdir().unwrap();
    let invoices =
        Manager::<Invoice>::new(Engine::sqlite(dir.path().join("strict.sqlite3"))).unwrap();
    invoices.create_table().unwrap();

    let err = invoices.create(fields! { "total" => "1" }).unwrap_err();
    assert!(matches!(err, OrmError::Db(DbError::Sqlite(_))));
    assert!(err.is_constraint_violation());
}

#[test]
fn type_errors_name_entity_and_column() {
    let dir = tempfile::tempdir().unwrap();
    let invoices =
        Manager::<Invoice>::new(Engine::sqlite(dir.path().join("types.sqlite3"))).unwrap();
    invoices.create_table().unwrap();

    let err = invoices
        .create(fields! { "number" => "INV-3", "total" => "a lot" })
        .unwrap_err();
    match err {
        OrmError::FieldType(err) => {
            assert_eq!(err.entity, "Invoice");
            assert_eq!(err.column, "total");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(invoices.total_rows(None, &fields! {}).unwrap(), 0);
}

#[test]
fn readiness_check_reports_missing_table() {
    let dir = tempfile::tempdir().unwrap();
    let invoices =
        Manager::<Invoice>::new(Engine::sqlite(dir.path().join("empty.sqlite3"))).unwrap();

    let err = invoices.ensure_table_ready().unwrap_err();
    assert!(matches!(err, OrmError::Db(DbError::MissingTable(_))));
}
