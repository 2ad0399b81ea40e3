use retort_core::{
    fields, Column, ColumnType, Connection, Engine, Keyring, Manager, Model, Table, Value,
};

const SECRET_KEY: [u8; 32] = [11; 32];

struct Vault;

impl Model for Vault {
    fn table() -> Option<Table> {
        Some(
            Table::new("secret_vault")
                .column(Column::primary_key("id"))
                .column(Column::new("label", ColumnType::Text))
                .column(Column::new("secret", ColumnType::Text))
                .column(Column::new("pin", ColumnType::Integer)),
        )
    }

    fn encryption() -> Keyring {
        Keyring::new()
            .with_key("secret", SECRET_KEY)
            .with_key("pin", SECRET_KEY)
    }
}

fn vaults() -> Manager<Vault> {
    let manager = Manager::<Vault>::new(Engine::sqlite_in_memory().unwrap()).unwrap();
    manager.create_table().unwrap();
    manager
}

fn stored_value(engine: &Engine, column: &str, label: &str) -> Value {
    let mut conn = engine.connect().unwrap();
    let query = retort_core::query::compile_where(
        &retort_core::schema::registry::resolve::<Vault>().unwrap(),
        vec![retort_core::col("label").eq(label)],
        None,
    )
    .unwrap();
    let mut cursor = conn.execute(&query).unwrap();
    let row = cursor.fetch_one_row().unwrap();
    row.into_iter()
        .find(|(name, _)| name == column)
        .map(|(_, value)| value)
        .unwrap()
}

#[test]
fn encrypted_columns_are_sealed_at_rest_and_opened_on_load() {
    let vaults = vaults();
    let created = vaults
        .create(fields! { "label" => "main", "secret" => "hunter2", "pin" => 1234_i64 })
        .unwrap();
    assert_eq!(created.get("secret"), Some(&Value::from("hunter2")));
    assert_eq!(created.get("pin"), Some(&Value::Integer(1234)));

    let raw = stored_value(vaults.engine(), "secret", "main");
    let sealed = raw.as_bytes().unwrap();
    assert!(sealed.len() > "hunter2".len());
    assert!(!sealed.windows(7).any(|window| window == b"hunter2"));

    let loaded = vaults
        .find_one_by(&fields! { "label" => "main" })
        .unwrap()
        .unwrap();
    assert_eq!(loaded.get("secret"), Some(&Value::from("hunter2")));
    assert_eq!(loaded.get("pin"), Some(&Value::Integer(1234)));
}

#[test]
fn every_write_uses_a_fresh_nonce() {
    let vaults = vaults();
    let mut record = vaults
        .create(fields! { "label" => "nonce", "secret" => "same" })
        .unwrap();
    let first = stored_value(vaults.engine(), "secret", "nonce");

    record.save(None).unwrap();
    let second = stored_value(vaults.engine(), "secret", "nonce");
    assert_ne!(first, second);
    assert_eq!(record.get("secret"), Some(&Value::from("same")));
}

#[test]
fn legacy_plaintext_rows_load_unchanged() {
    let vaults = vaults();
    {
        let mut conn = vaults.engine().connect().unwrap();
        conn.execute_batch(
            "INSERT INTO \"secret_vault\" (\"label\", \"secret\", \"pin\") VALUES ('legacy', 'plain text', 42);",
        )
        .unwrap();
    }

    let legacy = vaults
        .find_one_by(&fields! { "label" => "legacy" })
        .unwrap()
        .unwrap();
    assert_eq!(legacy.get("secret"), Some(&Value::from("plain text")));
    assert_eq!(legacy.get("pin"), Some(&Value::Integer(42)));
}

#[test]
fn projections_show_plain_values() {
    let vaults = vaults();
    let record = vaults
        .create(fields! { "label" => "json", "secret" => "visible" })
        .unwrap();

    let json: serde_json::Value = serde_json::from_str(&record.to_json().unwrap()).unwrap();
    assert_eq!(json["secret"], serde_json::json!("visible"));
    assert_eq!(json["pin"], serde_json::Value::Null);
}
