//! CLI command tests
//!
//! This module contains all tests for the CLI commands.

use std::io::Write;

use tally_core::{
    AccountStore, CategoryStore, CounterpartyStore, Database, ImportConfig, ImportFileType,
    TagStore,
};
use tempfile::NamedTempFile;

use crate::cli::DsvArgs;
use crate::commands::{self, truncate};

const USER: &str = "local-dev";

const CUSTOM_CSV: &str = "Дата,Сумма,Счет,Валюта,Контрагент,ИНН контрагент,Статья,Род. статья,Описание,Проект\n\
                          09.02.2026,-10.50,Wallet,EUR,Cafe Roma,,Coffee,Food,Morning,Work\n\
                          10.02.2026,2500,Wallet,EUR,,,Salary,,,\n";

fn setup_test_db() -> Database {
    Database::in_memory().unwrap()
}

fn write_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

fn dsv_args() -> DsvArgs {
    DsvArgs {
        column_map: Some(r#"{"time": 0, "type": 1, "amount": 2, "account": 3}"#.to_string()),
        type_map: Some(r#"{"Spent": "expense", "Got": "income"}"#.to_string()),
        time_format: Some("%Y-%m-%d".to_string()),
        ..Default::default()
    }
}

// ========== Utility Tests ==========

#[test]
fn test_truncate() {
    assert_eq!(truncate("Wallet", 10), "Wallet");
    assert_eq!(truncate("Supermarket chain", 10), "Superma...");
    // Counts characters, not bytes
    assert_eq!(truncate("Конвертация валют", 8), "Конве...");
}

#[test]
fn test_open_db_unencrypted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tally.db");

    let db = commands::open_db(&path, true).unwrap();
    assert!(!db.is_encrypted().unwrap());
    assert!(path.exists());
}

#[test]
fn test_cmd_init() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tally.db");

    assert!(commands::cmd_init(&path, true).is_ok());
    assert!(path.exists());
}

#[test]
fn test_load_config_override() {
    let file = write_file("[limits]\nmax_tags_per_transaction = 2\n");
    let config = commands::load_config(Some(file.path())).unwrap();
    assert_eq!(config.max_tags_per_transaction, 2);
}

// ========== DSV Option Tests ==========

#[test]
fn test_dsv_options_fixed_formats_need_none() {
    let options = commands::dsv_options(ImportFileType::CustomCsv, &DsvArgs::default()).unwrap();
    assert!(options.is_none());
}

#[test]
fn test_dsv_options_require_column_map() {
    let result = commands::dsv_options(ImportFileType::DsvCsv, &DsvArgs::default());
    assert!(result.is_err());
}

#[test]
fn test_dsv_options_amount_format() {
    let mut args = dsv_args();
    args.decimal_separator = Some(',');
    args.grouping_symbol = Some(String::new());

    let options = commands::dsv_options(ImportFileType::DsvTsv, &args)
        .unwrap()
        .unwrap();
    assert_eq!(options.amount_format.decimal_separator, ',');
    assert_eq!(options.amount_format.grouping_symbol, None);
    assert_eq!(options.type_mapping.len(), 2);

    args.grouping_symbol = Some(",".to_string());
    assert!(commands::dsv_options(ImportFileType::DsvTsv, &args).is_err());
}

#[test]
fn test_dsv_options_rejects_unknown_column() {
    let args = DsvArgs {
        column_map: Some(r#"{"when": 0}"#.to_string()),
        ..Default::default()
    };
    assert!(commands::dsv_options(ImportFileType::DsvCsv, &args).is_err());
}

// ========== Preview Tests ==========

#[test]
fn test_cmd_preview_touches_nothing() {
    let file = write_file(CUSTOM_CSV);
    let rows = commands::cmd_preview(
        &ImportConfig::default(),
        file.path(),
        "custom_csv",
        10,
        &DsvArgs::default(),
    )
    .unwrap();
    assert_eq!(rows, 2);
}

#[test]
fn test_cmd_preview_unknown_format() {
    let file = write_file(CUSTOM_CSV);
    let result = commands::cmd_preview(
        &ImportConfig::default(),
        file.path(),
        "ofx",
        10,
        &DsvArgs::default(),
    );
    assert!(result.is_err());
}

// ========== Import Tests ==========

#[test]
fn test_cmd_import_custom_csv() {
    let db = setup_test_db();
    let file = write_file(CUSTOM_CSV);

    let imported = commands::cmd_import(
        &db,
        &ImportConfig::default(),
        USER,
        file.path(),
        "custom_csv",
        0,
        &DsvArgs::default(),
    )
    .unwrap();
    assert_eq!(imported, 2);

    let uid = db.get_or_create_user(USER).unwrap().id;
    assert_eq!(db.count_transactions(uid).unwrap(), 2);
    assert_eq!(db.list_accounts(uid).unwrap().len(), 1);
    assert_eq!(db.list_categories(uid).unwrap().len(), 3);
    assert_eq!(db.list_counterparties(uid).unwrap().len(), 1);

    let tags = db.list_tags(uid).unwrap();
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].group_name.as_deref(), Some("Проект"));

    // Listings run against the imported data
    assert!(commands::cmd_accounts(&db, USER).is_ok());
    assert!(commands::cmd_categories(&db, USER).is_ok());
    assert!(commands::cmd_counterparties(&db, USER).is_ok());
    assert!(commands::cmd_tags(&db, USER).is_ok());
}

#[test]
fn test_cmd_import_twice_reuses_entities() {
    let db = setup_test_db();
    let file = write_file(CUSTOM_CSV);
    let config = ImportConfig::default();

    for _ in 0..2 {
        commands::cmd_import(
            &db,
            &config,
            USER,
            file.path(),
            "custom_csv",
            0,
            &DsvArgs::default(),
        )
        .unwrap();
    }

    let uid = db.get_or_create_user(USER).unwrap().id;
    assert_eq!(db.count_transactions(uid).unwrap(), 4);
    assert_eq!(db.list_accounts(uid).unwrap().len(), 1);
    assert_eq!(db.list_categories(uid).unwrap().len(), 3);
    assert_eq!(db.list_tags(uid).unwrap().len(), 1);
}

#[test]
fn test_cmd_import_is_scoped_to_user() {
    let db = setup_test_db();
    let file = write_file(CUSTOM_CSV);

    commands::cmd_import(
        &db,
        &ImportConfig::default(),
        "me@example.com",
        file.path(),
        "custom_csv",
        0,
        &DsvArgs::default(),
    )
    .unwrap();

    let other = db.get_or_create_user("you@example.com").unwrap().id;
    assert!(db.list_accounts(other).unwrap().is_empty());
    assert_eq!(db.count_transactions(other).unwrap(), 0);
}

#[test]
fn test_cmd_import_dsv() {
    let db = setup_test_db();
    let file = write_file("date,kind,sum,account\n2026-02-09,Spent,12.50,Card\n2026-02-10,Got,100,Card\n");

    let imported = commands::cmd_import(
        &db,
        &ImportConfig::default(),
        USER,
        file.path(),
        "dsv_csv",
        180,
        &dsv_args(),
    )
    .unwrap();
    assert_eq!(imported, 2);

    let uid = db.get_or_create_user(USER).unwrap().id;
    let stored = db.list_transactions(uid, 10, 0).unwrap();
    assert!(stored.iter().all(|t| t.utc_offset_minutes == 180));
    assert!(stored.iter().any(|t| t.amount == 1250));
}

#[test]
fn test_cmd_import_future_rows_are_planned() {
    let db = setup_test_db();
    let file = write_file("date,kind,sum,account\n2999-01-01,Spent,5,Card\n");

    commands::cmd_import(
        &db,
        &ImportConfig::default(),
        USER,
        file.path(),
        "dsv_csv",
        0,
        &dsv_args(),
    )
    .unwrap();

    let uid = db.get_or_create_user(USER).unwrap().id;
    let stored = db.list_transactions(uid, 10, 0).unwrap();
    assert_eq!(stored.len(), 1);
    assert!(stored[0].planned);
}

#[test]
fn test_cmd_import_rejects_oversize_file() {
    let db = setup_test_db();
    let file = write_file(CUSTOM_CSV);
    let config = ImportConfig {
        max_import_file_size: 8,
        ..Default::default()
    };

    let result = commands::cmd_import(
        &db,
        &config,
        USER,
        file.path(),
        "custom_csv",
        0,
        &DsvArgs::default(),
    );
    assert!(result.is_err());

    let uid = db.get_or_create_user(USER).unwrap().id;
    assert!(db.list_accounts(uid).unwrap().is_empty());
}

#[test]
fn test_cmd_import_missing_file() {
    let db = setup_test_db();
    let result = commands::cmd_import(
        &db,
        &ImportConfig::default(),
        USER,
        std::path::Path::new("/nonexistent/export.csv"),
        "custom_csv",
        0,
        &DsvArgs::default(),
    );
    assert!(result.is_err());
}

#[test]
fn test_entity_listings_empty() {
    let db = setup_test_db();
    assert!(commands::cmd_accounts(&db, USER).is_ok());
    assert!(commands::cmd_categories(&db, USER).is_ok());
    assert!(commands::cmd_counterparties(&db, USER).is_ok());
    assert!(commands::cmd_tags(&db, USER).is_ok());
}
