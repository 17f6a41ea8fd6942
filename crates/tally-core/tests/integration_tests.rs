//! Integration tests for tally-core
//!
//! These tests exercise the full parse → resolve → persist workflow.

use std::time::Duration;

use tally_core::{
    db::Database,
    import::{
        decode_amount, decode_date, import_progress, import_transactions, normalize_grid,
        parse_file, prepare_import, Column, DengiOperacii, FormatAdapter, ImportFileType,
        ImportOutcome, InMemorySubmissionRemarks, RawRow,
    },
    models::{NewTransaction, TransactionType},
    store::{AccountStore, CategoryStore, CounterpartyStore, TagStore},
    EntityDefaults, Error,
};

const DENGI_HEADER: [&str; 9] = [
    "Дата",
    "Сумма",
    "Счет",
    "Валюта",
    "Контрагент",
    "Статья",
    "Описание",
    "Направление",
    "Субнаправление",
];

fn dengi_grid(rows: &[[&str; 9]]) -> Vec<RawRow> {
    std::iter::once(&DENGI_HEADER)
        .chain(rows.iter())
        .map(|row| row.iter().map(|c| c.to_string()).collect())
        .collect()
}

const CUSTOM_HEADER: &str =
    "Дата,Сумма,Счет,Валюта,Контрагент,ИНН контрагент,Статья,Род. статья,Описание,Проект\n";

fn resolved(
    db: &Database,
    uid: i64,
    file_type: ImportFileType,
    data: &[u8],
) -> Vec<NewTransaction> {
    let (table, settings) = parse_file(file_type, data, None, 0).expect("parse");
    let existing = db.existing_entities(uid).expect("lookups");
    let prepared = prepare_import(db, &existing, &EntityDefaults::default(), uid, &table, &settings)
        .expect("prepare");

    prepared
        .transactions
        .iter()
        .map(|tx| tx.to_new_transaction().expect("resolved"))
        .collect()
}

// =============================================================================
// Decoding
// =============================================================================

#[test]
fn test_dates_in_every_shape_agree() {
    for raw in ["09.02.2026", "09.02.26", "2026-02-09", "02/09/2026", "02-09-26"] {
        assert_eq!(decode_date(raw).unwrap().to_string(), "2026-02-09", "{}", raw);
    }
}

#[test]
fn test_amount_conventions() {
    let a = decode_amount("(-559.08)").unwrap();
    assert_eq!((a.minor_units(), a.is_negative), (55908, true));

    let a = decode_amount("(264)").unwrap();
    assert_eq!((a.minor_units(), a.is_negative), (26400, false));

    let a = decode_amount("-14000").unwrap();
    assert_eq!((a.minor_units(), a.is_negative), (1400000, true));

    let a = decode_amount("").unwrap();
    assert_eq!((a.minor_units(), a.is_negative), (0, false));
}

// =============================================================================
// Transfer pairing
// =============================================================================

#[test]
fn test_two_leg_transfer_becomes_one_transaction() {
    let db = Database::in_memory().unwrap();
    let uid = db.get_or_create_user("me@example.com").unwrap().id;

    let adapter = DengiOperacii;
    let grid = dengi_grid(&[
        ["09.02.2026", "-14000", "Wallet", "RUB", "", "Конвертация валют", "", "", ""],
        ["09.02.2026", "3000", "Card", "USD", "", "Конвертация валют", "", "", ""],
    ]);
    let table = normalize_grid(&adapter, &grid).unwrap();
    assert_eq!(table.len(), 1);

    let existing = db.existing_entities(uid).unwrap();
    let prepared = prepare_import(
        &db,
        &existing,
        &EntityDefaults::default(),
        uid,
        &table,
        &adapter.settings(),
    )
    .unwrap();

    assert_eq!(prepared.transactions.len(), 1);
    let tx = &prepared.transactions[0];
    assert_eq!(tx.transaction_type, TransactionType::Transfer);
    assert_eq!(tx.original_source_account_name, "Wallet");
    assert_eq!(tx.original_destination_account_name, "Card");
    assert_eq!(tx.amount, 1400000);
    assert_eq!(tx.related_amount, 300000);

    let accounts = db.list_accounts(uid).unwrap();
    let wallet = accounts.iter().find(|a| a.name == "Wallet").unwrap();
    let card = accounts.iter().find(|a| a.name == "Card").unwrap();
    assert_eq!(tx.account_id, Some(wallet.id));
    assert_eq!(tx.related_account_id, Some(card.id));
    assert_eq!(wallet.currency, "RUB");
    assert_eq!(card.currency, "USD");
}

#[test]
fn test_pairing_is_symmetric() {
    let adapter = DengiOperacii;
    let negative_first = dengi_grid(&[
        ["09.02.2026", "-50", "Wallet", "RUB", "", "Перевод между счетами", "", "", ""],
        ["09.02.2026", "50", "Card", "RUB", "", "Перевод между счетами", "", "", ""],
    ]);
    let positive_first = dengi_grid(&[
        ["09.02.2026", "50", "Card", "RUB", "", "Перевод между счетами", "", "", ""],
        ["09.02.2026", "-50", "Wallet", "RUB", "", "Перевод между счетами", "", "", ""],
    ]);

    for grid in [negative_first, positive_first] {
        let table = normalize_grid(&adapter, &grid).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows()[0].get(Column::AccountName), "Wallet");
        assert_eq!(table.rows()[0].get(Column::RelatedAccountName), "Card");
    }
}

#[test]
fn test_unmatched_leg_is_kept_without_destination() {
    let db = Database::in_memory().unwrap();
    let uid = db.get_or_create_user("me@example.com").unwrap().id;

    let adapter = DengiOperacii;
    let grid = dengi_grid(&[[
        "09.02.2026",
        "-50",
        "Wallet",
        "RUB",
        "",
        "Перевод между счетами",
        "",
        "",
        "",
    ]]);
    let table = normalize_grid(&adapter, &grid).unwrap();
    assert_eq!(table.len(), 1);
    assert_eq!(table.rows()[0].get(Column::RelatedAccountName), "");

    let existing = db.existing_entities(uid).unwrap();
    let prepared = prepare_import(
        &db,
        &existing,
        &EntityDefaults::default(),
        uid,
        &table,
        &adapter.settings(),
    )
    .unwrap();
    let batch: Vec<_> = prepared
        .transactions
        .iter()
        .map(|tx| tx.to_new_transaction().unwrap())
        .collect();
    assert_eq!(batch[0].related_account_id, None);

    let remarks = InMemorySubmissionRemarks::new(Duration::from_secs(60));
    let outcome = import_transactions(&db, Some(&remarks), uid, "s1", &batch).unwrap();
    assert_eq!(outcome, ImportOutcome::Imported(1));
}

#[test]
fn test_missing_amount_header_is_fatal() {
    let grid: Vec<RawRow> = vec![
        vec!["Дата".into(), "Счет".into(), "Статья".into()],
        vec!["09.02.2026".into(), "Wallet".into(), "Food".into()],
    ];
    let err = normalize_grid(&DengiOperacii, &grid).unwrap_err();
    assert!(matches!(err, Error::MissingHeaderColumn(c) if c == "Сумма"));
}

// =============================================================================
// Entity auto-creation
// =============================================================================

#[test]
fn test_new_parent_and_child_created_once_for_ten_rows() {
    let db = Database::in_memory().unwrap();
    let uid = db.get_or_create_user("me@example.com").unwrap().id;

    let mut csv = CUSTOM_HEADER.to_string();
    for day in 1..=10 {
        csv.push_str(&format!(
            "{:02}.02.2026,-10.50,Wallet,EUR,Cafe Roma,,Coffee,Food,,Work\n",
            day
        ));
    }

    let batch = resolved(&db, uid, ImportFileType::CustomCsv, csv.as_bytes());
    assert_eq!(batch.len(), 10);

    let categories = db.list_categories(uid).unwrap();
    assert_eq!(categories.len(), 2);
    let food = categories.iter().find(|c| c.name == "Food").unwrap();
    let coffee = categories.iter().find(|c| c.name == "Coffee").unwrap();
    assert_eq!(food.parent_id, None);
    assert_eq!(coffee.parent_id, Some(food.id));
    assert!(batch.iter().all(|tx| tx.category_id == Some(coffee.id)));

    assert_eq!(db.list_accounts(uid).unwrap().len(), 1);
    assert_eq!(db.list_counterparties(uid).unwrap().len(), 1);

    let tags = db.list_tags(uid).unwrap();
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].name, "Work");
    assert_eq!(tags[0].group_name.as_deref(), Some("Проект"));
    assert!(batch.iter().all(|tx| tx.tag_ids == vec![tags[0].id]));
}

#[test]
fn test_second_import_reuses_entities() {
    let db = Database::in_memory().unwrap();
    let uid = db.get_or_create_user("me@example.com").unwrap().id;
    let csv = format!(
        "{}09.02.2026,-10.50,Wallet,EUR,Cafe Roma,,Coffee,Food,,Work\n",
        CUSTOM_HEADER
    );

    let first = resolved(&db, uid, ImportFileType::CustomCsv, csv.as_bytes());
    let second = resolved(&db, uid, ImportFileType::CustomCsv, csv.as_bytes());

    assert_eq!(first, second);
    assert_eq!(db.list_categories(uid).unwrap().len(), 2);
    assert_eq!(db.list_accounts(uid).unwrap().len(), 1);
    assert_eq!(db.list_counterparties(uid).unwrap().len(), 1);
    assert_eq!(db.list_tags(uid).unwrap().len(), 1);
}

// =============================================================================
// Persistence and the duplicate guard
// =============================================================================

#[test]
fn test_replayed_session_creates_nothing() {
    let db = Database::in_memory().unwrap();
    let uid = db.get_or_create_user("me@example.com").unwrap().id;
    let remarks = InMemorySubmissionRemarks::new(Duration::from_secs(60));

    let csv = format!(
        "{}09.02.2026,-10.50,Wallet,EUR,,,Coffee,,,\n10.02.2026,2500,Wallet,EUR,,,Salary,,,\n",
        CUSTOM_HEADER
    );
    let batch = resolved(&db, uid, ImportFileType::CustomCsv, csv.as_bytes());

    let first = import_transactions(&db, Some(&remarks), uid, "session-1", &batch).unwrap();
    assert_eq!(first, ImportOutcome::Imported(2));

    let again = import_transactions(&db, Some(&remarks), uid, "session-1", &batch).unwrap();
    assert_eq!(again, ImportOutcome::Replayed(2));
    assert_eq!(db.count_transactions(uid).unwrap(), 2);
    assert_eq!(import_progress(&remarks, uid, "session-1"), Some(100.0));

    let stored = db.list_transactions(uid, 10, 0).unwrap();
    let salary = stored
        .iter()
        .find(|t| t.transaction_type == TransactionType::Income)
        .unwrap();
    assert_eq!(salary.amount, 250000);
}
