//! Import and preview command implementations

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use tally_core::{
    import::{AmountFormat, Column, GeoOrder},
    parse_file, prepare_import, CreatedEntities, Database, DsvOptions, ImportConfig,
    ImportFileType, TransactionStore,
};
use tracing::debug;

use super::truncate;
use crate::cli::DsvArgs;

/// Build DSV options from the command line; `None` for the fixed formats
pub fn dsv_options(file_type: ImportFileType, args: &DsvArgs) -> Result<Option<DsvOptions>> {
    let Some(kind) = file_type.dsv_kind() else {
        return Ok(None);
    };

    let column_map = args
        .column_map
        .as_deref()
        .with_context(|| format!("{} import needs --column-map", file_type))?;
    let columns: HashMap<String, usize> =
        serde_json::from_str(column_map).context("Invalid --column-map JSON")?;
    let types: HashMap<String, String> = match args.type_map.as_deref() {
        Some(json) => serde_json::from_str(json).context("Invalid --type-map JSON")?,
        None => HashMap::new(),
    };

    let mut options = DsvOptions::new(kind)
        .with_column_names(&columns)?
        .with_type_names(&types)?;

    options.has_header = !args.no_header;
    if let Some(format) = &args.time_format {
        options.time_format = format.clone();
    }
    options.timezone_format = args.timezone_format.clone();

    let mut amount_format = AmountFormat::default();
    if let Some(separator) = args.decimal_separator {
        amount_format.decimal_separator = separator;
    }
    if let Some(symbol) = &args.grouping_symbol {
        let mut chars = symbol.chars();
        amount_format.grouping_symbol = match (chars.next(), chars.next()) {
            (None, _) => None,
            (Some(c), None) => Some(c),
            _ => bail!("--grouping-symbol must be a single character"),
        };
    }
    if Some(amount_format.decimal_separator) == amount_format.grouping_symbol {
        bail!("Decimal separator and digit grouping symbol must differ");
    }
    options.amount_format = amount_format;

    if let Some(separator) = args.geo_separator.as_ref().filter(|s| !s.is_empty()) {
        options.geo_separator = separator.clone();
    }
    if let Some(order) = &args.geo_order {
        options.geo_order = order.parse::<GeoOrder>().map_err(anyhow::Error::msg)?;
    }
    if let Some(separator) = args.tag_separator.as_ref().filter(|s| !s.is_empty()) {
        options.tag_separator = separator.clone();
    }

    Ok(Some(options))
}

/// Read an import file, refusing anything over `max_size` bytes
fn read_import_file(file: &Path, max_size: usize) -> Result<Vec<u8>> {
    let size = fs::metadata(file)
        .with_context(|| format!("Failed to open file: {}", file.display()))?
        .len();
    if size > max_size as u64 {
        bail!(
            "File too large ({} bytes). Maximum size is {} MB",
            size,
            max_size / 1024 / 1024
        );
    }
    fs::read(file).with_context(|| format!("Failed to read file: {}", file.display()))
}

fn print_created(created: &CreatedEntities) {
    if created.total() == 0 {
        println!("   All referenced entities already exist");
        return;
    }

    println!("   Created:");
    for account in &created.accounts {
        println!("   + account      {} ({})", account.name, account.currency);
    }
    for category in &created.categories {
        let level = if category.parent_id.is_some() {
            "subcategory"
        } else {
            "category"
        };
        println!(
            "   + {:12} {} [{}]",
            level, category.name, category.category_type
        );
    }
    for counterparty in &created.counterparties {
        println!("   + counterparty {}", counterparty.name);
    }
    for tag in &created.tags {
        match &tag.group_name {
            Some(group) => println!("   + tag          {} (group {})", tag.name, group),
            None => println!("   + tag          {}", tag.name),
        }
    }
}

/// Parse, resolve and persist an import file for `user`
///
/// Returns the number of transactions written.
pub fn cmd_import(
    db: &Database,
    config: &ImportConfig,
    user: &str,
    file: &Path,
    format: &str,
    utc_offset: i32,
    dsv: &DsvArgs,
) -> Result<usize> {
    let file_type: ImportFileType = format.parse()?;
    let data = read_import_file(file, config.max_import_file_size)?;
    let options = dsv_options(file_type, dsv)?;

    println!("📥 Importing {} from {}...", file_type, file.display());

    let (table, settings) = parse_file(file_type, &data, options, utc_offset)?;
    println!("   Found {} transactions", table.len());

    let user = db.get_or_create_user(user)?;
    let existing = db.existing_entities(user.id)?;
    let prepared = prepare_import(
        db,
        &existing,
        &config.defaults,
        user.id,
        &table,
        &settings,
    )?;
    print_created(&prepared.created);

    if prepared.transactions.is_empty() {
        println!("   Nothing to import");
        return Ok(0);
    }

    let now_utc = Utc::now().naive_utc();
    let batch = prepared
        .transactions
        .iter()
        .map(|tx| {
            let mut transaction = tx.to_new_transaction()?;
            transaction.mark_planned_if_future(now_utc);
            Ok(transaction)
        })
        .collect::<tally_core::Result<Vec<_>>>()?;
    let planned = batch.iter().filter(|tx| tx.planned).count();

    let mut last_percent = 0;
    let imported = db.batch_create_transactions(user.id, &batch, &mut |fraction| {
        let percent = (fraction * 100.0).round() as u32;
        if percent > last_percent {
            println!("   Progress: {}%", percent);
            last_percent = percent;
        }
    })?;

    debug!(uid = user.id, imported, "Import committed");

    println!("✅ Import complete!");
    println!("   Imported: {}", imported);
    if planned > 0 {
        println!("   Planned (future-dated): {}", planned);
    }

    Ok(imported)
}

const PREVIEW_COLUMNS: [(Column, &str, usize); 8] = [
    (Column::TransactionTime, "Time", 19),
    (Column::TransactionType, "Type", 10),
    (Column::Amount, "Amount", 12),
    (Column::AccountName, "Account", 16),
    (Column::RelatedAccountName, "To account", 16),
    (Column::Category, "Category", 16),
    (Column::SubCategory, "Subcategory", 16),
    (Column::Payee, "Counterparty", 16),
];

/// Normalize a file and print the resulting table
///
/// Nothing is written to the database. Returns the number of rows.
pub fn cmd_preview(
    config: &ImportConfig,
    file: &Path,
    format: &str,
    limit: usize,
    dsv: &DsvArgs,
) -> Result<usize> {
    let file_type: ImportFileType = format.parse()?;
    let data = read_import_file(file, config.max_import_file_size)?;
    let options = dsv_options(file_type, dsv)?;

    let (table, _) = parse_file(file_type, &data, options, 0)?;

    println!();
    println!("📄 {} ({}): {} rows", file.display(), file_type, table.len());
    println!("   ─────────────────────────────────────────────────────────────");

    let header: Vec<String> = PREVIEW_COLUMNS
        .iter()
        .map(|(_, title, width)| format!("{:width$}", title, width = width))
        .collect();
    println!("   {}", header.join(" │ "));

    for row in table.rows().iter().take(limit) {
        let cells: Vec<String> = PREVIEW_COLUMNS
            .iter()
            .map(|(column, _, width)| {
                format!("{:width$}", truncate(row.get(*column), *width), width = width)
            })
            .collect();
        println!("   {}", cells.join(" │ "));
    }

    if table.len() > limit {
        println!("   ... {} more", table.len() - limit);
    }

    Ok(table.len())
}
