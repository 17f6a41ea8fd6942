//! Transfer-pair matching
//!
//! Source files record a transfer as two unlinked one-sided rows. The matcher
//! pairs them back into one row: the negative leg is the source, the positive
//! leg the destination.

use tracing::debug;

use super::table::{Column, NormalizedRow, NormalizedTable};

const DESCRIPTION_JOINER: &str = " → ";

// `YYYY-MM-DD`
const DATE_LEN: usize = 10;

/// One adapted row, before pairing
#[derive(Debug, Clone)]
pub struct ParsedLeg {
    pub row: NormalizedRow,
    /// Sign of the amount in the source file
    pub is_negative: bool,
    /// Whether this row is one side of a transfer
    pub is_transfer: bool,
    /// Category name used as the pairing key
    pub category: String,
}

impl ParsedLeg {
    /// Calendar date part of the transaction time
    fn date(&self) -> &str {
        let time = self.row.get(Column::TransactionTime);
        time.get(..DATE_LEN).unwrap_or(time)
    }

    fn pairs_with(&self, other: &ParsedLeg) -> bool {
        self.is_negative != other.is_negative
            && self.category == other.category
            && self.date() == other.date()
    }
}

/// Pair transfer legs and assemble the normalized table
///
/// Pairing is greedy: each unmatched leg takes the first later unmatched leg
/// with the same date and category and the opposite sign. Amounts are not compared.
pub fn match_transfers(legs: Vec<ParsedLeg>) -> NormalizedTable {
    let (transfer_legs, others): (Vec<ParsedLeg>, Vec<ParsedLeg>) =
        legs.into_iter().partition(|leg| leg.is_transfer);

    let mut consumed = vec![false; transfer_legs.len()];
    let mut transfers = Vec::new();
    let mut unmatched = 0usize;

    for i in 0..transfer_legs.len() {
        if consumed[i] {
            continue;
        }
        consumed[i] = true;

        let partner = (i + 1..transfer_legs.len())
            .find(|&j| !consumed[j] && transfer_legs[i].pairs_with(&transfer_legs[j]));

        match partner {
            Some(j) => {
                consumed[j] = true;
                let (source, destination) = if transfer_legs[i].is_negative {
                    (&transfer_legs[i], &transfer_legs[j])
                } else {
                    (&transfer_legs[j], &transfer_legs[i])
                };
                transfers.push(merge(source, destination));
            }
            None => {
                unmatched += 1;
                let mut row = transfer_legs[i].row.clone();
                row.clear(Column::RelatedAccountName);
                row.clear(Column::RelatedAccountCurrency);
                transfers.push(row);
            }
        }
    }

    debug!(
        "Matched {} transfer rows ({} unmatched legs), {} other rows",
        transfers.len(),
        unmatched,
        others.len()
    );

    NormalizedTable::assemble(transfers, others.into_iter().map(|leg| leg.row).collect())
}

/// Build the merged transfer row from its two legs
fn merge(source: &ParsedLeg, destination: &ParsedLeg) -> NormalizedRow {
    let mut row = source.row.clone();
    let dest = &destination.row;

    row.set(Column::RelatedAccountName, dest.get(Column::AccountName));
    row.set(Column::RelatedAccountCurrency, dest.get(Column::AccountCurrency));
    row.set(Column::RelatedAmount, dest.get(Column::Amount));
    row.set(
        Column::Description,
        join_descriptions(source.row.get(Column::Description), dest.get(Column::Description)),
    );

    row
}

fn join_descriptions(source: &str, destination: &str) -> String {
    match (source.is_empty(), destination.is_empty()) {
        (false, false) if source != destination => {
            format!("{}{}{}", source, DESCRIPTION_JOINER, destination)
        }
        (true, false) => destination.to_string(),
        _ => source.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leg(date: &str, account: &str, amount: &str, negative: bool, category: &str) -> ParsedLeg {
        let mut row = NormalizedRow::new();
        row.set(Column::TransactionTime, format!("{} 00:00:00", date));
        row.set(Column::TransactionType, "Перевод");
        row.set(Column::Category, category);
        row.set(Column::AccountName, account);
        row.set(Column::AccountCurrency, "RUB");
        row.set(Column::Amount, amount);
        row.set(Column::RelatedAccountName, category);
        ParsedLeg {
            row,
            is_negative: negative,
            is_transfer: true,
            category: category.to_string(),
        }
    }

    fn expense(date: &str) -> ParsedLeg {
        let mut row = NormalizedRow::new();
        row.set(Column::TransactionTime, format!("{} 00:00:00", date));
        row.set(Column::TransactionType, "Расход");
        row.set(Column::AccountName, "Card");
        row.set(Column::Amount, "5");
        ParsedLeg {
            row,
            is_negative: true,
            is_transfer: false,
            category: "Food".into(),
        }
    }

    #[test]
    fn test_pairs_negative_leg_as_source_in_either_order() {
        for reversed in [false, true] {
            let out = leg("2026-02-09", "Wallet", "14000", true, "Перевод между счетами");
            let inc = leg("2026-02-09", "Card", "3000", false, "Перевод между счетами");
            let legs = if reversed { vec![inc, out] } else { vec![out, inc] };

            let table = match_transfers(legs);
            assert_eq!(table.len(), 1);

            let row = &table.rows()[0];
            assert_eq!(row.get(Column::AccountName), "Wallet");
            assert_eq!(row.get(Column::Amount), "14000");
            assert_eq!(row.get(Column::RelatedAccountName), "Card");
            assert_eq!(row.get(Column::RelatedAmount), "3000");
        }
    }

    #[test]
    fn test_unmatched_leg_clears_related_account() {
        let table = match_transfers(vec![
            leg("2026-02-09", "Wallet", "100", true, "Конвертация валют"),
            leg("2026-02-10", "Card", "100", false, "Конвертация валют"),
        ]);

        assert_eq!(table.len(), 2);
        for row in table.rows() {
            assert_eq!(row.get(Column::RelatedAccountName), "");
        }
    }

    #[test]
    fn test_legs_pair_by_date_not_clock_time() {
        let mut out = leg("2026-02-09", "Wallet", "50", true, "T");
        out.row.set(Column::TransactionTime, "2026-02-09 09:15:00");
        let mut inc = leg("2026-02-09", "Card", "50", false, "T");
        inc.row.set(Column::TransactionTime, "2026-02-09 18:40:00");

        let table = match_transfers(vec![out, inc]);
        assert_eq!(table.len(), 1);

        let row = &table.rows()[0];
        assert_eq!(row.get(Column::TransactionTime), "2026-02-09 09:15:00");
        assert_eq!(row.get(Column::RelatedAccountName), "Card");
    }

    #[test]
    fn test_same_sign_and_other_category_do_not_pair() {
        let table = match_transfers(vec![
            leg("2026-02-09", "A", "1", true, "Конвертация валют"),
            leg("2026-02-09", "B", "1", true, "Конвертация валют"),
            leg("2026-02-09", "C", "1", false, "Перевод между счетами"),
        ]);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_greedy_first_forward_match() {
        let table = match_transfers(vec![
            leg("2026-02-09", "A", "10", true, "T"),
            leg("2026-02-09", "B", "20", false, "T"),
            leg("2026-02-09", "C", "30", false, "T"),
        ]);

        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[0].get(Column::AccountName), "A");
        assert_eq!(table.rows()[0].get(Column::RelatedAccountName), "B");
        assert_eq!(table.rows()[1].get(Column::AccountName), "C");
        assert_eq!(table.rows()[1].get(Column::RelatedAccountName), "");
    }

    #[test]
    fn test_transfers_come_before_other_rows() {
        let table = match_transfers(vec![
            expense("2026-02-01"),
            leg("2026-02-09", "A", "10", true, "T"),
            leg("2026-02-09", "B", "10", false, "T"),
        ]);

        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[0].get(Column::TransactionType), "Перевод");
        assert_eq!(table.rows()[1].get(Column::TransactionType), "Расход");
    }

    #[test]
    fn test_description_join() {
        assert_eq!(join_descriptions("out", "in"), "out → in");
        assert_eq!(join_descriptions("same", "same"), "same");
        assert_eq!(join_descriptions("", "in"), "in");
        assert_eq!(join_descriptions("out", ""), "out");
        assert_eq!(join_descriptions("", ""), "");
    }
}
