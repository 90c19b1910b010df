use crate::domain::money::Balance;
use crate::domain::wallet::Wallet;
use crate::error::{ReconError, Result};
use serde::Deserialize;
use std::io::Read;
use uuid::Uuid;

/// One row of a wallet seed file: `id,owner_id,account_number,currency,is_active`.
///
/// Only `owner_id` and `account_number` are required. Seeded wallets always start
/// at a zero balance so they agree with their (empty) ledger.
#[derive(Debug, Deserialize)]
struct WalletRow {
    id: Option<Uuid>,
    owner_id: String,
    account_number: String,
    currency: Option<String>,
    is_active: Option<bool>,
}

impl TryFrom<WalletRow> for Wallet {
    type Error = ReconError;

    fn try_from(row: WalletRow) -> Result<Self> {
        if row.owner_id.is_empty() || row.account_number.is_empty() {
            return Err(ReconError::Validation(
                "wallet row needs owner_id and account_number".to_string(),
            ));
        }
        let mut wallet = Wallet::new(row.owner_id, row.account_number);
        if let Some(id) = row.id {
            wallet.id = id;
        }
        if let Some(currency) = row.currency.filter(|c| !c.is_empty()) {
            wallet.currency = currency.to_ascii_uppercase();
        }
        wallet.is_active = row.is_active.unwrap_or(true);
        wallet.balance = Balance::ZERO;
        Ok(wallet)
    }
}

/// Reads wallets from a CSV source, trimming whitespace and tolerating short rows.
pub struct WalletReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> WalletReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily yields one result per row; a bad row does not stop the stream.
    pub fn wallets(self) -> impl Iterator<Item = Result<Wallet>> {
        self.reader
            .into_deserialize::<WalletRow>()
            .map(|row| row.map_err(ReconError::from).and_then(Wallet::try_from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_valid_stream() {
        let data = "id, owner_id, account_number, currency, is_active\n\
                    6f1c2a56-1d38-4d8c-9a0e-3b1f6a1f7c11, user-1, 0123456789, ngn, true\n\
                    , user-2, 9876543210, , false";
        let wallets: Vec<Result<Wallet>> = WalletReader::new(data.as_bytes()).wallets().collect();

        assert_eq!(wallets.len(), 2);
        let first = wallets[0].as_ref().unwrap();
        assert_eq!(
            first.id.to_string(),
            "6f1c2a56-1d38-4d8c-9a0e-3b1f6a1f7c11"
        );
        assert_eq!(first.currency, "NGN");
        assert!(first.is_active);

        let second = wallets[1].as_ref().unwrap();
        assert_eq!(second.account_number, "9876543210");
        assert_eq!(second.currency, "NGN");
        assert!(!second.is_active);
        assert_eq!(second.balance, Balance::ZERO);
    }

    #[test]
    fn test_reader_malformed_line() {
        let data = "id, owner_id, account_number, currency, is_active\n\
                    not-a-uuid, user-1, 0123456789, NGN, true\n\
                    , , 0123456789, NGN, true\n\
                    , user-3, 5555555555, NGN, true";
        let wallets: Vec<Result<Wallet>> = WalletReader::new(data.as_bytes()).wallets().collect();

        assert!(matches!(wallets[0], Err(ReconError::CsvError(_))));
        assert!(matches!(wallets[1], Err(ReconError::Validation(_))));
        assert!(wallets[2].is_ok());
    }
}
