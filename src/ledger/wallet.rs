// src/ledger/wallet.rs

//! Append-only wallet ledger with a cached balance.
//!
//! The cached balance always equals the replay of completed transactions;
//! `reconcile` checks exactly that.

use chrono::Utc;
use uuid::Uuid;

use super::Ledger;
use crate::{
    config::MAX_WALLET_AMOUNT,
    error::AppError,
    models::wallet::{
        NewWalletEntry, TransactionType, UserWallet, WalletReceipt, WalletTransaction,
    },
    utils::retry::with_retry,
};

const DEFAULT_CREDIT_DESCRIPTION: &str = "Wallet top-up";
const DEFAULT_DEBIT_DESCRIPTION: &str = "Wallet payment";

pub fn validate_amount(amount: i64) -> Result<(), AppError> {
    if amount <= 0 || amount > MAX_WALLET_AMOUNT {
        return Err(AppError::InvalidAmount {
            amount,
            max: MAX_WALLET_AMOUNT,
        });
    }
    Ok(())
}

pub fn plan_credit(amount: i64, description: Option<String>) -> Result<NewWalletEntry, AppError> {
    validate_amount(amount)?;

    Ok(NewWalletEntry {
        transaction_type: TransactionType::Credit,
        amount,
        description: description.unwrap_or_else(|| DEFAULT_CREDIT_DESCRIPTION.to_string()),
        booking_id: None,
    })
}

pub fn plan_debit(
    balance: i64,
    amount: i64,
    description: Option<String>,
    booking_id: Option<Uuid>,
) -> Result<NewWalletEntry, AppError> {
    validate_amount(amount)?;
    if amount > balance {
        return Err(AppError::InsufficientFunds {
            balance,
            requested: amount,
        });
    }

    Ok(NewWalletEntry {
        transaction_type: TransactionType::Debit,
        amount,
        description: description.unwrap_or_else(|| DEFAULT_DEBIT_DESCRIPTION.to_string()),
        booking_id,
    })
}

/// Rejects an idempotency key that already wrote a different movement.
fn ensure_same_entry(
    transaction: &WalletTransaction,
    transaction_type: TransactionType,
    amount: i64,
    booking_id: Option<Uuid>,
) -> Result<(), AppError> {
    if !transaction.records(transaction_type, amount, booking_id) {
        tracing::warn!(
            transaction_id = %transaction.id,
            operation_id = %transaction.operation_id,
            "Idempotency key reused for a different wallet entry"
        );
        return Err(AppError::Conflict(
            "This idempotency key was already used for a different wallet entry".to_string(),
        ));
    }
    Ok(())
}

/// Balance implied by the history: completed credits minus completed debits.
pub fn replay(transactions: &[WalletTransaction]) -> Result<i64, AppError> {
    transactions
        .iter()
        .try_fold(0i64, |acc, t| acc.checked_add(t.signed_amount()))
        .ok_or_else(|| AppError::Consistency("wallet history overflows".to_string()))
}

impl Ledger {
    /// Adds `amount` to the wallet. An entry is written once per
    /// `idempotency_key`; without one a key is generated for the retries of
    /// this call.
    pub async fn credit(
        &self,
        user: Uuid,
        amount: i64,
        description: Option<String>,
        idempotency_key: Option<Uuid>,
    ) -> Result<WalletReceipt, AppError> {
        validate_amount(amount)?;

        let operation_id = idempotency_key.unwrap_or_else(Uuid::new_v4);
        let rule = move |_balance: i64| plan_credit(amount, description.clone());
        let store = self.store();
        let (transaction, wallet) = with_retry(&self.retry, "wallet_credit", || {
            store.apply_wallet_entry(user, operation_id, &rule)
        })
        .await?;
        ensure_same_entry(&transaction, TransactionType::Credit, amount, None)?;

        tracing::info!(user_id = %user, amount, balance = wallet.balance, "Wallet credited");
        Ok(WalletReceipt {
            transaction,
            balance: wallet.balance,
        })
    }

    pub async fn debit(
        &self,
        user: Uuid,
        amount: i64,
        description: Option<String>,
        booking_id: Option<Uuid>,
        idempotency_key: Option<Uuid>,
    ) -> Result<WalletReceipt, AppError> {
        validate_amount(amount)?;

        let operation_id = idempotency_key.unwrap_or_else(Uuid::new_v4);
        let rule = move |balance: i64| plan_debit(balance, amount, description.clone(), booking_id);
        let store = self.store();
        let (transaction, wallet) = with_retry(&self.retry, "wallet_debit", || {
            store.apply_wallet_entry(user, operation_id, &rule)
        })
        .await
        .inspect_err(|e| {
            if let AppError::InsufficientFunds { balance, requested } = e {
                tracing::info!(user_id = %user, balance, requested, "Wallet debit refused");
            }
        })?;
        ensure_same_entry(&transaction, TransactionType::Debit, amount, booking_id)?;

        tracing::info!(user_id = %user, amount, balance = wallet.balance, "Wallet debited");
        Ok(WalletReceipt {
            transaction,
            balance: wallet.balance,
        })
    }

    /// Replays the full history and returns the balance if it matches the
    /// cached one.
    pub async fn reconcile(&self, user: Uuid) -> Result<i64, AppError> {
        let snapshot = self
            .query("wallet_snapshot", |store| store.wallet_snapshot(user))
            .await?;

        let replayed = replay(&snapshot.transactions)?;
        let cached = snapshot.wallet.map_or(0, |w| w.balance);

        if cached != replayed {
            tracing::error!(user_id = %user, cached, replayed, "Wallet balance diverges from history");
            return Err(AppError::Consistency(format!(
                "wallet of user {} holds {} but its history sums to {}",
                user, cached, replayed
            )));
        }

        Ok(cached)
    }

    /// The user's wallet; a user who never transacted has a zero balance.
    pub async fn wallet(&self, user: Uuid) -> Result<UserWallet, AppError> {
        let wallet = self.query("wallet", |store| store.wallet(user)).await?;

        Ok(wallet.unwrap_or_else(|| UserWallet {
            user_id: user,
            balance: 0,
            updated_at: Utc::now(),
        }))
    }

    pub async fn transactions(
        &self,
        user: Uuid,
        limit: i64,
    ) -> Result<Vec<WalletTransaction>, AppError> {
        self.query("wallet_transactions", |store| {
            store.wallet_transactions(user, limit)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        ledger::fixtures::{ACK_STALL, impatient_retry},
        models::wallet::TransactionStatus,
        store::{MemoryStore, SlowAckStore, Store},
        utils::retry::RetryPolicy,
    };

    fn ledger() -> Ledger {
        Ledger::new(Arc::new(MemoryStore::new()), RetryPolicy::default())
    }

    fn transaction(kind: TransactionType, amount: i64, status: TransactionStatus) -> WalletTransaction {
        WalletTransaction {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            operation_id: Uuid::new_v4(),
            booking_id: None,
            amount,
            transaction_type: kind,
            description: String::new(),
            status,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_amount_bounds() {
        assert!(validate_amount(1).is_ok());
        assert!(validate_amount(MAX_WALLET_AMOUNT).is_ok());
        assert!(matches!(validate_amount(0), Err(AppError::InvalidAmount { .. })));
        assert!(matches!(validate_amount(-5), Err(AppError::InvalidAmount { .. })));
        assert!(matches!(
            validate_amount(MAX_WALLET_AMOUNT + 1),
            Err(AppError::InvalidAmount { .. })
        ));
    }

    #[test]
    fn test_replay_counts_completed_only() {
        let history = vec![
            transaction(TransactionType::Credit, 100, TransactionStatus::Completed),
            transaction(TransactionType::Debit, 30, TransactionStatus::Completed),
            transaction(TransactionType::Credit, 500, TransactionStatus::Failed),
            transaction(TransactionType::Debit, 10, TransactionStatus::Pending),
        ];

        assert_eq!(replay(&history).unwrap(), 70);
        assert_eq!(replay(&[]).unwrap(), 0);
    }

    #[test]
    fn test_debit_plan_checks_balance() {
        let err = plan_debit(150, 200, None, None).unwrap_err();
        assert!(matches!(
            err,
            AppError::InsufficientFunds {
                balance: 150,
                requested: 200
            }
        ));

        let entry = plan_debit(150, 150, None, None).unwrap();
        assert_eq!(entry.signed_amount(), -150);
        assert_eq!(entry.description, DEFAULT_DEBIT_DESCRIPTION);
    }

    #[tokio::test]
    async fn test_credit_then_reconcile() {
        let ledger = ledger();
        let user = Uuid::new_v4();

        ledger.credit(user, 100, None, None).await.unwrap();
        let receipt = ledger.credit(user, 50, Some("Pocket money".into()), None).await.unwrap();
        assert_eq!(receipt.balance, 150);
        assert_eq!(receipt.transaction.description, "Pocket money");

        assert_eq!(ledger.reconcile(user).await.unwrap(), 150);
    }

    #[tokio::test]
    async fn test_overdraw_leaves_balance_untouched() {
        let ledger = ledger();
        let user = Uuid::new_v4();

        ledger.credit(user, 100, None, None).await.unwrap();
        ledger.credit(user, 50, None, None).await.unwrap();

        let err = ledger.debit(user, 200, None, None, None).await.unwrap_err();
        assert!(matches!(err, AppError::InsufficientFunds { balance: 150, .. }));

        assert_eq!(ledger.wallet(user).await.unwrap().balance, 150);
        assert_eq!(ledger.transactions(user, 20).await.unwrap().len(), 2);
        assert_eq!(ledger.reconcile(user).await.unwrap(), 150);
    }

    #[tokio::test]
    async fn test_unknown_user_has_empty_wallet() {
        let ledger = ledger();
        let user = Uuid::new_v4();

        assert_eq!(ledger.wallet(user).await.unwrap().balance, 0);
        assert_eq!(ledger.reconcile(user).await.unwrap(), 0);
        assert!(ledger.transactions(user, 20).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_reports_divergent_balance() {
        let store = Arc::new(MemoryStore::new());
        let ledger = Ledger::new(store.clone(), RetryPolicy::default());
        let user = Uuid::new_v4();

        ledger.credit(user, 100, None, None).await.unwrap();
        store.set_cached_balance(user, 250).unwrap();

        let err = ledger.reconcile(user).await.unwrap_err();
        assert!(matches!(err, AppError::Consistency(_)));
        assert_eq!(err.kind(), "consistency_error");

        // A cached balance with no history at all diverges too.
        let stranger = Uuid::new_v4();
        store.set_cached_balance(stranger, 40).unwrap();
        assert!(matches!(
            ledger.reconcile(stranger).await.unwrap_err(),
            AppError::Consistency(_)
        ));
    }

    #[tokio::test]
    async fn test_credit_is_applied_once_when_reply_is_lost() {
        let store = Arc::new(SlowAckStore::new(ACK_STALL));
        let ledger = Ledger::new(store.clone(), impatient_retry());
        let user = Uuid::new_v4();

        store.stall_next_write();
        let receipt = ledger.credit(user, 100, None, None).await.unwrap();
        assert_eq!(receipt.balance, 100);

        store.stall_next_write();
        let receipt = ledger.debit(user, 30, None, None, None).await.unwrap();
        assert_eq!(receipt.balance, 70);

        assert_eq!(store.wallet(user).await.unwrap().unwrap().balance, 70);
        assert_eq!(ledger.transactions(user, 20).await.unwrap().len(), 2);
        assert_eq!(ledger.reconcile(user).await.unwrap(), 70);
    }

    #[tokio::test]
    async fn test_idempotency_key_replays_and_rejects_reuse() {
        let ledger = ledger();
        let user = Uuid::new_v4();
        let key = Some(Uuid::new_v4());

        let first = ledger.credit(user, 100, None, key).await.unwrap();
        let again = ledger.credit(user, 100, None, key).await.unwrap();
        assert_eq!(first.transaction.id, again.transaction.id);
        assert_eq!(again.balance, 100);

        let err = ledger.credit(user, 60, None, key).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        let err = ledger.debit(user, 100, None, None, key).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        assert_eq!(ledger.wallet(user).await.unwrap().balance, 100);
        assert_eq!(ledger.transactions(user, 20).await.unwrap().len(), 1);
    }
}
