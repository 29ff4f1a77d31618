// src/models/wallet.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use super::text_enum;

text_enum! {
    pub enum TransactionType {
        Credit => "credit",
        Debit => "debit",
    }
}

text_enum! {
    pub enum TransactionStatus {
        Pending => "pending",
        Completed => "completed",
        Failed => "failed",
    }
}

/// Represents the append-only 'wallet_transactions' table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Key of the credit or debit that wrote this entry; unique per user.
    pub operation_id: Uuid,
    pub booking_id: Option<Uuid>,
    /// Always positive; the direction comes from `transaction_type`.
    pub amount: i64,
    #[sqlx(try_from = "String")]
    pub transaction_type: TransactionType,
    pub description: String,
    #[sqlx(try_from = "String")]
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
}

impl WalletTransaction {
    /// Contribution to the balance. Only completed entries count.
    pub fn signed_amount(&self) -> i64 {
        if self.status != TransactionStatus::Completed {
            return 0;
        }
        match self.transaction_type {
            TransactionType::Credit => self.amount,
            TransactionType::Debit => -self.amount,
        }
    }
}

/// Represents the 'user_wallets' table: the cached balance.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct UserWallet {
    pub user_id: Uuid,
    pub balance: i64,
    pub updated_at: DateTime<Utc>,
}

/// DTO for crediting or debiting the caller's wallet.
#[derive(Debug, Deserialize, Validate)]
pub struct WalletAmountRequest {
    pub amount: i64,
    #[validate(length(min = 1, max = 200))]
    pub description: Option<String>,
    pub booking_id: Option<Uuid>,
    /// Resubmitting with the same key returns the first receipt.
    pub idempotency_key: Option<Uuid>,
}

/// Ledger entry produced by the wallet rules, applied together with the
/// balance update.
#[derive(Debug, Clone, PartialEq)]
pub struct NewWalletEntry {
    pub transaction_type: TransactionType,
    pub amount: i64,
    pub description: String,
    pub booking_id: Option<Uuid>,
}

impl NewWalletEntry {
    pub fn signed_amount(&self) -> i64 {
        match self.transaction_type {
            TransactionType::Credit => self.amount,
            TransactionType::Debit => -self.amount,
        }
    }
}

impl WalletTransaction {
    /// Whether this stored entry records the same movement as `request`.
    pub fn records(
        &self,
        transaction_type: TransactionType,
        amount: i64,
        booking_id: Option<Uuid>,
    ) -> bool {
        self.transaction_type == transaction_type
            && self.amount == amount
            && self.booking_id == booking_id
    }
}

/// Result of a credit or debit.
#[derive(Debug, Clone, Serialize)]
pub struct WalletReceipt {
    pub transaction: WalletTransaction,
    pub balance: i64,
}

/// Query parameters for the transaction history.
#[derive(Debug, Deserialize)]
pub struct TransactionListParams {
    pub limit: Option<i64>,
}
