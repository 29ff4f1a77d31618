// src/ledger/mod.rs

//! Domain rules for seats, bookings, ratings and wallets.
//!
//! Each submodule keeps its rules as plain functions over loaded state and
//! adds async operations on [`Ledger`] that run those rules inside the
//! store's atomic section, with the store retry policy applied.

use std::future::Future;
use std::sync::Arc;

use crate::{
    error::AppError,
    store::Store,
    utils::retry::{RetryPolicy, with_retry},
};

pub mod availability;
pub mod bookings;
pub mod ratings;
pub mod wallet;

#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn Store>,
    retry: RetryPolicy,
}

impl Ledger {
    pub fn new(store: Arc<dyn Store>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// Runs a read against the store under the retry policy.
    ///
    /// ```ignore
    /// let ride = ledger.query("ride", |store| store.ride(id)).await?;
    /// ```
    pub async fn query<'s, T, F, Fut>(&'s self, op: &'static str, mut f: F) -> Result<T, AppError>
    where
        F: FnMut(&'s dyn Store) -> Fut,
        Fut: Future<Output = Result<T, AppError>> + 's,
    {
        let store = self.store.as_ref();
        with_retry(&self.retry, op, || f(store)).await
    }
}
