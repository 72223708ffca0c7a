//! Gem Ledger
//!
//! Append-only, idempotent transaction log with a derived running balance
//! per account.
//!
//! ## Guarantees
//!
//! - Exactly-once effect per idempotency key: replaying a key returns the
//!   originally committed entry, the balance moves once.
//! - `balance_after = balance_before + amount` for every entry, and the
//!   account's balance equals the `balance_after` of its newest entry.
//! - Entries are never mutated or deleted; reversals are new compensating
//!   entries, preserving the audit trail.
//! - Balances never go negative; overdrafts fail with
//!   `InsufficientBalance`.
//!
//! ## Serialization
//!
//! Each account's balance head is the narrowest serialization point: a
//! per-account async lock bounds in-process contention, and the head
//! write itself is a compare-and-set so a concurrent external writer
//! shows up as a conflict rather than a lost update. Conflicts are
//! retried with backoff a bounded number of times.

mod gems;
mod transaction;

pub use gems::{GemLedger, LedgerReceipt, Posting};
pub use transaction::{effective_amount, GemTransaction, TxKind};
