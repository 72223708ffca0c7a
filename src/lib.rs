//! Lazuli Engagement Engine
//!
//! Engagement-integrity and reward-ledger engine: rate-limited vote
//! intake with fraud heuristics, an idempotent append-only gem ledger,
//! and deterministic ranking scores.
//!
//! ## Module Structure
//!
//! ```text
//! lazuli/src/
//! ├── lib.rs         - Crate root with re-exports
//! ├── main.rs        - Server entrypoint
//! ├── config.rs      - Env-driven configuration
//! ├── error.rs       - Error taxonomy (engine + store)
//! ├── store/         - Backing key-value store abstraction
//! │   └── memory.rs  - In-process DashMap implementation
//! ├── limiter/       - Rate limiting
//! │   ├── sliding.rs - Rolling-window limiter (atomic slide op)
//! │   └── daily.rs   - Fixed UTC-midnight daily quotas
//! ├── fraud.rs       - Stateless fraud scoring heuristic
//! ├── accounts.rs    - Account status directory with TTL cache
//! ├── ledger/        - Gem ledger
//! │   ├── transaction.rs - Transaction record & kinds
//! │   └── gems.rs    - Idempotent append-only posting engine
//! ├── scoring.rs     - Trending / Wilson hot ranking scores
//! ├── vote/          - Vote intake orchestration
//! │   ├── record.rs  - Vote record & derived ledger keys
//! │   └── engine.rs  - Cast / undo / quota state machine
//! └── api/           - HTTP API endpoints
//!     ├── votes.rs   - Vote, target, and gem endpoints
//!     └── middleware.rs - Security headers & request logging
//! ```

pub mod accounts;
pub mod api;
pub mod config;
pub mod error;
pub mod fraud;
pub mod ledger;
pub mod limiter;
pub mod scoring;
pub mod store;
pub mod vote;

// Re-export main types for convenience
pub use accounts::{AccountDirectory, AccountStatus};
pub use config::EngineConfig;
pub use error::{EngineError, StoreError};
pub use fraud::{FraudPolicy, FraudSignals, Verdict};
pub use ledger::{GemLedger, GemTransaction, LedgerReceipt, Posting, TxKind};
pub use limiter::{DailyQuota, LimiterDecision, QuotaStatus, SlidingWindowLimiter};
pub use scoring::ScoreEngine;
pub use store::{MemoryStore, Store};
pub use vote::{CastOutcome, CastRequest, UndoOutcome, Vote, VoteLedger};
