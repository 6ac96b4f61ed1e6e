//! # caja-db: Storage Layer for Caja POS
//!
//! This crate provides database access for the settlement & ledger core.
//! It uses SQLite for local storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Caja POS Data Flow                               │
//! │                                                                         │
//! │  Calling layer (register UI, reports)                                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐    │
//! │  │                     caja-db (THIS CRATE)                        │    │
//! │  │                                                                 │    │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐   │    │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │   │    │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │   │    │
//! │  │   │               │    │ ProductRepo   │    │              │   │    │
//! │  │   │ SqlitePool    │◄───│ StockLedger   │    │ 001_init.sql │   │    │
//! │  │   │ Connection    │    │ DebtLedger    │    │ ...          │   │    │
//! │  │   │ Management    │    │ SaleRepo      │    │              │   │    │
//! │  │   │               │    │ ClosingRepo   │    │              │   │    │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘   │    │
//! │  │                                                                 │    │
//! │  │   All math delegated to caja-core (pure, no I/O)                │    │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐    │
//! │  │                     SQLite Database (WAL)                       │    │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repositories (product, stock, debt, sale, closing)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use caja_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/caja.db")).await?;
//!
//! let outcome = db.sales().checkout(&request, &config).await?;
//! let summary = db.closing().summary(from, to, &config).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::closing::{ClosingRepository, ClosingSummary};
pub use repository::debt::{DebtLedger, PaymentRequest};
pub use repository::product::ProductRepository;
pub use repository::sale::{CheckoutOutcome, CheckoutRequest, SaleRepository};
pub use repository::stock::{MovementRequest, StockLedger};
