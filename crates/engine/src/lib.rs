//! Balance ledger and reconciliation engine for shared-expense groups.
//!
//! Expenses and payments are the only source of truth; every balance is
//! derived from them by a deterministic replay and cached per group. All
//! writes go through [`Engine`], which serializes the writers of a group,
//! validates the new fact, and rewrites the group's cache in the same
//! transaction.

pub use commands::{ExpenseCmd, PaymentCmd, UpdateExpenseCmd, UpdatePaymentCmd};
pub use error::EngineError;
pub use expense_shares::Share;
pub use expenses::Expense;
pub use groups::Group;
pub use memberships::{Member, MemberStatus};
pub use money::MoneyCents;
pub use net_balances::NetBalance;
pub use ops::{Engine, EngineBuilder, GroupBalances};
pub use pairwise_balances::PairwiseBalance;
pub use payments::Payment;
pub use splits::{ShareInput, SplitMethod, compute_shares};

mod commands;
mod error;
mod expense_shares;
mod expenses;
mod groups;
mod locks;
mod memberships;
mod money;
mod net_balances;
mod ops;
mod pairwise_balances;
mod payments;
mod reconcile;
mod splits;
mod users;
mod util;

/// The result type of every fallible engine operation.
pub type ResultEngine<T> = Result<T, EngineError>;
