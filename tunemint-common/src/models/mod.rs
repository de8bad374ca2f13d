//! Record types persisted in the JSON store
//!
//! Each submodule groups the records of one area of the service. Types that
//! hold a whole table (ledgers, graphs, logs) carry the small amount of logic
//! that keeps the table consistent, so handlers only orchestrate.

pub mod credits;
pub mod generation;
pub mod market;
pub mod social;

pub use credits::{CreditAccount, CreditLedger, LedgerKind};
pub use generation::{GeneratedTrack, GenerationJob, JobStatus, Payer, RefundOutcome};
pub use market::{Currency, Listing, PaymentRecord, SharedTrack, WhitelistEntry};
pub use social::{
    ChatLog, ChatMessage, FollowEdges, FollowGraph, LikeBook, Profile, ProfileStats, TradeOffer,
    UserAccount, UserDirectory,
};
