//! Delivery agents: their profiles and their company-cash wallets.

pub mod profile;
pub mod wallet;

pub use profile::{AgentProfile, AgentProfileCommand, AgentProfileEvent, AgentStatus, ProfileId};
pub use wallet::{
    AgentWallet, TransactionKind, WalletCommand, WalletEvent, WalletId, WalletStatus,
    WalletTransaction,
};
