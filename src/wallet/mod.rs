//! Wallet records, persistence and address issuance

pub mod guard;
pub mod record;
pub mod session;
pub mod store;

pub use guard::{issuance_lock_key, GuardError, IssuanceGuard};
pub use record::{
    create_wallet, import_wallet, wallet_id, AddressCounters, CreatedWallet, IssuedAddress,
    RecordError, WalletRecord, WalletSecrets, WalletState, DEFAULT_ACCOUNT,
};
pub use session::{SessionError, WalletSession};
pub use store::{FileWalletStore, MemoryWalletStore, StoreError, WalletStore};
