//! Identity resolution for unified login: principals, credentials, the pluggable store
//! interface and the ordered failover chain over configured stores.

mod principal;
mod credential;
mod store;
mod chain;

pub use principal::{Principal, Attrs, SsoUser, SsoRole, UserKey};
pub use credential::{Credential, CredentialProvider, BasicAuthScheme, NtlmAuthScheme};
pub use store::{CredentialStore, StoreError, StoreResult, MemoryIdentityStore, UserRecord, hash_password, verify_password};
pub use chain::CredentialChain;
