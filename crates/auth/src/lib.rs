//! `keygate-auth` — credential verification, token issuance and the authorization gate.
//!
//! This crate is decoupled from HTTP and storage: persistence is reached only through
//! the traits in [`store`].

pub mod authorize;
pub mod claims;
pub mod directory;
pub mod identity;
pub mod password;
pub mod principal;
pub mod refresh;
pub mod roles;
pub mod session;
pub mod store;
pub mod token;

pub use authorize::{AuthzError, RoleRequirement, authorize};
pub use claims::{AccessClaims, TokenValidationError, validate_claims};
pub use directory::{Change, CreateIdentity, DirectoryService, MIN_PASSWORD_LEN};
pub use identity::{Identity, IdentityUpdate, Membership, NewIdentity, NewRole, PublicIdentity, RoleRecord};
pub use password::{Argon2Hasher, HasherSettings, PasswordError, PasswordHasher};
pub use principal::IdentityContext;
pub use refresh::{RefreshToken, StoredRefreshToken};
pub use roles::Role;
pub use session::{AuthError, SessionCredentialPair, SessionService};
pub use store::{CredentialStore, DirectoryStore, RefreshTokenStore, StoreError};
pub use token::{
    AccessTokenValidator, Hs256TokenValidator, IssuedAccessToken, TokenError, TokenIssuer, TokenSettings,
};
