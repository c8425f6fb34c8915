//! Bearer credentials: signing, hashed persistence, validation, rotation and revocation.

pub mod jwt;
mod memory;
pub mod models;
mod repo;
mod store;

pub use jwt::{CredentialPair, JwtConfig, TokenError, TokenIssuer, TokenKind};
pub use memory::MemoryTokenRepository;
pub use models::{ClientInfo, Owner, OwnerKind, TokenRecord};
pub use repo::{PgTokenRepository, TokenRepository};
pub use store::TokenStore;
