use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// A hex-encoded account address on an external network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    /// Create an address from a `0x`-prefixed hex string.
    pub fn new(value: impl Into<String>) -> Result<Self, CoreError> {
        let value = value.into();
        let hex_part = value
            .strip_prefix("0x")
            .ok_or_else(|| CoreError::InvalidAddress(value.clone()))?;
        if hex_part.is_empty() || hex::decode(hex_part).is_err() {
            return Err(CoreError::InvalidAddress(value));
        }
        Ok(Self(value.to_lowercase()))
    }

    /// Generate a random 20-byte address.
    pub fn random() -> Self {
        let bytes: [u8; 20] = rand::random();
        Self(format!("0x{}", hex::encode(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a token lives on its chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenAddress {
    /// The chain's native asset (no contract).
    Native,
    /// An asset issued by a contract at the given address.
    Contract(Address),
}

/// An asset accepted by the hub. Identified by `(chain_id, address)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token {
    /// Chain the token lives on.
    pub chain_id: u64,
    /// Native asset or contract address.
    pub address: TokenAddress,
    /// Ticker symbol, informational only.
    pub symbol: String,
    /// Number of decimal places in the display unit.
    pub decimals: u8,
}

impl Token {
    /// Create a native-asset token.
    pub fn native(chain_id: u64, symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            chain_id,
            address: TokenAddress::Native,
            symbol: symbol.into(),
            decimals,
        }
    }

    /// Create a contract-issued token.
    pub fn contract(
        chain_id: u64,
        address: Address,
        symbol: impl Into<String>,
        decimals: u8,
    ) -> Self {
        Self {
            chain_id,
            address: TokenAddress::Contract(address),
            symbol: symbol.into(),
            decimals,
        }
    }

    /// Whether this is the chain's native asset.
    pub fn is_native(&self) -> bool {
        matches!(self.address, TokenAddress::Native)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (chain {})", self.symbol, self.chain_id)
    }
}

/// Value in the token's smallest unit (wei-like), represented as u128.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAmount {
    /// The token being counted.
    pub token: Token,
    /// Value in atomic units.
    pub value: u128,
}

impl TokenAmount {
    /// Create a new amount.
    pub fn new(token: Token, value: u128) -> Self {
        Self { token, value }
    }

    /// Check if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.value == 0
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.token.symbol)
    }
}

/// The payment networks the hub settles over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetworkKind {
    /// Book transfers between hub users, no external movement.
    Internal,
    /// On-chain transfers observed and submitted via a node provider.
    Blockchain,
    /// Off-chain payment channels (Raiden-style).
    Channel,
}

impl fmt::Display for NetworkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal => write!(f, "internal"),
            Self::Blockchain => write!(f, "blockchain"),
            Self::Channel => write!(f, "channel"),
        }
    }
}

/// Identifies a hub user. Created when the user registers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub uuid::Uuid);

        impl $name {
            /// Generate a new time-ordered identifier.
            pub fn new() -> Self {
                Self(uuid::Uuid::now_v7())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Identifies a deposit request.
    DepositId
);
uuid_id!(
    /// Identifies an inbound payment record.
    PaymentId
);
uuid_id!(
    /// Identifies an outbound transfer.
    TransferId
);
uuid_id!(
    /// Identifies a merchant store.
    StoreId
);

/// Identifies a payment route. Random in `[2^48, 2^53)` so hub-issued
/// identifiers never collide with counter-based ones and stay within the
/// range downstream JSON consumers can represent exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouteId(pub u64);

impl RouteId {
    const MIN: u64 = 1 << 48;
    const MAX: u64 = 1 << 53;

    /// Generate a random route identifier.
    pub fn random() -> Self {
        use rand::Rng;
        Self(rand::thread_rng().gen_range(Self::MIN..Self::MAX))
    }
}

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A merchant store that can issue checkouts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Store {
    /// Store identifier.
    pub id: StoreId,
    /// Display name.
    pub name: String,
    /// Owner of the store.
    pub owner: UserId,
    /// URL notified when a checkout changes state, if configured.
    pub checkout_webhook_url: Option<String>,
}
