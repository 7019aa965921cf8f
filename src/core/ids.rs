use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a fresh random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
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

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

uuid_id!(
    /// Identifier of a funding pool.
    PoolId
);

uuid_id!(
    /// Identifier of the invoice a pool finances (1:1 with a pool).
    InvoiceId
);

uuid_id!(
    /// Identifier of a single investment commitment.
    InvestmentId
);

uuid_id!(
    /// Identifier of a platform account: an investor or an exporter.
    AccountId
);

/// A pool addressed either directly or through the invoice it finances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolRef {
    Pool(PoolId),
    Invoice(InvoiceId),
}

impl From<PoolId> for PoolRef {
    fn from(id: PoolId) -> Self {
        PoolRef::Pool(id)
    }
}

impl From<InvoiceId> for PoolRef {
    fn from(id: InvoiceId) -> Self {
        PoolRef::Invoice(id)
    }
}

impl fmt::Display for PoolRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolRef::Pool(id) => write!(f, "pool {id}"),
            PoolRef::Invoice(id) => write!(f, "invoice {id}"),
        }
    }
}
