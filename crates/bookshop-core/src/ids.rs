//! Identifier newtypes
//!
//! Row identifiers are sequential integers assigned by the repository.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse().map(Self)
            }
        }
    };
}

id_type!(
    /// Catalog item identifier
    ItemId
);
id_type!(
    /// User identifier
    UserId
);
id_type!(
    /// Payment record identifier, doubling as the provider correlation token
    PaymentId
);
id_type!(
    /// Contact form message identifier
    MessageId
);
id_type!(SubscriberId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_id_parses_correlation_token() {
        let id: PaymentId = "99".parse().unwrap();
        assert_eq!(id, PaymentId::new(99));
        assert_eq!(id.to_string(), "99");
        assert!("pay_99".parse::<PaymentId>().is_err());
    }

    #[test]
    fn test_ids_serialize_as_numbers() {
        let json = serde_json::to_string(&ItemId::new(3)).unwrap();
        assert_eq!(json, "3");
        let back: ItemId = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get(), 3);
    }
}
