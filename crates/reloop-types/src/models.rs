use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Returned when a stored or submitted string is not one of an enum's choices.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("\"{0}\" is not a valid choice.")]
pub struct InvalidChoice(pub String);

/// Closed string enums shared by the database rows and the wire format.
macro_rules! choice_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = InvalidChoice;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(InvalidChoice(other.to_string())),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

choice_enum!(
    /// Kind of waste a listing offers.
    Category {
        Chemical => "chemical",
        Paper => "paper",
        Metal => "metal",
    }
);

choice_enum!(
    Unit {
        Litre => "litre",
        Kilogram => "kilogram",
    }
);

choice_enum!(
    /// Listings start `inactive` until the owner lists them.
    ProductStatus {
        Inactive => "inactive",
        Listed => "listed",
    }
);

choice_enum!(
    OrderStatus {
        Pending => "pending",
        Cancelled => "cancelled",
        Delivered => "delivered",
    }
);

choice_enum!(
    TokenType {
        Access => "access",
        Refresh => "refresh",
    }
);

impl Default for ProductStatus {
    fn default() -> Self {
        ProductStatus::Inactive
    }
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::Pending
    }
}
