use std::str::FromStr;

use reloop_db::models::OrderRow;
use reloop_types::models::InvalidChoice;

/// Which side of an order may perform an operation on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderParty {
    Seller,
    Buyer,
    Either,
}

impl OrderParty {
    pub fn permits(&self, order: &OrderRow, caller: i64) -> bool {
        match self {
            OrderParty::Seller => order.seller_id == caller,
            OrderParty::Buyer => order.user_id == caller,
            OrderParty::Either => order.seller_id == caller || order.user_id == caller,
        }
    }
}

impl FromStr for OrderParty {
    type Err = InvalidChoice;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "seller" => Ok(OrderParty::Seller),
            "buyer" => Ok(OrderParty::Buyer),
            "either" => Ok(OrderParty::Either),
            other => Err(InvalidChoice(other.to_string())),
        }
    }
}

/// Who may update or delete a user record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserMutation {
    /// Any authenticated caller.
    Any,
    /// Only the user themselves.
    SelfOnly,
}

impl UserMutation {
    pub fn permits(&self, target: i64, caller: i64) -> bool {
        match self {
            UserMutation::Any => true,
            UserMutation::SelfOnly => target == caller,
        }
    }
}

impl FromStr for UserMutation {
    type Err = InvalidChoice;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "any" => Ok(UserMutation::Any),
            "self" => Ok(UserMutation::SelfOnly),
            other => Err(InvalidChoice(other.to_string())),
        }
    }
}

/// Ownership rules for mutating endpoints. The defaults reproduce the
/// long-standing behaviour: sellers update orders, buyers delete them, and
/// user records are editable by any authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthorizationPolicy {
    pub order_update: OrderParty,
    pub order_delete: OrderParty,
    pub user_mutation: UserMutation,
}

impl Default for AuthorizationPolicy {
    fn default() -> Self {
        Self {
            order_update: OrderParty::Seller,
            order_delete: OrderParty::Buyer,
            user_mutation: UserMutation::Any,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use reloop_types::models::OrderStatus;

    fn order(buyer: i64, seller: i64) -> OrderRow {
        OrderRow {
            id: 1,
            user_id: buyer,
            seller_id: seller,
            product_id: 1,
            quantity: 1,
            total_amount: 5.0,
            tax: 0.0,
            status: OrderStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn order_parties() {
        let o = order(2, 1);
        assert!(OrderParty::Seller.permits(&o, 1));
        assert!(!OrderParty::Seller.permits(&o, 2));
        assert!(OrderParty::Buyer.permits(&o, 2));
        assert!(!OrderParty::Buyer.permits(&o, 1));
        assert!(OrderParty::Either.permits(&o, 1));
        assert!(OrderParty::Either.permits(&o, 2));
        assert!(!OrderParty::Either.permits(&o, 3));
    }

    #[test]
    fn default_policy_keeps_asymmetry() {
        let policy = AuthorizationPolicy::default();
        let o = order(2, 1);
        assert!(policy.order_update.permits(&o, 1));
        assert!(policy.order_delete.permits(&o, 2));
        assert!(policy.user_mutation.permits(5, 9));
        assert!(!UserMutation::SelfOnly.permits(5, 9));
    }

    #[test]
    fn parses_config_values() {
        assert_eq!("either".parse::<OrderParty>().unwrap(), OrderParty::Either);
        assert_eq!("self".parse::<UserMutation>().unwrap(), UserMutation::SelfOnly);
        assert!("admin".parse::<UserMutation>().is_err());
    }
}
