mod blacklist;
mod conversations;
mod messages;
mod orders;
mod products;
mod users;

use std::str::FromStr;

use rusqlite::Row;
use rusqlite::types::Type;

/// Read a TEXT column holding one of a closed set of choices.
fn choice<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// `?1, ?2, ...` for an `IN (...)` list.
fn placeholders(count: usize) -> String {
    (1..=count).map(|i| format!("?{}", i)).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
pub(crate) mod testutil {
    use chrono::Utc;

    use crate::Database;
    use crate::models::{NewProduct, NewUser, ProductRow, UserRow};
    use reloop_types::models::{Category, ProductStatus, Unit};

    pub fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    pub fn user(db: &Database, email: &str) -> UserRow {
        db.create_user(
            &NewUser {
                name: email.split('@').next().unwrap_or(email).to_string(),
                email: email.to_string(),
                is_active: true,
                ..Default::default()
            },
            Utc::now(),
        )
        .unwrap()
    }

    pub fn product(db: &Database, owner: i64, title: &str) -> ProductRow {
        db.insert_product(
            &NewProduct {
                title: title.to_string(),
                image: None,
                description: None,
                lat: Some(40.0),
                lng: Some(-73.0),
                location: None,
                category: Category::Paper,
                quantity: 1,
                unit: Unit::Kilogram,
                price: 5.0,
                product_status: ProductStatus::Inactive,
                created_by: owner,
            },
            Utc::now(),
        )
        .unwrap()
    }
}
