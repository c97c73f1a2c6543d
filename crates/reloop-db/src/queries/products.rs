use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::types::ToSql;
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{choice, placeholders};
use crate::Database;
use crate::models::{NewProduct, ProductFilter, ProductRow};

const PRODUCT_COLUMNS: &str = "id, title, image, description, lat, lng, location, category, \
     quantity, unit, price, product_status, created_by, created_at, updated_at";

impl Database {
    pub fn insert_product(&self, product: &NewProduct, now: DateTime<Utc>) -> Result<ProductRow> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO products (title, image, description, lat, lng, location, category,
                                       quantity, unit, price, product_status, created_by,
                                       created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)",
                params![
                    product.title,
                    product.image,
                    product.description,
                    product.lat,
                    product.lng,
                    product.location,
                    product.category.as_str(),
                    product.quantity,
                    product.unit.as_str(),
                    product.price,
                    product.product_status.as_str(),
                    product.created_by,
                    now,
                ],
            )?;
            let id = conn.last_insert_rowid();
            query_product(conn, id)?.ok_or_else(|| anyhow!("product {} missing after insert", id))
        })
    }

    pub fn get_product(&self, id: i64) -> Result<Option<ProductRow>> {
        self.with_conn(|conn| query_product(conn, id))
    }

    /// Fetch a product only if `owner` created it.
    pub fn get_owned_product(&self, id: i64, owner: i64) -> Result<Option<ProductRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1 AND created_by = ?2");
            Ok(conn.query_row(&sql, [id, owner], map_product).optional()?)
        })
    }

    /// Batch-fetch products for a set of ids. Unknown ids are skipped.
    pub fn get_products_by_ids(&self, ids: &[i64]) -> Result<Vec<ProductRow>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {PRODUCT_COLUMNS} FROM products WHERE id IN ({}) ORDER BY id",
                placeholders(ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(ids), map_product)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn list_products_by_owner(&self, owner: i64) -> Result<Vec<ProductRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {PRODUCT_COLUMNS} FROM products WHERE created_by = ?1
                 ORDER BY created_at DESC, id DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([owner], map_product)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// All products matching the SQL-side filters, newest first.
    pub fn search_products(&self, filter: &ProductFilter) -> Result<Vec<ProductRow>> {
        let category = filter.category.map(|c| c.as_str());

        self.with_conn(|conn| {
            let mut clauses: Vec<String> = Vec::new();
            let mut values: Vec<&dyn ToSql> = Vec::new();

            if let Some(needle) = &filter.title_contains {
                values.push(needle);
                clauses.push(format!("instr(lower(title), lower(?{})) > 0", values.len()));
            }
            if let Some(category) = &category {
                values.push(category);
                clauses.push(format!("category = ?{}", values.len()));
            }

            let where_clause = if clauses.is_empty() {
                String::new()
            } else {
                format!("WHERE {}", clauses.join(" AND "))
            };
            let sql = format!(
                "SELECT {PRODUCT_COLUMNS} FROM products {where_clause} ORDER BY created_at DESC, id DESC"
            );

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(values.as_slice(), map_product)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Persist every mutable column of `product`. Ownership is not writable.
    pub fn update_product(&self, product: &ProductRow, now: DateTime<Utc>) -> Result<ProductRow> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE products SET title = ?2, image = ?3, description = ?4, lat = ?5, lng = ?6,
                        location = ?7, category = ?8, quantity = ?9, unit = ?10, price = ?11,
                        product_status = ?12, updated_at = ?13
                 WHERE id = ?1",
                params![
                    product.id,
                    product.title,
                    product.image,
                    product.description,
                    product.lat,
                    product.lng,
                    product.location,
                    product.category.as_str(),
                    product.quantity,
                    product.unit.as_str(),
                    product.price,
                    product.product_status.as_str(),
                    now,
                ],
            )?;
            query_product(conn, product.id)?
                .ok_or_else(|| anyhow!("product {} missing after update", product.id))
        })
    }

    pub fn delete_owned_product(&self, id: i64, owner: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let deleted =
                conn.execute("DELETE FROM products WHERE id = ?1 AND created_by = ?2", [id, owner])?;
            Ok(deleted > 0)
        })
    }
}

fn query_product(conn: &Connection, id: i64) -> Result<Option<ProductRow>> {
    let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], map_product).optional()?)
}

fn map_product(row: &Row<'_>) -> rusqlite::Result<ProductRow> {
    Ok(ProductRow {
        id: row.get(0)?,
        title: row.get(1)?,
        image: row.get(2)?,
        description: row.get(3)?,
        lat: row.get(4)?,
        lng: row.get(5)?,
        location: row.get(6)?,
        category: choice(row, 7)?,
        quantity: row.get(8)?,
        unit: choice(row, 9)?,
        price: row.get(10)?,
        product_status: choice(row, 11)?,
        created_by: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}
