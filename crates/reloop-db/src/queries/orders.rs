use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::choice;
use crate::Database;
use crate::models::{NewOrder, OrderRow};

const ORDER_COLUMNS: &str = "id, user_id, seller_id, product_id, quantity, total_amount, tax, status, \
     created_at, updated_at";

impl Database {
    /// Insert an order whose seller is the product's current owner, read in the
    /// same statement. Returns `None` when the product does not exist.
    pub fn create_order(&self, order: &NewOrder, now: DateTime<Utc>) -> Result<Option<OrderRow>> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT INTO orders (user_id, seller_id, product_id, quantity, total_amount, tax,
                                     status, created_at, updated_at)
                 SELECT ?1, p.created_by, p.id, ?3, ?4, ?5, ?6, ?7, ?7
                 FROM products p WHERE p.id = ?2",
                params![
                    order.user_id,
                    order.product_id,
                    order.quantity,
                    order.total_amount,
                    order.tax,
                    order.status.as_str(),
                    now,
                ],
            )?;
            if inserted == 0 {
                return Ok(None);
            }
            let id = conn.last_insert_rowid();
            let row = query_order(conn, id)?.ok_or_else(|| anyhow!("order {} missing after insert", id))?;
            Ok(Some(row))
        })
    }

    pub fn get_order(&self, id: i64) -> Result<Option<OrderRow>> {
        self.with_conn(|conn| query_order(conn, id))
    }

    /// Fetch an order only if `buyer` placed it.
    pub fn get_order_for_buyer(&self, id: i64, buyer: i64) -> Result<Option<OrderRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1 AND user_id = ?2");
            Ok(conn.query_row(&sql, [id, buyer], map_order).optional()?)
        })
    }

    pub fn list_orders_for_buyer(&self, buyer: i64) -> Result<Vec<OrderRow>> {
        self.list_orders_where("user_id", buyer)
    }

    pub fn list_orders_for_seller(&self, seller: i64) -> Result<Vec<OrderRow>> {
        self.list_orders_where("seller_id", seller)
    }

    fn list_orders_where(&self, column: &'static str, user_id: i64) -> Result<Vec<OrderRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {ORDER_COLUMNS} FROM orders WHERE {column} = ?1 ORDER BY created_at DESC, id DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], map_order)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Persist the mutable columns of `order`. `seller_id` is never rewritten.
    pub fn update_order(&self, order: &OrderRow, now: DateTime<Utc>) -> Result<OrderRow> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE orders SET product_id = ?2, quantity = ?3, total_amount = ?4, tax = ?5,
                        status = ?6, updated_at = ?7
                 WHERE id = ?1",
                params![
                    order.id,
                    order.product_id,
                    order.quantity,
                    order.total_amount,
                    order.tax,
                    order.status.as_str(),
                    now,
                ],
            )?;
            query_order(conn, order.id)?.ok_or_else(|| anyhow!("order {} missing after update", order.id))
        })
    }

    pub fn delete_order(&self, id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| Ok(conn.execute("DELETE FROM orders WHERE id = ?1", [id])? > 0))
    }
}

fn query_order(conn: &Connection, id: i64) -> Result<Option<OrderRow>> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], map_order).optional()?)
}

fn map_order(row: &Row<'_>) -> rusqlite::Result<OrderRow> {
    Ok(OrderRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        seller_id: row.get(2)?,
        product_id: row.get(3)?,
        quantity: row.get(4)?,
        total_amount: row.get(5)?,
        tax: row.get(6)?,
        status: choice(row, 7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::super::testutil;
    use super::*;
    use reloop_types::models::OrderStatus;

    fn new_order(buyer: i64, product: i64) -> NewOrder {
        NewOrder {
            user_id: buyer,
            product_id: product,
            quantity: 1,
            total_amount: 5.0,
            tax: 0.0,
            status: OrderStatus::Pending,
        }
    }

    #[test]
    fn seller_is_product_owner_at_creation() {
        let db = testutil::db();
        let a = testutil::user(&db, "a@x.com");
        let b = testutil::user(&db, "b@x.com");
        let c = testutil::user(&db, "c@x.com");
        let boxes = testutil::product(&db, a.id, "Box");

        let order = db.create_order(&new_order(b.id, boxes.id), Utc::now()).unwrap().unwrap();
        assert_eq!(order.seller_id, a.id);
        assert_eq!(order.user_id, b.id);
        assert_eq!(order.status, OrderStatus::Pending);

        // Ownership moving later must not touch the order.
        db.with_conn_mut(|conn| {
            conn.execute("UPDATE products SET created_by = ?1 WHERE id = ?2", [c.id, boxes.id])?;
            Ok(())
        })
        .unwrap();
        let mut reread = db.get_order(order.id).unwrap().unwrap();
        assert_eq!(reread.seller_id, a.id);

        reread.status = OrderStatus::Delivered;
        let updated = db.update_order(&reread, Utc::now()).unwrap();
        assert_eq!(updated.seller_id, a.id);
        assert_eq!(updated.status, OrderStatus::Delivered);
    }

    #[test]
    fn unknown_product_creates_nothing() {
        let db = testutil::db();
        let b = testutil::user(&db, "b@x.com");

        assert!(db.create_order(&new_order(b.id, 42), Utc::now()).unwrap().is_none());
        assert!(db.list_orders_for_buyer(b.id).unwrap().is_empty());
    }

    #[test]
    fn purchase_and_sales_views() {
        let db = testutil::db();
        let a = testutil::user(&db, "a@x.com");
        let b = testutil::user(&db, "b@x.com");
        let boxes = testutil::product(&db, a.id, "Box");
        let order = db.create_order(&new_order(b.id, boxes.id), Utc::now()).unwrap().unwrap();

        assert_eq!(db.list_orders_for_buyer(b.id).unwrap(), vec![order.clone()]);
        assert_eq!(db.list_orders_for_seller(a.id).unwrap(), vec![order.clone()]);
        assert!(db.list_orders_for_buyer(a.id).unwrap().is_empty());
        assert!(db.get_order_for_buyer(order.id, a.id).unwrap().is_none());
        assert!(db.get_order_for_buyer(order.id, b.id).unwrap().is_some());

        assert!(db.delete_order(order.id).unwrap());
        assert!(db.get_order(order.id).unwrap().is_none());
    }
}
