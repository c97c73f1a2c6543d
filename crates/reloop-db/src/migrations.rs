use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                name            TEXT NOT NULL,
                email           TEXT NOT NULL UNIQUE,
                password        TEXT,
                is_active       INTEGER NOT NULL DEFAULT 1,
                date_joined     TEXT NOT NULL,
                profile_picture TEXT,
                phone_number    TEXT,
                address         TEXT,
                postal_code     TEXT,
                state           TEXT,
                country         TEXT,
                is_active_user  INTEGER NOT NULL DEFAULT 0,
                last_active     TEXT
            );

            CREATE TABLE products (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                title           TEXT NOT NULL,
                image           TEXT,
                description     TEXT,
                lat             REAL,
                lng             REAL,
                location        TEXT,
                category        TEXT NOT NULL,
                quantity        INTEGER NOT NULL,
                unit            TEXT NOT NULL,
                price           REAL NOT NULL,
                product_status  TEXT NOT NULL DEFAULT 'inactive',
                created_by      INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            CREATE INDEX idx_products_owner ON products(created_by, created_at);

            CREATE TABLE orders (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id         INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                seller_id       INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                product_id      INTEGER NOT NULL REFERENCES products(id) ON DELETE CASCADE,
                quantity        INTEGER NOT NULL,
                total_amount    REAL NOT NULL,
                tax             REAL NOT NULL DEFAULT 0,
                status          TEXT NOT NULL DEFAULT 'pending',
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            CREATE INDEX idx_orders_buyer ON orders(user_id, created_at);
            CREATE INDEX idx_orders_seller ON orders(seller_id, created_at);

            CREATE TABLE conversations (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                user1_id            INTEGER REFERENCES users(id) ON DELETE SET NULL,
                user2_id            INTEGER REFERENCES users(id) ON DELETE SET NULL,
                latest_conversation TEXT,
                deleted_at          TEXT,
                created_at          TEXT NOT NULL,
                updated_at          TEXT NOT NULL
            );

            CREATE INDEX idx_conversations_user1 ON conversations(user1_id);
            CREATE INDEX idx_conversations_user2 ON conversations(user2_id);

            CREATE TABLE messages (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id INTEGER REFERENCES conversations(id) ON DELETE SET NULL,
                sender_id       INTEGER REFERENCES users(id) ON DELETE SET NULL,
                recipient_id    INTEGER REFERENCES users(id) ON DELETE SET NULL,
                content         TEXT,
                read_at         TEXT,
                is_read         INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL
            );

            CREATE INDEX idx_messages_conversation ON messages(conversation_id, created_at);
            CREATE INDEX idx_messages_unread ON messages(conversation_id, recipient_id, is_read);

            CREATE TABLE token_blacklist (
                jti             TEXT PRIMARY KEY,
                user_id         INTEGER,
                expires_at      TEXT NOT NULL,
                blacklisted_at  TEXT NOT NULL
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
