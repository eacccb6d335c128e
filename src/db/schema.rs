//! Database schema and migrations for TALKING.
//!
//! Migrations are applied in order when the database is opened. Timestamps
//! are stored as RFC 3339 strings written by the application; birthdates as
//! `YYYY-MM-DD`.

/// Database migrations.
///
/// The schema_version table tracks which migrations have been applied.
pub const MIGRATIONS: &[&str] = &[
    // v1: users and rooms
    r#"
CREATE TABLE users (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    pseudo              TEXT NOT NULL UNIQUE COLLATE NOCASE,
    birthdate           TEXT NOT NULL,
    gender              TEXT NOT NULL DEFAULT 'other',
    role                TEXT NOT NULL DEFAULT 'user',
    verified            INTEGER NOT NULL DEFAULT 0,
    verification_badge  TEXT,
    online              INTEGER NOT NULL DEFAULT 0,
    last_seen           TEXT,
    created_at          TEXT NOT NULL
);

CREATE INDEX idx_users_online ON users(online);

CREATE TABLE rooms (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    name                TEXT NOT NULL UNIQUE,
    topic               TEXT NOT NULL DEFAULT '',
    is_private          INTEGER NOT NULL DEFAULT 0,
    is_age_restricted   INTEGER NOT NULL DEFAULT 0,
    min_age             INTEGER,
    max_age             INTEGER,
    password            TEXT,
    created_by          INTEGER REFERENCES users(id) ON DELETE SET NULL,
    created_at          TEXT NOT NULL
);
"#,
    // v2: messages, public XOR private
    r#"
CREATE TABLE messages (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    content         TEXT NOT NULL,
    user_id         INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    room_id         INTEGER REFERENCES rooms(id) ON DELETE CASCADE,
    recipient_id    INTEGER REFERENCES users(id) ON DELETE CASCADE,
    mentioned_users TEXT,
    created_at      TEXT NOT NULL,
    CHECK ((room_id IS NULL) <> (recipient_id IS NULL))
);

CREATE INDEX idx_messages_room_id ON messages(room_id, id);
CREATE INDEX idx_messages_private ON messages(user_id, recipient_id);
"#,
    // v3: bans and auto roles
    r#"
CREATE TABLE bans (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    room_id     INTEGER REFERENCES rooms(id) ON DELETE CASCADE,
    banned_by   INTEGER REFERENCES users(id) ON DELETE SET NULL,
    reason      TEXT NOT NULL DEFAULT '',
    expires_at  TEXT,
    created_at  TEXT NOT NULL
);

CREATE INDEX idx_bans_user_id ON bans(user_id);

CREATE TABLE auto_roles (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    room_id     INTEGER NOT NULL REFERENCES rooms(id) ON DELETE CASCADE,
    role        TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    UNIQUE (user_id, room_id)
);
"#,
];
