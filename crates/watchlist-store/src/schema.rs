//! Database schema.

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS photos (
    id       TEXT PRIMARY KEY,
    filename TEXT,
    data     BLOB NOT NULL
);

CREATE TABLE IF NOT EXISTS profiles (
    seq           INTEGER PRIMARY KEY AUTOINCREMENT,
    name          TEXT NOT NULL,
    age           TEXT,
    gender        TEXT,
    date_of_birth TEXT,
    blood_group   TEXT,
    father_name   TEXT,
    mother_name   TEXT,
    records       TEXT,
    photo_id      TEXT NOT NULL REFERENCES photos(id),
    created_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_profiles_name ON profiles(name);

CREATE TABLE IF NOT EXISTS contacts (
    id    INTEGER PRIMARY KEY AUTOINCREMENT,
    phone TEXT NOT NULL,
    lat   REAL NOT NULL,
    lon   REAL NOT NULL
);
"#;
