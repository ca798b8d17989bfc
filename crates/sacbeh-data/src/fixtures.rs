//! Sales dataset written to SQLite and CSV for tests

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use rusqlite::Connection;
use tempfile::TempDir;

/// (region, product, quarter, order_date, promo, units, sales)
pub type SalesRow = (Option<&'static str>, &'static str, &'static str, &'static str, bool, i64, Option<f64>);

/// Sum of sales: West 380, East 260. The last row has no region and no sales.
pub const SALES_ROWS: &[SalesRow] = &[
    (Some("West"), "Chair", "Q1", "2024-01-15", true, 2, Some(100.0)),
    (Some("West"), "Chair", "Q2", "2024-04-10", false, 1, Some(50.0)),
    (Some("West"), "Desk", "Q1", "2024-02-03", true, 4, Some(200.0)),
    (Some("West"), "Lamp", "Q3", "2024-07-21", false, 3, Some(30.0)),
    (Some("East"), "Chair", "Q1", "2024-01-15", false, 2, Some(80.0)),
    (Some("East"), "Desk", "Q2", "2024-05-30", true, 1, Some(120.0)),
    (Some("East"), "Lamp", "Q2", "2024-06-02", false, 6, Some(60.0)),
    (None, "Lamp", "Q4", "2024-10-09", false, 5, None),
];

pub fn sales_db(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("sales.db");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE sales (
            region TEXT,
            product TEXT,
            quarter TEXT,
            order_date DATE,
            promo BOOLEAN,
            units INTEGER,
            sales REAL
        );",
    )
    .unwrap();

    let mut stmt = conn
        .prepare("INSERT INTO sales VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)")
        .unwrap();
    for row in SALES_ROWS {
        stmt.execute((row.0, row.1, row.2, row.3, row.4, row.5, row.6)).unwrap();
    }
    path
}

pub fn sales_csv(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("sales.csv");
    let mut file = File::create(&path).unwrap();
    writeln!(file, "region,product,quarter,order_date,promo,units,sales").unwrap();
    for row in SALES_ROWS {
        writeln!(
            file,
            "{},{},{},{},{},{},{}",
            row.0.unwrap_or(""),
            row.1,
            row.2,
            row.3,
            row.4,
            row.5,
            row.6.map(|v| format!("{:.1}", v)).unwrap_or_default()
        )
        .unwrap();
    }
    path
}
