//! Create sample SQLite database with demo sales data

use std::path::Path;

use chrono::Datelike;
use rusqlite::{Connection, Result};

const REGIONS: [&str; 4] = ["West", "East", "North", "South"];
const PRODUCTS: [&str; 5] = ["Chair", "Desk", "Lamp", "Shelf", "Sofa"];
const CHANNELS: [&str; 3] = ["Online", "Retail", "Partner"];

/// Create and populate the sample database at `path`
pub fn create_sample_database(path: &Path, rows: usize) -> Result<()> {
    let mut conn = Connection::open(path)?;

    conn.execute_batch(
        "
        DROP TABLE IF EXISTS sales;
        CREATE TABLE sales (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            region TEXT,
            product TEXT,
            quarter TEXT,
            channel TEXT,
            order_date DATE,
            units INTEGER,
            sales REAL
        );
        ",
    )?;

    tracing::info!("Generating {} sales rows...", rows);
    generate_sales(&mut conn, rows)?;

    conn.execute_batch(
        "
        CREATE INDEX IF NOT EXISTS idx_sales_region ON sales(region);
        CREATE INDEX IF NOT EXISTS idx_sales_product ON sales(product);
        ",
    )?;

    tracing::info!("Sample database created at {}", path.display());
    Ok(())
}

fn generate_sales(conn: &mut Connection, rows: usize) -> Result<()> {
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO sales (region, product, quarter, channel, order_date, units, sales)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;

        let mut rng = 42u32;
        let start = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default();

        for _ in 0..rows {
            let region = REGIONS[random_int(&mut rng) as usize % REGIONS.len()];
            let product_idx = random_int(&mut rng) as usize % PRODUCTS.len();
            let channel = CHANNELS[random_int(&mut rng) as usize % CHANNELS.len()];

            let day = random_int(&mut rng) as u64 % 366;
            let order_date = start + chrono::Days::new(day);
            let quarter = format!("Q{}", order_date.month0() / 3 + 1);

            let units = 1 + (random_int(&mut rng) % 8) as i64;
            let base_price = 40.0 + 60.0 * product_idx as f64;
            let price = base_price * (0.8 + random_float(&mut rng) * 0.4);

            // Leave a few gaps so the data has nulls to skip
            let sales = if random_float(&mut rng) < 0.01 {
                None
            } else {
                Some((units as f64 * price * 100.0).round() / 100.0)
            };

            stmt.execute((
                region,
                PRODUCTS[product_idx],
                quarter,
                channel,
                order_date.format("%Y-%m-%d").to_string(),
                units,
                sales,
            ))?;
        }
    }
    tx.commit()
}

fn random_float(seed: &mut u32) -> f64 {
    *seed = seed.wrapping_mul(1664525).wrapping_add(1013904223);
    (*seed as f64) / (u32::MAX as f64)
}

fn random_int(seed: &mut u32) -> u32 {
    *seed = seed.wrapping_mul(1664525).wrapping_add(1013904223);
    *seed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creates_populated_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.db");
        create_sample_database(&path, 200).unwrap();

        let conn = Connection::open(&path).unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM sales", [], |row| row.get(0)).unwrap();
        assert_eq!(count, 200);

        let quarters: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sales WHERE quarter NOT IN ('Q1', 'Q2', 'Q3', 'Q4')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(quarters, 0);

        // Regenerating replaces the table
        create_sample_database(&path, 10).unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM sales", [], |row| row.get(0)).unwrap();
        assert_eq!(count, 10);
    }
}
