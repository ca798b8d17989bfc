//! Command line walkthrough of a drill-down session over the sample sales data

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sacbeh_core::{AggFn, EngineConfig, NavigationFacade, PathSeed, RenderEvent, SessionId, SourceConfig};
use tracing::info;

mod sample_db;

const SAMPLE_ROWS: usize = 20_000;

/// Print the chart spec of the session's current path as a text bar chart
async fn show(facade: &NavigationFacade, id: SessionId) -> Result<()> {
    let spec = facade.current_view(id).await?;
    let x = spec["encoding"]["x"]["field"].as_str().unwrap_or_default();
    let y = spec["encoding"]["y"]["field"].as_str().unwrap_or_default();
    let values = spec["data"]["values"].as_array().cloned().unwrap_or_default();
    let max = values
        .iter()
        .filter_map(|v| v[y].as_f64())
        .fold(0.0_f64, f64::max);

    println!();
    println!("{}", spec["title"].as_str().unwrap_or_default());
    for record in &values {
        let key = record[x].as_str().unwrap_or_default();
        let value = record[y].as_f64().unwrap_or_default();
        let width = if max > 0.0 { (value / max * 40.0).round() as usize } else { 0 };
        println!("  {:<12} {:>12.2} {}", key, value, "#".repeat(width));
    }
    if spec["usermeta"]["truncated"].as_bool().unwrap_or(false) {
        println!("  ... {} groups in total", spec["usermeta"]["totalGroups"]);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::from_file(&path).with_context(|| format!("loading {}", path))?,
        None => EngineConfig::default(),
    };

    let db_path = PathBuf::from("data/sample_sales.db");
    if !db_path.exists() {
        std::fs::create_dir_all(db_path.parent().unwrap_or(Path::new(".")))?;
        sample_db::create_sample_database(&db_path, SAMPLE_ROWS)?;
    }

    let facade = NavigationFacade::new(sacbeh_data::builtin_registry(), config);
    let about = facade.info();
    info!(
        "Starting {} {} (connectors: {:?}, backends: {:?})",
        about.name, about.version, about.connectors, about.backends
    );

    let id = facade.create_session();
    let source = SourceConfig::new("sqlite", &db_path)
        .with_table("sales")
        .with_backend("sql");
    facade
        .load(id, &source, PathSeed::new("region", Some("sales"), AggFn::Sum))
        .await?;
    show(&facade, id).await?;

    let top = facade
        .current_result(id)
        .await?
        .rows
        .first()
        .map(|row| row.key.clone())
        .context("sample data has no regions")?;

    facade
        .dispatch(
            id,
            RenderEvent::ValueClicked {
                value: top,
                next_dimension: None,
            },
        )
        .await?;
    show(&facade, id).await?;

    facade
        .dispatch(id, RenderEvent::DimensionSelected { dimension: "quarter".into() })
        .await?;
    show(&facade, id).await?;

    facade.dispatch(id, RenderEvent::BackRequested).await?;
    show(&facade, id).await?;

    let context = facade.context(id).await?;
    println!();
    println!("{}", serde_json::to_string_pretty(&context)?);

    facade.shutdown().await;
    Ok(())
}
