use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::LoadConfig;
use crate::geometry::{GeoNormalizer, GeometryProvider};
use crate::input::GeoJsonlBatches;
use crate::pipeline::{RunStats, Worker, run_workers};
use crate::router::{PackCsvBlocks, RouterOptions, table_alloc};
use crate::schema::{ColumnType, create_table_sql};
use crate::writer::dump::read_dump;
use crate::writer::{BlockSink, PgConnector, PostgisWriter, WriterOptions, make_sink};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Load configuration file (YAML)
    #[arg(short, long, env = "OSM_PGLOAD_CONFIG")]
    pub config: PathBuf,

    /// Override the connection string ("null" only counts rows)
    #[arg(long)]
    pub connection: Option<String>,

    /// Override the destination table prefix
    #[arg(long)]
    pub table_prefix: Option<String>,

    /// Use the binary COPY format
    #[arg(long)]
    pub binary: bool,

    /// Directory for failure dumps
    #[arg(long)]
    pub dump_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the CREATE TABLE statements for the configured tables
    CreateTables {
        /// Run the statements instead of printing them
        #[arg(long)]
        execute: bool,
    },
    /// Load a GeoJSON-lines feature file
    Import {
        #[arg(short, long)]
        input: PathBuf,

        /// Maximum features per batch
        #[arg(long, default_value_t = 1000)]
        batch_size: usize,

        /// Worker threads, each with its own connection
        #[arg(short, long)]
        workers: Option<usize>,
    },
    /// Load a diagnostic dump file
    Replay { dump: PathBuf },
    /// Print the effective configuration
    ShowConfig,
}

pub fn load_config(cli: &Cli) -> Result<LoadConfig> {
    let mut config = LoadConfig::read(&cli.config)
        .with_context(|| format!("Config: Failed to read {:?}", cli.config))?;
    if let Some(connection) = &cli.connection {
        config.connection = connection.clone();
    }
    if let Some(prefix) = &cli.table_prefix {
        config.table_prefix = prefix.clone();
    }
    if cli.binary {
        config.binary = true;
    }
    if let Some(dir) = &cli.dump_dir {
        config.dump_dir = dir.clone();
    }
    if let Command::Import {
        workers: Some(workers),
        ..
    } = &cli.command
    {
        config.workers = *workers;
    }
    config.validate().context("Config: invalid configuration")?;
    Ok(config)
}

pub fn run(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    let mode = if config.binary { "binary" } else { "text" };
    tracing::info!(
        "Config: {} tables, {} rows, {} worker(s)",
        config.table_specs().len(),
        mode,
        config.workers
    );

    match &cli.command {
        Command::CreateTables { execute } => create_tables(&config, *execute),
        Command::Import {
            input, batch_size, ..
        } => {
            let stats = import(&config, input, *batch_size)?;
            println!(
                "loaded {} features in {} batches",
                stats.features, stats.batches
            );
            Ok(())
        }
        Command::Replay { dump } => replay(&config, dump),
        Command::ShowConfig => {
            let text = serde_yaml::to_string(&config).context("CLI: Failed to render config")?;
            print!("{text}");
            Ok(())
        }
    }
}

/// DDL for every configured table, preceded by the hstore extension when
/// a table needs it.
pub fn table_ddl(config: &LoadConfig) -> Vec<String> {
    let specs = config.table_specs();
    let mut statements = Vec::with_capacity(specs.len() + 1);
    let needs_hstore = specs
        .iter()
        .flat_map(|s| &s.columns)
        .any(|c| c.col_type == ColumnType::Hstore);
    if needs_hstore {
        statements.push("CREATE EXTENSION IF NOT EXISTS hstore".to_string());
    }
    statements.extend(
        specs
            .iter()
            .map(|spec| create_table_sql(&config.table_prefix, spec, config.srid)),
    );
    statements
}

fn database_writer(config: &LoadConfig) -> Result<PostgisWriter<PgConnector>> {
    if config.is_null_connection() {
        bail!("CLI: this command needs a database connection, not \"null\"");
    }
    Ok(PostgisWriter::new(
        PgConnector::new(config.connection.clone()),
        WriterOptions::from(config),
    ))
}

pub fn create_tables(config: &LoadConfig, execute: bool) -> Result<()> {
    let statements = table_ddl(config);
    if !execute {
        for sql in &statements {
            println!("{sql};");
        }
        return Ok(());
    }

    let mut writer = database_writer(config)?;
    for sql in &statements {
        writer
            .execute(sql)
            .with_context(|| format!("Writer: Failed to run {sql}"))?;
    }
    writer.finish().context("Writer: Failed to commit DDL")?;
    tracing::info!("Ran {} DDL statements", statements.len());
    Ok(())
}

pub fn import(config: &LoadConfig, input: &Path, batch_size: usize) -> Result<RunStats> {
    let file =
        File::open(input).with_context(|| format!("CLI: Failed to open input {:?}", input))?;
    let specs = config.table_specs();
    let geometry: Arc<dyn GeometryProvider> = Arc::new(GeoNormalizer::new(config.srid));
    let options = RouterOptions::from(config);

    let mut read_error = None;
    let batches = GeoJsonlBatches::new(BufReader::new(file), batch_size).map_while(|item| {
        item.map_err(|e| read_error = Some(e)).ok()
    });

    let start = std::time::Instant::now();
    let stats = run_workers(batches, config.workers, |_| {
        let router = PackCsvBlocks::new(
            &specs,
            options,
            Arc::clone(&geometry),
            table_alloc(config),
        )
        .context("Config: invalid table schema")?;
        Ok(Worker::new(router, make_sink(config)))
    })?;

    if let Some(err) = read_error {
        return Err(err.context("Pipeline: input stopped early; earlier batches were committed"));
    }

    let elapsed = start.elapsed();
    tracing::info!(
        "Done! Loaded {} features in {:.2}s ({} features/s)",
        stats.features,
        elapsed.as_secs_f64(),
        (stats.features as f64 / elapsed.as_secs_f64().max(1e-9)) as u64
    );
    Ok(stats)
}

pub fn replay(config: &LoadConfig, dump: &Path) -> Result<()> {
    let tables = read_dump(dump).with_context(|| format!("CLI: Failed to read dump {:?}", dump))?;
    if tables.is_empty() {
        println!("dump is empty");
        return Ok(());
    }

    if config.is_null_connection() {
        for table in &tables {
            println!("{}: {} rows, {} bytes", table.name, table.row_count, table.data.len());
        }
        return Ok(());
    }

    let mut writer = database_writer(config)?;
    let copied = writer.replay(&tables).context("Writer: replay failed")?;
    writer.finish().context("Writer: Failed to commit replay")?;
    println!("replayed {} tables, {} rows", tables.len(), copied);
    Ok(())
}
