//! Bulk-load writer: streams table sets into PostGIS with `COPY`.
//!
//! One writer owns one connection. The first block opens a transaction that
//! stays open until [`BlockSink::finish`] commits it. Any failure tears the
//! connection down, dumps the last good block and the failing block, and
//! propagates the error.

pub mod dump;

use postgres::{Client, CopyInWriter, NoTls};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

use crate::config::LoadConfig;
use crate::error::{LoadError, Result};
use crate::rows::CsvBlock;
use dump::{DumpedTable, write_dump};

/// Copy payloads are streamed in pieces of this size.
pub const CHUNK_SIZE: usize = 1 << 20;

pub const PREVIOUS_DUMP: &str = "previous.data";
pub const CURRENT_DUMP: &str = "current.data";

/// Receives the table set of every batch, then end of stream.
pub trait BlockSink {
    fn call(&mut self, block: CsvBlock) -> Result<()>;
    fn finish(&mut self) -> Result<()>;
}

/// An open `COPY ... FROM STDIN`.
pub trait CopyIn {
    fn write_chunk(&mut self, chunk: &[u8]) -> Result<()>;
    /// Ends the copy and returns the row count reported by the server.
    fn finish(self: Box<Self>) -> Result<u64>;
}

/// The slice of a database session the writer needs.
pub trait CopyConnection {
    fn begin(&mut self) -> Result<()>;
    fn commit(&mut self) -> Result<()>;
    fn execute(&mut self, sql: &str) -> Result<()>;
    fn copy_in<'a>(&'a mut self, statement: &str) -> Result<Box<dyn CopyIn + 'a>>;
}

pub trait Connector {
    type Connection: CopyConnection;
    fn connect(&self) -> Result<Self::Connection>;
}

/// Connects with a libpq-style connection string, without TLS.
#[derive(Clone, Debug)]
pub struct PgConnector {
    params: String,
}

impl PgConnector {
    pub fn new(params: impl Into<String>) -> Self {
        Self {
            params: params.into(),
        }
    }
}

impl Connector for PgConnector {
    type Connection = Client;

    fn connect(&self) -> Result<Client> {
        Client::connect(&self.params, NoTls).map_err(|e| LoadError::protocol("connect", e))
    }
}

impl CopyConnection for Client {
    fn begin(&mut self) -> Result<()> {
        self.batch_execute("BEGIN")
            .map_err(|e| LoadError::protocol("begin", e))
    }

    fn commit(&mut self) -> Result<()> {
        self.batch_execute("COMMIT")
            .map_err(|e| LoadError::protocol("commit", e))
    }

    fn execute(&mut self, sql: &str) -> Result<()> {
        self.batch_execute(sql)
            .map_err(|e| LoadError::protocol("execute", e))
    }

    fn copy_in<'a>(&'a mut self, statement: &str) -> Result<Box<dyn CopyIn + 'a>> {
        let writer =
            Client::copy_in(self, statement).map_err(|e| LoadError::protocol("copy start", e))?;
        Ok(Box::new(writer))
    }
}

impl CopyIn for CopyInWriter<'_> {
    fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        self.write_all(chunk)
            .map_err(|e| LoadError::protocol("copy write", e))
    }

    fn finish(self: Box<Self>) -> Result<u64> {
        CopyInWriter::finish(*self).map_err(|e| LoadError::protocol("copy end", e))
    }
}

#[derive(Clone, Debug, Default)]
pub struct WriterOptions {
    pub table_prefix: String,
    pub with_header: bool,
    /// Where failure dumps go; `None` disables them.
    pub dump_dir: Option<PathBuf>,
}

impl From<&LoadConfig> for WriterOptions {
    fn from(config: &LoadConfig) -> Self {
        Self {
            table_prefix: config.table_prefix.clone(),
            with_header: config.header && !config.binary,
            dump_dir: Some(config.dump_dir.clone()),
        }
    }
}

pub fn copy_statement(prefix: &str, table: &str, binary: bool, with_header: bool) -> String {
    if binary {
        format!("COPY {prefix}{table} FROM STDIN (FORMAT binary)")
    } else {
        let header = if with_header { " HEADER" } else { "" };
        format!(
            "COPY {prefix}{table} FROM STDIN csv QUOTE e'\\x01' DELIMITER e'\\x02'{header}"
        )
    }
}

fn copy_blob<C: CopyConnection + ?Sized>(
    conn: &mut C,
    statement: &str,
    data: &[u8],
) -> Result<u64> {
    let mut copy = conn.copy_in(statement)?;
    for chunk in data.chunks(CHUNK_SIZE) {
        copy.write_chunk(chunk)?;
    }
    copy.finish()
}

pub struct PostgisWriter<K: Connector> {
    connector: K,
    options: WriterOptions,
    conn: Option<K::Connection>,
    previous: Option<CsvBlock>,
}

impl<K: Connector> PostgisWriter<K> {
    pub fn new(connector: K, options: WriterOptions) -> Self {
        Self {
            connector,
            options,
            conn: None,
            previous: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    fn open(&mut self) -> Result<&mut K::Connection> {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => {
                let mut conn = self.connector.connect()?;
                conn.begin()?;
                info!("connected, transaction open");
                conn
            }
        };
        Ok(self.conn.insert(conn))
    }

    fn write_block(&mut self, block: &CsvBlock) -> Result<()> {
        let prefix = self.options.table_prefix.clone();
        let with_header = self.options.with_header;
        let conn = self.open()?;
        for (table, rows) in block.tables() {
            if rows.is_empty() {
                continue;
            }
            let statement = copy_statement(&prefix, table, rows.is_binary(), with_header);
            let copied = copy_blob(conn, &statement, rows.data_blob())?;
            debug!(table, rows = rows.len(), bytes = rows.size(), copied, "copy finished");
        }
        Ok(())
    }

    fn dump(&self, current: &CsvBlock) {
        let Some(dir) = &self.options.dump_dir else {
            return;
        };
        let dumps = [
            (PREVIOUS_DUMP, self.previous.as_ref()),
            (CURRENT_DUMP, Some(current)),
        ];
        for (name, block) in dumps {
            let path = dir.join(name);
            match write_dump(&path, block) {
                Ok(()) => info!(path = %path.display(), "wrote diagnostic dump"),
                Err(e) => warn!(path = %path.display(), error = %e, "could not write dump"),
            }
        }
    }

    /// Loads tables read back from a dump file inside the open transaction.
    pub fn replay(&mut self, tables: &[DumpedTable]) -> Result<u64> {
        let prefix = self.options.table_prefix.clone();
        let with_header = self.options.with_header;
        let conn = self.open()?;
        let mut total = 0;
        for table in tables.iter().filter(|t| t.row_count > 0) {
            let binary = table.data.starts_with(crate::encode::PGCOPY_SIGNATURE);
            let statement = copy_statement(&prefix, &table.name, binary, with_header);
            match copy_blob(conn, &statement, &table.data) {
                Ok(copied) => total += copied,
                Err(e) => {
                    self.conn = None;
                    return Err(e);
                }
            }
        }
        Ok(total)
    }

    /// Runs a statement outside of any copy, e.g. DDL.
    pub fn execute(&mut self, sql: &str) -> Result<()> {
        let conn = self.open()?;
        if let Err(e) = conn.execute(sql) {
            self.conn = None;
            return Err(e);
        }
        Ok(())
    }
}

impl<K: Connector> BlockSink for PostgisWriter<K> {
    fn call(&mut self, block: CsvBlock) -> Result<()> {
        match self.write_block(&block) {
            Ok(()) => {
                self.previous = Some(block);
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "bulk copy failed, dropping connection");
                self.conn = None;
                self.dump(&block);
                Err(e)
            }
        }
    }

    fn finish(&mut self) -> Result<()> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };
        conn.commit()?;
        info!("transaction committed");
        self.previous = None;
        Ok(())
    }
}

/// Stand-in sink for the `null` connection: tallies rows and bytes per
/// table and reports them at end of stream.
#[derive(Debug, Default)]
pub struct RowCounter {
    totals: BTreeMap<String, (u64, u64)>,
    blocks: u64,
}

impl RowCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(rows, bytes)` per table.
    pub fn totals(&self) -> &BTreeMap<String, (u64, u64)> {
        &self.totals
    }
}

impl BlockSink for RowCounter {
    fn call(&mut self, block: CsvBlock) -> Result<()> {
        self.blocks += 1;
        for (table, rows) in block.tables() {
            let entry = self.totals.entry(table.to_string()).or_default();
            entry.0 += rows.len() as u64;
            entry.1 += rows.size() as u64;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        for (table, (rows, bytes)) in &self.totals {
            info!(table = %table, rows, bytes, blocks = self.blocks, "row count");
        }
        Ok(())
    }
}

/// Picks the sink matching the configured connection.
pub fn make_sink(config: &LoadConfig) -> Box<dyn BlockSink> {
    if config.is_null_connection() {
        Box::new(RowCounter::new())
    } else {
        Box::new(PostgisWriter::new(
            PgConnector::new(config.connection.clone()),
            WriterOptions::from(config),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Clone, Debug, PartialEq, Eq)]
    enum Event {
        Connect,
        Begin,
        CopyStart(String),
        Write(usize),
        CopyEnd,
        Commit,
    }

    #[derive(Clone, Default)]
    struct Recorder {
        events: Rc<RefCell<Vec<Event>>>,
        /// Step name that returns an error instead of succeeding.
        fail_step: Rc<RefCell<Option<&'static str>>>,
    }

    impl Recorder {
        fn fail_at(&self, step: &'static str) {
            *self.fail_step.borrow_mut() = Some(step);
        }

        fn check(&self, step: &'static str) -> Result<()> {
            if *self.fail_step.borrow() == Some(step) {
                return Err(LoadError::protocol(step, "bad status"));
            }
            Ok(())
        }
    }

    struct MockConnection(Recorder);
    struct MockCopy(Recorder);

    impl CopyIn for MockCopy {
        fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
            self.0.events.borrow_mut().push(Event::Write(chunk.len()));
            Ok(())
        }

        fn finish(self: Box<Self>) -> Result<u64> {
            self.0.check("copy end")?;
            self.0.events.borrow_mut().push(Event::CopyEnd);
            Ok(1)
        }
    }

    impl CopyConnection for MockConnection {
        fn begin(&mut self) -> Result<()> {
            self.0.check("begin")?;
            self.0.events.borrow_mut().push(Event::Begin);
            Ok(())
        }

        fn commit(&mut self) -> Result<()> {
            self.0.events.borrow_mut().push(Event::Commit);
            Ok(())
        }

        fn execute(&mut self, _sql: &str) -> Result<()> {
            Ok(())
        }

        fn copy_in<'a>(&'a mut self, statement: &str) -> Result<Box<dyn CopyIn + 'a>> {
            self.0.check("copy start")?;
            self.0
                .events
                .borrow_mut()
                .push(Event::CopyStart(statement.to_string()));
            Ok(Box::new(MockCopy(self.0.clone())))
        }
    }

    impl Connector for Recorder {
        type Connection = MockConnection;

        fn connect(&self) -> Result<MockConnection> {
            self.check("connect")?;
            self.events.borrow_mut().push(Event::Connect);
            Ok(MockConnection(self.clone()))
        }
    }

    fn block(table: &str, rows: usize) -> CsvBlock {
        let mut block = CsvBlock::new(false);
        for i in 0..rows {
            block.get(table).add(format!("{i}\n").as_bytes());
        }
        block.finish();
        block
    }

    #[test]
    fn lifecycle_opens_one_transaction() {
        let recorder = Recorder::default();
        let mut writer = PostgisWriter::new(
            recorder.clone(),
            WriterOptions {
                table_prefix: "planet_".to_string(),
                ..Default::default()
            },
        );
        writer.finish().unwrap();
        assert!(recorder.events.borrow().is_empty());

        writer.call(block("point", 2)).unwrap();
        writer.call(block("line", 1)).unwrap();
        writer.call(block("polygon", 3)).unwrap();
        writer.finish().unwrap();

        let events = recorder.events.borrow();
        let count = |e: &Event| events.iter().filter(|x| *x == e).count();
        assert_eq!(count(&Event::Connect), 1);
        assert_eq!(count(&Event::Begin), 1);
        assert_eq!(count(&Event::CopyEnd), 3);
        assert_eq!(count(&Event::Commit), 1);
        assert_eq!(
            events[2],
            Event::CopyStart(
                "COPY planet_point FROM STDIN csv QUOTE e'\\x01' DELIMITER e'\\x02'".to_string()
            )
        );
        assert_eq!(events.last(), Some(&Event::Commit));
    }

    #[test]
    fn failure_dumps_previous_and_current() {
        let recorder = Recorder::default();
        let dir = tempfile::tempdir().unwrap();
        let mut writer = PostgisWriter::new(
            recorder.clone(),
            WriterOptions {
                dump_dir: Some(dir.path().to_path_buf()),
                ..Default::default()
            },
        );
        writer.call(block("point", 2)).unwrap();
        recorder.fail_at("copy end");
        let err = writer.call(block("line", 1)).unwrap_err();
        assert!(matches!(err, LoadError::Protocol { step: "copy end", .. }));
        assert!(!writer.is_connected());

        let previous = dump::read_dump(&dir.path().join(PREVIOUS_DUMP)).unwrap();
        assert_eq!(previous[0].name, "point");
        assert_eq!(previous[0].row_count, 2);
        let current = dump::read_dump(&dir.path().join(CURRENT_DUMP)).unwrap();
        assert_eq!(current[0].name, "line");

        // the failed transaction is gone, nothing to commit
        writer.finish().unwrap();
        assert!(!recorder.events.borrow().contains(&Event::Commit));
    }

    #[test]
    fn first_failure_dumps_empty_previous() {
        let recorder = Recorder::default();
        recorder.fail_at("copy end");
        let dir = tempfile::tempdir().unwrap();
        let mut writer = PostgisWriter::new(
            recorder,
            WriterOptions {
                dump_dir: Some(dir.path().to_path_buf()),
                ..Default::default()
            },
        );
        assert!(writer.call(block("point", 1)).is_err());
        let previous = std::fs::read(dir.path().join(PREVIOUS_DUMP)).unwrap();
        assert_eq!(previous, b"EMPTY");
    }

    #[test]
    fn failure_before_copy_is_fatal_and_dumped() {
        for step in ["connect", "begin", "copy start"] {
            let recorder = Recorder::default();
            recorder.fail_at(step);
            let dir = tempfile::tempdir().unwrap();
            let mut writer = PostgisWriter::new(
                recorder.clone(),
                WriterOptions {
                    dump_dir: Some(dir.path().to_path_buf()),
                    ..Default::default()
                },
            );

            let err = writer.call(block("point", 1)).unwrap_err();
            match err {
                LoadError::Protocol { step: failed, .. } => assert_eq!(failed, step),
                other => panic!("{step}: unexpected error {other:?}"),
            }
            assert!(!writer.is_connected(), "{step}");
            let current = dump::read_dump(&dir.path().join(CURRENT_DUMP)).unwrap();
            assert_eq!(current[0].name, "point", "{step}");
            assert!(dir.path().join(PREVIOUS_DUMP).exists(), "{step}");

            writer.finish().unwrap();
            let events = recorder.events.borrow();
            assert!(!events.contains(&Event::Commit), "{step}");
            assert!(!events.contains(&Event::CopyEnd), "{step}");
        }
    }

    #[test]
    fn large_tables_stream_in_chunks() {
        let recorder = Recorder::default();
        let mut writer = PostgisWriter::new(recorder.clone(), WriterOptions::default());
        let mut big = CsvBlock::new(false);
        big.get("point").add(&vec![b'x'; CHUNK_SIZE + 10]);
        big.finish();
        writer.call(big).unwrap();
        let writes: Vec<Event> = recorder
            .events
            .borrow()
            .iter()
            .filter(|e| matches!(e, Event::Write(_)))
            .cloned()
            .collect();
        assert_eq!(writes, vec![Event::Write(CHUNK_SIZE), Event::Write(10)]);
    }

    #[test]
    fn copy_statements() {
        assert_eq!(
            copy_statement("", "point", true, true),
            "COPY point FROM STDIN (FORMAT binary)"
        );
        assert!(copy_statement("p_", "line", false, true).ends_with("e'\\x02' HEADER"));
    }

    #[test]
    fn row_counter_tallies_tables() {
        let mut counter = RowCounter::new();
        counter.call(block("point", 2)).unwrap();
        counter.call(block("point", 3)).unwrap();
        counter.finish().unwrap();
        assert_eq!(counter.totals()["point"].0, 5);
    }
}
