//! Append-only file writer for JSONL logs.

use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;

/// Line-flushed writer appending to a single log file.
#[derive(Clone)]
pub struct AppendWriter {
    inner: Arc<Mutex<BufWriter<File>>>,
}

impl AppendWriter {
    /// Open `path` in append mode, creating parent directories as needed.
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            inner: Arc::new(Mutex::new(BufWriter::with_capacity(8192, file))),
        })
    }
}

impl io::Write for AppendWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self.inner.lock();
        let result = guard.write(buf);
        // Flush per line so concurrent tailers see complete entries.
        guard.flush()?;
        result
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.lock().flush()
    }
}

/// `MakeWriter` handing out clones of one [`AppendWriter`].
#[derive(Clone)]
pub struct WriterFactory {
    writer: AppendWriter,
}

impl WriterFactory {
    pub fn new(writer: AppendWriter) -> Self {
        Self { writer }
    }
}

impl<'a> MakeWriter<'a> for WriterFactory {
    type Writer = AppendWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.writer.clone()
    }
}
