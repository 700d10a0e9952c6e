//! Output byte sinks.
//!
//! Every sink writes to `<name>.tmp` and renames to the final name on
//! `finish()`, so readers never observe a partially written capture. A
//! sink dropped without `finish()` leaves the temp file behind for
//! inspection and never renames it.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use tracing::{info, warn};
use xz2::write::XzEncoder;

use cdns_core::{CdnsError, Compression, Result};

enum SinkStream {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
    Xz(XzEncoder<BufWriter<File>>),
}

/// A rotatable capture file sink with optional compression.
pub struct CaptureSink {
    stream: Option<SinkStream>,
    final_path: PathBuf,
    temp_path: PathBuf,
    log_file_handling: bool,
}

impl CaptureSink {
    /// Extension appended to output filenames for a compression choice.
    #[must_use]
    pub fn suggested_extension(compression: Compression) -> &'static str {
        match compression {
            Compression::None => "",
            Compression::Gzip => ".gz",
            Compression::Xz => ".xz",
        }
    }

    /// Open `<path>.tmp` for writing.
    pub fn create(
        path: &Path,
        compression: Compression,
        level: u32,
        log_file_handling: bool,
    ) -> Result<Self> {
        let temp_path = temp_name(path);
        if log_file_handling {
            info!(file = %temp_path.display(), "file handling: opening temporary file");
        }
        let file = BufWriter::new(File::create(&temp_path)?);
        let stream = match compression {
            Compression::None => SinkStream::Plain(file),
            Compression::Gzip => {
                SinkStream::Gzip(GzEncoder::new(file, flate2::Compression::new(level)))
            }
            Compression::Xz => SinkStream::Xz(XzEncoder::new(file, level)),
        };
        Ok(Self {
            stream: Some(stream),
            final_path: path.to_path_buf(),
            temp_path,
            log_file_handling,
        })
    }

    /// The name the finished file will have.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.final_path
    }

    /// Finalize compression, flush, and atomically rename the temp file
    /// to its final name.
    pub fn finish(mut self) -> Result<()> {
        let stream = self
            .stream
            .take()
            .expect("finish called on finished sink");
        let mut file = match stream {
            SinkStream::Plain(file) => file,
            SinkStream::Gzip(enc) => enc
                .finish()
                .map_err(|e| CdnsError::Compression(format!("gzip finish: {e}")))?,
            SinkStream::Xz(enc) => enc
                .finish()
                .map_err(|e| CdnsError::Compression(format!("xz finish: {e}")))?,
        };
        file.flush()?;
        drop(file);
        if self.log_file_handling {
            info!(
                from = %self.temp_path.display(),
                to = %self.final_path.display(),
                "file handling: renaming temporary file"
            );
        }
        fs::rename(&self.temp_path, &self.final_path)?;
        Ok(())
    }
}

impl Write for CaptureSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.stream.as_mut() {
            Some(SinkStream::Plain(w)) => w.write(buf),
            Some(SinkStream::Gzip(w)) => w.write(buf),
            Some(SinkStream::Xz(w)) => w.write(buf),
            None => Err(io::Error::new(io::ErrorKind::Other, "sink already finished")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.stream.as_mut() {
            Some(SinkStream::Plain(w)) => w.flush(),
            Some(SinkStream::Gzip(w)) => w.flush(),
            Some(SinkStream::Xz(w)) => w.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for CaptureSink {
    fn drop(&mut self) {
        // An unfinished sink keeps its temp file on disk, unrenamed.
        if self.stream.is_some() {
            warn!(
                file = %self.temp_path.display(),
                "abandoning unfinished capture temp file"
            );
        }
    }
}

fn temp_name(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}
