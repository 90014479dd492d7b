//! FASTQ reading and integrity checks
//!
//! Handles plain and gzip/bgzip-compressed FASTQ files:
//! - `open_maybe_gz`: buffered reader that decompresses multi-member gzip
//! - `FastqReader`: record iterator with structural validation
//! - `FastqChecker`: line-count integrity check with progress reporting
//!
//! The checker's `stop` flag lets an embedding caller (a GUI, a service)
//! cancel a long check from another thread. The command-line tools never
//! set it and always pass a fresh flag.

use crate::{file_name, format_elapsed, FastqCheckStats};
use anyhow::{bail, Context, Result};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

const GZ_BUF_SIZE: usize = 1 << 20;

/// Whether `path` is read through the gzip decoder
pub fn is_gzipped<P: AsRef<Path>>(path: P) -> bool {
    matches!(
        path.as_ref().extension().and_then(|e| e.to_str()),
        Some("gz") | Some("bgz")
    )
}

/// Open a FASTQ file, decompressing `.gz` and `.bgz` files
pub fn open_maybe_gz<P: AsRef<Path>>(path: P) -> Result<Box<dyn BufRead>> {
    let path = path.as_ref();
    let f = File::open(path).with_context(|| path.display().to_string())?;
    if is_gzipped(path) {
        Ok(Box::new(BufReader::with_capacity(
            GZ_BUF_SIZE,
            MultiGzDecoder::new(f),
        )))
    } else {
        Ok(Box::new(BufReader::with_capacity(32 * 1024, f)))
    }
}

/// Uncompressed size of a file. For gzip files this is the ISIZE trailer of
/// the last member, which is only exact for single-member files under 4 GiB.
pub fn uncompressed_size<P: AsRef<Path>>(path: P) -> Result<u64> {
    let path = path.as_ref();
    if !is_gzipped(path) {
        return Ok(std::fs::metadata(path)?.len());
    }
    let mut f = File::open(path)?;
    if f.metadata()?.len() < 4 {
        bail!("{} is too short to be gzip compressed", path.display());
    }
    f.seek(SeekFrom::End(-4))?;
    let mut trailer = [0u8; 4];
    f.read_exact(&mut trailer)?;
    Ok(u32::from_le_bytes(trailer) as u64)
}

/// One FASTQ record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastqRecord {
    pub id: String,
    pub seq: String,
    pub qual: String,
}

/// Iterator over FASTQ records
pub struct FastqReader<R: BufRead> {
    reader: R,
    buf: String,
    record_num: u64,
    done: bool,
}

impl FastqReader<Box<dyn BufRead>> {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(open_maybe_gz(path)?))
    }
}

impl<R: BufRead> FastqReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: String::new(),
            record_num: 0,
            done: false,
        }
    }

    fn next_line(&mut self) -> Result<Option<String>> {
        self.buf.clear();
        if self.reader.read_line(&mut self.buf)? == 0 {
            return Ok(None);
        }
        Ok(Some(self.buf.trim_end_matches(&['\n', '\r'][..]).to_string()))
    }

    fn read_record(&mut self) -> Result<Option<FastqRecord>> {
        let header = loop {
            match self.next_line()? {
                None => return Ok(None),
                Some(line) if line.is_empty() => continue,
                Some(line) => break line,
            }
        };
        self.record_num += 1;
        let n = self.record_num;
        let Some(id) = header.strip_prefix('@') else {
            bail!("record {n}: header does not start with '@': {header}");
        };
        let id = id.to_string();
        let seq = self
            .next_line()?
            .with_context(|| format!("record {n}: truncated before sequence"))?;
        let sep = self
            .next_line()?
            .with_context(|| format!("record {n}: truncated before separator"))?;
        if !sep.starts_with('+') {
            bail!("record {n}: separator does not start with '+': {sep}");
        }
        let qual = self
            .next_line()?
            .with_context(|| format!("record {n}: truncated before quality"))?;
        if qual.len() != seq.len() {
            bail!(
                "record {n}: sequence length {} does not match quality length {}",
                seq.len(),
                qual.len()
            );
        }
        Ok(Some(FastqRecord { id, seq, qual }))
    }
}

impl<R: BufRead> Iterator for FastqReader<R> {
    type Item = Result<FastqRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Progress snapshot passed to the checker's callback
#[derive(Debug, Clone, Copy)]
pub struct CheckProgress {
    pub lines: u64,
    pub elapsed: Duration,
}

impl CheckProgress {
    pub fn sequences(&self) -> u64 {
        self.lines / 4
    }
}

/// Counts lines in a FASTQ file to detect truncated or corrupt compression
pub struct FastqChecker {
    pub progress_interval: u64,
}

impl Default for FastqChecker {
    fn default() -> Self {
        Self {
            progress_interval: 750_000,
        }
    }
}

impl FastqChecker {
    pub fn new(progress_interval: u64) -> Self {
        Self {
            progress_interval: progress_interval.max(1),
        }
    }

    /// Check one file. Read and decompression errors are recorded in the
    /// result instead of being returned. `stop` is polled at every progress
    /// interval.
    pub fn check<P, F>(&self, path: P, stop: &AtomicBool, mut on_progress: F) -> FastqCheckStats
    where
        P: AsRef<Path>,
        F: FnMut(CheckProgress),
    {
        let path = path.as_ref();
        let started = Instant::now();
        let mut stats = FastqCheckStats {
            file: path.display().to_string(),
            file_size: 0,
            lines: 0,
            sequences: 0,
            elapsed: String::new(),
            stopped: false,
            error: None,
        };

        if let Err(e) = self.count_lines(path, stop, &mut stats, started, &mut on_progress) {
            stats.error = Some(describe_error(&e));
        }

        stats.sequences = stats.lines / 4;
        stats.elapsed = format_elapsed(started.elapsed());
        if stats.error.is_none() && !stats.stopped && stats.lines % 4 != 0 {
            tracing::warn!(
                file = %file_name(path),
                lines = stats.lines,
                "line count is not a multiple of 4, last record is truncated"
            );
        }
        stats
    }

    fn count_lines<F>(
        &self,
        path: &Path,
        stop: &AtomicBool,
        stats: &mut FastqCheckStats,
        started: Instant,
        on_progress: &mut F,
    ) -> Result<()>
    where
        F: FnMut(CheckProgress),
    {
        stats.file_size = uncompressed_size(path)?;
        let mut reader = open_maybe_gz(path)?;
        let mut line = Vec::with_capacity(512);
        loop {
            line.clear();
            if reader.read_until(b'\n', &mut line)? == 0 {
                break;
            }
            stats.lines += 1;
            if stats.lines % self.progress_interval == 0 {
                if stop.load(Ordering::Relaxed) {
                    stats.stopped = true;
                    break;
                }
                on_progress(CheckProgress {
                    lines: stats.lines,
                    elapsed: started.elapsed(),
                });
            }
        }
        Ok(())
    }
}

fn describe_error(err: &anyhow::Error) -> String {
    match err.downcast_ref::<std::io::Error>() {
        Some(io) => format!("ERROR: {:?} {}", io.kind(), io),
        None => format!("ERROR: {err:#}"),
    }
}
