//! Streaming zip archives of stored files.
//!
//! The zip writer runs on a blocking thread and pushes fixed-size chunks
//! through a bounded channel, so memory use does not depend on how large the
//! archive gets. Dropping the receiving end (client went away) makes the
//! next write fail, which stops the archive and releases open files.

use crate::services::name_codec;
use crate::services::registry::FileRegistry;
use crate::utils::validation::FALLBACK_FILENAME;
use bytes::Bytes;
use chrono::{Datelike, Local, Timelike};
use futures::Stream;
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, ErrorKind, Read, Seek, Write};
use thiserror::Error;
use tokio::sync::mpsc;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Chunks buffered between the zip thread and the HTTP body
const ARCHIVE_CHANNEL_DEPTH: usize = 4;

/// Entries at or above this size need zip64 headers
const LARGE_FILE_THRESHOLD: u64 = u32::MAX as u64;

/// Read buffer used when copying a file into the archive
const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Appended to the name of an entry that was cut short
pub const PARTIAL_MARKER_SUFFIX: &str = ".partial";

pub type ArchiveChunk = Result<Bytes, io::Error>;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("No files selected")]
    EmptySelection,

    #[error("Archive stream failed: {0}")]
    StreamFailed(String),
}

fn stream_failed(e: impl std::fmt::Display) -> ArchiveError {
    ArchiveError::StreamFailed(e.to_string())
}

/// What ended up in an archive
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ArchiveReport {
    /// Stored names written in full
    pub added: Vec<String>,
    /// Stored names left out. One cut short while reading still has its
    /// short entry in the archive, followed by a `.partial` marker.
    pub skipped: Vec<String>,
}

/// Write a zip of `stored_names` to `sink`, each entry named after the
/// decoded original name.
///
/// Missing or unsafe names are skipped. Repeated stored names are added once.
/// Distinct files that decode to the same original name are all kept; later
/// ones get a ` (n)` suffix because zip entry names must be unique for the
/// writer. Only a failing sink aborts the archive.
pub fn build_archive<W: Write>(
    registry: &FileRegistry,
    stored_names: &[String],
    sink: &mut W,
) -> Result<ArchiveReport, ArchiveError> {
    if stored_names.is_empty() {
        return Err(ArchiveError::EmptySelection);
    }

    let mut zip = ZipWriter::new_stream(&mut *sink);
    let mut report = ArchiveReport::default();
    let mut requested = HashSet::new();
    let mut entry_names = HashSet::new();
    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];

    for stored_name in stored_names {
        if !requested.insert(stored_name.as_str()) {
            continue;
        }

        let Some(mut file) = open_entry(registry, stored_name) else {
            report.skipped.push(stored_name.clone());
            continue;
        };

        let entry_name = unique_entry_name(name_codec::decode(stored_name), &mut entry_names);
        let options = entry_options(&file);

        match write_entry(
            &mut zip,
            &entry_name,
            options,
            &mut file,
            &mut buffer,
            &mut entry_names,
        )? {
            EntryOutcome::Complete(bytes) => {
                tracing::debug!("Archived {} as {} ({} bytes)", stored_name, entry_name, bytes);
                report.added.push(stored_name.clone());
            }
            EntryOutcome::Truncated => report.skipped.push(stored_name.clone()),
        }
    }

    let mut inner = zip.finish().map_err(stream_failed)?;
    inner.flush().map_err(stream_failed)?;

    Ok(report)
}

/// Build the archive on a blocking thread and expose it as a byte stream.
///
/// Fails up front with [`ArchiveError::EmptySelection`]; later failures
/// surface as an error item that terminates the stream.
pub fn stream_archive(
    registry: FileRegistry,
    stored_names: Vec<String>,
    chunk_size: usize,
) -> Result<impl Stream<Item = ArchiveChunk> + Send + 'static, ArchiveError> {
    if stored_names.is_empty() {
        return Err(ArchiveError::EmptySelection);
    }

    let (tx, rx) = mpsc::channel(ARCHIVE_CHANNEL_DEPTH);

    tokio::task::spawn_blocking(move || {
        let mut writer = ChannelWriter::new(tx.clone(), chunk_size);
        let result = build_archive(&registry, &stored_names, &mut writer)
            .and_then(|report| writer.flush().map(|_| report).map_err(stream_failed));

        match result {
            Ok(report) => tracing::info!(
                "📦 Archive streamed: {} added, {} skipped",
                report.added.len(),
                report.skipped.len()
            ),
            Err(e) => {
                tracing::error!("Archive aborted: {}", e);
                let _ = tx.blocking_send(Err(io::Error::other(e.to_string())));
            }
        }
    });

    Ok(futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (chunk, rx))
    }))
}

fn open_entry(registry: &FileRegistry, stored_name: &str) -> Option<File> {
    let path = match registry.resolve(stored_name) {
        Ok(path) => path,
        Err(e) => {
            tracing::warn!("Skipping archive entry: {}", e);
            return None;
        }
    };

    match File::open(&path) {
        Ok(file) if file.metadata().map(|m| m.is_file()).unwrap_or(false) => Some(file),
        Ok(_) => {
            tracing::warn!("Skipping archive entry {}: not a regular file", stored_name);
            None
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::info!("Skipping archive entry {}: not found", stored_name);
            None
        }
        Err(e) => {
            tracing::warn!("Skipping archive entry {}: {}", stored_name, e);
            None
        }
    }
}

fn entry_options(file: &File) -> SimpleFileOptions {
    let meta = file.metadata().ok();
    let size = meta.as_ref().map(|m| m.len()).unwrap_or(0);

    let mut options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644)
        .large_file(size >= LARGE_FILE_THRESHOLD);

    if let Some(modified) = meta.and_then(|m| m.modified().ok()) {
        let local: chrono::DateTime<Local> = modified.into();
        if let Ok(time) = zip::DateTime::from_date_and_time(
            local.year().clamp(1980, 2107) as u16,
            local.month() as u8,
            local.day() as u8,
            local.hour() as u8,
            local.minute() as u8,
            local.second() as u8,
        ) {
            options = options.last_modified_time(time);
        }
    }

    options
}

/// Pick an entry name not used yet in this archive.
fn unique_entry_name(name: &str, used: &mut HashSet<String>) -> String {
    let name = if name.is_empty() { FALLBACK_FILENAME } else { name };
    if used.insert(name.to_string()) {
        return name.to_string();
    }

    let (stem, extension) = match name.rfind('.') {
        Some(index) if index > 0 => name.split_at(index),
        _ => (name, ""),
    };

    let mut n = 1;
    loop {
        let candidate = format!("{} ({}){}", stem, n, extension);
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

enum EntryOutcome {
    Complete(u64),
    Truncated,
}

/// Copy `reader` into a new entry named `entry_name`.
///
/// Bytes already streamed cannot be taken back, so a read failure leaves the
/// entry short and adds a `<entry>.partial` marker right after it.
fn write_entry<R: Read, W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    entry_name: &str,
    options: SimpleFileOptions,
    reader: &mut R,
    buffer: &mut [u8],
    entry_names: &mut HashSet<String>,
) -> Result<EntryOutcome, ArchiveError> {
    zip.start_file(entry_name, options).map_err(stream_failed)?;

    match copy_entry(reader, zip, buffer) {
        Ok(bytes) => Ok(EntryOutcome::Complete(bytes)),
        Err(CopyError::Write(e)) => Err(stream_failed(e)),
        Err(CopyError::Read(e)) => {
            tracing::error!("Failed reading {} into archive: {}", entry_name, e);

            let marker = unique_entry_name(
                &format!("{}{}", entry_name, PARTIAL_MARKER_SUFFIX),
                entry_names,
            );
            let marker_options =
                SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
            zip.start_file(marker.as_str(), marker_options)
                .map_err(stream_failed)?;
            zip.write_all(format!("{} is incomplete: read failed\n", entry_name).as_bytes())
                .map_err(stream_failed)?;

            Ok(EntryOutcome::Truncated)
        }
    }
}

enum CopyError {
    Read(io::Error),
    Write(io::Error),
}

fn copy_entry<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    buffer: &mut [u8],
) -> Result<u64, CopyError> {
    let mut total = 0u64;
    loop {
        let n = match reader.read(buffer) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(CopyError::Read(e)),
        };
        writer.write_all(&buffer[..n]).map_err(CopyError::Write)?;
        total += n as u64;
    }
}

/// Blocking `Write` adapter that forwards fixed-size chunks into a channel.
pub struct ChannelWriter {
    tx: mpsc::Sender<ArchiveChunk>,
    buffer: Vec<u8>,
    chunk_size: usize,
}

impl ChannelWriter {
    pub fn new(tx: mpsc::Sender<ArchiveChunk>, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            tx,
            buffer: Vec::with_capacity(chunk_size),
            chunk_size,
        }
    }

    fn send_buffer(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let chunk = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.chunk_size));
        self.tx
            .blocking_send(Ok(Bytes::from(chunk)))
            .map_err(|_| io::Error::new(ErrorKind::BrokenPipe, "archive receiver dropped"))
    }
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        if self.buffer.len() >= self.chunk_size {
            self.send_buffer()?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.send_buffer()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::io::Cursor;

    fn setup(files: &[(&str, &[u8])]) -> (tempfile::TempDir, FileRegistry) {
        let dir = tempfile::tempdir().unwrap();
        for (name, data) in files {
            std::fs::write(dir.path().join(name), data).unwrap();
        }
        let registry = FileRegistry::new(dir.path());
        (dir, registry)
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn read_entries(bytes: Vec<u8>) -> Vec<(String, String)> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        (0..archive.len())
            .map(|i| {
                let mut entry = archive.by_index(i).unwrap();
                let mut content = String::new();
                entry.read_to_string(&mut content).unwrap();
                (entry.name().to_string(), content)
            })
            .collect()
    }

    #[test]
    fn test_empty_selection() {
        let (_dir, registry) = setup(&[]);
        let mut sink = Vec::new();
        assert!(matches!(
            build_archive(&registry, &[], &mut sink),
            Err(ArchiveError::EmptySelection)
        ));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_missing_entries_are_skipped() {
        let (_dir, registry) = setup(&[("1-a.txt", b"alpha")]);
        let mut sink = Vec::new();
        let report = build_archive(&registry, &names(&["1-a.txt", "2-b.txt"]), &mut sink).unwrap();

        assert_eq!(report.added, names(&["1-a.txt"]));
        assert_eq!(report.skipped, names(&["2-b.txt"]));
        assert_eq!(
            read_entries(sink),
            vec![("a.txt".to_string(), "alpha".to_string())]
        );
    }

    #[test]
    fn test_unsafe_entries_are_skipped() {
        let (_dir, registry) = setup(&[("1-a.txt", b"alpha")]);
        let mut sink = Vec::new();
        let report =
            build_archive(&registry, &names(&["../1-a.txt", "1-a.txt"]), &mut sink).unwrap();
        assert_eq!(report.skipped, names(&["../1-a.txt"]));
        assert_eq!(read_entries(sink).len(), 1);
    }

    #[test]
    fn test_duplicate_original_names_are_all_kept() {
        let (_dir, registry) = setup(&[
            ("1-report.pdf", b"first"),
            ("2-report.pdf", b"second"),
            ("3-report.pdf", b"third"),
        ]);
        let mut sink = Vec::new();
        let report = build_archive(
            &registry,
            &names(&["1-report.pdf", "2-report.pdf", "3-report.pdf"]),
            &mut sink,
        )
        .unwrap();

        assert_eq!(report.added.len(), 3);
        assert_eq!(
            read_entries(sink),
            vec![
                ("report.pdf".to_string(), "first".to_string()),
                ("report (1).pdf".to_string(), "second".to_string()),
                ("report (2).pdf".to_string(), "third".to_string()),
            ]
        );
    }

    #[test]
    fn test_repeated_stored_name_added_once() {
        let (_dir, registry) = setup(&[("1-a.txt", b"alpha")]);
        let mut sink = Vec::new();
        let report = build_archive(&registry, &names(&["1-a.txt", "1-a.txt"]), &mut sink).unwrap();
        assert_eq!(report.added, names(&["1-a.txt"]));
        assert_eq!(read_entries(sink).len(), 1);
    }

    #[test]
    fn test_all_missing_still_valid_zip() {
        let (_dir, registry) = setup(&[]);
        let mut sink = Vec::new();
        let report = build_archive(&registry, &names(&["9-gone.txt"]), &mut sink).unwrap();
        assert!(report.added.is_empty());
        assert!(read_entries(sink).is_empty());
    }

    struct FailingReader {
        served: bool,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.served {
                return Err(io::Error::other("disk went away"));
            }
            self.served = true;
            buf[..3].copy_from_slice(b"abc");
            Ok(3)
        }
    }

    #[test]
    fn test_read_failure_marks_entry_partial() {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let mut entry_names = HashSet::new();
        let mut buffer = vec![0u8; 16];
        let entry_name = unique_entry_name("video.mp4", &mut entry_names);

        let outcome = write_entry(
            &mut zip,
            &entry_name,
            SimpleFileOptions::default(),
            &mut FailingReader { served: false },
            &mut buffer,
            &mut entry_names,
        )
        .unwrap();
        assert!(matches!(outcome, EntryOutcome::Truncated));

        let bytes = zip.finish().unwrap().into_inner();
        let entries = read_entries(bytes);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], ("video.mp4".to_string(), "abc".to_string()));
        assert_eq!(entries[1].0, "video.mp4.partial");
        assert!(entries[1].1.contains("incomplete"));
    }

    #[test]
    fn test_unique_entry_name() {
        let mut used = HashSet::new();
        assert_eq!(unique_entry_name("a.txt", &mut used), "a.txt");
        assert_eq!(unique_entry_name("a.txt", &mut used), "a (1).txt");
        assert_eq!(unique_entry_name("a (1).txt", &mut used), "a (1) (1).txt");
        assert_eq!(unique_entry_name("README", &mut used), "README");
        assert_eq!(unique_entry_name("README", &mut used), "README (1)");
        assert_eq!(unique_entry_name(".env", &mut used), ".env");
        assert_eq!(unique_entry_name(".env", &mut used), ".env (1)");
        assert_eq!(unique_entry_name("", &mut used), FALLBACK_FILENAME);
    }

    #[test]
    fn test_dropped_receiver_fails_stream() {
        let (_dir, registry) = setup(&[("1-a.txt", &[7u8; 4096])]);
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let mut writer = ChannelWriter::new(tx, 16);
        assert!(matches!(
            build_archive(&registry, &names(&["1-a.txt"]), &mut writer),
            Err(ArchiveError::StreamFailed(_))
        ));
    }

    #[test]
    fn test_channel_writer_chunks() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut writer = ChannelWriter::new(tx, 4);
        writer.write_all(b"abcdefghij").unwrap();
        writer.flush().unwrap();
        drop(writer);

        let mut chunks = Vec::new();
        while let Ok(chunk) = rx.try_recv() {
            chunks.push(chunk.unwrap());
        }
        assert_eq!(chunks.concat(), b"abcdefghij".to_vec());
    }

    #[tokio::test]
    async fn test_stream_archive_produces_zip() {
        let big = vec![b'z'; 300 * 1024];
        let (_dir, registry) = setup(&[("1-a.txt", b"alpha"), ("2-big.bin", &big)]);

        let stream = stream_archive(registry, names(&["2-big.bin", "1-a.txt"]), 1024).unwrap();
        let chunks: Vec<ArchiveChunk> = stream.collect().await;
        let bytes: Vec<u8> = chunks
            .into_iter()
            .map(|c| c.unwrap())
            .flat_map(|c| c.to_vec())
            .collect();

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 2);
        let mut entry = archive.by_name("big.bin").unwrap();
        let mut content = Vec::new();
        entry.read_to_end(&mut content).unwrap();
        assert_eq!(content, big);
    }

    #[tokio::test]
    async fn test_stream_archive_empty_selection() {
        let (_dir, registry) = setup(&[]);
        assert!(matches!(
            stream_archive(registry, Vec::new(), 1024),
            Err(ArchiveError::EmptySelection)
        ));
    }
}
