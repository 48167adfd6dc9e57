// Output pipeline: record type, writer traits, and the format registry.
//
// Workers never share a writer. The shared object is the supplier, whose
// `get_writer` must be callable concurrently from every worker at thread
// startup; each returned writer is then owned by exactly one thread until it
// is closed.

pub mod fastq_reader;
pub mod sam_writer;

use crate::index::GenomeIndex;
use crate::run_opt::{ClippingMode, OutputFileType, RunOptions};
use anyhow::Result;
use std::sync::Arc;

pub mod sam_flags {
    pub const PAIRED: u16 = 0x1;
    pub const UNMAPPED: u16 = 0x4;
    pub const MATE_UNMAPPED: u16 = 0x8;
    pub const REVERSE: u16 = 0x10;
    pub const FIRST_IN_PAIR: u16 = 0x40;
    pub const SECOND_IN_PAIR: u16 = 0x80;
    pub const SECONDARY: u16 = 0x100;
    pub const SUPPLEMENTARY: u16 = 0x800;
}

/// One output read record.
#[derive(Debug, Clone)]
pub struct AlignmentRecord {
    pub name: String,
    pub flag: u16,
    pub ref_name: String,
    /// 1-based leftmost position; 0 for unmapped.
    pub pos: u64,
    pub mapq: u8,
    pub cigar: String,
    pub mate_ref: String,
    pub mate_pos: u64,
    pub template_len: i64,
    pub seq: Vec<u8>,
    pub qual: String,
    pub tags: Vec<(String, String)>,
}

impl AlignmentRecord {
    /// An unmapped record for a read the search produced no placement for.
    pub fn unmapped(name: &str, seq: &[u8], qual: &str) -> Self {
        AlignmentRecord {
            name: name.to_string(),
            flag: sam_flags::UNMAPPED,
            ref_name: "*".to_string(),
            pos: 0,
            mapq: 0,
            cigar: String::new(),
            mate_ref: "*".to_string(),
            mate_pos: 0,
            template_len: 0,
            seq: seq.to_vec(),
            qual: qual.to_string(),
            tags: Vec::new(),
        }
    }

    pub fn add_tag(&mut self, tag: &str, value: String) {
        self.tags.push((tag.to_string(), value));
    }

    pub fn to_sam_line(&self) -> String {
        let cigar = if self.cigar.is_empty() { "*" } else { &self.cigar };
        let qual = if self.qual.is_empty() { "*" } else { &self.qual };
        let mut line = format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.name,
            self.flag,
            self.ref_name,
            self.pos,
            self.mapq,
            cigar,
            self.mate_ref,
            self.mate_pos,
            self.template_len,
            String::from_utf8_lossy(&self.seq),
            qual,
        );
        for (tag, value) in &self.tags {
            line.push('\t');
            line.push_str(tag);
            line.push(':');
            line.push_str(value);
        }
        line
    }
}

/// Per-iteration reader configuration shared read-only by every worker.
#[derive(Clone)]
pub struct ReaderContext {
    pub clipping: ClippingMode,
    pub default_read_group: String,
    pub index: Option<Arc<GenomeIndex>>,
    pub ignore_secondary_alignments: bool,
    pub ignore_supplementary_alignments: bool,
}

/// A single-owner record writer.
pub trait ReadWriter: Send {
    #[allow(clippy::too_many_arguments)]
    fn write_header(
        &mut self,
        context: &ReaderContext,
        sorted: bool,
        argv: &[String],
        version: &str,
        read_group_line: Option<&str>,
        omit_sq_lines: bool,
    ) -> Result<()>;

    fn write_read(&mut self, record: &AlignmentRecord) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}

/// Shared factory handing a private writer to each worker.
pub trait ReadWriterSupplier: Send + Sync {
    /// Safe to call concurrently from all workers.
    fn get_writer(&self) -> Result<Box<dyn ReadWriter>>;

    /// Close the underlying destination; called once, after every writer
    /// obtained from this supplier has been closed.
    fn close(&self) -> Result<()>;
}

/// An output format the registry can resolve.
pub trait FileFormat: Send + Sync {
    fn writer_supplier(
        &self,
        options: &RunOptions,
        index: Option<&Arc<GenomeIndex>>,
    ) -> Result<Box<dyn ReadWriterSupplier>>;
}

/// Maps an output file type to its format handler.
pub struct FormatRegistry {
    formats: Vec<(OutputFileType, Box<dyn FileFormat>)>,
}

impl FormatRegistry {
    pub fn new() -> Self {
        FormatRegistry { formats: Vec::new() }
    }

    /// Registry with the built-in formats.
    pub fn with_defaults() -> Self {
        let mut registry = FormatRegistry::new();
        registry.register(OutputFileType::Sam, Box::new(sam_writer::SamFormat));
        registry
    }

    pub fn register(&mut self, file_type: OutputFileType, format: Box<dyn FileFormat>) {
        self.formats.retain(|(t, _)| *t != file_type);
        self.formats.push((file_type, format));
    }

    pub fn resolve(&self, file_type: OutputFileType) -> Option<&dyn FileFormat> {
        self.formats
            .iter()
            .find(|(t, _)| *t == file_type)
            .map(|(_, f)| f.as_ref())
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
