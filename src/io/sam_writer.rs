// SAM output.
//
// The supplier owns a dedicated sink thread fed over a channel; writers hand
// it whole byte chunks, so the destination sees each chunk contiguously and
// the header chunk (enqueued before any worker writer exists) always lands
// first. Workers buffer locally and never contend on the hot path.

use crate::io::{
    AlignmentRecord, FileFormat, ReadWriter, ReadWriterSupplier, ReaderContext,
};
use crate::run_opt::RunOptions;
use anyhow::{anyhow, Context as _, Result};
use crossbeam_channel::{unbounded, Sender};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::sync::Arc;
use std::sync::Mutex;
use std::thread::JoinHandle;

pub struct SamFormat;

impl FileFormat for SamFormat {
    fn writer_supplier(
        &self,
        options: &RunOptions,
        _index: Option<&Arc<crate::index::GenomeIndex>>,
    ) -> Result<Box<dyn ReadWriterSupplier>> {
        let output = options
            .output_file
            .as_ref()
            .ok_or_else(|| anyhow!("no output file configured"))?;
        let sink: Box<dyn Write + Send> = if output.file_name == "-" {
            Box::new(io::stdout())
        } else {
            let file = File::create(&output.file_name)
                .with_context(|| format!("error creating output file {}", output.file_name))?;
            Box::new(BufWriter::new(file))
        };
        Ok(Box::new(SamWriterSupplier::new(sink)))
    }
}

struct SinkState {
    tx: Option<Sender<Vec<u8>>>,
    handle: Option<JoinHandle<io::Result<()>>>,
}

pub struct SamWriterSupplier {
    state: Mutex<SinkState>,
}

impl SamWriterSupplier {
    pub fn new(mut sink: Box<dyn Write + Send>) -> Self {
        let (tx, rx) = unbounded::<Vec<u8>>();
        let handle = std::thread::spawn(move || -> io::Result<()> {
            for chunk in rx {
                sink.write_all(&chunk)?;
            }
            sink.flush()
        });
        SamWriterSupplier {
            state: Mutex::new(SinkState {
                tx: Some(tx),
                handle: Some(handle),
            }),
        }
    }
}

impl ReadWriterSupplier for SamWriterSupplier {
    fn get_writer(&self) -> Result<Box<dyn ReadWriter>> {
        let state = self.state.lock().unwrap();
        let tx = state
            .tx
            .as_ref()
            .cloned()
            .ok_or_else(|| anyhow!("writer supplier already closed"))?;
        Ok(Box::new(SamReadWriter::new(tx)))
    }

    fn close(&self) -> Result<()> {
        let (tx, handle) = {
            let mut state = self.state.lock().unwrap();
            (state.tx.take(), state.handle.take())
        };
        drop(tx); // sink drains and exits once every writer clone is gone
        if let Some(handle) = handle {
            handle
                .join()
                .map_err(|_| anyhow!("output sink thread panicked"))?
                .context("error writing output")?;
        }
        Ok(())
    }
}

const CHUNK_SIZE: usize = 256 * 1024;

pub struct SamReadWriter {
    tx: Option<Sender<Vec<u8>>>,
    buf: Vec<u8>,
}

impl SamReadWriter {
    fn new(tx: Sender<Vec<u8>>) -> Self {
        SamReadWriter {
            tx: Some(tx),
            buf: Vec::with_capacity(CHUNK_SIZE),
        }
    }

    fn ship_chunk(&mut self) -> Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = std::mem::replace(&mut self.buf, Vec::with_capacity(CHUNK_SIZE));
        self.tx
            .as_ref()
            .ok_or_else(|| anyhow!("writer already closed"))?
            .send(chunk)
            .map_err(|_| anyhow!("output sink is gone"))
    }
}

impl ReadWriter for SamReadWriter {
    fn write_header(
        &mut self,
        context: &ReaderContext,
        sorted: bool,
        argv: &[String],
        version: &str,
        read_group_line: Option<&str>,
        omit_sq_lines: bool,
    ) -> Result<()> {
        let sort_order = if sorted { "coordinate" } else { "unsorted" };
        writeln!(self.buf, "@HD\tVN:1.5\tSO:{}", sort_order)?;

        if !omit_sq_lines {
            if let Some(index) = &context.index {
                for contig in &index.genome().contigs {
                    writeln!(self.buf, "@SQ\tSN:{}\tLN:{}", contig.name, contig.length)?;
                }
            }
        }

        writeln!(
            self.buf,
            "@PG\tID:rapid-align\tPN:rapid-align\tVN:{}\tCL:{}",
            version,
            argv.join(" ")
        )?;

        if let Some(rg_line) = read_group_line {
            // Accept both a full header line and just the tag fields.
            if rg_line.starts_with("@RG") {
                writeln!(self.buf, "{}", rg_line)?;
            } else {
                writeln!(self.buf, "@RG\t{}", rg_line)?;
            }
        }
        Ok(())
    }

    fn write_read(&mut self, record: &AlignmentRecord) -> Result<()> {
        self.buf.extend_from_slice(record.to_sam_line().as_bytes());
        self.buf.push(b'\n');
        if self.buf.len() >= CHUNK_SIZE {
            self.ship_chunk()?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.ship_chunk()?;
        self.tx = None;
        Ok(())
    }
}

impl Drop for SamReadWriter {
    fn drop(&mut self) {
        // Close flushes; a writer dropped without close loses nothing silently.
        let _ = self.ship_chunk();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{Contig, Genome, GenomeIndex};
    use crate::run_opt::ClippingMode;
    use std::sync::mpsc;

    struct CaptureSink {
        tx: mpsc::Sender<Vec<u8>>,
    }

    impl Write for CaptureSink {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            self.tx.send(data.to_vec()).ok();
            Ok(data.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn capture_supplier() -> (SamWriterSupplier, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel();
        (SamWriterSupplier::new(Box::new(CaptureSink { tx })), rx)
    }

    fn collect_output(rx: mpsc::Receiver<Vec<u8>>) -> String {
        let bytes: Vec<u8> = rx.into_iter().flatten().collect();
        String::from_utf8(bytes).unwrap()
    }

    fn reader_context() -> ReaderContext {
        let index = GenomeIndex::in_memory(
            Genome {
                base_count: 100,
                contigs: vec![Contig { name: "chr1".to_string(), length: 100 }],
            },
            20,
            Vec::new(),
        );
        ReaderContext {
            clipping: ClippingMode::ClipBack,
            default_read_group: "FASTQ".to_string(),
            index: Some(Arc::new(index)),
            ignore_secondary_alignments: false,
            ignore_supplementary_alignments: false,
        }
    }

    #[test]
    fn test_header_shape() {
        let (supplier, rx) = capture_supplier();
        let mut writer = supplier.get_writer().unwrap();
        writer
            .write_header(
                &reader_context(),
                false,
                &["single".to_string(), "idx".to_string()],
                "0.3.0",
                Some("ID:foo\tSM:bar"),
                false,
            )
            .unwrap();
        writer.close().unwrap();
        supplier.close().unwrap();

        let output = collect_output(rx);
        let lines: Vec<&str> = output.lines().collect();
        assert!(lines[0].starts_with("@HD\tVN:1.5\tSO:unsorted"));
        assert!(lines[1].starts_with("@SQ\tSN:chr1\tLN:100"));
        assert!(lines[2].starts_with("@PG\t"));
        assert!(lines[2].contains("CL:single idx"));
        assert_eq!(lines[3], "@RG\tID:foo\tSM:bar");
    }

    #[test]
    fn test_header_omits_sq_lines_when_asked() {
        let (supplier, rx) = capture_supplier();
        let mut writer = supplier.get_writer().unwrap();
        writer
            .write_header(&reader_context(), true, &[], "0.3.0", None, true)
            .unwrap();
        writer.close().unwrap();
        supplier.close().unwrap();

        let output = collect_output(rx);
        assert!(output.contains("SO:coordinate"));
        assert!(!output.contains("@SQ"));
    }

    #[test]
    fn test_header_precedes_worker_records() {
        let (supplier, rx) = capture_supplier();

        let mut header_writer = supplier.get_writer().unwrap();
        header_writer
            .write_header(&reader_context(), false, &[], "0.3.0", None, false)
            .unwrap();
        header_writer.close().unwrap();

        // Concurrent workers, one private writer each.
        let supplier = Arc::new(supplier);
        let mut handles = Vec::new();
        for t in 0..4 {
            let supplier = Arc::clone(&supplier);
            handles.push(std::thread::spawn(move || {
                let mut writer = supplier.get_writer().unwrap();
                for r in 0..10 {
                    let record =
                        AlignmentRecord::unmapped(&format!("t{}r{}", t, r), b"ACGT", "IIII");
                    writer.write_read(&record).unwrap();
                }
                writer.close().unwrap();
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        supplier.close().unwrap();

        let output = collect_output(rx);
        let lines: Vec<&str> = output.lines().collect();
        assert!(lines[0].starts_with("@HD"), "header first, got: {}", lines[0]);
        let body_start = lines.iter().position(|l| !l.starts_with('@')).unwrap();
        // Every record line is intact (no interleaving inside a line).
        assert_eq!(lines.len() - body_start, 40);
        for line in &lines[body_start..] {
            assert_eq!(line.split('\t').count(), 11);
        }
    }

    #[test]
    fn test_get_writer_after_close_fails() {
        let (supplier, _rx) = capture_supplier();
        supplier.close().unwrap();
        assert!(supplier.get_writer().is_err());
    }
}
