// The alignment-engine seam and the input/output-only engine.
//
// The context brackets each iteration's search between begin_iteration and
// finish_iteration and fans the engine out over the worker pool; the engine
// is the sole producer of per-thread stats and output records during the
// pass. The seed-and-extend search plugs in behind this trait; the engine
// shipped here is the passthrough used when no index is resident.

use crate::input::InputDescriptor;
use crate::io::fastq_reader::FastqSource;
use crate::io::{sam_flags, AlignmentRecord, ReadWriter, ReaderContext};
use crate::run_opt::{ClippingMode, RunOptions};
use crate::stats::RunStats;
use anyhow::{bail, Result};
use std::time::Instant;

/// Option values frozen at the top of an iteration. A future pass could vary
/// them; nothing after begin_iteration reads the live options for these.
#[derive(Debug, Clone, Copy, Default)]
pub struct IterationSnapshot {
    pub max_hits: u32,
    pub max_dist: u32,
    pub num_seeds_from_command_line: u32,
    pub seed_coverage: f64,
    pub min_weight_to_check: u32,
    pub clipping: ClippingMode,
    pub num_threads: usize,
    pub bind_to_processors: bool,
}

/// Everything one worker thread sees: shared configuration by reference,
/// private stats and writer by mutable reference.
pub struct ThreadContext<'a> {
    pub thread_index: usize,
    pub num_threads: usize,
    pub options: &'a RunOptions,
    pub snapshot: &'a IterationSnapshot,
    pub reader_context: &'a ReaderContext,
    pub inputs: &'a [InputDescriptor],
    pub stats: &'a mut RunStats,
    pub writer: Option<&'a mut (dyn ReadWriter + 'static)>,
}

impl<'a> ThreadContext<'a> {
    /// The inputs this worker owns: every num_threads-th file, starting at
    /// the worker's own index. The iterator borrows the input list, not the
    /// context, so the context stays free for the per-read hot path.
    pub fn partition(&self) -> impl Iterator<Item = &'a InputDescriptor> {
        let stride = self.num_threads.max(1);
        self.inputs.iter().skip(self.thread_index).step_by(stride)
    }
}

pub trait AlignmentEngine: Send + Sync {
    fn run_thread(&self, tctx: &mut ThreadContext<'_>) -> Result<()>;
}

/// Streams input records straight to the output without searching. This is
/// the engine for runs with the no-index marker as the index directory.
pub struct PassthroughEngine;

impl AlignmentEngine for PassthroughEngine {
    fn run_thread(&self, tctx: &mut ThreadContext<'_>) -> Result<()> {
        let partition: Vec<&InputDescriptor> = tctx.partition().collect();
        for input in partition {
            copy_input(input, tctx)?;
        }
        Ok(())
    }
}

fn copy_input(input: &InputDescriptor, tctx: &mut ThreadContext<'_>) -> Result<()> {
    let mut source = FastqSource::open(input)?;
    let mut mate_source = FastqSource::open_mate(input)?;
    let min_len = tctx.options.min_read_length as usize;

    loop {
        let started = tctx.stats.time_histogram.is_some().then(Instant::now);

        let record = match source.next_record() {
            Some(r) => r?,
            None => break,
        };
        let mate = match mate_source.as_mut() {
            Some(mate_source) => match mate_source.next_record() {
                Some(r) => Some(r?),
                None => bail!(
                    "paired input {} ran out of mates before {}",
                    input.second.as_ref().unwrap().display(),
                    input.path.display()
                ),
            },
            None => None,
        };

        if let Some(mate) = &mate {
            let pair_flags = sam_flags::PAIRED | sam_flags::MATE_UNMAPPED;
            emit(&record, pair_flags | sam_flags::FIRST_IN_PAIR, min_len, tctx)?;
            emit(mate, pair_flags | sam_flags::SECOND_IN_PAIR, min_len, tctx)?;
        } else {
            emit(&record, 0, min_len, tctx)?;
        }

        if let Some(started) = started {
            let nanos = started.elapsed().as_nanos() as u64;
            if let Some(hist) = tctx.stats.time_histogram.as_mut() {
                hist.record(nanos);
            }
        }
    }

    // A leftover mate record means the files were truncated unevenly.
    if let Some(mate_source) = mate_source.as_mut() {
        if mate_source.next_record().is_some() {
            bail!(
                "paired input {} has more reads than {}",
                input.second.as_ref().unwrap().display(),
                input.path.display()
            );
        }
    }
    Ok(())
}

fn emit(
    record: &bio::io::fastq::Record,
    extra_flags: u16,
    min_len: usize,
    tctx: &mut ThreadContext<'_>,
) -> Result<()> {
    tctx.stats.total_reads += 1;
    if record.seq().len() >= min_len {
        tctx.stats.useful_reads += 1;
        // Nothing is searched, so every useful read goes out unplaced.
        tctx.stats.not_found += 1;
    }

    if let Some(writer) = tctx.writer.as_mut() {
        let mut out = AlignmentRecord::unmapped(
            record.id(),
            record.seq(),
            std::str::from_utf8(record.qual()).unwrap_or(""),
        );
        out.flag |= extra_flags;
        out.add_tag("RG", format!("Z:{}", tctx.reader_context.default_read_group));
        writer.write_read(&out)?;
    }
    Ok(())
}
