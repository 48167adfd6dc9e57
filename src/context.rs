// The aligner context: the state machine that drives a run.
//
// One control thread walks Uninitialized -> Initialized ->
// (IterationInProgress <-> IterationComplete) -> Done. The run_task phase
// fans out to a fixed worker pool; each worker runs the thread triple
// initialize_thread / run_thread / finish_thread against the shared
// configuration, owning its stats and writer privately the whole time.

use crate::engine::{AlignmentEngine, IterationSnapshot, ThreadContext};
use crate::extension::AlignerExtension;
use crate::index::{GenomeIndex, IndexCache, IndexMapMode, PrefetchMode};
use crate::io::{FormatRegistry, ReadWriter, ReadWriterSupplier, ReaderContext};
use crate::run_opt::RunOptions;
use crate::stats::{percent, RunStats, TIME_BUCKETS};
use anyhow::{anyhow, bail, Context as _, Result};
use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Uninitialized,
    Initialized,
    IterationInProgress,
    IterationComplete,
    Done,
}

pub struct AlignerContext {
    options: RunOptions,
    argv: Vec<String>,
    version: String,
    engine: Arc<dyn AlignmentEngine>,
    registry: FormatRegistry,
    extension: Box<dyn AlignerExtension>,

    index: Option<Arc<GenomeIndex>>,
    pool: Option<rayon::ThreadPool>,
    perf_log: Option<File>,
    stats: RunStats,
    snapshot: IterationSnapshot,
    reader_context: Option<ReaderContext>,
    writer_supplier: Option<Arc<dyn ReadWriterSupplier>>,
    align_time_ms: i64,
    state: RunState,
}

/// One worker's private state for the duration of its thread.
struct ThreadState {
    stats: RunStats,
    writer: Option<Box<dyn ReadWriter>>,
    extension: Box<dyn AlignerExtension>,
}

impl AlignerContext {
    pub fn new(
        options: RunOptions,
        argv: Vec<String>,
        version: String,
        engine: Arc<dyn AlignmentEngine>,
        registry: FormatRegistry,
        extension: Box<dyn AlignerExtension>,
    ) -> Self {
        AlignerContext {
            options,
            argv,
            version,
            engine,
            registry,
            extension,
            index: None,
            pool: None,
            perf_log: None,
            stats: RunStats::default(),
            snapshot: IterationSnapshot::default(),
            reader_context: None,
            writer_supplier: None,
            align_time_ms: 0,
            state: RunState::Uninitialized,
        }
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn align_time_ms(&self) -> i64 {
        self.align_time_ms
    }

    pub fn index_handle(&self) -> Option<&Arc<GenomeIndex>> {
        self.index.as_ref()
    }

    /// Top-level driver: one full alignment run.
    pub fn run(&mut self, cache: &mut IndexCache) -> Result<()> {
        self.initialize(cache)?;
        self.extension.initialize();

        if !self.extension.skip_alignment() {
            self.print_stats_header();
            loop {
                self.begin_iteration()?;
                self.run_task()?;
                self.finish_iteration()?;
                self.print_stats();
                if !self.next_iteration() {
                    break;
                }
            }
        } else {
            self.state = RunState::Done;
        }

        self.extension.finish_alignment();
        Ok(())
    }

    /// Acquire the index, open the perf log, build the worker pool.
    pub fn initialize(&mut self, cache: &mut IndexCache) -> Result<()> {
        assert_eq!(self.state, RunState::Uninitialized, "initialize called twice");

        let map_mode = if self.options.map_index {
            IndexMapMode::MemoryMap
        } else {
            IndexMapMode::Load
        };
        let prefetch = if self.options.prefetch_index {
            PrefetchMode::WillNeed
        } else {
            PrefetchMode::Off
        };
        self.index = cache.acquire(&self.options.index_dir, map_mode, prefetch)?;

        if let Some(index) = &self.index {
            if self.options.min_read_length < index.seed_length() {
                bail!(
                    "the min read length ({}) must be at least the seed length ({}), \
                     or there's no hope of aligning reads that short",
                    self.options.min_read_length,
                    index.seed_length()
                );
            }
        }

        if let Some(path) = &self.options.perf_file_name {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("unable to open perf file '{}'", path.display()))?;
            self.perf_log = Some(file);
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.num_threads)
            .thread_name(|i| format!("align-worker-{}", i))
            .build()
            .context("failed to build worker thread pool")?;
        self.pool = Some(pool);

        self.state = RunState::Initialized;
        Ok(())
    }

    fn print_stats_header(&self) {
        eprintln!("MaxHits\tMaxDist\t%Used\t%Unique\t%Multi\t%!Found\t%Pairs\tlvCalls\tNumReads\tReads/s");
    }

    /// Reset per-iteration state, snapshot the options, set up the output.
    pub fn begin_iteration(&mut self) -> Result<()> {
        assert!(
            matches!(self.state, RunState::Initialized | RunState::IterationComplete),
            "begin_iteration out of order"
        );

        self.writer_supplier = None;
        self.snapshot = IterationSnapshot {
            max_hits: self.options.max_hits,
            max_dist: self.options.max_dist,
            num_seeds_from_command_line: self.options.num_seeds_from_command_line,
            seed_coverage: self.options.seed_coverage,
            min_weight_to_check: self.options.min_weight_to_check,
            clipping: self.options.clipping,
            num_threads: self.options.num_threads,
            bind_to_processors: self.options.bind_to_processors,
        };

        // Fresh stats every iteration; totals never leak across passes.
        self.stats = RunStats::new(self.options.time_histogram);
        self.stats.extra = self.extension.extra_stats();
        self.extension.begin_iteration();

        self.reader_context = Some(ReaderContext {
            clipping: self.options.clipping,
            default_read_group: self.options.default_read_group.clone(),
            index: self.index.clone(),
            ignore_secondary_alignments: self.options.ignore_secondary_alignments,
            // Not split out from secondary suppression yet.
            ignore_supplementary_alignments: self.options.ignore_secondary_alignments,
        });

        if let Some(output) = &self.options.output_file {
            let format = self.registry.resolve(output.file_type).ok_or_else(|| {
                // Unreachable through the shipped option parser, which
                // rejects unknown output suffixes at resolution time.
                anyhow!(
                    "unknown output file type {:?} for '{}'",
                    output.file_type,
                    output.file_name
                )
            })?;
            let supplier: Arc<dyn ReadWriterSupplier> =
                Arc::from(format.writer_supplier(&self.options, self.index.as_ref())?);

            // The header goes through a transient writer, closed before any
            // worker obtains one, so header and body never interleave.
            let mut header_writer = supplier.get_writer()?;
            header_writer.write_header(
                self.reader_context.as_ref().unwrap(),
                self.options.sort_output,
                &self.argv,
                &self.version,
                self.options.read_group_line.as_deref(),
                self.options.omit_sq_lines,
            )?;
            header_writer.close()?;
            drop(header_writer);

            self.writer_supplier = Some(supplier);
        }

        self.state = RunState::IterationInProgress;
        Ok(())
    }

    /// Fan the engine out over the worker pool and merge the results.
    pub fn run_task(&mut self) -> Result<()> {
        assert_eq!(self.state, RunState::IterationInProgress, "run_task out of order");

        let task_start = Instant::now();
        let results: Vec<Result<RunStats>> = {
            let shared: &AlignerContext = self;
            let pool = shared.pool.as_ref().expect("initialize builds the pool");
            pool.broadcast(|worker| shared.worker_thread(worker.index(), worker.num_threads()))
        };
        let align_time_ms = task_start.elapsed().as_millis() as i64;

        for result in results {
            let thread_stats = result?;
            self.finish_thread(thread_stats);
        }

        // The task's own timing is what reporting uses; a wall clock around
        // begin/finish would fold setup overhead into the reads/s figure.
        self.align_time_ms = align_time_ms;
        Ok(())
    }

    fn worker_thread(&self, thread_index: usize, num_threads: usize) -> Result<RunStats> {
        let mut state = self.initialize_thread()?;
        self.run_thread(&mut state, thread_index, num_threads)?;
        Ok(state.stats)
    }

    /// Private stats, a private writer from the shared supplier, and a
    /// thread-private extension copy.
    fn initialize_thread(&self) -> Result<ThreadState> {
        let extension = self.extension.copy();
        let mut stats = RunStats::new(self.options.time_histogram);
        stats.extra = extension.extra_stats();
        let writer = match &self.writer_supplier {
            Some(supplier) => Some(supplier.get_writer()?),
            None => None,
        };
        Ok(ThreadState { stats, writer, extension })
    }

    fn run_thread(
        &self,
        state: &mut ThreadState,
        thread_index: usize,
        num_threads: usize,
    ) -> Result<()> {
        state.extension.begin_thread();
        {
            let mut tctx = ThreadContext {
                thread_index,
                num_threads,
                options: &self.options,
                snapshot: &self.snapshot,
                reader_context: self.reader_context.as_ref().expect("begin_iteration ran"),
                inputs: &self.options.inputs,
                stats: &mut state.stats,
                writer: state.writer.as_deref_mut(),
            };
            self.engine.run_thread(&mut tctx)?;
        }
        // The writer handle's lifetime stays inside this thread's run.
        if let Some(mut writer) = state.writer.take() {
            writer.close()?;
        }
        state.extension.finish_thread();
        Ok(())
    }

    fn finish_thread(&mut self, thread_stats: RunStats) {
        self.stats.add(thread_stats);
    }

    /// Tear down the iteration's output and record its elapsed time.
    pub fn finish_iteration(&mut self) -> Result<()> {
        assert_eq!(self.state, RunState::IterationInProgress, "finish_iteration out of order");

        self.extension.finish_iteration();
        if let Some(supplier) = self.writer_supplier.take() {
            supplier.close()?;
        }

        self.state = RunState::IterationComplete;
        Ok(())
    }

    /// Whether to run another pass. Vestige of parameter-range sweeps; kept
    /// as an extension point and always false.
    pub fn next_iteration(&mut self) -> bool {
        assert_eq!(self.state, RunState::IterationComplete, "next_iteration out of order");
        self.state = RunState::Done;
        false
    }

    /// One status line per iteration, plus the optional perf-log line.
    /// Reporting failures never fail the run.
    pub fn print_stats(&mut self) {
        let useful = self.stats.useful_reads.max(1);
        let elapsed = self.align_time_ms.max(1);
        let reads_per_sec = 1000.0 * useful as f64 / elapsed as f64;

        eprintln!(
            "{}\t{}\t{:.2}%\t{:.2}%\t{:.2}%\t{:.2}%\t{:.2}%\t{}\t{}\t{:.0} (at: {} ms)",
            self.snapshot.max_hits,
            self.snapshot.max_dist,
            percent(self.stats.useful_reads, self.stats.total_reads),
            percent(self.stats.single_hits, useful),
            percent(self.stats.multi_hits, useful),
            percent(self.stats.not_found, useful),
            percent(self.stats.aligned_as_pairs, useful),
            self.stats.lv_calls,
            self.stats.total_reads,
            reads_per_sec,
            self.align_time_ms,
        );

        if let Some(perf) = self.perf_log.as_mut() {
            // Historical perf column order: lvCalls before %Pairs, no
            // elapsed column; iterations separated by a blank line.
            let line = format!(
                "{}\t{}\t{:.2}%\t{:.2}%\t{:.2}%\t{:.2}%\t{}\t{:.2}%\t{}\t{:.0}\n\n",
                self.snapshot.max_hits,
                self.snapshot.max_dist,
                percent(self.stats.useful_reads, self.stats.total_reads),
                percent(self.stats.single_hits, useful),
                percent(self.stats.multi_hits, useful),
                percent(self.stats.not_found, useful),
                self.stats.lv_calls,
                percent(self.stats.aligned_as_pairs, useful),
                self.stats.total_reads,
                reads_per_sec,
            );
            if let Err(e) = perf.write_all(line.as_bytes()) {
                log::warn!("failed to append to perf log: {}", e);
            }
        }

        if let Some(hist) = &self.stats.time_histogram {
            eprintln!("Per-read alignment time histogram:");
            eprintln!("log2(ns)\tcount\ttotal time (ns)");
            for bucket in 0..TIME_BUCKETS {
                eprintln!("{}\t{}\t{}", bucket, hist.counts[bucket], hist.total_nanos[bucket]);
            }
        }

        if let Some(extra) = &self.stats.extra {
            extra.print();
        }
        self.extension.print_stats();
    }
}
