// Run options and their command-line parsing.
//
// RunOptions is the validated configuration for one invocation. It is built
// by the command-line resolver and never mutated afterwards; the aligner
// context snapshots the per-iteration subset at the top of every pass.

use crate::defaults;
use crate::input::InputDescriptor;
use anyhow::{bail, Result};
use std::path::PathBuf;
use std::str::FromStr;

/// Read-clipping mode, front ('+' leading) and back ('+' trailing).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClippingMode {
    ClipFrontAndBack,
    ClipFront,
    #[default]
    ClipBack,
    NoClipping,
}

impl ClippingMode {
    /// Parse the two-character form used by `-C`: '+' clips, 'x' doesn't,
    /// front first ("+x" clips the front only).
    pub fn from_spec(spec: &str) -> Result<Self> {
        match spec {
            "++" => Ok(ClippingMode::ClipFrontAndBack),
            "+x" => Ok(ClippingMode::ClipFront),
            "x+" => Ok(ClippingMode::ClipBack),
            "xx" => Ok(ClippingMode::NoClipping),
            _ => bail!("invalid clipping specifier '{}' (expected ++, +x, x+ or xx)", spec),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFileType {
    Sam,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    pub file_name: String,
    pub file_type: OutputFileType,
}

impl OutputFile {
    /// Classify an output destination by suffix; "-" is SAM on stdout.
    pub fn from_name(name: &str) -> Result<Self> {
        if name == "-" || name.ends_with(".sam") {
            Ok(OutputFile {
                file_name: name.to_string(),
                file_type: OutputFileType::Sam,
            })
        } else {
            bail!("unrecognized output format for '{}' (expected a .sam path or '-')", name)
        }
    }
}

/// Validated configuration for one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub index_dir: String,
    pub inputs: Vec<InputDescriptor>,
    pub output_file: Option<OutputFile>,

    pub num_threads: usize,
    pub max_hits: u32,
    pub max_dist: u32,
    pub extra_search_depth: u32,
    pub num_seeds_from_command_line: u32,
    pub seed_coverage: f64,
    pub min_weight_to_check: u32,

    /// Extra edit distance allowed for secondary alignments; negative
    /// disables secondary reporting.
    pub max_secondary_edit_distance: i32,
    pub max_secondary_alignments: u32,

    pub min_read_length: u32,
    pub clipping: ClippingMode,
    pub default_read_group: String,
    pub read_group_line: Option<String>,

    pub sort_output: bool,
    pub omit_sq_lines: bool,
    pub no_ukkonen: bool,
    pub no_ordered_evaluation: bool,
    pub no_truncation: bool,
    pub ignore_secondary_alignments: bool,
    pub bind_to_processors: bool,
    pub time_histogram: bool,

    pub map_index: bool,
    pub prefetch_index: bool,

    pub perf_file_name: Option<PathBuf>,
    pub verbosity: u8,
}

impl RunOptions {
    pub fn new(index_dir: &str) -> Self {
        RunOptions {
            index_dir: index_dir.to_string(),
            inputs: Vec::new(),
            output_file: None,
            num_threads: num_cpus::get(),
            max_hits: defaults::MAX_HITS,
            max_dist: defaults::MAX_DIST,
            extra_search_depth: defaults::EXTRA_SEARCH_DEPTH,
            num_seeds_from_command_line: defaults::NUM_SEEDS,
            seed_coverage: defaults::SEED_COVERAGE,
            min_weight_to_check: defaults::MIN_WEIGHT_TO_CHECK,
            max_secondary_edit_distance: defaults::MAX_SECONDARY_EDIT_DISTANCE,
            max_secondary_alignments: defaults::MAX_SECONDARY_ALIGNMENTS,
            min_read_length: defaults::MIN_READ_LENGTH,
            clipping: ClippingMode::default(),
            default_read_group: defaults::DEFAULT_READ_GROUP.to_string(),
            read_group_line: None,
            sort_output: false,
            omit_sq_lines: false,
            no_ukkonen: false,
            no_ordered_evaluation: false,
            no_truncation: false,
            ignore_secondary_alignments: false,
            bind_to_processors: false,
            time_histogram: false,
            map_index: false,
            prefetch_index: false,
            perf_file_name: None,
            verbosity: defaults::VERBOSITY,
        }
    }
}

/// Outcome of one option-parser step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parsed {
    pub consumed: usize,
    pub done: bool,
}

/// Consumes option tokens inside the resolver's scan.
pub trait OptionParser {
    /// Parse the option starting at `tokens[i]`. Returns how many tokens
    /// were consumed and whether the scan should stop; an unrecognized or
    /// malformed option is an error naming the offending token.
    fn parse(&self, tokens: &[String], i: usize, options: &mut RunOptions) -> Result<Parsed>;
}

pub struct DefaultOptionParser;

fn value_arg<'a>(tokens: &'a [String], i: usize, option: &str) -> Result<&'a str> {
    match tokens.get(i + 1) {
        Some(v) => Ok(v),
        None => bail!("option '{}' requires a value", option),
    }
}

fn num_arg<T: FromStr>(tokens: &[String], i: usize, option: &str) -> Result<T> {
    let raw = value_arg(tokens, i, option)?;
    raw.parse::<T>()
        .map_err(|_| anyhow::anyhow!("invalid value '{}' for option '{}'", raw, option))
}

impl OptionParser for DefaultOptionParser {
    fn parse(&self, tokens: &[String], i: usize, options: &mut RunOptions) -> Result<Parsed> {
        let one = Parsed { consumed: 1, done: false };
        let two = Parsed { consumed: 2, done: false };

        match tokens[i].as_str() {
            "," => Ok(Parsed { consumed: 1, done: true }),
            "-o" => {
                options.output_file = Some(OutputFile::from_name(value_arg(tokens, i, "-o")?)?);
                Ok(two)
            }
            "-t" => {
                let threads: usize = num_arg(tokens, i, "-t")?;
                if threads == 0 {
                    bail!("thread count must be at least 1");
                }
                options.num_threads = threads;
                Ok(two)
            }
            "-d" => {
                options.max_dist = num_arg(tokens, i, "-d")?;
                Ok(two)
            }
            "-n" => {
                options.max_hits = num_arg(tokens, i, "-n")?;
                Ok(two)
            }
            "-D" => {
                options.extra_search_depth = num_arg(tokens, i, "-D")?;
                Ok(two)
            }
            "-om" => {
                options.max_secondary_edit_distance = num_arg(tokens, i, "-om")?;
                Ok(two)
            }
            "-omax" => {
                options.max_secondary_alignments = num_arg(tokens, i, "-omax")?;
                Ok(two)
            }
            "-mrl" => {
                options.min_read_length = num_arg(tokens, i, "-mrl")?;
                Ok(two)
            }
            "-ns" => {
                options.num_seeds_from_command_line = num_arg(tokens, i, "-ns")?;
                Ok(two)
            }
            "-sc" => {
                options.seed_coverage = num_arg(tokens, i, "-sc")?;
                Ok(two)
            }
            "-mwc" => {
                options.min_weight_to_check = num_arg(tokens, i, "-mwc")?;
                Ok(two)
            }
            "-C" => {
                options.clipping = ClippingMode::from_spec(value_arg(tokens, i, "-C")?)?;
                Ok(two)
            }
            "-R" => {
                options.read_group_line = Some(value_arg(tokens, i, "-R")?.to_string());
                Ok(two)
            }
            "-rg" => {
                options.default_read_group = value_arg(tokens, i, "-rg")?.to_string();
                Ok(two)
            }
            "-pf" => {
                options.perf_file_name = Some(PathBuf::from(value_arg(tokens, i, "-pf")?));
                Ok(two)
            }
            "-v" => {
                options.verbosity = num_arg(tokens, i, "-v")?;
                Ok(two)
            }
            "-so" => {
                options.sort_output = true;
                Ok(one)
            }
            "-nsq" => {
                options.omit_sq_lines = true;
                Ok(one)
            }
            "-nu" => {
                options.no_ukkonen = true;
                Ok(one)
            }
            "-no" => {
                options.no_ordered_evaluation = true;
                Ok(one)
            }
            "-nt" => {
                options.no_truncation = true;
                Ok(one)
            }
            "-is" => {
                options.ignore_secondary_alignments = true;
                Ok(one)
            }
            "-b" => {
                options.bind_to_processors = true;
                Ok(one)
            }
            "-th" => {
                options.time_histogram = true;
                Ok(one)
            }
            "-map" => {
                options.map_index = true;
                Ok(one)
            }
            "-pre" => {
                options.prefetch_index = true;
                Ok(one)
            }
            other => bail!("unrecognized option '{}'", other),
        }
    }
}

/// Usage text printed alongside resolver diagnostics.
pub fn usage(paired: bool) -> String {
    let mode = if paired { "paired" } else { "single" };
    format!(
        "Usage: rapid-align {mode} <index-dir> <input file(s)> [<options>]\n\
         where <input file(s)> is a list of files to process, or '-' for stdin.\n\
         \n\
         Options:\n\
         \x20 -o FILE    output file (.sam, or '-' for stdout)\n\
         \x20 -t INT     number of worker threads\n\
         \x20 -d INT     maximum edit distance\n\
         \x20 -n INT     maximum seed hits to consider\n\
         \x20 -D INT     extra search depth beyond the best score\n\
         \x20 -om INT    extra edit distance allowed for secondary alignments\n\
         \x20 -omax INT  maximum number of secondary alignments\n\
         \x20 -mrl INT   minimum read length to attempt aligning\n\
         \x20 -ns INT    number of seeds to check per read\n\
         \x20 -sc FLOAT  seed coverage (overrides -ns)\n\
         \x20 -mwc INT   minimum candidate weight to check\n\
         \x20 -C SPEC    clipping mode: ++, +x, x+ or xx\n\
         \x20 -R STR     read group header line\n\
         \x20 -rg STR    default read group for records without one\n\
         \x20 -pf FILE   append per-iteration performance lines to FILE\n\
         \x20 -so        sort output by alignment location\n\
         \x20 -nsq       omit @SQ lines from the output header\n\
         \x20 -nu        disable the banded edit-distance cutoff\n\
         \x20 -no        disable ordered candidate evaluation\n\
         \x20 -nt        disable read truncation\n\
         \x20 -is        ignore secondary alignments in the input\n\
         \x20 -b         bind worker threads to processors\n\
         \x20 -th        collect a per-read alignment time histogram\n\
         \x20 -map       memory-map the index instead of loading it\n\
         \x20 -pre       prefetch the mapped index\n\
         \x20 -v INT     verbosity (1=error .. 4=debug)\n\
         \x20 ,          end of this option group\n"
    )
}
