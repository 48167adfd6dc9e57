// FASTQ input on top of bio::io::fastq, with gzip and stdin support.

use crate::input::{InputDescriptor, InputKind};
use crate::utils;
use anyhow::{Context as _, Result};
use bio::io::fastq;
use std::io::Read;
use std::path::Path;

pub struct FastqSource {
    records: fastq::Records<std::io::BufReader<Box<dyn Read + Send>>>,
}

impl FastqSource {
    /// Open the primary file of an input descriptor.
    pub fn open(input: &InputDescriptor) -> Result<Self> {
        Self::open_path(&input.path, input.kind)
    }

    /// Open the mate file of a paired input, if there is one.
    pub fn open_mate(input: &InputDescriptor) -> Result<Option<Self>> {
        match &input.second {
            Some(path) => Ok(Some(Self::open_path(path, input.kind)?)),
            None => Ok(None),
        }
    }

    pub fn open_path(path: &Path, kind: InputKind) -> Result<Self> {
        let reader = match kind {
            InputKind::FastqGz => utils::xzopen(path),
            InputKind::Fastq => utils::xopen(path),
        }
        .with_context(|| format!("error opening input file {}", path.display()))?;
        Ok(FastqSource {
            records: fastq::Reader::new(reader).records(),
        })
    }

    /// Next record, or `None` at end of input.
    pub fn next_record(&mut self) -> Option<Result<fastq::Record>> {
        self.records
            .next()
            .map(|r| r.map_err(|e| anyhow::anyhow!("malformed FASTQ record: {}", e)))
    }
}
