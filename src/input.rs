// Input-file descriptors and their recognition on the command line.
//
// The resolver walks the raw tokens and, at each position, first asks a
// recognizer whether the token window starts with an input file. A
// recognized descriptor may claim trailing tokens (a paired FASTQ input
// claims the mate file that follows it).

use std::path::PathBuf;

/// Marker token selecting standard input.
pub const STDIN_MARKER: &str = "-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Fastq,
    FastqGz,
}

/// One input source, in command-line order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDescriptor {
    pub kind: InputKind,
    pub path: PathBuf,
    /// Mate file for a paired FASTQ input.
    pub second: Option<PathBuf>,
    pub is_stdio: bool,
}

impl InputDescriptor {
    pub fn is_paired(&self) -> bool {
        self.second.is_some()
    }
}

/// Recognizes input-file tokens inside a larger command line.
pub trait InputRecognizer {
    /// Try to parse an input descriptor at the start of `window`, returning
    /// the descriptor and the number of tokens it consumed.
    fn try_parse(&self, window: &[String]) -> Option<(InputDescriptor, usize)>;
}

fn fastq_kind(token: &str) -> Option<InputKind> {
    if token.ends_with(".fq.gz") || token.ends_with(".fastq.gz") {
        Some(InputKind::FastqGz)
    } else if token.ends_with(".fq") || token.ends_with(".fastq") {
        Some(InputKind::Fastq)
    } else {
        None
    }
}

/// Suffix-based recognizer; in paired mode a FASTQ token claims the FASTQ
/// token that follows it as the mate file.
pub struct ExtensionRecognizer {
    paired: bool,
}

impl ExtensionRecognizer {
    pub fn new(paired: bool) -> Self {
        ExtensionRecognizer { paired }
    }
}

impl InputRecognizer for ExtensionRecognizer {
    fn try_parse(&self, window: &[String]) -> Option<(InputDescriptor, usize)> {
        let first = window.first()?;

        if first == STDIN_MARKER {
            // Stdin carries interleaved pairs in paired mode; one token.
            return Some((
                InputDescriptor {
                    kind: InputKind::Fastq,
                    path: PathBuf::from(STDIN_MARKER),
                    second: None,
                    is_stdio: true,
                },
                1,
            ));
        }

        let kind = fastq_kind(first)?;
        if self.paired {
            let second = window.get(1)?;
            fastq_kind(second)?;
            Some((
                InputDescriptor {
                    kind,
                    path: PathBuf::from(first),
                    second: Some(PathBuf::from(second)),
                    is_stdio: false,
                },
                2,
            ))
        } else {
            Some((
                InputDescriptor {
                    kind,
                    path: PathBuf::from(first),
                    second: None,
                    is_stdio: false,
                },
                1,
            ))
        }
    }
}
