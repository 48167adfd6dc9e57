// Command-line resolution: raw tokens -> validated RunOptions.
//
// One left-to-right scan, no backtracking. The first two tokens (mode
// keyword, index directory) are consumed unconditionally; after that each
// position is offered to the input recognizer first and the option parser
// second. A bare comma ends the scan early so a caller can embed this parse
// inside a larger command line; the consumed-token count is returned for the
// same reason.

use crate::defaults::MAX_EDIT_DISTANCE;
use crate::input::{InputDescriptor, InputRecognizer};
use crate::run_opt::{OptionParser, RunOptions};
use anyhow::{bail, Result};

pub fn resolve(
    tokens: &[String],
    recognizer: &dyn InputRecognizer,
    parser: &dyn OptionParser,
) -> Result<(RunOptions, usize)> {
    if tokens.len() < 3 {
        bail!("too few arguments: expected <mode> <index-dir> <input file(s)> [<options>]");
    }

    let mut options = RunOptions::new(&tokens[1]);
    let mut inputs: Vec<InputDescriptor> = Vec::new();
    let mut stdin_seen = false;

    let mut i = 2;
    while i < tokens.len() {
        if tokens[i] == "," {
            i += 1; // consume the separator
            break;
        }

        if let Some((input, consumed)) = recognizer.try_parse(&tokens[i..]) {
            if input.is_stdio {
                if stdin_seen {
                    bail!("stdin ('-') specified for more than one input");
                }
                stdin_seen = true;
            }
            inputs.push(input); // command-line encounter order, preserved
            i += consumed;
            continue;
        }

        let parsed = parser.parse(tokens, i, &mut options)?;
        i += parsed.consumed;
        if parsed.done {
            break;
        }
    }

    if inputs.is_empty() {
        bail!("no input files specified");
    }
    if options.max_dist + options.extra_search_depth >= MAX_EDIT_DISTANCE {
        bail!(
            "max edit distance ({}) plus extra search depth ({}) must add up to less than {}",
            options.max_dist,
            options.extra_search_depth,
            MAX_EDIT_DISTANCE
        );
    }
    if options.max_secondary_edit_distance >= 0
        && options.max_secondary_edit_distance as u32 > options.extra_search_depth
    {
        bail!(
            "the edit-distance allowance for secondary alignments (-om {}) cannot exceed the extra search depth (-D {})",
            options.max_secondary_edit_distance,
            options.extra_search_depth
        );
    }

    options.inputs = inputs;
    Ok((options, i))
}
