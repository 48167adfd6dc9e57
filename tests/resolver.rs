// Command-line resolution driven through the public API, including the
// injectable recognizer/parser seams.

use anyhow::Result;
use rapid_align::cmdline::resolve;
use rapid_align::defaults::MAX_EDIT_DISTANCE;
use rapid_align::input::{ExtensionRecognizer, InputDescriptor, InputKind, InputRecognizer};
use rapid_align::run_opt::{DefaultOptionParser, OptionParser, Parsed, RunOptions};
use std::path::PathBuf;

fn tokens(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[test]
fn inputs_materialize_in_command_order() {
    let toks = tokens(&["single", "idx", "fileA.fq", "fileB.fq", "-t", "2", "fileC.fq"]);
    let (options, _) =
        resolve(&toks, &ExtensionRecognizer::new(false), &DefaultOptionParser).unwrap();
    let paths: Vec<&str> = options
        .inputs
        .iter()
        .map(|d| d.path.to_str().unwrap())
        .collect();
    assert_eq!(paths, ["fileA.fq", "fileB.fq", "fileC.fq"]);
}

#[test]
fn one_stdin_input_is_fine_two_are_not() {
    let ok = tokens(&["single", "idx", "-", "a.fq"]);
    assert!(resolve(&ok, &ExtensionRecognizer::new(false), &DefaultOptionParser).is_ok());

    let bad = tokens(&["single", "idx", "-", "-"]);
    let err = resolve(&bad, &ExtensionRecognizer::new(false), &DefaultOptionParser).unwrap_err();
    assert!(err.to_string().contains("stdin"));
}

#[test]
fn edit_distance_sum_bound_is_enforced() {
    let extra = (MAX_EDIT_DISTANCE - 20).to_string();
    let over = tokens(&["single", "idx", "a.fq", "-d", "30", "-D", &extra]);
    assert!(resolve(&over, &ExtensionRecognizer::new(false), &DefaultOptionParser).is_err());

    let under = tokens(&["single", "idx", "a.fq", "-d", "28", "-D", "2"]);
    let (options, _) =
        resolve(&under, &ExtensionRecognizer::new(false), &DefaultOptionParser).unwrap();
    assert_eq!(options.max_dist + options.extra_search_depth, MAX_EDIT_DISTANCE - 1);
}

// A recognizer that treats any token ending in ".dat" as an input claiming
// one trailing token, exercising the multi-token-claim contract.
struct DatRecognizer;

impl InputRecognizer for DatRecognizer {
    fn try_parse(&self, window: &[String]) -> Option<(InputDescriptor, usize)> {
        let first = window.first()?;
        if !first.ends_with(".dat") {
            return None;
        }
        window.get(1)?;
        Some((
            InputDescriptor {
                kind: InputKind::Fastq,
                path: PathBuf::from(first),
                second: Some(PathBuf::from(&window[1])),
                is_stdio: false,
            },
            2,
        ))
    }
}

struct LongOptionParser;

impl OptionParser for LongOptionParser {
    fn parse(&self, tokens: &[String], i: usize, options: &mut RunOptions) -> Result<Parsed> {
        match tokens[i].as_str() {
            "--threads" => {
                options.num_threads = tokens[i + 1].parse()?;
                Ok(Parsed { consumed: 2, done: false })
            }
            "--stop" => Ok(Parsed { consumed: 1, done: true }),
            other => anyhow::bail!("unrecognized option '{}'", other),
        }
    }
}

#[test]
fn injected_collaborators_drive_the_scan() {
    let toks = tokens(&[
        "single", "idx", "a.dat", "trailer1", "--threads", "6", "b.dat", "trailer2", "--stop",
        "ignored",
    ]);
    let (options, consumed) = resolve(&toks, &DatRecognizer, &LongOptionParser).unwrap();

    assert_eq!(options.inputs.len(), 2);
    assert_eq!(options.inputs[0].second, Some(PathBuf::from("trailer1")));
    assert_eq!(options.num_threads, 6);
    // "--stop" consumed, "ignored" left for an embedding caller.
    assert_eq!(consumed, toks.len() - 1);
}

#[test]
fn resolver_reports_the_offending_token() {
    let toks = tokens(&["single", "idx", "a.fq", "-Z"]);
    let err = resolve(&toks, &ExtensionRecognizer::new(false), &DefaultOptionParser).unwrap_err();
    assert!(err.to_string().contains("'-Z'"));
}
