use crate::dataset::{concat_corpus, save_corpus};
use crate::encoding::encode;
use crate::key::normalize;
use crate::midi_importer::{PolyPolicy, import_midi_file};
use crate::quantize::is_acceptable;
use crate::vocab::Vocabulary;
use anyhow::{Context, Result};
use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};

/// File names written into the output directory by [`preprocess`].
pub const CORPUS_FILE: &str = "corpus.txt";
pub const MAPPING_FILE: &str = "mapping.json";

/// Everything the corpus build needs, threaded explicitly so the pipeline
/// has no ambient state and tests can run it against temp directories.
#[derive(Debug, Clone)]
pub struct PreprocessConfig {
    pub dataset: PathBuf,
    pub out_dir: PathBuf,
    pub step_quarters: f64,
    pub window_size: usize,
    pub acceptable_durations: Vec<f64>,
    pub policy: PolyPolicy,
}

/// Per-category admission counts for one corpus build. Rejections are
/// per-piece and never fatal; the caller decides how loudly to report them.
#[derive(Debug, Clone, Copy, Default)]
pub struct CorpusSummary {
    pub admitted: usize,
    pub rejected_parse: usize,
    pub rejected_duration: usize,
    pub rejected_key: usize,
    pub corpus_len: usize,
    pub vocab_size: usize,
}

/// Recursively collect MIDI files under `root`, sorted by path so corpus
/// builds are deterministic regardless of directory iteration order.
pub fn collect_midi_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    visit(root, &mut files)?;
    files.sort();
    Ok(files)
}

fn visit(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("Failed to scan {}", dir.display()))?;

    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            visit(&path, files)?;
        } else if path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("mid") || ext.eq_ignore_ascii_case("midi"))
        {
            files.push(path);
        }
    }

    Ok(())
}

/// Run the full admission pipeline over a dataset directory: import each
/// piece, drop anything off the duration grid, normalize the key, encode,
/// then concatenate with boundary padding, build the vocabulary, and persist
/// both artifacts to `out_dir`.
pub fn preprocess(cfg: &PreprocessConfig) -> Result<CorpusSummary> {
    let files = collect_midi_files(&cfg.dataset)?;
    debug!("Found {} MIDI files under {}", files.len(), cfg.dataset.display());

    let mut summary = CorpusSummary::default();
    let mut pieces = Vec::new();

    for path in &files {
        let song = match import_midi_file(path, cfg.policy) {
            Ok(song) => song,
            Err(why) => {
                warn!("Skipping unreadable {}: {}", path.display(), why);
                summary.rejected_parse += 1;
                continue;
            }
        };

        if !is_acceptable(&song.events, &cfg.acceptable_durations) {
            debug!("Skipping {}: durations off the grid", path.display());
            summary.rejected_duration += 1;
            continue;
        }

        let normalized = match normalize(&song) {
            Ok(song) => song,
            Err(why) => {
                warn!("Skipping {}: {}", path.display(), why);
                summary.rejected_key += 1;
                continue;
            }
        };

        match encode(&normalized.events, cfg.step_quarters) {
            Ok(tokens) => pieces.push(tokens),
            Err(why) => {
                // The piece passed the duration filter but the step grid
                // cannot represent it, e.g. a dotted value with a coarse step.
                warn!("Skipping {}: {}", path.display(), why);
                summary.rejected_duration += 1;
            }
        }
    }

    summary.admitted = pieces.len();

    let corpus = concat_corpus(&pieces, cfg.window_size);
    let vocab = Vocabulary::build(&corpus);
    summary.corpus_len = corpus.len();
    summary.vocab_size = vocab.len();

    fs::create_dir_all(&cfg.out_dir)
        .with_context(|| format!("Failed to create {}", cfg.out_dir.display()))?;
    save_corpus(&corpus, cfg.out_dir.join(CORPUS_FILE))?;
    vocab.save(cfg.out_dir.join(MAPPING_FILE))?;

    Ok(summary)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dataset::load_corpus;
    use crate::encoding::Token;
    use crate::midi_exporter::events_to_smf;
    use crate::model::song::Event;
    use crate::quantize::ACCEPTABLE_DURATIONS;

    fn write_midi(dir: &Path, name: &str, events: &[Event]) {
        let smf = events_to_smf(events, 120.0).unwrap();
        let mut buf = Vec::new();
        smf.write(&mut buf).unwrap();
        std::fs::write(dir.join(name), &buf).unwrap();
    }

    fn c_major_phrase() -> Vec<Event> {
        vec![
            Event::Note {
                midi: 60,
                quarters: 1.0,
            },
            Event::Note {
                midi: 64,
                quarters: 0.5,
            },
            Event::Note {
                midi: 67,
                quarters: 0.5,
            },
            Event::Rest { quarters: 0.5 },
            Event::Note {
                midi: 72,
                quarters: 1.5,
            },
            Event::Note {
                midi: 60,
                quarters: 2.0,
            },
        ]
    }

    fn test_config(dataset: PathBuf, out_dir: PathBuf) -> PreprocessConfig {
        PreprocessConfig {
            dataset,
            out_dir,
            step_quarters: 0.25,
            window_size: 4,
            acceptable_durations: ACCEPTABLE_DURATIONS.to_vec(),
            policy: PolyPolicy::Highest,
        }
    }

    #[test]
    fn builds_corpus_and_vocabulary_from_a_dataset() {
        env_logger::try_init().unwrap_or(());

        let root = std::env::temp_dir().join("cantus_corpus_test_ok");
        let dataset = root.join("dataset");
        std::fs::create_dir_all(dataset.join("nested")).unwrap();
        write_midi(&dataset, "a.mid", &c_major_phrase());
        write_midi(&dataset.join("nested"), "b.mid", &c_major_phrase());

        let cfg = test_config(dataset, root.join("out"));
        let summary = preprocess(&cfg).unwrap();

        assert_eq!(summary.admitted, 2);
        assert_eq!(summary.rejected_duration, 0);
        assert_eq!(summary.rejected_key, 0);

        let corpus = load_corpus(cfg.out_dir.join(CORPUS_FILE)).unwrap();
        assert_eq!(corpus.len(), summary.corpus_len);
        // Each piece ends in a full boundary run.
        assert_eq!(
            &corpus[corpus.len() - cfg.window_size..],
            &vec![Token::Boundary; cfg.window_size][..]
        );

        let vocab = Vocabulary::load(cfg.out_dir.join(MAPPING_FILE)).unwrap();
        assert_eq!(vocab.len(), summary.vocab_size);
        // The phrase is already in C major: pitches survive unchanged.
        assert!(vocab.id_of(&Token::Note(60)).is_ok());
        assert!(vocab.id_of(&Token::Rest).is_ok());
        assert!(vocab.id_of(&Token::Hold).is_ok());
    }

    #[test]
    fn off_grid_pieces_are_skipped_not_fatal() {
        env_logger::try_init().unwrap_or(());

        let root = std::env::temp_dir().join("cantus_corpus_test_skip");
        let dataset = root.join("dataset");
        std::fs::create_dir_all(&dataset).unwrap();
        write_midi(&dataset, "good.mid", &c_major_phrase());
        // 0.125 quarters is not in the acceptable set.
        write_midi(
            &dataset,
            "bad.mid",
            &[
                Event::Note {
                    midi: 60,
                    quarters: 0.125,
                },
                Event::Note {
                    midi: 62,
                    quarters: 1.0,
                },
            ],
        );

        let cfg = test_config(dataset, root.join("out"));
        let summary = preprocess(&cfg).unwrap();

        assert_eq!(summary.admitted, 1);
        assert_eq!(summary.rejected_duration, 1);
    }

    #[test]
    fn empty_dataset_produces_an_empty_corpus() {
        let root = std::env::temp_dir().join("cantus_corpus_test_empty");
        let dataset = root.join("dataset");
        std::fs::create_dir_all(&dataset).unwrap();

        let cfg = test_config(dataset, root.join("out"));
        let summary = preprocess(&cfg).unwrap();

        assert_eq!(summary.admitted, 0);
        assert_eq!(summary.corpus_len, 0);
        // Boundary alone: the vocabulary always carries its stop symbol.
        assert_eq!(summary.vocab_size, 1);
    }
}
