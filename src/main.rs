use anyhow::Result;
use cantus::{
    CORPUS_FILE, Cli, Command, MAPPING_FILE, MelodyGenerator, NgramPredictor, PreprocessConfig,
    Vocabulary, decode, load_corpus, parse_policy, parse_seed_melody, preprocess, to_ids, window,
    write_midi_file,
};
use clap::Parser;
use log::info;
use rand::SeedableRng;
use rand::rngs::StdRng;

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Preprocess {
            dataset,
            out,
            step,
            window,
            durations,
            policy,
        } => {
            let cfg = PreprocessConfig {
                dataset,
                out_dir: out,
                step_quarters: step,
                window_size: window,
                acceptable_durations: durations,
                policy: parse_policy(&policy),
            };

            info!("Preprocessing dataset '{}'...", cfg.dataset.display());
            let summary = preprocess(&cfg)?;
            info!(
                "Admitted {} pieces ({} unreadable, {} off the duration grid, {} failed key normalization)..!",
                summary.admitted,
                summary.rejected_parse,
                summary.rejected_duration,
                summary.rejected_key
            );
            info!(
                "Corpus: {} tokens over a vocabulary of {} symbols, written to '{}'",
                summary.corpus_len,
                summary.vocab_size,
                cfg.out_dir.display()
            );
        }

        Command::Train {
            corpus,
            window: window_size,
            order,
            model,
        } => {
            let vocab = Vocabulary::load(corpus.join(MAPPING_FILE))?;
            let tokens = load_corpus(corpus.join(CORPUS_FILE))?;
            let ids = to_ids(&tokens, &vocab)?;
            let pairs = window(&ids, window_size);

            info!(
                "Fitting an order-{} model over {} training pairs...",
                order,
                pairs.len()
            );
            let fitted = NgramPredictor::fit(&pairs, vocab.len(), order)?;
            fitted.save(&model)?;
            info!("Saved model to '{}'..!", model.display());
        }

        Command::Generate {
            corpus,
            model,
            seed_melody,
            steps,
            window: window_size,
            temperature,
            seed,
            step,
            tempo,
            out,
        } => {
            let vocab = Vocabulary::load(corpus.join(MAPPING_FILE))?;
            let predictor = NgramPredictor::load(&model)?;
            let seed_tokens = parse_seed_melody(&seed_melody)?;
            let generator = MelodyGenerator::new(predictor, vocab, window_size)?;

            info!(
                "Sampling up to {} steps at temperature {}...",
                steps, temperature
            );
            let melody = match seed {
                Some(value) => {
                    let mut rng = StdRng::seed_from_u64(value);
                    generator.generate(&seed_tokens, steps, temperature, &mut rng)?
                }
                None => {
                    let mut rng = rand::rng();
                    generator.generate(&seed_tokens, steps, temperature, &mut rng)?
                }
            };

            let events = decode(&melody, step)?;
            write_midi_file(&events, tempo, &out)?;
            info!("Wrote {} events to '{}'..!", events.len(), out.display());
        }
    }

    Ok(())
}
