use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "cantus",
    about = "Tokenize monophonic MIDI melodies and sample new ones from a next-symbol predictor."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scan a dataset of MIDI files and build the token corpus and vocabulary.
    Preprocess {
        /// Directory scanned recursively for .mid/.midi files.
        #[arg(short, long)]
        dataset: PathBuf,

        /// Output directory for the corpus and vocabulary files.
        #[arg(short, long, default_value = "dataset_out")]
        out: PathBuf,

        /// Time step of the encoding grid, in quarter-note units.
        #[arg(long, default_value_t = 0.25)]
        step: f64,

        /// Context window length, which is also the length of the boundary
        /// padding run between concatenated pieces.
        #[arg(short, long, default_value_t = 64)]
        window: usize,

        /// Durations (quarter-note units) a piece may use; anything else gets
        /// the whole piece skipped.
        #[arg(long, value_delimiter = ',', default_values_t = crate::quantize::ACCEPTABLE_DURATIONS)]
        durations: Vec<f64>,

        /// Polyphony reduction policy: highest|lowest|loudest.
        #[arg(short, long, default_value = "highest")]
        policy: String,
    },

    /// Fit the n-gram predictor over the windowed corpus.
    Train {
        /// Directory holding the corpus and vocabulary written by `preprocess`.
        #[arg(short, long, default_value = "dataset_out")]
        corpus: PathBuf,

        /// Context window length used to slice training pairs.
        #[arg(short, long, default_value_t = 64)]
        window: usize,

        /// Longest context the model conditions on before backing off.
        #[arg(long, default_value_t = 3)]
        order: usize,

        /// Where to write the fitted model.
        #[arg(short, long, default_value = "model.json")]
        model: PathBuf,
    },

    /// Sample a melody continuation and write it as a MIDI file.
    Generate {
        /// Directory holding the vocabulary written by `preprocess`.
        #[arg(short, long, default_value = "dataset_out")]
        corpus: PathBuf,

        /// Fitted model written by `train`.
        #[arg(short, long, default_value = "model.json")]
        model: PathBuf,

        /// Seed melody in token form, e.g. "55 _ 60 _ 60 _ 62 _ 64".
        #[arg(short, long)]
        seed_melody: String,

        /// Maximum number of tokens to sample before giving up on a boundary.
        #[arg(long, default_value_t = 500)]
        steps: usize,

        /// Context window length fed to the predictor.
        #[arg(short, long, default_value_t = 64)]
        window: usize,

        /// Sampling temperature; below 1 sharpens toward the arg-max, above 1
        /// flattens toward uniform.
        #[arg(short, long, default_value_t = 0.9)]
        temperature: f64,

        /// RNG seed for reproducible output.
        #[arg(long)]
        seed: Option<u64>,

        /// Time step of the encoding grid, in quarter-note units.
        #[arg(long, default_value_t = 0.25)]
        step: f64,

        /// Tempo of the written MIDI file, in beats per minute.
        #[arg(long, default_value_t = 120.0)]
        tempo: f64,

        /// Output MIDI path.
        #[arg(short, long, default_value = "music.mid")]
        out: PathBuf,
    },
}
