use crate::encoding::Token;
use crate::midi_importer::PolyPolicy;
use anyhow::Result;
use log::info;

pub fn parse_policy(s: &str) -> PolyPolicy {
    match s.to_lowercase().as_str() {
        "h" | "highest" => PolyPolicy::Highest,
        "lw" | "lowest" => PolyPolicy::Lowest,
        "lu" | "loudest" => PolyPolicy::Loudest,
        other => {
            info!("Unknown policy '{}', defaulting to `highest`..!", other);
            PolyPolicy::Highest
        }
    }
}

/// Parse a space-separated seed melody like `"55 _ 60 _ 62 r"`.
pub fn parse_seed_melody(s: &str) -> Result<Vec<Token>> {
    s.split_whitespace().map(str::parse).collect()
}
