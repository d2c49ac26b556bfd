mod corpus;
mod dataset;
mod encoding;
mod generator;
mod key;
mod midi_exporter;
mod midi_importer;
mod model;
mod predictor;
mod quantize;
mod util;
mod vocab;

pub use corpus::*;
pub use dataset::*;
pub use encoding::*;
pub use generator::*;
pub use key::*;
pub use midi_exporter::*;
pub use midi_importer::*;
pub use model::config::*;
pub use model::song::*;
pub use predictor::*;
pub use quantize::*;
pub use util::*;
pub use vocab::*;
