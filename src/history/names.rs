//! Anonymous Name Generation
//!
//! Stable pseudonyms for unauthenticated callers, formatted
//! `adjective-animal-NN`. The guarantee is probabilistic, not unique:
//! callers must not assume uniqueness without a disambiguator.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const ADJECTIVES: [&str; 48] = [
    "azure", "crimson", "emerald", "golden", "silver", "violet", "amber", "coral",
    "indigo", "jade", "onyx", "pearl", "ruby", "sapphire", "topaz", "bronze",
    "copper", "ivory", "obsidian", "opal", "crystal", "ebony", "frosty", "stormy",
    "shadowy", "lunar", "solar", "stellar", "cosmic", "mystic", "arctic", "autumn",
    "vernal", "summer", "wintry", "misty", "silent", "swift", "brave", "clever",
    "gentle", "noble", "proud", "wild", "calm", "bold", "bright", "dusky",
];

const ANIMALS: [&str; 48] = [
    "tiger", "falcon", "wolf", "eagle", "bear", "hawk", "lion", "panther",
    "phoenix", "dragon", "raven", "fox", "deer", "owl", "crane", "dolphin",
    "otter", "badger", "heron", "sparrow", "condor", "jaguar", "leopard", "lynx",
    "puma", "cobra", "viper", "python", "tortoise", "turtle", "salmon", "trout",
    "shark", "whale", "seal", "penguin", "pelican", "flamingo", "parrot", "finch",
    "cardinal", "robin", "jay", "wren", "swift", "martin", "oriole", "thrush",
];

/// Generates anonymous names from a fixed vocabulary.
pub struct NameGenerator {
    rng: StdRng,
}

impl NameGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self { rng: StdRng::from_entropy() }
    }

    /// Generate a name like `misty-owl-07`.
    pub fn generate(&mut self) -> String {
        format_name(&mut self.rng)
    }
}

impl Default for NameGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Deterministic name for a given seed; the same seed always produces the
/// same name.
#[must_use]
pub fn generate_with_seed(seed: u64) -> String {
    let mut rng = StdRng::seed_from_u64(seed);
    format_name(&mut rng)
}

fn format_name(rng: &mut StdRng) -> String {
    let adjective = ADJECTIVES[rng.gen_range(0..ADJECTIVES.len())];
    let animal = ANIMALS[rng.gen_range(0..ANIMALS.len())];
    let number: u8 = rng.gen_range(0..100);
    format!("{adjective}-{animal}-{number:02}")
}
