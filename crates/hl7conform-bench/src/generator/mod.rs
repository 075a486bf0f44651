//! Conformance profile and message generator.
//!
//! Produces a synthetic profile, the table library it references, and
//! messages in both encodings that conform to it.

pub mod message;
pub mod profile;

use rand::SeedableRng;
use rand::rngs::StdRng;

pub use profile::{FieldSpec, FieldType, GroupSpec, ProfileSpec, SegmentSpec, TopLevel};

/// Configuration for the profile generator.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Seed for the random number generator (deterministic).
    pub seed: u64,
    /// Number of top-level segment definitions after MSH.
    pub num_segments: usize,
    /// Number of segment groups.
    pub num_groups: usize,
    /// Segment definitions per group.
    pub group_size: usize,
    /// Field definitions per segment.
    pub fields_per_segment: usize,
    /// Components of a composite field.
    pub components_per_field: usize,
    /// Fraction of fields that are composites (0.0-1.0).
    pub composite_fraction: f64,
    /// Fraction of primitive fields bound to a table (0.0-1.0).
    pub coded_fraction: f64,
    /// Codes per generated table.
    pub table_size: usize,
    /// Fraction of segments, groups and fields that may repeat (0.0-1.0).
    pub repeat_fraction: f64,
    /// Repetitions a message uses at most for a repeatable element.
    pub max_repeats: u32,
    /// Fraction of optional elements a message populates (0.0-1.0).
    pub fill_fraction: f64,
}

/// Predefined size tiers for benchmarking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeTier {
    /// ~10 segment definitions, ~20 message segments
    Small,
    /// ~60 segment definitions, ~200 message segments
    Medium,
    /// ~250 segment definitions, ~1500 message segments
    Large,
}

impl SizeTier {
    /// Returns the default `GeneratorConfig` for this size tier.
    pub fn config(self, seed: u64) -> GeneratorConfig {
        match self {
            SizeTier::Small => GeneratorConfig {
                seed,
                num_segments: 6,
                num_groups: 2,
                group_size: 2,
                fields_per_segment: 6,
                components_per_field: 3,
                composite_fraction: 0.2,
                coded_fraction: 0.2,
                table_size: 5,
                repeat_fraction: 0.2,
                max_repeats: 3,
                fill_fraction: 0.7,
            },
            SizeTier::Medium => GeneratorConfig {
                seed,
                num_segments: 30,
                num_groups: 8,
                group_size: 4,
                fields_per_segment: 12,
                components_per_field: 4,
                composite_fraction: 0.3,
                coded_fraction: 0.25,
                table_size: 20,
                repeat_fraction: 0.3,
                max_repeats: 5,
                fill_fraction: 0.8,
            },
            SizeTier::Large => GeneratorConfig {
                seed,
                num_segments: 120,
                num_groups: 26,
                group_size: 5,
                fields_per_segment: 20,
                components_per_field: 6,
                composite_fraction: 0.3,
                coded_fraction: 0.3,
                table_size: 50,
                repeat_fraction: 0.35,
                max_repeats: 8,
                fill_fraction: 0.85,
            },
        }
    }
}

/// A generated profile together with one message conforming to it.
#[derive(Debug, Clone)]
pub struct GeneratedCase {
    /// The profile definition the texts were rendered from.
    pub spec: ProfileSpec,
    /// Conformance profile XML.
    pub profile_xml: String,
    /// Table library XML.
    pub tables_xml: String,
    /// The message in ER7 encoding.
    pub er7: String,
    /// The same message in XML encoding.
    pub xml: String,
    /// Number of segments in the message, MSH included.
    pub segment_count: usize,
}

/// Generates a profile, its tables and a conforming message.
///
/// All randomness is deterministic, seeded from `config.seed`.
pub fn generate_case(config: &GeneratorConfig) -> GeneratedCase {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let spec = ProfileSpec::generate(config, &mut rng);
    let instance = message::populate(&spec, config, &mut rng);
    GeneratedCase {
        profile_xml: spec.to_profile_xml(),
        tables_xml: spec.to_tables_xml(),
        er7: instance.to_er7(),
        xml: instance.to_xml(&spec),
        segment_count: instance.segment_count(),
        spec,
    }
}
