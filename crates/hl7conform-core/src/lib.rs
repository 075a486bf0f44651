#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod config;
pub mod failure;
pub mod fsm;
pub mod location;
pub mod message;
mod patterns;
pub mod profile;
pub mod tables;
pub mod validation;
pub mod xml;

#[cfg(test)]
mod test_helpers;

pub use config::{ConfigError, FailureLevel, ValidationContext};
pub use failure::{FailureKind, FailureLocation, MessageFailure, Severity, ValidationResult};
pub use fsm::{Ambiguity, FiniteStateMachine, MappingStrategy, SegmentMapping, Transition};
pub use location::{ElementType, LocationError, MessageLocation, ProfileElement};
pub use message::{
    Encoding, EncodingDetectionError, Er7Message, Message, MessageError, MessageHeader,
    Separators, XmlMessage, detect_encoding,
};
pub use profile::{
    Cardinality, MaxOccurs, NodeKind, Profile, ProfileError, ProfileIndex, ProfileNodeId,
    ProfileType, Resolution, Usage, classify_profile,
};
pub use tables::{Table, TableError, TableLibrary, TableLookup};
pub use validation::{
    ContentCheck, ContentRule, RuleCheck, RuleError, RuleSet, StructureIssue, ValidationError,
    Validator,
};
pub use xml::{TreeNavigator, XmlDocument, XmlError};
