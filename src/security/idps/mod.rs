mod library;
mod rules;

pub use library::{DetectionResult, InputKind, RuleLibrary};
pub use rules::{Matcher, MatcherDefinition, Rule, RuleAction, RuleDefinition, RuleError};
