//! DNS request filtering rules.
//!
//! Rules are loaded once at startup from a line-oriented file and evaluated
//! in order against each decoded request; the first match decides.

pub mod loader;
mod rules;

pub use rules::{Action, Field, Operator, ParseRuleError, Request, Rule, RuleSet};
