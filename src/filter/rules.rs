//! Ordered request rules.
//!
//! A rule compares one projection of a DNS request against a literal value
//! and carries the action to take when the comparison holds. Rules are
//! tried in order and the first match decides.

use std::borrow::Cow;
use std::fmt;
use std::iter;
use std::net::IpAddr;
use std::str::FromStr;

use thiserror::Error;

use crate::dns::{self, DnsQuery};

/// Errors produced when a rule cannot be built from text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseRuleError {
    #[error("expected `<field> <operator> <value> <action>`, found {found} tokens")]
    MissingTokens { found: usize },

    #[error("unknown field `{0}`")]
    UnknownField(String),

    #[error("unknown operator `{0}`")]
    UnknownOperator(String),

    #[error("unknown action `{0}`")]
    UnknownAction(String),
}

/// The part of a request a rule looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    QueryName,
    QueryType,
    QueryTypeDescription,
    SourceAddr,
    DestAddr,
}

impl Field {
    pub fn as_str(self) -> &'static str {
        match self {
            Field::QueryName => "qname",
            Field::QueryType => "qtype",
            Field::QueryTypeDescription => "qtype_desc",
            Field::SourceAddr => "src_ip",
            Field::DestAddr => "dst_ip",
        }
    }
}

impl FromStr for Field {
    type Err = ParseRuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "qname" => Ok(Field::QueryName),
            "qtype" => Ok(Field::QueryType),
            "qtype_desc" => Ok(Field::QueryTypeDescription),
            "src_ip" => Ok(Field::SourceAddr),
            "dst_ip" => Ok(Field::DestAddr),
            _ => Err(ParseRuleError::UnknownField(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equals,
    NotEquals,
    /// Case-insensitive substring test.
    Contains,
    /// Case-sensitive substring test on the raw field value.
    Matches,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Equals => "==",
            Operator::NotEquals => "!=",
            Operator::Contains => "contains",
            Operator::Matches => "matches",
        }
    }
}

impl FromStr for Operator {
    type Err = ParseRuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "==" => Ok(Operator::Equals),
            "!=" => Ok(Operator::NotEquals),
            "contains" => Ok(Operator::Contains),
            "matches" => Ok(Operator::Matches),
            _ => Err(ParseRuleError::UnknownOperator(s.to_string())),
        }
    }
}

/// What to do with a request that matched a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Pass,
    Drop,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Pass => "pass",
            Action::Drop => "drop",
        }
    }
}

impl FromStr for Action {
    type Err = ParseRuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pass" => Ok(Action::Pass),
            "drop" => Ok(Action::Drop),
            _ => Err(ParseRuleError::UnknownAction(s.to_string())),
        }
    }
}

/// A DNS request as seen by the rules: the decoded query plus the
/// addresses of the packet that carried it.
#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    pub query: &'a DnsQuery,
    pub source: IpAddr,
    pub destination: IpAddr,
}

impl<'a> Request<'a> {
    fn project(&self, field: Field) -> Projection<'a> {
        match field {
            Field::QueryName => Projection::single(Cow::Borrowed(self.query.name.as_str())),
            Field::QueryType => Projection {
                value: Cow::Owned(self.query.qtype.to_string()),
                alias: dns::type_name(self.query.qtype),
            },
            Field::QueryTypeDescription => {
                Projection::single(dns::type_description(self.query.qtype))
            }
            Field::SourceAddr => Projection::single(Cow::Owned(self.source.to_string())),
            Field::DestAddr => Projection::single(Cow::Owned(self.destination.to_string())),
        }
    }
}

/// The string forms a field takes for comparison.
///
/// Query types compare as both their number and their mnemonic, so
/// `qtype == 1` and `qtype == A` are equivalent.
struct Projection<'a> {
    value: Cow<'a, str>,
    alias: Option<&'static str>,
}

impl<'a> Projection<'a> {
    fn single(value: Cow<'a, str>) -> Self {
        Self { value, alias: None }
    }

    fn candidates(&self) -> impl Iterator<Item = &str> {
        iter::once(self.value.as_ref()).chain(self.alias)
    }
}

/// A single filtering rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    field: Field,
    operator: Operator,
    value: String,
    folded: String,
    action: Action,
}

impl Rule {
    pub fn new(field: Field, operator: Operator, value: impl Into<String>, action: Action) -> Self {
        let value = value.into();
        let folded = value.to_lowercase();
        Self {
            field,
            operator,
            value,
            folded,
            action,
        }
    }

    pub fn field(&self) -> Field {
        self.field
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn action(&self) -> Action {
        self.action
    }

    /// Whether this rule's comparison holds for `request`.
    pub fn matches(&self, request: &Request<'_>) -> bool {
        let projection = request.project(self.field);
        let mut candidates = projection.candidates();

        match self.operator {
            Operator::Equals => candidates.any(|c| c == self.value),
            Operator::NotEquals => !candidates.any(|c| c == self.value),
            Operator::Contains => candidates.any(|c| c.to_lowercase().contains(&self.folded)),
            Operator::Matches => candidates.any(|c| c.contains(self.value.as_str())),
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} '{}' -> {}",
            self.field.as_str(),
            self.operator.as_str(),
            self.value,
            self.action.as_str()
        )
    }
}

/// Rules in evaluation order. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// The rule set used when no rules file can be read.
    pub fn defaults() -> Self {
        Self::new(vec![
            Rule::new(Field::QueryName, Operator::Matches, "malicious.com", Action::Drop),
            Rule::new(Field::QueryName, Operator::Matches, "ads.com", Action::Drop),
            Rule::new(Field::QueryName, Operator::Matches, "tracker.com", Action::Drop),
            Rule::new(Field::QueryType, Operator::Equals, "A", Action::Pass),
            Rule::new(Field::QueryName, Operator::Matches, "google.com", Action::Pass),
        ])
    }

    /// The first rule matching `request`, if any.
    pub fn first_match(&self, request: &Request<'_>) -> Option<&Rule> {
        self.rules.iter().find(|rule| rule.matches(request))
    }

    /// The action of the first matching rule; `None` means no rule applies.
    pub fn evaluate(&self, request: &Request<'_>) -> Option<Action> {
        self.first_match(request).map(Rule::action)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl FromIterator<Rule> for RuleSet {
    fn from_iter<I: IntoIterator<Item = Rule>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::CLASS_IN;

    fn query(name: &str, qtype: u16) -> DnsQuery {
        DnsQuery {
            id: 1,
            flags: 0x0100,
            name: name.to_string(),
            qtype,
            qclass: CLASS_IN,
            question_end: 0,
        }
    }

    fn request(query: &DnsQuery) -> Request<'_> {
        Request {
            query,
            source: "192.168.1.10".parse().unwrap(),
            destination: "8.8.8.8".parse().unwrap(),
        }
    }

    #[test]
    fn first_matching_rule_wins() {
        let rules = RuleSet::new(vec![
            Rule::new(Field::QueryName, Operator::Contains, "example", Action::Pass),
            Rule::new(Field::QueryName, Operator::Equals, "bad.example.com", Action::Drop),
        ]);
        let q = query("bad.example.com", 1);

        assert_eq!(rules.evaluate(&request(&q)), Some(Action::Pass));
    }

    #[test]
    fn order_changes_outcome() {
        let rules = RuleSet::new(vec![
            Rule::new(Field::QueryName, Operator::Equals, "bad.example.com", Action::Drop),
            Rule::new(Field::QueryName, Operator::Contains, "example", Action::Pass),
        ]);
        let q = query("bad.example.com", 1);

        assert_eq!(rules.evaluate(&request(&q)), Some(Action::Drop));
    }

    #[test]
    fn empty_rule_set_never_matches() {
        let q = query("anything.com", 1);

        assert_eq!(RuleSet::default().evaluate(&request(&q)), None);
    }

    #[test]
    fn no_match_returns_none() {
        let rules = RuleSet::new(vec![Rule::new(
            Field::QueryName,
            Operator::Equals,
            "other.com",
            Action::Drop,
        )]);
        let q = query("mine.com", 1);

        assert_eq!(rules.evaluate(&request(&q)), None);
    }

    #[test]
    fn contains_ignores_case_but_matches_does_not() {
        let contains = Rule::new(Field::QueryName, Operator::Contains, "TRACKER", Action::Drop);
        let matches = Rule::new(Field::QueryName, Operator::Matches, "TRACKER", Action::Drop);
        let q = query("cdn.tracker.net", 1);

        assert!(contains.matches(&request(&q)));
        assert!(!matches.matches(&request(&q)));
    }

    #[test]
    fn matches_is_substring() {
        let rule = Rule::new(Field::QueryName, Operator::Matches, "ads.com", Action::Drop);

        assert!(rule.matches(&request(&query("ads.com", 1))));
        assert!(rule.matches(&request(&query("img.ads.com", 1))));
        assert!(rule.matches(&request(&query("loads.com", 1))));
        assert!(!rule.matches(&request(&query("ads.co", 1))));
    }

    #[test]
    fn query_type_compares_number_and_mnemonic() {
        let by_name = Rule::new(Field::QueryType, Operator::Equals, "AAAA", Action::Drop);
        let by_number = Rule::new(Field::QueryType, Operator::Equals, "28", Action::Drop);
        let q = query("example.com", 28);

        assert!(by_name.matches(&request(&q)));
        assert!(by_number.matches(&request(&q)));
        assert!(!by_name.matches(&request(&query("example.com", 1))));
    }

    #[test]
    fn not_equals_requires_every_form_to_differ() {
        let rule = Rule::new(Field::QueryType, Operator::NotEquals, "A", Action::Drop);

        assert!(!rule.matches(&request(&query("example.com", 1))));
        assert!(rule.matches(&request(&query("example.com", 16))));
    }

    #[test]
    fn unknown_query_type_has_only_its_number() {
        let rule = Rule::new(Field::QueryType, Operator::Equals, "4242", Action::Drop);

        assert!(rule.matches(&request(&query("example.com", 4242))));
    }

    #[test]
    fn type_description_field() {
        let rule = Rule::new(Field::QueryTypeDescription, Operator::Equals, "IPv6", Action::Drop);

        assert!(rule.matches(&request(&query("example.com", 28))));
        assert!(!rule.matches(&request(&query("example.com", 1))));
    }

    #[test]
    fn address_fields() {
        let src = Rule::new(Field::SourceAddr, Operator::Equals, "192.168.1.10", Action::Drop);
        let dst = Rule::new(Field::DestAddr, Operator::Matches, "8.8.", Action::Pass);
        let q = query("example.com", 1);

        assert!(src.matches(&request(&q)));
        assert!(dst.matches(&request(&q)));
    }

    #[test]
    fn defaults_pass_a_queries_for_unlisted_domains() {
        let rules = RuleSet::defaults();
        let q = query("unlisted.org", 1);

        let rule = rules.first_match(&request(&q)).unwrap();
        assert_eq!(rule.field(), Field::QueryType);
        assert_eq!(rule.action(), Action::Pass);
    }

    #[test]
    fn defaults_drop_listed_domains_before_type_rule() {
        let rules = RuleSet::defaults();

        assert_eq!(
            rules.evaluate(&request(&query("malicious.com", 1))),
            Some(Action::Drop)
        );
        assert_eq!(
            rules.evaluate(&request(&query("x.tracker.com", 28))),
            Some(Action::Drop)
        );
        assert_eq!(rules.evaluate(&request(&query("unlisted.org", 16))), None);
    }

    #[test]
    fn parse_tokens() {
        assert_eq!("QNAME".parse::<Field>(), Ok(Field::QueryName));
        assert_eq!("!=".parse::<Operator>(), Ok(Operator::NotEquals));
        assert_eq!("Drop".parse::<Action>(), Ok(Action::Drop));
        assert!(matches!(
            "host".parse::<Field>(),
            Err(ParseRuleError::UnknownField(_))
        ));
        assert!(matches!(
            "~=".parse::<Operator>(),
            Err(ParseRuleError::UnknownOperator(_))
        ));
        assert!(matches!(
            "reject".parse::<Action>(),
            Err(ParseRuleError::UnknownAction(_))
        ));
    }

    #[test]
    fn display_rule() {
        let rule = Rule::new(Field::QueryName, Operator::Matches, "ads.com", Action::Drop);

        assert_eq!(rule.to_string(), "qname matches 'ads.com' -> drop");
    }
}
