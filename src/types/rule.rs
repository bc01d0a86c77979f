//! Dynamic rules supplied by the rule store

use crate::error::PipelineError;
use crate::types::transaction::TransactionInput;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Largest increment a single rule can contribute
pub const MAX_RULE_WEIGHT: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RuleStatus {
    #[default]
    Active,
    Inactive,
}

/// A rule as stored externally; the condition is parsed at evaluation time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default)]
    pub id: String,

    pub name: String,

    /// `field op threshold`, e.g. `amount > 10000`
    #[serde(default)]
    pub condition: String,

    /// Score increment on match; the engine default applies when absent
    #[serde(default)]
    pub weight: Option<u32>,

    #[serde(default)]
    pub status: RuleStatus,
}

impl Rule {
    pub fn new(id: impl Into<String>, name: impl Into<String>, condition: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            condition: condition.into(),
            weight: None,
            status: RuleStatus::Active,
        }
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn with_status(mut self, status: RuleStatus) -> Self {
        self.status = status;
        self
    }

    /// Score increment on match, capped at `MAX_RULE_WEIGHT`
    pub fn increment(&self, default: u32) -> u32 {
        self.weight.unwrap_or(default).min(MAX_RULE_WEIGHT)
    }

    pub fn is_active(&self) -> bool {
        self.status == RuleStatus::Active
    }

    /// Parse this rule's condition
    pub fn parse_condition(&self) -> Result<RuleCondition, PipelineError> {
        self.condition
            .parse::<RuleCondition>()
            .map_err(|reason| PipelineError::MalformedRule {
                rule: self.name.clone(),
                reason,
            })
    }
}

/// Numeric transaction fields a rule may test
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleField {
    Amount,
    UserTxnCount,
    UserTotalSpent,
    UserRiskScore,
    UserAverageAmount,
}

impl RuleField {
    fn value(self, tx: &TransactionInput) -> f64 {
        match self {
            RuleField::Amount => tx.safe_amount(),
            RuleField::UserTxnCount => f64::from(tx.history.user_txn_count),
            RuleField::UserTotalSpent => tx.history.user_total_spent,
            RuleField::UserRiskScore => tx.history.user_risk_score,
            RuleField::UserAverageAmount => tx.history.average_amount(),
        }
    }
}

impl FromStr for RuleField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "amount" => Ok(RuleField::Amount),
            "user_txn_count" | "txn_count" => Ok(RuleField::UserTxnCount),
            "user_total_spent" | "total_spent" => Ok(RuleField::UserTotalSpent),
            "user_risk_score" | "risk_score" => Ok(RuleField::UserRiskScore),
            "user_avg_amount" | "avg_amount" => Ok(RuleField::UserAverageAmount),
            other => Err(format!("unknown field '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
}

impl Comparison {
    fn holds(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Comparison::Gt => lhs > rhs,
            Comparison::Ge => lhs >= rhs,
            Comparison::Lt => lhs < rhs,
            Comparison::Le => lhs <= rhs,
            Comparison::Eq => (lhs - rhs).abs() < f64::EPSILON,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Eq => "==",
        }
    }
}

/// Parsed `field op threshold` predicate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleCondition {
    pub field: RuleField,
    pub comparison: Comparison,
    pub threshold: f64,
}

impl RuleCondition {
    pub fn matches(&self, tx: &TransactionInput) -> bool {
        self.comparison.holds(self.field.value(tx), self.threshold)
    }
}

impl FromStr for RuleCondition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Two-character operators first so ">=" is not read as ">"
        const OPERATORS: [(&str, Comparison); 5] = [
            (">=", Comparison::Ge),
            ("<=", Comparison::Le),
            ("==", Comparison::Eq),
            (">", Comparison::Gt),
            ("<", Comparison::Lt),
        ];

        let (op, comparison, at) = OPERATORS
            .iter()
            .find_map(|(op, cmp)| s.find(op).map(|at| (*op, *cmp, at)))
            .ok_or_else(|| format!("no comparison operator in '{s}'"))?;

        let field = s[..at].trim().to_ascii_lowercase().parse::<RuleField>()?;
        let raw_threshold = s[at + op.len()..].trim();
        let threshold: f64 = raw_threshold
            .parse()
            .map_err(|_| format!("threshold '{raw_threshold}' is not a number"))?;
        if !threshold.is_finite() {
            return Err(format!("threshold '{raw_threshold}' is not finite"));
        }

        Ok(Self {
            field,
            comparison,
            threshold,
        })
    }
}

impl fmt::Display for RuleCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {} {}", self.field, self.comparison.symbol(), self.threshold)
    }
}
