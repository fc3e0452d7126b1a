use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UintRange {
    pub start: u64,
    pub end: u64,
}

impl UintRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn is_ordered(&self) -> bool {
        self.start <= self.end
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AssetCondition {
    pub collection_id: String,
    pub asset_ids: Vec<UintRange>,
    pub chain: String,
    pub must_own_amounts: UintRange,
    // Empty means "any time, including always".
    pub ownership_times: Vec<UintRange>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum AssetConditionGroup {
    #[serde(rename = "$and")]
    And(Vec<AssetConditionGroup>),
    #[serde(rename = "$or")]
    Or(Vec<AssetConditionGroup>),
    #[serde(rename = "assets")]
    Assets(Vec<AssetCondition>),
}

impl AssetConditionGroup {
    // Degenerate-node policy, shared with validation: an empty `$and` is
    // vacuously true, an empty `$or` is vacuously false.
    pub fn evaluate(&self, leaf: &dyn Fn(&AssetCondition) -> bool) -> bool {
        match self {
            Self::And(children) => children.iter().all(|child| child.evaluate(leaf)),
            Self::Or(children) => children.iter().any(|child| child.evaluate(leaf)),
            Self::Assets(conditions) => conditions.iter().all(leaf),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExpectedBalanceItem {
    pub label: String,
    pub asset_ownership_requirements: AssetConditionGroup,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidationErrorCode {
    EmptyCollectionId,
    EmptyChain,
    EmptyAssetIds,
    ReversedRange,
}

impl ValidationErrorCode {
    pub const fn as_tag(self) -> &'static str {
        match self {
            Self::EmptyCollectionId => "empty_collection_id",
            Self::EmptyChain => "empty_chain",
            Self::EmptyAssetIds => "empty_asset_ids",
            Self::ReversedRange => "reversed_range",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationError {
    pub code: ValidationErrorCode,
    pub detail: String,
}

impl ValidationError {
    pub fn new(code: ValidationErrorCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_tag(), self.detail)
    }
}

impl std::error::Error for ValidationError {}

fn validate_range(range: &UintRange, field: &str) -> Result<(), ValidationError> {
    if !range.is_ordered() {
        return Err(ValidationError::new(
            ValidationErrorCode::ReversedRange,
            format!("{field} range {}..{} is reversed", range.start, range.end),
        ));
    }
    Ok(())
}

pub fn validate_condition(condition: &AssetCondition) -> Result<(), ValidationError> {
    if condition.collection_id.trim().is_empty() {
        return Err(ValidationError::new(
            ValidationErrorCode::EmptyCollectionId,
            "collection id is required",
        ));
    }
    if condition.chain.trim().is_empty() {
        return Err(ValidationError::new(
            ValidationErrorCode::EmptyChain,
            "chain is required",
        ));
    }
    // No wildcard policy: a condition must name at least one asset range.
    if condition.asset_ids.is_empty() {
        return Err(ValidationError::new(
            ValidationErrorCode::EmptyAssetIds,
            format!(
                "condition on collection {} names no asset ids",
                condition.collection_id
            ),
        ));
    }
    for range in &condition.asset_ids {
        validate_range(range, "asset_ids")?;
    }
    validate_range(&condition.must_own_amounts, "must_own_amounts")?;
    for range in &condition.ownership_times {
        validate_range(range, "ownership_times")?;
    }
    Ok(())
}

// Depth-first, fail-fast: the first invalid leaf wins. Empty `$and`/`$or`
// nodes are valid degenerate groups.
pub fn validate_group(group: &AssetConditionGroup) -> Result<(), ValidationError> {
    match group {
        AssetConditionGroup::And(children) | AssetConditionGroup::Or(children) => {
            for child in children {
                validate_group(child)?;
            }
            Ok(())
        }
        AssetConditionGroup::Assets(conditions) => {
            for condition in conditions {
                validate_condition(condition)?;
            }
            Ok(())
        }
    }
}

pub fn validate_expected_balances(items: &[ExpectedBalanceItem]) -> Result<(), ValidationError> {
    for item in items {
        validate_group(&item.asset_ownership_requirements)?;
    }
    Ok(())
}
