//! Rule-based checks over extracted document data.
//!
//! Pure functions: same inputs always produce the same report, no I/O.

use serde::{Deserialize, Serialize};

use super::ExtractedData;

/// Overall verdict for a processed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentStatus {
    #[serde(rename = "APPROVED")]
    Approved,
    #[serde(rename = "NEEDS_REVIEW")]
    NeedsReview,
    #[serde(rename = "REJECTED")]
    Rejected,
}

impl DocumentStatus {
    /// The wire-format label, matching the serde rename.
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentStatus::Approved => "APPROVED",
            DocumentStatus::NeedsReview => "NEEDS_REVIEW",
            DocumentStatus::Rejected => "REJECTED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    #[serde(rename = "ERROR")]
    Error,
    #[serde(rename = "WARNING")]
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
    ClaimMismatch,
    ClaimNotFound,
    ModelNotFound,
    NomenclatureNotFound,
    SignatureNotFound,
    StampNotFound,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub code: IssueCode,
    pub message: String,
    pub severity: Severity,
    /// The extracted field the finding refers to, when there is one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionAction {
    CloseClaim,
    ReviewRequired,
    ReturnForCorrection,
}

/// Operator-facing next step derived from the status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub action: DecisionAction,
    pub message: String,
    pub steps: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub status: DocumentStatus,
    pub issues: Vec<Issue>,
    pub warnings: Vec<Issue>,
    pub decision: Decision,
}

/// Tunable rule set. Nomenclature is informational by default because many
/// acts describe work that consumes no parts.
#[derive(Debug, Clone)]
pub struct ValidationRules {
    pub require_nomenclature: bool,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            require_nomenclature: false,
        }
    }
}

/// Reduce a claim number to its digits when it is mostly digits.
/// Vision models sometimes return "№ 1847896" or "1847896." verbatim.
pub fn normalize_claim_number(raw: &str) -> String {
    let digits = raw.chars().filter(char::is_ascii_digit).count();
    if digits > 3 {
        raw.chars().filter(char::is_ascii_digit).collect()
    } else {
        raw.trim().to_string()
    }
}

/// Apply the rule table and derive status and decision.
pub fn check(
    data: &ExtractedData,
    expected_claim: Option<&str>,
    rules: &ValidationRules,
) -> ValidationReport {
    let mut issues = Vec::new();
    let mut warnings = Vec::new();

    match (&data.claim_number, expected_claim) {
        (Some(found), Some(expected)) => {
            let found_n = normalize_claim_number(found);
            let expected_n = normalize_claim_number(expected);
            if found_n != expected_n {
                issues.push(Issue {
                    code: IssueCode::ClaimMismatch,
                    message: format!(
                        "Номер заявки не совпадает. Ожидалось: {expected}, найдено: {found}"
                    ),
                    severity: Severity::Error,
                    field: Some("claim_number".to_string()),
                });
            }
        }
        (None, _) => {
            warnings.push(Issue {
                code: IssueCode::ClaimNotFound,
                message: "Номер заявки не найден в документе".to_string(),
                severity: Severity::Warning,
                field: Some("claim_number".to_string()),
            });
        }
        (Some(_), None) => {}
    }

    if data.equipment_model.is_none() {
        issues.push(Issue {
            code: IssueCode::ModelNotFound,
            message: "Модель оборудования не найдена".to_string(),
            severity: Severity::Error,
            field: Some("equipment_model".to_string()),
        });
    }

    if rules.require_nomenclature && data.nomenclature.is_none() {
        issues.push(Issue {
            code: IssueCode::NomenclatureNotFound,
            message: "Номенклатура (картридж) не найдена".to_string(),
            severity: Severity::Error,
            field: Some("nomenclature".to_string()),
        });
    }

    if !data.has_signature {
        issues.push(Issue {
            code: IssueCode::SignatureNotFound,
            message: "Подпись клиента не обнаружена".to_string(),
            severity: Severity::Error,
            field: Some("has_signature".to_string()),
        });
    }

    if !data.has_stamp {
        warnings.push(Issue {
            code: IssueCode::StampNotFound,
            message: "Печать клиента не обнаружена".to_string(),
            severity: Severity::Warning,
            field: Some("has_stamp".to_string()),
        });
    }

    let status = if issues.iter().any(|i| i.severity == Severity::Error) {
        DocumentStatus::Rejected
    } else if !warnings.is_empty() {
        DocumentStatus::NeedsReview
    } else {
        DocumentStatus::Approved
    };

    ValidationReport {
        status,
        decision: decision_for(status, data),
        issues,
        warnings,
    }
}

fn decision_for(status: DocumentStatus, data: &ExtractedData) -> Decision {
    match status {
        DocumentStatus::Approved => Decision {
            action: DecisionAction::CloseClaim,
            message: "Все проверки пройдены. Заявку можно закрыть.".to_string(),
            steps: vec![
                format!(
                    "Внести номенклатуру: {}",
                    data.nomenclature.as_deref().unwrap_or("N/A")
                ),
                format!("Внести количество: {}", data.quantity),
                "Перевести заявку в статус \"ЗАКРЫТО\"".to_string(),
            ],
        },
        DocumentStatus::NeedsReview => Decision {
            action: DecisionAction::ReviewRequired,
            message: "Требуется ручная проверка некоторых пунктов".to_string(),
            steps: vec!["Передать документ на ручную проверку".to_string()],
        },
        DocumentStatus::Rejected => Decision {
            action: DecisionAction::ReturnForCorrection,
            message: "Документ не прошел проверку. Требуется доработка.".to_string(),
            steps: vec!["Вернуть документ сотруднику для исправления".to_string()],
        },
    }
}
