//! Structured field extraction from cleaned document text.
//!
//! Every field is an ordered regex cascade, most specific pattern first,
//! first match wins. Missing fields stay `None` and are judged later by the
//! validation rules, never here.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Document class inferred from keyword presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    ServiceAct,
    Invoice,
    Contract,
    Unknown,
}

/// Fields pulled from the text before marker detection fills in the booleans.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentFields {
    pub claim_number: Option<String>,
    pub equipment_model: Option<String>,
    pub cartridge_model: Option<String>,
    pub nomenclature: Option<String>,
    pub customer_name: Option<String>,
    pub work_type: Option<String>,
    pub service_date: Option<String>,
    pub page_count: Option<u32>,
    pub quantity: u32,
}

/// A pattern plus the capture group carrying the value. Brand patterns keep
/// the whole match (group 0) so the model number survives.
struct FieldPattern {
    regex: Lazy<Regex>,
    group: usize,
}

macro_rules! field_pattern {
    ($re:expr, $group:expr) => {
        FieldPattern {
            regex: Lazy::new(|| Regex::new($re).expect("invalid field pattern")),
            group: $group,
        }
    };
}

static CLAIM_PATTERNS: [FieldPattern; 5] = [
    field_pattern!(r"(?i)заявк\w*[^\d\n№]*[№N#]?\s*(\d{6,10})", 1),
    field_pattern!(r"(?:№|N[oо]?|#)\s*(\d{6,10})", 1),
    field_pattern!(r"(?i)номер\s+заявки[:\s]+(\d+)", 1),
    field_pattern!(r"(?i)акт.*?(\d{6,10})", 1),
    // Last resort: any bare 6-7 digit run. Generates false positives on
    // serial numbers but beats reporting nothing on badly degraded scans.
    field_pattern!(r"(\d{6,7})", 1),
];

static EQUIPMENT_PATTERNS: [FieldPattern; 4] = [
    field_pattern!(r"(?:HP|Canon|Xerox|Brother|Samsung|Kyocera)[ \t\w]+\d+", 0),
    field_pattern!(r"(?i)модель[:\s]+([\w \t]+)", 1),
    field_pattern!(r"(?i)принтер[:\s]+([\w \t]+)", 1),
    field_pattern!(r"(?i)аппарат[:\s]+([\w \t]+)", 1),
];

static CARTRIDGE_PATTERNS: [FieldPattern; 5] = [
    field_pattern!(r"(CE\d{3}[A-Z])", 1),
    field_pattern!(r"(Q\d{4}[A-Z])", 1),
    field_pattern!(r"(TK-\d+)", 1),
    field_pattern!(r"(MLT-\w\d+)", 1),
    field_pattern!(r"(?i)картридж[:\s]+([\w\d-]+)", 1),
];

static CUSTOMER_PATTERNS: [FieldPattern; 3] = [
    field_pattern!(r#"ООО\s+["«]([^"»]+)["»]"#, 1),
    field_pattern!(r"(?i)заказчик[:\s]+([^\n]+)", 1),
    field_pattern!(r"(?i)организация[:\s]+([^\n]+)", 1),
];

static DATE_PATTERNS: [FieldPattern; 2] = [
    field_pattern!(r"(\d{1,2}[./]\d{1,2}[./]\d{2,4})", 1),
    field_pattern!(r"(\d{1,2}\s+\w+\s+\d{4})", 1),
];

static PAGE_COUNT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)страниц[^\d]*(\d+)").expect("invalid page count pattern"));

/// Work category to lowercase trigger keywords, checked in order.
static WORK_TYPES: &[(&str, &[&str])] = &[
    ("Замена картриджа", &["замен", "картридж"]),
    (
        "Техническое обслуживание",
        &["обслуживание", "профилактика", "то1", "то2", "то3"],
    ),
    ("Ремонт", &["ремонт", "починка", "восстановление"]),
    ("Диагностика", &["диагностика", "осмотр", "проверка"]),
];

fn first_match(patterns: &[FieldPattern], text: &str) -> Option<String> {
    for pattern in patterns {
        if let Some(caps) = pattern.regex.captures(text) {
            if let Some(m) = caps.get(pattern.group) {
                let value = m.as_str().trim();
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }
    None
}

fn work_type(text: &str) -> Option<String> {
    let lower = text.to_lowercase();
    for (category, keywords) in WORK_TYPES {
        if keywords.iter().any(|k| lower.contains(k)) {
            return Some((*category).to_string());
        }
    }
    None
}

/// Extract all structured fields from cleaned text.
pub fn extract(text: &str) -> DocumentFields {
    let cartridge_model = first_match(&CARTRIDGE_PATTERNS, text);
    let nomenclature = cartridge_model.as_deref().map(|m| format!("Картридж {m}"));

    DocumentFields {
        claim_number: first_match(&CLAIM_PATTERNS, text),
        equipment_model: first_match(&EQUIPMENT_PATTERNS, text),
        cartridge_model,
        nomenclature,
        customer_name: first_match(&CUSTOMER_PATTERNS, text),
        work_type: work_type(text),
        service_date: first_match(&DATE_PATTERNS, text),
        page_count: PAGE_COUNT_PATTERN
            .captures(text)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok()),
        quantity: 1,
    }
}

/// Classify the document by keyword presence.
pub fn classify(text: &str) -> DocumentType {
    let lower = text.to_lowercase();
    if lower.contains("акт") && lower.contains("заявк") {
        DocumentType::ServiceAct
    } else if lower.contains("счет") || lower.contains("invoice") {
        DocumentType::Invoice
    } else if lower.contains("договор") || lower.contains("contract") {
        DocumentType::Contract
    } else {
        DocumentType::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_ACT: &str = "АКТ выполненных работ\n\
        по заявке № 1847896 от 12.03.2024\n\
        Заказчик: ООО «Ромашка»\n\
        Оборудование: HP LaserJet M1132\n\
        Выполнена замена картриджа CE285A\n\
        Счетчик страниц: 15234";

    #[test]
    fn extracts_claim_number_from_zayavka() {
        let fields = extract(SAMPLE_ACT);
        assert_eq!(fields.claim_number.as_deref(), Some("1847896"));
    }

    #[test]
    fn extracts_claim_from_number_sign() {
        let fields = extract("Документ № 2034567 прилагается");
        assert_eq!(fields.claim_number.as_deref(), Some("2034567"));
    }

    #[test]
    fn bare_digit_fallback_fires_last() {
        let fields = extract("нечитаемый текст 184789 конец");
        assert_eq!(fields.claim_number.as_deref(), Some("184789"));
    }

    #[test]
    fn no_claim_in_short_digit_runs() {
        let fields = extract("стр. 12 из 34");
        assert_eq!(fields.claim_number, None);
    }

    #[test]
    fn extracts_equipment_brand_line() {
        let fields = extract(SAMPLE_ACT);
        assert_eq!(fields.equipment_model.as_deref(), Some("HP LaserJet M1132"));
    }

    #[test]
    fn equipment_keyword_pattern_used_without_brand() {
        let fields = extract("Модель: LBP6020 в рабочем состоянии");
        assert_eq!(fields.equipment_model.as_deref(), Some("LBP6020 в рабочем состоянии"));
    }

    #[test]
    fn extracts_cartridge_and_derives_nomenclature() {
        let fields = extract(SAMPLE_ACT);
        assert_eq!(fields.cartridge_model.as_deref(), Some("CE285A"));
        assert_eq!(fields.nomenclature.as_deref(), Some("Картридж CE285A"));
        assert_eq!(fields.quantity, 1);
    }

    #[test]
    fn recognizes_kyocera_and_samsung_cartridges() {
        assert_eq!(
            extract("установлен TK-1140").cartridge_model.as_deref(),
            Some("TK-1140")
        );
        assert_eq!(
            extract("заменен MLT-D104S").cartridge_model.as_deref(),
            Some("MLT-D104S")
        );
    }

    #[test]
    fn no_cartridge_means_no_nomenclature() {
        let fields = extract("Проведена диагностика аппарата");
        assert_eq!(fields.cartridge_model, None);
        assert_eq!(fields.nomenclature, None);
    }

    #[test]
    fn extracts_customer_from_quotes() {
        let fields = extract(SAMPLE_ACT);
        assert_eq!(fields.customer_name.as_deref(), Some("Ромашка"));
    }

    #[test]
    fn customer_keyword_fallback() {
        let fields = extract("Заказчик: ИП Иванов И.И.\nконец");
        assert_eq!(fields.customer_name.as_deref(), Some("ИП Иванов И.И."));
    }

    #[test]
    fn extracts_date_dotted() {
        let fields = extract(SAMPLE_ACT);
        assert_eq!(fields.service_date.as_deref(), Some("12.03.2024"));
    }

    #[test]
    fn extracts_date_with_month_name() {
        let fields = extract("работы выполнены 5 марта 2024 года");
        assert_eq!(fields.service_date.as_deref(), Some("5 марта 2024"));
    }

    #[test]
    fn extracts_page_count() {
        let fields = extract(SAMPLE_ACT);
        assert_eq!(fields.page_count, Some(15234));
    }

    #[test]
    fn work_type_first_category_wins() {
        // "замена" and "осмотр" both present; the cartridge category is first
        let fields = extract("Произведен осмотр и замена картриджа");
        assert_eq!(fields.work_type.as_deref(), Some("Замена картриджа"));
    }

    #[test]
    fn work_type_maintenance_keywords_lowercased() {
        let fields = extract("Выполнено ТО2 согласно регламенту");
        assert_eq!(fields.work_type.as_deref(), Some("Техническое обслуживание"));
    }

    #[test]
    fn work_type_none_without_keywords() {
        assert_eq!(extract("Передача документов").work_type, None);
    }

    #[test]
    fn classify_service_act() {
        assert_eq!(classify(SAMPLE_ACT), DocumentType::ServiceAct);
    }

    #[test]
    fn classify_invoice_and_contract() {
        assert_eq!(classify("Счет на оплату № 5"), DocumentType::Invoice);
        assert_eq!(classify("ДОГОВОР поставки"), DocumentType::Contract);
        assert_eq!(classify("случайный текст"), DocumentType::Unknown);
    }

    #[test]
    fn classify_act_alone_is_not_service_act() {
        // Needs both keywords, otherwise any document titled "АКТ" would match
        assert_eq!(classify("АКТ сверки"), DocumentType::Unknown);
    }

    #[test]
    fn document_type_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&DocumentType::ServiceAct).unwrap(),
            "\"service_act\""
        );
    }

    #[test]
    fn empty_text_yields_empty_fields() {
        let fields = extract("");
        assert_eq!(fields, DocumentFields {
            quantity: 1,
            ..DocumentFields::default()
        });
    }
}
