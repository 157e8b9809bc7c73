// src/classify.rs
// Row Classifier: maps a raw (role text, company name) pair to a role
// category and, for subcontractors, one or more trade tags. Pure function
// over the inputs plus the static keyword tables below.

use crate::models::{ClassificationKey, CompanyClassification, ImportRow, OurRole, TradeType};

/// Non-construction professions that appear in BCI exports but are never
/// imported: designers, certifiers, consultants of every stripe.
const EXCLUDED_PROFESSION_KEYWORDS: [&str; 8] = [
    "design",
    "engineer",
    "consultant",
    "assessment",
    "acoustic",
    "fire",
    "environmental",
    "planning",
];

const HEAD_CONTRACTOR_KEYWORDS: [&str; 4] = [
    "project manager",
    "coordinator",
    "head contractor",
    "principal contractor",
];

const BUILDER_KEYWORDS: [&str; 3] = ["builder", "owner", "developer"];

const SUBCONTRACTOR_KEYWORDS: [&str; 3] = ["subcontractor", "sub-contractor", "sub contractor"];

/// Trade inference keyed on the role text.
const ROLE_TRADE_KEYWORDS: [(&str, TradeType); 22] = [
    ("concrete", TradeType::Concrete),
    ("concreting", TradeType::Concrete),
    ("formwork", TradeType::FormWork),
    ("form work", TradeType::FormWork),
    ("forming", TradeType::FormWork),
    ("steel fixing", TradeType::SteelFixing),
    ("reinforcement", TradeType::SteelFixing),
    ("electrical", TradeType::Electrical),
    ("plumbing", TradeType::Plumbing),
    ("scaffold", TradeType::Scaffolding),
    ("crane", TradeType::CraneAndRigging),
    ("rigging", TradeType::CraneAndRigging),
    ("demolition", TradeType::Demolition),
    ("earthworks", TradeType::Earthworks),
    ("excavation", TradeType::Earthworks),
    ("painting", TradeType::Painting),
    ("plastering", TradeType::Plastering),
    ("carpentry", TradeType::Carpentry),
    ("bricklaying", TradeType::Bricklaying),
    ("roofing", TradeType::Roofing),
    ("glazing", TradeType::Glazing),
    ("tiling", TradeType::Tiling),
];

/// Trade inference keyed on keywords in the company name itself; BCI role
/// strings are often just "Subcontractor" while the name carries the trade.
const NAME_TRADE_KEYWORDS: [(&str, TradeType); 20] = [
    ("concrete", TradeType::Concrete),
    ("formwork", TradeType::FormWork),
    ("electrical", TradeType::Electrical),
    ("electric", TradeType::Electrical),
    ("plumbing", TradeType::Plumbing),
    ("scaffold", TradeType::Scaffolding),
    ("crane", TradeType::CraneAndRigging),
    ("demolition", TradeType::Demolition),
    ("excavation", TradeType::Earthworks),
    ("earthmoving", TradeType::Earthworks),
    ("painting", TradeType::Painting),
    ("plaster", TradeType::Plastering),
    ("carpentry", TradeType::Carpentry),
    ("bricklaying", TradeType::Bricklaying),
    ("roofing", TradeType::Roofing),
    ("glazing", TradeType::Glazing),
    ("tiling", TradeType::Tiling),
    ("landscap", TradeType::Landscaping),
    ("labour hire", TradeType::LabourHire),
    ("traffic", TradeType::TrafficManagement),
];

/// Classify one import row. Returns `should_import = false` for blank
/// companies and excluded professions; everything else lands in exactly one
/// role bucket, first matching rule wins.
pub fn classify(role_text: &str, company_name: &str) -> CompanyClassification {
    classify_row_inner(String::new(), role_text, company_name)
}

/// Classify with the full key retained, for batch use.
pub fn classify_row(row: &ImportRow) -> CompanyClassification {
    classify_row_inner(row.bci_project_id.clone(), &row.role_on_project, &row.company_name)
}

fn classify_row_inner(
    bci_project_id: String,
    role_text: &str,
    company_name: &str,
) -> CompanyClassification {
    let key = ClassificationKey {
        bci_project_id,
        company_name: company_name.to_string(),
        role_on_project: role_text.to_string(),
    };
    let role_lower = role_text.to_lowercase();

    if company_name.trim().is_empty() || is_excluded_profession(&role_lower) {
        return CompanyClassification {
            key,
            our_role: OurRole::Skip,
            trade_types: Vec::new(),
            should_import: false,
            employer_id: None,
            user_confirmed: false,
            user_excluded: false,
        };
    }

    let (our_role, trade_types) = if HEAD_CONTRACTOR_KEYWORDS
        .iter()
        .any(|kw| role_lower.contains(kw))
    {
        (OurRole::HeadContractor, Vec::new())
    } else if BUILDER_KEYWORDS.iter().any(|kw| role_lower.contains(kw))
        || (role_lower.contains("principal") && role_lower.contains("client"))
    {
        (OurRole::Builder, Vec::new())
    } else if SUBCONTRACTOR_KEYWORDS.iter().any(|kw| role_lower.contains(kw)) {
        (OurRole::Subcontractor, detect_trade_types(role_text, company_name))
    } else if role_lower.contains("contractor") {
        (OurRole::Subcontractor, detect_trade_types(role_text, company_name))
    } else {
        // Unrecognized roles default to subcontractor rather than dropping
        // the row; the operator can still exclude it at review.
        (OurRole::Subcontractor, detect_trade_types(role_text, company_name))
    };

    CompanyClassification {
        key,
        our_role,
        trade_types,
        should_import: true,
        employer_id: None,
        user_confirmed: false,
        user_excluded: false,
    }
}

fn is_excluded_profession(role_lower: &str) -> bool {
    EXCLUDED_PROFESSION_KEYWORDS
        .iter()
        .any(|kw| role_lower.contains(kw))
}

/// Infer trade tags: union of role-text keywords, company-name keywords and
/// the multi-trade heuristics, order-preserving and deduplicated. Falls back
/// to `general_construction` when nothing matched.
pub fn detect_trade_types(role_text: &str, company_name: &str) -> Vec<TradeType> {
    let role_lower = role_text.to_lowercase();
    let name_lower = company_name.to_lowercase();
    let mut trades: Vec<TradeType> = Vec::new();

    for (keyword, trade) in &ROLE_TRADE_KEYWORDS {
        if role_lower.contains(keyword) {
            push_unique(&mut trades, *trade);
        }
    }

    for (keyword, trade) in &NAME_TRADE_KEYWORDS {
        if name_lower.contains(keyword) {
            push_unique(&mut trades, *trade);
        }
    }

    // Multi-trade heuristics: combined names advertise combined crews.
    if name_lower.contains("concrete") && name_lower.contains("form") {
        push_unique(&mut trades, TradeType::Concrete);
        push_unique(&mut trades, TradeType::FormWork);
    }
    if name_lower.contains("concrete") && name_lower.contains("steel") {
        push_unique(&mut trades, TradeType::Concrete);
        push_unique(&mut trades, TradeType::SteelFixing);
    }
    if name_lower.contains("crane") && name_lower.contains("rigging") {
        push_unique(&mut trades, TradeType::TowerCrane);
        push_unique(&mut trades, TradeType::MobileCrane);
        push_unique(&mut trades, TradeType::CraneAndRigging);
    }

    if trades.is_empty() {
        trades.push(TradeType::GeneralConstruction);
    }
    trades
}

fn push_unique(trades: &mut Vec<TradeType>, trade: TradeType) {
    if !trades.contains(&trade) {
        trades.push(trade);
    }
}
