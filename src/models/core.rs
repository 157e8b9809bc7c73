// src/models/core.rs
// Domain entities for the BCI import pipeline: the raw row shape coming out
// of the CSV export, the per-row classification the pipeline derives, and
// the external employer record the store owns.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Role the pipeline assigns a company on a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OurRole {
    Builder,
    HeadContractor,
    Subcontractor,
    Skip,
}

impl OurRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            OurRole::Builder => "builder",
            OurRole::HeadContractor => "head_contractor",
            OurRole::Subcontractor => "subcontractor",
            OurRole::Skip => "skip",
        }
    }
}

impl fmt::Display for OurRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Trade specialty tags for subcontractors. Closed set; unknown roles fall
/// back to `GeneralConstruction` rather than inventing new tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeType {
    Concrete,
    FormWork,
    SteelFixing,
    Electrical,
    Plumbing,
    Scaffolding,
    CraneAndRigging,
    TowerCrane,
    MobileCrane,
    Demolition,
    Earthworks,
    Painting,
    Plastering,
    Carpentry,
    Bricklaying,
    Roofing,
    Glazing,
    Tiling,
    Landscaping,
    Cleaning,
    LabourHire,
    TrafficManagement,
    GeneralConstruction,
}

impl TradeType {
    pub const ALL: [TradeType; 23] = [
        TradeType::Concrete,
        TradeType::FormWork,
        TradeType::SteelFixing,
        TradeType::Electrical,
        TradeType::Plumbing,
        TradeType::Scaffolding,
        TradeType::CraneAndRigging,
        TradeType::TowerCrane,
        TradeType::MobileCrane,
        TradeType::Demolition,
        TradeType::Earthworks,
        TradeType::Painting,
        TradeType::Plastering,
        TradeType::Carpentry,
        TradeType::Bricklaying,
        TradeType::Roofing,
        TradeType::Glazing,
        TradeType::Tiling,
        TradeType::Landscaping,
        TradeType::Cleaning,
        TradeType::LabourHire,
        TradeType::TrafficManagement,
        TradeType::GeneralConstruction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TradeType::Concrete => "concrete",
            TradeType::FormWork => "form_work",
            TradeType::SteelFixing => "steel_fixing",
            TradeType::Electrical => "electrical",
            TradeType::Plumbing => "plumbing",
            TradeType::Scaffolding => "scaffolding",
            TradeType::CraneAndRigging => "crane_and_rigging",
            TradeType::TowerCrane => "tower_crane",
            TradeType::MobileCrane => "mobile_crane",
            TradeType::Demolition => "demolition",
            TradeType::Earthworks => "earthworks",
            TradeType::Painting => "painting",
            TradeType::Plastering => "plastering",
            TradeType::Carpentry => "carpentry",
            TradeType::Bricklaying => "bricklaying",
            TradeType::Roofing => "roofing",
            TradeType::Glazing => "glazing",
            TradeType::Tiling => "tiling",
            TradeType::Landscaping => "landscaping",
            TradeType::Cleaning => "cleaning",
            TradeType::LabourHire => "labour_hire",
            TradeType::TrafficManagement => "traffic_management",
            TradeType::GeneralConstruction => "general_construction",
        }
    }
}

impl fmt::Display for TradeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TradeType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TradeType::ALL
            .iter()
            .find(|t| t.as_str() == s)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("unknown trade type '{}'", s))
    }
}

/// One line of the BCI CSV/XLSX export. Immutable input to the pipeline;
/// project metadata repeats on every company row for the same project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportRow {
    #[serde(alias = "Project ID", alias = "project_id")]
    pub bci_project_id: String,
    #[serde(alias = "Project Name")]
    pub project_name: String,
    #[serde(alias = "Role", alias = "Role on Project")]
    pub role_on_project: String,
    #[serde(alias = "Company", alias = "Company Name")]
    pub company_name: String,
    #[serde(default, alias = "Project Value", alias = "Value")]
    pub value: Option<f64>,
    #[serde(default, alias = "Construction Start Date")]
    pub construction_start_date: Option<NaiveDate>,
    #[serde(default, alias = "Construction End Date")]
    pub construction_end_date: Option<NaiveDate>,
    #[serde(default, alias = "Project Address", alias = "Address")]
    pub address: Option<String>,
    #[serde(default, alias = "Project Town / Suburb", alias = "Suburb")]
    pub suburb: Option<String>,
    #[serde(default, alias = "Project Province / State", alias = "State")]
    pub state: Option<String>,
    #[serde(default, alias = "Post Code", alias = "Postcode")]
    pub postcode: Option<String>,
    #[serde(default, alias = "Project Stage", alias = "Stage")]
    pub stage: Option<String>,
    #[serde(default, alias = "Latitude")]
    pub latitude: Option<f64>,
    #[serde(default, alias = "Longitude")]
    pub longitude: Option<f64>,
}

/// Identity of one classification: a company in a given role on a given
/// project. Two rows with the same key collapse to one classification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClassificationKey {
    pub bci_project_id: String,
    pub company_name: String,
    pub role_on_project: String,
}

/// Derived per (project, company, role). Created by the classifier, mutated
/// by review actions; never deleted, only marked excluded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyClassification {
    pub key: ClassificationKey,
    pub our_role: OurRole,
    /// Ordered; first entry is the primary trade.
    pub trade_types: Vec<TradeType>,
    pub should_import: bool,
    pub employer_id: Option<String>,
    pub user_confirmed: bool,
    pub user_excluded: bool,
}

impl CompanyClassification {
    pub fn primary_trade(&self) -> Option<TradeType> {
        self.trade_types.first().copied()
    }
}

/// Employer record as the external store holds it. The pipeline reads,
/// creates and links these; it does not own their lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Employer {
    pub id: String,
    pub name: String,
    pub address: Option<String>,
    pub suburb: Option<String>,
    pub state: Option<String>,
    pub postcode: Option<String>,
}

/// Project fields the executor persists, lifted off the first row seen for
/// each `bci_project_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub bci_project_id: String,
    pub name: String,
    pub value: Option<f64>,
    pub construction_start_date: Option<NaiveDate>,
    pub construction_end_date: Option<NaiveDate>,
    pub address: Option<String>,
    pub suburb: Option<String>,
    pub state: Option<String>,
    pub postcode: Option<String>,
    pub stage: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl ProjectRecord {
    pub fn from_row(row: &ImportRow) -> Self {
        Self {
            bci_project_id: row.bci_project_id.clone(),
            name: row.project_name.clone(),
            value: row.value,
            construction_start_date: row.construction_start_date,
            construction_end_date: row.construction_end_date,
            address: row.address.clone(),
            suburb: row.suburb.clone(),
            state: row.state.clone(),
            postcode: row.postcode.clone(),
            stage: row.stage.clone(),
            latitude: row.latitude,
            longitude: row.longitude,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trade_type_strings_round_trip() {
        for trade in TradeType::ALL {
            assert_eq!(trade.as_str().parse::<TradeType>().unwrap(), trade);
        }
        assert!("not_a_trade".parse::<TradeType>().is_err());
    }
}
