#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Crime table records and the major-category taxonomy.
//!
//! The borough crime table is a flat file with one row per borough, month
//! and category. Only the `Borough`, `CrimeType` and `CrimeCount` columns
//! are used; everything else in the file is ignored on load.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Top-level categories used by the Metropolitan Police recorded crime
/// tables.
///
/// The serialized form is the exact label found in the `CrimeType` column.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum MajorCategory {
    /// Residential and non-residential burglary
    #[serde(rename = "Burglary")]
    #[strum(serialize = "Burglary")]
    Burglary,
    /// Criminal damage to property and vehicles
    #[serde(rename = "Criminal Damage")]
    #[strum(serialize = "Criminal Damage")]
    CriminalDamage,
    /// Possession and trafficking offences
    #[serde(rename = "Drugs")]
    #[strum(serialize = "Drugs")]
    Drugs,
    #[serde(rename = "Fraud & Forgery")]
    #[strum(serialize = "Fraud & Forgery")]
    FraudForgery,
    #[serde(rename = "Other Notifiable Offences")]
    #[strum(serialize = "Other Notifiable Offences")]
    OtherNotifiable,
    /// Personal and business robbery
    #[serde(rename = "Robbery")]
    #[strum(serialize = "Robbery")]
    Robbery,
    #[serde(rename = "Sexual Offences")]
    #[strum(serialize = "Sexual Offences")]
    SexualOffences,
    /// Theft from person, shoplifting, handling stolen goods, vehicle theft
    #[serde(rename = "Theft & Handling")]
    #[strum(serialize = "Theft & Handling")]
    TheftHandling,
    #[serde(rename = "Violence Against The Person")]
    #[strum(serialize = "Violence Against The Person")]
    ViolenceAgainstThePerson,
}

impl MajorCategory {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Burglary,
            Self::CriminalDamage,
            Self::Drugs,
            Self::FraudForgery,
            Self::OtherNotifiable,
            Self::Robbery,
            Self::SexualOffences,
            Self::TheftHandling,
            Self::ViolenceAgainstThePerson,
        ]
    }

    /// Case-insensitive lookup by label, tolerating surrounding whitespace.
    ///
    /// Source tables are not consistent about capitalization
    /// (`Violence Against the Person` vs `Violence Against The Person`).
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::all()
            .iter()
            .copied()
            .find(|c| c.as_ref().eq_ignore_ascii_case(label))
    }
}

/// One row of the borough crime table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrimeRecord {
    /// Region name used as the join key against the polygon dataset.
    #[serde(rename = "Borough")]
    pub borough: String,
    /// Category label, usually one of [`MajorCategory`].
    #[serde(rename = "CrimeType")]
    pub crime_type: String,
    #[serde(rename = "CrimeCount")]
    pub crime_count: u64,
}

impl CrimeRecord {
    /// Creates a record from its three fields.
    #[must_use]
    pub fn new(borough: impl Into<String>, crime_type: impl Into<String>, crime_count: u64) -> Self {
        Self {
            borough: borough.into(),
            crime_type: crime_type.into(),
            crime_count,
        }
    }

    /// Whether this record's category label equals `label` (exact match
    /// after trimming).
    #[must_use]
    pub fn is_category(&self, label: &str) -> bool {
        self.crime_type.trim() == label.trim()
    }
}
