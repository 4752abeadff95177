//! Appraisal records, their workflow status and canonical content
use std::fmt;
use std::str::FromStr;

use chrono::Utc;

use crate::error::{AppraisalError, Result};
use crate::fingerprint::fingerprint;
use crate::types::{Amount, TimeStamp};

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cbor(index_only)]
pub enum Status {
    #[n(0)]
    Requested,
    #[n(1)]
    QuotePending,
    #[n(2)]
    QuoteRejected,
    #[n(3)]
    InProgress,
    #[n(4)]
    ConceptPending,
    #[n(5)]
    ConceptApproved,
    #[n(6)]
    ConceptRejected,
    #[n(7)]
    Signed,
    #[n(8)]
    Finalized,
}

impl Status {
    pub const ALL: [Status; 9] = [
        Status::Requested,
        Status::QuotePending,
        Status::QuoteRejected,
        Status::InProgress,
        Status::ConceptPending,
        Status::ConceptApproved,
        Status::ConceptRejected,
        Status::Signed,
        Status::Finalized,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Requested => "REQUESTED",
            Status::QuotePending => "QUOTE PENDING",
            Status::QuoteRejected => "QUOTE REJECTED",
            Status::InProgress => "IN PROGRESS",
            Status::ConceptPending => "CONCEPT PENDING",
            Status::ConceptApproved => "CONCEPT APPROVED",
            Status::ConceptRejected => "CONCEPT REJECTED",
            Status::Signed => "SIGNED",
            Status::Finalized => "FINALIZED",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// case-insensitive, surrounding whitespace ignored
impl FromStr for Status {
    type Err = AppraisalError;

    fn from_str(s: &str) -> Result<Self> {
        let folded = s.trim().to_uppercase();
        Status::ALL
            .into_iter()
            .find(|status| status.as_str() == folded)
            .ok_or_else(|| AppraisalError::InvalidStatus(s.to_string()))
    }
}

/// Names of the fingerprinted fields, in fingerprint order.
pub const CANONICAL_FIELDS: [&str; 21] = [
    "appraisal_id",
    "property_id",
    "appraiser",
    "requestor",
    "request_date",
    "client",
    "quote_date",
    "quote_price",
    "address",
    "description",
    "building_plan",
    "plot_size",
    "floor_area",
    "building_volume",
    "land_quality",
    "building_quality",
    "photo_exterior",
    "photo_interior",
    "photo_surroundings",
    "environment_report",
    "valuation",
];

/// The attested document: everything an appraiser writes into a concept.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Default, Clone, PartialEq, Eq)]
#[cbor(map)]
pub struct AppraisalContent {
    #[n(0)]
    pub address: String,
    #[n(1)]
    pub description: String,
    #[n(2)]
    pub building_plan: String, // document reference
    #[n(3)]
    pub plot_size: String,
    #[n(4)]
    pub floor_area: String,
    #[n(5)]
    pub building_volume: String,
    #[n(6)]
    pub land_quality: String,
    #[n(7)]
    pub building_quality: String,
    #[n(8)]
    pub photo_exterior: String,
    #[n(9)]
    pub photo_interior: String,
    #[n(10)]
    pub photo_surroundings: String,
    #[n(11)]
    pub environment_report: String, // document reference
    #[n(12)]
    pub valuation: Amount,
}

/// Concept content as supplied by the appraiser, valuation still unparsed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConceptFields {
    pub address: String,
    pub description: String,
    pub building_plan: String,
    pub plot_size: String,
    pub floor_area: String,
    pub building_volume: String,
    pub land_quality: String,
    pub building_quality: String,
    pub photo_exterior: String,
    pub photo_interior: String,
    pub photo_surroundings: String,
    pub environment_report: String,
    pub valuation: String,
}

impl ConceptFields {
    pub const COUNT: usize = 13;

    /// Builds the fields from positional arguments in canonical order.
    pub fn from_args(args: &[String]) -> Option<Self> {
        let [
            address,
            description,
            building_plan,
            plot_size,
            floor_area,
            building_volume,
            land_quality,
            building_quality,
            photo_exterior,
            photo_interior,
            photo_surroundings,
            environment_report,
            valuation,
        ] = args
        else {
            return None;
        };
        Some(Self {
            address: address.clone(),
            description: description.clone(),
            building_plan: building_plan.clone(),
            plot_size: plot_size.clone(),
            floor_area: floor_area.clone(),
            building_volume: building_volume.clone(),
            land_quality: land_quality.clone(),
            building_quality: building_quality.clone(),
            photo_exterior: photo_exterior.clone(),
            photo_interior: photo_interior.clone(),
            photo_surroundings: photo_surroundings.clone(),
            environment_report: environment_report.clone(),
            valuation: valuation.clone(),
        })
    }

    pub fn into_content(self) -> Result<AppraisalContent> {
        let valuation = Amount::parse("valuation", &self.valuation)?;
        Ok(AppraisalContent {
            address: self.address,
            description: self.description,
            building_plan: self.building_plan,
            plot_size: self.plot_size,
            floor_area: self.floor_area,
            building_volume: self.building_volume,
            land_quality: self.land_quality,
            building_quality: self.building_quality,
            photo_exterior: self.photo_exterior,
            photo_interior: self.photo_interior,
            photo_surroundings: self.photo_surroundings,
            environment_report: self.environment_report,
            valuation,
        })
    }
}

/// Creation payload for a new appraisal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppraisalRequest {
    pub requestor: String,
    pub appraiser: String,
    pub client: String,
    pub property_id: String,
    /// initial status text, `REQUESTED` when absent
    pub status: Option<String>,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
#[cbor(map)]
pub struct Appraisal {
    #[n(0)]
    pub appraisal_id: String,
    #[n(1)]
    pub property_id: String,
    #[n(2)]
    pub appraiser: String,
    #[n(3)]
    pub requestor: String,
    #[n(4)]
    pub client: String,
    #[n(5)]
    pub status: Status,
    #[n(6)]
    pub request_date: TimeStamp<Utc>,
    #[n(7)]
    pub quote_price: Amount,
    #[n(8)]
    pub quote_date: Option<TimeStamp<Utc>>,
    #[n(9)]
    pub content: AppraisalContent,
    #[n(10)]
    pub appraiser_signature: Option<String>,
    #[n(11)]
    pub requestor_signature: Option<String>,
    #[n(12)]
    pub client_signature: Option<String>,
    #[n(13)]
    pub client_quote_signature: Option<String>,
}

impl Appraisal {
    pub fn new(appraisal_id: String, request: &AppraisalRequest, status: Status) -> Self {
        Self {
            appraisal_id,
            property_id: request.property_id.clone(),
            appraiser: request.appraiser.clone(),
            requestor: request.requestor.clone(),
            client: request.client.clone(),
            status,
            request_date: TimeStamp::new(),
            quote_price: Amount::ZERO,
            quote_date: None,
            content: AppraisalContent::default(),
            appraiser_signature: None,
            requestor_signature: None,
            client_signature: None,
            client_quote_signature: None,
        }
    }

    /// The fingerprinted fields in [`CANONICAL_FIELDS`] order. Dates render
    /// as epoch milliseconds, amounts with two decimals.
    pub fn canonical_fields(&self) -> Vec<String> {
        let c = &self.content;
        vec![
            self.appraisal_id.clone(),
            self.property_id.clone(),
            self.appraiser.clone(),
            self.requestor.clone(),
            self.request_date.as_millis().to_string(),
            self.client.clone(),
            self.quote_date
                .as_ref()
                .map(|date| date.as_millis().to_string())
                .unwrap_or_default(),
            self.quote_price.to_string(),
            c.address.clone(),
            c.description.clone(),
            c.building_plan.clone(),
            c.plot_size.clone(),
            c.floor_area.clone(),
            c.building_volume.clone(),
            c.land_quality.clone(),
            c.building_quality.clone(),
            c.photo_exterior.clone(),
            c.photo_interior.clone(),
            c.photo_surroundings.clone(),
            c.environment_report.clone(),
            c.valuation.to_string(),
        ]
    }

    pub fn fingerprint(&self) -> String {
        fingerprint(&self.canonical_fields())
    }

    /// True once both concept counter-signatures are present.
    pub fn has_concept_quorum(&self) -> bool {
        self.requestor_signature.is_some() && self.client_signature.is_some()
    }
}
