//! Certificate records – the business data that gets rendered.
//!
//! Every field is an opaque display string. Dates come in two calendars and
//! are never parsed; the renderer draws whatever the staff typed.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RecordError;

/// Municipality that issues the certificate. Each one carries the logo asset
/// drawn in the top corner of the template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Authority {
    Riyadh,
    Jeddah,
    Makkah,
    Madinah,
    Taif,
    Najran,
    Asir,
}

impl Authority {
    pub const ALL: [Authority; 7] = [
        Authority::Riyadh,
        Authority::Jeddah,
        Authority::Makkah,
        Authority::Madinah,
        Authority::Taif,
        Authority::Najran,
        Authority::Asir,
    ];

    /// Display name as stored in the `typeser` column.
    pub fn name(self) -> &'static str {
        match self {
            Authority::Riyadh => "أمانة منطقة الرياض",
            Authority::Jeddah => "أمانة محافظة جدة",
            Authority::Makkah => "أمانة العاصمة المقدسة",
            Authority::Madinah => "أمانة منطقة المدينة المنورة",
            Authority::Taif => "أمانة محافظة الطائف",
            Authority::Najran => "أمانة محافظة نجران",
            Authority::Asir => "أمانة منطقة عسير",
        }
    }

    /// Logo file name under the public `images/` directory.
    pub fn logo(self) -> &'static str {
        match self {
            Authority::Riyadh => "riyadh.jpg",
            Authority::Jeddah => "jeddah.jpg",
            Authority::Makkah => "makah.jpg",
            Authority::Madinah => "madinah.png",
            Authority::Taif => "Taif.jpg",
            Authority::Najran => "Najran.jpg",
            Authority::Asir => "assir.jpg",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, RecordError> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|a| a.name() == name)
            .ok_or_else(|| RecordError::UnknownAuthority(name.to_string()))
    }
}

impl FromStr for Authority {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One certificate row. Field names match the store's column names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CertificateRecord {
    pub id: String,
    /// Issuing authority name.
    #[serde(default)]
    pub typeser: String,
    /// Logo file derived from `typeser`.
    #[serde(default)]
    pub thelogo: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub id_number: String,
    #[serde(default)]
    pub nationality: String,
    #[serde(default)]
    pub profession: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub certificate_number: String,
    #[serde(default)]
    pub issue_date: String,
    #[serde(default)]
    pub expiry_date: String,
    #[serde(default)]
    pub issue_date_gregorian: String,
    #[serde(default)]
    pub expiry_date_gregorian: String,
    #[serde(default)]
    pub program_type: String,
    #[serde(default)]
    pub program_end_date: String,
    #[serde(default)]
    pub facility_name: String,
    #[serde(default)]
    pub facility_number: String,
    #[serde(default)]
    pub license_number: String,
    #[serde(default)]
    pub municipality: String,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub qr_code_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl CertificateRecord {
    /// A blank record with a fresh id, issued by `authority`.
    pub fn new(authority: Authority) -> Self {
        let mut record = Self {
            id: uuid::Uuid::new_v4().to_string(),
            ..Self::default()
        };
        record.set_authority(authority);
        record
    }

    /// Set the issuing authority and its derived logo together.
    pub fn set_authority(&mut self, authority: Authority) {
        self.typeser = authority.name().to_string();
        self.thelogo = authority.logo().to_string();
    }

    /// The issuing authority, when the record names one.
    pub fn authority(&self) -> Option<Result<Authority, RecordError>> {
        if self.typeser.trim().is_empty() {
            None
        } else {
            Some(Authority::from_name(&self.typeser))
        }
    }

    /// Boundary validation for records entering the core.
    pub fn check(&self) -> Result<(), RecordError> {
        if self.id.trim().is_empty() {
            return Err(RecordError::MissingId);
        }
        if let Some(authority) = self.authority() {
            let authority = authority?;
            if self.thelogo != authority.logo() {
                return Err(RecordError::InconsistentLogo {
                    expected: authority.logo().to_string(),
                    found: self.thelogo.clone(),
                });
            }
        }
        Ok(())
    }

    /// Validation for records written to the store. Unlike [`check`](Self::check)
    /// the authority is mandatory, so the logo can never drift from it.
    pub fn check_issued(&self) -> Result<(), RecordError> {
        if self.authority().is_none() {
            return Err(RecordError::MissingAuthority);
        }
        self.check()
    }

    /// Parse and validate a record from JSON.
    pub fn from_json(json: &str) -> Result<Self, RecordError> {
        let record: Self = serde_json::from_str(json)?;
        record.check()?;
        Ok(record)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Value of one of the drawn text fields.
    pub fn text(&self, field: TextField) -> &str {
        match field {
            TextField::Name => &self.name,
            TextField::IdNumber => &self.id_number,
            TextField::CertificateNumber => &self.certificate_number,
            TextField::IssueDate => &self.issue_date,
            TextField::ProgramType => &self.program_type,
            TextField::Nationality => &self.nationality,
            TextField::Profession => &self.profession,
            TextField::ExpiryDate => &self.expiry_date,
            TextField::ProgramEndDate => &self.program_end_date,
        }
    }

    /// Storage object name hint for the profile photo.
    pub fn photo_object_hint(&self) -> String {
        format!("photo_{}", self.id)
    }

    /// Storage object name hint for the verification QR code.
    pub fn qr_object_hint(&self) -> String {
        format!("qrcode_{}", self.id)
    }

    /// File name offered for the rendered PDF: `<name>.pdf`, or
    /// `certificate.pdf` when the name is blank.
    pub fn output_file_name(&self) -> String {
        let stem: String = self
            .name
            .trim()
            .chars()
            .map(|c| match c {
                '/' | '\\' | '\0' => '_',
                c => c,
            })
            .collect();
        if stem.is_empty() {
            "certificate.pdf".to_string()
        } else {
            format!("{stem}.pdf")
        }
    }
}

/// The record fields drawn as text on the certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextField {
    Name,
    IdNumber,
    CertificateNumber,
    IssueDate,
    ProgramType,
    Nationality,
    Profession,
    ExpiryDate,
    ProgramEndDate,
}

/// Partial update of a record. `id` and `qr_code_url` are not updatable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typeser: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thelogo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nationality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profession: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_date_gregorian: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date_gregorian: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program_end_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facility_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facility_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub municipality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

impl RecordPatch {
    /// Patch that switches the issuing authority (and its logo).
    pub fn authority(authority: Authority) -> Self {
        Self {
            typeser: Some(authority.name().to_string()),
            thelogo: Some(authority.logo().to_string()),
            ..Self::default()
        }
    }

    /// Copy every present field onto `record`.
    pub fn apply(&self, record: &mut CertificateRecord) {
        fn set(dst: &mut String, src: &Option<String>) {
            if let Some(v) = src {
                dst.clone_from(v);
            }
        }
        set(&mut record.typeser, &self.typeser);
        set(&mut record.thelogo, &self.thelogo);
        set(&mut record.name, &self.name);
        set(&mut record.id_number, &self.id_number);
        set(&mut record.nationality, &self.nationality);
        set(&mut record.profession, &self.profession);
        set(&mut record.gender, &self.gender);
        set(&mut record.certificate_number, &self.certificate_number);
        set(&mut record.issue_date, &self.issue_date);
        set(&mut record.expiry_date, &self.expiry_date);
        set(&mut record.issue_date_gregorian, &self.issue_date_gregorian);
        set(&mut record.expiry_date_gregorian, &self.expiry_date_gregorian);
        set(&mut record.program_type, &self.program_type);
        set(&mut record.program_end_date, &self.program_end_date);
        set(&mut record.facility_name, &self.facility_name);
        set(&mut record.facility_number, &self.facility_number);
        set(&mut record.license_number, &self.license_number);
        set(&mut record.municipality, &self.municipality);
        if let Some(url) = &self.photo_url {
            record.photo_url = Some(url.clone());
        }
    }
}
