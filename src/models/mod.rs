//! Models Module - Document shapes persisted in the store
//!
//! Every struct here serializes camelCase to match the document collections
//! (`users`, `visits`, `accessGrants`, `eHealthPassports`, ...). Role and
//! status fields are closed enums, not free strings, so a typo cannot become
//! a silent no-op branch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User roles. Staff roles carry a hospital affiliation on the user record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    HospitalAdmin,
    Doctor,
    Nurse,
    Patient,
}

impl Role {
    /// Roles allowed to run hospital-side workflows (check-in, check-out).
    pub fn is_staff(self) -> bool {
        matches!(self, Role::HospitalAdmin | Role::Doctor | Role::Nurse)
    }

    pub fn is_admin(self) -> bool {
        matches!(self, Role::SuperAdmin | Role::HospitalAdmin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::SuperAdmin => "super_admin",
            Role::HospitalAdmin => "hospital_admin",
            Role::Doctor => "doctor",
            Role::Nurse => "nurse",
            Role::Patient => "patient",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    /// Stored lowercase; lookups are case-insensitive.
    pub email: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hospital_id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub setup_complete: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HospitalStatus {
    Active,
    Pending,
    Inactive,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hospital {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub status: HospitalStatus,
    pub admin_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitStatus {
    CheckedIn,
    CheckedOut,
}

/// One hospital encounter. The id is derived from patient, hospital and the
/// check-in timestamp rather than being random.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Visit {
    pub id: String,
    pub patient_id: String,
    pub hospital_id: String,
    pub check_in_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_out_time: Option<DateTime<Utc>>,
    pub status: VisitStatus,
    pub purpose: String,
    pub department: String,
    pub is_first_visit: bool,
}

impl Visit {
    pub fn derive_id(patient_id: &str, hospital_id: &str, at: DateTime<Utc>) -> String {
        format!("visit_{}_{}_{}", patient_id, hospital_id, at.timestamp_millis())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantStatus {
    Active,
    Revoked,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Read,
    Write,
}

/// Scopes a hospital's access to one patient's records to a single visit.
/// The only transition is `active -> revoked`, performed at check-out.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessGrant {
    pub id: String,
    pub patient_id: String,
    pub hospital_id: String,
    pub visit_id: String,
    pub granted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
    pub permissions: Vec<Permission>,
    pub status: GrantStatus,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(default)]
    pub line1: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default)]
    pub country: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalInfo {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub date_of_birth: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub blood_group: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: Address,
}

/// Medication entry as shown in the patient scheduler.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicationEntry {
    pub name: String,
    pub dosage: String,
    pub frequency: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicalHistory {
    #[serde(default)]
    pub allergies: Vec<String>,
    #[serde(default)]
    pub chronic_conditions: Vec<String>,
    #[serde(default)]
    pub medications: Vec<MedicationEntry>,
    #[serde(default)]
    pub surgeries: Vec<String>,
    #[serde(default)]
    pub immunizations: Vec<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitHistory {
    pub total_visits: u32,
    /// Deduplicated, in order of first visit.
    pub hospitals_visited: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_visit_date: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentFlags {
    pub share_with_treating_hospital: bool,
    pub share_for_research: bool,
}

impl Default for ConsentFlags {
    fn default() -> Self {
        Self {
            share_with_treating_hospital: true,
            share_for_research: false,
        }
    }
}

/// Cross-hospital medical record shell, keyed by patient id (one per
/// patient). Created lazily on the first check-in anywhere; history arrays
/// only grow afterwards.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthPassport {
    pub patient_id: String,
    pub is_active: bool,
    pub personal_info: PersonalInfo,
    pub medical_history: MedicalHistory,
    pub visit_history: VisitHistory,
    pub consent: ConsentFlags,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activated_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// One AI symptom-analysis run. Immutable after creation; `result` is stored
/// exactly as the upstream model returned it.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisSession {
    pub id: String,
    pub patient_id: String,
    pub symptoms: serde_json::Value,
    pub result: serde_json::Value,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    CheckIn,
    CheckOut,
    PassportActivated,
    HospitalProvisioned,
    AdminStatusChanged,
    AdminDeleted,
}

/// Append-only audit record. Never mutated or deleted.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub id: String,
    pub user_id: String,
    pub action: AuditAction,
    pub resource_type: String,
    pub resource_id: String,
    pub metadata: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        user_id: &str,
        action: AuditAction,
        resource_type: &str,
        resource_id: &str,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            action,
            resource_type: resource_type.to_string(),
            resource_id: resource_id.to_string(),
            metadata,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Completed,
    Cancelled,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: String,
    pub patient_id: String,
    pub doctor_id: String,
    pub hospital_id: String,
    pub scheduled_for: DateTime<Utc>,
    pub reason: String,
    pub status: AppointmentStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prescription {
    pub id: String,
    pub patient_id: String,
    pub doctor_id: String,
    pub hospital_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visit_id: Option<String>,
    pub medication: String,
    pub dosage: String,
    pub frequency: String,
    pub duration_days: u32,
    #[serde(default)]
    pub notes: String,
    pub issued_at: DateTime<Utc>,
}

/// Clinical report written by a doctor, optionally tied to a visit.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicalReport {
    pub id: String,
    pub patient_id: String,
    pub doctor_id: String,
    pub hospital_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visit_id: Option<String>,
    pub title: String,
    pub findings: String,
    #[serde(default)]
    pub recommendations: String,
    pub created_at: DateTime<Utc>,
}

/// Tenant-scoped catalog record (staff roles and departments share the shape).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantRecord {
    pub id: String,
    pub hospital_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}
