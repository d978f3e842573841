//! Passport Module - E-Health passport initialization
//!
//! A passport is created once, on a patient's first-ever check-in at any
//! hospital. Field values are resolved through an ordered chain of profile
//! sources: the dedicated patient-profile document first, then the identity
//! user document, then a default. Resolution never fails; missing data just
//! falls through to the default.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::models::{
    Address, ConsentFlags, HealthPassport, MedicalHistory, PersonalInfo, VisitHistory,
};

/// Country used when no source document carries one.
pub const DEFAULT_COUNTRY: &str = "India";

/// A document that can answer dotted-path lookups ("address.city").
pub trait ProfileSource {
    fn lookup(&self, path: &str) -> Option<Value>;
}

pub struct DocSource<'a>(pub &'a Value);

impl ProfileSource for DocSource<'_> {
    fn lookup(&self, path: &str) -> Option<Value> {
        let mut current = self.0;
        for segment in path.split('.') {
            current = current.get(segment)?;
        }
        if current.is_null() {
            None
        } else {
            Some(current.clone())
        }
    }
}

/// First source producing a non-empty string wins.
fn resolve_str(sources: &[&dyn ProfileSource], path: &str, default: &str) -> String {
    for source in sources {
        if let Some(Value::String(s)) = source.lookup(path) {
            if !s.trim().is_empty() {
                return s;
            }
        }
    }
    default.to_string()
}

/// Build a fresh, active passport for `patient_id` from whatever profile data
/// exists. Medical history starts empty; the first visit is recorded by the
/// caller as part of the same write batch.
pub fn build_passport(
    patient_id: &str,
    profile_doc: Option<&Value>,
    user_doc: Option<&Value>,
    now: DateTime<Utc>,
) -> HealthPassport {
    let profile = profile_doc.map(DocSource);
    let user = user_doc.map(DocSource);
    let mut sources: Vec<&dyn ProfileSource> = Vec::new();
    if let Some(p) = profile.as_ref() {
        sources.push(p);
    }
    if let Some(u) = user.as_ref() {
        sources.push(u);
    }

    let full_name = {
        let direct = resolve_str(&sources, "fullName", "");
        if direct.is_empty() {
            let first = resolve_str(&sources, "firstName", "");
            let last = resolve_str(&sources, "lastName", "");
            format!("{} {}", first, last).trim().to_string()
        } else {
            direct
        }
    };

    HealthPassport {
        patient_id: patient_id.to_string(),
        is_active: true,
        personal_info: PersonalInfo {
            full_name,
            date_of_birth: resolve_str(&sources, "dateOfBirth", ""),
            gender: resolve_str(&sources, "gender", ""),
            blood_group: resolve_str(&sources, "bloodGroup", ""),
            phone: resolve_str(&sources, "phone", ""),
            address: Address {
                line1: resolve_str(&sources, "address.line1", ""),
                city: resolve_str(&sources, "address.city", ""),
                state: resolve_str(&sources, "address.state", ""),
                postal_code: resolve_str(&sources, "address.postalCode", ""),
                country: resolve_str(&sources, "address.country", DEFAULT_COUNTRY),
            },
        },
        medical_history: MedicalHistory::default(),
        visit_history: VisitHistory::default(),
        consent: ConsentFlags::default(),
        activated_at: Some(now),
        updated_at: now,
    }
}

/// Record one more visit on an existing passport: bump the counter, append
/// the hospital if unseen, refresh the last-visit timestamp. History arrays
/// only grow.
pub fn record_visit(passport: &mut HealthPassport, hospital_id: &str, now: DateTime<Utc>) {
    passport.visit_history.total_visits += 1;
    if !passport
        .visit_history
        .hospitals_visited
        .iter()
        .any(|h| h == hospital_id)
    {
        passport
            .visit_history
            .hospitals_visited
            .push(hospital_id.to_string());
    }
    passport.visit_history.last_visit_date = Some(now);
    passport.updated_at = now;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn profile_wins_over_user_doc() {
        let profile = json!({"gender": "female", "address": {"city": "Pune"}});
        let user = json!({"gender": "male", "phone": "555-0101", "address": {"city": "Delhi"}});
        let p = build_passport("p1", Some(&profile), Some(&user), Utc::now());

        assert_eq!(p.personal_info.gender, "female");
        assert_eq!(p.personal_info.address.city, "Pune");
        // Falls through to the user doc where the profile is silent.
        assert_eq!(p.personal_info.phone, "555-0101");
    }

    #[test]
    fn missing_everything_yields_defaults() {
        let p = build_passport("p1", None, None, Utc::now());
        assert!(p.is_active);
        assert_eq!(p.personal_info.full_name, "");
        assert_eq!(p.personal_info.address.country, DEFAULT_COUNTRY);
        assert!(p.medical_history.allergies.is_empty());
        assert_eq!(p.visit_history.total_visits, 0);
    }

    #[test]
    fn full_name_assembled_from_parts() {
        let user = json!({"firstName": "Asha", "lastName": "Rao"});
        let p = build_passport("p1", None, Some(&user), Utc::now());
        assert_eq!(p.personal_info.full_name, "Asha Rao");
    }

    #[test]
    fn blank_strings_fall_through() {
        let profile = json!({"bloodGroup": "  "});
        let user = json!({"bloodGroup": "O+"});
        let p = build_passport("p1", Some(&profile), Some(&user), Utc::now());
        assert_eq!(p.personal_info.blood_group, "O+");
    }

    #[test]
    fn record_visit_dedups_hospitals() {
        let now = Utc::now();
        let mut p = build_passport("p1", None, None, now);
        record_visit(&mut p, "h1", now);
        record_visit(&mut p, "h2", now);
        record_visit(&mut p, "h1", now);

        assert_eq!(p.visit_history.total_visits, 3);
        assert_eq!(p.visit_history.hospitals_visited, vec!["h1", "h2"]);
        assert_eq!(p.visit_history.last_visit_date, Some(now));
    }
}
