//! Doctor Endpoints - Appointments, prescriptions, reports, and visit history

use std::sync::Arc;

use axum::extract::{Extension, Path};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use super::error::{ok, ApiError};
use crate::auth::AuthSession;
use crate::models::{Appointment, AppointmentStatus, MedicalReport, Prescription, Role, Visit};
use crate::store::{collections, DocumentStore};

pub fn routes() -> Router {
    Router::new()
        .route("/appointments", get(list_appointments).post(create_appointment))
        .route(
            "/appointments/:id",
            axum::routing::patch(update_appointment_status),
        )
        .route("/prescriptions", get(list_prescriptions).post(create_prescription))
        .route("/reports", get(list_reports).post(create_report))
        .route("/history", get(visit_history))
}

fn require_doctor(session: &AuthSession) -> Result<(String, String), ApiError> {
    if session.role != Role::Doctor {
        return Err(ApiError::forbidden("doctor access required"));
    }
    let hospital_id = session
        .hospital_id
        .clone()
        .ok_or_else(|| ApiError::forbidden("no hospital affiliation"))?;
    Ok((session.user_id.clone(), hospital_id))
}

async fn list_appointments(
    Extension(store): Extension<Arc<DocumentStore>>,
    Extension(session): Extension<AuthSession>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (doctor_id, _) = require_doctor(&session)?;
    let mut appointments: Vec<Appointment> = store
        .find(collections::APPOINTMENTS, &[("doctorId", json!(doctor_id))])
        .await
        .into_iter()
        .filter_map(|doc| serde_json::from_value(doc).ok())
        .collect();
    appointments.sort_by_key(|a| a.scheduled_for);
    Ok(ok(appointments))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppointmentBody {
    patient_id: String,
    scheduled_for: DateTime<Utc>,
    #[serde(default)]
    reason: String,
}

async fn create_appointment(
    Extension(store): Extension<Arc<DocumentStore>>,
    Extension(session): Extension<AuthSession>,
    Json(body): Json<AppointmentBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (doctor_id, hospital_id) = require_doctor(&session)?;
    if body.patient_id.trim().is_empty() {
        return Err(ApiError::bad_request("patientId must not be empty"));
    }
    if store.get(collections::USERS, body.patient_id.trim()).await.is_none() {
        return Err(ApiError::not_found("patient not found"));
    }

    let appointment = Appointment {
        id: uuid::Uuid::new_v4().to_string(),
        patient_id: body.patient_id.trim().to_string(),
        doctor_id,
        hospital_id,
        scheduled_for: body.scheduled_for,
        reason: body.reason.trim().to_string(),
        status: AppointmentStatus::Scheduled,
        created_at: Utc::now(),
    };
    store
        .insert(collections::APPOINTMENTS, &appointment.id, json!(&appointment))
        .await
        .map_err(ApiError::from)?;
    Ok(ok(appointment))
}

#[derive(Deserialize)]
struct AppointmentStatusBody {
    status: AppointmentStatus,
}

async fn update_appointment_status(
    Extension(store): Extension<Arc<DocumentStore>>,
    Extension(session): Extension<AuthSession>,
    Path(id): Path<String>,
    Json(body): Json<AppointmentStatusBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (doctor_id, _) = require_doctor(&session)?;
    let appointment: Appointment = store
        .get(collections::APPOINTMENTS, &id)
        .await
        .and_then(|doc| serde_json::from_value(doc).ok())
        .filter(|a: &Appointment| a.doctor_id == doctor_id)
        .ok_or_else(|| ApiError::not_found("appointment not found"))?;

    let mut fields = serde_json::Map::new();
    fields.insert("status".to_string(), json!(body.status));
    store
        .update(collections::APPOINTMENTS, &appointment.id, fields)
        .await
        .map_err(ApiError::from)?;
    Ok(ok(json!({ "id": appointment.id, "status": body.status })))
}

async fn list_prescriptions(
    Extension(store): Extension<Arc<DocumentStore>>,
    Extension(session): Extension<AuthSession>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (doctor_id, _) = require_doctor(&session)?;
    let mut prescriptions: Vec<Prescription> = store
        .find(collections::PRESCRIPTIONS, &[("doctorId", json!(doctor_id))])
        .await
        .into_iter()
        .filter_map(|doc| serde_json::from_value(doc).ok())
        .collect();
    prescriptions.sort_by(|a, b| b.issued_at.cmp(&a.issued_at));
    Ok(ok(prescriptions))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PrescriptionBody {
    patient_id: String,
    #[serde(default)]
    visit_id: Option<String>,
    medication: String,
    dosage: String,
    frequency: String,
    duration_days: u32,
    #[serde(default)]
    notes: String,
}

async fn create_prescription(
    Extension(store): Extension<Arc<DocumentStore>>,
    Extension(session): Extension<AuthSession>,
    Json(body): Json<PrescriptionBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (doctor_id, hospital_id) = require_doctor(&session)?;
    if body.medication.trim().is_empty() {
        return Err(ApiError::bad_request("medication must not be empty"));
    }
    if body.patient_id.trim().is_empty() {
        return Err(ApiError::bad_request("patientId must not be empty"));
    }

    let prescription = Prescription {
        id: uuid::Uuid::new_v4().to_string(),
        patient_id: body.patient_id.trim().to_string(),
        doctor_id,
        hospital_id,
        visit_id: body.visit_id,
        medication: body.medication.trim().to_string(),
        dosage: body.dosage.trim().to_string(),
        frequency: body.frequency.trim().to_string(),
        duration_days: body.duration_days,
        notes: body.notes.trim().to_string(),
        issued_at: Utc::now(),
    };
    store
        .insert(collections::PRESCRIPTIONS, &prescription.id, json!(&prescription))
        .await
        .map_err(ApiError::from)?;
    Ok(ok(prescription))
}

async fn list_reports(
    Extension(store): Extension<Arc<DocumentStore>>,
    Extension(session): Extension<AuthSession>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (doctor_id, _) = require_doctor(&session)?;
    let mut reports: Vec<MedicalReport> = store
        .find(collections::MEDICAL_REPORTS, &[("doctorId", json!(doctor_id))])
        .await
        .into_iter()
        .filter_map(|doc| serde_json::from_value(doc).ok())
        .collect();
    reports.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(ok(reports))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportBody {
    patient_id: String,
    #[serde(default)]
    visit_id: Option<String>,
    title: String,
    findings: String,
    #[serde(default)]
    recommendations: String,
}

async fn create_report(
    Extension(store): Extension<Arc<DocumentStore>>,
    Extension(session): Extension<AuthSession>,
    Json(body): Json<ReportBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (doctor_id, hospital_id) = require_doctor(&session)?;
    if body.patient_id.trim().is_empty() {
        return Err(ApiError::bad_request("patientId must not be empty"));
    }
    if body.title.trim().is_empty() {
        return Err(ApiError::bad_request("title must not be empty"));
    }
    if body.findings.trim().is_empty() {
        return Err(ApiError::bad_request("findings must not be empty"));
    }

    let report = MedicalReport {
        id: uuid::Uuid::new_v4().to_string(),
        patient_id: body.patient_id.trim().to_string(),
        doctor_id,
        hospital_id,
        visit_id: body.visit_id,
        title: body.title.trim().to_string(),
        findings: body.findings.trim().to_string(),
        recommendations: body.recommendations.trim().to_string(),
        created_at: Utc::now(),
    };
    store
        .insert(collections::MEDICAL_REPORTS, &report.id, json!(&report))
        .await
        .map_err(ApiError::from)?;
    Ok(ok(report))
}

/// All visits at the caller's hospital, newest first.
async fn visit_history(
    Extension(store): Extension<Arc<DocumentStore>>,
    Extension(session): Extension<AuthSession>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (_, hospital_id) = require_doctor(&session)?;
    let mut visits: Vec<Visit> = store
        .find(collections::VISITS, &[("hospitalId", json!(hospital_id))])
        .await
        .into_iter()
        .filter_map(|doc| serde_json::from_value(doc).ok())
        .collect();
    visits.sort_by(|a, b| b.check_in_time.cmp(&a.check_in_time));
    Ok(ok(visits))
}
