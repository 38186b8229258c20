//! Human and JSON rendering for command results.

use chrono::Local;
use presenca_capture::{CheckStatus, PreflightCheck};
use presenca_core::{
    AttendanceEvent, Class, MatchResult, Profile, ProfileId, RosterSummary, SchoolLocation,
};
use presenca_service::{RegistrationOutcome, Severity, VerificationOutcome};
use serde_json::json;
use std::collections::HashMap;
use std::process::ExitCode;

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn marker(severity: Severity) -> &'static str {
    match severity {
        Severity::Success => "ok",
        Severity::Warning => "warning",
        Severity::Info => "info",
        Severity::Error => "error",
    }
}

/// Errors exit non-zero; warnings and infos still count as handled.
pub fn exit_code(severity: Severity) -> ExitCode {
    match severity {
        Severity::Error => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    }
}

pub fn render_distance(meters: f64, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(&json!({ "distance_meters": meters }));
    }
    println!("{meters:.1} m");
    Ok(())
}

pub fn render_compare(result: &MatchResult, threshold: f32, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(&json!({
            "matched": result.matched,
            "confidence": result.confidence,
            "distance": result.distance_score,
            "threshold": threshold,
        }));
    }
    println!(
        "{} (distance {:.4}, threshold {threshold}, confidence {:.2})",
        if result.matched { "match" } else { "no match" },
        result.distance_score,
        result.confidence
    );
    Ok(())
}

pub fn render_location(location: Option<&SchoolLocation>, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(&json!({ "school_location": location }));
    }
    match location {
        Some(l) => println!("{} at {} (radius {:.0} m)", l.name, l.center, l.radius_meters),
        None => println!("No school location configured"),
    }
    Ok(())
}

pub fn render_profiles(profiles: &[Profile], json: bool) -> anyhow::Result<()> {
    if json {
        let rows: Vec<_> = profiles
            .iter()
            .map(|p| {
                json!({
                    "id": p.id,
                    "full_name": p.full_name,
                    "registration_number": p.registration_number,
                    "role": p.role,
                    "class_id": p.class_id,
                    "registered": p.is_registered(),
                })
            })
            .collect();
        return print_json(&json!(rows));
    }
    if profiles.is_empty() {
        println!("No profiles");
    }
    for p in profiles {
        println!(
            "{}  {:<20} {:<8} {:<40} {}",
            p.id,
            p.registration_number,
            p.role.as_str(),
            p.full_name,
            if p.is_registered() { "face registered" } else { "no face" }
        );
    }
    Ok(())
}

pub fn render_classes(classes: &[Class], json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(&json!(classes));
    }
    if classes.is_empty() {
        println!("No classes");
    }
    for c in classes {
        println!("{}  {:<30} {}", c.id, c.name, c.description.as_deref().unwrap_or("-"));
    }
    Ok(())
}

pub fn render_removed(kind: &str, name: &str, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(&json!({ "removed": kind, "name": name }));
    }
    println!("Removed {kind} {name}");
    Ok(())
}

pub fn render_assignment(
    teacher: &Profile,
    class: &Class,
    assigned: bool,
    json: bool,
) -> anyhow::Result<()> {
    if json {
        return print_json(&json!({
            "teacher_id": teacher.id,
            "class_id": class.id,
            "assigned": assigned,
        }));
    }
    if assigned {
        println!("{} now teaches {}", teacher.full_name, class.name);
    } else {
        println!("{} no longer teaches {}", teacher.full_name, class.name);
    }
    Ok(())
}

pub fn render_registration(outcome: &RegistrationOutcome, json: bool) -> anyhow::Result<()> {
    let severity = outcome.severity();
    if json {
        return print_json(&json!({
            "severity": severity,
            "registered": *outcome == RegistrationOutcome::Registered,
            "message": outcome.message(),
        }));
    }
    println!("[{}] {}", marker(severity), outcome.message());
    Ok(())
}

pub fn render_verification(outcome: &VerificationOutcome, json: bool) -> anyhow::Result<()> {
    let severity = outcome.severity();
    let event = match outcome {
        VerificationOutcome::CheckedIn { event }
        | VerificationOutcome::OutOfRange { event, .. } => Some(event),
        _ => None,
    };
    if json {
        return print_json(&json!({
            "severity": severity,
            "retryable": outcome.is_retryable(),
            "message": outcome.message(),
            "attendance": event,
        }));
    }
    println!("[{}] {}", marker(severity), outcome.message());
    if outcome.is_retryable() {
        println!("You can try again.");
    }
    Ok(())
}

fn event_rows(
    events: &[AttendanceEvent],
    names: &HashMap<ProfileId, String>,
) -> Vec<serde_json::Value> {
    events
        .iter()
        .map(|e| {
            json!({
                "attendance": e,
                "full_name": names.get(&e.profile_id),
            })
        })
        .collect()
}

/// One line per event, labelled with the profile name when known.
pub fn render_events(
    events: &[AttendanceEvent],
    names: &HashMap<ProfileId, String>,
    json: bool,
) -> anyhow::Result<()> {
    if json {
        return print_json(&json!(event_rows(events, names)));
    }
    print_event_lines(events, names);
    Ok(())
}

/// A day's check-ins followed by the dashboard totals.
pub fn render_roll(
    events: &[AttendanceEvent],
    names: &HashMap<ProfileId, String>,
    summary: &RosterSummary,
    json: bool,
) -> anyhow::Result<()> {
    if json {
        return print_json(&json!({
            "attendances": event_rows(events, names),
            "summary": summary,
        }));
    }
    print_event_lines(events, names);
    println!("{}", summary_line(summary));
    Ok(())
}

fn summary_line(s: &RosterSummary) -> String {
    format!(
        "present {} ({} valid) | {} students | {} teachers | {} classes",
        s.present, s.valid, s.students, s.teachers, s.classes
    )
}

fn print_event_lines(events: &[AttendanceEvent], names: &HashMap<ProfileId, String>) {
    if events.is_empty() {
        println!("No check-ins");
    }
    for e in events {
        let name = names
            .get(&e.profile_id)
            .map(String::as_str)
            .unwrap_or("(unknown profile)");
        println!(
            "{}  {}  {:<40} {:>7.0} m  {}",
            e.attendance_date,
            e.recorded_at.with_timezone(&Local).format("%H:%M"),
            name,
            e.distance_meters,
            if e.is_valid { "valid" } else { "outside geofence" }
        );
    }
}

pub fn render_doctor(checks: &[PreflightCheck], json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(&json!({ "checks": checks }));
    }
    for check in checks {
        let status = match check.status {
            CheckStatus::Pass => "PASS",
            CheckStatus::Fail => "FAIL",
            CheckStatus::Skipped => "SKIP",
        };
        println!("{status:<5} {:<20} {}", check.name, check.message);
    }
    Ok(())
}
