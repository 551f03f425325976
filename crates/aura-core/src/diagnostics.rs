//! Diagnostics bundle export.
//!
//! Background-sensing failures never interrupt the user; this bundle is
//! the passive surface where they become visible. The settings screen
//! renders it directly and support exports it as JSON for reproducible
//! debugging.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::ContextSnapshot;
use crate::engine::ContextEngine;
use crate::error::CoreError;
use crate::events::Event;
use crate::health::{BackgroundHealthStatus, ReconcileSummary};
use crate::storage::{EngineConfig, HistorySummary, PrivacyMode};
use crate::Result;

/// Bundle format version.
const BUNDLE_VERSION: &str = "1.0";

/// How many recent events a bundle carries.
const BUNDLE_EVENT_LIMIT: usize = 50;

/// Metadata about the diagnostics bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleMetadata {
    /// Unique id of this export, quoted in support tickets
    pub bundle_id: Uuid,
    /// Bundle format version
    pub version: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Application version
    pub app_version: String,
    /// Platform information
    pub platform: PlatformInfo,
    /// User-provided description
    pub description: Option<String>,
}

impl BundleMetadata {
    pub fn new(app_version: impl Into<String>) -> Self {
        Self {
            bundle_id: Uuid::new_v4(),
            version: BUNDLE_VERSION.to_string(),
            created_at: Utc::now(),
            app_version: app_version.into(),
            platform: PlatformInfo::current(),
            description: None,
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }
}

/// Platform information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformInfo {
    pub os: String,
    pub arch: String,
}

impl PlatformInfo {
    pub fn current() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        }
    }
}

/// Storage facts for the diagnostics screen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageInfo {
    pub schema_version: i32,
    pub history_entries: u64,
    pub oldest_entry: Option<DateTime<Utc>>,
}

/// Saved places without their coordinates. A diagnostics bundle never
/// carries raw coordinates for user-declared places.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacesInfo {
    pub count: usize,
    pub kinds: Vec<String>,
}

/// One section of a diagnostics bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum DiagnosticsData {
    /// Engine configuration as loaded
    Config(EngineConfig),
    /// Live health record
    HealthStatus(BackgroundHealthStatus),
    /// Current context snapshot
    CurrentContext(Option<ContextSnapshot>),
    /// History aggregate over the last day
    HistorySummary(HistorySummary),
    /// Recent engine events
    RecentEvents(Vec<Event>),
    /// Result of the last reconcile pass
    LastReconcile(Option<ReconcileSummary>),
    /// Location grants currently missing; empty when all are present
    PermissionGaps(Vec<String>),
    /// Schema version and history footprint
    Storage(StorageInfo),
    /// Saved places, coordinate-free
    Places(PlacesInfo),
}

impl DiagnosticsData {
    fn section_name(&self) -> &'static str {
        match self {
            DiagnosticsData::Config(_) => "Config",
            DiagnosticsData::HealthStatus(_) => "HealthStatus",
            DiagnosticsData::CurrentContext(_) => "CurrentContext",
            DiagnosticsData::HistorySummary(_) => "HistorySummary",
            DiagnosticsData::RecentEvents(_) => "RecentEvents",
            DiagnosticsData::LastReconcile(_) => "LastReconcile",
            DiagnosticsData::PermissionGaps(_) => "PermissionGaps",
            DiagnosticsData::Storage(_) => "Storage",
            DiagnosticsData::Places(_) => "Places",
        }
    }
}

/// Complete diagnostics bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsBundle {
    pub metadata: BundleMetadata,
    pub data: Vec<DiagnosticsData>,
    /// Fields removed for privacy before export.
    pub redacted_fields: Vec<String>,
}

impl DiagnosticsBundle {
    pub fn new(metadata: BundleMetadata) -> Self {
        Self {
            metadata,
            data: Vec::new(),
            redacted_fields: Vec::new(),
        }
    }

    pub fn add_data(&mut self, data: DiagnosticsData) {
        self.data.push(data);
    }

    pub fn redact(&mut self, field: impl Into<String>) {
        self.redacted_fields.push(field.into());
    }

    pub fn get_data(&self, section: &str) -> Option<&DiagnosticsData> {
        self.data.iter().find(|d| d.section_name() == section)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(CoreError::from)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(CoreError::from)
    }

    pub fn save_to_file(&self, path: &std::path::Path) -> Result<()> {
        let json = self.to_json()?;
        std::fs::write(path, json).map_err(CoreError::from)
    }

    pub fn load_from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(CoreError::from)?;
        Self::from_json(&content)
    }
}

/// Build the full bundle from a live engine.
///
/// Under the `minimal` privacy mode the current snapshot's coordinates
/// are stripped and listed in `redacted_fields`. Place coordinates are
/// never included regardless of mode.
pub fn collect(engine: &ContextEngine) -> Result<DiagnosticsBundle> {
    let metadata = BundleMetadata::new(env!("CARGO_PKG_VERSION"));
    let mut bundle = DiagnosticsBundle::new(metadata);

    bundle.add_data(DiagnosticsData::Config(engine.config().clone()));
    bundle.add_data(DiagnosticsData::HealthStatus(engine.status()));

    let privacy = engine.privacy_mode()?;
    let current = engine.current_context()?;
    let current = match (privacy, current) {
        (PrivacyMode::Minimal, Some(snapshot)) => {
            bundle.redact("current_context.latitude");
            bundle.redact("current_context.longitude");
            bundle.redact("current_context.accuracy_m");
            Some(snapshot.redacted())
        }
        (_, current) => current,
    };
    bundle.add_data(DiagnosticsData::CurrentContext(current));

    let since = Utc::now() - Duration::days(1);
    bundle.add_data(DiagnosticsData::HistorySummary(
        engine.history_summary(since)?,
    ));
    bundle.add_data(DiagnosticsData::RecentEvents(
        engine.recent_events(BUNDLE_EVENT_LIMIT),
    ));
    bundle.add_data(DiagnosticsData::LastReconcile(engine.last_reconcile()?));
    bundle.add_data(DiagnosticsData::PermissionGaps(
        engine
            .location_permissions()
            .gaps()
            .into_iter()
            .map(str::to_string)
            .collect(),
    ));
    bundle.add_data(DiagnosticsData::Storage(StorageInfo {
        schema_version: engine.schema_version(),
        history_entries: engine.history_count()?,
        oldest_entry: engine.history_oldest()?,
    }));

    let places = engine.places()?;
    bundle.add_data(DiagnosticsData::Places(PlacesInfo {
        count: places.len(),
        kinds: places.iter().map(|p| p.kind.name().to_string()).collect(),
    }));

    Ok(bundle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EvaluationSource;
    use crate::error::RegistrationError;
    use crate::places::{PlaceKind, SavedLocation};
    use crate::signals::SignalSources;
    use crate::storage::ContextStore;
    use crate::tasks::{LocationBackend, LocationPermissions};
    use std::sync::Arc;

    struct NoopBackend(LocationPermissions);

    impl LocationBackend for NoopBackend {
        fn permissions(&self) -> LocationPermissions {
            self.0
        }
        fn start_updates(&self, _m: f64) -> std::result::Result<(), RegistrationError> {
            Ok(())
        }
        fn stop_updates(&self) -> std::result::Result<(), RegistrationError> {
            Ok(())
        }
        fn arm_geofence(
            &self,
            _place: &SavedLocation,
            _radius_m: f64,
        ) -> std::result::Result<(), RegistrationError> {
            Ok(())
        }
        fn teardown_geofences(&self) -> std::result::Result<(), RegistrationError> {
            Ok(())
        }
    }

    fn engine_with_grants(grants: LocationPermissions) -> ContextEngine {
        let store = ContextStore::open_memory().unwrap();
        ContextEngine::new(
            store,
            EngineConfig::default(),
            SignalSources::default(),
            Arc::new(NoopBackend(grants)),
        )
        .unwrap()
    }

    fn engine() -> ContextEngine {
        engine_with_grants(LocationPermissions::granted())
    }

    #[test]
    fn bundle_carries_every_section() {
        let engine = engine();
        engine
            .add_place(&SavedLocation::new(PlaceKind::Home, 52.52, 13.405).unwrap())
            .unwrap();
        engine.evaluate_now(EvaluationSource::Startup).unwrap();

        let bundle = collect(&engine).unwrap();
        for section in [
            "Config",
            "HealthStatus",
            "CurrentContext",
            "HistorySummary",
            "RecentEvents",
            "LastReconcile",
            "PermissionGaps",
            "Storage",
            "Places",
        ] {
            assert!(bundle.get_data(section).is_some(), "missing {section}");
        }
        assert!(bundle.redacted_fields.is_empty());

        match bundle.get_data("Places").unwrap() {
            DiagnosticsData::Places(info) => {
                assert_eq!(info.count, 1);
                assert_eq!(info.kinds, vec!["home".to_string()]);
            }
            other => panic!("unexpected section {other:?}"),
        }
    }

    #[test]
    fn missing_grants_listed_as_permission_gaps() {
        let engine = engine_with_grants(LocationPermissions::denied());
        let bundle = collect(&engine).unwrap();
        match bundle.get_data("PermissionGaps").unwrap() {
            DiagnosticsData::PermissionGaps(gaps) => {
                assert_eq!(
                    gaps,
                    &vec![
                        "foreground_location".to_string(),
                        "background_location".to_string()
                    ]
                );
            }
            other => panic!("unexpected section {other:?}"),
        }

        let granted = self::engine();
        let bundle = collect(&granted).unwrap();
        match bundle.get_data("PermissionGaps").unwrap() {
            DiagnosticsData::PermissionGaps(gaps) => assert!(gaps.is_empty()),
            other => panic!("unexpected section {other:?}"),
        }
    }

    #[test]
    fn minimal_privacy_redacts_snapshot_coordinates() {
        let engine = engine();
        engine.set_privacy_mode(PrivacyMode::Minimal).unwrap();
        engine.evaluate_now(EvaluationSource::Startup).unwrap();

        let bundle = collect(&engine).unwrap();
        assert!(bundle
            .redacted_fields
            .contains(&"current_context.latitude".to_string()));
        match bundle.get_data("CurrentContext").unwrap() {
            DiagnosticsData::CurrentContext(Some(snapshot)) => {
                assert!(snapshot.latitude.is_none());
            }
            other => panic!("unexpected section {other:?}"),
        }
    }

    #[test]
    fn bundle_round_trips_through_json() {
        let engine = engine();
        engine.evaluate_now(EvaluationSource::Startup).unwrap();
        let bundle = collect(&engine).unwrap();

        let json = bundle.to_json().unwrap();
        let parsed = DiagnosticsBundle::from_json(&json).unwrap();
        assert_eq!(parsed.metadata.version, BUNDLE_VERSION);
        assert_eq!(parsed.metadata.bundle_id, bundle.metadata.bundle_id);
        assert_eq!(parsed.data.len(), bundle.data.len());
    }
}
