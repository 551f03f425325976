//! Background location task.
//!
//! Wraps the platform's significant-change location facility behind
//! [`LocationBackend`]. The task can only register when three
//! conditions hold at once: the operating mode is not off, the user
//! preference is on, and both location grants are present. Stopping is
//! idempotent and always tears down geofences, so a crashed or doubled
//! stop never leaves the OS tracking a ghost registration.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::RegistrationError;
use crate::health::Mode;
use crate::places::SavedLocation;
use crate::signals::LocationFix;
use crate::storage::PreferencesConfig;

/// Platform grant state for location access.
///
/// While-in-use and always-allow are separate grants on every mobile
/// platform; background registration needs both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationPermissions {
    pub foreground: bool,
    pub background: bool,
}

impl LocationPermissions {
    pub fn granted() -> Self {
        Self {
            foreground: true,
            background: true,
        }
    }

    pub fn denied() -> Self {
        Self {
            foreground: false,
            background: false,
        }
    }

    pub fn complete(self) -> bool {
        self.foreground && self.background
    }

    /// Names of the missing grants, in grant order. Empty when
    /// registration is permitted.
    pub fn gaps(self) -> Vec<&'static str> {
        let mut gaps = Vec::new();
        if !self.foreground {
            gaps.push("foreground_location");
        }
        if !self.background {
            gaps.push("background_location");
        }
        gaps
    }
}

/// The platform significant-change location facility.
pub trait LocationBackend: Send + Sync {
    /// Current grant state. Read live at every gate check; grants can
    /// be revoked from system settings at any time.
    fn permissions(&self) -> LocationPermissions;

    /// Begin delivering location updates with the given displacement
    /// filter.
    fn start_updates(&self, min_displacement_m: f64) -> Result<(), RegistrationError>;

    /// Stop delivering location updates.
    fn stop_updates(&self) -> Result<(), RegistrationError>;

    /// Replace the armed geofence with one centered on `place`.
    fn arm_geofence(&self, place: &SavedLocation, radius_m: f64) -> Result<(), RegistrationError>;

    /// Remove every geofence this process registered.
    fn teardown_geofences(&self) -> Result<(), RegistrationError>;
}

/// Manages the lifecycle of the significant-change registration.
pub struct BackgroundLocationTask {
    backend: Arc<dyn LocationBackend>,
    running: AtomicBool,
}

impl BackgroundLocationTask {
    pub fn new(backend: Arc<dyn LocationBackend>) -> Self {
        Self {
            backend,
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Live grant state from the backend.
    pub fn permissions(&self) -> LocationPermissions {
        self.backend.permissions()
    }

    /// Register for updates.
    ///
    /// All three gates are checked here, closest to the registration,
    /// so no caller can bypass one by accident.
    pub fn start(
        &self,
        mode: Mode,
        prefs: &PreferencesConfig,
        min_displacement_m: f64,
    ) -> Result<(), RegistrationError> {
        if mode == Mode::Off {
            return Err(RegistrationError::ModeBlocked {
                mode: mode.as_str().to_string(),
            });
        }
        if !prefs.background_location {
            return Err(RegistrationError::PreferenceDisabled);
        }
        let permissions = self.backend.permissions();
        if !permissions.complete() {
            return Err(RegistrationError::MissingPermission(
                permissions.gaps().join(", "),
            ));
        }
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.backend.start_updates(min_displacement_m)?;
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Unregister. Safe to call any number of times; geofence teardown
    /// runs even when the update stream was already stopped.
    pub fn stop(&self) -> Result<(), RegistrationError> {
        let was_running = self.running.swap(false, Ordering::SeqCst);
        if was_running {
            self.backend.stop_updates()?;
        }
        self.backend.teardown_geofences()
    }

    /// Re-arm the geofence around the place a delivery resolved to.
    pub fn rearm_geofence(
        &self,
        place: &SavedLocation,
        radius_m: f64,
    ) -> Result<(), RegistrationError> {
        self.backend.arm_geofence(place, radius_m)
    }
}

/// Pick the fix a batch delivery should evaluate with.
///
/// Platforms may deliver several queued fixes at once; only the newest
/// matters. Equal timestamps keep the later entry, matching delivery
/// order.
pub fn newest_fix(batch: Vec<LocationFix>) -> Option<LocationFix> {
    batch
        .into_iter()
        .reduce(|best, fix| if fix.timestamp >= best.timestamp { fix } else { best })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use std::sync::atomic::AtomicUsize;

    struct RecordingBackend {
        starts: AtomicUsize,
        stops: AtomicUsize,
        arms: AtomicUsize,
        teardowns: AtomicUsize,
        refuse: AtomicBool,
        grants: std::sync::Mutex<LocationPermissions>,
    }

    impl Default for RecordingBackend {
        fn default() -> Self {
            Self {
                starts: AtomicUsize::new(0),
                stops: AtomicUsize::new(0),
                arms: AtomicUsize::new(0),
                teardowns: AtomicUsize::new(0),
                refuse: AtomicBool::new(false),
                grants: std::sync::Mutex::new(LocationPermissions::granted()),
            }
        }
    }

    impl LocationBackend for RecordingBackend {
        fn permissions(&self) -> LocationPermissions {
            *self.grants.lock().unwrap()
        }
        fn start_updates(&self, _min_displacement_m: f64) -> Result<(), RegistrationError> {
            if self.refuse.load(Ordering::SeqCst) {
                return Err(RegistrationError::Refused("simulated".into()));
            }
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn stop_updates(&self) -> Result<(), RegistrationError> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn arm_geofence(
            &self,
            _place: &SavedLocation,
            _radius_m: f64,
        ) -> Result<(), RegistrationError> {
            self.arms.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn teardown_geofences(&self) -> Result<(), RegistrationError> {
            self.teardowns.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn fix(age_secs: i64) -> LocationFix {
        LocationFix {
            latitude: 35.0,
            longitude: 139.0,
            accuracy_m: 10.0,
            speed_mps: None,
            timestamp: Utc::now() - Duration::seconds(age_secs),
        }
    }

    #[test]
    fn off_mode_blocks_start() {
        let backend = Arc::new(RecordingBackend::default());
        let task = BackgroundLocationTask::new(Arc::clone(&backend) as Arc<dyn LocationBackend>);
        let err = task
            .start(Mode::Off, &PreferencesConfig::default(), 50.0)
            .unwrap_err();
        assert!(matches!(err, RegistrationError::ModeBlocked { .. }));
        assert!(!task.is_running());
    }

    #[test]
    fn light_mode_permits_start() {
        let backend = Arc::new(RecordingBackend::default());
        let task = BackgroundLocationTask::new(Arc::clone(&backend) as Arc<dyn LocationBackend>);
        task.start(Mode::Light, &PreferencesConfig::default(), 50.0)
            .unwrap();
        assert!(task.is_running());
    }

    #[test]
    fn missing_grant_blocks_start_before_os_call() {
        let backend = Arc::new(RecordingBackend::default());
        *backend.grants.lock().unwrap() = LocationPermissions {
            foreground: true,
            background: false,
        };
        let task = BackgroundLocationTask::new(Arc::clone(&backend) as Arc<dyn LocationBackend>);
        let err = task
            .start(Mode::Full, &PreferencesConfig::default(), 50.0)
            .unwrap_err();
        assert!(matches!(err, RegistrationError::MissingPermission(ref gap)
            if gap == "background_location"));
        assert!(!task.is_running());
        assert_eq!(backend.starts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn gaps_name_missing_grants_in_order() {
        assert!(LocationPermissions::granted().gaps().is_empty());
        assert_eq!(
            LocationPermissions::denied().gaps(),
            vec!["foreground_location", "background_location"]
        );
    }

    #[test]
    fn start_requires_preference() {
        let backend = Arc::new(RecordingBackend::default());
        let task = BackgroundLocationTask::new(Arc::clone(&backend) as Arc<dyn LocationBackend>);
        let prefs = PreferencesConfig {
            background_location: false,
            ..Default::default()
        };
        let err = task.start(Mode::Full, &prefs, 50.0).unwrap_err();
        assert!(matches!(err, RegistrationError::PreferenceDisabled));
    }

    #[test]
    fn os_refusal_leaves_task_stopped() {
        let backend = Arc::new(RecordingBackend::default());
        backend.refuse.store(true, Ordering::SeqCst);
        let task = BackgroundLocationTask::new(Arc::clone(&backend) as Arc<dyn LocationBackend>);
        assert!(task
            .start(Mode::Full, &PreferencesConfig::default(), 50.0)
            .is_err());
        assert!(!task.is_running());
    }

    #[test]
    fn double_start_registers_once() {
        let backend = Arc::new(RecordingBackend::default());
        let task = BackgroundLocationTask::new(Arc::clone(&backend) as Arc<dyn LocationBackend>);
        task.start(Mode::Full, &PreferencesConfig::default(), 50.0)
            .unwrap();
        task.start(Mode::Full, &PreferencesConfig::default(), 50.0)
            .unwrap();
        assert_eq!(backend.starts.load(Ordering::SeqCst), 1);
        assert!(task.is_running());
    }

    #[test]
    fn stop_is_idempotent_and_always_tears_down_geofences() {
        let backend = Arc::new(RecordingBackend::default());
        let task = BackgroundLocationTask::new(Arc::clone(&backend) as Arc<dyn LocationBackend>);
        task.start(Mode::Full, &PreferencesConfig::default(), 50.0)
            .unwrap();

        task.stop().unwrap();
        task.stop().unwrap();
        task.stop().unwrap();

        assert_eq!(backend.stops.load(Ordering::SeqCst), 1);
        // Teardown runs on every stop call, registered or not.
        assert_eq!(backend.teardowns.load(Ordering::SeqCst), 3);
        assert!(!task.is_running());
    }

    #[test]
    fn rearm_replaces_geofence_via_backend() {
        let backend = Arc::new(RecordingBackend::default());
        let task = BackgroundLocationTask::new(Arc::clone(&backend) as Arc<dyn LocationBackend>);
        let home = crate::places::SavedLocation::new(crate::places::PlaceKind::Home, 35.0, 139.0)
            .unwrap();
        task.rearm_geofence(&home, 150.0).unwrap();
        task.rearm_geofence(&home, 150.0).unwrap();
        assert_eq!(backend.arms.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn newest_fix_wins_the_batch() {
        let batch = vec![fix(120), fix(5), fix(60)];
        let chosen = newest_fix(batch).unwrap();
        assert!(chosen.age_secs(Utc::now()) < 10);
    }

    #[test]
    fn empty_batch_yields_nothing() {
        assert!(newest_fix(Vec::new()).is_none());
    }
}
