//! CLI subcommand implementations.

pub mod config;
pub mod context;
pub mod data;
pub mod diagnostics;
pub mod health;
pub mod place;
pub mod run;
pub mod watchdog;

use std::sync::Arc;

use aura_core::{
    ContextEngine, ContextStore, EngineConfig, LocationBackend, LocationPermissions,
    RegistrationError, SavedLocation, SignalSources,
};

/// Location backend for the CLI host.
///
/// The CLI runs on machines without location services; grants read as
/// present and registrations succeed and do nothing. Real delivery
/// happens in the mobile shells.
struct NoopBackend;

impl LocationBackend for NoopBackend {
    fn permissions(&self) -> LocationPermissions {
        LocationPermissions::granted()
    }

    fn start_updates(&self, _min_displacement_m: f64) -> Result<(), RegistrationError> {
        Ok(())
    }

    fn stop_updates(&self) -> Result<(), RegistrationError> {
        Ok(())
    }

    fn arm_geofence(&self, _place: &SavedLocation, _radius_m: f64) -> Result<(), RegistrationError> {
        Ok(())
    }

    fn teardown_geofences(&self) -> Result<(), RegistrationError> {
        Ok(())
    }
}

/// Open the engine over the on-disk store with the saved config.
///
/// No signal adapters are wired in, so evaluations run on temporal
/// context and whatever the store already holds.
pub(crate) fn open_engine() -> Result<ContextEngine, Box<dyn std::error::Error>> {
    let config = EngineConfig::load_or_default();
    let store = ContextStore::open()?;
    let engine = ContextEngine::new(store, config, SignalSources::default(), Arc::new(NoopBackend))?;
    Ok(engine)
}
