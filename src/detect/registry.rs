use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Result};

use super::backend::DetectorBackend;

/// A backend handle that the registry, the gateway and the worker thread share.
pub type SharedBackend = Arc<Mutex<dyn DetectorBackend>>;

/// Named detector backends, one of which is the default.
///
/// Names come from `DetectorBackend::name` and are kept in sorted order, so
/// label lookups that pass over the default walk the remaining backends
/// alphabetically.
#[derive(Default)]
pub struct BackendRegistry {
    entries: BTreeMap<String, SharedBackend>,
    default: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `backend`, replacing any backend registered under the same name.
    /// Until `set_default` is called the earliest registration is the default.
    pub fn register<B: DetectorBackend + 'static>(&mut self, backend: B) {
        let name = backend.name().to_string();
        log::debug!("BackendRegistry: registered {}", name);
        self.default.get_or_insert_with(|| name.clone());
        self.entries.insert(name, Arc::new(Mutex::new(backend)));
    }

    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.entries.contains_key(name) {
            bail!("no detector backend named '{}'", name);
        }
        self.default = Some(name.to_string());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<SharedBackend> {
        self.entries.get(name).map(Arc::clone)
    }

    pub fn default_backend(&self) -> Option<SharedBackend> {
        self.get(self.default.as_deref()?)
    }

    pub fn list(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// The default backend if it reports `label`, otherwise the first other
    /// backend by name that does.
    pub fn backend_for_label(&self, label: &str) -> Result<SharedBackend> {
        let default = self.default.as_deref();
        let ordered = default
            .and_then(|name| self.entries.get_key_value(name))
            .into_iter()
            .chain(self.entries.iter().filter(|(name, _)| Some(name.as_str()) != default));

        for (name, backend) in ordered {
            if reports_label(name, backend, label)? {
                return Ok(Arc::clone(backend));
            }
        }
        Err(anyhow!("no registered backend reports label '{}'", label))
    }
}

fn reports_label(name: &str, backend: &SharedBackend, label: &str) -> Result<bool> {
    let guard = backend
        .lock()
        .map_err(|_| anyhow!("backend {} poisoned by an earlier panic", name))?;
    Ok(guard.supports_label(label))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::backends::color::ColorRange;
    use crate::detect::backends::{ColorBackend, StubBackend};

    #[test]
    fn first_registered_is_default() {
        let mut registry = BackendRegistry::new();
        registry.register(StubBackend::new(Vec::new()));
        registry.register(ColorBackend::new("red", ColorRange::RED));
        let backend = registry.default_backend().unwrap();
        assert_eq!(backend.lock().unwrap().name(), "stub");
        assert_eq!(registry.list(), vec!["color", "stub"]);
    }

    #[test]
    fn set_default_rejects_unknown_backend() {
        let mut registry = BackendRegistry::new();
        registry.register(StubBackend::new(Vec::new()));
        assert!(registry.set_default("tract").is_err());
        assert!(registry.set_default("stub").is_ok());
    }

    #[test]
    fn label_lookup_falls_back_past_default() -> Result<()> {
        let mut registry = BackendRegistry::new();
        registry.register(ColorBackend::new("green", ColorRange::GREEN));
        registry.register(ColorBackend::new("red", ColorRange::RED).named("color-red"));
        let backend = registry.backend_for_label("red")?;
        assert!(backend.lock().unwrap().supports_label("red"));
        assert!(registry.backend_for_label("cup").is_err());
        Ok(())
    }
}
