//! Package manager stand-in for host tests

use anyhow::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::packages::PackageManager;

#[derive(Default)]
pub struct StaticPackages {
    installed: Mutex<HashMap<String, String>>,
    candidates: HashMap<String, String>,
    changes: Arc<Mutex<Vec<String>>>,
    install_keeps_newer: bool,
}

impl StaticPackages {
    pub fn with_installed(self, name: &str, version: &str) -> Self {
        self.lock().insert(name.into(), version.into());
        self
    }

    pub fn with_candidate(mut self, name: &str, version: &str) -> Self {
        self.candidates.insert(name.into(), version.into());
        self
    }

    /// Installing an exact version over an installed package leaves it in place, like yum
    pub fn without_install_downgrades(mut self) -> Self {
        self.install_keeps_newer = true;
        self
    }

    /// Log of `verb name` strings, shared with the caller
    pub fn changes(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.changes)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        match self.installed.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn record(&self, verb: &str, name: &str) {
        if let Ok(mut changes) = self.changes.lock() {
            changes.push(format!("{verb} {name}"));
        }
    }
}

impl PackageManager for StaticPackages {
    fn installed(&self, name: &str) -> Result<Option<String>> {
        Ok(self.lock().get(name).cloned())
    }

    fn candidate(&self, name: &str) -> Option<String> {
        self.candidates.get(name).cloned()
    }

    fn install(&self, name: &str, version: Option<&str>) -> Result<()> {
        self.record("install", name);
        let mut installed = self.lock();
        if self.install_keeps_newer && installed.contains_key(name) {
            return Ok(());
        }
        installed.insert(name.into(), version.unwrap_or("1.0").to_string());
        Ok(())
    }

    fn downgrade(&self, name: &str, version: &str) -> Result<()> {
        self.record("downgrade", name);
        self.lock().insert(name.into(), version.to_string());
        Ok(())
    }

    fn upgrade(&self, name: &str) -> Result<()> {
        self.record("upgrade", name);
        let version = self.candidate(name).unwrap_or_else(|| "1.0".to_string());
        self.lock().insert(name.into(), version);
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        self.record("remove", name);
        self.lock().remove(name);
        Ok(())
    }
}
