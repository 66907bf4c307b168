//! Named captures of parameter values.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ModelError, ModelResult};
use crate::symbols::SymbolTable;

/// Immutable record of free-parameter values at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    name: String,
    values: BTreeMap<String, f64>,
    taken_at: DateTime<Utc>,
}

impl Snapshot {
    /// Snapshot name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Captured values by parameter name.
    #[must_use]
    pub fn values(&self) -> &BTreeMap<String, f64> {
        &self.values
    }

    /// Captured value of one parameter.
    #[must_use]
    pub fn get(&self, parameter: &str) -> Option<f64> {
        self.values.get(parameter).copied()
    }

    /// When the snapshot was taken.
    #[must_use]
    pub const fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }
}

/// Snapshots keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotStore {
    snapshots: BTreeMap<String, Snapshot>,
}

impl SnapshotStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Captures the current values of `parameters` under `name`, replacing
    /// any snapshot already stored under that name.
    ///
    /// # Errors
    /// - `UnknownReference` if a name is not a declared parameter
    /// - `ReadOnlyParameter` if a name is a derived parameter
    pub fn save(
        &mut self,
        symbols: &SymbolTable,
        name: &str,
        parameters: &[String],
    ) -> ModelResult<()> {
        let mut values = BTreeMap::new();
        for p in parameters {
            let value = symbols
                .parameter(p)?
                .value()
                .ok_or_else(|| ModelError::ReadOnlyParameter { name: p.clone() })?;
            values.insert(p.clone(), value);
        }
        let snapshot = Snapshot {
            name: name.to_string(),
            values,
            taken_at: Utc::now(),
        };
        if self.snapshots.insert(name.to_string(), snapshot).is_some() {
            warn!(snapshot = name, "replaced existing snapshot");
        } else {
            debug!(snapshot = name, parameters = parameters.len(), "saved snapshot");
        }
        Ok(())
    }

    /// Writes the stored values back into `symbols`.
    ///
    /// Every value is checked against the parameter's current bounds before
    /// any is written, so a failed restore changes nothing.
    ///
    /// # Errors
    /// - `UnknownSnapshot` if no snapshot is stored under `name`
    /// - `UnknownReference` / `ReadOnlyParameter` if a captured parameter no
    ///   longer resolves to a free parameter
    /// - `BoundsViolation` if a value lies outside current bounds
    pub fn restore(&self, symbols: &mut SymbolTable, name: &str) -> ModelResult<()> {
        let snapshot = self.snapshots.get(name).ok_or_else(|| ModelError::UnknownSnapshot {
            name: name.to_string(),
        })?;
        for (p, &value) in &snapshot.values {
            let bounds = symbols
                .parameter(p)?
                .bounds()
                .ok_or_else(|| ModelError::ReadOnlyParameter { name: p.clone() })?;
            if !bounds.contains(value) {
                return Err(ModelError::BoundsViolation {
                    name: p.clone(),
                    value,
                    lower: bounds.lower,
                    upper: bounds.upper,
                });
            }
        }
        for (p, &value) in &snapshot.values {
            symbols.set_value(p, value)?;
        }
        debug!(snapshot = name, "restored snapshot");
        Ok(())
    }

    /// Looks up a snapshot.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Snapshot> {
        self.snapshots.get(name)
    }

    /// Snapshot names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.snapshots.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Snapshot> {
        self.snapshots.values()
    }

    /// Checks that every captured parameter is a free parameter of
    /// `symbols`. Used after loading an artifact.
    pub(crate) fn check_against(&self, symbols: &SymbolTable) -> ModelResult<()> {
        for snapshot in self.snapshots.values() {
            for (p, value) in &snapshot.values {
                let free = symbols.parameter(p).map(|param| param.is_free()).unwrap_or(false);
                if !free || !value.is_finite() {
                    return Err(ModelError::corrupt(format!(
                        "snapshot '{}' holds an invalid value for '{p}'",
                        snapshot.name
                    )));
                }
            }
        }
        for (key, snapshot) in &self.snapshots {
            if *key != snapshot.name {
                return Err(ModelError::corrupt(format!(
                    "snapshot stored as '{key}' is named '{}'",
                    snapshot.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declare::declare;

    fn table() -> SymbolTable {
        let mut t = SymbolTable::new();
        declare(&mut t, "m1[-1,-3,3]").unwrap();
        declare(&mut t, "f[0.3,0,1]").unwrap();
        declare(&mut t, "expr::twice('2*m1',{m1})").unwrap();
        t
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_save_set_restore() {
        let mut t = table();
        let mut store = SnapshotStore::new();
        store.save(&t, "point", &names(&["m1"])).unwrap();
        t.set_value("m1", 0.5).unwrap();
        store.restore(&mut t, "point").unwrap();
        assert_eq!(t.parameter("m1").unwrap().value(), Some(-1.0));
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let mut t = table();
        let mut store = SnapshotStore::new();
        store.save(&t, "point", &names(&["m1", "f"])).unwrap();
        t.set_value("m1", 2.0).unwrap();
        assert_eq!(store.get("point").unwrap().get("m1"), Some(-1.0));
    }

    #[test]
    fn test_unknown_and_derived_names() {
        let t = table();
        let mut store = SnapshotStore::new();
        assert!(matches!(
            store.save(&t, "p", &names(&["nope"])),
            Err(ModelError::UnknownReference { .. })
        ));
        assert!(matches!(
            store.save(&t, "p", &names(&["twice"])),
            Err(ModelError::ReadOnlyParameter { .. })
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_restore_unknown_snapshot() {
        let mut t = table();
        let store = SnapshotStore::new();
        assert!(matches!(
            store.restore(&mut t, "missing"),
            Err(ModelError::UnknownSnapshot { .. })
        ));
    }

    #[test]
    fn test_restore_out_of_bounds_is_all_or_nothing() {
        let mut t = table();
        let mut store = SnapshotStore::new();
        store.save(&t, "point", &names(&["f", "m1"])).unwrap();
        t.set_value("f", 0.9).unwrap();
        t.set_range("m1", 0.0, 3.0).unwrap();
        let err = store.restore(&mut t, "point").unwrap_err();
        assert!(err.is_bounds_violation());
        assert_eq!(t.parameter("f").unwrap().value(), Some(0.9));
    }

    #[test]
    fn test_save_replaces() {
        let mut t = table();
        let mut store = SnapshotStore::new();
        store.save(&t, "point", &names(&["m1"])).unwrap();
        t.set_value("m1", 1.0).unwrap();
        store.save(&t, "point", &names(&["m1"])).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("point").unwrap().get("m1"), Some(1.0));
    }
}
