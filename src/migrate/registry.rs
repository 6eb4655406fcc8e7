use std::collections::BTreeMap;

use super::sql::{BOOTSTRAP_DOWN, BOOTSTRAP_UP};
use crate::error::PgSteadyError;

/// One versioned schema change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStep {
    pub version: i32,
    pub up: String,
    /// `None` when the version cannot be rolled back.
    pub down: Option<String>,
}

/// Up/down bodies collected by [`MigrationRegistry::version`].
#[derive(Debug, Clone, Default)]
pub struct MigrationBuilder {
    up: String,
    down: Option<String>,
}

impl MigrationBuilder {
    #[must_use]
    pub fn up(mut self, sql: impl Into<String>) -> Self {
        self.up = sql.into();
        self
    }

    #[must_use]
    pub fn down(mut self, sql: impl Into<String>) -> Self {
        self.down = Some(sql.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanDirection {
    Up,
    Down,
}

/// Ordered steps taking the schema from one version to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationPlan {
    pub direction: PlanDirection,
    pub steps: Vec<MigrationStep>,
}

impl MigrationPlan {
    #[must_use]
    pub fn versions(&self) -> Vec<i32> {
        self.steps.iter().map(|s| s.version).collect()
    }
}

/// Contiguous set of migrations, always starting with the built-in version 0 that
/// creates the tracking and lock tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRegistry {
    steps: BTreeMap<i32, MigrationStep>,
}

impl Default for MigrationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MigrationRegistry {
    #[must_use]
    pub fn new() -> Self {
        let bootstrap = MigrationStep {
            version: 0,
            up: BOOTSTRAP_UP.to_string(),
            down: Some(BOOTSTRAP_DOWN.to_string()),
        };
        Self {
            steps: BTreeMap::from([(0, bootstrap)]),
        }
    }

    /// Register the next version.
    ///
    /// # Errors
    /// `InvalidVersion` for a negative version, `DuplicateVersion` for one already
    /// registered, `BrokenVersionSequence` unless `version` is exactly one past the latest.
    pub fn register(
        &mut self,
        version: i32,
        up: impl Into<String>,
        down: impl Into<String>,
    ) -> Result<&mut Self, PgSteadyError> {
        self.insert(version, up.into(), Some(down.into()))
    }

    fn insert(
        &mut self,
        version: i32,
        up: String,
        down: Option<String>,
    ) -> Result<&mut Self, PgSteadyError> {
        if version < 0 {
            return Err(PgSteadyError::InvalidVersion(version));
        }
        if self.steps.contains_key(&version) {
            return Err(PgSteadyError::DuplicateVersion(version));
        }
        let expected = self.latest() + 1;
        if version != expected {
            return Err(PgSteadyError::BrokenVersionSequence {
                expected,
                found: version,
            });
        }
        self.steps.insert(version, MigrationStep { version, up, down });
        Ok(self)
    }

    /// Register a version through a builder:
    ///
    /// ```rust
    /// use pg_steady::migrate::MigrationRegistry;
    ///
    /// let mut registry = MigrationRegistry::new();
    /// registry
    ///     .version(1, |m| {
    ///         m.up("CREATE TABLE users (id SERIAL PRIMARY KEY)")
    ///             .down("DROP TABLE users")
    ///     })
    ///     .unwrap();
    /// assert_eq!(registry.latest(), 1);
    /// ```
    ///
    /// Leaving out `down` makes the version irreversible: rolling back past it fails
    /// with `IrreversibleVersion`.
    ///
    /// # Errors
    /// See [`MigrationRegistry::register`].
    pub fn version<F>(&mut self, version: i32, define: F) -> Result<&mut Self, PgSteadyError>
    where
        F: FnOnce(MigrationBuilder) -> MigrationBuilder,
    {
        let built = define(MigrationBuilder::default());
        self.insert(version, built.up, built.down)
    }

    #[must_use]
    pub fn latest(&self) -> i32 {
        self.steps.keys().next_back().copied().unwrap_or(0)
    }

    #[must_use]
    pub fn contains(&self, version: i32) -> bool {
        self.steps.contains_key(&version)
    }

    #[must_use]
    pub fn get(&self, version: i32) -> Option<&MigrationStep> {
        self.steps.get(&version)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MigrationStep> {
        self.steps.values()
    }

    /// Add versions recorded in the database that this build does not know about.
    /// Registered bodies win over recorded ones.
    pub(crate) fn merge_drift(&mut self, recorded: Vec<MigrationStep>) {
        for step in recorded {
            self.steps.entry(step.version).or_insert(step);
        }
    }

    /// Steps to move from `current` to `target`. `current` is `-1` before bootstrap.
    ///
    /// Forward plans cover `(current, target]` ascending; rollbacks cover
    /// `(target, current]` descending.
    ///
    /// # Errors
    /// `UnknownVersion` for a gap in the range and `IrreversibleVersion` for a rollback
    /// step without a down body.
    pub fn plan(&self, current: i32, target: i32) -> Result<MigrationPlan, PgSteadyError> {
        if target >= current {
            let steps = ((current + 1)..=target)
                .map(|v| self.get(v).cloned().ok_or(PgSteadyError::UnknownVersion(v)))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(MigrationPlan {
                direction: PlanDirection::Up,
                steps,
            });
        }
        let steps = ((target + 1)..=current)
            .rev()
            .map(|v| {
                let step = self.get(v).ok_or(PgSteadyError::UnknownVersion(v))?;
                if step.down.is_none() {
                    return Err(PgSteadyError::IrreversibleVersion(v));
                }
                Ok(step.clone())
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(MigrationPlan {
            direction: PlanDirection::Down,
            steps,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three() -> MigrationRegistry {
        let mut registry = MigrationRegistry::new();
        registry
            .register(1, "CREATE TABLE a (id INT)", "DROP TABLE a")
            .unwrap()
            .register(2, "CREATE TABLE b (id INT)", "DROP TABLE b")
            .unwrap();
        registry
    }

    #[test]
    fn bootstrap_is_version_zero() {
        let registry = MigrationRegistry::new();
        assert_eq!(registry.latest(), 0);
        assert!(registry.get(0).unwrap().up.contains("schema_lock"));
    }

    #[test]
    fn registration_enforces_sequence() {
        let mut registry = three();
        assert!(matches!(
            registry.register(2, "", ""),
            Err(PgSteadyError::DuplicateVersion(2))
        ));
        assert!(matches!(
            registry.register(4, "", ""),
            Err(PgSteadyError::BrokenVersionSequence {
                expected: 3,
                found: 4
            })
        ));
        assert!(matches!(
            registry.register(-1, "", ""),
            Err(PgSteadyError::InvalidVersion(-1))
        ));
        assert!(matches!(
            registry.register(0, "", ""),
            Err(PgSteadyError::DuplicateVersion(0))
        ));
    }

    #[test]
    fn forward_plan_is_ascending() {
        let plan = three().plan(0, 2).unwrap();
        assert_eq!(plan.direction, PlanDirection::Up);
        assert_eq!(plan.versions(), vec![1, 2]);

        let bootstrap = three().plan(-1, 1).unwrap();
        assert_eq!(bootstrap.versions(), vec![0, 1]);
    }

    #[test]
    fn rollback_plan_is_descending_and_keeps_target() {
        let plan = three().plan(2, 0).unwrap();
        assert_eq!(plan.direction, PlanDirection::Down);
        assert_eq!(plan.versions(), vec![2, 1]);
        assert_eq!(three().plan(2, 1).unwrap().versions(), vec![2]);
    }

    #[test]
    fn drift_merge_prefers_registered_bodies() {
        let mut registry = three();
        registry.merge_drift(vec![
            MigrationStep {
                version: 2,
                up: "other".into(),
                down: None,
            },
            MigrationStep {
                version: 3,
                up: "CREATE TABLE c (id INT)".into(),
                down: None,
            },
        ]);
        assert_eq!(registry.get(2).unwrap().up, "CREATE TABLE b (id INT)");
        assert_eq!(registry.latest(), 3);
        assert!(matches!(
            registry.plan(3, 2),
            Err(PgSteadyError::IrreversibleVersion(3))
        ));
    }

    #[test]
    fn version_without_down_is_irreversible() {
        let mut registry = MigrationRegistry::new();
        registry
            .version(1, |m| m.up("CREATE TABLE a (id INT)"))
            .unwrap();
        assert_eq!(registry.get(1).unwrap().down, None);
        assert!(matches!(
            registry.plan(1, 0),
            Err(PgSteadyError::IrreversibleVersion(1))
        ));
    }

    #[test]
    fn plan_reports_gaps() {
        assert!(matches!(
            three().plan(0, 5),
            Err(PgSteadyError::UnknownVersion(3))
        ));
    }
}
