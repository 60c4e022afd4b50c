//! Edits to published apps, and repair of what interrupted writes leave.

use std::collections::{BTreeMap, BTreeSet, HashMap, hash_map::Entry};

use log::{info, warn};
use wayfare_core::{
    AppKey, CacheInvalidator, CitiesAndCountries, DirectoryStore, LocationKey, TransitApp,
    TransitAppLocation,
};

use crate::{
    AgencySupport, Clock, LocationStep, ScreenshotProcessor, SubmissionError,
    SubmissionWizard,
    wizard::{apply_agency_support, apply_locations},
};

/// How an app's declared cities compare with its stored location rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationConsistency {
    /// City slugs the app declares.
    pub declared: BTreeSet<String>,
    /// City slugs with at least one stored row.
    pub stored: BTreeSet<String>,
    /// Declared slugs without a row, once per missing row.
    pub missing: Vec<String>,
    /// Rows the app does not declare, and rows beyond the first for each
    /// declared city.
    pub orphaned: Vec<LocationKey>,
}

impl LocationConsistency {
    /// Every declared city has exactly one row and every row is declared.
    pub fn is_consistent(&self) -> bool {
        self.missing.is_empty() && self.orphaned.is_empty()
    }
}

/// Declared `(slug, details)` entries still waiting for a row.
#[derive(Debug, Default)]
struct RowBudget(BTreeMap<(String, String), usize>);

impl RowBudget {
    fn for_app(app: &TransitApp) -> Self {
        let mut budget = BTreeMap::new();
        let entries = app
            .explicitly_supported_city_slugs
            .iter()
            .cloned()
            .zip(app.explicitly_supported_city_details.iter().cloned());
        for entry in entries {
            *budget.entry(entry).or_insert(0) += 1;
        }
        Self(budget)
    }

    /// Take the slot `row` fills; `false` if it is undeclared or surplus.
    fn claim(&mut self, row: &TransitAppLocation) -> bool {
        let entry = (row.city_slug.clone(), row.city_details.clone());
        match self.0.get_mut(&entry) {
            Some(left) if *left > 0 => {
                *left -= 1;
                true
            }
            _ => false,
        }
    }

    fn unclaimed(self) -> impl Iterator<Item = String> {
        self.0
            .into_iter()
            .flat_map(|((slug, _), left)| std::iter::repeat_n(slug, left))
    }
}

impl<S, C, P, K> SubmissionWizard<S, C, P, K>
where
    S: DirectoryStore,
    C: CacheInvalidator,
    P: ScreenshotProcessor,
    K: Clock,
{
    /// Replace an app's declared places and its location rows.
    ///
    /// New rows are written before old ones are removed, so a failure part
    /// way through leaves extra rows rather than missing ones. The app
    /// itself is written according to [`FinalizeOrder`](crate::FinalizeOrder).
    pub fn replace_locations(
        &mut self,
        key: AppKey,
        places: &CitiesAndCountries,
        available_globally: bool,
    ) -> Result<TransitApp, SubmissionError> {
        let mut app = self.existing_app(key)?;
        let old_rows = self
            .store
            .locations_for_app(key)
            .map(|row| row.map(|row| row.key))
            .collect::<Result<Vec<_>, _>>()?;

        app.clear_explicit_locations();
        app.date_last_updated = self.clock.now();
        let step = LocationStep {
            places: places.clone(),
            available_globally,
        };
        let pending = apply_locations(&mut app, &step);
        self.publish(&app, pending)?;
        self.delete_locations(&old_rows)?;
        info!(
            "replaced locations of app {} ({} rows removed)",
            app.slug,
            old_rows.len()
        );
        Ok(app)
    }

    /// Replace an app's agency relationships.
    pub fn replace_agency_support(
        &mut self,
        key: AppKey,
        support: &AgencySupport,
    ) -> Result<TransitApp, SubmissionError> {
        if matches!(support, AgencySupport::Specific(keys) if keys.is_empty()) {
            return Err(SubmissionError::EmptyAgencySelection);
        }
        let mut app = self.existing_app(key)?;
        apply_agency_support(&mut app, support);
        app.date_last_updated = self.clock.now();
        self.put_app(&app)?;
        Ok(app)
    }

    /// Hide or reveal an app. Hidden apps drop out of every resolver.
    pub fn set_hidden(&mut self, key: AppKey, hidden: bool) -> Result<TransitApp, SubmissionError> {
        let mut app = self.existing_app(key)?;
        app.is_hidden = hidden;
        app.date_last_updated = self.clock.now();
        self.put_app(&app)?;
        Ok(app)
    }

    /// Delete an app, then its location rows.
    pub fn delete_app(&mut self, key: AppKey) -> Result<(), SubmissionError> {
        let app = self.existing_app(key)?;
        let rows = self
            .store
            .locations_for_app(key)
            .map(|row| row.map(|row| row.key))
            .collect::<Result<Vec<_>, _>>()?;
        self.write("delete app", true, |store| store.delete_app(key))?;
        self.delete_locations(&rows)?;
        info!("deleted app {} with {} location rows", app.slug, rows.len());
        Ok(())
    }

    /// Compare an app's declared cities with its stored rows.
    pub fn location_consistency(
        &self,
        key: AppKey,
    ) -> Result<LocationConsistency, SubmissionError> {
        let app = self.existing_app(key)?;
        let mut budget = RowBudget::for_app(&app);
        let mut report = LocationConsistency {
            declared: app.explicitly_supported_city_slugs.into_iter().collect(),
            ..LocationConsistency::default()
        };
        for row in self.store.locations_for_app(key) {
            let row = row?;
            if !budget.claim(&row) {
                report.orphaned.push(row.key);
            }
            report.stored.insert(row.city_slug);
        }
        report.missing = budget.unclaimed().collect();
        Ok(report)
    }

    /// Delete location rows whose app is gone or no longer declares the
    /// row's city, and every row after the first for a declared city.
    ///
    /// Returns the number of rows deleted.
    pub fn collect_orphan_locations(&mut self) -> Result<usize, SubmissionError> {
        let mut budgets = HashMap::<AppKey, Option<RowBudget>>::new();
        let mut orphans = Vec::new();
        for row in self.store.all_locations() {
            let row = row?;
            let budget = match budgets.entry(row.app) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    entry.insert(self.store.app(row.app)?.as_ref().map(RowBudget::for_app))
                }
            };
            let keep = budget.as_mut().is_some_and(|budget| budget.claim(&row));
            if !keep {
                orphans.push(row.key);
            }
        }
        self.delete_locations(&orphans)?;
        if !orphans.is_empty() {
            warn!("collected {} orphan location rows", orphans.len());
        }
        Ok(orphans.len())
    }

    fn delete_locations(&mut self, keys: &[LocationKey]) -> Result<(), SubmissionError> {
        for key in keys {
            self.write("delete location", true, |store| store.delete_location(*key))?;
        }
        Ok(())
    }

    fn existing_app(&self, key: AppKey) -> Result<TransitApp, SubmissionError> {
        self.store
            .app(key)?
            .ok_or(SubmissionError::AppNotFound { key })
    }
}
