//! In-process store backed by ordered maps and R\*-trees.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rstar::{AABB, RTree, primitives::GeomWithData};

use super::{AppFilter, DirectoryStore, EntityStream, ProgressRecord, StoreError, Visibility};
use crate::{
    Agency, AgencyKey, AppKey, BoundingBox, LocationKey, TransitApp, TransitAppLocation,
};

type IndexedPoint<K> = GeomWithData<[f64; 2], K>;

/// Store holding every entity in memory.
///
/// Agency and location points are indexed in R\*-trees (`x = longitude`,
/// `y = latitude`) so bounding-box fetches do not scan every row.
///
/// # Examples
/// ```
/// use wayfare_core::{Agency, DirectoryStore, MemoryDirectoryStore};
///
/// # fn main() -> Result<(), wayfare_core::StoreError> {
/// let mut store = MemoryDirectoryStore::default();
/// let key = store.reserve_agency_key()?;
/// store.put_agency(&Agency::new(key, "Metro", "Seattle", "WA", "us", 47.6, -122.3))?;
/// assert_eq!(store.agency(key)?.map(|a| a.name), Some("Metro".to_string()));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MemoryDirectoryStore {
    agencies: BTreeMap<AgencyKey, Agency>,
    apps: BTreeMap<AppKey, TransitApp>,
    locations: BTreeMap<LocationKey, TransitAppLocation>,
    progress: BTreeMap<String, ProgressRecord>,
    agency_index: RTree<IndexedPoint<AgencyKey>>,
    location_index: RTree<IndexedPoint<LocationKey>>,
    next_agency: u64,
    next_app: u64,
    next_location: u64,
}

impl Default for MemoryDirectoryStore {
    fn default() -> Self {
        Self {
            agencies: BTreeMap::new(),
            apps: BTreeMap::new(),
            locations: BTreeMap::new(),
            progress: BTreeMap::new(),
            agency_index: RTree::new(),
            location_index: RTree::new(),
            next_agency: 1,
            next_app: 1,
            next_location: 1,
        }
    }
}

impl MemoryDirectoryStore {
    /// Number of stored location rows.
    pub fn location_count(&self) -> usize {
        self.locations.len()
    }

    /// Number of stored progress records.
    pub fn progress_count(&self) -> usize {
        self.progress.len()
    }
}

fn envelope(bbox: &BoundingBox) -> AABB<[f64; 2]> {
    let rect = bbox.to_rect();
    AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y])
}

fn keys_in_box<K: Copy + Ord>(
    index: &RTree<IndexedPoint<K>>,
    bbox: &BoundingBox,
    max: usize,
) -> Vec<K> {
    let mut keys: Vec<K> = index
        .locate_in_envelope(&envelope(bbox))
        .map(|entry| entry.data)
        .collect();
    keys.sort_unstable();
    keys.truncate(max);
    keys
}

impl DirectoryStore for MemoryDirectoryStore {
    fn agency(&self, key: AgencyKey) -> Result<Option<Agency>, StoreError> {
        Ok(self.agencies.get(&key).cloned())
    }

    fn agencies(&self, keys: Vec<AgencyKey>) -> EntityStream<'_, Agency> {
        Box::new(
            keys.into_iter()
                .filter_map(|key| self.agencies.get(&key).cloned())
                .map(Ok),
        )
    }

    fn all_agencies(&self) -> EntityStream<'_, Agency> {
        Box::new(self.agencies.values().cloned().map(Ok))
    }

    fn public_agencies(&self) -> EntityStream<'_, Agency> {
        Box::new(
            self.agencies
                .values()
                .filter(|agency| agency.is_public())
                .cloned()
                .map(Ok),
        )
    }

    fn agencies_in_box(&self, bbox: &BoundingBox, max_results: usize) -> EntityStream<'_, Agency> {
        let bbox = *bbox;
        Box::new(
            std::iter::once_with(move || keys_in_box(&self.agency_index, &bbox, max_results))
                .flatten()
                .filter_map(|key| self.agencies.get(&key).cloned())
                .map(Ok),
        )
    }

    fn app(&self, key: AppKey) -> Result<Option<TransitApp>, StoreError> {
        Ok(self.apps.get(&key).cloned())
    }

    fn app_for_slug(
        &self,
        slug: &str,
        visibility: Visibility,
    ) -> Result<Option<TransitApp>, StoreError> {
        Ok(self
            .apps
            .values()
            .find(|app| app.slug == slug && visibility.admits(app))
            .cloned())
    }

    fn apps(&self, filter: AppFilter, visibility: Visibility) -> EntityStream<'_, TransitApp> {
        Box::new(
            self.apps
                .values()
                .filter(move |app| visibility.admits(app) && filter.matches(app))
                .cloned()
                .map(Ok),
        )
    }

    fn locations_in_box(
        &self,
        bbox: &BoundingBox,
        max_results: usize,
    ) -> EntityStream<'_, TransitAppLocation> {
        let bbox = *bbox;
        Box::new(
            std::iter::once_with(move || keys_in_box(&self.location_index, &bbox, max_results))
                .flatten()
                .filter_map(|key| self.locations.get(&key).cloned())
                .map(Ok),
        )
    }

    fn locations_for_app(&self, app: AppKey) -> EntityStream<'_, TransitAppLocation> {
        Box::new(
            self.locations
                .values()
                .filter(move |location| location.app == app)
                .cloned()
                .map(Ok),
        )
    }

    fn all_locations(&self) -> EntityStream<'_, TransitAppLocation> {
        Box::new(self.locations.values().cloned().map(Ok))
    }

    fn reserve_agency_key(&mut self) -> Result<AgencyKey, StoreError> {
        let key = AgencyKey(self.next_agency);
        self.next_agency += 1;
        Ok(key)
    }

    fn reserve_app_key(&mut self) -> Result<AppKey, StoreError> {
        let key = AppKey(self.next_app);
        self.next_app += 1;
        Ok(key)
    }

    fn reserve_location_key(&mut self) -> Result<LocationKey, StoreError> {
        let key = LocationKey(self.next_location);
        self.next_location += 1;
        Ok(key)
    }

    fn put_agency(&mut self, agency: &Agency) -> Result<(), StoreError> {
        if let Some(previous) = self.agencies.insert(agency.key, agency.clone()) {
            self.agency_index.remove(&IndexedPoint::new(
                [previous.longitude, previous.latitude],
                previous.key,
            ));
        }
        self.agency_index
            .insert(IndexedPoint::new([agency.longitude, agency.latitude], agency.key));
        self.next_agency = self.next_agency.max(agency.key.get() + 1);
        Ok(())
    }

    fn put_app(&mut self, app: &TransitApp) -> Result<(), StoreError> {
        self.apps.insert(app.key, app.clone());
        self.next_app = self.next_app.max(app.key.get() + 1);
        Ok(())
    }

    fn delete_app(&mut self, key: AppKey) -> Result<(), StoreError> {
        self.apps.remove(&key);
        Ok(())
    }

    fn put_location(&mut self, location: &TransitAppLocation) -> Result<(), StoreError> {
        if let Some(previous) = self.locations.insert(location.key, location.clone()) {
            self.location_index.remove(&IndexedPoint::new(
                [previous.longitude, previous.latitude],
                previous.key,
            ));
        }
        self.location_index.insert(IndexedPoint::new(
            [location.longitude, location.latitude],
            location.key,
        ));
        self.next_location = self.next_location.max(location.key.get() + 1);
        Ok(())
    }

    fn delete_location(&mut self, key: LocationKey) -> Result<(), StoreError> {
        if let Some(previous) = self.locations.remove(&key) {
            self.location_index.remove(&IndexedPoint::new(
                [previous.longitude, previous.latitude],
                previous.key,
            ));
        }
        Ok(())
    }

    fn progress(&self, token: &str) -> Result<Option<ProgressRecord>, StoreError> {
        Ok(self.progress.get(token).cloned())
    }

    fn put_progress(&mut self, record: &ProgressRecord) -> Result<(), StoreError> {
        self.progress.insert(record.token.clone(), record.clone());
        Ok(())
    }

    fn delete_progress(&mut self, token: &str) -> Result<(), StoreError> {
        self.progress.remove(token);
        Ok(())
    }

    fn progress_updated_before(&self, cutoff: DateTime<Utc>) -> EntityStream<'_, ProgressRecord> {
        let mut stale: Vec<_> = self
            .progress
            .values()
            .filter(|record| record.last_updated < cutoff)
            .cloned()
            .collect();
        stale.sort_by_key(|record| record.last_updated);
        Box::new(stale.into_iter().map(Ok))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::square_bounding_box_centered_at;
    use crate::test_support::{agency, location};
    use rstest::rstest;

    #[rstest]
    fn box_fetch_caps_results_by_key_order() {
        let mut store = MemoryDirectoryStore::default();
        for key in [5, 3, 9] {
            store
                .put_agency(&agency(key, "Nearby", 40.0, -75.0))
                .expect("put agency");
        }
        let bbox = square_bounding_box_centered_at(40.0, -75.0, 10.0);
        let keys: Vec<_> = store
            .agencies_in_box(&bbox, 2)
            .map(|agency| agency.expect("agency").key)
            .collect();
        assert_eq!(keys, [AgencyKey(3), AgencyKey(5)]);
    }

    #[rstest]
    fn envelope_spans_the_box_corners() {
        let bbox = square_bounding_box_centered_at(45.5234515, -122.6762071, 8.0);
        let found = envelope(&bbox);
        assert_eq!(found.lower(), [bbox.west, bbox.south]);
        assert_eq!(found.upper(), [bbox.east, bbox.north]);
    }

    #[rstest]
    fn moving_a_location_reindexes_it() {
        let mut store = MemoryDirectoryStore::default();
        let mut row = location(1, 1, "Seattle", 47.6062095, -122.3320708);
        store.put_location(&row).expect("put location");
        row.latitude = 45.5234515;
        row.longitude = -122.6762071;
        store.put_location(&row).expect("move location");

        let seattle = square_bounding_box_centered_at(47.6062095, -122.3320708, 10.0);
        let portland = square_bounding_box_centered_at(45.5234515, -122.6762071, 10.0);
        assert_eq!(store.locations_in_box(&seattle, 10).count(), 0);
        assert_eq!(store.locations_in_box(&portland, 10).count(), 1);
    }

    #[rstest]
    fn explicit_agency_lookup_skips_dangling_keys() {
        let mut store = MemoryDirectoryStore::default();
        store
            .put_agency(&agency(2, "Kept", 0.0, 0.0))
            .expect("put agency");
        let found: Vec<_> = store
            .agencies(vec![AgencyKey(7), AgencyKey(2), AgencyKey(2)])
            .map(|agency| agency.expect("agency").key)
            .collect();
        assert_eq!(found, [AgencyKey(2), AgencyKey(2)]);
    }

    #[rstest]
    fn reserved_keys_skip_explicit_puts() {
        let mut store = MemoryDirectoryStore::default();
        store
            .put_agency(&agency(10, "Explicit", 0.0, 0.0))
            .expect("put agency");
        assert_eq!(store.reserve_agency_key().expect("reserve"), AgencyKey(11));
    }
}
