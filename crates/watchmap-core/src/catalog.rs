use anyhow::{anyhow, Result};
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};
use watchmap_models::{
    ExternalIdKind, IdentityFields, MappingState, Show, ShowId, Watchable, WatchableKind, WatchableRef,
};

use crate::catalog_storage::{CatalogInventory, CatalogJournal, CatalogStorage, JournalEntry};
use crate::paths::PathPolicy;
use crate::repository::{normalize_title, IdentityUpdate, MappingWriter, WatchableRepository};

type IdKey = (ExternalIdKind, String);

/// What `merge_inventory` did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub shows: usize,
    pub watchables_added: usize,
    pub watchables_updated: usize,
}

/// In-memory catalog of watchables and shows with secondary indexes.
///
/// Entries are owned by the primary maps; indexes hold only references.
/// When opened from disk every commit is journaled before it is applied.
pub struct CatalogStore {
    watchables: BTreeMap<WatchableRef, Watchable>,
    shows: BTreeMap<ShowId, Show>,

    by_path: HashMap<String, Vec<WatchableRef>>,
    by_external_id: HashMap<IdKey, Vec<WatchableRef>>,
    by_title: HashMap<String, Vec<WatchableRef>>,
    episodes_by_position: HashMap<(ShowId, u32, u32), Vec<WatchableRef>>,
    shows_by_rating_key: HashMap<String, Vec<ShowId>>,
    shows_by_external_id: HashMap<IdKey, Vec<ShowId>>,

    storage: Option<CatalogStorage>,
    journal: Option<CatalogJournal>,
    journal_entries: usize,
}

impl Default for CatalogStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogStore {
    pub fn new() -> Self {
        Self {
            watchables: BTreeMap::new(),
            shows: BTreeMap::new(),
            by_path: HashMap::new(),
            by_external_id: HashMap::new(),
            by_title: HashMap::new(),
            episodes_by_position: HashMap::new(),
            shows_by_rating_key: HashMap::new(),
            shows_by_external_id: HashMap::new(),
            storage: None,
            journal: None,
            journal_entries: 0,
        }
    }

    pub fn from_inventory(inventory: CatalogInventory) -> Self {
        let mut store = Self::new();
        for show in inventory.shows {
            store.insert_show(show);
        }
        for watchable in inventory.watchables {
            store.insert_watchable(watchable);
        }
        store
    }

    /// Load snapshot, replay the journal over it, and keep journaling.
    pub fn open(storage: CatalogStorage) -> Result<Self> {
        let mut store = Self::from_inventory(storage.load_snapshot()?);
        let entries = storage.read_journal()?;
        let replayed = entries.len();
        for entry in entries {
            if let Err(e) = store.apply(&entry) {
                warn!("Skipping journal entry for {}: {}", entry.watchable, e);
            }
        }
        if replayed > 0 {
            info!("Replayed {} catalog journal entries", replayed);
        }
        store.journal = Some(storage.open_journal()?);
        store.journal_entries = replayed;
        store.storage = Some(storage);
        Ok(store)
    }

    /// Replace the snapshot with the current contents and empty the
    /// journal. No-op for purely in-memory stores.
    pub fn compact(&mut self) -> Result<()> {
        let Some(storage) = self.storage.as_ref() else {
            return Ok(());
        };
        storage.save_snapshot(&self.to_inventory())?;
        self.journal = None;
        storage.truncate_journal()?;
        self.journal = Some(storage.open_journal()?);
        self.journal_entries = 0;
        Ok(())
    }

    /// Commits recorded since the last snapshot
    pub fn pending_journal_entries(&self) -> usize {
        self.journal_entries
    }

    pub fn to_inventory(&self) -> CatalogInventory {
        CatalogInventory {
            shows: self.shows.values().cloned().collect(),
            watchables: self.watchables.values().cloned().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.watchables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watchables.is_empty()
    }

    pub fn show_count(&self) -> usize {
        self.shows.len()
    }

    pub fn watchable(&self, reference: WatchableRef) -> Option<&Watchable> {
        self.watchables.get(&reference)
    }

    pub fn show(&self, id: ShowId) -> Option<&Show> {
        self.shows.get(&id)
    }

    /// Episodes of a show, ordered by id
    pub fn episodes_of(&self, show: ShowId) -> Vec<&Watchable> {
        self.watchables
            .values()
            .filter(|w| w.reference.kind == WatchableKind::Episode && w.show_id == Some(show))
            .collect()
    }

    pub fn insert_show(&mut self, show: Show) {
        if let Some(previous) = self.shows.remove(&show.id) {
            if let Some(key) = non_blank(previous.plex_rating_key.as_deref()) {
                unindex(&mut self.shows_by_rating_key, key, previous.id);
            }
            for key in previous.external_ids.normalized().keys() {
                unindex(&mut self.shows_by_external_id, &key, previous.id);
            }
        }

        if let Some(key) = non_blank(show.plex_rating_key.as_deref()) {
            index(&mut self.shows_by_rating_key, key.to_string(), show.id);
        }
        for key in show.external_ids.normalized().keys() {
            index(&mut self.shows_by_external_id, key, show.id);
        }
        self.shows.insert(show.id, show);
    }

    /// Insert or replace a watchable, keeping indexes consistent
    pub fn insert_watchable(&mut self, watchable: Watchable) {
        let reference = watchable.reference;
        if let Some(previous) = self.watchables.remove(&reference) {
            self.unindex_watchable(&previous);
        }

        let canonical = PathPolicy::default();
        for path in &watchable.file_paths {
            if let Some(path) = canonical.canonicalize(path) {
                index(&mut self.by_path, path, reference);
            }
        }
        for key in watchable.identity.external_ids.normalized().keys() {
            index(&mut self.by_external_id, key, reference);
        }
        match reference.kind {
            WatchableKind::Movie => {
                let title = normalize_title(&watchable.title);
                if !title.is_empty() {
                    index(&mut self.by_title, title, reference);
                }
            }
            WatchableKind::Episode => {
                if let (Some(show), Some(season), Some(episode)) =
                    (watchable.show_id, watchable.season_number, watchable.episode_number)
                {
                    index(&mut self.episodes_by_position, (show, season, episode), reference);
                }
            }
        }
        self.watchables.insert(reference, watchable);
    }

    /// Fold an upstream inventory into the catalog.
    ///
    /// Upstream owns titles, paths and external ids. Mapping state and
    /// identity fields written by earlier runs survive unless the incoming
    /// record carries its own.
    pub fn merge_inventory(&mut self, inventory: CatalogInventory) -> MergeStats {
        let mut stats = MergeStats::default();
        for show in inventory.shows {
            stats.shows += 1;
            self.insert_show(show);
        }
        for mut watchable in inventory.watchables {
            match self.watchables.get(&watchable.reference) {
                Some(existing) => {
                    stats.watchables_updated += 1;
                    if watchable.mapping == MappingState::default() {
                        watchable.mapping = existing.mapping.clone();
                    }
                    if non_blank(watchable.identity.plex_rating_key.as_deref()).is_none() {
                        watchable.identity.plex_rating_key = existing.identity.plex_rating_key.clone();
                    }
                    if watchable.identity.plex_guid.is_none() {
                        watchable.identity.plex_guid = existing.identity.plex_guid.clone();
                    }
                }
                None => stats.watchables_added += 1,
            }
            self.insert_watchable(watchable);
        }
        stats
    }

    fn unindex_watchable(&mut self, watchable: &Watchable) {
        let reference = watchable.reference;
        let canonical = PathPolicy::default();
        for path in &watchable.file_paths {
            if let Some(path) = canonical.canonicalize(path) {
                unindex(&mut self.by_path, path.as_str(), reference);
            }
        }
        for key in watchable.identity.external_ids.normalized().keys() {
            unindex(&mut self.by_external_id, &key, reference);
        }
        unindex(&mut self.by_title, normalize_title(&watchable.title).as_str(), reference);
        if let (Some(show), Some(season), Some(episode)) =
            (watchable.show_id, watchable.season_number, watchable.episode_number)
        {
            unindex(&mut self.episodes_by_position, &(show, season, episode), reference);
        }
    }

    fn apply(&mut self, entry: &JournalEntry) -> Result<()> {
        let watchable = self
            .watchables
            .get_mut(&entry.watchable)
            .ok_or_else(|| anyhow!("watchable {} not found in catalog", entry.watchable))?;
        watchable.mapping = entry.mapping.clone();
        if let Some(identity) = &entry.identity {
            watchable.identity.plex_rating_key = Some(identity.plex_rating_key.clone());
            if identity.plex_guid.is_some() {
                watchable.identity.plex_guid = identity.plex_guid.clone();
            }
        }
        Ok(())
    }
}

impl WatchableRepository for CatalogStore {
    fn watchables_by_path(&self, canonical_path: &str) -> Vec<WatchableRef> {
        self.by_path.get(canonical_path).cloned().unwrap_or_default()
    }

    fn watchables_by_external_id(&self, kind: ExternalIdKind, value: &str) -> Vec<WatchableRef> {
        self.by_external_id
            .get(&(kind, value.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    fn shows_by_rating_key(&self, rating_key: &str) -> Vec<ShowId> {
        self.shows_by_rating_key.get(rating_key).cloned().unwrap_or_default()
    }

    fn shows_by_external_id(&self, kind: ExternalIdKind, value: &str) -> Vec<ShowId> {
        self.shows_by_external_id
            .get(&(kind, value.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    fn episodes_at(&self, show: ShowId, season_number: u32, episode_number: u32) -> Vec<WatchableRef> {
        self.episodes_by_position
            .get(&(show, season_number, episode_number))
            .cloned()
            .unwrap_or_default()
    }

    fn movies_by_title(&self, normalized_title: &str) -> Vec<(WatchableRef, Option<i32>)> {
        self.by_title
            .get(normalized_title)
            .map(|refs| {
                refs.iter()
                    .filter_map(|r| self.watchables.get(r).map(|w| (*r, w.year)))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn identity(&self, watchable: WatchableRef) -> Option<IdentityFields> {
        self.watchables.get(&watchable).map(|w| w.identity.clone())
    }

    fn mapping_state(&self, watchable: WatchableRef) -> Option<MappingState> {
        self.watchables.get(&watchable).map(|w| w.mapping.clone())
    }
}

impl MappingWriter for CatalogStore {
    fn commit_mapping(
        &mut self,
        watchable: WatchableRef,
        mapping: &MappingState,
        identity: Option<&IdentityUpdate>,
    ) -> Result<()> {
        if !self.watchables.contains_key(&watchable) {
            return Err(anyhow!("watchable {} not found in catalog", watchable));
        }
        let entry = JournalEntry {
            watchable,
            mapping: mapping.clone(),
            identity: identity.cloned(),
        };
        if let Some(journal) = self.journal.as_mut() {
            journal.append(&entry)?;
            self.journal_entries += 1;
        }
        self.apply(&entry)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn index<K, V>(map: &mut HashMap<K, Vec<V>>, key: K, value: V)
where
    K: std::hash::Hash + Eq,
    V: PartialEq,
{
    let entry = map.entry(key).or_default();
    if !entry.contains(&value) {
        entry.push(value);
    }
}

fn unindex<K, Q, V>(map: &mut HashMap<K, Vec<V>>, key: &Q, value: V)
where
    K: std::hash::Hash + Eq + std::borrow::Borrow<Q>,
    Q: std::hash::Hash + Eq + ?Sized,
    V: PartialEq,
{
    let now_empty = match map.get_mut(key) {
        Some(values) => {
            values.retain(|v| *v != value);
            values.is_empty()
        }
        None => false,
    };
    if now_empty {
        map.remove(key);
    }
}
