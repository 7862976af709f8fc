use std::{
    num::NonZeroUsize,
    sync::{Arc, Mutex},
    time::UNIX_EPOCH,
};

use log::debug;
use lru::LruCache;
use url::Url;

use crate::{XMLVersion, dtd::Dtd, dtd::murmur::fingerprint, error::XMLError};

pub const DEFAULT_CACHE_CAPACITY: usize = 50;
pub const MIN_CACHE_CAPACITY: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    xml11: bool,
    urn: Box<str>,
}

impl CacheKey {
    fn new(urn: &str, version: XMLVersion) -> Self {
        Self {
            xml11: version.is_xml11(),
            urn: urn.into(),
        }
    }
}

/// Caches of closed DTDs and of external entity texts.
///
/// Entries are keyed by a URN and the XML version of the document that produced them.
/// A URN is one of
/// - `<url>#lastModified=<mtime>` for files
/// - `urn:xml:<publicId>` if public identifiers are assumed to be stable
/// - a 128-bit content fingerprint otherwise
///
/// Each cache is a fixed-capacity LRU map behind its own mutex, so one instance can be shared
/// by parses running on different threads.
pub struct ResourceCache {
    dtds: Mutex<LruCache<CacheKey, Arc<Dtd>>>,
    entities: Mutex<LruCache<CacheKey, Arc<str>>>,
}

impl ResourceCache {
    /// Capacities smaller than [`MIN_CACHE_CAPACITY`] are raised to it.
    pub fn new(dtd_capacity: usize, entity_capacity: usize) -> Self {
        let capacity = |capacity: usize| {
            NonZeroUsize::new(capacity.max(MIN_CACHE_CAPACITY)).unwrap_or(NonZeroUsize::MIN)
        };
        Self {
            dtds: Mutex::new(LruCache::new(capacity(dtd_capacity))),
            entities: Mutex::new(LruCache::new(capacity(entity_capacity))),
        }
    }

    pub fn lookup(&self, urn: &str, version: XMLVersion) -> Option<Arc<Dtd>> {
        let ret = self
            .dtds
            .lock()
            .unwrap()
            .get(&CacheKey::new(urn, version))
            .cloned();
        debug!(
            "DTD cache {} for '{urn}'",
            if ret.is_some() { "hit" } else { "miss" }
        );
        ret
    }

    /// # Errors
    /// If `dtd` is not closed, returns [`XMLError::CacheDtdNotClosed`].
    pub fn store(&self, urn: &str, version: XMLVersion, dtd: Arc<Dtd>) -> Result<(), XMLError> {
        if !dtd.is_closed() {
            return Err(XMLError::CacheDtdNotClosed);
        }
        debug!("store DTD '{}' as '{urn}'", dtd.name());
        self.dtds
            .lock()
            .unwrap()
            .put(CacheKey::new(urn, version), dtd);
        Ok(())
    }

    pub fn lookup_entity_text(&self, urn: &str, version: XMLVersion) -> Option<Arc<str>> {
        let ret = self
            .entities
            .lock()
            .unwrap()
            .get(&CacheKey::new(urn, version))
            .cloned();
        debug!(
            "entity cache {} for '{urn}'",
            if ret.is_some() { "hit" } else { "miss" }
        );
        ret
    }

    pub fn store_entity_text(&self, urn: &str, version: XMLVersion, text: Arc<str>) {
        debug!("store entity text as '{urn}' ({} bytes)", text.len());
        self.entities
            .lock()
            .unwrap()
            .put(CacheKey::new(urn, version), text);
    }

    /// Remove the DTD stored as `urn`. Returns `true` if it existed.
    pub fn invalidate(&self, urn: &str, version: XMLVersion) -> bool {
        let removed = self
            .dtds
            .lock()
            .unwrap()
            .pop(&CacheKey::new(urn, version))
            .is_some();
        if removed {
            debug!("invalidate DTD '{urn}'");
        }
        removed
    }

    pub fn clear(&self) {
        self.dtds.lock().unwrap().clear();
        self.entities.lock().unwrap().clear();
    }

    pub fn dtd_len(&self) -> usize {
        self.dtds.lock().unwrap().len()
    }

    pub fn entity_len(&self) -> usize {
        self.entities.lock().unwrap().len()
    }
}

impl Default for ResourceCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_CAPACITY)
    }
}

impl std::fmt::Debug for ResourceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceCache")
            .field("dtds", &self.dtd_len())
            .field("entities", &self.entity_len())
            .finish()
    }
}

pub(crate) fn public_id_urn(public_id: &str) -> String {
    format!("urn:xml:{public_id}")
}

/// The URN of a local file, or `None` if `url` is not a readable `file:` URL.
pub(crate) fn file_urn(url: &Url) -> Option<String> {
    if url.scheme() != "file" {
        return None;
    }
    let path = url.to_file_path().ok()?;
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    let mtime = modified.duration_since(UNIX_EPOCH).ok()?.as_nanos();
    Some(format!("{url}#lastModified={mtime}"))
}

pub(crate) fn content_urn(text: &str) -> String {
    fingerprint(text.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closed(name: &str) -> Arc<Dtd> {
        let mut dtd = Dtd::new(name, None, None, None);
        dtd.close();
        Arc::new(dtd)
    }

    #[test]
    fn open_dtd_is_rejected() {
        let cache = ResourceCache::default();
        let dtd = Arc::new(Dtd::new("a", None, None, None));
        assert!(matches!(
            cache.store("k", XMLVersion::XML10, dtd),
            Err(XMLError::CacheDtdNotClosed)
        ));
        assert_eq!(cache.dtd_len(), 0);
    }

    #[test]
    fn entries_are_versioned() {
        let cache = ResourceCache::default();
        cache.store("k", XMLVersion::XML10, closed("a")).unwrap();
        assert!(cache.lookup("k", XMLVersion::XML10).is_some());
        assert!(cache.lookup("k", XMLVersion::XML11).is_none());
        // Unknown versions are processed as XML 1.0.
        assert!(cache.lookup("k", XMLVersion::Unknown).is_some());
    }

    #[test]
    fn least_recently_used_is_evicted() {
        let cache = ResourceCache::new(0, 0);
        for i in 0..MIN_CACHE_CAPACITY {
            cache
                .store(&i.to_string(), XMLVersion::XML10, closed("a"))
                .unwrap();
        }
        // touch "0" so that "1" becomes the oldest
        assert!(cache.lookup("0", XMLVersion::XML10).is_some());
        cache.store("new", XMLVersion::XML10, closed("a")).unwrap();
        assert_eq!(cache.dtd_len(), MIN_CACHE_CAPACITY);
        assert!(cache.lookup("0", XMLVersion::XML10).is_some());
        assert!(cache.lookup("1", XMLVersion::XML10).is_none());
    }

    #[test]
    fn entity_text_and_invalidation() {
        let cache = ResourceCache::default();
        cache.store_entity_text("e", XMLVersion::XML10, "text".into());
        assert_eq!(
            cache.lookup_entity_text("e", XMLVersion::XML10).as_deref(),
            Some("text")
        );
        cache.store("d", XMLVersion::XML10, closed("a")).unwrap();
        assert!(cache.invalidate("d", XMLVersion::XML10));
        assert!(!cache.invalidate("d", XMLVersion::XML10));
        cache.clear();
        assert_eq!(cache.entity_len(), 0);
    }

    #[test]
    fn urns() {
        assert_eq!(public_id_urn("-//A//DTD B//EN"), "urn:xml:-//A//DTD B//EN");
        assert_eq!(content_urn("abc"), content_urn("abc"));
        assert_ne!(content_urn("abc"), content_urn("abd"));
        let url = Url::parse("http://example.com/a.dtd").unwrap();
        assert!(file_urn(&url).is_none());

        let file = tempfile::NamedTempFile::new().unwrap();
        let url = Url::from_file_path(file.path()).unwrap();
        let urn = file_urn(&url).unwrap();
        assert!(urn.starts_with(url.as_str()));
        assert!(urn.contains("#lastModified="));
    }
}
