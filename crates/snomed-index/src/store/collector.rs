//! Collectors reading document keys from the fast-field columns.

use roaring::RoaringTreemap;
use tantivy::collector::{Collector, SegmentCollector};
use tantivy::columnar::Column;
use tantivy::{DocId, Score, SegmentOrdinal, SegmentReader};

use super::schema::fields;

/// Gathers the keys of every matching document.
pub(crate) struct KeyCollector;

pub(crate) struct KeySegmentCollector {
    keys: Column<u64>,
    hits: RoaringTreemap,
}

impl Collector for KeyCollector {
    type Fruit = RoaringTreemap;
    type Child = KeySegmentCollector;

    fn for_segment(
        &self,
        _segment_local_id: SegmentOrdinal,
        segment: &SegmentReader,
    ) -> tantivy::Result<Self::Child> {
        Ok(KeySegmentCollector {
            keys: segment.fast_fields().u64(fields::KEY)?,
            hits: RoaringTreemap::new(),
        })
    }

    fn requires_scoring(&self) -> bool {
        false
    }

    fn merge_fruits(&self, segment_fruits: Vec<RoaringTreemap>) -> tantivy::Result<RoaringTreemap> {
        Ok(segment_fruits
            .into_iter()
            .fold(RoaringTreemap::new(), |merged, hits| merged | hits))
    }
}

impl SegmentCollector for KeySegmentCollector {
    type Fruit = RoaringTreemap;

    fn collect(&mut self, doc: DocId, _score: Score) {
        if let Some(key) = self.keys.first(doc) {
            self.hits.insert(key);
        }
    }

    fn harvest(self) -> RoaringTreemap {
        self.hits
    }
}

/// Gathers `(key, sort_key)` of every matching document.
pub(crate) struct SortKeyCollector;

pub(crate) struct SortKeySegmentCollector {
    keys: Column<u64>,
    sort_keys: Column<u64>,
    hits: Vec<(u64, u64)>,
}

impl Collector for SortKeyCollector {
    type Fruit = Vec<(u64, u64)>;
    type Child = SortKeySegmentCollector;

    fn for_segment(
        &self,
        _segment_local_id: SegmentOrdinal,
        segment: &SegmentReader,
    ) -> tantivy::Result<Self::Child> {
        let fast_fields = segment.fast_fields();
        Ok(SortKeySegmentCollector {
            keys: fast_fields.u64(fields::KEY)?,
            sort_keys: fast_fields.u64(fields::SORT_KEY)?,
            hits: Vec::new(),
        })
    }

    fn requires_scoring(&self) -> bool {
        false
    }

    fn merge_fruits(&self, segment_fruits: Vec<Vec<(u64, u64)>>) -> tantivy::Result<Vec<(u64, u64)>> {
        Ok(segment_fruits.into_iter().flatten().collect())
    }
}

impl SegmentCollector for SortKeySegmentCollector {
    type Fruit = Vec<(u64, u64)>;

    fn collect(&mut self, doc: DocId, _score: Score) {
        if let Some(key) = self.keys.first(doc) {
            self.hits.push((key, self.sort_keys.first(doc).unwrap_or(0)));
        }
    }

    fn harvest(self) -> Vec<(u64, u64)> {
        self.hits
    }
}
