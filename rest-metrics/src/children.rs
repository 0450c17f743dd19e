use parking_lot::RwLock;
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Lazily created children of a record, keyed by their identity.
pub(crate) type Children<K, V> = RwLock<BTreeMap<K, Arc<V>>>;

/// Looks up `key` under the shared lock and only takes the exclusive lock
/// to insert. The lookup is repeated under the exclusive lock so two racing
/// creators end up with the same child.
pub(crate) fn find_or_create<K, Q, V>(
    children: &Children<K, V>,
    key: &Q,
    create: impl FnOnce() -> (K, V),
) -> Arc<V>
where
    K: Borrow<Q> + Ord,
    Q: Ord + ?Sized,
{
    let existing = children.read().get(key).cloned();
    if let Some(child) = existing {
        return child;
    }

    let mut children = children.write();
    if let Some(child) = children.get(key) {
        return Arc::clone(child);
    }
    let (key, child) = create();
    let child = Arc::new(child);
    children.insert(key, Arc::clone(&child));
    child
}

/// Copies the current children out so callers can walk them without
/// holding the lock.
pub(crate) fn snapshot<K, V>(children: &Children<K, V>) -> Vec<Arc<V>> {
    children.read().values().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn creates_once_then_reuses() {
        let children: Children<String, u32> = RwLock::new(BTreeMap::new());
        let first = find_or_create(&children, "a", || ("a".to_string(), 1));
        let second = find_or_create(&children, "a", || ("a".to_string(), 2));

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*second, 1);
        assert_eq!(snapshot(&children).len(), 1);
    }

    #[test]
    fn racing_creators_share_one_child() {
        let children: Arc<Children<String, usize>> = Arc::new(RwLock::new(BTreeMap::new()));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|n| {
                let children = Arc::clone(&children);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    find_or_create(&*children, "shared", || ("shared".to_string(), n))
                })
            })
            .collect();

        let created: Vec<Arc<usize>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(created.iter().all(|c| Arc::ptr_eq(c, &created[0])));
        assert_eq!(children.read().len(), 1);
    }
}
