use std::collections::HashSet;
use std::hash::Hash;

/// Brings `items` in line with `desired` keys without replacing retained
/// items: undesired (and duplicate) items are dropped, retained items keep
/// their relative order, and newly desired keys are appended in `desired`
/// order using `create`.
pub fn reconcile_list<T, K, E>(
    items: &mut Vec<T>,
    desired: &[K],
    key: impl Fn(&T) -> &K,
    mut create: impl FnMut(&K) -> Result<T, E>,
) -> Result<(), E>
where
    K: Eq + Hash + Clone,
{
    let wanted: HashSet<&K> = desired.iter().collect();
    let mut kept: HashSet<K> = HashSet::with_capacity(items.len());
    items.retain(|item| {
        let item_key = key(item);
        wanted.contains(item_key) && kept.insert(item_key.clone())
    });

    for desired_key in desired {
        if kept.contains(desired_key) {
            continue;
        }
        items.push(create(desired_key)?);
        kept.insert(desired_key.clone());
    }
    Ok(())
}
