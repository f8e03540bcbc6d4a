// scene/assembly.rs
// Turns load completions into scene mutations. Continuations are registered
// on the main thread when a load is issued and only ever run from `drain` /
// `deliver`, which the render loop calls between frames. A continuation
// with several dependencies runs once, after all of them, or not at all.

use std::collections::HashMap;

use crate::asset::{AssetLoaderPool, FromLoaded, LoadCompletion, LoadTicket, LoadedAsset};
use crate::error::LoadError;

type Continuation<C> = Box<dyn FnOnce(&mut C, Vec<LoadedAsset>) -> Result<(), LoadError>>;

struct Group<C> {
    label: String,
    deps: Vec<u64>,
    sources: Vec<String>,
    results: Vec<Option<LoadedAsset>>,
    failed: Vec<String>,
    remaining: usize,
    continuation: Continuation<C>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssemblyStats {
    pub loaded: usize,
    pub failed: usize,
    pub inserted: usize,
    pub skipped: usize,
}

pub struct SceneAssembler<C> {
    groups: Vec<Option<Group<C>>>,
    waiting: HashMap<u64, Vec<usize>>,
    failures: Vec<LoadError>,
    stats: AssemblyStats,
}

impl<C: 'static> SceneAssembler<C> {
    pub fn new() -> Self {
        Self {
            groups: Vec::new(),
            waiting: HashMap::new(),
            failures: Vec::new(),
            stats: AssemblyStats::default(),
        }
    }

    /// Runs `insert` once `ticket` succeeds.
    pub fn on_loaded<T, F>(&mut self, label: impl Into<String>, ticket: &LoadTicket<T>, insert: F)
    where
        T: FromLoaded + 'static,
        F: FnOnce(&mut C, T) + 'static,
    {
        let source = ticket.source().to_string();
        self.when_all(
            label.into(),
            vec![(ticket.id(), source.clone())],
            Box::new(move |ctx: &mut C, assets: Vec<LoadedAsset>| {
                let mut assets = assets.into_iter();
                let value = extract::<T>(&source, assets.next())?;
                insert(ctx, value);
                Ok(())
            }),
        );
    }

    /// Runs `insert` once both tickets succeed; skipped if either fails.
    pub fn on_both<A, B, F>(
        &mut self,
        label: impl Into<String>,
        a: &LoadTicket<A>,
        b: &LoadTicket<B>,
        insert: F,
    ) where
        A: FromLoaded + 'static,
        B: FromLoaded + 'static,
        F: FnOnce(&mut C, A, B) + 'static,
    {
        let (source_a, source_b) = (a.source().to_string(), b.source().to_string());
        self.when_all(
            label.into(),
            vec![(a.id(), source_a.clone()), (b.id(), source_b.clone())],
            Box::new(move |ctx: &mut C, assets: Vec<LoadedAsset>| {
                let mut assets = assets.into_iter();
                let first = extract::<A>(&source_a, assets.next())?;
                let second = extract::<B>(&source_b, assets.next())?;
                insert(ctx, first, second);
                Ok(())
            }),
        );
    }

    /// Runs `insert` with every result, in ticket order, once all succeed.
    pub fn on_all<T, F>(&mut self, label: impl Into<String>, tickets: &[LoadTicket<T>], insert: F)
    where
        T: FromLoaded + 'static,
        F: FnOnce(&mut C, Vec<T>) + 'static,
    {
        let deps: Vec<(u64, String)> = tickets
            .iter()
            .map(|ticket| (ticket.id(), ticket.source().to_string()))
            .collect();
        let sources: Vec<String> = deps.iter().map(|(_, source)| source.clone()).collect();
        self.when_all(
            label.into(),
            deps,
            Box::new(move |ctx: &mut C, assets: Vec<LoadedAsset>| {
                let values = sources
                    .iter()
                    .zip(assets.into_iter().map(Some))
                    .map(|(source, asset)| extract::<T>(source, asset))
                    .collect::<Result<Vec<_>, _>>()?;
                insert(ctx, values);
                Ok(())
            }),
        );
    }

    fn when_all(&mut self, label: String, deps: Vec<(u64, String)>, continuation: Continuation<C>) {
        let slot = self.groups.len();
        for (id, _) in &deps {
            let slots = self.waiting.entry(*id).or_default();
            if !slots.contains(&slot) {
                slots.push(slot);
            }
        }
        log::debug!("'{}' waits on {} load(s)", label, deps.len());
        let (ids, sources): (Vec<u64>, Vec<String>) = deps.into_iter().unzip();
        self.groups.push(Some(Group {
            label,
            remaining: ids.len(),
            results: vec![None; ids.len()],
            deps: ids,
            sources,
            failed: Vec::new(),
            continuation,
        }));
    }

    /// Routes one completion to the continuations waiting on it. Returns the
    /// number of continuations that ran.
    pub fn deliver(&mut self, completion: LoadCompletion, ctx: &mut C) -> usize {
        let LoadCompletion { id, source, result } = completion;

        match &result {
            Ok(asset) => {
                self.stats.loaded += 1;
                log::info!("Loaded {} {}", asset.kind(), source);
            }
            Err(err) => {
                self.stats.failed += 1;
                log::error!("Failed to load {}: {}", source, err);
                self.failures.push(err.clone());
            }
        }

        let Some(slots) = self.waiting.remove(&id) else {
            log::warn!("No continuation registered for {} (request {})", source, id);
            return 0;
        };

        let mut ran = 0;
        for slot in slots {
            let Some(group) = self.groups.get_mut(slot).and_then(Option::as_mut) else {
                continue;
            };
            for position in 0..group.deps.len() {
                if group.deps[position] != id {
                    continue;
                }
                match &result {
                    Ok(asset) => group.results[position] = Some(asset.clone()),
                    Err(_) => group.failed.push(group.sources[position].clone()),
                }
                group.remaining -= 1;
            }
            if group.remaining > 0 {
                continue;
            }

            let Some(group) = self.groups[slot].take() else {
                continue;
            };
            if self.complete(group, ctx) {
                ran += 1;
            }
        }
        ran
    }

    fn complete(&mut self, group: Group<C>, ctx: &mut C) -> bool {
        if !group.failed.is_empty() {
            let err = LoadError::DependencyFailed {
                label: group.label,
                failed: group.failed,
            };
            log::warn!("{}", err);
            self.stats.skipped += 1;
            self.failures.push(err);
            return false;
        }

        let assets: Option<Vec<LoadedAsset>> = group.results.into_iter().collect();
        let Some(assets) = assets else {
            return false;
        };

        match (group.continuation)(ctx, assets) {
            Ok(()) => {
                self.stats.inserted += 1;
                log::debug!("Inserted '{}'", group.label);
                true
            }
            Err(err) => {
                log::error!("Could not insert '{}': {}", group.label, err);
                self.failures.push(err);
                false
            }
        }
    }

    /// Applies every completion that has arrived so far. Call between frames.
    pub fn drain(&mut self, pool: &mut AssetLoaderPool, ctx: &mut C) -> usize {
        let mut ran = 0;
        while let Some(completion) = pool.try_next() {
            ran += self.deliver(completion, ctx);
        }
        ran
    }

    /// Continuations still waiting on at least one load.
    pub fn pending(&self) -> usize {
        self.groups.iter().filter(|group| group.is_some()).count()
    }

    pub fn failures(&self) -> &[LoadError] {
        &self.failures
    }

    pub fn stats(&self) -> AssemblyStats {
        self.stats
    }
}

impl<C: 'static> Default for SceneAssembler<C> {
    fn default() -> Self {
        Self::new()
    }
}

fn extract<T: FromLoaded>(source: &str, asset: Option<LoadedAsset>) -> Result<T, LoadError> {
    let asset = asset.ok_or_else(|| LoadError::Worker {
        source_id: source.to_string(),
    })?;
    let actual = asset.kind();
    T::from_loaded(asset).ok_or_else(|| LoadError::WrongKind {
        source_id: source.to_string(),
        expected: T::KIND,
        actual,
    })
}
