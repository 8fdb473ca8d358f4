use std::{
    collections::HashMap,
    convert::Infallible,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tracing::debug;

use super::{BusinessProcess, LoggingProcess};
use crate::topic::TopicInfo;

type SharedProcess<M> = Arc<dyn BusinessProcess<M>>;

/// Logging-wrapped business processes, one per topic name.
///
/// Entries are never evicted. The cache is keyed by topic name only, so a later
/// lookup for the same topic returns the first wrapper even when it asks for a
/// different process type.
pub struct ProcessCache<M> {
    entries: Mutex<HashMap<String, SharedProcess<M>>>,
}

impl<M> ProcessCache<M>
where
    M: fmt::Debug + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get_or_insert<P>(&self, topic: &TopicInfo) -> SharedProcess<M>
    where
        P: BusinessProcess<M> + Default + 'static,
    {
        match self.get_or_try_insert_with(topic, || Ok::<_, Infallible>(P::default())) {
            Ok(process) => process,
            Err(never) => match never {},
        }
    }

    /// Returns the cached wrapper for the topic, building it with `create` on a miss.
    ///
    /// `create` runs at most once per topic name; when it fails nothing is cached and
    /// the error is returned.
    ///
    /// `create` runs while the cache lock is held, so it must not look anything up in
    /// the same cache: doing so deadlocks. Other caches are fine.
    pub fn get_or_try_insert_with<P, E, F>(
        &self,
        topic: &TopicInfo,
        create: F,
    ) -> Result<SharedProcess<M>, E>
    where
        P: BusinessProcess<M> + 'static,
        F: FnOnce() -> Result<P, E>,
    {
        let mut entries = self.lock();
        if let Some(process) = entries.get(&topic.topic_name) {
            return Ok(Arc::clone(process));
        }

        let process: SharedProcess<M> =
            Arc::new(LoggingProcess::new(topic.topic_name.clone(), create()?));
        debug!(
            topic = %topic.topic_name,
            handler = std::any::type_name::<P>(),
            "cached business process"
        );
        entries.insert(topic.topic_name.clone(), Arc::clone(&process));

        Ok(process)
    }

    pub fn get(&self, topic_name: &str) -> Option<SharedProcess<M>> {
        self.lock().get(topic_name).cloned()
    }
}

impl<M> ProcessCache<M> {
    pub fn contains(&self, topic_name: &str) -> bool {
        self.lock().contains_key(topic_name)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn topics(&self) -> Vec<String> {
        let mut topics = self.lock().keys().cloned().collect::<Vec<_>>();
        topics.sort();
        topics
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SharedProcess<M>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<M> Default for ProcessCache<M>
where
    M: fmt::Debug + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<M> fmt::Debug for ProcessCache<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessCache")
            .field("topics", &self.topics())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use futures::{future::BoxFuture, FutureExt};

    use super::*;

    #[derive(Default)]
    struct Accepting;

    impl BusinessProcess<String> for Accepting {
        fn process(&self, _message: String) -> BoxFuture<'_, anyhow::Result<()>> {
            futures::future::ok(()).boxed()
        }
    }

    #[derive(Default)]
    struct Failing;

    impl BusinessProcess<String> for Failing {
        fn process(&self, message: String) -> BoxFuture<'_, anyhow::Result<()>> {
            futures::future::err(anyhow::anyhow!("cannot handle {message}")).boxed()
        }
    }

    #[test]
    fn repeated_lookups_return_same_instance() {
        let cache = ProcessCache::<String>::new();
        let topic = TopicInfo::new("orders", "billing");

        let first = cache.get_or_insert::<Accepting>(&topic);
        let second = cache.get_or_insert::<Accepting>(&topic);

        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&first, &cache.get("orders").unwrap()));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn entries_are_keyed_by_topic_name_only() {
        let cache = ProcessCache::<String>::new();
        let orders = TopicInfo::new("orders", "billing");
        let other_group = TopicInfo::new("orders", "audit");

        let first = cache.get_or_insert::<Accepting>(&orders);
        let second = cache.get_or_insert::<Failing>(&other_group);

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.topics(), vec!["orders".to_string()]);
    }

    #[test]
    fn distinct_topics_get_distinct_wrappers() {
        let cache = ProcessCache::<String>::new();

        let orders = cache.get_or_insert::<Accepting>(&TopicInfo::new("orders", "g"));
        let payments = cache.get_or_insert::<Accepting>(&TopicInfo::new("payments", "g"));

        assert!(!Arc::ptr_eq(&orders, &payments));
        assert_eq!(
            cache.topics(),
            vec!["orders".to_string(), "payments".to_string()]
        );
    }

    #[test]
    fn failed_construction_is_not_cached() {
        let cache = ProcessCache::<String>::new();
        let topic = TopicInfo::new("orders", "billing");

        let error = cache
            .get_or_try_insert_with(&topic, || Err::<Accepting, _>("no default constructor"))
            .err()
            .unwrap();

        assert_eq!(error, "no default constructor");
        assert!(!cache.contains("orders"));
        assert!(cache.is_empty());
    }

    #[test]
    fn constructor_may_use_another_cache() {
        let inner = ProcessCache::<String>::new();
        let outer = ProcessCache::<String>::new();
        let topic = TopicInfo::new("orders", "billing");

        let wrapped = outer
            .get_or_try_insert_with(&topic, || {
                Ok::<_, Infallible>(inner.get_or_insert::<Accepting>(&topic))
            })
            .unwrap();

        assert!(inner.contains("orders"));
        assert!(Arc::ptr_eq(&wrapped, &outer.get("orders").unwrap()));
        assert!(!Arc::ptr_eq(&wrapped, &inner.get("orders").unwrap()));
    }

    #[test]
    fn process_is_built_only_on_miss() {
        let cache = ProcessCache::<String>::new();
        let topic = TopicInfo::new("builds-once", "billing");
        let mut calls = 0;

        for _ in 0..3 {
            cache
                .get_or_try_insert_with(&topic, || {
                    calls += 1;
                    Ok::<_, Infallible>(Failing)
                })
                .unwrap();
        }

        assert_eq!(calls, 1);
    }

    #[test]
    fn concurrent_first_use_yields_single_instance() {
        let cache = Arc::new(ProcessCache::<String>::new());
        let topic = TopicInfo::new("contended", "billing");

        let handles = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let topic = topic.clone();
                thread::spawn(move || cache.get_or_insert::<Accepting>(&topic))
            })
            .collect::<Vec<_>>();
        let processes = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect::<Vec<_>>();

        assert!(processes
            .iter()
            .all(|process| Arc::ptr_eq(process, &processes[0])));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn cached_wrapper_forwards_to_process() {
        let cache = ProcessCache::<String>::new();
        let process = cache.get_or_insert::<Failing>(&TopicInfo::new("orders", "billing"));

        let error = process.process("refund".to_string()).await.unwrap_err();

        assert_eq!(error.to_string(), "cannot handle refund");
    }
}
