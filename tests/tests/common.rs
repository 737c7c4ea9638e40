use tracing::Level;

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use txstore::Merge;

/// A small store state with a typed partial, as an application would define one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
    pub count: i64,
    pub label: String,
}

#[derive(Debug, Clone, Default)]
pub struct CounterPatch {
    pub count: Option<i64>,
    pub label: Option<String>,
}

impl CounterPatch {
    #[allow(unused)]
    pub fn count(count: i64) -> Self { Self { count: Some(count), ..Default::default() } }
    #[allow(unused)]
    pub fn label(label: &str) -> Self { Self { label: Some(label.to_owned()), ..Default::default() } }
}

impl Merge for Counter {
    type Partial = CounterPatch;
    fn merge(&mut self, partial: CounterPatch) {
        if let Some(count) = partial.count {
            self.count = count;
        }
        if let Some(label) = partial.label {
            self.label = label;
        }
    }
}

impl Default for Counter {
    fn default() -> Self { Self { count: 0, label: "clicks".to_owned() } }
}

// Initialize tracing for tests
#[ctor::ctor]
fn init_tracing() { tracing_subscriber::fmt().with_max_level(Level::INFO).with_test_writer().init(); }

/// Returns an observer closure that records every value it is sent, and a function draining what it recorded
#[allow(unused)]
pub fn watcher<T: Send + 'static>() -> (Box<dyn Fn(T) + Send + Sync>, Box<dyn Fn() -> Vec<T> + Send + Sync>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let watcher = {
        let seen = seen.clone();
        Box::new(move |value: T| {
            seen.lock().unwrap().push(value);
        })
    };

    let check = Box::new(move || seen.lock().unwrap().drain(..).collect());

    (watcher, check)
}
