/*!
Multicast notification primitives for txstore

# Design requirements:
- One producer, many observers. Observers are notified in registration order.
- A late subscriber immediately receives the latest value (last-value replay).
- Termination (`error` or `complete`) happens at most once, and nothing is delivered after it.
- A misbehaving observer must never break delivery to the others, nor unwind into the producer.

# Nomenclature:
- `Broadcast` - the producer side. Holds the latest value and the observer list.
- `Observer` - the consumer contract: `next`, `error`, `complete`.
- `Subscription` - the registration handle. Dropping it (or calling `unsubscribe`) detaches the observer.

# Basic usage

```rust
use txstore_signals::*;

let broadcast: Broadcast<i32> = Broadcast::new();
broadcast.next(1);

// late subscriber sees the current value right away
let _sub = broadcast.subscribe(|value: i32| println!("value: {value}"));
// value: 1
broadcast.next(2);
// value: 2
broadcast.complete();
assert!(broadcast.is_closed());
assert_eq!(broadcast.observer_count(), 0);
```
*/

mod broadcast;
mod observer;
mod subscription;

pub use broadcast::*;
pub use observer::*;
pub use subscription::*;

/// The default error payload carried by `Observer::error`
pub type Fault = std::sync::Arc<dyn std::error::Error + Send + Sync + 'static>;
