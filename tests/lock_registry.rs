// Lock registry behavior in isolation: slot lifecycle, timeouts, ordered
// composite acquisition and release on unwind.
mod common;

use std::thread;
use std::time::Duration;

use innkeeper::{BookingError, LockKey, LockRegistry, ResourceKind};

const WAIT: Duration = Duration::from_secs(1);
const SHORT: Duration = Duration::from_millis(30);

#[test]
fn release_retires_the_slot() {
    let registry = LockRegistry::new();
    let key = LockKey::room(101);

    let guard = registry.acquire(key.clone(), WAIT).unwrap();
    assert!(registry.held(&key));
    assert_eq!(registry.slot_count(), 1);

    drop(guard);
    assert!(!registry.held(&key));
    assert_eq!(registry.slot_count(), 0);
}

#[test]
fn contended_acquire_times_out_and_leaves_no_trace() {
    let registry = LockRegistry::new();
    let key = LockKey::booking(&"BK-1".into());
    let _held = registry.acquire(key.clone(), WAIT).unwrap();

    let err = registry.acquire(key.clone(), SHORT).unwrap_err();
    assert!(matches!(err, BookingError::LockTimeout(k) if k == key));

    // The failed waiter withdrew its slot reference; only the holder remains.
    assert!(registry.held(&key));
    assert_eq!(registry.slot_count(), 1);
}

#[test]
fn composite_acquire_walks_keys_in_global_order() {
    let registry = LockRegistry::new();
    let guards = registry
        .acquire_many(
            vec![
                LockKey::sequence(2026),
                LockKey::booking(&"BK-1".into()),
                LockKey::room(101),
                LockKey::room(101),
            ],
            WAIT,
        )
        .unwrap();

    // Duplicates collapse and the remainder follows the (kind, id) order.
    let kinds: Vec<_> = guards.iter().map(|g| g.key().kind).collect();
    assert_eq!(
        kinds,
        vec![
            ResourceKind::Room,
            ResourceKind::Booking,
            ResourceKind::Sequence,
        ]
    );
    assert_eq!(registry.slot_count(), 3);

    drop(guards);
    assert_eq!(registry.slot_count(), 0);
}

#[test]
fn composite_failure_releases_guards_taken_so_far() {
    let registry = LockRegistry::new();
    let blocked = LockKey::booking(&"BK-1".into());
    let _held = registry.acquire(blocked.clone(), WAIT).unwrap();

    let err = registry
        .acquire_many(vec![LockKey::room(101), blocked.clone()], SHORT)
        .unwrap_err();
    assert!(matches!(err, BookingError::LockTimeout(k) if k == blocked));

    // The room guard taken before the failure is gone again.
    assert!(!registry.held(&LockKey::room(101)));
    assert_eq!(registry.slot_count(), 1);
}

#[test]
fn opposite_order_composite_acquires_never_deadlock() {
    let registry = LockRegistry::new();

    thread::scope(|scope| {
        for keys in [
            vec![LockKey::room(1), LockKey::room(2)],
            vec![LockKey::room(2), LockKey::room(1)],
        ] {
            let registry = registry.clone();
            scope.spawn(move || {
                for _ in 0..100 {
                    let guards = registry.acquire_many(keys.clone(), WAIT).unwrap();
                    drop(guards);
                }
            });
        }
    });

    assert_eq!(registry.slot_count(), 0);
}

#[test]
fn guard_releases_on_panic() {
    let registry = LockRegistry::new();
    let key = LockKey::room(101);

    let result = thread::scope(|scope| {
        let registry = registry.clone();
        let key = key.clone();
        scope
            .spawn(move || {
                let _guard = registry.acquire(key, WAIT).unwrap();
                panic!("worker died holding the lock");
            })
            .join()
    });

    assert!(result.is_err());
    assert!(!registry.held(&key));
    assert_eq!(registry.slot_count(), 0);
}
