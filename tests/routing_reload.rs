//! Routing table reload atomicity under concurrent readers

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use edge_gateway::config::{Config, RouteConfig};
use edge_gateway::routing::{LiveRoutes, RouteTable};

fn route(id: &str, path: &str) -> RouteConfig {
    RouteConfig {
        id: id.to_string(),
        path: path.to_string(),
        target: format!("http://{id}:8077"),
        timeout: Duration::from_secs(3),
        order: None,
        public: false,
        headers: HashMap::new(),
        circuit_breaker: None,
    }
}

fn table(routes: Vec<RouteConfig>) -> RouteTable {
    RouteTable::from_config(&Config {
        routes,
        ..Default::default()
    })
}

/// Two complete table generations. Generation A routes /svc/x to "a1" and
/// /svc2/x to "a2"; generation B routes them to "b1" and "b2". A reader
/// that resolves both paths against one snapshot must see a pure
/// generation - one "a" result and one "b" result would be a mixed table.
#[test]
fn concurrent_readers_never_see_a_mixed_table() {
    let gen_a = || {
        vec![
            route("a1", "/svc/**"),
            route("a2", "/svc2/**"),
        ]
    };
    let gen_b = || {
        vec![
            route("b1", "/svc/**"),
            route("b2", "/svc2/**"),
        ]
    };

    let live = Arc::new(LiveRoutes::new(table(gen_a())));
    let stop = Arc::new(AtomicBool::new(false));

    // 100 concurrent readers resolving against a single snapshot each.
    let readers: Vec<_> = (0..100)
        .map(|_| {
            let live = Arc::clone(&live);
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    let snapshot = live.load();
                    let first = snapshot.resolve("/svc/x").unwrap().id.clone();
                    let second = snapshot.resolve("/svc2/x").unwrap().id.clone();

                    let generation = &first[..1];
                    assert_eq!(
                        &second[..1],
                        generation,
                        "mixed table observed: {first} vs {second}"
                    );
                }
            })
        })
        .collect();

    // Writer flips between generations while the readers hammer resolve.
    for i in 0..200 {
        let next = if i % 2 == 0 { gen_b() } else { gen_a() };
        live.install(table(next));
    }

    stop.store(true, Ordering::Relaxed);
    for reader in readers {
        reader.join().expect("reader panicked");
    }
}

#[test]
fn reload_does_not_disturb_held_snapshots() {
    let live = LiveRoutes::new(table(vec![route("old", "/api/**")]));
    let held = live.load();

    live.install(table(vec![route("new", "/api/**")]));

    // An in-flight request keeps resolving against its snapshot.
    assert_eq!(held.resolve("/api/x").unwrap().id, "old");
    assert_eq!(live.load().resolve("/api/x").unwrap().id, "new");
}

#[test]
fn resolution_is_first_registered_match() {
    let t = table(vec![
        route("first", "/overlap/**"),
        route("second", "/overlap/**"),
    ]);
    for _ in 0..10 {
        assert_eq!(t.resolve("/overlap/x").unwrap().id, "first");
    }
}
