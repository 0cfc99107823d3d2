use std::net::TcpListener;
use std::thread;
use std::time::Duration;

use autoplay_core::input::BUTTON_RIGHT;
use autoplay_core::motifs::MotifStore;
use autoplay_core::rng::ArcFour;
use autoplay_core::sim::{demo_motifs, demo_objectives, MicroRig};
use autoplay_core::Emulator;
use autoplay_engine::evaluate::score_nexts;
use autoplay_engine::futures::FuturesPopulation;
use autoplay_engine::helper::{serve, HelperPool};
use autoplay_engine::nexts::{Next, NextOrigin};
use autoplay_engine::SearchParams;

fn spawn_helper() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
    let port = listener.local_addr().unwrap().port();
    thread::spawn(move || {
        let objectives = demo_objectives();
        let factory = MicroRig::new as fn() -> MicroRig;
        let _ = serve(&listener, &factory, &objectives);
    });
    port
}

fn fixture() -> (Vec<Next>, FuturesPopulation, Vec<u8>) {
    let params = SearchParams {
        min_futures: 2,
        max_futures: 8,
        initial_futures: 3,
        min_future_length: 10,
        max_future_length: 25,
        ..SearchParams::default()
    };
    let motifs = MotifStore::new(demo_motifs(), 0.8, 0.0001, 0.5);
    let mut population = FuturesPopulation::new(&params);
    let mut rng = ArcFour::new(b"helper-fixture");
    population.populate(&motifs, &mut rng);

    let nexts = vec![
        Next {
            inputs: vec![BUTTON_RIGHT; 10],
            origin: NextOrigin::Backfill { motif: 0 },
            explanation: "backfill".into(),
        },
        Next {
            inputs: vec![0u8; 10],
            origin: NextOrigin::Backfill { motif: 5 },
            explanation: "backfill".into(),
        },
    ];

    let mut rig = MicroRig::new();
    let state = rig.save();
    (nexts, population, state)
}

#[test]
fn helper_scores_match_local_scores() {
    let port = spawn_helper();
    let pool = HelperPool::probe(
        "127.0.0.1",
        [port],
        Duration::from_millis(1000),
        Duration::from_millis(5000),
    );
    assert_eq!(pool.len(), 1);

    let (nexts, population, state) = fixture();
    let objectives = demo_objectives();
    let factory = MicroRig::new as fn() -> MicroRig;

    let local = score_nexts(
        &factory,
        &objectives,
        &state,
        &nexts,
        population.futures(),
        None,
        None,
    );
    let remote = score_nexts(
        &factory,
        &objectives,
        &state,
        &nexts,
        population.futures(),
        None,
        Some(&pool),
    );

    assert_eq!(local.len(), remote.len());
    for (a, b) in local.iter().zip(&remote) {
        assert_eq!(a.immediate, b.immediate);
        assert_eq!(a.per_future, b.per_future);
        assert_eq!(a.futsum, b.futsum);
    }
}

#[test]
fn absent_helpers_fall_back_to_local_execution() {
    // Probe a port nobody listens on; the pool comes back empty and scoring
    // still works.
    let dead = {
        // Bind then drop to find a port that was just free.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let pool = HelperPool::probe(
        "127.0.0.1",
        [dead],
        Duration::from_millis(100),
        Duration::from_millis(100),
    );
    assert!(pool.is_empty());

    let (nexts, population, state) = fixture();
    let objectives = demo_objectives();
    let factory = MicroRig::new as fn() -> MicroRig;
    let scores = score_nexts(
        &factory,
        &objectives,
        &state,
        &nexts,
        population.futures(),
        None,
        Some(&pool),
    );
    assert_eq!(scores.len(), nexts.len());
}
