use std::sync::{Arc, Barrier};
use std::thread;

use taskgroup::{CommandQueue, GroupId};

const PRODUCERS: usize = 4;
const PER_PRODUCER: usize = 250;

#[test]
fn events_from_many_threads_arrive_in_registration_order() {
    let source = GroupId::next();
    let (queue, mut pump) = CommandQueue::new(source);
    let queue = Arc::new(queue);
    let barrier = Arc::new(Barrier::new(PRODUCERS));

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|producer| {
            let queue = Arc::clone(&queue);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for n in 0..PER_PRODUCER {
                    assert!(queue.register((producer, n)));
                }
            })
        })
        .collect();

    let consumer = thread::spawn(move || {
        let mut seen = Vec::with_capacity(PRODUCERS * PER_PRODUCER);
        while seen.len() < PRODUCERS * PER_PRODUCER {
            let wrapper = pump.blocking_recv().expect("queue still open");
            seen.push(wrapper);
        }
        seen
    });

    for producer in producers {
        producer.join().unwrap();
    }
    let seen = consumer.join().unwrap();

    assert_eq!(queue.registered(), (PRODUCERS * PER_PRODUCER) as u64);
    assert!(seen.iter().all(|w| w.source == source));

    // One global order, starting at zero with no gaps.
    let seqs: Vec<u64> = seen.iter().map(|w| w.seq).collect();
    let expected: Vec<u64> = (0..seqs.len() as u64).collect();
    assert_eq!(seqs, expected);

    // Each producer's events keep the order they were registered in.
    for producer in 0..PRODUCERS {
        let ns: Vec<usize> = seen
            .iter()
            .filter(|w| w.event.0 == producer)
            .map(|w| w.event.1)
            .collect();
        assert_eq!(ns, (0..PER_PRODUCER).collect::<Vec<_>>());
    }
}

#[test]
fn batches_are_not_interleaved() {
    let (queue, mut pump) = CommandQueue::new(GroupId::next());
    let queue = Arc::new(queue);

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|producer| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for batch in 0..20 {
                    queue.register_all((0..5).map(|n| (producer, batch, n)));
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    let events: Vec<(usize, usize, usize)> = std::iter::from_fn(|| pump.try_recv())
        .map(|w| w.event)
        .collect();
    assert_eq!(events.len(), PRODUCERS * 20 * 5);

    for chunk in events.chunks(5) {
        let (producer, batch, _) = chunk[0];
        assert!(
            chunk
                .iter()
                .enumerate()
                .all(|(n, e)| *e == (producer, batch, n)),
            "batch split up: {chunk:?}"
        );
    }
}

#[tokio::test]
async fn dispose_stops_delivery_of_buffered_events() {
    let (queue, mut pump) = CommandQueue::new(GroupId::next());
    assert!(queue.register("kept"));
    assert_eq!(pump.recv().await.map(|w| w.event), Some("kept"));

    queue.register_all(["lost", "also lost"]);
    queue.dispose();
    assert!(!queue.register("rejected"));
    assert_eq!(pump.recv().await.map(|w| w.event), None);
    assert_eq!(pump.delivered(), 1);
}
