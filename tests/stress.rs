mod common;

use std::sync::Arc;
use std::thread;

use mpsc_ringbuf::settings::RingbufSettingsBuilder;
use mpsc_ringbuf::Ringbuf;
use mpsc_ringbuf::RingbufConsumer;
use mpsc_ringbuf::RingbufProducer;

const RBUF_SIZE: usize = 4095;
const NPRODUCERS: usize = 4;
const MSGS_PER_PRODUCER: usize = 50_000;

/// Producers race checksummed messages of random lengths through the
/// ring; the consumer verifies every message it reads. A refused
/// acquire drops the message and the producer moves on to a fresh one.
#[test]
fn test_mpsc_stress() {
    let _ = tracing_subscriber::fmt::try_init();

    let settings = RingbufSettingsBuilder::new()
        .capacity(RBUF_SIZE)
        .nworkers(NPRODUCERS)
        .build();
    let ringbuf = Arc::new(Ringbuf::new(settings).unwrap());

    thread::scope(|s| {
        for i in 0..NPRODUCERS {
            let mut producer =
                RingbufProducer::register(ringbuf.clone(), i).unwrap();
            s.spawn(move || {
                let mut seed = 5381 + i as u32;
                let mut buf = [0u8; 255];
                let mut sent = 0;

                while sent < MSGS_PER_PRODUCER {
                    let len = common::generate_message(&mut seed, &mut buf);
                    match producer.acquire(len) {
                        Ok(mut reservation) => {
                            assert!(reservation.offset() < RBUF_SIZE);
                            reservation.write(&buf[..len]).unwrap();
                            reservation.commit();
                            sent += 1;
                        }
                        Err(_) => thread::yield_now(),
                    }
                }
            });
        }

        let mut consumer = RingbufConsumer::attach(ringbuf.clone()).unwrap();
        s.spawn(move || {
            let total = NPRODUCERS * MSGS_PER_PRODUCER;
            let mut received = 0;

            while received < total {
                let Some(consumed) = consumer.consume() else {
                    thread::yield_now();
                    continue;
                };

                // Consumed ranges never span the buffer end and always
                // hold a whole number of messages.
                assert!(consumed.offset() + consumed.len() <= RBUF_SIZE);

                let bytes = consumed.as_slice();
                let mut pos = 0;
                while pos < bytes.len() {
                    let size = common::verify_message(&bytes[pos..])
                        .expect("corrupt message");
                    pos += size;
                    received += 1;
                }
                consumed.release();
            }
        });
    });
}
