use num_format::{Locale, ToFormattedString};
use std::time::Instant;

const NUM_MESSAGES: usize = 10_000_000;

// Measures sustained one-way throughput for the non-blocking variants. The
// producer spins when the queue rejects a push, the consumer spins when the
// queue is empty.

fn main() -> anyhow::Result<()> {
    run_ring()?;
    run_unbounded()?;
    Ok(())
}

fn run_ring() -> anyhow::Result<()> {
    let (mut writer, mut reader) = unicast::ring::queue::<u64>(64 * 1024);

    let producer = std::thread::spawn(move || {
        for i in 0..NUM_MESSAGES as u64 {
            let mut value = i;
            while let Err(err) = writer.push(value) {
                value = err.into_inner();
                std::hint::spin_loop();
            }
        }
    });

    let consumer = std::thread::spawn(move || {
        let start = Instant::now();
        let mut received = 0usize;
        while received < NUM_MESSAGES {
            if reader.try_pop().is_some() {
                received += 1;
            } else {
                std::hint::spin_loop();
            }
        }
        report("ring", start, received);
    });

    producer.join().unwrap();
    consumer.join().unwrap();
    Ok(())
}

fn run_unbounded() -> anyhow::Result<()> {
    let (mut writer, mut reader) = unicast::unbounded::queue::<u64>(64 * 1024);

    let producer = std::thread::spawn(move || {
        for i in 0..NUM_MESSAGES as u64 {
            writer.push(i).unwrap();
        }
    });

    let consumer = std::thread::spawn(move || {
        let start = Instant::now();
        let mut received = 0usize;
        while received < NUM_MESSAGES {
            if reader.try_pop().is_some() {
                received += 1;
            } else {
                std::hint::spin_loop();
            }
        }
        report("unbounded", start, received);
    });

    producer.join().unwrap();
    consumer.join().unwrap();
    Ok(())
}

fn report(name: &str, start: Instant, received: usize) {
    let elapsed = start.elapsed();
    let messages_per_sec = (received as u128 * 1_000_000_000 / elapsed.as_nanos()) as u64;
    println!(
        "{}: {}ms {} msgs/sec messages: {}",
        name,
        elapsed.as_millis(),
        messages_per_sec.to_formatted_string(&Locale::en),
        received.to_formatted_string(&Locale::en),
    );
}
