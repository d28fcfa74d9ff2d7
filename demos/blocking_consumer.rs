use std::time::Duration;
use unicast::blocking;

// A consumer that parks instead of spinning: the producer publishes a burst
// of work items with irregular pauses and the consumer drains them with
// timed waits, treating a long silence as end of stream.

fn main() {
    let (mut writer, mut reader) = blocking::queue::<String>(16);

    let producer = std::thread::spawn(move || {
        for batch in 0..5 {
            for item in 0..10 {
                writer.push(format!("job {batch}/{item}")).unwrap();
            }
            std::thread::sleep(Duration::from_millis(20));
        }
    });

    let mut handled = 0usize;
    while let Some(job) = reader.wait_pop_timeout(Duration::from_millis(200)) {
        let _ = job;
        handled += 1;
    }
    println!("handled {handled} jobs, stream went quiet");

    producer.join().unwrap();
}
