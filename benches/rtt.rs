use std::time::{SystemTime, UNIX_EPOCH};

// Will measure round trip time (RTT). There are 2 queues, one for outgoing
// messages whose payload is the current timestamp in nanoseconds, the other
// to echo the message back. Once the original message is received the round
// trip time is calculated as current time minus the timestamp it carries.

const QUEUE_SIZE: usize = 64 * 1024;
const NUM_MESSAGES: usize = 1_000_000;

fn now_nanos() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos() as u64
}

fn main() -> anyhow::Result<()> {
    let (mut tx_out, mut rx_out) = unicast::ring::queue::<u64>(QUEUE_SIZE);
    let (mut tx_back, mut rx_back) = unicast::ring::queue::<u64>(QUEUE_SIZE);

    let echo = std::thread::spawn(move || loop {
        if let Some(time) = rx_out.try_pop() {
            #[cold]
            #[inline(never)]
            fn poison() {}

            if time == 0 {
                poison();
                break;
            }
            let mut value = time;
            while let Err(err) = tx_back.push(value) {
                value = err.into_inner();
                std::hint::spin_loop();
            }
        }
    });

    let sender = std::thread::spawn(move || {
        let mut latencies = hdrhistogram::Histogram::<u64>::new(3).unwrap();
        let mut msg_count = 0usize;

        loop {
            let mut value = now_nanos();
            while let Err(err) = tx_out.push(value) {
                value = err.into_inner();
                std::hint::spin_loop();
            }
            msg_count += 1;

            if let Some(time) = rx_back.try_pop() {
                latencies.record(now_nanos() - time).unwrap();
            }

            if msg_count >= NUM_MESSAGES {
                // send POISON pill
                while tx_out.push(0).is_err() {
                    std::hint::spin_loop();
                }
                break;
            }
        }

        println!("######################");
        println!("latencies");
        println!("######################");
        println!("min: {}", latencies.min());
        println!("50th: {}", latencies.value_at_percentile(0.5));
        println!("90th: {}", latencies.value_at_percentile(0.9));
        println!("99th: {}", latencies.value_at_percentile(0.99));
        println!("99.9th: {}", latencies.value_at_percentile(0.999));
        println!("max: {}", latencies.max());
        println!("count: {}", latencies.len());
    });

    echo.join().unwrap();
    sender.join().unwrap();

    Ok(())
}
