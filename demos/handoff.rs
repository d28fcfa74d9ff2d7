use unicast::ring;

// Streams a batch of values from a producer thread to a consumer thread
// through the fixed slot ring and verifies they arrive intact and in order.

const COUNT: usize = 1_000_000;

fn main() {
    let (mut writer, mut reader) = ring::queue::<usize>(1024);

    let producer = std::thread::spawn(move || {
        for i in 0..COUNT {
            let mut value = i;
            while let Err(err) = writer.push(value) {
                value = err.into_inner();
                std::hint::spin_loop();
            }
        }
    });

    let consumer = std::thread::spawn(move || {
        let mut expected = 0usize;
        while expected < COUNT {
            if let Some(value) = reader.try_pop() {
                assert_eq!(expected, value);
                expected += 1;
            } else {
                std::hint::spin_loop();
            }
        }
        expected
    });

    producer.join().unwrap();
    let received = consumer.join().unwrap();
    println!("handed off {received} values in order");
}
